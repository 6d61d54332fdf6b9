//! Tests for handler registration, dispatch lookup and middleware order.

use std::sync::Arc;

use parking_lot::Mutex;

use cacheprog::error::{DispatchError, RegistryError};
use cacheprog::handlers::{
    handler_fn, Handler, HandlerFuture, RequestContext, ResponseWriter,
};
use cacheprog::protocol::{Command, Request, Response};
use cacheprog::{Middleware, Registry};

#[derive(Default)]
struct Recorder {
    responses: Mutex<Vec<Response>>,
}

impl ResponseWriter for Recorder {
    fn write_response(&self, res: Response) {
        self.responses.lock().push(res);
    }
}

/// Answers every request with `err` set to its tag.
struct Tagged(&'static str);

impl Handler for Tagged {
    fn handle<'a>(
        &'a self,
        _ctx: &'a RequestContext,
        w: &'a dyn ResponseWriter,
        req: &'a mut Request,
    ) -> HandlerFuture<'a> {
        Box::pin(async move { w.write_response(Response::error(req.id, self.0)) })
    }
}

/// Middleware that records entry and exit into a shared trace.
struct Trace {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

struct Traced {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
    next: Arc<dyn Handler>,
}

impl Middleware for Trace {
    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(Traced {
            name: self.name,
            log: Arc::clone(&self.log),
            next,
        })
    }
}

impl Handler for Traced {
    fn handle<'a>(
        &'a self,
        ctx: &'a RequestContext,
        w: &'a dyn ResponseWriter,
        req: &'a mut Request,
    ) -> HandlerFuture<'a> {
        Box::pin(async move {
            self.log.lock().push(format!("{} in", self.name));
            self.next.handle(ctx, w, req).await;
            self.log.lock().push(format!("{} out", self.name));
        })
    }
}

async fn call(registry: &Registry, req: Request) -> Vec<Response> {
    let mut req = req;
    let handler = registry.dispatch(&req.command).unwrap();
    let recorder = Recorder::default();
    let ctx = RequestContext::with_timeout(std::time::Duration::from_secs(5));
    handler.handle(&ctx, &recorder, &mut req).await;
    recorder.responses.into_inner()
}

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

#[test]
fn registering_unsupported_kind_fails() {
    let registry = Registry::new();
    let err = registry
        .register(Command::from("get2"), Arc::new(Tagged("x")))
        .unwrap_err();
    assert_eq!(err, RegistryError::UnsupportedCommand(Command::from("get2")));
    assert!(registry.known_commands().is_empty());
}

#[test]
fn known_commands_follow_protocol_order() {
    let registry = Registry::new();
    assert!(registry.known_commands().is_empty());

    registry.handle_close(Arc::new(Tagged("close")));
    registry.register(Command::Get, Arc::new(Tagged("get"))).unwrap();

    assert_eq!(registry.known_commands(), vec![Command::Get, Command::Close]);
}

#[tokio::test]
async fn last_registration_wins() {
    let registry = Registry::new();
    registry.handle_get(Arc::new(Tagged("first")));
    registry.handle_get(Arc::new(Tagged("second")));

    let responses = call(&registry, Request::new(1, Command::Get)).await;
    assert_eq!(responses, vec![Response::error(1, "second")]);
    assert_eq!(registry.known_commands(), vec![Command::Get]);
}

#[test]
fn dispatch_without_handler_reports_unknown_command() {
    let registry = Registry::new();
    registry.handle_get(Arc::new(Tagged("get")));

    let err = registry.dispatch(&Command::Put).err().unwrap();
    assert_eq!(err, DispatchError::UnknownCommand(Command::Put));
    assert_eq!(err.to_string(), "error: unknown command: put");
}

#[tokio::test]
async fn closures_can_be_handlers() {
    let registry = Registry::new();
    registry.handle_get(Arc::new(handler_fn(|_ctx, w, req| {
        Box::pin(async move { w.write_response(Response::miss(req.id)) })
    })));

    let responses = call(&registry, Request::new(4, Command::Get)).await;
    assert_eq!(responses, vec![Response::miss(4)]);
}

// ---------------------------------------------------------------------------
// Middleware
// ---------------------------------------------------------------------------

#[tokio::test]
async fn first_middleware_is_outermost() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let registry = Registry::new();
    registry.handle_get(Arc::new(Tagged("get")));
    registry.use_middleware(Arc::new(Trace {
        name: "outer",
        log: Arc::clone(&log),
    }));
    registry.use_middleware(Arc::new(Trace {
        name: "inner",
        log: Arc::clone(&log),
    }));

    let responses = call(&registry, Request::new(2, Command::Get)).await;
    assert_eq!(responses.len(), 1);
    assert_eq!(
        *log.lock(),
        vec!["outer in", "inner in", "inner out", "outer out"]
    );
}

#[tokio::test]
async fn middleware_applies_to_every_kind() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let registry = Registry::new();
    registry.handle_get(Arc::new(Tagged("get")));
    registry.handle_close(Arc::new(Tagged("close")));
    registry.use_middleware(Arc::new(Trace {
        name: "mw",
        log: Arc::clone(&log),
    }));

    call(&registry, Request::new(1, Command::Get)).await;
    call(&registry, Request::new(2, Command::Close)).await;

    assert_eq!(log.lock().len(), 4);
}

#[tokio::test]
async fn closure_middleware_wraps_handler() {
    let registry = Registry::new();
    registry.handle_get(Arc::new(Tagged("inner")));
    let replace: Arc<dyn Middleware> =
        Arc::new(|_next: Arc<dyn Handler>| -> Arc<dyn Handler> { Arc::new(Tagged("replaced")) });
    registry.use_middleware(replace);

    let responses = call(&registry, Request::new(3, Command::Get)).await;
    assert_eq!(responses, vec![Response::error(3, "replaced")]);
}
