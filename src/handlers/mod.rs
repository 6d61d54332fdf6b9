//! The pluggable handler capability and the bundled disk backend.

pub mod disk;

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::Instant;

use crate::protocol::{Request, Response};

/// Object-safe boxed future returned by [`Handler::handle`].
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Sink for responses.
///
/// Implementations must be safe to call from many tasks at once.
pub trait ResponseWriter: Send + Sync {
    fn write_response(&self, res: Response);
}

/// Per-request context passed to handlers.
///
/// The deadline only bounds queueing for a concurrency token; a handler that
/// is already running is never interrupted. Long handlers may consult it to
/// give up early.
#[derive(Debug, Clone)]
pub struct RequestContext {
    deadline: Instant,
}

impl RequestContext {
    pub fn new(deadline: Instant) -> Self {
        Self { deadline }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// Performs the work for one command.
///
/// A handler must call `w.write_response` exactly once with a response whose
/// `id` equals `req.id`, and must not keep the request body past its return.
pub trait Handler: Send + Sync {
    fn handle<'a>(
        &'a self,
        ctx: &'a RequestContext,
        w: &'a dyn ResponseWriter,
        req: &'a mut Request,
    ) -> HandlerFuture<'a>;
}

/// Adapter turning a closure into a [`Handler`]; see [`handler_fn`].
pub struct HandlerFn<F>(F);

/// Build a handler from a closure returning a boxed future.
///
/// ```
/// use cacheprog::handlers::handler_fn;
/// use cacheprog::protocol::Response;
///
/// let miss = handler_fn(|_ctx, w, req| {
///     Box::pin(async move { w.write_response(Response::miss(req.id)) })
/// });
/// # let _ = miss;
/// ```
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: for<'a> Fn(&'a RequestContext, &'a dyn ResponseWriter, &'a mut Request) -> HandlerFuture<'a>
        + Send
        + Sync,
{
    HandlerFn(f)
}

impl<F> Handler for HandlerFn<F>
where
    F: for<'a> Fn(&'a RequestContext, &'a dyn ResponseWriter, &'a mut Request) -> HandlerFuture<'a>
        + Send
        + Sync,
{
    fn handle<'a>(
        &'a self,
        ctx: &'a RequestContext,
        w: &'a dyn ResponseWriter,
        req: &'a mut Request,
    ) -> HandlerFuture<'a> {
        (self.0)(ctx, w, req)
    }
}
