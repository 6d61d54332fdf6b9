use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::ServerConfig;
use crate::error::ServeError;
use crate::handlers::{RequestContext, ResponseWriter};
use crate::protocol::{Command, MessageReader, Request, Response};
use crate::registry::Registry;
use crate::writer::StreamWriter;

const DEADLINE_EXCEEDED: &str = "context canceled: context deadline exceeded";

/// Cache program server reading a JSON value stream and writing one
/// response per line.
///
/// Construct once with its configuration and registry, then call
/// [`Server::serve`] (or [`Server::serve_stdio`]) to run a single session.
pub struct Server {
    config: ServerConfig,
    registry: Arc<Registry>,
}

impl Server {
    pub fn new(config: ServerConfig, registry: Arc<Registry>) -> Self {
        Self { config, registry }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Run a session over the process's stdin and stdout.
    pub async fn serve_stdio(self) -> Result<(), ServeError> {
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Run a session until a `close` request has been answered.
    ///
    /// Returns an error if the input ends or carries a malformed message
    /// before `close`; in-flight requests are still answered first.
    pub async fn serve<R, W>(self, input: R, output: W) -> Result<(), ServeError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (writer, output_task) = StreamWriter::spawn(output);
        let session = Session {
            registry: self.registry,
            writer: Arc::new(writer),
            permits: Arc::new(Semaphore::new(self.config.concurrency.max(1))),
            timeout: self.config.request_timeout,
            in_flight: JoinSet::new(),
        };

        // The session owns the last writer handle; dropping it lets the
        // output task finish once everything queued is flushed.
        let result = session.run(MessageReader::new(input)).await;
        let flushed = output_task.finish().await;

        match (result, flushed) {
            (Err(e), _) => Err(e),
            (Ok(()), Err(e)) => Err(ServeError::Output(e)),
            (Ok(()), Ok(())) => Ok(()),
        }
    }
}

struct Session {
    registry: Arc<Registry>,
    writer: Arc<StreamWriter>,
    permits: Arc<Semaphore>,
    timeout: Duration,
    in_flight: JoinSet<()>,
}

impl Session {
    async fn run<R>(mut self, mut reader: MessageReader<R>) -> Result<(), ServeError>
    where
        R: AsyncRead + Unpin,
    {
        let known = self.registry.known_commands();
        tracing::info!(?known, "announcing known commands");
        self.writer.write_response(Response::announce(known));

        loop {
            self.reap();

            let mut req = match reader.read_request().await {
                Ok(Some(req)) => req,
                Ok(None) => {
                    tracing::warn!("input closed before close request");
                    self.drain().await;
                    return Err(ServeError::InputClosed);
                }
                Err(e) => {
                    tracing::error!(error = %e, "invalid request, ending session");
                    self.drain().await;
                    return Err(ServeError::InvalidRequest(e));
                }
            };
            tracing::debug!(id = req.id, command = %req.command, "request decoded");

            match req.command {
                Command::Get => self.launch(req),
                Command::Put => {
                    if let Err(e) = reader.read_body(&mut req).await {
                        self.writer.write_response(Response::error(
                            req.id,
                            format!("error: failed to decode request body: {e}"),
                        ));
                        continue;
                    }
                    self.launch(req);
                }
                Command::Close => {
                    self.drain().await;
                    let ctx = RequestContext::with_timeout(self.timeout);
                    invoke(&self.registry, Arc::clone(&self.writer), ctx, req).await;
                    tracing::info!("session closed");
                    return Ok(());
                }
                Command::Other(ref other) => {
                    self.writer.write_response(Response::error(
                        req.id,
                        format!("error: {other} is unknown command"),
                    ));
                }
            }
        }
    }

    /// Start a request in the background. It waits for a concurrency token
    /// until its deadline; the read loop never waits here.
    fn launch(&mut self, req: Request) {
        let ctx = RequestContext::with_timeout(self.timeout);
        let registry = Arc::clone(&self.registry);
        let writer = Arc::clone(&self.writer);
        let permits = Arc::clone(&self.permits);

        self.in_flight.spawn(async move {
            let id = req.id;
            let acquired = tokio::select! {
                biased;
                permit = permits.acquire_owned() => permit,
                () = tokio::time::sleep_until(ctx.deadline()) => {
                    tracing::warn!(id, "timed out waiting for a concurrency token");
                    writer.write_response(Response::error(id, DEADLINE_EXCEEDED));
                    return;
                }
            };
            let Ok(_permit) = acquired else {
                writer.write_response(Response::error(id, "context canceled: server closed"));
                return;
            };
            invoke(&registry, writer, ctx, req).await;
        });
    }

    /// Collect tasks that already finished.
    fn reap(&mut self) {
        while let Some(joined) = self.in_flight.try_join_next() {
            log_join(joined);
        }
    }

    /// Wait for every launched request to finish.
    async fn drain(&mut self) {
        if !self.in_flight.is_empty() {
            tracing::debug!(pending = self.in_flight.len(), "draining in-flight requests");
        }
        while let Some(joined) = self.in_flight.join_next().await {
            log_join(joined);
        }
    }
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "request task failed");
    }
}

/// Run the composed handler chain for `req` and make sure exactly one
/// response is written for it, even if the handler panics or forgets.
async fn invoke(
    registry: &Registry,
    writer: Arc<StreamWriter>,
    ctx: RequestContext,
    mut req: Request,
) {
    let id = req.id;
    let handler = match registry.dispatch(&req.command) {
        Ok(handler) => handler,
        Err(e) => {
            writer.write_response(Response::error(id, e.to_string()));
            return;
        }
    };

    let reply = Arc::new(Reply {
        id,
        writer,
        answered: AtomicBool::new(false),
    });
    let task_reply = Arc::clone(&reply);
    let outcome = tokio::spawn(async move {
        handler.handle(&ctx, &*task_reply, &mut req).await;
    })
    .await;

    match outcome {
        Ok(()) if !reply.answered() => {
            tracing::warn!(id, "handler returned without writing a response");
            reply.write_response(Response::error(
                id,
                "error: handler returned without writing a response",
            ));
        }
        Ok(()) => {}
        Err(e) => {
            let detail = if e.is_panic() {
                panic_message(e.into_panic())
            } else {
                e.to_string()
            };
            tracing::error!(id, %detail, "handler fault");
            if !reply.answered() {
                reply.write_response(Response::error(id, format!("error: handler fault: {detail}")));
            }
        }
    }
}

/// Writer handed to the handler chain for a single request.
struct Reply {
    id: i64,
    writer: Arc<StreamWriter>,
    answered: AtomicBool,
}

impl Reply {
    fn answered(&self) -> bool {
        self.answered.load(Ordering::Acquire)
    }
}

impl ResponseWriter for Reply {
    fn write_response(&self, res: Response) {
        if self.answered.swap(true, Ordering::AcqRel) {
            tracing::warn!(id = self.id, "duplicate response dropped");
            return;
        }
        if res.id != self.id {
            tracing::warn!(id = self.id, response_id = res.id, "response id does not match request");
        }
        self.writer.write_response(res);
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(msg) => *msg,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "panic".to_string(),
        },
    }
}
