use std::sync::Arc;
use std::time::Instant;

use crate::handlers::{Handler, HandlerFuture, RequestContext, ResponseWriter};
use crate::protocol::{Command, Request, Response};
use crate::registry::Middleware;

/// Logs each request on entry, its outcome when answered, and its duration.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(Logged { next })
    }
}

struct Logged {
    next: Arc<dyn Handler>,
}

impl Handler for Logged {
    fn handle<'a>(
        &'a self,
        ctx: &'a RequestContext,
        w: &'a dyn ResponseWriter,
        req: &'a mut Request,
    ) -> HandlerFuture<'a> {
        Box::pin(async move {
            let start = Instant::now();
            let action_id = hex::encode(&req.action_id);
            match &req.command {
                Command::Get => tracing::info!(id = req.id, %action_id, "get request received"),
                Command::Put => tracing::info!(
                    id = req.id,
                    %action_id,
                    body_size = req.body_size,
                    "put request received"
                ),
                Command::Close => tracing::info!(id = req.id, "close request received"),
                Command::Other(other) => {
                    tracing::info!(id = req.id, command = %other, "unknown command received")
                }
            }

            let logging = LoggingWriter {
                inner: w,
                id: req.id,
                command: req.command.clone(),
            };
            self.next.handle(ctx, &logging, req).await;

            tracing::info!(id = logging.id, elapsed = ?start.elapsed(), "request completed");
        })
    }
}

struct LoggingWriter<'a> {
    inner: &'a dyn ResponseWriter,
    id: i64,
    command: Command,
}

impl ResponseWriter for LoggingWriter<'_> {
    fn write_response(&self, res: Response) {
        if res.is_error() {
            tracing::warn!(id = self.id, err = %res.err, "response error");
        } else if res.miss {
            tracing::info!(id = self.id, "cache miss");
        } else {
            match self.command {
                Command::Get => tracing::info!(id = self.id, size = res.size, "cache hit"),
                Command::Put => tracing::info!(
                    id = self.id,
                    disk_path = ?res.disk_path,
                    "cache saved"
                ),
                Command::Close => tracing::info!(id = self.id, "cache closed"),
                Command::Other(_) => {}
            }
        }
        self.inner.write_response(res);
    }
}
