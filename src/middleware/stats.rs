use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::handlers::{Handler, HandlerFuture, RequestContext, ResponseWriter};
use crate::protocol::{Command, Request, Response};
use crate::registry::Middleware;

/// Counters shared between the middleware and whoever reports them.
#[derive(Debug, Default)]
pub struct Stats {
    gets: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    puts: AtomicU64,
    bytes_stored: AtomicU64,
    errors: AtomicU64,
}

/// Point-in-time copy of [`Stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub gets: u64,
    pub hits: u64,
    pub misses: u64,
    pub puts: u64,
    pub bytes_stored: u64,
    pub errors: u64,
}

impl Stats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            gets: self.gets.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            puts: self.puts.load(Ordering::Relaxed),
            bytes_stored: self.bytes_stored.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    fn record(&self, command: &Command, res: &Response) {
        if res.is_error() {
            self.errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
        match command {
            Command::Get if res.miss => {
                self.misses.fetch_add(1, Ordering::Relaxed);
            }
            Command::Get => {
                self.hits.fetch_add(1, Ordering::Relaxed);
            }
            Command::Put => {
                self.bytes_stored.fetch_add(stored_size(res), Ordering::Relaxed);
            }
            _ => {}
        }
    }
}

/// Counts requests and their outcomes into a shared [`Stats`].
#[derive(Debug, Clone, Default)]
pub struct StatsMiddleware {
    stats: Arc<Stats>,
}

impl StatsMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> Arc<Stats> {
        Arc::clone(&self.stats)
    }
}

impl Middleware for StatsMiddleware {
    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(Counted {
            next,
            stats: Arc::clone(&self.stats),
        })
    }
}

struct Counted {
    next: Arc<dyn Handler>,
    stats: Arc<Stats>,
}

impl Handler for Counted {
    fn handle<'a>(
        &'a self,
        ctx: &'a RequestContext,
        w: &'a dyn ResponseWriter,
        req: &'a mut Request,
    ) -> HandlerFuture<'a> {
        Box::pin(async move {
            match req.command {
                Command::Get => {
                    self.stats.gets.fetch_add(1, Ordering::Relaxed);
                }
                Command::Put => {
                    self.stats.puts.fetch_add(1, Ordering::Relaxed);
                }
                _ => {}
            }
            let counting = CountingWriter {
                inner: w,
                stats: &self.stats,
                command: req.command.clone(),
            };
            self.next.handle(ctx, &counting, req).await;
        })
    }
}

struct CountingWriter<'a> {
    inner: &'a dyn ResponseWriter,
    stats: &'a Stats,
    command: Command,
}

impl ResponseWriter for CountingWriter<'_> {
    fn write_response(&self, res: Response) {
        self.stats.record(&self.command, &res);
        self.inner.write_response(res);
    }
}

/// Bytes a successful put left on disk: the reported `size` if any,
/// otherwise the length of the file at `disk_path`.
fn stored_size(res: &Response) -> u64 {
    if res.size > 0 {
        return u64::try_from(res.size).unwrap_or(0);
    }
    res.disk_path
        .as_deref()
        .and_then(|path| std::fs::metadata(path).ok())
        .map_or(0, |meta| meta.len())
}
