use std::sync::Arc;

use cacheprog::handlers::disk::DiskCache;
use cacheprog::middleware::{LoggingMiddleware, StatsMiddleware};
use cacheprog::{Registry, Server, ServerConfig};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() {
    // stdout carries the protocol; logs go to stderr.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = match ServerConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    let cache = match DiskCache::open(&config.cache_dir) {
        Ok(cache) => Arc::new(cache),
        Err(e) => {
            tracing::error!("failed to initialize cache at {}: {e}", config.cache_dir.display());
            std::process::exit(1);
        }
    };

    let stats = StatsMiddleware::new();
    let counters = stats.stats();

    let registry = Arc::new(Registry::new());
    registry.use_middleware(Arc::new(LoggingMiddleware));
    registry.use_middleware(Arc::new(stats));
    cache.register(&registry);

    tracing::info!(
        concurrency = config.concurrency,
        timeout = ?config.request_timeout,
        "cacheprog-server v{}",
        env!("CARGO_PKG_VERSION")
    );

    let server = Server::new(config, registry);
    let result = server.serve_stdio().await;

    let s = counters.snapshot();
    tracing::info!(
        gets = s.gets,
        hits = s.hits,
        misses = s.misses,
        puts = s.puts,
        bytes_stored = s.bytes_stored,
        errors = s.errors,
        "session stats"
    );

    if let Err(e) = result {
        tracing::error!("fatal error: {e}");
        std::process::exit(1);
    }
}
