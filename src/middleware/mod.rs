//! Middleware bundled with the server: request logging and counters.

pub mod logging;
pub mod stats;

pub use logging::LoggingMiddleware;
pub use stats::{Stats, StatsMiddleware, StatsSnapshot};
