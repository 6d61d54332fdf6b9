use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Default number of handlers allowed to run at once.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Default time a request may wait for a concurrency token (30 seconds).
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Server configuration. Fixed for the lifetime of a session.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Root directory of the bundled disk backend.
    pub cache_dir: PathBuf,
    /// Maximum handler invocations executing at once.
    pub concurrency: usize,
    /// Bound on how long a request may queue for a concurrency token.
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir().join("cacheprog"),
            concurrency: DEFAULT_CONCURRENCY,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment.
    ///
    /// - `CACHEPROG_DIR` (optional, default `<tmp>/cacheprog`): disk cache root
    /// - `CACHEPROG_CONCURRENCY` (optional, default 8): parallel handlers
    /// - `CACHEPROG_TIMEOUT_SECS` (optional, default 30): max queueing seconds per request
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let cache_dir = std::env::var_os("CACHEPROG_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.cache_dir);

        let concurrency = match std::env::var("CACHEPROG_CONCURRENCY") {
            Ok(val) => parse_positive("CACHEPROG_CONCURRENCY", &val)?,
            Err(_) => defaults.concurrency as u64,
        };

        let request_timeout = match std::env::var("CACHEPROG_TIMEOUT_SECS") {
            Ok(val) => Duration::from_secs(parse_positive("CACHEPROG_TIMEOUT_SECS", &val)?),
            Err(_) => defaults.request_timeout,
        };

        Ok(Self {
            cache_dir,
            concurrency: usize::try_from(concurrency).unwrap_or(usize::MAX),
            request_timeout,
        })
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// Zero is treated as one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

fn parse_positive(name: &'static str, value: &str) -> Result<u64, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::NotPositive {
            name,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_positive_rejects_zero_and_garbage() {
        assert_eq!(parse_positive("X", " 4 "), Ok(4));
        assert!(parse_positive("X", "0").is_err());
        assert!(parse_positive("X", "-3").is_err());
        assert!(parse_positive("X", "many").is_err());
    }

    #[test]
    fn concurrency_is_clamped() {
        let config = ServerConfig::default().with_concurrency(0);
        assert_eq!(config.concurrency, 1);
    }
}
