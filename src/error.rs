//! Error types for the cache program engine.
//!
//! Session-fatal conditions surface as [`ServeError`]; everything scoped to a
//! single request is turned into that request's `err` text instead.

use std::io;

use thiserror::Error;

use crate::protocol::Command;

/// Failure reading a protocol message from the inbound stream.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed message: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("malformed body: {0}")]
    Body(String),
}

/// Registration of a handler for a kind outside the fixed protocol set.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("error: unsupported command registered: {0}")]
    UnsupportedCommand(Command),
}

/// Dispatch lookup for a kind with no registered handler.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("error: unknown command: {0}")]
    UnknownCommand(Command),
}

/// Invalid configuration value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be a positive integer, got {value:?}")]
    NotPositive { name: &'static str, value: String },
}

/// Reason a session ended without a `close` acknowledgement.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("error: invalid request: {0}")]
    InvalidRequest(#[source] CodecError),

    #[error("error: input closed before close request")]
    InputClosed,

    #[error("error: writing responses: {0}")]
    Output(#[source] io::Error),
}
