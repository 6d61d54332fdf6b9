use std::fmt;

use serde::{Deserialize, Serialize};

use super::base64_bytes;
use super::body::Body;

/// Command kind carried by a request.
///
/// Unrecognised tokens survive decoding as [`Command::Other`] so the
/// dispatcher can answer them with a per-request error.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Command {
    Get,
    Put,
    Close,
    Other(String),
}

impl Command {
    /// Kinds a handler may be registered for, in announcement order.
    pub const SUPPORTED: [Command; 3] = [Command::Get, Command::Put, Command::Close];

    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "get",
            Self::Put => "put",
            Self::Close => "close",
            Self::Other(other) => other,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl Default for Command {
    fn default() -> Self {
        Self::Other(String::new())
    }
}

impl From<String> for Command {
    fn from(value: String) -> Self {
        match value.as_str() {
            "get" => Self::Get,
            "put" => Self::Put,
            "close" => Self::Close,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for Command {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<Command> for String {
    fn from(value: Command) -> Self {
        match value {
            Command::Other(other) => other,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inbound protocol message.
///
/// Field names follow the snake_case wire form; the Go-style spellings
/// emitted by some drivers are accepted as aliases.
#[derive(Debug, Default, Deserialize)]
pub struct Request {
    /// Unique per session; echoed by the response.
    #[serde(default, alias = "ID")]
    pub id: i64,

    #[serde(default, alias = "Command")]
    pub command: Command,

    /// Cache key for `get` and `put`; empty when unused.
    #[serde(default, alias = "ActionID", with = "base64_bytes")]
    pub action_id: Vec<u8>,

    /// Identifier stored alongside the body on `put`.
    #[serde(default, alias = "OutputID", with = "base64_bytes")]
    pub output_id: Vec<u8>,

    /// Pre-rename spelling of `output_id`, folded in by [`Request::normalize`].
    #[serde(default, rename = "object_id", alias = "ObjectID", with = "base64_bytes")]
    object_id: Vec<u8>,

    /// Declared length of the body that follows a `put`.
    #[serde(default, alias = "BodySize")]
    pub body_size: i64,

    #[serde(skip)]
    pub body: Body,
}

impl Request {
    pub fn new(id: i64, command: impl Into<Command>) -> Self {
        Self {
            id,
            command: command.into(),
            ..Self::default()
        }
    }

    pub fn with_action_id(mut self, action_id: impl Into<Vec<u8>>) -> Self {
        self.action_id = action_id.into();
        self
    }

    pub fn with_output_id(mut self, output_id: impl Into<Vec<u8>>) -> Self {
        self.output_id = output_id.into();
        self
    }

    /// Attach a body; `body_size` is taken from it.
    pub fn with_body(mut self, body: Body) -> Self {
        self.body_size = i64::try_from(body.declared_len()).unwrap_or(i64::MAX);
        self.body = body;
        self
    }

    pub(crate) fn normalize(mut self) -> Self {
        if self.output_id.is_empty() && !self.object_id.is_empty() {
            self.output_id = std::mem::take(&mut self.object_id);
        }
        self
    }
}
