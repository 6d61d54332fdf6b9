use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::base64_bytes;
use super::request::Command;

/// One outbound protocol message.
///
/// Every field except `id` is omitted from the encoding when empty, zero,
/// false or `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Request id answered; `0` is reserved for the startup announcement.
    pub id: i64,

    /// Failure of this request only.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub err: String,

    /// Only present in the announcement.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub known_commands: Vec<Command>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub miss: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty", with = "base64_bytes")]
    pub output_id: Vec<u8>,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub size: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,

    /// Absolute path of the file backing the entry; valid until `close`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_path: Option<PathBuf>,
}

fn is_zero(value: &i64) -> bool {
    *value == 0
}

impl Response {
    /// The id-0 message listing the commands this server handles.
    pub fn announce(known_commands: Vec<Command>) -> Self {
        Self {
            id: 0,
            known_commands,
            ..Self::default()
        }
    }

    /// Bare acknowledgement.
    pub fn ok(id: i64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub fn miss(id: i64) -> Self {
        Self {
            id,
            miss: true,
            ..Self::default()
        }
    }

    pub fn error(id: i64, err: impl Into<String>) -> Self {
        Self {
            id,
            err: err.into(),
            ..Self::default()
        }
    }

    pub fn is_error(&self) -> bool {
        !self.err.is_empty()
    }
}
