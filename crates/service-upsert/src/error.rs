use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("transport error talking to {endpoint}: {reason}")]
    Transport { endpoint: String, reason: String },

    #[error("failed to decode {what}: {reason}")]
    Serialization { what: String, reason: String },

    #[error("version conflict updating '{name}': version {version} is stale")]
    VersionConflict { name: String, version: u64 },

    #[error("{program} failed for '{target}': {reason}")]
    Execution {
        program: String,
        target: String,
        reason: String,
    },

    #[error("invalid upsert: {0}")]
    Validation(String),

    #[error("{what} timed out after {after:?}")]
    Timeout { what: String, after: Duration },

    #[error("management API returned {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    pub fn validation<M: Into<String>>(msg: M) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config<M: Into<String>>(msg: M) -> Self {
        Self::Config(msg.into())
    }

    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
