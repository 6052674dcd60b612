use thiserror::Error;

use crate::serialization::Format;

/// Errors raised by the shared connector plumbing.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid Zenoh setting '{key}': {reason}")]
    ZenohConfig { key: String, reason: String },

    #[error("Zenoh error: {0}")]
    Zenoh(#[from] zenoh::Error),

    #[error("Failed to encode measurement as {format}: {reason}")]
    Encode { format: Format, reason: String },

    #[error("Failed to decode {format} payload: {reason}")]
    Decode { format: Format, reason: String },

    #[error("Failed to install tracing subscriber: {0}")]
    Tracing(String),
}

pub type Result<T> = std::result::Result<T, Error>;
