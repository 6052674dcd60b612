//! Error taxonomy of the polling pipeline.

use std::time::Duration;
use thiserror::Error;

use crate::master::Framing;

/// Errors reported by a master capability for a single request.
#[derive(Debug, Error)]
pub enum MasterError {
    /// The underlying transport failed; the connection must be rebuilt.
    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// A malformed or mismatched response; the stream can't be trusted anymore.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The device answered with a Modbus exception.
    #[error("Device exception: {0}")]
    Exception(String),
}

impl MasterError {
    /// Returns `true` if the connection must be torn down after this error.
    pub fn breaks_connection(&self) -> bool {
        !matches!(self, MasterError::Exception(_))
    }
}

/// The transport to the device could not be established.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Timed out connecting to {endpoint} after {timeout:?}")]
    Timeout { endpoint: String, timeout: Duration },

    #[error("Failed to connect to {endpoint}: {source}")]
    Io {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{framing} framing is not supported by this master")]
    UnsupportedFraming { framing: Framing },
}

/// A single register read failed; the register yields no data this pass.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error(transparent)]
    Master(#[from] MasterError),

    #[error("Read timed out after {0:?}")]
    Timeout(Duration),

    #[error("Request of {requested} words exceeds the Modbus limit")]
    TooManyWords { requested: usize },
}

impl ReadError {
    /// Returns `true` if the connection must be torn down after this error.
    pub fn breaks_connection(&self) -> bool {
        match self {
            ReadError::Master(e) => e.breaks_connection(),
            ReadError::Timeout(_) => true,
            ReadError::TooManyWords { .. } => false,
        }
    }
}

/// Returned words don't line up with the register's element layout.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Expected {expected} words but received {actual}")]
    Inconsistent { expected: usize, actual: usize },

    #[error("{len} bytes can't be split into {width}-byte elements")]
    PartialElement { len: usize, width: usize },
}

/// A tag string that isn't of the form `"{unit}:{address}"`.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid tag '{0}': expected \"<unit>:<address>\"")]
pub struct InvalidTag(pub String);

/// Why a register produced no values during a poll.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("Connection failed: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Read failed: {0}")]
    Read(#[from] ReadError),

    #[error("Decode failed: {0}")]
    Decode(#[from] DecodeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exceptions_keep_connection() {
        let exception = ReadError::Master(MasterError::Exception("IllegalDataAddress".into()));
        let transport = ReadError::Master(MasterError::Transport(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "broken pipe",
        )));

        assert!(!exception.breaks_connection());
        assert!(transport.breaks_connection());
        assert!(ReadError::Timeout(Duration::from_millis(10)).breaks_connection());
        assert!(!ReadError::TooManyWords { requested: 200 }.breaks_connection());
    }

    #[test]
    fn test_messages() {
        let err = DecodeError::Inconsistent {
            expected: 4,
            actual: 3,
        };
        assert_eq!(err.to_string(), "Expected 4 words but received 3");

        let err = ConnectionError::UnsupportedFraming {
            framing: Framing::Ascii,
        };
        assert_eq!(err.to_string(), "ascii framing is not supported by this master");
    }
}
