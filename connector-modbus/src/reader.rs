//! One read request per register descriptor.

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::ReadError;
use crate::master::ModbusMaster;
use crate::register::{FunctionCode, MAX_READ_WORDS, Register};

/// Issues register reads against a borrowed master.
#[derive(Debug, Clone)]
pub struct RegisterReader {
    timeout: Duration,
}

impl RegisterReader {
    /// Create a reader that gives up on a single read after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Read the raw words backing `register`.
    ///
    /// Requests `size × words_per_element` words. A register with an
    /// unsupported function code reads as no words at all.
    pub async fn read(
        &self,
        master: &mut dyn ModbusMaster,
        register: &Register,
    ) -> Result<Vec<u16>, ReadError> {
        let word_count = register.word_count();
        if word_count > MAX_READ_WORDS {
            return Err(ReadError::TooManyWords {
                requested: word_count,
            });
        }
        let count = word_count as u16;

        debug!(
            unit = register.unit,
            address = register.starting_address,
            size = register.size,
            data_type = register.data_type.as_str(),
            words = count,
            "Reading register"
        );

        let request = match register.function_code {
            FunctionCode::HoldingRegister => {
                master.read_holding_registers(register.unit, register.starting_address, count)
            }
            FunctionCode::InputRegister => {
                master.read_input_registers(register.unit, register.starting_address, count)
            }
            FunctionCode::Unsupported => {
                warn!(
                    unit = register.unit,
                    address = register.starting_address,
                    "Unsupported function code, register yields no data"
                );
                return Ok(Vec::new());
            }
        };

        let error = match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(words)) => return Ok(words),
            Ok(Err(e)) => ReadError::Master(e),
            Err(_) => ReadError::Timeout(self.timeout),
        };

        warn!(
            unit = register.unit,
            address = register.starting_address,
            size = register.size,
            data_type = register.data_type.as_str(),
            function_code = register.function_code.as_str(),
            error = %error,
            "Failed to read register"
        );

        Err(error)
    }
}
