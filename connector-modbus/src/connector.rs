//! Poll passes over a device's configured registers.

use tracing::{debug, error, info, warn};

use crate::config::DeviceConfig;
use crate::connection::{ConnectionManager, ConnectionState};
use crate::decoder::{DecodedValue, decode_register};
use crate::endianness::Endianness;
use crate::error::{ConnectionError, PollError};
use crate::master::{MasterFactory, TokioModbusFactory};
use crate::reader::RegisterReader;
use crate::register::{FunctionCode, Register};
use crate::tag::{Tag, TagWithData, tag_values};

/// Outcome of one poll pass.
#[derive(Debug, Default)]
pub struct PollReport {
    /// Values in register order, then element order.
    pub data: Vec<TagWithData>,
    /// Registers whose read failed or timed out.
    pub read_failures: usize,
    /// Registers whose words didn't match their layout.
    pub decode_failures: usize,
    /// Registers not attempted because the device was unreachable.
    pub skipped: usize,
    /// Set when the pass stopped early because no connection could be made.
    pub connection_error: Option<ConnectionError>,
}

impl PollReport {
    /// Returns `true` if every register was read and decoded.
    pub fn is_complete(&self) -> bool {
        self.read_failures == 0
            && self.decode_failures == 0
            && self.skipped == 0
            && self.connection_error.is_none()
    }
}

/// Pull connector for one Modbus device.
///
/// Owns the device connection; registers are read one after the other on
/// that connection, never concurrently.
pub struct ModbusConnector<F> {
    name: String,
    registers: Vec<Register>,
    endianness: Endianness,
    reader: RegisterReader,
    connection: ConnectionManager<F>,
}

impl ModbusConnector<TokioModbusFactory> {
    /// Build a connector for a configured device using `tokio-modbus`.
    pub fn from_config(device: &DeviceConfig) -> Self {
        Self::new(
            device,
            TokioModbusFactory::new(device.connector.timeout()),
        )
    }
}

impl<F: MasterFactory> ModbusConnector<F> {
    /// Build a connector for a configured device on top of `factory`.
    pub fn new(device: &DeviceConfig, factory: F) -> Self {
        Self {
            name: device.name.clone(),
            registers: device.registers.clone(),
            endianness: device.connector.endianness,
            reader: RegisterReader::new(device.connector.timeout()),
            connection: ConnectionManager::new(factory, device.connector.endpoint()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registers(&self) -> &[Register] {
        &self.registers
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Read, decode and tag every configured register.
    ///
    /// A failed register is logged and skipped. If the device can't be
    /// reached, the remaining registers of this pass are skipped.
    pub async fn poll(&mut self) -> PollReport {
        let mut report = PollReport::default();
        let Self {
            name,
            registers,
            endianness,
            reader,
            connection,
        } = self;

        for (position, register) in registers.iter().enumerate() {
            match read_values(connection, reader, *endianness, register).await {
                Ok(values) => {
                    for tagged in tag_values(register, values) {
                        info!(device = %name, tag = %tagged.tag, value = %tagged.value, "Decoded value");
                        report.data.push(tagged);
                    }
                }
                Err(PollError::Read(_)) => {
                    report.read_failures += 1;
                }
                Err(PollError::Decode(e)) => {
                    error!(
                        device = %name,
                        unit = register.unit,
                        address = register.starting_address,
                        data_type = register.data_type.as_str(),
                        error = %e,
                        "Register returned data inconsistent with its layout"
                    );
                    report.decode_failures += 1;
                }
                Err(PollError::Connection(e)) => {
                    report.skipped = registers.len() - position;
                    warn!(
                        device = %name,
                        skipped = report.skipped,
                        error = %e,
                        "Device unreachable, skipping remaining registers"
                    );
                    report.connection_error = Some(e);
                    break;
                }
            }
        }

        debug!(
            device = %name,
            values = report.data.len(),
            read_failures = report.read_failures,
            decode_failures = report.decode_failures,
            skipped = report.skipped,
            "Poll pass finished"
        );

        report
    }

    /// Read all registers and return the tagged values that could be decoded.
    pub async fn get_all_data(&mut self) -> Vec<TagWithData> {
        self.poll().await.data
    }

    /// Read the single value identified by `tag`.
    ///
    /// Returns `Ok(None)` if no configured register covers the tag.
    pub async fn get_data(&mut self, tag: &Tag) -> Result<Option<DecodedValue>, PollError> {
        let Some(register) = self
            .registers
            .iter()
            .find(|r| r.covers(tag.unit(), tag.address()))
        else {
            return Ok(None);
        };

        let index = (tag.address() - register.starting_address as u32) as usize;
        let values = read_values(&mut self.connection, &self.reader, self.endianness, register).await?;

        Ok(values.get(index).copied())
    }

    /// Close the device connection.
    pub async fn dispose(&mut self) {
        self.connection.dispose().await;
    }
}

async fn read_values<F: MasterFactory>(
    connection: &mut ConnectionManager<F>,
    reader: &RegisterReader,
    endianness: Endianness,
    register: &Register,
) -> Result<Vec<DecodedValue>, PollError> {
    let master = connection.ensure_connected().await?;

    let words = match reader.read(master, register).await {
        Ok(words) => words,
        Err(e) => {
            if e.breaks_connection() {
                connection.mark_faulted();
            }
            return Err(e.into());
        }
    };

    if register.function_code == FunctionCode::Unsupported {
        return Ok(Vec::new());
    }

    Ok(decode_register(register, &words, endianness)?)
}
