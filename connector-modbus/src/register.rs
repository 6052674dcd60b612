//! Register descriptors: what to read from a device.

use serde::{Deserialize, Serialize};

/// Maximum number of 16-bit registers a single Modbus read may request.
pub const MAX_READ_WORDS: usize = 125;

/// A configured block of registers read with one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Register {
    /// Modbus unit (slave) id.
    pub unit: u8,

    /// Address of the first element.
    pub starting_address: u16,

    /// Number of logical elements to read (not words, not bytes).
    #[serde(default = "default_size")]
    pub size: u16,

    /// How the words of each element are interpreted.
    #[serde(default)]
    pub data_type: DataType,

    /// Which register class to read.
    pub function_code: FunctionCode,
}

fn default_size() -> u16 {
    1
}

impl Register {
    /// Number of protocol words one read of this register must return.
    pub fn word_count(&self) -> usize {
        self.size as usize * self.data_type.words_per_element()
    }

    /// Address of the last element covered by this register.
    pub fn last_address(&self) -> u32 {
        self.starting_address as u32 + (self.size as u32).saturating_sub(1)
    }

    /// Returns `true` if `address` falls inside this register's element range.
    pub fn covers(&self, unit: u8, address: u32) -> bool {
        self.size > 0
            && self.unit == unit
            && address >= self.starting_address as u32
            && address <= self.last_address()
    }
}

/// Interpretation of the words backing one element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Signed 16-bit integer, one word (default).
    #[default]
    Int16,
    /// Signed 32-bit integer, two words.
    Int32,
    /// Unsigned 32-bit integer, two words.
    Uint32,
    /// IEEE-754 single precision float, two words.
    #[serde(alias = "float32", alias = "f32")]
    Float,
    /// Any type name the decoder does not understand; read as one word per
    /// element and reported as unsupported.
    #[serde(other)]
    Unsupported,
}

impl DataType {
    /// Number of 16-bit words per element.
    pub fn words_per_element(&self) -> usize {
        match self {
            DataType::Int32 | DataType::Uint32 | DataType::Float => 2,
            DataType::Int16 | DataType::Unsupported => 1,
        }
    }

    /// Number of bytes per element.
    pub fn bytes_per_element(&self) -> usize {
        self.words_per_element() * 2
    }

    /// Return the string name for this data type.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Int16 => "int16",
            DataType::Int32 => "int32",
            DataType::Uint32 => "uint32",
            DataType::Float => "float",
            DataType::Unsupported => "unsupported",
        }
    }
}

/// Modbus read operation used for a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionCode {
    /// Holding registers (function 0x03).
    #[serde(alias = "holding")]
    HoldingRegister,
    /// Input registers (function 0x04).
    #[serde(alias = "input")]
    InputRegister,
    /// Any function code this connector does not read; yields no data.
    #[serde(other)]
    Unsupported,
}

impl FunctionCode {
    /// Return the string name for this function code.
    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionCode::HoldingRegister => "holding_register",
            FunctionCode::InputRegister => "input_register",
            FunctionCode::Unsupported => "unsupported",
        }
    }
}
