//! Device byte and word ordering.

use serde::{Deserialize, Serialize};

/// Byte order of the two bytes inside one 16-bit register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Most significant byte first.
    MsbFirst,
    /// Least significant byte first.
    LsbFirst,
}

/// How a device lays out multi-byte values across its registers.
///
/// Named after the position of bytes `A` (most significant) to `D` (least
/// significant) of a 32-bit value as they appear on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endianness {
    /// `ABCD`: most significant word first, most significant byte first.
    #[default]
    #[serde(alias = "ABCD", alias = "abcd", alias = "big")]
    BigEndian,

    /// `DCBA`: least significant word first, least significant byte first.
    #[serde(alias = "DCBA", alias = "dcba", alias = "little")]
    LittleEndian,

    /// `CDAB`: least significant word first, bytes in network order.
    #[serde(alias = "CDAB", alias = "cdab", alias = "word_swap")]
    MidBigEndian,

    /// `BADC`: most significant word first, bytes swapped inside each word.
    #[serde(alias = "BADC", alias = "badc", alias = "byte_swap")]
    MidLittleEndian,
}

impl Endianness {
    /// Returns `true` if the device sends the least significant word first,
    /// so the words of multi-word elements must be swapped.
    pub fn should_swap_words(&self) -> bool {
        matches!(self, Endianness::LittleEndian | Endianness::MidBigEndian)
    }

    /// Byte order inside a single register.
    pub fn byte_order(&self) -> ByteOrder {
        match self {
            Endianness::BigEndian | Endianness::MidBigEndian => ByteOrder::MsbFirst,
            Endianness::LittleEndian | Endianness::MidLittleEndian => ByteOrder::LsbFirst,
        }
    }

    /// Vendor shorthand for this layout.
    pub fn notation(&self) -> &'static str {
        match self {
            Endianness::BigEndian => "ABCD",
            Endianness::LittleEndian => "DCBA",
            Endianness::MidBigEndian => "CDAB",
            Endianness::MidLittleEndian => "BADC",
        }
    }
}

impl std::fmt::Display for Endianness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.notation())
    }
}
