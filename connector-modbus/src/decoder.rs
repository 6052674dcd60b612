//! Register word decoding.
//!
//! Decoding runs in two steps:
//!
//! 1. [`decode`] expands words into a byte stream in network order, fixing
//!    the byte order inside each word and the word order inside each element.
//! 2. [`to_typed_values`] slices that stream into elements of the data type's
//!    width and parses each one big-endian.

use serde::Serialize;

use crate::endianness::{ByteOrder, Endianness};
use crate::error::DecodeError;
use crate::register::{DataType, Register};

/// One decoded element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DecodedValue {
    Int16(i16),
    Int32(i32),
    UInt32(u32),
    Float32(f32),
    /// Element of a data type the decoder does not handle. Carries no
    /// reading; [`DecodedValue::payload`] reports it as zero.
    Unsupported,
}

impl DecodedValue {
    /// Numeric payload of this value; zero for [`DecodedValue::Unsupported`].
    pub fn payload(&self) -> f64 {
        match self {
            DecodedValue::Int16(v) => f64::from(*v),
            DecodedValue::Int32(v) => f64::from(*v),
            DecodedValue::UInt32(v) => f64::from(*v),
            DecodedValue::Float32(v) => f64::from(*v),
            DecodedValue::Unsupported => 0.0,
        }
    }

    /// Returns `true` for values of an unsupported data type.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, DecodedValue::Unsupported)
    }

    /// Name of the data type this value was decoded as.
    pub fn type_name(&self) -> &'static str {
        match self {
            DecodedValue::Int16(_) => DataType::Int16.as_str(),
            DecodedValue::Int32(_) => DataType::Int32.as_str(),
            DecodedValue::UInt32(_) => DataType::Uint32.as_str(),
            DecodedValue::Float32(_) => DataType::Float.as_str(),
            DecodedValue::Unsupported => DataType::Unsupported.as_str(),
        }
    }
}

impl std::fmt::Display for DecodedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodedValue::Int16(v) => write!(f, "{}", v),
            DecodedValue::Int32(v) => write!(f, "{}", v),
            DecodedValue::UInt32(v) => write!(f, "{}", v),
            DecodedValue::Float32(v) => write!(f, "{}", v),
            DecodedValue::Unsupported => write!(f, "0 (unsupported)"),
        }
    }
}

/// Expand words into bytes, two per word, in the given in-word byte order.
pub fn words_to_bytes(words: &[u16], byte_order: ByteOrder) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(words.len() * 2);
    for word in words {
        match byte_order {
            ByteOrder::MsbFirst => bytes.extend_from_slice(&word.to_be_bytes()),
            // The device stored the low byte in the high half of the register.
            ByteOrder::LsbFirst => bytes.extend_from_slice(&word.to_le_bytes()),
        }
    }
    bytes
}

/// Reverse the order of the 16-bit words inside every `element_width`-byte
/// element. Elements are never split; a trailing partial element is left as is.
pub fn swap_words(bytes: &mut [u8], element_width: usize) {
    if element_width < 4 {
        return;
    }

    for element in bytes.chunks_exact_mut(element_width) {
        let words = element.len() / 2;
        for i in 0..words / 2 {
            let j = words - 1 - i;
            element.swap(i * 2, j * 2);
            element.swap(i * 2 + 1, j * 2 + 1);
        }
    }
}

/// Convert raw words into a network-order byte stream for `data_type`.
pub fn decode(
    words: &[u16],
    data_type: DataType,
    endianness: Endianness,
) -> Result<Vec<u8>, DecodeError> {
    let width = data_type.bytes_per_element();
    if words.len() % data_type.words_per_element() != 0 {
        return Err(DecodeError::PartialElement {
            len: words.len() * 2,
            width,
        });
    }

    let mut bytes = words_to_bytes(words, endianness.byte_order());
    if endianness.should_swap_words() {
        swap_words(&mut bytes, width);
    }

    Ok(bytes)
}

/// Slice a network-order byte stream into typed values.
pub fn to_typed_values(bytes: &[u8], data_type: DataType) -> Result<Vec<DecodedValue>, DecodeError> {
    let width = data_type.bytes_per_element();
    let chunks = bytes.chunks_exact(width);
    if !chunks.remainder().is_empty() {
        return Err(DecodeError::PartialElement {
            len: bytes.len(),
            width,
        });
    }

    Ok(chunks
        .map(|c| match data_type {
            DataType::Int16 => DecodedValue::Int16(i16::from_be_bytes([c[0], c[1]])),
            DataType::Int32 => DecodedValue::Int32(i32::from_be_bytes([c[0], c[1], c[2], c[3]])),
            DataType::Uint32 => DecodedValue::UInt32(u32::from_be_bytes([c[0], c[1], c[2], c[3]])),
            DataType::Float => DecodedValue::Float32(f32::from_be_bytes([c[0], c[1], c[2], c[3]])),
            DataType::Unsupported => DecodedValue::Unsupported,
        })
        .collect())
}

/// Decode the words returned for `register`.
///
/// Fails with [`DecodeError::Inconsistent`] unless exactly
/// `size × words_per_element` words were returned.
pub fn decode_register(
    register: &Register,
    words: &[u16],
    endianness: Endianness,
) -> Result<Vec<DecodedValue>, DecodeError> {
    let expected = register.word_count();
    if words.len() != expected {
        return Err(DecodeError::Inconsistent {
            expected,
            actual: words.len(),
        });
    }

    let bytes = decode(words, register.data_type, endianness)?;
    to_typed_values(&bytes, register.data_type)
}
