use serde::{Serialize, de::DeserializeOwned};

use crate::error::{Error, Result};

/// Wire format for published measurements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// JSON (human-readable).
    #[default]
    Json,

    /// CBOR (compact binary).
    Cbor,
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Format::Json => write!(f, "json"),
            Format::Cbor => write!(f, "cbor"),
        }
    }
}

/// Encode a value to bytes using the specified format.
pub fn encode<T: Serialize>(value: &T, format: Format) -> Result<Vec<u8>> {
    let failed = |reason: String| Error::Encode { format, reason };

    match format {
        Format::Json => serde_json::to_vec(value).map_err(|e| failed(e.to_string())),
        Format::Cbor => {
            let mut buf = Vec::new();
            ciborium::into_writer(value, &mut buf).map_err(|e| failed(e.to_string()))?;
            Ok(buf)
        }
    }
}

/// Decode bytes to a value using the specified format.
pub fn decode<T: DeserializeOwned>(data: &[u8], format: Format) -> Result<T> {
    let failed = |reason: String| Error::Decode { format, reason };

    match format {
        Format::Json => serde_json::from_slice(data).map_err(|e| failed(e.to_string())),
        Format::Cbor => ciborium::from_reader(data).map_err(|e| failed(e.to_string())),
    }
}
