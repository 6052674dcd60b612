//! Tags identifying decoded values.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::decoder::DecodedValue;
use crate::error::InvalidTag;
use crate::register::Register;

/// Identifier of one element on a device, rendered as `"{unit}:{address}"`.
///
/// The address is kept wider than a Modbus address so a register ending at
/// the top of the address space can't wrap around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag {
    unit: u8,
    address: u32,
}

impl Tag {
    /// Create a tag for `unit` and `address`.
    pub fn new(unit: u8, address: u32) -> Self {
        Self { unit, address }
    }

    pub fn unit(&self) -> u8 {
        self.unit
    }

    pub fn address(&self) -> u32 {
        self.address
    }

    /// Key expression path segment for this tag (`"{unit}/{address}"`).
    pub fn key_path(&self) -> String {
        format!("{}/{}", self.unit, self.address)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.unit, self.address)
    }
}

impl FromStr for Tag {
    type Err = InvalidTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidTag(s.to_string());
        let (unit, address) = s.split_once(':').ok_or_else(invalid)?;
        let unit = unit.trim().parse().map_err(|_| invalid())?;
        let address = address.trim().parse().map_err(|_| invalid())?;
        Ok(Tag::new(unit, address))
    }
}

impl Serialize for Tag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Tag of element `element_index` (0-based) of `register`.
///
/// Addresses advance by one per element whatever the element's word width.
pub fn tag_for(register: &Register, element_index: usize) -> Tag {
    Tag::new(
        register.unit,
        register.starting_address as u32 + element_index as u32,
    )
}

/// A decoded value with its tag; the unit of output of a poll pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TagWithData {
    pub tag: Tag,
    pub value: DecodedValue,
}

impl TagWithData {
    pub fn new(tag: Tag, value: DecodedValue) -> Self {
        Self { tag, value }
    }
}

/// Attach tags to the decoded values of `register`, in element order.
pub fn tag_values(register: &Register, values: Vec<DecodedValue>) -> Vec<TagWithData> {
    values
        .into_iter()
        .enumerate()
        .map(|(index, value)| TagWithData::new(tag_for(register, index), value))
        .collect()
}
