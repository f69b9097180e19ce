//! Path: crates/sim-types/src/calldata.rs
//! The contract runtime's self-describing calldata value: the common
//! currency of method arguments, return values, and constructor arguments.

use std::collections::BTreeMap;

use crate::address::Address;

/// A self-describing calldata value: one of primitive, byte-string, array,
/// map, or tagged address.
#[derive(Clone, Debug, PartialEq)]
pub enum CalldataValue {
    Null,
    Bool(bool),
    Int(i128),
    Str(String),
    Bytes(Vec<u8>),
    Address(Address),
    Array(Vec<CalldataValue>),
    Map(BTreeMap<String, CalldataValue>),
}

impl CalldataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[CalldataValue]> {
        match self {
            Self::Array(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, CalldataValue>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }
}

/// A decoded method invocation: `{method, args, kwargs}`. `method: None`
/// signals a constructor call.
#[derive(Clone, Debug, PartialEq)]
pub struct MethodCall {
    pub method: Option<String>,
    pub args: Vec<CalldataValue>,
    pub kwargs: BTreeMap<String, CalldataValue>,
}

/// The status byte prepended to a calldata-encoded call result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResultStatus {
    Success = 0x00,
    Rollback = 0x01,
}

impl ResultStatus {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(Self::Success),
            0x01 => Some(Self::Rollback),
            _ => None,
        }
    }
}
