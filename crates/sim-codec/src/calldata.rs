//! Path: crates/sim-codec/src/calldata.rs
//! The self-describing calldata blob format: a tagged encoding of
//! `CalldataValue` trees, used for method calls, constructor calls, return
//! values, and status-prefixed results. Lengths and signed integers are
//! ULEB128/zigzag-encoded, matching the wire shape produced by GenLayer's
//! SDK calldata codec.

use std::collections::BTreeMap;

use sim_types::{CalldataValue, MethodCall, ResultStatus};

use crate::error::CodecError;

const TAG_NULL: u8 = 0x00;
const TAG_FALSE: u8 = 0x01;
const TAG_TRUE: u8 = 0x02;
const TAG_INT: u8 = 0x03;
const TAG_STR: u8 = 0x04;
const TAG_BYTES: u8 = 0x05;
const TAG_ADDRESS: u8 = 0x06;
const TAG_ARRAY: u8 = 0x07;
const TAG_MAP: u8 = 0x08;

fn write_uleb128(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

fn read_uleb128(buf: &[u8], pos: &mut usize) -> Result<u64, CodecError> {
    let mut result: u64 = 0;
    let mut shift = 0u32;
    loop {
        let byte = *buf
            .get(*pos)
            .ok_or_else(|| CodecError::MalformedCalldata("truncated varint".to_string()))?;
        *pos += 1;
        result |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift >= 64 {
            return Err(CodecError::MalformedCalldata("varint too long".to_string()));
        }
    }
    Ok(result)
}

fn zigzag_encode(value: i128) -> u64 {
    ((value << 1) ^ (value >> 127)) as u64
}

fn zigzag_decode(value: u64) -> i128 {
    ((value >> 1) as i128) ^ -((value & 1) as i128)
}

fn take_bytes<'a>(buf: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8], CodecError> {
    let end = pos
        .checked_add(len)
        .ok_or_else(|| CodecError::MalformedCalldata("length overflow".to_string()))?;
    let slice = buf
        .get(*pos..end)
        .ok_or_else(|| CodecError::MalformedCalldata("truncated payload".to_string()))?;
    *pos = end;
    Ok(slice)
}

/// Encodes one self-describing calldata value.
pub fn encode_value(value: &CalldataValue, out: &mut Vec<u8>) {
    match value {
        CalldataValue::Null => out.push(TAG_NULL),
        CalldataValue::Bool(false) => out.push(TAG_FALSE),
        CalldataValue::Bool(true) => out.push(TAG_TRUE),
        CalldataValue::Int(i) => {
            out.push(TAG_INT);
            write_uleb128(out, zigzag_encode(*i));
        }
        CalldataValue::Str(s) => {
            out.push(TAG_STR);
            write_uleb128(out, s.len() as u64);
            out.extend_from_slice(s.as_bytes());
        }
        CalldataValue::Bytes(b) => {
            out.push(TAG_BYTES);
            write_uleb128(out, b.len() as u64);
            out.extend_from_slice(b);
        }
        CalldataValue::Address(a) => {
            out.push(TAG_ADDRESS);
            out.extend_from_slice(a.as_bytes());
        }
        CalldataValue::Array(items) => {
            out.push(TAG_ARRAY);
            write_uleb128(out, items.len() as u64);
            for item in items {
                encode_value(item, out);
            }
        }
        CalldataValue::Map(map) => {
            out.push(TAG_MAP);
            write_uleb128(out, map.len() as u64);
            for (key, val) in map {
                write_uleb128(out, key.len() as u64);
                out.extend_from_slice(key.as_bytes());
                encode_value(val, out);
            }
        }
    }
}

/// Decodes one self-describing calldata value, returning the value and the
/// number of bytes consumed.
pub fn decode_value(buf: &[u8]) -> Result<(CalldataValue, usize), CodecError> {
    let mut pos = 0usize;
    let value = decode_value_at(buf, &mut pos)?;
    Ok((value, pos))
}

fn decode_value_at(buf: &[u8], pos: &mut usize) -> Result<CalldataValue, CodecError> {
    let tag = *buf
        .get(*pos)
        .ok_or_else(|| CodecError::MalformedCalldata("empty calldata".to_string()))?;
    *pos += 1;
    match tag {
        TAG_NULL => Ok(CalldataValue::Null),
        TAG_FALSE => Ok(CalldataValue::Bool(false)),
        TAG_TRUE => Ok(CalldataValue::Bool(true)),
        TAG_INT => {
            let raw = read_uleb128(buf, pos)?;
            Ok(CalldataValue::Int(zigzag_decode(raw)))
        }
        TAG_STR => {
            let len = read_uleb128(buf, pos)? as usize;
            let bytes = take_bytes(buf, pos, len)?;
            let s = std::str::from_utf8(bytes)
                .map_err(|e| CodecError::MalformedCalldata(e.to_string()))?;
            Ok(CalldataValue::Str(s.to_string()))
        }
        TAG_BYTES => {
            let len = read_uleb128(buf, pos)? as usize;
            let bytes = take_bytes(buf, pos, len)?;
            Ok(CalldataValue::Bytes(bytes.to_vec()))
        }
        TAG_ADDRESS => {
            let bytes = take_bytes(buf, pos, 20)?;
            let addr = sim_types::Address::from_slice(bytes)
                .map_err(|e| CodecError::MalformedCalldata(e.to_string()))?;
            Ok(CalldataValue::Address(addr))
        }
        TAG_ARRAY => {
            let len = read_uleb128(buf, pos)? as usize;
            let mut items = Vec::with_capacity(len);
            for _ in 0..len {
                items.push(decode_value_at(buf, pos)?);
            }
            Ok(CalldataValue::Array(items))
        }
        TAG_MAP => {
            let len = read_uleb128(buf, pos)? as usize;
            let mut map = BTreeMap::new();
            for _ in 0..len {
                let key_len = read_uleb128(buf, pos)? as usize;
                let key_bytes = take_bytes(buf, pos, key_len)?;
                let key = std::str::from_utf8(key_bytes)
                    .map_err(|e| CodecError::MalformedCalldata(e.to_string()))?
                    .to_string();
                let val = decode_value_at(buf, pos)?;
                map.insert(key, val);
            }
            Ok(CalldataValue::Map(map))
        }
        other => Err(CodecError::MalformedCalldata(format!(
            "unknown calldata tag 0x{other:02x}"
        ))),
    }
}

/// Encodes a method call (or constructor call, when `call.method` is `None`)
/// as a calldata map with keys `method`, `args`, `kwargs`.
pub fn encode_method_call(call: &MethodCall) -> Vec<u8> {
    let method_value = match &call.method {
        Some(name) => CalldataValue::Str(name.clone()),
        None => CalldataValue::Null,
    };
    let args_value = CalldataValue::Array(call.args.clone());
    let kwargs_value = CalldataValue::Map(call.kwargs.clone());

    let mut map = BTreeMap::new();
    map.insert("method".to_string(), method_value);
    map.insert("args".to_string(), args_value);
    map.insert("kwargs".to_string(), kwargs_value);

    let mut out = Vec::new();
    encode_value(&CalldataValue::Map(map), &mut out);
    out
}

/// Decodes a method-call (or constructor-call) blob.
pub fn decode_method_call(buf: &[u8]) -> Result<MethodCall, CodecError> {
    let (value, _) = decode_value(buf)?;
    let map = match value {
        CalldataValue::Map(m) => m,
        other => {
            return Err(CodecError::MalformedCalldata(format!(
                "method call must be a map, got {other:?}"
            )))
        }
    };

    let method = match map.get("method") {
        Some(CalldataValue::Str(s)) => Some(s.clone()),
        Some(CalldataValue::Null) | None => None,
        Some(other) => {
            return Err(CodecError::MalformedCalldata(format!(
                "method field must be a string or null, got {other:?}"
            )))
        }
    };
    let args = match map.get("args") {
        Some(CalldataValue::Array(items)) => items.clone(),
        Some(other) => {
            return Err(CodecError::MalformedCalldata(format!(
                "args field must be an array, got {other:?}"
            )))
        }
        None => Vec::new(),
    };
    let kwargs = match map.get("kwargs") {
        Some(CalldataValue::Map(m)) => m.clone(),
        Some(other) => {
            return Err(CodecError::MalformedCalldata(format!(
                "kwargs field must be a map, got {other:?}"
            )))
        }
        None => BTreeMap::new(),
    };

    Ok(MethodCall { method, args, kwargs })
}

/// `0x00 || calldata-encoded value`.
pub fn encode_success_bytes(value: &CalldataValue) -> Vec<u8> {
    let mut out = vec![ResultStatus::Success.as_byte()];
    encode_value(value, &mut out);
    out
}

/// `0x01 || utf8(error message)`. Not calldata-encoded: the payload is the
/// raw error text.
pub fn encode_rollback_bytes(error_message: &str) -> Vec<u8> {
    let mut out = vec![ResultStatus::Rollback.as_byte()];
    out.extend_from_slice(error_message.as_bytes());
    out
}

/// Splits a status-prefixed result into its status and payload bytes.
pub fn decode_status_prefixed(buf: &[u8]) -> Result<(ResultStatus, &[u8]), CodecError> {
    let (&tag, rest) = buf
        .split_first()
        .ok_or_else(|| CodecError::MalformedCalldata("empty result bytes".to_string()))?;
    let status = ResultStatus::from_byte(tag)
        .ok_or_else(|| CodecError::MalformedCalldata(format!("unknown status byte 0x{tag:02x}")))?;
    Ok((status, rest))
}
