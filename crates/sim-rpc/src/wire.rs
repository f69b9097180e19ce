//! Path: crates/sim-rpc/src/wire.rs
//! Conversions between the JSON-RPC wire format and the Sim's internal
//! types: `CalldataValue` <-> `serde_json::Value`, and the handful of
//! object-or-array `params` shapes (§6.1) the native methods accept.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use sim_types::{Address, CalldataValue, Hash32};

use crate::error::DispatchError;

/// Converts a request argument into a `CalldataValue`. Numbers are decoded
/// as `i128`; anything wider is rejected rather than silently truncated.
pub fn json_to_calldata(value: &Value) -> Result<CalldataValue, DispatchError> {
    Ok(match value {
        Value::Null => CalldataValue::Null,
        Value::Bool(b) => CalldataValue::Bool(*b),
        Value::Number(n) => {
            let i = n
                .as_i64()
                .map(i128::from)
                .or_else(|| n.as_u64().map(i128::from))
                .ok_or_else(|| DispatchError::InvalidParams(format!("number {n} is not an integer")))?;
            CalldataValue::Int(i)
        }
        Value::String(s) => CalldataValue::Str(s.clone()),
        Value::Array(items) => {
            let values = items.iter().map(json_to_calldata).collect::<Result<Vec<_>, _>>()?;
            CalldataValue::Array(values)
        }
        Value::Object(map) => {
            let mut out = BTreeMap::new();
            for (key, value) in map {
                out.insert(key.clone(), json_to_calldata(value)?);
            }
            CalldataValue::Map(out)
        }
    })
}

/// Converts a JSON array of arguments into a `Vec<CalldataValue>`, or a
/// single value into a one-element vector. Missing/null yields an empty
/// vector.
pub fn json_to_calldata_args(value: Option<&Value>) -> Result<Vec<CalldataValue>, DispatchError> {
    match value {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items.iter().map(json_to_calldata).collect(),
        Some(other) => Ok(vec![json_to_calldata(other)?]),
    }
}

/// Converts a JSON object of keyword arguments into a `BTreeMap`.
pub fn json_to_calldata_kwargs(
    value: Option<&Value>,
) -> Result<BTreeMap<String, CalldataValue>, DispatchError> {
    match value {
        None | Some(Value::Null) => Ok(BTreeMap::new()),
        Some(Value::Object(map)) => {
            let mut out = BTreeMap::new();
            for (key, value) in map {
                out.insert(key.clone(), json_to_calldata(value)?);
            }
            Ok(out)
        }
        Some(_) => Err(DispatchError::InvalidParams("kwargs must be an object".to_string())),
    }
}

/// The reverse of `json_to_calldata`: renders a contract return value back
/// onto the wire. Addresses and byte strings become `0x`-prefixed hex, as
/// every other address/hash field on this surface does.
pub fn calldata_to_json(value: &CalldataValue) -> Value {
    match value {
        CalldataValue::Null => Value::Null,
        CalldataValue::Bool(b) => Value::Bool(*b),
        CalldataValue::Int(i) => match i64::try_from(*i) {
            Ok(small) => Value::Number(small.into()),
            Err(_) => Value::String(i.to_string()),
        },
        CalldataValue::Str(s) => Value::String(s.clone()),
        CalldataValue::Bytes(b) => Value::String(format!("0x{}", hex::encode(b))),
        CalldataValue::Address(a) => Value::String(a.to_hex()),
        CalldataValue::Array(items) => Value::Array(items.iter().map(calldata_to_json).collect()),
        CalldataValue::Map(map) => {
            let mut out = Map::new();
            for (key, value) in map {
                out.insert(key.clone(), calldata_to_json(value));
            }
            Value::Object(out)
        }
    }
}

/// Unwraps the "one request object" shape every native submission/read
/// method takes, tolerating the plain object, a one-element array holding
/// it, or a JSON-RPC `params` array-of-one-array-of-one-object nesting
/// (`gen_call`'s `[{...}]` single positional argument).
pub fn request_object(params: &Value) -> Result<&Map<String, Value>, DispatchError> {
    fn unwrap(value: &Value, depth: u8) -> Option<&Map<String, Value>> {
        match value {
            Value::Object(map) => Some(map),
            Value::Array(items) if depth > 0 => items.first().and_then(|v| unwrap(v, depth - 1)),
            _ => None,
        }
    }
    unwrap(params, 3).ok_or_else(|| DispatchError::InvalidParams("expected a request object".to_string()))
}

pub fn required_str<'a>(obj: &'a Map<String, Value>, field: &str) -> Result<&'a str, DispatchError> {
    obj.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| DispatchError::InvalidParams(format!("missing required field {field:?}")))
}

pub fn optional_str<'a>(obj: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    obj.get(field).and_then(Value::as_str)
}

pub fn required_address(obj: &Map<String, Value>, field: &str) -> Result<Address, DispatchError> {
    Address::parse_hex(required_str(obj, field)?)
        .map_err(|e| DispatchError::InvalidParams(format!("invalid address in {field:?}: {e}")))
}

pub fn optional_address(
    obj: &Map<String, Value>,
    field: &str,
    default: Address,
) -> Result<Address, DispatchError> {
    match optional_str(obj, field) {
        None => Ok(default),
        Some(s) => Address::parse_hex(s)
            .map_err(|e| DispatchError::InvalidParams(format!("invalid address in {field:?}: {e}"))),
    }
}

pub fn parse_hash(s: &str) -> Result<Hash32, DispatchError> {
    Hash32::parse_hex(s).map_err(|e| DispatchError::InvalidParams(format!("invalid hash: {e}")))
}

/// Renders an unsigned integer as a `0x`-prefixed hex string, the shape
/// every production-compatible quantity field uses.
pub fn hex_quantity(value: u128) -> String {
    format!("0x{value:x}")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn roundtrips_scalars_and_collections_through_calldata() {
        let value = json!({"a": 1, "b": [true, null, "x"]});
        let calldata = json_to_calldata(&value).unwrap();
        assert_eq!(calldata_to_json(&calldata), value);
    }

    #[test]
    fn request_object_unwraps_nested_array_shapes() {
        let plain = json!({"to": "0xabc"});
        assert_eq!(request_object(&plain).unwrap().get("to").unwrap(), "0xabc");

        let one_level = json!([{"to": "0xabc"}]);
        assert_eq!(request_object(&one_level).unwrap().get("to").unwrap(), "0xabc");

        let two_levels = json!([[{"to": "0xabc"}]]);
        assert_eq!(request_object(&two_levels).unwrap().get("to").unwrap(), "0xabc");
    }

    #[test]
    fn hex_quantity_formats_without_leading_zeros_padding() {
        assert_eq!(hex_quantity(0), "0x0");
        assert_eq!(hex_quantity(255), "0xff");
    }
}
