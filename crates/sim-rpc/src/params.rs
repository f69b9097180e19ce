//! Path: crates/sim-rpc/src/params.rs
//! JSON-RPC `params` normalization: a request's `params` may arrive as a
//! positional array or a named object; every native method looks its
//! arguments up the same way regardless of which shape the caller used.

use serde_json::Value;

use crate::error::DispatchError;

/// A normalized view over `params`, offering both positional (by index) and
/// named (by key, for object-shaped params) lookup.
pub struct Params<'a> {
    array: Option<&'a [Value]>,
    object: Option<&'a serde_json::Map<String, Value>>,
}

impl<'a> Params<'a> {
    pub fn from_value(value: &'a Value) -> Self {
        match value {
            Value::Array(items) => Self { array: Some(items), object: None },
            Value::Object(map) => Self { array: None, object: Some(map) },
            Value::Null => Self { array: None, object: None },
            _ => Self { array: None, object: None },
        }
    }

    /// Looks up the `index`-th positional argument, falling back to `name`
    /// in an object-shaped `params`.
    pub fn get(&self, index: usize, name: &str) -> Option<&Value> {
        if let Some(array) = self.array {
            return array.get(index);
        }
        self.object.and_then(|map| map.get(name))
    }

    pub fn required<'b>(&'b self, index: usize, name: &str) -> Result<&'b Value, DispatchError>
    where
        'a: 'b,
    {
        self.get(index, name)
            .ok_or_else(|| DispatchError::InvalidParams(format!("missing required param {name:?}")))
    }

    pub fn required_str(&self, index: usize, name: &str) -> Result<String, DispatchError> {
        self.required(index, name)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| DispatchError::InvalidParams(format!("param {name:?} must be a string")))
    }

    pub fn required_u128(&self, index: usize, name: &str) -> Result<u128, DispatchError> {
        let value = self.required(index, name)?;
        value
            .as_u64()
            .map(u128::from)
            .or_else(|| value.as_str().and_then(|s| s.parse::<u128>().ok()))
            .ok_or_else(|| DispatchError::InvalidParams(format!("param {name:?} must be an integer")))
    }

    pub fn optional_u64(&self, index: usize, name: &str, default: u64) -> Result<u64, DispatchError> {
        match self.get(index, name) {
            None | Some(Value::Null) => Ok(default),
            Some(value) => value
                .as_u64()
                .ok_or_else(|| DispatchError::InvalidParams(format!("param {name:?} must be an integer"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn array_params_are_looked_up_by_index() {
        let value = json!(["0xabc", 42]);
        let params = Params::from_value(&value);
        assert_eq!(params.required_str(0, "address").unwrap(), "0xabc");
        assert_eq!(params.required_u128(1, "amount").unwrap(), 42);
    }

    #[test]
    fn object_params_are_looked_up_by_key() {
        let value = json!({"address": "0xabc", "amount": 42});
        let params = Params::from_value(&value);
        assert_eq!(params.required_str(0, "address").unwrap(), "0xabc");
        assert_eq!(params.required_u128(1, "amount").unwrap(), 42);
    }

    #[test]
    fn missing_required_param_is_invalid_params() {
        let value = json!({});
        let params = Params::from_value(&value);
        assert!(params.required_str(0, "address").is_err());
    }
}
