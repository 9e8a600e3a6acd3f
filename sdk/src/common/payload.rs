//! Argument and result payloads
//!
//! User values cross the proxy as JSON text in `Bytes` properties. An absent
//! or empty payload decodes as `null`.

use crate::error::Result;
use serde_json::Value;

pub fn encode(value: &Value) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

pub fn decode(bytes: Option<Vec<u8>>) -> Result<Value> {
    match bytes {
        Some(bytes) if !bytes.is_empty() => Ok(serde_json::from_slice(&bytes)?),
        _ => Ok(Value::Null),
    }
}
