use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// MessagePack `nil`, stored when a package carries no metadata
pub const EMPTY: [u8; 1] = [0xc0];

/// Encodes user metadata, structs become maps keyed by field name
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    Ok(rmp_serde::to_vec_named(value)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(rmp_serde::from_slice(bytes)?)
}

/// Human readable form for listings and the extracted metadata file
pub fn render(bytes: &[u8]) -> String {
    match decode::<serde_json::Value>(bytes) {
        Ok(serde_json::Value::Null) => "none".to_string(),
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| hex::encode(bytes)),
        Err(_) => format!("<{} bytes> {}", bytes.len(), hex::encode(bytes)),
    }
}
