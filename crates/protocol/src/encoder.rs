//! Payload encoders.  JSON is the interoperable default for tool
//! arguments and results; bincode is used where both ends share the exact
//! Rust type definitions (hub frames).

use serde::de::DeserializeOwned;
use serde::Serialize;
use tm_domain::{Error, Result};

/// Serialize/deserialize values of type `T` to and from bytes.
pub trait Encoder<T>: Send + Sync {
    fn encode(&self, value: &T) -> Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> Result<T>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder;

impl<T: Serialize + DeserializeOwned> Encoder<T> for JsonEncoder {
    fn encode(&self, value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| Error::Encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| Error::Decode(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeEncoder;

impl<T: Serialize + DeserializeOwned> Encoder<T> for BincodeEncoder {
    fn encode(&self, value: &T) -> Result<Vec<u8>> {
        bincode::serialize(value).map_err(|e| Error::Encode(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<T> {
        bincode::deserialize(bytes).map_err(|e| Error::Decode(e.to_string()))
    }
}
