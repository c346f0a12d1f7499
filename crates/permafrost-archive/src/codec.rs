//! Injected object codecs.
//!
//! `add_object`/`get_object` only require a byte-codec contract: values go
//! in and out as UTF-8 bytes. [`JsonCodec`] is the stock implementation.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ArchiveError, Result};

/// Encodes and decodes values of `T` as UTF-8 bytes.
pub trait ObjectCodec<T> {
    /// Serialize `value` to bytes.
    ///
    /// # Errors
    ///
    /// [`ArchiveError::Codec`] when the value cannot be represented.
    fn encode(&self, value: &T) -> Result<Vec<u8>>;

    /// Deserialize a value from bytes.
    ///
    /// # Errors
    ///
    /// [`ArchiveError::Codec`] when the bytes do not parse.
    fn decode(&self, bytes: &[u8]) -> Result<T>;
}

/// JSON codec over serde.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<T> ObjectCodec<T> for JsonCodec
where
    T: Serialize + DeserializeOwned,
{
    fn encode(&self, value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| ArchiveError::Codec(e.to_string()))
    }

    fn decode(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| ArchiveError::Codec(e.to_string()))
    }
}
