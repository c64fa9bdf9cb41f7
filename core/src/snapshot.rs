//! Shared `(key, value)` encoding for `saveSnapshot`/`restoreSnapshot` (`4.5`).
//!
//! Keys and values are plain JSON via `serde_json`: simple to reason about without a
//! compiler at hand, and every accumulator type this repository ships (`i64` sums and
//! counts) round-trips through it with no custom `Serialize` impl needed.

use serde::de::DeserializeOwned;
use serde::Serialize;
use weir_error::ProcessorError;

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ProcessorError> {
    serde_json::to_vec(value).map_err(ProcessorError::user_code_fault)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ProcessorError> {
    serde_json::from_slice(bytes).map_err(ProcessorError::user_code_fault)
}
