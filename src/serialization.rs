/// Serialization format options for persisted engine state.
///
/// Each format has both compressed (Lz4) and uncompressed variants.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SerializationFormat {
    /// JSON format - human readable, larger size, widest compatibility
    Json,
    /// JSON format with LZ4 compression
    JsonLz4,
    /// Bincode format - compact binary
    Bincode,
    /// Bincode format with LZ4 compression (default, best balance of size and speed)
    #[default]
    BincodeLz4,
}

impl SerializationFormat {
    /// Returns true if this format uses LZ4 compression
    pub fn is_compressed(&self) -> bool {
        matches!(self, SerializationFormat::JsonLz4 | SerializationFormat::BincodeLz4)
    }
}

use std::io::{Read, Write};

use crate::{errors::{CombiError, Result}, state::EngineState};
use serde::{de::DeserializeOwned, Serialize};

fn serialize_serde<T: Serialize>(data: &T, format: SerializationFormat) -> Result<Vec<u8>> {
    match format {
        SerializationFormat::Json | SerializationFormat::JsonLz4 => {
            serde_json::to_vec(data).map_err(|_| CombiError::SerializationFailed)
        }
        SerializationFormat::Bincode | SerializationFormat::BincodeLz4 => {
            bincode::serde::encode_to_vec(data, bincode::config::standard()).map_err(|_| CombiError::SerializationFailed)
        }
    }
}

fn deserialize_serde<T: DeserializeOwned>(data: &[u8], format: SerializationFormat) -> Result<T> {
    match format {
        SerializationFormat::Json | SerializationFormat::JsonLz4 => {
            serde_json::from_slice(data).map_err(|_| CombiError::DeserializationFailed)
        }
        SerializationFormat::Bincode | SerializationFormat::BincodeLz4 => {
            bincode::serde::decode_from_slice(data, bincode::config::standard())
                .map(|(value, _)| value)
                .map_err(|_| CombiError::DeserializationFailed)
        }
    }
}

/// Serialize data to bytes using the specified format.
/// Applies LZ4 compression if the format variant ends with Lz4.
pub fn serialize<T: Serialize>(data: &T, format: SerializationFormat) -> Result<Vec<u8>> {
    let bytes = serialize_serde(data, format)?;
    if format.is_compressed() {
        Ok(lz4_flex::compress_prepend_size(&bytes))
    } else {
        Ok(bytes)
    }
}

/// Deserialize data from bytes using the specified format.
/// Applies LZ4 decompression if the format variant ends with Lz4.
pub fn deserialize<T: DeserializeOwned>(data: &[u8], format: SerializationFormat) -> Result<T> {
    if format.is_compressed() {
        let decompressed = lz4_flex::decompress_size_prepended(data)
            .map_err(|_| CombiError::LZ4DecompressionFailed)?;
        deserialize_serde(&decompressed, format)
    } else {
        deserialize_serde(data, format)
    }
}

/// Write an engine snapshot to `path`.
pub fn write_state(state: &EngineState, path: &str, format: SerializationFormat) -> Result<()> {
    let bytes = serialize(state, format)?;
    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    file.write_all(&bytes)?;
    file.flush()?;
    Ok(())
}

/// Read an engine snapshot written by [`write_state`].
pub fn read_state(path: &str, format: SerializationFormat) -> Result<EngineState> {
    let mut bytes = Vec::new();
    std::fs::File::open(path)?.read_to_end(&mut bytes)?;
    deserialize(&bytes, format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheEntry;

    #[derive(serde::Serialize, serde::Deserialize, Debug, PartialEq)]
    struct TestData {
        values: Vec<f64>,
        name: String,
    }

    #[test]
    fn test_all_formats() {
        let data = TestData {
            values: vec![1.0, 0.1, -3.5e-300],
            name: "test".to_string(),
        };
        for format in [SerializationFormat::Json, SerializationFormat::JsonLz4, SerializationFormat::Bincode, SerializationFormat::BincodeLz4] {
            let bytes = serialize(&data, format).unwrap();
            let result: TestData = deserialize(&bytes, format).unwrap();
            assert_eq!(data, result);
        }
    }

    #[test]
    fn test_corrupt_input() {
        let result: Result<TestData> = deserialize(&[1, 2, 3], SerializationFormat::BincodeLz4);
        assert_eq!(result.unwrap_err(), CombiError::LZ4DecompressionFailed);
        let result: Result<TestData> = deserialize(b"{", SerializationFormat::Json);
        assert_eq!(result.unwrap_err(), CombiError::DeserializationFailed);
    }

    #[test]
    fn test_state_file() {
        let state = EngineState {
            config: crate::config::CombiConfig::default(),
            num_outputs: 2,
            active: [(vec![0], 1)].into_iter().collect(),
            cache: vec![CacheEntry { point: vec![0.5], value: vec![1.0, -1.0] }],
            cache_hits: 3,
            cache_misses: 1,
            iterations: 0,
            rejected: Vec::new(),
        };
        let path = std::env::temp_dir().join("sgcombi_state_file_test.bin");
        let path = path.to_string_lossy();
        write_state(&state, &path, SerializationFormat::BincodeLz4).unwrap();
        assert_eq!(read_state(&path, SerializationFormat::BincodeLz4).unwrap(), state);
        std::fs::remove_file(path.as_ref()).unwrap();
        assert!(matches!(read_state(&path, SerializationFormat::Json), Err(CombiError::FileIOError(_))));
    }
}
