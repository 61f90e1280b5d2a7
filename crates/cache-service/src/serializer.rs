//! Value serialization: structural encode/decode plus optional gzip.
//!
//! Values are encoded as JSON (a structured text format that preserves
//! scalar types, maps, and arrays across the wire). When compression is
//! enabled and the encoded payload reaches the size threshold, the payload
//! is gzipped and prefixed with the sentinel byte `0x1F`; a leading `0x1F`
//! on read triggers decompression, its absence means the remainder decodes
//! directly.

use crate::error::{CacheError, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{Read, Write};

/// Sentinel byte marking a gzip-compressed payload.
pub const GZIP_SENTINEL: u8 = 0x1F;

/// Payloads at or above this size are eligible for compression.
pub const COMPRESSION_THRESHOLD_BYTES: usize = 1_024;

/// Serializer configuration.
#[derive(Debug, Clone, Copy)]
pub struct SerializerConfig {
    pub enable_compression: bool,
    pub compression_level: u32,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            enable_compression: true,
            compression_level: 6,
        }
    }
}

impl SerializerConfig {
    /// Override the gzip level (clamped to the valid 1–9 range).
    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level.clamp(1, 9);
        self
    }

    /// Toggle compression entirely.
    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.enable_compression = enabled;
        self
    }
}

/// Encodes values to the wire format described above and back.
#[derive(Debug, Clone, Default)]
pub struct Serializer {
    config: SerializerConfig,
}

impl Serializer {
    pub fn new(config: SerializerConfig) -> Self {
        Self { config }
    }

    /// Encode `value` for storage. Rejects a value that serializes to JSON
    /// `null` — absence is represented by the key simply not existing.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let json = serde_json::to_value(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        if json.is_null() {
            return Err(CacheError::NilValue {
                reason: "cannot store a nil value".into(),
            });
        }
        let bytes = serde_json::to_vec(&json).map_err(|e| CacheError::Serialization(e.to_string()))?;

        if self.config.enable_compression && bytes.len() >= COMPRESSION_THRESHOLD_BYTES {
            let compressed = gzip_compress(&bytes, self.config.compression_level)?;
            let mut framed = Vec::with_capacity(compressed.len() + 1);
            framed.push(GZIP_SENTINEL);
            framed.extend_from_slice(&compressed);
            Ok(framed)
        } else {
            Ok(bytes)
        }
    }

    /// Decode bytes previously produced by [`Self::encode`]. Rejects an
    /// empty payload — the caller should check for absence before decoding.
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        let (sentinel, rest) = bytes.split_first().ok_or_else(|| CacheError::NilValue {
            reason: "cannot decode an empty payload".into(),
        })?;

        let json_bytes = if *sentinel == GZIP_SENTINEL {
            gzip_decompress(rest)?
        } else {
            bytes.to_vec()
        };

        serde_json::from_slice(&json_bytes).map_err(|e| CacheError::Serialization(e.to_string()))
    }
}

fn gzip_compress(bytes: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(level));
    encoder
        .write_all(bytes)
        .map_err(|e| CacheError::Serialization(e.to_string()))?;
    encoder.finish().map_err(|e| CacheError::Serialization(e.to_string()))
}

fn gzip_decompress(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| CacheError::Serialization(e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn small_value_round_trips_uncompressed() {
        let ser = Serializer::new(SerializerConfig::default());
        let encoded = ser.encode(&json!({"a": 1})).unwrap();
        assert_ne!(encoded.first(), Some(&GZIP_SENTINEL));
        let decoded: serde_json::Value = ser.decode(&encoded).unwrap();
        assert_eq!(decoded, json!({"a": 1}));
    }

    #[test]
    fn large_value_is_compressed_and_round_trips() {
        let ser = Serializer::new(SerializerConfig::default());
        let big = json!({"data": "x".repeat(COMPRESSION_THRESHOLD_BYTES * 2)});
        let encoded = ser.encode(&big).unwrap();
        assert_eq!(encoded.first(), Some(&GZIP_SENTINEL));
        let decoded: serde_json::Value = ser.decode(&encoded).unwrap();
        assert_eq!(decoded, big);
    }

    #[test]
    fn compression_disabled_never_compresses() {
        let ser = Serializer::new(SerializerConfig::default().with_compression(false));
        let big = json!({"data": "x".repeat(COMPRESSION_THRESHOLD_BYTES * 2)});
        let encoded = ser.encode(&big).unwrap();
        assert_ne!(encoded.first(), Some(&GZIP_SENTINEL));
    }

    #[test]
    fn nil_value_rejected_on_write() {
        let ser = Serializer::new(SerializerConfig::default());
        let err = ser.encode(&serde_json::Value::Null).unwrap_err();
        assert!(matches!(err, CacheError::NilValue { .. }));
    }

    #[test]
    fn empty_payload_rejected_on_read() {
        let ser = Serializer::new(SerializerConfig::default());
        let err = ser.decode::<serde_json::Value>(&[]).unwrap_err();
        assert!(matches!(err, CacheError::NilValue { .. }));
    }
}
