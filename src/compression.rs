//! Value compression codecs.
//!
//! Stored values can be transparently compressed by the storage engine.
//! Payloads are tagged with the algorithm that produced them, so decoding
//! never has to guess, and a codec failure on the write path falls back to
//! storing the bytes uncompressed.

use crate::error::{Error, Result};

// =============================================================================
// Compression Algorithm
// =============================================================================

/// Supported compression algorithms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CompressionAlgorithm {
    /// No compression
    #[default]
    None,
    /// LZ4 block compression
    Lz4,
}

impl CompressionAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            CompressionAlgorithm::None => "none",
            CompressionAlgorithm::Lz4 => "lz4",
        }
    }

    fn tag(&self) -> u8 {
        match self {
            CompressionAlgorithm::None => 0,
            CompressionAlgorithm::Lz4 => 1,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(CompressionAlgorithm::None),
            1 => Some(CompressionAlgorithm::Lz4),
            _ => None,
        }
    }
}

impl std::str::FromStr for CompressionAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(CompressionAlgorithm::None),
            "lz4" => Ok(CompressionAlgorithm::Lz4),
            other => Err(Error::InvalidArgument(format!(
                "unknown compression algorithm: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// Compressor Trait
// =============================================================================

/// Trait for compression implementations.
pub trait Compressor: Send + Sync {
    fn algorithm(&self) -> CompressionAlgorithm;

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Pass-through compressor.
pub struct NoopCompressor;

impl Compressor for NoopCompressor {
    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::None
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// LZ4 block compressor.
pub struct Lz4Compressor {
    level: i32,
}

impl Lz4Compressor {
    pub fn new() -> Self {
        Self { level: 4 }
    }

    pub fn with_level(level: i32) -> Self {
        Self { level }
    }
}

impl Default for Lz4Compressor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compressor for Lz4Compressor {
    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::Lz4
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        lz4::block::compress(
            data,
            Some(lz4::block::CompressionMode::HIGHCOMPRESSION(self.level)),
            true,
        )
        .map_err(|err| Error::CompressionFailed {
            algorithm: self.algorithm().name().to_string(),
            reason: err.to_string(),
        })
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        lz4::block::decompress(data, None).map_err(|err| Error::DecompressionFailed {
            algorithm: self.algorithm().name().to_string(),
            reason: err.to_string(),
        })
    }
}

// =============================================================================
// Compression Manager
// =============================================================================

/// Configuration for transparent value compression.
#[derive(Debug, Clone)]
pub struct CompressionConfig {
    /// Algorithm applied to values at or above the size threshold.
    pub algorithm: CompressionAlgorithm,
    /// Values smaller than this are stored uncompressed.
    pub min_size_bytes: usize,
    /// Algorithm-specific level.
    pub level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            algorithm: CompressionAlgorithm::None,
            min_size_bytes: 1024,
            level: 4,
        }
    }
}

/// Applies the configured codec with a size threshold and a fallback to
/// uncompressed storage when the codec fails.
pub struct CompressionManager {
    config: CompressionConfig,
    lz4: Lz4Compressor,
}

impl CompressionManager {
    pub fn new(config: CompressionConfig) -> Self {
        let lz4 = Lz4Compressor::with_level(config.level);
        Self { config, lz4 }
    }

    fn compressor(&self, algorithm: CompressionAlgorithm) -> &dyn Compressor {
        match algorithm {
            CompressionAlgorithm::None => &NoopCompressor,
            CompressionAlgorithm::Lz4 => &self.lz4,
        }
    }

    /// Encode a value for storage: a one-byte algorithm tag followed by the
    /// (possibly compressed) payload.
    pub fn encode(&self, data: &[u8]) -> Vec<u8> {
        let algorithm = if data.len() < self.config.min_size_bytes {
            CompressionAlgorithm::None
        } else {
            self.config.algorithm
        };

        match self.compressor(algorithm).compress(data) {
            Ok(payload) => {
                let mut out = Vec::with_capacity(payload.len() + 1);
                out.push(algorithm.tag());
                out.extend_from_slice(&payload);
                out
            }
            Err(err) => {
                tracing::warn!(algorithm = %algorithm, error = %err,
                    "compression failed, storing uncompressed");
                let mut out = Vec::with_capacity(data.len() + 1);
                out.push(CompressionAlgorithm::None.tag());
                out.extend_from_slice(data);
                out
            }
        }
    }

    /// Decode a stored value back into its original bytes.
    pub fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        let (tag, payload) = data
            .split_first()
            .ok_or_else(|| Error::Decode("empty stored value".to_string()))?;
        let algorithm = CompressionAlgorithm::from_tag(*tag)
            .ok_or_else(|| Error::Decode(format!("unknown compression tag {tag}")))?;
        self.compressor(algorithm).decompress(payload)
    }
}

// =============================================================================
// Tests
// =============================================================================
