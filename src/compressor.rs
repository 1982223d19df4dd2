//! The narrow compression interface the block codec layer depends on.
//!
//! [`compression`](crate::compression) already implements the concrete
//! framing (header, checksum, LZ4/ZSTD dispatch) against the `lz4` and
//! `zstd` crates directly. This module wraps that implementation behind a
//! [`Compressor`] trait so the codec layer names an interface rather than
//! those crates, and so an alternate compressor could be substituted without
//! touching block or stream code.

use crate::{
    compression,
    protocol::CompressionMethod,
    Result,
};
use bytes::Bytes;
use cityhash_rs::cityhash_102_128;

/// Produces and consumes compressed block frames.
///
/// Implementations are responsible for the full frame: content hash,
/// algorithm byte, size header, and payload (see
/// [`compression`](crate::compression) for the exact layout). They are not
/// just thin codec wrappers — `compress` returns a self-describing frame and
/// `decompress` accepts one.
pub trait Compressor: Send + Sync {
    /// Frame `data` using `method`, returning the full checksum+header+payload block.
    fn compress(&self, method: CompressionMethod, data: &[u8]) -> Result<Bytes>;

    /// Parse a framed block, verify its content hash, and return the
    /// decompressed payload.
    fn decompress(&self, framed: &[u8]) -> Result<Bytes>;

    /// CityHash128 of arbitrary bytes, exposed so callers that build their
    /// own frames (tests, the streaming reassembler) can use the same hash
    /// the wire format requires.
    fn city_hash128(&self, data: &[u8]) -> u128 {
        cityhash_102_128(data)
    }
}

/// Default [`Compressor`] backed directly by the `lz4` and `zstd` crates,
/// matching the concrete framing in [`compression`](crate::compression).
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeCompressor;

impl Compressor for NativeCompressor {
    fn compress(&self, method: CompressionMethod, data: &[u8]) -> Result<Bytes> {
        compression::compress(method, data)
    }

    fn decompress(&self, framed: &[u8]) -> Result<Bytes> {
        compression::decompress(framed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_compressor_round_trips() {
        let compressor = NativeCompressor;
        let original = b"columnar analytic data, repeated for compressibility "
            .repeat(16);

        let framed = compressor
            .compress(CompressionMethod::Zstd, &original)
            .unwrap();
        let recovered = compressor.decompress(&framed).unwrap();

        assert_eq!(&recovered[..], &original[..]);
    }

    #[test]
    fn city_hash128_is_deterministic() {
        let compressor = NativeCompressor;
        assert_eq!(
            compressor.city_hash128(b"abc"),
            compressor.city_hash128(b"abc")
        );
        assert_ne!(compressor.city_hash128(b"abc"), compressor.city_hash128(b"abd"));
    }
}
