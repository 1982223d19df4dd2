//! Compressed-block framing: hash verification and reassembly from a
//! chunked byte stream via `CompressedStreamReader`.

use clickhouse_native_client::compression::{
    compress,
    decompress,
};
use clickhouse_native_client::io::compressed_stream::CompressedStreamReader;
use clickhouse_native_client::protocol::CompressionMethod;
use clickhouse_native_client::Error;
use bytes::Bytes;
use futures_util::stream;

#[test]
fn decompress_rejects_a_tampered_payload() {
    let payload = b"select * from system.numbers limit 10".repeat(5);
    let mut compressed = compress(CompressionMethod::Lz4, &payload).unwrap().to_vec();
    let last = compressed.len() - 1;
    compressed[last] ^= 0x01;

    let err = decompress(&compressed).unwrap_err();
    assert!(matches!(err, Error::HashMismatch { .. }));
}

#[test]
fn decompress_round_trips_each_supported_method() {
    let payload = b"clickhouse native protocol payload".repeat(8);
    for method in [CompressionMethod::None, CompressionMethod::Lz4, CompressionMethod::Zstd] {
        let compressed = compress(method, &payload).unwrap();
        let decompressed = decompress(&compressed).unwrap();
        assert_eq!(&decompressed[..], &payload[..], "method {:?} round trip", method);
    }
}

#[tokio::test]
async fn compressed_stream_reader_reassembles_blocks_split_at_every_byte() {
    let a = compress(CompressionMethod::Lz4, &b"first block".repeat(20)).unwrap();
    let b = compress(CompressionMethod::Zstd, &b"second block".repeat(20)).unwrap();
    let mut combined = a.to_vec();
    combined.extend_from_slice(&b);

    for chunk_size in [1, 3, 7, 16, 4096] {
        let chunks: Vec<Bytes> =
            combined.chunks(chunk_size).map(Bytes::copy_from_slice).collect();
        let mut stream = stream::iter(chunks);
        let mut reader = CompressedStreamReader::new();

        let first = reader.next_block(&mut stream).await.unwrap().unwrap();
        assert_eq!(&first[..], &b"first block".repeat(20)[..]);
        let second = reader.next_block(&mut stream).await.unwrap().unwrap();
        assert_eq!(&second[..], &b"second block".repeat(20)[..]);
        let third = reader.next_block(&mut stream).await.unwrap();
        assert!(third.is_none(), "chunk_size={chunk_size}");
    }
}

#[tokio::test]
async fn compressed_stream_reader_reports_hash_mismatch_mid_stream() {
    let payload = b"tamper target".repeat(10);
    let mut compressed = compress(CompressionMethod::Lz4, &payload).unwrap().to_vec();
    let last = compressed.len() - 1;
    compressed[last] ^= 0xFF;

    let mut stream = stream::iter(vec![Bytes::from(compressed)]);
    let mut reader = CompressedStreamReader::new();
    let err = reader.next_block(&mut stream).await.unwrap_err();
    assert!(matches!(err, Error::HashMismatch { .. }));
}
