//! Chunking invariance for `StreamDecoder`/`StreamEncoder`: decoding a
//! sequence of encoded blocks must produce the same rows no matter how the
//! underlying byte stream happens to be split into chunks.

use clickhouse_native_client::io::cursor::WriteBuffer;
use clickhouse_native_client::io::stream::{
    StreamDecoder,
    StreamEncoder,
};
use clickhouse_native_client::types::Type;
use clickhouse_native_client::value::Value;
use clickhouse_native_client::RecordBatch;
use bytes::Bytes;
use futures_util::stream;

const REVISION: u64 = 54460; // above DBMS_MIN_REVISION_WITH_BLOCK_INFO

fn batch_of(values: &[i32]) -> RecordBatch {
    let schema = vec![("n".to_string(), Type::int32())];
    let rows: Vec<Vec<Value>> = values.iter().map(|v| vec![Value::Int32(*v)]).collect();
    RecordBatch::from_rows(schema, rows).unwrap()
}

fn encode_stream(batches: &[RecordBatch]) -> Vec<u8> {
    let mut encoder = StreamEncoder::new(REVISION, REVISION);
    let mut buffer = WriteBuffer::new();
    for batch in batches {
        encoder.encode_block(&mut buffer, batch).unwrap();
    }
    encoder.encode_end_of_stream(&mut buffer).unwrap();
    buffer.as_slice().to_vec()
}

async fn decode_all_rows(bytes: &[u8], chunk_size: usize) -> Vec<i32> {
    let chunks: Vec<Bytes> = if chunk_size == 0 {
        vec![Bytes::copy_from_slice(bytes)]
    } else {
        bytes.chunks(chunk_size).map(Bytes::copy_from_slice).collect()
    };
    let mut stream = stream::iter(chunks);
    let mut decoder = StreamDecoder::new(REVISION, REVISION);

    let mut rows = Vec::new();
    while let Some(batch) = decoder.next_block(&mut stream).await.unwrap() {
        for row in batch.rows() {
            match row.get(0).unwrap() {
                Value::Int32(v) => rows.push(v),
                other => panic!("expected Int32, got {:?}", other),
            }
        }
    }
    rows
}

#[tokio::test]
async fn decoding_is_invariant_to_chunk_boundaries() {
    let batches = vec![batch_of(&[1, 2, 3]), batch_of(&[4, 5]), batch_of(&(6..40).collect::<Vec<_>>())];
    let bytes = encode_stream(&batches);
    let expected: Vec<i32> = (1..40).collect();

    for chunk_size in [0, 1, 2, 3, 5, 8, 13, 64, 4096] {
        let rows = decode_all_rows(&bytes, chunk_size).await;
        assert_eq!(rows, expected, "mismatch at chunk_size={chunk_size}");
    }
}

#[tokio::test]
async fn decoder_stops_cleanly_at_the_end_of_stream_marker() {
    let bytes = encode_stream(&[batch_of(&[42])]);
    let mut stream = stream::iter(vec![Bytes::from(bytes)]);
    let mut decoder = StreamDecoder::new(REVISION, REVISION);

    let first = decoder.next_block(&mut stream).await.unwrap();
    assert!(first.is_some());
    let second = decoder.next_block(&mut stream).await.unwrap();
    assert!(second.is_none());
    assert_eq!(decoder.blocks_decoded(), 1);
    assert_eq!(decoder.rows_decoded(), 1);
}

#[tokio::test]
async fn empty_input_stream_yields_no_blocks() {
    let mut stream = stream::iter(Vec::<Bytes>::new());
    let mut decoder = StreamDecoder::new(REVISION, REVISION);
    assert!(decoder.next_block(&mut stream).await.unwrap().is_none());
}
