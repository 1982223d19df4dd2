//! Buffer-owning, chunk-agnostic block decoder.
//!
//! Grounded in spirit on [`crate::io::block_stream`]'s `BlockReader`, which
//! reads one block at a time straight off a live [`crate::connection::Connection`].
//! `StreamDecoder` keeps the same per-block parsing shape (block info prolog,
//! column name/type headers, per-column body) but drives it off a growable
//! byte ring fed by an arbitrary `Stream<Item = Bytes>` instead of a socket,
//! so the same decoder works over a TCP connection, a test fixture, or a
//! file replay without change.

use crate::codec::{
    CodecRegistry,
    DecodeOptions,
    EncodeOptions,
};
use crate::io::cursor::{
    Cursor,
    WriteBuffer,
};
use crate::record_batch::RecordBatch;
use crate::types::Type;
use crate::{
    Error,
    Result,
};
use bytes::Bytes;
use futures_core::Stream;
use futures_util::StreamExt;

const DBMS_MIN_REVISION_WITH_BLOCK_INFO: u64 = 51903;

/// Bytes of undecodable trailing data at end-of-stream still tolerated as
/// padding rather than treated as a truncated block.
const TRAILING_BYTE_TOLERANCE: usize = 100;

/// Floor on the "have we buffered enough to bother trying" threshold,
/// independent of the running block-size average.
const MIN_BUFFER: usize = 4096;

/// A growable byte ring: `append` at the tail, `consume` from the head,
/// compacting once the consumed prefix passes half of capacity so it
/// doesn't reallocate on every single-byte consume.
///
/// Shared with [`crate::io::compressed_stream::CompressedStreamReader`],
/// which reassembles compressed blocks from the same kind of arbitrarily
/// chunked byte stream.
pub(crate) struct RingBuffer {
    buf: Vec<u8>,
    read_offset: usize,
}

impl RingBuffer {
    pub(crate) fn new() -> Self {
        Self { buf: Vec::new(), read_offset: 0 }
    }

    pub(crate) fn append(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
        self.maybe_compact();
    }

    pub(crate) fn read_view(&self) -> &[u8] {
        &self.buf[self.read_offset..]
    }

    pub(crate) fn len(&self) -> usize {
        self.buf.len() - self.read_offset
    }

    pub(crate) fn consume(&mut self, n: usize) {
        self.read_offset += n;
        debug_assert!(self.read_offset <= self.buf.len());
        self.maybe_compact();
    }

    fn maybe_compact(&mut self) {
        if self.read_offset > 0 && self.read_offset > self.buf.len() / 2 {
            self.buf.drain(0..self.read_offset);
            self.read_offset = 0;
        }
    }
}

/// Resumable decode driver over a chunked byte stream.
///
/// One `StreamDecoder` is scoped to one query result (or insert stream): its
/// [`CodecRegistry`] carries sparse-serialization state across blocks, which
/// doesn't necessarily make sense to reuse across unrelated result sets.
pub struct StreamDecoder {
    ring: RingBuffer,
    avg_block_size: usize,
    server_revision: u64,
    client_version: u64,
    registry: CodecRegistry,
    blocks_decoded: usize,
    rows_decoded: usize,
}

impl StreamDecoder {
    /// Create a decoder for a connection negotiated at `server_revision`
    /// (gates the block-info prolog) with `client_version` (gates the
    /// per-column custom-serialization byte the [`crate::codec`] layer
    /// reads).
    pub fn new(server_revision: u64, client_version: u64) -> Self {
        Self {
            ring: RingBuffer::new(),
            avg_block_size: 0,
            server_revision,
            client_version,
            registry: CodecRegistry::new(),
            blocks_decoded: 0,
            rows_decoded: 0,
        }
    }

    /// Number of blocks successfully decoded so far.
    pub fn blocks_decoded(&self) -> usize {
        self.blocks_decoded
    }

    /// Number of rows across all blocks decoded so far.
    pub fn rows_decoded(&self) -> usize {
        self.rows_decoded
    }

    /// Pull chunks from `chunks` until the next block can be decoded, or the
    /// stream ends.
    ///
    /// Returns `Ok(None)` at a clean end-of-stream: either an explicit empty
    /// block (`num_cols == 0 && num_rows == 0`), or fewer than
    /// [`TRAILING_BYTE_TOLERANCE`] undecodable trailing bytes after the
    /// underlying stream is exhausted.
    pub async fn next_block<S>(&mut self, chunks: &mut S) -> Result<Option<RecordBatch>>
    where
        S: Stream<Item = Bytes> + Unpin,
    {
        loop {
            let threshold = (MIN_BUFFER / 4).max((self.avg_block_size as f64 * 1.2) as usize);
            if self.ring.len() < threshold {
                match chunks.next().await {
                    Some(chunk) => {
                        self.ring.append(&chunk);
                        continue;
                    }
                    None => return self.finish(),
                }
            }

            // Stable slice: a copy, not a view, so the ring buffer is free to
            // compact underneath while this attempt is in flight.
            let data = self.ring.read_view().to_vec();
            let mut cursor = Cursor::new(&data);
            match self.decode_one(&mut cursor) {
                Ok(outcome) => {
                    let consumed = cursor.position();
                    self.ring.consume(consumed);
                    return Ok(self.record_and_return(outcome, consumed));
                }
                Err(Error::BufferUnderflow { .. }) => match chunks.next().await {
                    Some(chunk) => {
                        self.ring.append(&chunk);
                        continue;
                    }
                    None => return self.finish(),
                },
                Err(e) => return Err(e),
            }
        }
    }

    fn record_and_return(
        &mut self,
        outcome: Option<RecordBatch>,
        consumed: usize,
    ) -> Option<RecordBatch> {
        if let Some(batch) = &outcome {
            self.blocks_decoded += 1;
            self.rows_decoded += batch.row_count();
            self.avg_block_size = ((self.avg_block_size as f64 * 0.7) + (consumed as f64 * 0.3)) as usize;
        }
        outcome
    }

    /// One last decode attempt against whatever's left once the upstream
    /// chunk source is exhausted.
    fn finish(&mut self) -> Result<Option<RecordBatch>> {
        let remaining = self.ring.len();
        if remaining == 0 {
            return Ok(None);
        }

        let data = self.ring.read_view().to_vec();
        let mut cursor = Cursor::new(&data);
        match self.decode_one(&mut cursor) {
            Ok(outcome) => {
                let consumed = cursor.position();
                self.ring.consume(consumed);
                Ok(self.record_and_return(outcome, consumed))
            }
            Err(_) if remaining < TRAILING_BYTE_TOLERANCE => Ok(None),
            Err(e) => Err(Error::Protocol(format!(
                "stream ended with {} undecodable trailing bytes after {} blocks ({} rows decoded): {}",
                remaining, self.blocks_decoded, self.rows_decoded, e
            ))),
        }
    }

    fn decode_one(&mut self, cursor: &mut Cursor) -> Result<Option<RecordBatch>> {
        decode_block(cursor, self.server_revision, self.client_version, &mut self.registry)
    }
}

/// Decode a single block off `cursor`. `Ok(None)` means the block was the
/// empty end-of-stream marker (`num_cols == 0 && num_rows == 0`).
fn decode_block(
    cursor: &mut Cursor,
    server_revision: u64,
    client_version: u64,
    registry: &mut CodecRegistry,
) -> Result<Option<RecordBatch>> {
    if server_revision >= DBMS_MIN_REVISION_WITH_BLOCK_INFO {
        skip_block_info(cursor)?;
    }

    let num_cols = cursor.read_varint()? as usize;
    let num_rows = cursor.read_varint()? as usize;

    if num_cols == 0 && num_rows == 0 {
        return Ok(None);
    }

    let opts = DecodeOptions { client_version };
    let mut columns = Vec::with_capacity(num_cols);
    for _ in 0..num_cols {
        let name = cursor.read_string()?;
        let type_name = cursor.read_string()?;
        let column_type = Type::parse(&type_name)?;
        let column = registry.decode_column(cursor, &name, &column_type, num_rows, &opts)?;
        columns.push((name, column));
    }

    Ok(Some(RecordBatch::from_columns(columns)?))
}

fn skip_block_info(cursor: &mut Cursor) -> Result<()> {
    loop {
        match cursor.read_varint()? {
            1 => {
                cursor.read_u8()?;
            }
            2 => {
                cursor.read_bytes(4)?;
            }
            0 => break,
            other => {
                return Err(Error::Protocol(format!("unknown block info field id {}", other)))
            }
        }
    }
    Ok(())
}

/// One batch in, one block out — no rebatching at this layer.
pub struct StreamEncoder {
    server_revision: u64,
    client_version: u64,
    registry: CodecRegistry,
}

impl StreamEncoder {
    /// Create an encoder for a connection negotiated at `server_revision`
    /// and `client_version`.
    pub fn new(server_revision: u64, client_version: u64) -> Self {
        Self { server_revision, client_version, registry: CodecRegistry::new() }
    }

    /// Encode `batch` as one block into `buffer`.
    pub fn encode_block(&mut self, buffer: &mut WriteBuffer, batch: &RecordBatch) -> Result<()> {
        if self.server_revision >= DBMS_MIN_REVISION_WITH_BLOCK_INFO {
            buffer.put_varint(1);
            buffer.put_u8(0);
            buffer.put_varint(2);
            buffer.as_bytes_mut().extend_from_slice(&(-1i32).to_le_bytes());
            buffer.put_varint(0);
        }

        buffer.put_varint(batch.column_count() as u64);
        buffer.put_varint(batch.row_count() as u64);

        let opts = EncodeOptions { client_version: self.client_version, sparse_threshold: Some(0.1) };
        for (index, name) in batch.column_names().into_iter().enumerate() {
            let column = batch.column(index).expect("column_names/column indices agree");
            buffer.put_string(name);
            buffer.put_string(&column.column_type().name());
            self.registry.encode_column(buffer, name, &column, &opts)?;
        }
        Ok(())
    }

    /// Encode the empty end-of-stream marker block.
    pub fn encode_end_of_stream(&mut self, buffer: &mut WriteBuffer) -> Result<()> {
        if self.server_revision >= DBMS_MIN_REVISION_WITH_BLOCK_INFO {
            buffer.put_varint(1);
            buffer.put_u8(0);
            buffer.put_varint(2);
            buffer.as_bytes_mut().extend_from_slice(&(-1i32).to_le_bytes());
            buffer.put_varint(0);
        }
        buffer.put_varint(0);
        buffer.put_varint(0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use futures_util::stream;

    fn encode_single_column_block(rows: &[i32]) -> Vec<u8> {
        let schema = vec![("n".to_string(), Type::int32())];
        let values: Vec<Vec<Value>> = rows.iter().map(|v| vec![Value::Int32(*v)]).collect();
        let batch = RecordBatch::from_rows(schema, values).unwrap();

        let mut encoder = StreamEncoder::new(DBMS_MIN_REVISION_WITH_BLOCK_INFO, DBMS_MIN_REVISION_WITH_BLOCK_INFO);
        let mut buffer = WriteBuffer::new();
        encoder.encode_block(&mut buffer, &batch).unwrap();
        buffer.as_slice().to_vec()
    }

    #[tokio::test]
    async fn decodes_a_block_delivered_in_one_chunk() {
        let bytes = encode_single_column_block(&[1, 2, 3]);
        let mut chunks = stream::iter(vec![Bytes::from(bytes)]);

        let mut decoder = StreamDecoder::new(DBMS_MIN_REVISION_WITH_BLOCK_INFO, DBMS_MIN_REVISION_WITH_BLOCK_INFO);
        let batch = decoder.next_block(&mut chunks).await.unwrap().unwrap();
        assert_eq!(batch.row_count(), 3);
        assert_eq!(decoder.blocks_decoded(), 1);
        assert_eq!(decoder.rows_decoded(), 3);
    }

    #[tokio::test]
    async fn decodes_a_block_split_across_many_tiny_chunks() {
        let bytes = encode_single_column_block(&[10, 20, 30, 40]);
        let chunks_vec: Vec<Bytes> = bytes.chunks(3).map(|c| Bytes::copy_from_slice(c)).collect();
        let mut chunks = stream::iter(chunks_vec);

        let mut decoder = StreamDecoder::new(DBMS_MIN_REVISION_WITH_BLOCK_INFO, DBMS_MIN_REVISION_WITH_BLOCK_INFO);
        let batch = decoder.next_block(&mut chunks).await.unwrap().unwrap();
        assert_eq!(batch.row_count(), 4);

        let row = batch.row(2);
        assert_eq!(row.get(0).unwrap(), Value::Int32(30));
    }

    #[tokio::test]
    async fn tolerates_short_trailing_padding_at_end_of_stream() {
        let mut bytes = encode_single_column_block(&[7]);
        // A truncated varint's continuation bit (high bit set) stays
        // unterminated, forcing BufferUnderflow rather than parsing as a
        // spurious valid empty block.
        bytes.extend_from_slice(&[0xFFu8; 5]);
        let mut chunks = stream::iter(vec![Bytes::from(bytes)]);

        let mut decoder = StreamDecoder::new(DBMS_MIN_REVISION_WITH_BLOCK_INFO, DBMS_MIN_REVISION_WITH_BLOCK_INFO);
        let first = decoder.next_block(&mut chunks).await.unwrap();
        assert!(first.is_some());
        let second = decoder.next_block(&mut chunks).await.unwrap();
        assert!(second.is_none());
    }
}
