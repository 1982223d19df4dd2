// I/O module for block streaming
pub mod block_stream;
pub mod buffer_utils;
/// Bounded read cursor (`BufferUnderflow` contract) and growable write buffer.
pub mod cursor;
/// Compressed block reassembly from arbitrarily chunked byte streams.
pub mod compressed_stream;
/// Resumable block-stream decoder driven by a chunked byte stream.
pub mod stream;

pub use block_stream::{
    BlockReader,
    BlockWriter,
};
pub use compressed_stream::CompressedStreamReader;
pub use cursor::{
    Cursor,
    WriteBuffer,
};
pub use stream::StreamDecoder;
