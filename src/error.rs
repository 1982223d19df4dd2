//! Error types for the ClickHouse client.
//!
//! All fallible operations in this crate return [`Result<T>`], which is an
//! alias for `std::result::Result<T, Error>`.

use thiserror::Error;

/// Errors that can occur when using the ClickHouse client.
#[derive(Error, Debug)]
pub enum Error {
    /// An I/O error occurred on the underlying TCP or TLS connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to establish a connection to the ClickHouse server.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A protocol-level error, such as an unexpected packet type or
    /// malformed data from the server.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// An error during LZ4 or ZSTD compression/decompression.
    #[error("Compression error: {0}")]
    Compression(String),

    /// A type mismatch between expected and actual column types.
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The type that was expected.
        expected: String,
        /// The type that was received.
        actual: String,
    },

    /// A validation error, such as mismatched row counts in a block.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An error returned by the ClickHouse server (exception).
    #[error("Server error {code}: {message}")]
    Server {
        /// ClickHouse error code.
        code: i32,
        /// Error message from the server.
        message: String,
    },

    /// A feature or type that has not been implemented yet.
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// An invalid argument was provided to a function.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A write exceeded the available buffer capacity.
    #[error("Buffer overflow")]
    BufferOverflow,

    /// Invalid UTF-8 was encountered when reading a string.
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// A read consumed more bytes than the buffer currently holds.
    ///
    /// This is the only recoverable error kind in the codec layer: the
    /// streaming decoder catches it, buffers more bytes, and retries the
    /// decode from scratch. Any other variant is fatal.
    #[error("buffer underflow: need {need} bytes at offset {offset}, have {have}")]
    BufferUnderflow {
        /// Bytes required to complete the read.
        need: usize,
        /// Bytes actually available.
        have: usize,
        /// Offset into the buffer where the read started.
        offset: usize,
    },

    /// Verification of a compressed block's CityHash128 content hash failed.
    #[error("content hash mismatch: expected {expected:032x}, computed {computed:032x}")]
    HashMismatch {
        /// Hash carried in the block header.
        expected: u128,
        /// Hash computed over the decoded header and payload.
        computed: u128,
    },

    /// A value could not be coerced into the target column's type, or fell
    /// outside its representable range.
    #[error("coercion error in column {column:?} row {row}: cannot represent {value} as {type_name}")]
    Coercion {
        /// Column name, if known.
        column: Option<String>,
        /// Row index within the batch being built.
        row: usize,
        /// Target type name.
        type_name: String,
        /// Textual form of the offending value.
        value: String,
    },

    /// A feature that is valid in the format but not implemented by this
    /// crate, or negotiated at an unsupported protocol layout.
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),
}

/// A type alias for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
