//! Per-type encode/decode contract layered on top of [`crate::column`].
//!
//! [`mod@crate::column`] already knows how to read and write each concrete
//! column type's dense wire form via `Column::load_from_buffer`/
//! `save_to_buffer`. This module adds the two things that sit above that:
//! the per-column choice between dense and sparse serialization (see
//! [`kind`]/[`sparse`]), and a [`Codec`] trait that drives either form
//! through the bounded [`crate::io::cursor::Cursor`]/
//! [`crate::io::cursor::WriteBuffer`] pair rather than a raw `&mut &[u8]`.

/// The per-column serialization-kind tree (dense vs. sparse, per nesting
/// level).
pub mod kind;
/// `CodecRegistry`: persisted kind tree and cross-block sparse state, keyed
/// by column name.
pub mod registry;
/// Sparse wire format and cross-call carry-over state.
pub mod sparse;

pub use kind::{
    KindNode,
    SerializationKind,
};
pub use registry::CodecRegistry;

use crate::column::ColumnRef;
use crate::io::cursor::{
    Cursor,
    WriteBuffer,
};
use crate::types::Type;
use crate::value::Value;
use crate::Result;
use std::sync::Arc;

/// The server revision at which a column's serialization kind is carried on
/// the wire at all. Below this, every column is implicitly dense.
/// Mirrors `io::block_stream::DBMS_MIN_REVISION_WITH_CUSTOM_SERIALIZATION`.
pub const DBMS_MIN_REVISION_WITH_CUSTOM_SERIALIZATION: u64 = 54454;

/// Options threaded through every [`Codec::decode`] call.
#[derive(Debug, Clone, Copy)]
pub struct DecodeOptions {
    /// The negotiated protocol revision for this connection, gating whether
    /// a `has_custom_serialization` byte precedes each column.
    pub client_version: u64,
}

/// Options threaded through every [`Codec::encode`] call.
#[derive(Debug, Clone, Copy)]
pub struct EncodeOptions {
    /// The negotiated protocol revision for this connection.
    pub client_version: u64,
    /// Encode as sparse whenever fewer than this fraction of rows hold a
    /// non-default value. `None` disables sparse encoding entirely.
    pub sparse_threshold: Option<f64>,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            client_version: DBMS_MIN_REVISION_WITH_CUSTOM_SERIALIZATION,
            sparse_threshold: Some(0.1),
        }
    }
}

/// Drives one column's decode/encode, choosing dense or sparse per call and
/// carrying sparse state across calls via the caller-owned [`KindNode`]/
/// [`sparse::SparseState`] it's handed.
pub trait Codec {
    /// Decode `rows` values of `column_type` starting at `cursor`'s current
    /// position, consuming exactly the bytes the wire form occupies.
    fn decode(
        &self,
        cursor: &mut Cursor,
        column_type: &Type,
        rows: usize,
        node: &mut KindNode,
        sparse_state: &mut sparse::SparseState,
        opts: &DecodeOptions,
    ) -> Result<ColumnRef>;

    /// Encode `column` (which must hold exactly `column.size()` rows) to
    /// `buffer`.
    fn encode(
        &self,
        buffer: &mut WriteBuffer,
        column: &ColumnRef,
        node: &mut KindNode,
        opts: &EncodeOptions,
    ) -> Result<()>;
}

/// The one [`Codec`] implementation this crate ships: drives a column
/// through [`crate::io::block_stream::create_column`] plus the existing
/// `Column::load_prefix`/`load_from_buffer`/`save_prefix`/`save_to_buffer`
/// methods, adding the sparse layer described in [`sparse`] on top.
#[derive(Debug, Default, Clone, Copy)]
pub struct ColumnCodec;

impl Codec for ColumnCodec {
    fn decode(
        &self,
        cursor: &mut Cursor,
        column_type: &Type,
        rows: usize,
        node: &mut KindNode,
        sparse_state: &mut sparse::SparseState,
        opts: &DecodeOptions,
    ) -> Result<ColumnRef> {
        let kind = if opts.client_version >= DBMS_MIN_REVISION_WITH_CUSTOM_SERIALIZATION {
            let byte = cursor.read_u8()?;
            if byte == 1 {
                SerializationKind::Sparse
            } else {
                SerializationKind::Dense
            }
        } else {
            SerializationKind::Dense
        };
        node.kind = kind;

        match kind {
            SerializationKind::Dense => decode_dense(cursor, column_type, rows),
            SerializationKind::Sparse => {
                decode_sparse(cursor, column_type, rows, sparse_state)
            }
        }
    }

    fn encode(
        &self,
        buffer: &mut WriteBuffer,
        column: &ColumnRef,
        node: &mut KindNode,
        opts: &EncodeOptions,
    ) -> Result<()> {
        let kind = choose_kind(column, opts.sparse_threshold);
        node.kind = kind;

        if opts.client_version >= DBMS_MIN_REVISION_WITH_CUSTOM_SERIALIZATION {
            buffer.put_u8(if kind == SerializationKind::Sparse { 1 } else { 0 });
        }

        match kind {
            SerializationKind::Dense => encode_dense(buffer, column),
            SerializationKind::Sparse => encode_sparse(buffer, column),
        }
    }
}

fn choose_kind(column: &ColumnRef, threshold: Option<f64>) -> SerializationKind {
    let Some(threshold) = threshold else {
        return SerializationKind::Dense;
    };
    let rows = column.size();
    if rows == 0 {
        return SerializationKind::Dense;
    }
    let non_default = (0..rows)
        .filter_map(|i| crate::column::column_value::get_value(column.as_ref(), i).ok())
        .filter(|v| !sparse::is_default_value(v))
        .count();
    if (non_default as f64 / rows as f64) < threshold {
        SerializationKind::Sparse
    } else {
        SerializationKind::Dense
    }
}

/// Read a column's dense wire form off `cursor`, advancing it by exactly
/// the number of bytes `Column::load_prefix`/`load_from_buffer` consumed.
fn decode_dense(cursor: &mut Cursor, column_type: &Type, rows: usize) -> Result<ColumnRef> {
    let mut column = crate::io::block_stream::create_column(column_type)?;
    let mut slice = cursor.remaining_slice();
    let before = slice.len();
    {
        let col_mut =
            Arc::get_mut(&mut column).expect("freshly created column is uniquely owned");
        col_mut.load_prefix(&mut slice, rows)?;
        col_mut.load_from_buffer(&mut slice, rows)?;
    }
    let consumed = before - slice.len();
    cursor.read_bytes(consumed)?;
    Ok(column)
}

/// Write a column's dense wire form to `buffer`.
fn encode_dense(buffer: &mut WriteBuffer, column: &ColumnRef) -> Result<()> {
    column.save_prefix(buffer.as_bytes_mut())?;
    column.save_to_buffer(buffer.as_bytes_mut())?;
    Ok(())
}

/// Read a sparse-serialized column: the positions mask, then a dense run of
/// just the non-default values, expanded back out to `rows` entries by
/// re-inserting `column_type`'s default value at every unset position.
fn decode_sparse(
    cursor: &mut Cursor,
    column_type: &Type,
    rows: usize,
    state: &mut sparse::SparseState,
) -> Result<ColumnRef> {
    let mask = sparse::decode_sparse_mask(cursor, rows, state)?;
    let non_default_count = mask.iter().filter(|&&b| b).count();
    let non_default_column = decode_dense(cursor, column_type, non_default_count)?;

    let mut non_default_values = Vec::with_capacity(non_default_count);
    for i in 0..non_default_count {
        non_default_values
            .push(crate::column::column_value::get_value(non_default_column.as_ref(), i)?);
    }

    let default = default_value(column_type);
    let values = sparse::expand_sparse_values(&mask, non_default_values, &default)?;

    let mut column = crate::io::block_stream::create_column(column_type)?;
    {
        let col_mut =
            Arc::get_mut(&mut column).expect("freshly created column is uniquely owned");
        for value in &values {
            crate::column::column_value::append_value(col_mut, value)?;
        }
    }
    Ok(column)
}

/// Write `column` as a sparse positions mask followed by a dense run of
/// just its non-default values.
fn encode_sparse(buffer: &mut WriteBuffer, column: &ColumnRef) -> Result<()> {
    let rows = column.size();
    let mut mask = Vec::with_capacity(rows);
    let mut non_default_values = Vec::new();
    for i in 0..rows {
        let value = crate::column::column_value::get_value(column.as_ref(), i)?;
        let is_default = sparse::is_default_value(&value);
        mask.push(!is_default);
        if !is_default {
            non_default_values.push(value);
        }
    }
    sparse::encode_sparse_mask(buffer, &mask);

    let mut non_default_column = crate::io::block_stream::create_column(column.column_type())?;
    {
        let col_mut =
            Arc::get_mut(&mut non_default_column).expect("freshly created column is uniquely owned");
        for value in &non_default_values {
            crate::column::column_value::append_value(col_mut, value)?;
        }
    }
    encode_dense(buffer, &non_default_column)
}

/// The "default" value for `type_`'s own rows: zero/empty/Null, matching
/// [`sparse::is_default_value`]'s notion of default.
fn default_value(type_: &Type) -> Value {
    match type_ {
        Type::Nullable { .. } => Value::Null,
        Type::Simple(code) => match code {
            crate::types::TypeCode::Bool => Value::Bool(false),
            crate::types::TypeCode::Int8 => Value::Int8(0),
            crate::types::TypeCode::Int16 => Value::Int16(0),
            crate::types::TypeCode::Int32 => Value::Int32(0),
            crate::types::TypeCode::Int64 => Value::Int64(0),
            crate::types::TypeCode::Int128 => Value::Int128(0),
            crate::types::TypeCode::Int256 => Value::Int256(crate::bigint::I256::ZERO),
            crate::types::TypeCode::UInt8 => Value::UInt8(0),
            crate::types::TypeCode::UInt16 => Value::UInt16(0),
            crate::types::TypeCode::UInt32 => Value::UInt32(0),
            crate::types::TypeCode::UInt64 => Value::UInt64(0),
            crate::types::TypeCode::UInt128 => Value::UInt128(0),
            crate::types::TypeCode::UInt256 => Value::UInt256(crate::bigint::U256::ZERO),
            crate::types::TypeCode::Float32 => Value::Float32(0.0),
            crate::types::TypeCode::Float64 => Value::Float64(0.0),
            crate::types::TypeCode::String => Value::String(String::new()),
            crate::types::TypeCode::Date => Value::Date(0),
            crate::types::TypeCode::Date32 => Value::Date(0),
            crate::types::TypeCode::UUID => Value::Uuid(crate::column::uuid::Uuid::new(0, 0)),
            crate::types::TypeCode::IPv4 => Value::Ipv4(std::net::Ipv4Addr::from(0u32)),
            crate::types::TypeCode::IPv6 => Value::Ipv6(std::net::Ipv6Addr::from([0u8; 16])),
            _ => Value::Null,
        },
        Type::FixedString { .. } => Value::String(String::new()),
        Type::DateTime { .. } => Value::Date(0),
        Type::DateTime64 { precision, .. } => Value::DateTime64 { value: 0, precision: *precision },
        Type::Decimal { scale, .. } => {
            Value::Decimal { unscaled: crate::bigint::I256::ZERO, scale: *scale }
        }
        Type::Enum8 { .. } | Type::Enum16 { .. } => Value::Enum { value: 0, name: None },
        Type::Array { .. } => Value::Array(Vec::new()),
        Type::Map { .. } => Value::Map(Vec::new()),
        Type::Tuple { item_types, .. } => {
            Value::Tuple(item_types.iter().map(default_value).collect())
        }
        Type::LowCardinality { nested_type } => default_value(nested_type),
        Type::Variant { .. } | Type::Dynamic { .. } => Value::Null,
        Type::Json { .. } => Value::Object(Vec::new()),
    }
}
