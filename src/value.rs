//! A single value materialized from (or destined for) a column.
//!
//! [`crate::column::column_value::ColumnValue`] is a narrow, byte-tagged
//! representation used internally for `LowCardinality` dictionary hashing.
//! `Value` is the broader, row-oriented materialization the rest of the
//! crate works with: what [`crate::record_batch::RowProxy`] hands back,
//! what [`crate::codec::Codec::from_values`] coerces from, and what a
//! `Variant`/`Dynamic`/`JSON` cell decodes into when its concrete type
//! varies row to row.

use crate::bigint::{
    I256,
    U256,
};
use crate::column::uuid::Uuid;
use std::net::{
    Ipv4Addr,
    Ipv6Addr,
};

/// A materialized column value, covering the full ClickHouse type matrix.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// `Bool`.
    Bool(bool),
    /// `Int8`.
    Int8(i8),
    /// `Int16`.
    Int16(i16),
    /// `Int32`.
    Int32(i32),
    /// `Int64`.
    Int64(i64),
    /// `Int128`.
    Int128(i128),
    /// `Int256`.
    Int256(I256),
    /// `UInt8`.
    UInt8(u8),
    /// `UInt16`.
    UInt16(u16),
    /// `UInt32`.
    UInt32(u32),
    /// `UInt64`.
    UInt64(u64),
    /// `UInt128`.
    UInt128(u128),
    /// `UInt256`.
    UInt256(U256),
    /// `Float32`.
    Float32(f32),
    /// `Float64`.
    Float64(f64),
    /// `String` or `FixedString(n)`.
    String(String),
    /// `Date`/`Date32`/`DateTime`, as a Unix timestamp in whole seconds.
    Date(i64),
    /// `DateTime64(precision)`, as the raw scaled integer plus its
    /// fractional-second precision (kept scaled rather than converted to a
    /// float, to avoid losing precision at the high end of its range).
    DateTime64 {
        /// Scaled timestamp value (ticks of `10^-precision` seconds).
        value: i64,
        /// Number of sub-second decimal digits.
        precision: usize,
    },
    /// `UUID`.
    Uuid(Uuid),
    /// `IPv4`.
    Ipv4(Ipv4Addr),
    /// `IPv6`.
    Ipv6(Ipv6Addr),
    /// `Decimal`/`Decimal32`/`Decimal64`/`Decimal128`/`Decimal256`, stored
    /// as the unscaled integer plus its scale (digits after the point).
    Decimal {
        /// The unscaled integer value.
        unscaled: I256,
        /// Digits after the decimal point.
        scale: usize,
    },
    /// `Enum8`/`Enum16`, the raw integer value plus its name if known.
    Enum {
        /// The enum's underlying integer value.
        value: i16,
        /// The symbolic name for `value`, if the enum's item list is known.
        name: Option<String>,
    },
    /// `Array(T)`.
    Array(Vec<Value>),
    /// `Tuple(T1, T2, ...)`, positional or named.
    Tuple(Vec<Value>),
    /// `Map(K, V)`, as ordered key/value pairs (insertion order preserved,
    /// not a hash map).
    Map(Vec<(Value, Value)>),
    /// A `Variant` or `Dynamic` cell's active value.
    Variant(Box<Value>),
    /// A `JSON` document, as ordered path/value pairs.
    Object(Vec<(String, Value)>),
}

impl Value {
    /// `true` if this is [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Render an integer-like value as a decimal string.
    ///
    /// This is the Rust-native replacement for the abstract spec's
    /// `bigIntAsString` decode option: since this crate represents integers
    /// with native `i64`/`u64`/`i128`/`u128`/`I256`/`U256` types rather than
    /// strings, there's no decode-time flag to request string form. Callers
    /// that want a textual representation (for display, or for a value too
    /// wide for any other textual sink) call this directly instead.
    pub fn to_decimal_string(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int8(v) => v.to_string(),
            Value::Int16(v) => v.to_string(),
            Value::Int32(v) => v.to_string(),
            Value::Int64(v) => v.to_string(),
            Value::Int128(v) => v.to_string(),
            Value::Int256(v) => v.to_string(),
            Value::UInt8(v) => v.to_string(),
            Value::UInt16(v) => v.to_string(),
            Value::UInt32(v) => v.to_string(),
            Value::UInt64(v) => v.to_string(),
            Value::UInt128(v) => v.to_string(),
            Value::UInt256(v) => v.to_string(),
            Value::Float32(v) => v.to_string(),
            Value::Float64(v) => v.to_string(),
            Value::Decimal { unscaled, scale } => {
                crate::column::decimal256::format_decimal256(*unscaled, *scale)
            }
            Value::String(s) => s.clone(),
            other => format!("{:?}", other),
        }
    }

    /// Returns the value's integer magnitude if it holds any integer type,
    /// widened losslessly to `i128`. Used by coercion/range-check logic so
    /// a single comparison covers every integer column width.
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Value::Bool(b) => Some(*b as i128),
            Value::Int8(v) => Some(*v as i128),
            Value::Int16(v) => Some(*v as i128),
            Value::Int32(v) => Some(*v as i128),
            Value::Int64(v) => Some(*v as i128),
            Value::Int128(v) => Some(*v),
            Value::UInt8(v) => Some(*v as i128),
            Value::UInt16(v) => Some(*v as i128),
            Value::UInt32(v) => Some(*v as i128),
            Value::UInt64(v) => Some(*v as i128),
            Value::UInt128(v) => (*v).try_into().ok(),
            _ => None,
        }
    }
}
