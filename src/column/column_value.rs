//! ColumnValue - A value extracted from or to be inserted into a column
//!
//! This is similar to C++ clickhouse-cpp's ItemView, providing a type-tagged
//! byte representation of column values.

use crate::{
    types::TypeCode,
    value::Value,
    Error,
    Result,
};
use std::collections::hash_map::DefaultHasher;
use std::hash::{
    Hash,
    Hasher,
};
use std::sync::Arc;

/// A value from a column, stored as bytes with type information
/// Similar to C++ ItemView but owned
#[derive(Clone, Debug)]
pub struct ColumnValue {
    pub type_code: TypeCode,
    pub data: Vec<u8>,
}

impl ColumnValue {
    /// Create from primitive types
    pub fn from_u8(value: u8) -> Self {
        Self {
            type_code: TypeCode::UInt8,
            data: value.to_le_bytes().to_vec(),
        }
    }

    pub fn from_u16(value: u16) -> Self {
        Self {
            type_code: TypeCode::UInt16,
            data: value.to_le_bytes().to_vec(),
        }
    }

    pub fn from_u32(value: u32) -> Self {
        Self {
            type_code: TypeCode::UInt32,
            data: value.to_le_bytes().to_vec(),
        }
    }

    pub fn from_u64(value: u64) -> Self {
        Self {
            type_code: TypeCode::UInt64,
            data: value.to_le_bytes().to_vec(),
        }
    }

    pub fn from_i8(value: i8) -> Self {
        Self {
            type_code: TypeCode::Int8,
            data: value.to_le_bytes().to_vec(),
        }
    }

    pub fn from_i16(value: i16) -> Self {
        Self {
            type_code: TypeCode::Int16,
            data: value.to_le_bytes().to_vec(),
        }
    }

    pub fn from_i32(value: i32) -> Self {
        Self {
            type_code: TypeCode::Int32,
            data: value.to_le_bytes().to_vec(),
        }
    }

    pub fn from_i64(value: i64) -> Self {
        Self {
            type_code: TypeCode::Int64,
            data: value.to_le_bytes().to_vec(),
        }
    }

    pub fn from_f32(value: f32) -> Self {
        Self {
            type_code: TypeCode::Float32,
            data: value.to_le_bytes().to_vec(),
        }
    }

    pub fn from_f64(value: f64) -> Self {
        Self {
            type_code: TypeCode::Float64,
            data: value.to_le_bytes().to_vec(),
        }
    }

    pub fn from_string(value: &str) -> Self {
        Self {
            type_code: TypeCode::String,
            data: value.as_bytes().to_vec(),
        }
    }

    pub fn void() -> Self {
        Self {
            type_code: TypeCode::Void,
            data: Vec::new(),
        }
    }

    /// Get as string (for String type)
    pub fn as_string(&self) -> Result<&str> {
        if self.type_code != TypeCode::String {
            return Err(Error::TypeMismatch {
                expected: "String".to_string(),
                actual: format!("{:?}", self.type_code),
            });
        }
        std::str::from_utf8(&self.data).map_err(|e| {
            Error::Protocol(format!("Invalid UTF-8 in string: {}", e))
        })
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

/// Hash computation for LowCardinality deduplication
/// Matches C++ computeHashKey using dual hashing
pub fn compute_hash_key(value: &ColumnValue) -> (u64, u64) {
    // Void type gets special (0, 0) hash to distinguish NULL from empty string
    if value.type_code == TypeCode::Void {
        return (0, 0);
    }

    // Hash 1: std::hash equivalent
    let mut hasher = DefaultHasher::new();
    value.data.hash(&mut hasher);
    let hash1 = hasher.finish();

    // Hash 2: CityHash64 equivalent (using simple FNV-1a for now)
    let hash2 = fnv1a_64(&value.data);

    (hash1, hash2)
}

/// Simple FNV-1a hash (64-bit)
/// This is a placeholder - ideally we'd use actual CityHash64
/// FNV-1a is simple, fast, and has good distribution
fn fnv1a_64(data: &[u8]) -> u64 {
    const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    let mut hash = FNV_OFFSET_BASIS;
    for &byte in data {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Helper functions to extract ColumnValue from specific column types
use super::{
    nullable::ColumnNullable,
    numeric::*,
    string::ColumnString,
    Column,
};

/// Get item from a column by index
/// Returns ColumnValue representation
pub fn get_column_item(column: &dyn Column, index: usize) -> Result<ColumnValue> {
    use crate::types::Type;

    if index >= column.size() {
        return Err(Error::InvalidArgument(format!(
            "Index {} out of bounds (size: {})",
            index,
            column.size()
        )));
    }

    match column.column_type() {
        Type::Simple(type_code) => {
            match type_code {
                TypeCode::UInt8 => {
                    if let Some(col) = column.as_any().downcast_ref::<ColumnUInt8>() {
                        Ok(ColumnValue::from_u8(col.at(index)))
                    } else {
                        Err(Error::Protocol("Failed to downcast UInt8 column".to_string()))
                    }
                }
                TypeCode::UInt16 => {
                    if let Some(col) = column.as_any().downcast_ref::<ColumnUInt16>() {
                        Ok(ColumnValue::from_u16(col.at(index)))
                    } else {
                        Err(Error::Protocol("Failed to downcast UInt16 column".to_string()))
                    }
                }
                TypeCode::UInt32 => {
                    if let Some(col) = column.as_any().downcast_ref::<ColumnUInt32>() {
                        Ok(ColumnValue::from_u32(col.at(index)))
                    } else {
                        Err(Error::Protocol("Failed to downcast UInt32 column".to_string()))
                    }
                }
                TypeCode::UInt64 => {
                    if let Some(col) = column.as_any().downcast_ref::<ColumnUInt64>() {
                        Ok(ColumnValue::from_u64(col.at(index)))
                    } else {
                        Err(Error::Protocol("Failed to downcast UInt64 column".to_string()))
                    }
                }
                TypeCode::Int8 => {
                    if let Some(col) = column.as_any().downcast_ref::<ColumnInt8>() {
                        Ok(ColumnValue::from_i8(col.at(index)))
                    } else {
                        Err(Error::Protocol("Failed to downcast Int8 column".to_string()))
                    }
                }
                TypeCode::Int16 => {
                    if let Some(col) = column.as_any().downcast_ref::<ColumnInt16>() {
                        Ok(ColumnValue::from_i16(col.at(index)))
                    } else {
                        Err(Error::Protocol("Failed to downcast Int16 column".to_string()))
                    }
                }
                TypeCode::Int32 => {
                    if let Some(col) = column.as_any().downcast_ref::<ColumnInt32>() {
                        Ok(ColumnValue::from_i32(col.at(index)))
                    } else {
                        Err(Error::Protocol("Failed to downcast Int32 column".to_string()))
                    }
                }
                TypeCode::Int64 => {
                    if let Some(col) = column.as_any().downcast_ref::<ColumnInt64>() {
                        Ok(ColumnValue::from_i64(col.at(index)))
                    } else {
                        Err(Error::Protocol("Failed to downcast Int64 column".to_string()))
                    }
                }
                TypeCode::Float32 => {
                    if let Some(col) = column.as_any().downcast_ref::<ColumnFloat32>() {
                        Ok(ColumnValue::from_f32(col.at(index)))
                    } else {
                        Err(Error::Protocol("Failed to downcast Float32 column".to_string()))
                    }
                }
                TypeCode::Float64 => {
                    if let Some(col) = column.as_any().downcast_ref::<ColumnFloat64>() {
                        Ok(ColumnValue::from_f64(col.at(index)))
                    } else {
                        Err(Error::Protocol("Failed to downcast Float64 column".to_string()))
                    }
                }
                TypeCode::String => {
                    if let Some(col) = column.as_any().downcast_ref::<ColumnString>() {
                        Ok(ColumnValue::from_string(&col.at(index)))
                    } else {
                        Err(Error::Protocol("Failed to downcast String column".to_string()))
                    }
                }
                _ => Err(Error::Protocol(format!(
                    "get_column_item not implemented for type {:?}",
                    type_code
                ))),
            }
        }
        Type::Nullable { nested_type: _ } => {
            if let Some(col) = column.as_any().downcast_ref::<ColumnNullable>() {
                if col.is_null(index) {
                    Ok(ColumnValue::void())
                } else {
                    get_column_item(col.nested().as_ref(), index)
                }
            } else {
                Err(Error::Protocol("Failed to downcast Nullable column".to_string()))
            }
        }
        _ => Err(Error::Protocol(format!(
            "get_column_item not implemented for type {}",
            column.column_type().name()
        ))),
    }
}

/// Append item to a column
pub fn append_column_item(column: &mut dyn Column, value: &ColumnValue) -> Result<()> {
    use crate::types::Type;

    match column.column_type() {
        Type::Simple(type_code) => {
            if *type_code != value.type_code {
                return Err(Error::TypeMismatch {
                    expected: format!("{:?}", type_code),
                    actual: format!("{:?}", value.type_code),
                });
            }

            match type_code {
                TypeCode::String => {
                    if let Some(col) = column.as_any_mut().downcast_mut::<ColumnString>() {
                        col.append(value.as_string()?);
                        Ok(())
                    } else {
                        Err(Error::Protocol("Failed to downcast String column".to_string()))
                    }
                }
                TypeCode::UInt8 => {
                    if let Some(col) = column.as_any_mut().downcast_mut::<ColumnUInt8>() {
                        let val = u8::from_le_bytes(value.data.as_slice().try_into().map_err(|_| {
                            Error::Protocol("Invalid UInt8 data".to_string())
                        })?);
                        col.append(val);
                        Ok(())
                    } else {
                        Err(Error::Protocol("Failed to downcast UInt8 column".to_string()))
                    }
                }
                TypeCode::UInt64 => {
                    if let Some(col) = column.as_any_mut().downcast_mut::<ColumnUInt64>() {
                        let val = u64::from_le_bytes(value.data.as_slice().try_into().map_err(|_| {
                            Error::Protocol("Invalid UInt64 data".to_string())
                        })?);
                        col.append(val);
                        Ok(())
                    } else {
                        Err(Error::Protocol("Failed to downcast UInt64 column".to_string()))
                    }
                }
                // Add more types as needed
                _ => Err(Error::Protocol(format!(
                    "append_column_item not implemented for type {:?}",
                    type_code
                ))),
            }
        }
        Type::Nullable { .. } => {
            if let Some(col) = column.as_any_mut().downcast_mut::<ColumnNullable>() {
                if value.type_code == TypeCode::Void {
                    col.append_null();
                    Ok(())
                } else {
                    // Get mutable access to the nested Arc<dyn Column>
                    let nested_arc = col.nested_mut();
                    let nested_mut = Arc::get_mut(nested_arc).ok_or_else(|| {
                        Error::Protocol(
                            "Cannot append to shared nullable column - column has multiple references"
                                .to_string(),
                        )
                    })?;
                    append_column_item(nested_mut, value)?;
                    col.append_non_null();
                    Ok(())
                }
            } else {
                Err(Error::Protocol("Failed to downcast Nullable column".to_string()))
            }
        }
        _ => Err(Error::Protocol(format!(
            "append_column_item not implemented for type {}",
            column.column_type().name()
        ))),
    }
}

/// Materialize the value at `index` into the broader, type-covering
/// [`Value`] representation. Unlike [`get_column_item`] (narrow, used only
/// for `LowCardinality` dictionary hashing), this covers the full type
/// matrix and is what [`crate::record_batch::RowProxy`] and codec decoding
/// build on.
pub fn get_value(column: &dyn Column, index: usize) -> Result<Value> {
    use crate::bigint::{I256, U256};
    use crate::column::array::ColumnArray;
    use crate::column::date::{ColumnDate, ColumnDate32, ColumnDateTime, ColumnDateTime64};
    use crate::column::decimal::ColumnDecimal;
    use crate::column::decimal256::ColumnDecimal256;
    use crate::column::dynamic::ColumnDynamic;
    use crate::column::enum_column::{ColumnEnum8, ColumnEnum16};
    use crate::column::ipv4::ColumnIpv4;
    use crate::column::ipv6::ColumnIpv6;
    use crate::column::json::ColumnJson;
    use crate::column::lowcardinality::ColumnLowCardinality;
    use crate::column::map::ColumnMap;
    use crate::column::string::{ColumnFixedString, ColumnString};
    use crate::column::tuple::ColumnTuple;
    use crate::column::uuid::ColumnUuid;
    use crate::column::variant::{ColumnVariant, NULL_DISCRIMINANT};
    use crate::types::Type;

    if index >= column.size() {
        return Err(Error::InvalidArgument(format!(
            "Index {} out of bounds (size: {})",
            index,
            column.size()
        )));
    }

    let downcast_err = |what: &str| Error::Protocol(format!("Failed to downcast {} column", what));

    match column.column_type() {
        Type::Simple(type_code) => match type_code {
            TypeCode::Void => Ok(Value::Null),
            TypeCode::Bool => {
                let col = column
                    .as_any()
                    .downcast_ref::<ColumnUInt8>()
                    .ok_or_else(|| downcast_err("Bool"))?;
                Ok(Value::Bool(col.at(index) != 0))
            }
            TypeCode::UInt8 => Ok(Value::UInt8(
                column.as_any().downcast_ref::<ColumnUInt8>().ok_or_else(|| downcast_err("UInt8"))?.at(index),
            )),
            TypeCode::UInt16 => Ok(Value::UInt16(
                column.as_any().downcast_ref::<ColumnUInt16>().ok_or_else(|| downcast_err("UInt16"))?.at(index),
            )),
            TypeCode::UInt32 => Ok(Value::UInt32(
                column.as_any().downcast_ref::<ColumnUInt32>().ok_or_else(|| downcast_err("UInt32"))?.at(index),
            )),
            TypeCode::UInt64 => Ok(Value::UInt64(
                column.as_any().downcast_ref::<ColumnUInt64>().ok_or_else(|| downcast_err("UInt64"))?.at(index),
            )),
            TypeCode::UInt128 => Ok(Value::UInt128(
                column.as_any().downcast_ref::<ColumnUInt128>().ok_or_else(|| downcast_err("UInt128"))?.at(index),
            )),
            TypeCode::UInt256 => Ok(Value::UInt256(
                column.as_any().downcast_ref::<ColumnVector<U256>>().ok_or_else(|| downcast_err("UInt256"))?.at(index),
            )),
            TypeCode::Int8 => Ok(Value::Int8(
                column.as_any().downcast_ref::<ColumnInt8>().ok_or_else(|| downcast_err("Int8"))?.at(index),
            )),
            TypeCode::Int16 => Ok(Value::Int16(
                column.as_any().downcast_ref::<ColumnInt16>().ok_or_else(|| downcast_err("Int16"))?.at(index),
            )),
            TypeCode::Int32 => Ok(Value::Int32(
                column.as_any().downcast_ref::<ColumnInt32>().ok_or_else(|| downcast_err("Int32"))?.at(index),
            )),
            TypeCode::Int64 => Ok(Value::Int64(
                column.as_any().downcast_ref::<ColumnInt64>().ok_or_else(|| downcast_err("Int64"))?.at(index),
            )),
            TypeCode::Int128 => Ok(Value::Int128(
                column.as_any().downcast_ref::<ColumnInt128>().ok_or_else(|| downcast_err("Int128"))?.at(index),
            )),
            TypeCode::Int256 => Ok(Value::Int256(
                column.as_any().downcast_ref::<ColumnVector<I256>>().ok_or_else(|| downcast_err("Int256"))?.at(index),
            )),
            TypeCode::Float32 => Ok(Value::Float32(
                column.as_any().downcast_ref::<ColumnFloat32>().ok_or_else(|| downcast_err("Float32"))?.at(index),
            )),
            TypeCode::Float64 => Ok(Value::Float64(
                column.as_any().downcast_ref::<ColumnFloat64>().ok_or_else(|| downcast_err("Float64"))?.at(index),
            )),
            TypeCode::String => Ok(Value::String(
                column.as_any().downcast_ref::<ColumnString>().ok_or_else(|| downcast_err("String"))?.at(index),
            )),
            TypeCode::Date => {
                let col = column.as_any().downcast_ref::<ColumnDate>().ok_or_else(|| downcast_err("Date"))?;
                Ok(Value::Date(col.timestamp_at(index)))
            }
            TypeCode::Date32 => {
                let col = column.as_any().downcast_ref::<ColumnDate32>().ok_or_else(|| downcast_err("Date32"))?;
                Ok(Value::Date(col.timestamp_at(index)))
            }
            TypeCode::UUID => {
                let col = column.as_any().downcast_ref::<ColumnUuid>().ok_or_else(|| downcast_err("UUID"))?;
                Ok(Value::Uuid(col.at(index)))
            }
            TypeCode::IPv4 => {
                let col = column.as_any().downcast_ref::<ColumnIpv4>().ok_or_else(|| downcast_err("IPv4"))?;
                Ok(Value::Ipv4(std::net::Ipv4Addr::from(col.at(index))))
            }
            TypeCode::IPv6 => {
                let col = column.as_any().downcast_ref::<ColumnIpv6>().ok_or_else(|| downcast_err("IPv6"))?;
                Ok(Value::Ipv6(std::net::Ipv6Addr::from(col.at(index))))
            }
            other => Err(Error::Protocol(format!(
                "get_value not implemented for type {:?}",
                other
            ))),
        },
        Type::FixedString { .. } => {
            let col = column
                .as_any()
                .downcast_ref::<ColumnFixedString>()
                .ok_or_else(|| downcast_err("FixedString"))?;
            Ok(Value::String(col.at(index)))
        }
        Type::DateTime { .. } => {
            let col = column
                .as_any()
                .downcast_ref::<ColumnDateTime>()
                .ok_or_else(|| downcast_err("DateTime"))?;
            Ok(Value::Date(col.at(index) as i64))
        }
        Type::DateTime64 { precision, .. } => {
            let col = column
                .as_any()
                .downcast_ref::<ColumnDateTime64>()
                .ok_or_else(|| downcast_err("DateTime64"))?;
            Ok(Value::DateTime64 { value: col.at(index), precision: *precision })
        }
        Type::Decimal { precision, scale } if *precision > 38 => {
            let col = column
                .as_any()
                .downcast_ref::<ColumnDecimal256>()
                .ok_or_else(|| downcast_err("Decimal256"))?;
            Ok(Value::Decimal { unscaled: col.at(index), scale: *scale })
        }
        Type::Decimal { scale, .. } => {
            let col = column
                .as_any()
                .downcast_ref::<ColumnDecimal>()
                .ok_or_else(|| downcast_err("Decimal"))?;
            Ok(Value::Decimal { unscaled: I256::from_i128(col.at(index)), scale: *scale })
        }
        Type::Enum8 { .. } => {
            let col = column
                .as_any()
                .downcast_ref::<ColumnEnum8>()
                .ok_or_else(|| downcast_err("Enum8"))?;
            Ok(Value::Enum {
                value: col.at(index) as i16,
                name: col.name_at(index).map(str::to_string),
            })
        }
        Type::Enum16 { .. } => {
            let col = column
                .as_any()
                .downcast_ref::<ColumnEnum16>()
                .ok_or_else(|| downcast_err("Enum16"))?;
            Ok(Value::Enum { value: col.at(index), name: col.name_at(index).map(str::to_string) })
        }
        Type::Nullable { .. } => {
            let col = column
                .as_any()
                .downcast_ref::<ColumnNullable>()
                .ok_or_else(|| downcast_err("Nullable"))?;
            if col.is_null(index) {
                Ok(Value::Null)
            } else {
                get_value(col.nested().as_ref(), index)
            }
        }
        Type::Array { .. } => {
            let col = column
                .as_any()
                .downcast_ref::<ColumnArray>()
                .ok_or_else(|| downcast_err("Array"))?;
            let (start, end) = col.get_array_range(index).ok_or_else(|| {
                Error::InvalidArgument(format!("Array index {} out of bounds", index))
            })?;
            let row = col.at(index);
            let mut items = Vec::with_capacity(end - start);
            for i in 0..(end - start) {
                items.push(get_value(row.as_ref(), i)?);
            }
            Ok(Value::Array(items))
        }
        Type::Tuple { .. } => {
            let col = column
                .as_any()
                .downcast_ref::<ColumnTuple>()
                .ok_or_else(|| downcast_err("Tuple"))?;
            let mut items = Vec::with_capacity(col.column_count());
            for i in 0..col.column_count() {
                items.push(get_value(col.column_at(i).as_ref(), index)?);
            }
            Ok(Value::Tuple(items))
        }
        Type::Map { .. } => {
            let col = column
                .as_any()
                .downcast_ref::<ColumnMap>()
                .ok_or_else(|| downcast_err("Map"))?;
            let row = col.at(index)?;
            let row_array =
                row.as_any().downcast_ref::<ColumnArray>().ok_or_else(|| downcast_err("Map row"))?;
            let entries_ref = row_array.at(0);
            let entries = entries_ref
                .as_any()
                .downcast_ref::<ColumnTuple>()
                .ok_or_else(|| downcast_err("Map entries"))?;
            let keys = entries.column_at(0);
            let values = entries.column_at(1);
            let mut pairs = Vec::with_capacity(entries.len());
            for i in 0..entries.len() {
                pairs.push((get_value(keys.as_ref(), i)?, get_value(values.as_ref(), i)?));
            }
            Ok(Value::Map(pairs))
        }
        Type::LowCardinality { .. } => {
            let col = column
                .as_any()
                .downcast_ref::<ColumnLowCardinality>()
                .ok_or_else(|| downcast_err("LowCardinality"))?;
            let dict_index = col.index_at(index) as usize;
            get_value(col.dictionary().as_ref(), dict_index)
        }
        Type::Variant { .. } => {
            let col = column
                .as_any()
                .downcast_ref::<ColumnVariant>()
                .ok_or_else(|| downcast_err("Variant"))?;
            let discriminant = col.discriminants()[index];
            if discriminant == NULL_DISCRIMINANT {
                return Ok(Value::Null);
            }
            let position = col.discriminants()[..index]
                .iter()
                .filter(|&&d| d == discriminant)
                .count();
            let inner = get_value(col.variant_at(discriminant as usize).as_ref(), position)?;
            Ok(Value::Variant(Box::new(inner)))
        }
        Type::Dynamic { .. } => {
            let col = column
                .as_any()
                .downcast_ref::<ColumnDynamic>()
                .ok_or_else(|| downcast_err("Dynamic"))?;
            let discriminant = col.discriminants()[index];
            if discriminant == NULL_DISCRIMINANT {
                return Ok(Value::Null);
            }
            let position = col.discriminants()[..index]
                .iter()
                .filter(|&&d| d == discriminant)
                .count();
            let inner = get_value(col.column_at(discriminant as usize).as_ref(), position)?;
            Ok(Value::Variant(Box::new(inner)))
        }
        Type::Json { .. } => {
            let col =
                column.as_any().downcast_ref::<ColumnJson>().ok_or_else(|| downcast_err("JSON"))?;
            // The dynamic overflow bucket tracks discovered concrete types, not
            // the path name each value was decoded under, so only the
            // statically declared typed paths can be named here; an untyped
            // path's value lands in the overflow without a recoverable key.
            let mut entries = Vec::with_capacity(col.typed_path_names().len());
            for path in col.typed_path_names() {
                let path_col = col.typed_path_column(path).expect("declared typed path");
                let value = get_value(path_col.as_ref(), index)?;
                if !value.is_null() {
                    entries.push((path.to_string(), value));
                }
            }
            Ok(Value::Object(entries))
        }
    }
}

/// Append `value` to `column`, coercing between compatible representations
/// (e.g. any integer [`Value`] variant into a narrower or wider numeric
/// column) and raising [`Error::Coercion`] when the value can't be
/// represented in the column's type or falls outside its range.
pub fn append_value(column: &mut dyn Column, value: &Value) -> Result<()> {
    use crate::bigint::{I256, U256};
    use crate::column::array::ColumnArray;
    use crate::column::decimal::ColumnDecimal;
    use crate::column::decimal256::ColumnDecimal256;
    use crate::column::enum_column::{ColumnEnum8, ColumnEnum16};
    use crate::column::ipv4::ColumnIpv4;
    use crate::column::ipv6::ColumnIpv6;
    use crate::column::map::ColumnMap;
    use crate::column::string::ColumnString;
    use crate::column::tuple::ColumnTuple;
    use crate::column::uuid::ColumnUuid;
    use crate::types::Type;
    use std::sync::Arc;

    let coercion_err = |column: &dyn Column, value: &Value| Error::Coercion {
        column: None,
        row: column.size(),
        type_name: column.column_type().name(),
        value: format!("{:?}", value),
    };

    match column.column_type().clone() {
        Type::Nullable { .. } => {
            let col = column
                .as_any_mut()
                .downcast_mut::<ColumnNullable>()
                .ok_or_else(|| Error::Protocol("Failed to downcast Nullable column".to_string()))?;
            if value.is_null() {
                col.append_null();
                return Ok(());
            }
            let nested = Arc::get_mut(col.nested_mut()).ok_or_else(|| {
                Error::Protocol(
                    "Cannot append to shared nullable column - column has multiple references"
                        .to_string(),
                )
            })?;
            append_value(nested, value)?;
            col.append_non_null();
            Ok(())
        }
        Type::Simple(type_code) => {
            let as_i128 = || value.as_i128().ok_or_else(|| coercion_err(column, value));
            match type_code {
                TypeCode::Bool => {
                    let b = match value {
                        Value::Bool(b) => *b,
                        other => other.as_i128().map(|v| v != 0).ok_or_else(|| {
                            coercion_err(column, value)
                        })?,
                    };
                    column
                        .as_any_mut()
                        .downcast_mut::<ColumnUInt8>()
                        .ok_or_else(|| Error::Protocol("Failed to downcast Bool column".to_string()))?
                        .append(b as u8);
                    Ok(())
                }
                TypeCode::UInt8 => {
                    let v = as_i128()?;
                    let v: u8 = v.try_into().map_err(|_| coercion_err(column, value))?;
                    column.as_any_mut().downcast_mut::<ColumnUInt8>().ok_or_else(|| Error::Protocol("Failed to downcast UInt8 column".to_string()))?.append(v);
                    Ok(())
                }
                TypeCode::UInt16 => {
                    let v = as_i128()?;
                    let v: u16 = v.try_into().map_err(|_| coercion_err(column, value))?;
                    column.as_any_mut().downcast_mut::<ColumnUInt16>().ok_or_else(|| Error::Protocol("Failed to downcast UInt16 column".to_string()))?.append(v);
                    Ok(())
                }
                TypeCode::UInt32 => {
                    let v = as_i128()?;
                    let v: u32 = v.try_into().map_err(|_| coercion_err(column, value))?;
                    column.as_any_mut().downcast_mut::<ColumnUInt32>().ok_or_else(|| Error::Protocol("Failed to downcast UInt32 column".to_string()))?.append(v);
                    Ok(())
                }
                TypeCode::UInt64 => {
                    let v = as_i128()?;
                    let v: u64 = v.try_into().map_err(|_| coercion_err(column, value))?;
                    column.as_any_mut().downcast_mut::<ColumnUInt64>().ok_or_else(|| Error::Protocol("Failed to downcast UInt64 column".to_string()))?.append(v);
                    Ok(())
                }
                TypeCode::Int8 => {
                    let v = as_i128()?;
                    let v: i8 = v.try_into().map_err(|_| coercion_err(column, value))?;
                    column.as_any_mut().downcast_mut::<ColumnInt8>().ok_or_else(|| Error::Protocol("Failed to downcast Int8 column".to_string()))?.append(v);
                    Ok(())
                }
                TypeCode::Int16 => {
                    let v = as_i128()?;
                    let v: i16 = v.try_into().map_err(|_| coercion_err(column, value))?;
                    column.as_any_mut().downcast_mut::<ColumnInt16>().ok_or_else(|| Error::Protocol("Failed to downcast Int16 column".to_string()))?.append(v);
                    Ok(())
                }
                TypeCode::Int32 => {
                    let v = as_i128()?;
                    let v: i32 = v.try_into().map_err(|_| coercion_err(column, value))?;
                    column.as_any_mut().downcast_mut::<ColumnInt32>().ok_or_else(|| Error::Protocol("Failed to downcast Int32 column".to_string()))?.append(v);
                    Ok(())
                }
                TypeCode::Int64 => {
                    let v = as_i128()?;
                    let v: i64 = v.try_into().map_err(|_| coercion_err(column, value))?;
                    column.as_any_mut().downcast_mut::<ColumnInt64>().ok_or_else(|| Error::Protocol("Failed to downcast Int64 column".to_string()))?.append(v);
                    Ok(())
                }
                TypeCode::Int128 => {
                    let v = as_i128()?;
                    column.as_any_mut().downcast_mut::<ColumnInt128>().ok_or_else(|| Error::Protocol("Failed to downcast Int128 column".to_string()))?.append(v);
                    Ok(())
                }
                TypeCode::UInt128 => {
                    let v = as_i128()?;
                    let v: u128 = v.try_into().map_err(|_| coercion_err(column, value))?;
                    column.as_any_mut().downcast_mut::<ColumnUInt128>().ok_or_else(|| Error::Protocol("Failed to downcast UInt128 column".to_string()))?.append(v);
                    Ok(())
                }
                TypeCode::Int256 => {
                    let v = match value {
                        Value::Int256(v) => *v,
                        other => I256::from_i128(
                            other.as_i128().ok_or_else(|| coercion_err(column, value))?,
                        ),
                    };
                    column
                        .as_any_mut()
                        .downcast_mut::<ColumnVector<I256>>()
                        .ok_or_else(|| Error::Protocol("Failed to downcast Int256 column".to_string()))?
                        .append(v);
                    Ok(())
                }
                TypeCode::UInt256 => {
                    let v = match value {
                        Value::UInt256(v) => *v,
                        other => U256::from_u128(
                            other
                                .as_i128()
                                .ok_or_else(|| coercion_err(column, value))?
                                .try_into()
                                .map_err(|_| coercion_err(column, value))?,
                        ),
                    };
                    column
                        .as_any_mut()
                        .downcast_mut::<ColumnVector<U256>>()
                        .ok_or_else(|| Error::Protocol("Failed to downcast UInt256 column".to_string()))?
                        .append(v);
                    Ok(())
                }
                TypeCode::UUID => {
                    let v = match value {
                        Value::Uuid(v) => *v,
                        other => return Err(coercion_err(column, other)),
                    };
                    column.as_any_mut().downcast_mut::<ColumnUuid>().ok_or_else(|| Error::Protocol("Failed to downcast UUID column".to_string()))?.append(v);
                    Ok(())
                }
                TypeCode::IPv4 => {
                    let v = match value {
                        Value::Ipv4(v) => u32::from(*v),
                        other => return Err(coercion_err(column, other)),
                    };
                    column.as_any_mut().downcast_mut::<ColumnIpv4>().ok_or_else(|| Error::Protocol("Failed to downcast IPv4 column".to_string()))?.append(v);
                    Ok(())
                }
                TypeCode::IPv6 => {
                    let v = match value {
                        Value::Ipv6(v) => v.octets(),
                        other => return Err(coercion_err(column, other)),
                    };
                    column.as_any_mut().downcast_mut::<ColumnIpv6>().ok_or_else(|| Error::Protocol("Failed to downcast IPv6 column".to_string()))?.append(v);
                    Ok(())
                }
                TypeCode::Float32 => {
                    let v = match value {
                        Value::Float32(v) => *v,
                        Value::Float64(v) => *v as f32,
                        other => other.as_i128().map(|v| v as f32).ok_or_else(|| coercion_err(column, value))?,
                    };
                    column.as_any_mut().downcast_mut::<ColumnFloat32>().ok_or_else(|| Error::Protocol("Failed to downcast Float32 column".to_string()))?.append(v);
                    Ok(())
                }
                TypeCode::Float64 => {
                    let v = match value {
                        Value::Float64(v) => *v,
                        Value::Float32(v) => *v as f64,
                        other => other.as_i128().map(|v| v as f64).ok_or_else(|| coercion_err(column, value))?,
                    };
                    column.as_any_mut().downcast_mut::<ColumnFloat64>().ok_or_else(|| Error::Protocol("Failed to downcast Float64 column".to_string()))?.append(v);
                    Ok(())
                }
                TypeCode::String => {
                    let s = match value {
                        Value::String(s) => s.clone(),
                        other => return Err(coercion_err(column, other)),
                    };
                    column.as_any_mut().downcast_mut::<ColumnString>().ok_or_else(|| Error::Protocol("Failed to downcast String column".to_string()))?.append(&s);
                    Ok(())
                }
                _ => Err(Error::UnsupportedFeature(format!(
                    "append_value not implemented for type {:?}",
                    type_code
                ))),
            }
        }
        Type::Decimal { precision, scale } if precision > 38 => {
            let unscaled = match value {
                Value::Decimal { unscaled, .. } => *unscaled,
                other => return Err(coercion_err(column, other)),
            };
            let _ = scale;
            column
                .as_any_mut()
                .downcast_mut::<ColumnDecimal256>()
                .ok_or_else(|| Error::Protocol("Failed to downcast Decimal256 column".to_string()))?
                .append(unscaled);
            Ok(())
        }
        Type::Decimal { .. } => {
            let unscaled = match value {
                Value::Decimal { unscaled, .. } => unscaled.to_i128().ok_or_else(|| coercion_err(column, value))?,
                other => return Err(coercion_err(column, other)),
            };
            column
                .as_any_mut()
                .downcast_mut::<ColumnDecimal>()
                .ok_or_else(|| Error::Protocol("Failed to downcast Decimal column".to_string()))?
                .append(unscaled);
            Ok(())
        }
        Type::Enum8 { .. } => {
            let (raw, name) = match value {
                Value::Enum { value, name } => (*value as i8, name.as_deref()),
                other => return Err(coercion_err(column, other)),
            };
            let col = column
                .as_any_mut()
                .downcast_mut::<ColumnEnum8>()
                .ok_or_else(|| Error::Protocol("Failed to downcast Enum8 column".to_string()))?;
            match name {
                Some(name) => col.append_name(name),
                None => {
                    col.append_value(raw);
                    Ok(())
                }
            }
        }
        Type::Enum16 { .. } => {
            let (raw, name) = match value {
                Value::Enum { value, name } => (*value, name.as_deref()),
                other => return Err(coercion_err(column, other)),
            };
            let col = column
                .as_any_mut()
                .downcast_mut::<ColumnEnum16>()
                .ok_or_else(|| Error::Protocol("Failed to downcast Enum16 column".to_string()))?;
            match name {
                Some(name) => col.append_name(name),
                None => {
                    col.append_value(raw);
                    Ok(())
                }
            }
        }
        Type::Array { .. } => {
            let items = match value {
                Value::Array(items) => items,
                other => return Err(coercion_err(column, other)),
            };
            let col = column
                .as_any_mut()
                .downcast_mut::<ColumnArray>()
                .ok_or_else(|| Error::Protocol("Failed to downcast Array column".to_string()))?;
            let nested = Arc::get_mut(col.nested_mut()).ok_or_else(|| {
                Error::Protocol(
                    "Cannot append to shared array column - column has multiple references"
                        .to_string(),
                )
            })?;
            for item in items {
                append_value(nested, item)?;
            }
            col.append_len(items.len() as u64);
            Ok(())
        }
        Type::Tuple { .. } => {
            let items = match value {
                Value::Tuple(items) => items,
                other => return Err(coercion_err(column, other)),
            };
            let col = column
                .as_any_mut()
                .downcast_mut::<ColumnTuple>()
                .ok_or_else(|| Error::Protocol("Failed to downcast Tuple column".to_string()))?;
            if items.len() != col.column_count() {
                return Err(Error::Coercion {
                    column: None,
                    row: col.size(),
                    type_name: col.column_type().name(),
                    value: format!("{:?}", value),
                });
            }
            for (i, item) in items.iter().enumerate() {
                append_value(col.column_at_mut(i), item)?;
            }
            Ok(())
        }
        Type::Map { .. } => {
            let pairs = match value {
                Value::Map(pairs) => pairs,
                other => return Err(coercion_err(column, other)),
            };
            let col = column
                .as_any_mut()
                .downcast_mut::<ColumnMap>()
                .ok_or_else(|| Error::Protocol("Failed to downcast Map column".to_string()))?;
            let array = col.data_mut::<ColumnArray>();
            let nested = Arc::get_mut(array.nested_mut()).ok_or_else(|| {
                Error::Protocol(
                    "Cannot append to shared map column - column has multiple references"
                        .to_string(),
                )
            })?;
            let tuple = nested
                .as_any_mut()
                .downcast_mut::<ColumnTuple>()
                .ok_or_else(|| Error::Protocol("Map entries column is not a Tuple".to_string()))?;
            for (key, val) in pairs {
                append_value(tuple.column_at_mut(0), key)?;
                append_value(tuple.column_at_mut(1), val)?;
            }
            array.append_len(pairs.len() as u64);
            Ok(())
        }
        other => Err(Error::UnsupportedFeature(format!(
            "append_value not implemented for type {}",
            other.name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_value_primitives() {
        let v = ColumnValue::from_u64(42);
        assert_eq!(v.type_code, TypeCode::UInt64);
        assert_eq!(v.data, 42u64.to_le_bytes());

        let s = ColumnValue::from_string("hello");
        assert_eq!(s.type_code, TypeCode::String);
        assert_eq!(s.as_string().unwrap(), "hello");
    }

    #[test]
    fn test_hash_computation() {
        let v1 = ColumnValue::from_string("test");
        let v2 = ColumnValue::from_string("test");
        let v3 = ColumnValue::from_string("different");

        let h1 = compute_hash_key(&v1);
        let h2 = compute_hash_key(&v2);
        let h3 = compute_hash_key(&v3);

        // Same values should have same hash
        assert_eq!(h1, h2);
        // Different values should (likely) have different hash
        assert_ne!(h1, h3);
    }

    #[test]
    fn test_void_hash() {
        let void = ColumnValue::void();
        let hash = compute_hash_key(&void);
        assert_eq!(hash, (0, 0));
    }
}
