//! Dynamic column type (`Dynamic`, `Dynamic(max_types=N)`).
//!
//! Self-describing column: the set of concrete types actually present is
//! part of the wire data rather than the declared type, so a `ColumnDynamic`
//! discovers its variant columns from `load_prefix` instead of at
//! construction time. This is the "flattened V3" shape: a version tag, a
//! list of discovered type names, then per row a discriminant selecting one
//! of them (or [`NULL_DISCRIMINANT`](super::variant::NULL_DISCRIMINANT)).
//!
//! ## Wire Format
//!
//! ```text
//! prefix:
//!   [version: UInt8]
//!   [num_types: varint]
//!   ( [type_name: length-prefixed string] ) * num_types
//! body:
//!   [discriminant: UInt8] * num_rows
//!   for each discovered type, in declared order: dense column body
//! ```

use super::variant::NULL_DISCRIMINANT;
use super::{
    Column,
    ColumnRef,
};
use crate::{
    io::buffer_utils::{
        read_string,
        read_varint,
        write_string,
        write_varint,
    },
    types::Type,
    Error,
    Result,
};
use bytes::BytesMut;
use std::sync::Arc;

/// The only serialization version this crate emits or expects.
pub const DYNAMIC_SERIALIZATION_VERSION: u8 = 1;

/// Column for the `Dynamic` type: an open-ended, self-describing union of
/// concrete types discovered at decode time, capped at `max_types`.
pub struct ColumnDynamic {
    type_: Type,
    discriminants: Vec<u8>,
    dynamic_types: Vec<Type>,
    columns: Vec<ColumnRef>,
}

impl ColumnDynamic {
    /// Build a new, empty `ColumnDynamic` with no discovered types yet.
    pub fn new(type_: Type) -> Self {
        Self {
            type_,
            discriminants: Vec::new(),
            dynamic_types: Vec::new(),
            columns: Vec::new(),
        }
    }

    /// Maximum distinct concrete types this column will track, if capped.
    pub fn max_types(&self) -> Option<usize> {
        match &self.type_ {
            Type::Dynamic { max_types } => *max_types,
            _ => None,
        }
    }

    /// The concrete types discovered so far, in discriminant order.
    pub fn dynamic_types(&self) -> &[Type] {
        &self.dynamic_types
    }

    /// Per-row discriminant bytes, indexing into [`Self::dynamic_types`]
    /// (or [`NULL_DISCRIMINANT`] for a null row).
    pub fn discriminants(&self) -> &[u8] {
        &self.discriminants
    }

    /// The column backing discovered type `index`.
    pub fn column_at(&self, index: usize) -> ColumnRef {
        self.columns[index].clone()
    }

    /// Shallow copy: shares the underlying column `Arc`s rather than
    /// deep-copying data. `ColumnDynamic` doesn't derive `Clone` since its
    /// discovered columns are only known after construction.
    pub fn clone_as_dynamic(&self) -> ColumnDynamic {
        ColumnDynamic {
            type_: self.type_.clone(),
            discriminants: self.discriminants.clone(),
            dynamic_types: self.dynamic_types.clone(),
            columns: self.columns.clone(),
        }
    }

    fn counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.columns.len()];
        for &d in &self.discriminants {
            if (d as usize) < counts.len() {
                counts[d as usize] += 1;
            }
        }
        counts
    }
}

impl Column for ColumnDynamic {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn size(&self) -> usize {
        self.discriminants.len()
    }

    fn clear(&mut self) {
        self.discriminants.clear();
        for col in &mut self.columns {
            let col_mut = Arc::get_mut(col)
                .expect("Cannot clear shared dynamic column - column has multiple references");
            col_mut.clear();
        }
    }

    fn reserve(&mut self, new_cap: usize) {
        self.discriminants.reserve(new_cap);
    }

    fn append_column(&mut self, other: ColumnRef) -> Result<()> {
        let other =
            other.as_any().downcast_ref::<ColumnDynamic>().ok_or_else(|| {
                Error::TypeMismatch {
                    expected: self.type_.name(),
                    actual: other.column_type().name(),
                }
            })?;

        if self.dynamic_types.is_empty() {
            self.dynamic_types = other.dynamic_types.clone();
            self.columns = other.columns.iter().map(|c| c.clone_empty()).collect();
        } else if self.dynamic_types != other.dynamic_types {
            return Err(Error::UnsupportedFeature(
                "appending Dynamic columns with differing discovered type sets"
                    .to_string(),
            ));
        }

        self.discriminants.extend_from_slice(&other.discriminants);
        for (col, other_col) in self.columns.iter_mut().zip(&other.columns) {
            let col_mut = Arc::get_mut(col).ok_or_else(|| {
                Error::Protocol(
                    "Cannot append to shared dynamic column - column has multiple references"
                        .to_string(),
                )
            })?;
            col_mut.append_column(other_col.clone())?;
        }

        Ok(())
    }

    fn load_prefix(&mut self, buffer: &mut &[u8], _rows: usize) -> Result<()> {
        if buffer.is_empty() {
            return Err(Error::BufferUnderflow { need: 1, have: 0, offset: 0 });
        }
        let version = buffer[0];
        *buffer = &buffer[1..];
        if version != DYNAMIC_SERIALIZATION_VERSION {
            return Err(Error::UnsupportedFeature(format!(
                "Dynamic serialization version {}",
                version
            )));
        }

        let num_types = read_varint(buffer)? as usize;
        let mut dynamic_types = Vec::with_capacity(num_types);
        let mut columns = Vec::with_capacity(num_types);
        for _ in 0..num_types {
            let type_name = read_string(buffer)?;
            let ty = Type::parse(&type_name)?;
            let col = crate::io::block_stream::create_column(&ty)?;
            dynamic_types.push(ty);
            columns.push(col);
        }

        self.dynamic_types = dynamic_types;
        self.columns = columns;
        Ok(())
    }

    fn load_from_buffer(
        &mut self,
        buffer: &mut &[u8],
        rows: usize,
    ) -> Result<()> {
        if buffer.len() < rows {
            return Err(Error::BufferUnderflow {
                need: rows,
                have: buffer.len(),
                offset: 0,
            });
        }
        self.discriminants = buffer[..rows].to_vec();
        *buffer = &buffer[rows..];

        let counts = self.counts();
        for (col, count) in self.columns.iter_mut().zip(counts) {
            let col_mut = Arc::get_mut(col).ok_or_else(|| {
                Error::Protocol(
                    "Cannot load into shared dynamic column - column has multiple references"
                        .to_string(),
                )
            })?;
            col_mut.load_from_buffer(buffer, count)?;
        }

        Ok(())
    }

    fn save_prefix(&self, buffer: &mut BytesMut) -> Result<()> {
        buffer.extend_from_slice(&[DYNAMIC_SERIALIZATION_VERSION]);
        write_varint(buffer, self.dynamic_types.len() as u64);
        for ty in &self.dynamic_types {
            write_string(buffer, &ty.name());
        }
        Ok(())
    }

    fn save_to_buffer(&self, buffer: &mut BytesMut) -> Result<()> {
        buffer.extend_from_slice(&self.discriminants);
        for col in &self.columns {
            col.save_to_buffer(buffer)?;
        }
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        let mut empty = ColumnDynamic::new(self.type_.clone());
        empty.dynamic_types = self.dynamic_types.clone();
        empty.columns = self.columns.iter().map(|c| c.clone_empty()).collect();
        Arc::new(empty)
    }

    fn slice(&self, begin: usize, len: usize) -> Result<ColumnRef> {
        if begin + len > self.size() {
            return Err(Error::InvalidArgument(format!(
                "Slice out of bounds: begin={}, len={}, size={}",
                begin,
                len,
                self.size()
            )));
        }

        let sub_discriminants = self.discriminants[begin..begin + len].to_vec();

        let mut offsets = vec![0usize; self.columns.len()];
        for &d in &self.discriminants[..begin] {
            if (d as usize) < offsets.len() {
                offsets[d as usize] += 1;
            }
        }
        let mut lengths = vec![0usize; self.columns.len()];
        for &d in &sub_discriminants {
            if (d as usize) < lengths.len() {
                lengths[d as usize] += 1;
            }
        }

        let mut sliced_columns = Vec::with_capacity(self.columns.len());
        for i in 0..self.columns.len() {
            sliced_columns.push(self.columns[i].slice(offsets[i], lengths[i])?);
        }

        let mut result = ColumnDynamic::new(self.type_.clone());
        result.dynamic_types = self.dynamic_types.clone();
        result.discriminants = sub_discriminants;
        result.columns = sliced_columns;
        Ok(Arc::new(result))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
