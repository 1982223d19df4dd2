//! Variant column type (`Variant(T0, T1, ...)`).
//!
//! ## Wire Format
//!
//! ```text
//! [discriminant: UInt8] * num_rows   (255 marks a NULL row)
//! for each variant type, in declared order:
//!   dense column body containing only the rows whose discriminant selected it
//! ```

use super::{
    Column,
    ColumnRef,
};
use crate::{
    types::Type,
    Error,
    Result,
};
use bytes::BytesMut;
use std::sync::Arc;

/// Discriminant value marking a NULL row (no payload in any variant column).
pub const NULL_DISCRIMINANT: u8 = 255;

/// Column for `Variant(T0, ..., Tk-1)`: each row holds exactly one of the
/// declared alternative types, selected by a per-row discriminant byte.
pub struct ColumnVariant {
    type_: Type,
    discriminants: Vec<u8>,
    variants: Vec<ColumnRef>,
}

impl ColumnVariant {
    /// Build a new, empty `ColumnVariant`. `variants` must have one empty
    /// column per alternative type, in the order `type_`'s `Type::Variant`
    /// declares them.
    pub fn new(type_: Type, variants: Vec<ColumnRef>) -> Self {
        Self { type_, discriminants: Vec::new(), variants }
    }

    /// Number of declared alternative types.
    pub fn variant_count(&self) -> usize {
        self.variants.len()
    }

    /// The column backing alternative `index`.
    pub fn variant_at(&self, index: usize) -> ColumnRef {
        self.variants[index].clone()
    }

    /// Mutable access to the column backing alternative `index`, for
    /// appending a value that has already been routed to it.
    pub fn variant_at_mut(&mut self, index: usize) -> &mut dyn Column {
        Arc::get_mut(&mut self.variants[index])
            .expect("Cannot get mutable reference to shared variant column")
    }

    /// The per-row discriminants (`NULL_DISCRIMINANT` marks a null row).
    pub fn discriminants(&self) -> &[u8] {
        &self.discriminants
    }

    /// Append a row whose value lives in variant `discriminant`'s column;
    /// the caller must separately append that value via
    /// [`variant_at_mut`](Self::variant_at_mut).
    pub fn append_discriminant(&mut self, discriminant: u8) {
        self.discriminants.push(discriminant);
    }

    /// Append a NULL row.
    pub fn append_null(&mut self) {
        self.discriminants.push(NULL_DISCRIMINANT);
    }

    fn counts(&self) -> Vec<usize> {
        let mut counts = vec![0usize; self.variants.len()];
        for &d in &self.discriminants {
            if (d as usize) < counts.len() {
                counts[d as usize] += 1;
            }
        }
        counts
    }
}

impl Column for ColumnVariant {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn size(&self) -> usize {
        self.discriminants.len()
    }

    fn clear(&mut self) {
        self.discriminants.clear();
        for col in &mut self.variants {
            let col_mut = Arc::get_mut(col)
                .expect("Cannot clear shared variant column - column has multiple references");
            col_mut.clear();
        }
    }

    fn reserve(&mut self, new_cap: usize) {
        self.discriminants.reserve(new_cap);
    }

    fn append_column(&mut self, other: ColumnRef) -> Result<()> {
        let other =
            other.as_any().downcast_ref::<ColumnVariant>().ok_or_else(|| {
                Error::TypeMismatch {
                    expected: self.type_.name(),
                    actual: other.column_type().name(),
                }
            })?;

        if self.variants.len() != other.variants.len() {
            return Err(Error::TypeMismatch {
                expected: format!("Variant with {} alternatives", self.variants.len()),
                actual: format!("Variant with {} alternatives", other.variants.len()),
            });
        }

        self.discriminants.extend_from_slice(&other.discriminants);
        for (i, col) in self.variants.iter_mut().enumerate() {
            let col_mut = Arc::get_mut(col).ok_or_else(|| {
                Error::Protocol(
                    "Cannot append to shared variant column - column has multiple references"
                        .to_string(),
                )
            })?;
            col_mut.append_column(other.variants[i].clone())?;
        }

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
        for (col, count) in self.variants.iter_mut().zip(counts) {
            let col_mut = Arc::get_mut(col).ok_or_else(|| {
                Error::Protocol(
                    "Cannot load into shared variant column - column has multiple references"
                        .to_string(),
                )
            })?;
            col_mut.load_from_buffer(buffer, count)?;
        }

        Ok(())
    }

    fn save_to_buffer(&self, buffer: &mut BytesMut) -> Result<()> {
        buffer.extend_from_slice(&self.discriminants);
        for col in &self.variants {
            col.save_to_buffer(buffer)?;
        }
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        let empty_variants: Vec<ColumnRef> =
            self.variants.iter().map(|c| c.clone_empty()).collect();
        Arc::new(ColumnVariant::new(self.type_.clone(), empty_variants))
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

        // Offset into each variant column = count of rows selecting it
        // before `begin`; length = count of rows selecting it within the
        // slice window.
        let mut offsets = vec![0usize; self.variants.len()];
        for &d in &self.discriminants[..begin] {
            if (d as usize) < offsets.len() {
                offsets[d as usize] += 1;
            }
        }
        let mut lengths = vec![0usize; self.variants.len()];
        for &d in &sub_discriminants {
            if (d as usize) < lengths.len() {
                lengths[d as usize] += 1;
            }
        }

        let mut sliced_variants = Vec::with_capacity(self.variants.len());
        for i in 0..self.variants.len() {
            sliced_variants.push(self.variants[i].slice(offsets[i], lengths[i])?);
        }

        let mut result = ColumnVariant::new(self.type_.clone(), sliced_variants);
        result.discriminants = sub_discriminants;
        Ok(Arc::new(result))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{
        ColumnString,
        ColumnUInt64,
    };

    fn sample() -> ColumnVariant {
        let variant_type =
            Type::variant(vec![Type::uint64(), Type::string()]);
        let col0 = Arc::new(ColumnUInt64::new(Type::uint64())) as ColumnRef;
        let col1 = Arc::new(ColumnString::new(Type::string())) as ColumnRef;
        let mut variant = ColumnVariant::new(variant_type, vec![col0, col1]);

        variant.append_discriminant(0);
        variant.variant_at_mut(0).as_any_mut()
            .downcast_mut::<ColumnUInt64>().unwrap().append(42);

        variant.append_discriminant(1);
        variant.variant_at_mut(1).as_any_mut()
            .downcast_mut::<ColumnString>().unwrap().append("hi");

        variant.append_null();

        variant
    }

    #[test]
    fn test_variant_round_trip() {
        let variant = sample();
        assert_eq!(variant.size(), 3);

        let mut buffer = BytesMut::new();
        variant.save_to_buffer(&mut buffer).unwrap();

        let variant_type =
            Type::variant(vec![Type::uint64(), Type::string()]);
        let col0 = Arc::new(ColumnUInt64::new(Type::uint64())) as ColumnRef;
        let col1 = Arc::new(ColumnString::new(Type::string())) as ColumnRef;
        let mut decoded = ColumnVariant::new(variant_type, vec![col0, col1]);

        let mut slice: &[u8] = &buffer;
        decoded.load_from_buffer(&mut slice, 3).unwrap();

        assert_eq!(decoded.discriminants(), &[0u8, 1, NULL_DISCRIMINANT]);
        assert_eq!(decoded.variant_at(0).size(), 1);
        assert_eq!(decoded.variant_at(1).size(), 1);
    }

    #[test]
    fn test_variant_slice() {
        let variant = sample();
        let sliced = variant.slice(1, 2).unwrap();
        let sliced = sliced.as_any().downcast_ref::<ColumnVariant>().unwrap();
        assert_eq!(sliced.size(), 2);
        assert_eq!(sliced.discriminants(), &[1u8, NULL_DISCRIMINANT]);
        assert_eq!(sliced.variant_at(1).size(), 1);
    }
}
