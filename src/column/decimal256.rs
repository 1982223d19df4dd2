//! Decimal256 column: precision > 38, backed by [`crate::bigint::I256`]
//! rather than `i128`. Grounded on [`super::decimal::ColumnDecimal`]'s
//! string-parsing/formatting and storage-delegation pattern; kept as a
//! separate type rather than folded into `ColumnDecimal` since its
//! internal representation and the arithmetic needed to scale it differ.

use super::{
    Column,
    ColumnInt256,
    ColumnRef,
};
use crate::{
    bigint::I256,
    types::Type,
    Error,
    Result,
};
use bytes::BytesMut;
use std::sync::Arc;

/// Column for `Decimal256(scale)` (precision 39-76), stored as scaled
/// `I256` values.
pub struct ColumnDecimal256 {
    type_: Type,
    scale: usize,
    data: ColumnRef,
}

impl ColumnDecimal256 {
    /// Create a new empty column for the given `Decimal(precision > 38,
    /// scale)` type.
    ///
    /// # Panics
    ///
    /// Panics if `type_` is not a `Type::Decimal`.
    pub fn new(type_: Type) -> Self {
        let scale = match &type_ {
            Type::Decimal { scale, .. } => *scale,
            _ => panic!("ColumnDecimal256 requires Decimal type"),
        };

        let data: ColumnRef = Arc::new(ColumnInt256::new());
        Self { type_, scale, data }
    }

    /// Append a decimal value parsed from a string like `"123.45"`.
    pub fn append_from_string(&mut self, s: &str) -> Result<()> {
        let value = parse_decimal256(s, self.scale)?;
        self.append(value);
        Ok(())
    }

    /// Append a raw scaled `I256` value.
    pub fn append(&mut self, value: I256) {
        let data_mut =
            Arc::get_mut(&mut self.data).expect("Cannot modify shared column");
        data_mut
            .as_any_mut()
            .downcast_mut::<ColumnInt256>()
            .expect("Expected ColumnInt256")
            .append(value);
    }

    /// Get the raw scaled value at `index`.
    pub fn at(&self, index: usize) -> I256 {
        self.data
            .as_any()
            .downcast_ref::<ColumnInt256>()
            .expect("Expected ColumnInt256")
            .at(index)
    }

    /// Format the value at `index` as a decimal string.
    pub fn as_string(&self, index: usize) -> String {
        format_decimal256(self.at(index), self.scale)
    }

    /// Digits after the decimal point.
    pub fn scale(&self) -> usize {
        self.scale
    }

    /// Number of values in this column.
    pub fn len(&self) -> usize {
        self.data.size()
    }

    /// Returns `true` if the column contains no values.
    pub fn is_empty(&self) -> bool {
        self.data.size() == 0
    }
}

impl Column for ColumnDecimal256 {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn size(&self) -> usize {
        self.data.size()
    }

    fn clear(&mut self) {
        let data_mut =
            Arc::get_mut(&mut self.data).expect("Cannot modify shared column");
        data_mut.clear();
    }

    fn reserve(&mut self, new_cap: usize) {
        let data_mut =
            Arc::get_mut(&mut self.data).expect("Cannot modify shared column");
        data_mut.reserve(new_cap);
    }

    fn append_column(&mut self, other: ColumnRef) -> Result<()> {
        let other = other
            .as_any()
            .downcast_ref::<ColumnDecimal256>()
            .ok_or_else(|| Error::TypeMismatch {
                expected: self.type_.name(),
                actual: other.column_type().name(),
            })?;

        if self.scale != other.scale {
            return Err(Error::TypeMismatch {
                expected: format!("Decimal256(scale={})", self.scale),
                actual: format!("Decimal256(scale={})", other.scale),
            });
        }

        let data_mut =
            Arc::get_mut(&mut self.data).expect("Cannot modify shared column");
        data_mut.append_column(other.data.clone())
    }

    fn load_from_buffer(
        &mut self,
        buffer: &mut &[u8],
        rows: usize,
    ) -> Result<()> {
        let data_mut =
            Arc::get_mut(&mut self.data).expect("Cannot modify shared column");
        data_mut.load_from_buffer(buffer, rows)
    }

    fn save_to_buffer(&self, buffer: &mut BytesMut) -> Result<()> {
        self.data.save_to_buffer(buffer)
    }

    fn clone_empty(&self) -> ColumnRef {
        Arc::new(ColumnDecimal256::new(self.type_.clone()))
    }

    fn slice(&self, begin: usize, len: usize) -> Result<ColumnRef> {
        let sliced_data = self.data.slice(begin, len)?;
        let mut result = ColumnDecimal256::new(self.type_.clone());
        result.data = sliced_data;
        Ok(Arc::new(result))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

fn pow10_256(scale: u32) -> I256 {
    let mut value = I256::from_i64(1);
    let ten = I256::from_i64(10);
    for _ in 0..scale {
        value = mul_i256(value, ten);
    }
    value
}

/// Schoolbook multiply via u128 half-limb products; adequate for the small
/// scale factors (<= 76 digits) decimal columns actually use.
fn mul_i256(a: I256, b: I256) -> I256 {
    let negative = a.is_negative() != b.is_negative();
    let a_mag = magnitude(a);
    let b_mag = magnitude(b);

    let mut result = [0u128; 4];
    for (i, &ai) in a_mag.0.iter().enumerate() {
        let mut carry = 0u128;
        for (j, &bj) in b_mag.0.iter().enumerate() {
            if i + j >= 4 {
                continue;
            }
            let product = ai as u128 * bj as u128 + result[i + j] + carry;
            result[i + j] = product & 0xFFFF_FFFF_FFFF_FFFF;
            carry = product >> 64;
        }
    }
    let limbs = [
        result[0] as u64,
        result[1] as u64,
        result[2] as u64,
        result[3] as u64,
    ];
    let magnitude = I256(limbs);
    if negative {
        negate(magnitude)
    } else {
        magnitude
    }
}

fn magnitude(v: I256) -> I256 {
    if v.is_negative() {
        negate(v)
    } else {
        v
    }
}

fn negate(v: I256) -> I256 {
    let mut limbs = v.0;
    for limb in limbs.iter_mut() {
        *limb = !*limb;
    }
    let mut carry = 1u64;
    for limb in limbs.iter_mut() {
        let (sum, overflowed) = limb.overflowing_add(carry);
        *limb = sum;
        carry = overflowed as u64;
        if carry == 0 {
            break;
        }
    }
    I256(limbs)
}

/// Parse a decimal string like `"123.45"` into a scaled `I256`.
pub(crate) fn parse_decimal256(s: &str, scale: usize) -> Result<I256> {
    let s = s.trim();
    let (sign, s) = if let Some(stripped) = s.strip_prefix('-') {
        (-1i64, stripped)
    } else if let Some(stripped) = s.strip_prefix('+') {
        (1, stripped)
    } else {
        (1, s)
    };

    let parts: Vec<&str> = s.split('.').collect();
    if parts.len() > 2 {
        return Err(Error::Protocol(format!("Invalid decimal format: {}", s)));
    }

    let integer_part = parse_i256_digits(parts[0])?;

    let fractional_part = if parts.len() == 2 {
        let frac_str = parts[1];
        if frac_str.len() > scale {
            return Err(Error::Protocol(format!(
                "Decimal fractional part exceeds scale: {} > {}",
                frac_str.len(),
                scale
            )));
        }
        let mut padded = frac_str.to_string();
        while padded.len() < scale {
            padded.push('0');
        }
        parse_i256_digits(&padded)?
    } else {
        I256::ZERO
    };

    let scaled =
        add_i256(mul_i256(integer_part, pow10_256(scale as u32)), fractional_part);
    Ok(if sign < 0 { negate(scaled) } else { scaled })
}

fn add_i256(a: I256, b: I256) -> I256 {
    let mut limbs = [0u64; 4];
    let mut carry = 0u64;
    for i in 0..4 {
        let (sum, overflow1) = a.0[i].overflowing_add(b.0[i]);
        let (sum, overflow2) = sum.overflowing_add(carry);
        limbs[i] = sum;
        carry = (overflow1 || overflow2) as u64;
    }
    I256(limbs)
}

fn parse_i256_digits(s: &str) -> Result<I256> {
    let mut value = I256::ZERO;
    let ten = I256::from_i64(10);
    for c in s.chars() {
        let digit = c.to_digit(10).ok_or_else(|| {
            Error::Protocol(format!("Invalid decimal digit: {}", c))
        })?;
        value = add_i256(mul_i256(value, ten), I256::from_i64(digit as i64));
    }
    Ok(value)
}

/// Format a scaled `I256` back into a decimal string.
pub(crate) fn format_decimal256(value: I256, scale: usize) -> String {
    let negative = value.is_negative();
    let magnitude = magnitude(value);
    let digits = magnitude.to_string();

    if scale == 0 {
        return if negative { format!("-{}", digits) } else { digits };
    }

    let digits = if digits.len() <= scale {
        format!("{:0>width$}", digits, width = scale + 1)
    } else {
        digits
    };
    let split_at = digits.len() - scale;
    let (int_part, frac_part) = digits.split_at(split_at);
    let sign = if negative { "-" } else { "" };
    format!("{}{}.{}", sign, int_part, frac_part)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal256_round_trip_string() {
        let mut col = ColumnDecimal256::new(Type::decimal(50, 10));
        col.append_from_string("12345.6789").unwrap();
        col.append_from_string("-999.0001").unwrap();
        assert_eq!(col.as_string(0), "12345.6789000000");
        assert_eq!(col.as_string(1), "-999.0001000000");
    }

    #[test]
    fn test_decimal256_buffer_round_trip() {
        let mut col = ColumnDecimal256::new(Type::decimal(50, 4));
        col.append_from_string("1.5").unwrap();
        col.append_from_string("-2.25").unwrap();

        let mut buffer = BytesMut::new();
        col.save_to_buffer(&mut buffer).unwrap();

        let mut decoded = ColumnDecimal256::new(Type::decimal(50, 4));
        let mut slice: &[u8] = &buffer;
        decoded.load_from_buffer(&mut slice, 2).unwrap();

        assert_eq!(decoded.as_string(0), "1.5000");
        assert_eq!(decoded.as_string(1), "-2.2500");
    }
}
