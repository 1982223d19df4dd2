//! Sparse serialization: wire format, cross-call carry-over state, and the
//! generic encode/decode helpers any codec can use for a
//! [`super::kind::SerializationKind::Sparse`] node.
//!
//! Wire form (see SPEC_FULL.md's Sparse serialization / Kind tree
//! sections): a sequence of varint gaps between consecutive non-default row
//! indices (the first gap counted from position `-1`, so an immediate
//! first-row non-default value has gap `1`), terminated by a gap of `0`,
//! followed by a dense run of just the non-default values in order.
//!
//! A gap can never legitimately be `0` for a real entry (two distinct row
//! indices always differ by at least 1), which is what makes `0` an
//! unambiguous terminator.

use crate::io::cursor::{
    Cursor,
    WriteBuffer,
};
use crate::value::Value;
use crate::{
    Error,
    Result,
};

/// Cross-call carry-over state for one sparse-serialized kind-tree node,
/// keyed by [`super::kind::KindNode::node_id`] in
/// [`super::CodecRegistry`]'s caller-owned map. Lets a sparse run that
/// wasn't fully consumed by one `decode` call (because the block's row
/// count ran out before the gap list hit its terminator) resume correctly
/// on the next call instead of needing the whole run buffered in memory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SparseState {
    /// Rows still pending as default before the next known non-default
    /// value, carried over from a previous call that ran out of rows.
    pub trailing_defaults: usize,
    /// Whether a non-default value is known to immediately follow those
    /// trailing defaults (the previous call consumed a gap but had no rows
    /// left to place the value at).
    pub has_value_after_defaults: bool,
}

/// Decode the sparse positions mask for the next `num_rows` rows, updating
/// `state` with whatever trails into the following call.
///
/// Returns a `Vec<bool>` of length `num_rows`, `true` at rows that hold a
/// non-default value. Raises [`Error::BufferUnderflow`] (via `cursor`) if
/// the gap list runs out of bytes mid-read; that is recoverable by the
/// streaming driver exactly like any other codec read.
pub fn decode_sparse_mask(
    cursor: &mut Cursor,
    num_rows: usize,
    state: &mut SparseState,
) -> Result<Vec<bool>> {
    let mut mask = vec![false; num_rows];
    let mut i = 0;

    if state.trailing_defaults > 0 {
        let take = state.trailing_defaults.min(num_rows);
        state.trailing_defaults -= take;
        i = take;
        if state.trailing_defaults == 0 && state.has_value_after_defaults {
            state.has_value_after_defaults = false;
            if i < num_rows {
                mask[i] = true;
                i += 1;
            } else {
                // The value itself also trails into the next call.
                state.has_value_after_defaults = true;
            }
        }
    }

    while i < num_rows {
        let gap = cursor.read_varint()?;
        if gap == 0 {
            break;
        }
        let defaults_before = gap as usize - 1;

        if i + defaults_before >= num_rows {
            state.trailing_defaults = (i + defaults_before) - num_rows;
            state.has_value_after_defaults = true;
            break;
        }

        i += defaults_before;
        mask[i] = true;
        i += 1;
    }

    Ok(mask)
}

/// Encode the sparse positions mask as gaps-plus-terminator.
pub fn encode_sparse_mask(buffer: &mut WriteBuffer, mask: &[bool]) {
    let mut prev: i64 = -1;
    for (idx, is_set) in mask.iter().enumerate() {
        if *is_set {
            let gap = (idx as i64 - prev) as u64;
            buffer.put_varint(gap);
            prev = idx as i64;
        }
    }
    buffer.put_varint(0);
}

/// `true` if `value` is the "default" row value for its type: zero for
/// numeric types, empty for strings/arrays/maps, `Null` for nullable cells.
pub fn is_default_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !*b,
        Value::Int8(v) => *v == 0,
        Value::Int16(v) => *v == 0,
        Value::Int32(v) => *v == 0,
        Value::Int64(v) => *v == 0,
        Value::Int128(v) => *v == 0,
        Value::UInt8(v) => *v == 0,
        Value::UInt16(v) => *v == 0,
        Value::UInt32(v) => *v == 0,
        Value::UInt64(v) => *v == 0,
        Value::UInt128(v) => *v == 0,
        Value::Int256(v) => *v == crate::bigint::I256::ZERO,
        Value::UInt256(v) => *v == crate::bigint::U256::ZERO,
        Value::Float32(v) => *v == 0.0,
        Value::Float64(v) => *v == 0.0,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Tuple(_) => false,
        Value::Map(entries) => entries.is_empty(),
        Value::Object(entries) => entries.is_empty(),
        Value::Date(v) => *v == 0,
        Value::DateTime64 { value, .. } => *value == 0,
        Value::Decimal { unscaled, .. } => *unscaled == crate::bigint::I256::ZERO,
        Value::Enum { value, .. } => *value == 0,
        Value::Uuid(u) => u.high == 0 && u.low == 0,
        Value::Ipv4(a) => u32::from(*a) == 0,
        Value::Ipv6(a) => a.is_unspecified(),
        Value::Variant(inner) => is_default_value(inner),
    }
}

/// Expand a decoded sparse column back to one [`Value`] per row: `defaults`
/// is reused at every unset position, `non_default_values` supplies the
/// dense run for set positions in order.
///
/// # Errors
///
/// Returns [`Error::Protocol`] if `non_default_values` doesn't have exactly
/// as many elements as `mask` has `true` entries.
pub fn expand_sparse_values(
    mask: &[bool],
    non_default_values: Vec<Value>,
    default: &Value,
) -> Result<Vec<Value>> {
    let expected = mask.iter().filter(|&&b| b).count();
    if non_default_values.len() != expected {
        return Err(Error::Protocol(format!(
            "sparse column: expected {} non-default values, decoded {}",
            expected,
            non_default_values.len()
        )));
    }

    let mut values = non_default_values.into_iter();
    Ok(mask
        .iter()
        .map(|&set| if set { values.next().unwrap() } else { default.clone() })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_mask_round_trips_single_call() {
        let mask = vec![false, false, true, false, true, true, false, false];
        let mut buffer = WriteBuffer::new();
        encode_sparse_mask(&mut buffer, &mask);

        let mut cursor = Cursor::new(buffer.as_slice());
        let mut state = SparseState::default();
        let decoded = decode_sparse_mask(&mut cursor, mask.len(), &mut state).unwrap();
        assert_eq!(decoded, mask);
        assert_eq!(state, SparseState::default());
    }

    #[test]
    fn sparse_mask_round_trips_split_across_two_decode_calls() {
        let mask = vec![false, true, false, false, true, false, true, true, false];
        let mut buffer = WriteBuffer::new();
        encode_sparse_mask(&mut buffer, &mask);

        let mut cursor = Cursor::new(buffer.as_slice());
        let mut state = SparseState::default();

        let split = 4;
        let first = decode_sparse_mask(&mut cursor, split, &mut state).unwrap();
        let second =
            decode_sparse_mask(&mut cursor, mask.len() - split, &mut state).unwrap();

        let mut combined = first;
        combined.extend(second);
        assert_eq!(combined, mask);
    }

    #[test]
    fn sparse_mask_handles_value_landing_exactly_on_boundary() {
        // Non-default at the very first row of the second call.
        let mask = vec![false, false, false, true];
        let mut buffer = WriteBuffer::new();
        encode_sparse_mask(&mut buffer, &mask);

        let mut cursor = Cursor::new(buffer.as_slice());
        let mut state = SparseState::default();
        let first = decode_sparse_mask(&mut cursor, 3, &mut state).unwrap();
        assert_eq!(first, vec![false, false, false]);
        assert!(state.has_value_after_defaults);

        let second = decode_sparse_mask(&mut cursor, 1, &mut state).unwrap();
        assert_eq!(second, vec![true]);
    }

    #[test]
    fn expand_and_check_defaults() {
        assert!(is_default_value(&Value::Int32(0)));
        assert!(!is_default_value(&Value::Int32(1)));
        assert!(is_default_value(&Value::String(String::new())));
        assert!(!is_default_value(&Value::String("x".to_string())));

        let mask = vec![true, false, true];
        let values = expand_sparse_values(
            &mask,
            vec![Value::Int32(5), Value::Int32(7)],
            &Value::Int32(0),
        )
        .unwrap();
        assert_eq!(values, vec![Value::Int32(5), Value::Int32(0), Value::Int32(7)]);
    }
}
