//! `CodecRegistry`: the kind tree and sparse cross-block state a streaming
//! decode/encode session needs to carry from one block to the next, keyed
//! by column name so each column's state is independent of the others'.

use super::kind::KindNode;
use super::sparse::SparseState;
use super::{
    ColumnCodec,
    Codec,
    DecodeOptions,
    EncodeOptions,
};
use crate::column::ColumnRef;
use crate::io::cursor::{
    Cursor,
    WriteBuffer,
};
use crate::types::Type;
use crate::Result;
use std::collections::HashMap;

struct ColumnState {
    node: KindNode,
    sparse: SparseState,
}

/// Per-column-name persisted decode/encode state across a sequence of
/// blocks belonging to the same query result or insert stream.
///
/// A single block only ever carries one sparse run's worth of state per
/// column; a column whose sparse run doesn't end on a block boundary needs
/// its [`sparse::SparseState`] carried into the next block's decode, which
/// is exactly what keying this by column name (rather than recreating it
/// per block) buys.
#[derive(Default)]
pub struct CodecRegistry {
    columns: HashMap<String, ColumnState>,
    codec: ColumnCodec,
}

impl CodecRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { columns: HashMap::new(), codec: ColumnCodec }
    }

    fn state_for(&mut self, name: &str, column_type: &Type) -> &mut ColumnState {
        self.columns.entry(name.to_string()).or_insert_with(|| ColumnState {
            node: KindNode::dense_for(column_type),
            sparse: SparseState::default(),
        })
    }

    /// Decode `rows` values of `name: column_type` off `cursor`.
    pub fn decode_column(
        &mut self,
        cursor: &mut Cursor,
        name: &str,
        column_type: &Type,
        rows: usize,
        opts: &DecodeOptions,
    ) -> Result<ColumnRef> {
        let codec = self.codec;
        let state = self.state_for(name, column_type);
        codec.decode(cursor, column_type, rows, &mut state.node, &mut state.sparse, opts)
    }

    /// Encode `column` under `name` to `buffer`.
    pub fn encode_column(
        &mut self,
        buffer: &mut WriteBuffer,
        name: &str,
        column: &ColumnRef,
        opts: &EncodeOptions,
    ) -> Result<()> {
        let codec = self.codec;
        let state = self.state_for(name, column.column_type());
        codec.encode(buffer, column, &mut state.node, opts)
    }

    /// Forget all per-column state (the serialization kind a column was
    /// decoded/encoded with does not necessarily carry across distinct
    /// query results).
    pub fn reset(&mut self) {
        self.columns.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::numeric::ColumnInt32;
    use crate::types::Type;
    use std::sync::Arc;

    fn dense_opts() -> (DecodeOptions, EncodeOptions) {
        (
            DecodeOptions { client_version: super::super::DBMS_MIN_REVISION_WITH_CUSTOM_SERIALIZATION },
            EncodeOptions {
                client_version: super::super::DBMS_MIN_REVISION_WITH_CUSTOM_SERIALIZATION,
                sparse_threshold: None,
            },
        )
    }

    #[test]
    fn dense_round_trip_through_registry() {
        let mut col = ColumnInt32::with_type(Type::int32());
        col.append(1);
        col.append(2);
        col.append(3);
        let column: ColumnRef = Arc::new(col);

        let (decode_opts, encode_opts) = dense_opts();
        let mut registry = CodecRegistry::new();
        let mut buffer = WriteBuffer::new();
        registry.encode_column(&mut buffer, "x", &column, &encode_opts).unwrap();

        let mut decode_registry = CodecRegistry::new();
        let mut cursor = Cursor::new(buffer.as_slice());
        let decoded = decode_registry
            .decode_column(&mut cursor, "x", &Type::int32(), 3, &decode_opts)
            .unwrap();
        assert_eq!(decoded.size(), 3);
        assert!(cursor.is_empty());
    }

    #[test]
    fn sparse_round_trip_through_registry() {
        let mut col = ColumnInt32::with_type(Type::int32());
        col.append(0);
        col.append(0);
        col.append(7);
        col.append(0);
        let column: ColumnRef = Arc::new(col);

        let decode_opts = DecodeOptions {
            client_version: super::super::DBMS_MIN_REVISION_WITH_CUSTOM_SERIALIZATION,
        };
        let encode_opts = EncodeOptions {
            client_version: super::super::DBMS_MIN_REVISION_WITH_CUSTOM_SERIALIZATION,
            sparse_threshold: Some(0.5),
        };

        let mut registry = CodecRegistry::new();
        let mut buffer = WriteBuffer::new();
        registry.encode_column(&mut buffer, "x", &column, &encode_opts).unwrap();

        let mut decode_registry = CodecRegistry::new();
        let mut cursor = Cursor::new(buffer.as_slice());
        let decoded = decode_registry
            .decode_column(&mut cursor, "x", &Type::int32(), 4, &decode_opts)
            .unwrap();

        assert_eq!(decoded.size(), 4);
        for (i, expected) in [0, 0, 7, 0].into_iter().enumerate() {
            let value = crate::column::column_value::get_value(decoded.as_ref(), i).unwrap();
            assert_eq!(value, crate::value::Value::Int32(expected));
        }
    }
}
