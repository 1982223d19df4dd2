//! The per-column serialization-kind tree: at every level of a (possibly
//! nested) type, whether that level is written dense or sparse on the wire.
//!
//! Grounded on the teacher's `Type`/`TypeAst` recursive shape
//! (`types/mod.rs`): the tree mirrors a type's nesting exactly the way
//! `Type` itself does (one child per `Array`/`Nullable`/`LowCardinality`
//! element type, one per `Tuple` field, two for `Map`'s key/value).

use crate::types::Type;

/// Whether a column (or column level) is written dense or sparse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializationKind {
    /// One entry per row, in order (the default).
    Dense,
    /// Only non-default rows are written, as delta-varint positions
    /// followed by a dense run of just the non-default values.
    Sparse,
}

/// A node in the per-column serialization-kind tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindNode {
    /// Dense or sparse at this level.
    pub kind: SerializationKind,
    /// Numeric id assigned at codec construction time, used to key
    /// [`super::sparse::SparseState`] across decode calls.
    pub node_id: u32,
    /// Child nodes, one per nested type level (empty for scalar types).
    pub children: Vec<KindNode>,
}

impl KindNode {
    /// Build an all-dense kind tree matching `type_`'s nesting shape.
    pub fn dense_for(type_: &Type) -> KindNode {
        let mut next_id = 0;
        build(type_, &mut next_id)
    }

    /// `true` if every node in this tree (including children) is dense.
    pub fn is_all_dense(&self) -> bool {
        self.kind == SerializationKind::Dense
            && self.children.iter().all(KindNode::is_all_dense)
    }
}

fn build(type_: &Type, next_id: &mut u32) -> KindNode {
    let node_id = *next_id;
    *next_id += 1;

    let children = match type_ {
        Type::Array { item_type } => vec![build(item_type, next_id)],
        Type::Nullable { nested_type } => vec![build(nested_type, next_id)],
        Type::LowCardinality { nested_type } => vec![build(nested_type, next_id)],
        Type::Tuple { item_types, .. } => {
            item_types.iter().map(|t| build(t, next_id)).collect()
        }
        Type::Map { key_type, value_type } => {
            vec![build(key_type, next_id), build(value_type, next_id)]
        }
        _ => Vec::new(),
    };

    KindNode { kind: SerializationKind::Dense, node_id, children }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_tree_matches_nesting_shape() {
        let type_ = Type::Array {
            item_type: Box::new(Type::tuple(vec![Type::int32(), Type::string()])),
        };
        let tree = KindNode::dense_for(&type_);
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].children.len(), 2);
        assert!(tree.is_all_dense());
    }

    #[test]
    fn scalar_type_has_no_children() {
        let tree = KindNode::dense_for(&Type::int32());
        assert!(tree.children.is_empty());
    }
}
