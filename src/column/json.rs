//! JSON column type (`JSON(path Type, ..., max_dynamic_types=N)`).
//!
//! A JSON column is a set of statically-typed paths plus a [`ColumnDynamic`]
//! overflow bucket for paths that were not declared. Materialization
//! assembles one object per row from the typed paths and whatever the
//! overflow bucket discovered, omitting keys whose value is absent at that
//! row rather than representing them as typed null.
//!
//! ## Wire Format
//!
//! ```text
//! for each typed path, in declared order: dense column body
//! overflow: Dynamic column (prefix, then body)
//! ```

use super::dynamic::ColumnDynamic;
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

/// Column for the `JSON` type.
pub struct ColumnJson {
    type_: Type,
    typed_paths: Vec<(String, ColumnRef)>,
    dynamic: ColumnDynamic,
}

impl ColumnJson {
    /// Build a new, empty `ColumnJson`. `type_` must be `Type::Json`.
    pub fn new(type_: Type) -> Self {
        let (typed_path_types, max_dynamic_types) = match &type_ {
            Type::Json { typed_paths, max_dynamic_types } => {
                (typed_paths.clone(), *max_dynamic_types)
            }
            _ => panic!("ColumnJson requires JSON type"),
        };

        let typed_paths = typed_path_types
            .into_iter()
            .map(|(path, ty)| {
                let col = crate::io::block_stream::create_column(&ty)
                    .expect("Failed to create typed-path column");
                (path, col)
            })
            .collect();

        let dynamic = ColumnDynamic::new(Type::dynamic(max_dynamic_types));

        Self { type_, typed_paths, dynamic }
    }

    /// The declared typed paths, in order.
    pub fn typed_path_names(&self) -> Vec<&str> {
        self.typed_paths.iter().map(|(p, _)| p.as_str()).collect()
    }

    /// The column backing a declared typed path.
    pub fn typed_path_column(&self, path: &str) -> Option<ColumnRef> {
        self.typed_paths
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, c)| c.clone())
    }

    /// The overflow column for paths outside the declared typed set.
    pub fn dynamic_overflow(&self) -> &ColumnDynamic {
        &self.dynamic
    }
}

impl Column for ColumnJson {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn size(&self) -> usize {
        self.dynamic.size()
    }

    fn clear(&mut self) {
        for (_, col) in &mut self.typed_paths {
            let col_mut = Arc::get_mut(col)
                .expect("Cannot clear shared JSON typed-path column - column has multiple references");
            col_mut.clear();
        }
        self.dynamic.clear();
    }

    fn reserve(&mut self, new_cap: usize) {
        for (_, col) in &mut self.typed_paths {
            let col_mut = Arc::get_mut(col)
                .expect("Cannot reserve on shared JSON typed-path column - column has multiple references");
            col_mut.reserve(new_cap);
        }
        self.dynamic.reserve(new_cap);
    }

    fn append_column(&mut self, other: ColumnRef) -> Result<()> {
        let other =
            other.as_any().downcast_ref::<ColumnJson>().ok_or_else(|| {
                Error::TypeMismatch {
                    expected: self.type_.name(),
                    actual: other.column_type().name(),
                }
            })?;

        if self.typed_paths.len() != other.typed_paths.len() {
            return Err(Error::TypeMismatch {
                expected: format!("JSON with {} typed paths", self.typed_paths.len()),
                actual: format!("JSON with {} typed paths", other.typed_paths.len()),
            });
        }

        for ((_, col), (_, other_col)) in
            self.typed_paths.iter_mut().zip(&other.typed_paths)
        {
            let col_mut = Arc::get_mut(col).ok_or_else(|| {
                Error::Protocol(
                    "Cannot append to shared JSON typed-path column - column has multiple references"
                        .to_string(),
                )
            })?;
            col_mut.append_column(other_col.clone())?;
        }

        self.dynamic.append_column(Arc::new(clone_dynamic(&other.dynamic)))
    }

    fn load_prefix(&mut self, buffer: &mut &[u8], rows: usize) -> Result<()> {
        for (_, col) in &mut self.typed_paths {
            let col_mut = Arc::get_mut(col).ok_or_else(|| {
                Error::Protocol(
                    "Cannot load prefix into shared JSON typed-path column"
                        .to_string(),
                )
            })?;
            col_mut.load_prefix(buffer, rows)?;
        }
        self.dynamic.load_prefix(buffer, rows)
    }

    fn load_from_buffer(
        &mut self,
        buffer: &mut &[u8],
        rows: usize,
    ) -> Result<()> {
        for (_, col) in &mut self.typed_paths {
            let col_mut = Arc::get_mut(col).ok_or_else(|| {
                Error::Protocol(
                    "Cannot load into shared JSON typed-path column - column has multiple references"
                        .to_string(),
                )
            })?;
            col_mut.load_from_buffer(buffer, rows)?;
        }
        self.dynamic.load_from_buffer(buffer, rows)
    }

    fn save_prefix(&self, buffer: &mut BytesMut) -> Result<()> {
        for (_, col) in &self.typed_paths {
            col.save_prefix(buffer)?;
        }
        self.dynamic.save_prefix(buffer)
    }

    fn save_to_buffer(&self, buffer: &mut BytesMut) -> Result<()> {
        for (_, col) in &self.typed_paths {
            col.save_to_buffer(buffer)?;
        }
        self.dynamic.save_to_buffer(buffer)
    }

    fn clone_empty(&self) -> ColumnRef {
        let typed_paths = self
            .typed_paths
            .iter()
            .map(|(p, c)| (p.clone(), c.clone_empty()))
            .collect();
        let dynamic = clone_dynamic_empty(&self.dynamic);
        Arc::new(ColumnJson { type_: self.type_.clone(), typed_paths, dynamic })
    }

    fn slice(&self, begin: usize, len: usize) -> Result<ColumnRef> {
        let mut typed_paths = Vec::with_capacity(self.typed_paths.len());
        for (path, col) in &self.typed_paths {
            typed_paths.push((path.clone(), col.slice(begin, len)?));
        }
        let dynamic_ref = self.dynamic.slice(begin, len)?;
        let dynamic = dynamic_ref
            .as_any()
            .downcast_ref::<ColumnDynamic>()
            .expect("ColumnDynamic::slice returns a ColumnDynamic")
            .clone_as_dynamic();
        Ok(Arc::new(ColumnJson { type_: self.type_.clone(), typed_paths, dynamic }))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// Shallow clone helper: `ColumnDynamic` doesn't derive `Clone` (its inner
/// columns are trait objects), so cloning means re-wrapping the same
/// `ColumnRef`s rather than deep-copying data.
fn clone_dynamic(source: &ColumnDynamic) -> ColumnDynamic {
    source.clone_as_dynamic()
}

fn clone_dynamic_empty(source: &ColumnDynamic) -> ColumnDynamic {
    source
        .clone_empty()
        .as_any()
        .downcast_ref::<ColumnDynamic>()
        .expect("ColumnDynamic::clone_empty returns a ColumnDynamic")
        .clone_as_dynamic()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnString;

    #[test]
    fn test_json_typed_path_plumbing() {
        let ty = Type::json(
            vec![("name".to_string(), Type::string())],
            Some(32),
        );
        let json = ColumnJson::new(ty);
        assert_eq!(json.typed_path_names(), vec!["name"]);
        assert!(json.typed_path_column("name").is_some());
        assert!(json
            .typed_path_column("name")
            .unwrap()
            .as_any()
            .downcast_ref::<ColumnString>()
            .is_some());
        assert_eq!(json.dynamic_overflow().max_types(), Some(32));
    }
}
