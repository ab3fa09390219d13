//! Field-path indexes owned by a collection.

use crate::traits::{Index, IndexError, RowKey};
use crate::value_index::ValueIndex;
use alloc::string::String;
use alloc::vec::Vec;
use hashbrown::HashMap;
use rivulet_core::Value;

/// Path of a (possibly nested) field inside a row.
pub type FieldPath = Vec<String>;

/// The set of secondary indexes of one collection, keyed by field path.
///
/// Every index is kept in sync through `on_insert`/`on_update`/`on_delete`.
#[derive(Clone, Debug, Default)]
pub struct IndexSet {
    indexes: HashMap<FieldPath, ValueIndex>,
}

impl IndexSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an index on `path` from the current rows.
    pub fn create_index<'a>(
        &mut self,
        path: &[String],
        rows: impl IntoIterator<Item = (&'a RowKey, &'a Value)>,
    ) -> Result<(), IndexError> {
        if self.indexes.contains_key(path) {
            return Err(IndexError::AlreadyExists { path: path.join(".") });
        }
        let mut index = ValueIndex::new();
        for (key, row) in rows {
            index.add(row.get_path(path).clone(), key.clone());
        }
        tracing::debug!(path = %path.join("."), entries = index.len(), "created index");
        self.indexes.insert(path.to_vec(), index);
        Ok(())
    }

    /// Builds an index on `path` unless one exists. Returns true if built.
    pub fn ensure_index<'a>(
        &mut self,
        path: &[String],
        rows: impl IntoIterator<Item = (&'a RowKey, &'a Value)>,
    ) -> bool {
        self.create_index(path, rows).is_ok()
    }

    /// Returns the index on `path`, if any.
    pub fn get(&self, path: &[String]) -> Option<&ValueIndex> {
        self.indexes.get(path)
    }

    pub fn has_index(&self, path: &[String]) -> bool {
        self.indexes.contains_key(path)
    }

    /// Returns the number of indexes.
    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }

    /// Iterates over the indexed field paths.
    pub fn paths(&self) -> impl Iterator<Item = &FieldPath> {
        self.indexes.keys()
    }

    /// Records a new row in every index.
    pub fn on_insert(&mut self, key: &RowKey, row: &Value) {
        for (path, index) in self.indexes.iter_mut() {
            index.add(row.get_path(path).clone(), key.clone());
        }
    }

    /// Moves a row between index entries where the indexed field changed.
    pub fn on_update(&mut self, key: &RowKey, old: &Value, new: &Value) -> Result<(), IndexError> {
        for (path, index) in self.indexes.iter_mut() {
            let before = old.get_path(path);
            let after = new.get_path(path);
            if before != after {
                index.remove(before, key)?;
                index.add(after.clone(), key.clone());
            }
        }
        Ok(())
    }

    /// Removes a row from every index.
    pub fn on_delete(&mut self, key: &RowKey, row: &Value) -> Result<(), IndexError> {
        for (path, index) in self.indexes.iter_mut() {
            index.remove(row.get_path(path), key)?;
        }
        Ok(())
    }

    /// Drops every index.
    pub fn clear(&mut self) {
        self.indexes.clear();
    }
}
