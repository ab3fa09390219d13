//! Ordered secondary index over `Value`s.

use crate::traits::{Index, IndexError, KeyRange, RowKey};
use alloc::collections::BTreeMap;
use core::ops::Bound;
use hashbrown::HashSet;
use rivulet_core::Value;

/// A sorted map from field value to the set of row keys holding it.
///
/// Supports both point lookups and range lookups. Null values are indexed so
/// that `lookup(&Value::Null)` works, but range lookups skip them.
#[derive(Clone, Debug, Default)]
pub struct ValueIndex {
    map: BTreeMap<Value, HashSet<RowKey>>,
    len: usize,
}

impl ValueIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of distinct indexed values.
    pub fn distinct_values(&self) -> usize {
        self.map.len()
    }

    /// Returns the smallest non-null indexed value.
    pub fn min_value(&self) -> Option<&Value> {
        self.map.keys().find(|v| !v.is_null())
    }

    /// Returns the largest indexed value.
    pub fn max_value(&self) -> Option<&Value> {
        self.map.keys().next_back().filter(|v| !v.is_null())
    }
}

impl Index for ValueIndex {
    fn add(&mut self, value: Value, row_key: RowKey) {
        if self.map.entry(value).or_default().insert(row_key) {
            self.len += 1;
        }
    }

    fn remove(&mut self, value: &Value, row_key: &RowKey) -> Result<(), IndexError> {
        let missing = || IndexError::MissingEntry {
            value: value.clone(),
            row_key: row_key.clone(),
        };
        let rows = self.map.get_mut(value).ok_or_else(missing)?;
        if !rows.remove(row_key) {
            return Err(missing());
        }
        if rows.is_empty() {
            self.map.remove(value);
        }
        self.len -= 1;
        Ok(())
    }

    fn lookup(&self, value: &Value) -> HashSet<RowKey> {
        self.map.get(value).cloned().unwrap_or_default()
    }

    fn range_lookup(&self, range: &KeyRange<Value>) -> HashSet<RowKey> {
        let (lower, upper) = match range.to_bounds() {
            // Null sorts lowest; an open lower end starts just above it
            (Bound::Unbounded, upper) => (Bound::Excluded(Value::Null), upper),
            bounds => bounds,
        };
        if !is_valid_range(&lower, &upper) {
            return HashSet::new();
        }
        self.map
            .range((lower, upper))
            .filter(|(value, _)| !value.is_null())
            .flat_map(|(_, rows)| rows.iter().cloned())
            .collect()
    }

    fn len(&self) -> usize {
        self.len
    }

    fn clear(&mut self) {
        self.map.clear();
        self.len = 0;
    }
}

/// `BTreeMap::range` rejects inverted ranges and `(x, x)` with both ends excluded.
fn is_valid_range(lower: &Bound<Value>, upper: &Bound<Value>) -> bool {
    match (lower, upper) {
        (Bound::Included(l) | Bound::Excluded(l), Bound::Included(u) | Bound::Excluded(u)) => {
            let both_excluded = matches!(lower, Bound::Excluded(_)) && matches!(upper, Bound::Excluded(_));
            l < u || (l == u && !both_excluded)
        }
        _ => true,
    }
}
