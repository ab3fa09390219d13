//! Index trait definitions for Rivulet.
//!
//! This module defines the `Index` trait implemented by secondary indexes and
//! the `KeyRange` used for range lookups.

use alloc::string::String;
use core::ops::Bound;
use hashbrown::HashSet;
use rivulet_core::Value;

/// Primary key of a row in a collection.
pub type RowKey = Value;

/// A key range for index queries.
#[derive(Clone, Debug, PartialEq)]
pub enum KeyRange<K> {
    /// All keys
    All,
    /// A single key (equality)
    Only(K),
    /// Keys >= lower bound
    LowerBound { value: K, exclusive: bool },
    /// Keys <= upper bound
    UpperBound { value: K, exclusive: bool },
    /// Keys between lower and upper bounds
    Bound {
        lower: K,
        upper: K,
        lower_exclusive: bool,
        upper_exclusive: bool,
    },
}

impl<K: Clone + Ord> KeyRange<K> {
    /// Creates a range for all keys.
    pub fn all() -> Self {
        KeyRange::All
    }

    /// Creates a range for a single key.
    pub fn only(key: K) -> Self {
        KeyRange::Only(key)
    }

    /// Creates a range with a lower bound.
    pub fn lower_bound(value: K, exclusive: bool) -> Self {
        KeyRange::LowerBound { value, exclusive }
    }

    /// Creates a range with an upper bound.
    pub fn upper_bound(value: K, exclusive: bool) -> Self {
        KeyRange::UpperBound { value, exclusive }
    }

    /// Creates a range with both bounds.
    pub fn bound(lower: K, upper: K, lower_exclusive: bool, upper_exclusive: bool) -> Self {
        KeyRange::Bound {
            lower,
            upper,
            lower_exclusive,
            upper_exclusive,
        }
    }

    /// Returns true if this range represents a single value (equality).
    pub fn is_only(&self) -> bool {
        matches!(self, KeyRange::Only(_))
    }

    /// Returns true if this range represents all values (unbounded).
    pub fn is_all(&self) -> bool {
        matches!(self, KeyRange::All)
    }

    /// Returns the range as a pair of `Bound`s usable with `BTreeMap::range`.
    pub fn to_bounds(&self) -> (Bound<K>, Bound<K>) {
        fn edge<K>(value: K, exclusive: bool) -> Bound<K> {
            if exclusive {
                Bound::Excluded(value)
            } else {
                Bound::Included(value)
            }
        }
        match self {
            KeyRange::All => (Bound::Unbounded, Bound::Unbounded),
            KeyRange::Only(k) => (Bound::Included(k.clone()), Bound::Included(k.clone())),
            KeyRange::LowerBound { value, exclusive } => (edge(value.clone(), *exclusive), Bound::Unbounded),
            KeyRange::UpperBound { value, exclusive } => (Bound::Unbounded, edge(value.clone(), *exclusive)),
            KeyRange::Bound {
                lower,
                upper,
                lower_exclusive,
                upper_exclusive,
            } => (
                edge(lower.clone(), *lower_exclusive),
                edge(upper.clone(), *upper_exclusive),
            ),
        }
    }

    /// Returns true if the range cannot contain any key.
    pub fn is_empty(&self) -> bool {
        match self {
            KeyRange::Bound {
                lower,
                upper,
                lower_exclusive,
                upper_exclusive,
            } => lower > upper || (lower == upper && (*lower_exclusive || *upper_exclusive)),
            _ => false,
        }
    }

    /// Checks if a key is within this range.
    pub fn contains(&self, key: &K) -> bool {
        match self {
            KeyRange::All => true,
            KeyRange::Only(k) => key == k,
            KeyRange::LowerBound { value, exclusive } => {
                if *exclusive {
                    key > value
                } else {
                    key >= value
                }
            }
            KeyRange::UpperBound { value, exclusive } => {
                if *exclusive {
                    key < value
                } else {
                    key <= value
                }
            }
            KeyRange::Bound {
                lower,
                upper,
                lower_exclusive,
                upper_exclusive,
            } => {
                let lower_ok = if *lower_exclusive {
                    key > lower
                } else {
                    key >= lower
                };
                let upper_ok = if *upper_exclusive {
                    key < upper
                } else {
                    key <= upper
                };
                lower_ok && upper_ok
            }
        }
    }
}

/// A secondary index from field values to the keys of rows holding them.
pub trait Index {
    /// Records that row `row_key` holds `value`.
    fn add(&mut self, value: Value, row_key: RowKey);

    /// Forgets that row `row_key` holds `value`.
    fn remove(&mut self, value: &Value, row_key: &RowKey) -> Result<(), IndexError>;

    /// Keys of rows whose value equals `value`.
    fn lookup(&self, value: &Value) -> HashSet<RowKey>;

    /// Keys of rows whose value falls within `range`. Null values never match.
    fn range_lookup(&self, range: &KeyRange<Value>) -> HashSet<RowKey>;

    /// Returns the number of indexed (value, row) entries.
    fn len(&self) -> usize;

    /// Returns true if the index is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clears all entries from the index.
    fn clear(&mut self);
}

/// Error type for index operations.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum IndexError {
    /// Removal of an entry the index never held.
    #[error("index holds no entry {value} for row {row_key}")]
    MissingEntry { value: Value, row_key: RowKey },
    /// An index already exists for the field path.
    #[error("index already exists on `{path}`")]
    AlreadyExists { path: String },
}
