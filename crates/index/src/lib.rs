//! Rivulet Index - secondary indexes for Rivulet collections.
//!
//! This crate provides the indexes that let WHERE clauses be answered without
//! scanning a collection:
//!
//! - `ValueIndex`: sorted value -> row-key-set map with point and range lookups
//! - `IndexSet`: the per-collection set of indexes, keyed by field path
//! - `KeyRange`: bounds for range lookups
//!
//! # Example
//!
//! ```rust
//! use rivulet_core::Value;
//! use rivulet_index::{Index, KeyRange, ValueIndex};
//!
//! let mut index = ValueIndex::new();
//! index.add(Value::Int64(18), Value::from("a"));
//! index.add(Value::Int64(30), Value::from("b"));
//! index.add(Value::Int64(45), Value::from("c"));
//!
//! // Point query
//! assert!(index.lookup(&Value::Int64(30)).contains(&Value::from("b")));
//!
//! // Range query
//! let range = KeyRange::lower_bound(Value::Int64(30), false);
//! assert_eq!(index.range_lookup(&range).len(), 2);
//! ```

#![no_std]

extern crate alloc;

pub mod index_set;
pub mod traits;
pub mod value_index;

pub use index_set::{FieldPath, IndexSet};
pub use traits::{Index, IndexError, KeyRange, RowKey};
pub use value_index::ValueIndex;
