//! Dataflow operators.
//!
//! Each operator is added to a graph through a method on `Stream`:
//! - Linear: map, filter, filter_map, negate, concat, key_by/unkey/rekey
//! - Consolidation and distinct membership
//! - Top-k windows per key group, optionally with rank
//! - Keyed join (inner, left, right, full, anti) and filter_by
//! - Keyed reduce/count and GROUP BY aggregation
//! - Observation: debug, tap, output

mod aggregate;
mod distinct;
mod join;
mod keyed_index;
mod linear;
mod reduce;
mod sink;
mod topk;

pub use aggregate::{AggregateKind, AggregateSpec, AggregateState};
pub use join::{JoinType, Joined};
pub use reduce::ReduceFn;
pub use topk::{Comparator, TopKOptions};
