//! Rivulet Incremental - differential dataflow for incremental view maintenance.
//!
//! This crate implements the differential core of the engine: changes travel
//! through a graph of operators as multisets of `(item, multiplicity)` pairs,
//! so query results are updated from deltas rather than recomputed.
//!
//! # Core Concepts
//!
//! - `MultiSet<T>`: a bag of items with signed multiplicities (+1 insert, -1 delete)
//! - `StreamWriter`/`StreamReader`: broadcast edges; each reader drains its own queue
//! - `Operator`: a graph node; `Graph` runs its operators in topological order
//! - `Stream<T>`: a typed edge with one method per operator
//!
//! # Operators
//!
//! - Linear: `map`, `filter`, `negate`, `concat`, `key_by`, `unkey`, `rekey`
//! - Stateful: `consolidate`, `distinct`, `top_k`, `top_k_with_index`, `join`,
//!   `filter_by`, `reduce`, `count`, `group_by`
//! - Observation: `debug`, `tap`, `output`
//!
//! # Example
//!
//! ```
//! use rivulet_incremental::{Graph, MultiSet};
//!
//! let graph = Graph::new();
//! let input = graph.new_input::<i64>();
//! let reader = input.filter(|x| *x > 1).distinct().connect_reader();
//!
//! input.send_data(MultiSet::from_vec(vec![(1, 1), (2, 1), (2, 1)]));
//! graph.run();
//!
//! let out: Vec<_> = reader.drain().into_iter().flat_map(|b| b.into_inner()).collect();
//! assert_eq!(out, vec![(2, 1)]);
//! ```

#![no_std]

extern crate alloc;

pub mod dataflow;
pub mod multiset;
pub mod operators;

pub use dataflow::{
    BinaryOperator, Data, Graph, Input, LinearUnaryOperator, Operator, OperatorId, Stream,
    StreamReader, StreamWriter, UnaryOperator,
};
pub use multiset::{Keyed, MultiSet, Multiplicity};
pub use operators::{
    AggregateKind, AggregateSpec, AggregateState, Comparator, JoinType, Joined, TopKOptions,
};
