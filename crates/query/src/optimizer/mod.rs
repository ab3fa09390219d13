//! Query optimizer.
//!
//! The only rewrite is predicate pushdown; its by-product, the WHERE
//! conjunction pushed to each collection alias, lets source subscriptions
//! pre-filter rows through secondary indexes.

mod predicate_pushdown;

pub use predicate_pushdown::PredicatePushdown;

use crate::ast::{Expr, QueryIR};
use alloc::string::String;
use hashbrown::HashMap;

/// A rewritten query plus the predicates pushed to its sources.
#[derive(Clone, Debug, PartialEq)]
pub struct OptimizedQuery {
    pub query: QueryIR,
    /// Alias of a collection source -> namespaced predicate on that source.
    pub source_where_clauses: HashMap<String, Expr>,
}

/// Optimizes a query for incremental evaluation.
pub fn optimize_query(query: QueryIR) -> OptimizedQuery {
    let mut pass = PredicatePushdown::new();
    let query = pass.optimize(query);
    OptimizedQuery {
        query,
        source_where_clauses: pass.into_source_clauses(),
    }
}
