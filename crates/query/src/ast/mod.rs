//! Query IR: expressions, query structure and the fluent builder.

pub mod builder;
mod expr;
mod query;

pub use expr::Expr;
pub use query::{Direction, JoinClause, JoinKind, Nulls, OrderBy, QueryIR, Source};
