//! Rivulet Query - query IR, optimizer and dataflow compiler.
//!
//! This crate turns declarative queries into incremental pipelines:
//!
//! - `ast`: the query IR (`QueryIR`, `Expr`) and a fluent builder
//! - `optimizer`: predicate pushdown into join sources
//! - `compiler`: compilation of the IR onto `rivulet_incremental` streams
//! - `index_optimization`: resolving WHERE predicates through secondary indexes
//!
//! # Example
//!
//! ```
//! use rivulet_core::Value;
//! use rivulet_incremental::{Graph, MultiSet};
//! use rivulet_query::ast::builder::{ref_, val, Query};
//! use rivulet_query::ast::Expr;
//! use rivulet_query::{compile_query, optimize_query, CompileInputs};
//!
//! let query = Query::from_collection("todos", "t")
//!     .where_(Expr::eq(ref_("t.done"), val(false)))
//!     .select([("title", ref_("t.title"))])
//!     .build();
//! let optimized = optimize_query(query);
//!
//! let graph = Graph::new();
//! let todos = graph.new_input::<(Value, Value)>();
//! let inputs = CompileInputs::new().with_stream("t", todos.stream().clone());
//! let compiled = compile_query(&optimized.query, &inputs).unwrap();
//! let reader = compiled.output.connect_reader();
//!
//! let todo = Value::object([("title", Value::from("write docs")), ("done", Value::Boolean(false))]);
//! todos.send_data(MultiSet::singleton((Value::Int64(1), todo), 1));
//! graph.run();
//!
//! let rows: Vec<_> = reader.drain().into_iter().flat_map(|b| b.into_inner()).collect();
//! assert_eq!(rows.len(), 1);
//! assert_eq!(rows[0].0 .1.value, Value::object([("title", Value::from("write docs"))]));
//! ```

#![no_std]

extern crate alloc;

pub mod ast;
pub mod compiler;
pub mod index_optimization;
pub mod optimizer;

pub use ast::{Direction, Expr, JoinKind, Nulls, OrderBy, QueryIR, Source};
pub use compiler::{
    compile_query, CompileInputs, CompiledQuery, LazyLoader, ResultRow, RowOrdering, SourceStream,
};
pub use index_optimization::{indexable_fields, optimize_expression_with_indexes, IndexOptimization};
pub use optimizer::{optimize_query, OptimizedQuery};
