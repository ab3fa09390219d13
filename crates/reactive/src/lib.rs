//! Rivulet Reactive - collections, transactions and live queries.
//!
//! This crate wires compiled query pipelines to data. Collections hold keyed
//! rows; transactions mutate them optimistically; live queries keep the
//! result of a query up to date as the collections they read change.
//!
//! # Core Concepts
//!
//! - `Collection`: keyed rows with a synced layer, pending optimistic
//!   mutations, indexes and change subscriptions
//! - `ChangeSet`: the keyed inserts, updates and deletes delivered to subscribers
//! - `Transaction`: a batch of optimistic mutations, committed or rolled back
//! - `Scheduler`: runs the recomputation jobs of one transaction together, in
//!   dependency order
//! - `LiveQuery`: a query whose result is maintained incrementally in its own
//!   read-only collection
//! - `Engine`: the registry tying collections, scheduler and live queries together
//!
//! # Example
//!
//! ```
//! use rivulet_core::Value;
//! use rivulet_query::ast::builder::{ref_, val, Query};
//! use rivulet_query::Expr;
//! use rivulet_reactive::{CollectionConfig, Engine};
//!
//! let engine = Engine::new();
//! let todos = engine.create_collection(CollectionConfig::keyed_by("todos", "id")).unwrap();
//! todos.insert(Value::object([("id", Value::from(1i64)), ("done", Value::from(false))])).unwrap();
//!
//! let open = engine
//!     .live_query(
//!         Query::from_collection("todos", "t")
//!             .where_(Expr::eq(ref_("t.done"), val(false)))
//!             .build(),
//!     )
//!     .unwrap();
//! assert_eq!(open.len(), 1);
//!
//! let tx = engine.transaction();
//! tx.update(&todos, &Value::from(1i64), |t| t.set("done", Value::from(true))).unwrap();
//! assert!(open.is_empty());
//!
//! tx.commit(|_| Ok::<(), String>(())).unwrap();
//! assert!(open.is_empty());
//! ```

#![no_std]

extern crate alloc;

pub mod change_set;
pub mod collection;
pub mod engine;
pub mod live_query;
pub mod scheduler;
pub mod subscription;
pub mod transaction;

pub use change_set::{ChangeMessage, ChangeSet, ChangeType};
pub use collection::{
    AutoIndex, Collection, CollectionConfig, CollectionStatus, KeyFn, Mutation, SubscriptionHandle,
    SyncWriter,
};
pub use engine::Engine;
pub use live_query::{LiveQuery, LiveQueryConfig};
pub use scheduler::{ContextId, JobId, ListenerId, Scheduler};
pub use subscription::{ChangeCallback, SubscribeOptions, SubscriptionId};
pub use transaction::{Transaction, TransactionId, TransactionState};
