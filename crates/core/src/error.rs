//! Error types for Rivulet.

use crate::value::Value;
use alloc::string::String;
use alloc::vec::Vec;

/// Result type alias for Rivulet operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error types for engine operations.
///
/// Structural errors (`DependencyCycle`, `InvalidState`) are fatal to the call
/// that raised them. Query errors are raised while compiling, before any data
/// flows through a pipeline.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum Error {
    /// A scheduler flush pass made no progress while jobs were still pending.
    #[error("dependency cycle in scheduler context {context}: jobs {pending:?} never became ready")]
    DependencyCycle { context: u64, pending: Vec<u64> },

    /// An operation was invoked on an object in the wrong lifecycle state.
    #[error("invalid state: {message}")]
    InvalidState { message: String },

    /// A query expression referenced an alias that is not in scope.
    #[error("unknown source alias `{alias}`")]
    UnknownAlias { alias: String },

    /// A query expression called a function the compiler does not know.
    #[error("unknown function `{name}`")]
    UnknownFunction { name: String },

    /// The query IR is malformed.
    #[error("invalid query: {message}")]
    InvalidQuery { message: String },

    /// A non-aggregate SELECT expression is missing from GROUP BY.
    #[error("non-aggregate expression `{expr}` in SELECT must appear in GROUP BY")]
    NonAggregateNotGrouped { expr: String },

    /// Insert of a key that is already present.
    #[error("duplicate key {key} in collection `{collection}`")]
    DuplicateKey { collection: String, key: Value },

    /// Update or delete of a key that is not present.
    #[error("key {key} not found in collection `{collection}`")]
    KeyNotFound { collection: String, key: Value },

    /// A query referenced a collection that is not registered.
    #[error("collection not found: `{id}`")]
    CollectionNotFound { id: String },

    /// A transaction's mutation callback rejected the transaction.
    #[error("transaction {id} failed: {message}")]
    TransactionFailed { id: u64, message: String },
}

impl Error {
    /// Creates a dependency cycle error.
    pub fn dependency_cycle(context: u64, pending: Vec<u64>) -> Self {
        Error::DependencyCycle { context, pending }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Error::InvalidState {
            message: message.into(),
        }
    }

    /// Creates an unknown alias error.
    pub fn unknown_alias(alias: impl Into<String>) -> Self {
        Error::UnknownAlias {
            alias: alias.into(),
        }
    }

    /// Creates an unknown function error.
    pub fn unknown_function(name: impl Into<String>) -> Self {
        Error::UnknownFunction { name: name.into() }
    }

    /// Creates an invalid query error.
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Error::InvalidQuery {
            message: message.into(),
        }
    }

    /// Creates a non-aggregate-not-grouped error.
    pub fn non_aggregate_not_grouped(expr: impl Into<String>) -> Self {
        Error::NonAggregateNotGrouped { expr: expr.into() }
    }

    /// Creates a duplicate key error.
    pub fn duplicate_key(collection: impl Into<String>, key: Value) -> Self {
        Error::DuplicateKey {
            collection: collection.into(),
            key,
        }
    }

    /// Creates a key not found error.
    pub fn key_not_found(collection: impl Into<String>, key: Value) -> Self {
        Error::KeyNotFound {
            collection: collection.into(),
            key,
        }
    }

    /// Creates a collection not found error.
    pub fn collection_not_found(id: impl Into<String>) -> Self {
        Error::CollectionNotFound { id: id.into() }
    }

    /// Creates a transaction failure error.
    pub fn transaction_failed(id: u64, message: impl Into<String>) -> Self {
        Error::TransactionFailed {
            id,
            message: message.into(),
        }
    }
}
