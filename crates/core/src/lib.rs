//! Rivulet Core - Value model and error types for the Rivulet engine.
//!
//! This crate provides the foundational types shared by every layer of the
//! incremental view-maintenance engine:
//!
//! - `Value`: A structured record value (scalars, arrays, objects) with a total
//!   order and a hash consistent with that order
//! - `Error`: Error types for scheduling, query compilation and collections
//! - `pattern_match`: SQL `LIKE` / `ILIKE` matching
//!
//! # Example
//!
//! ```rust
//! use rivulet_core::Value;
//!
//! let user = Value::object([
//!     ("id", Value::from(1i64)),
//!     ("dept", Value::from("eng")),
//! ]);
//!
//! assert_eq!(user.get_path(&["dept"]), &Value::from("eng"));
//! assert!(user.get_path(&["missing"]).is_null());
//! ```

#![no_std]

extern crate alloc;

mod error;
pub mod pattern_match;
mod value;

pub use error::{Error, Result};
pub use value::Value;
