//! Fluent construction of query IR.
//!
//! ```
//! use rivulet_query::ast::builder::{func, ref_, val, Query};
//!
//! let q = Query::from_collection("users", "u")
//!     .where_(func("eq", vec![ref_("u.dept"), val("eng")]))
//!     .select([("id", ref_("u.id"))])
//!     .build();
//! assert_eq!(q.where_.len(), 1);
//! ```

use crate::ast::{Direction, Expr, JoinClause, JoinKind, Nulls, OrderBy, QueryIR, Source};
use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use rivulet_core::Value;

/// Reference to a dotted field path, alias first (`"users.address.city"`).
pub fn ref_(path: &str) -> Expr {
    Expr::prop(path)
}

pub fn val(value: impl Into<Value>) -> Expr {
    Expr::value(value)
}

pub fn func(name: &str, args: Vec<Expr>) -> Expr {
    Expr::func(name, args)
}

pub fn agg(name: &str, args: Vec<Expr>) -> Expr {
    Expr::aggregate(name, args)
}

/// Builder for `QueryIR`.
#[derive(Clone, Debug)]
pub struct Query {
    ir: QueryIR,
}

impl Query {
    /// Starts a query over a collection.
    pub fn from_collection(id: &str, alias: &str) -> Self {
        Self {
            ir: QueryIR::new(Source::Collection {
                id: id.to_string(),
                alias: alias.to_string(),
            }),
        }
    }

    /// Starts a query over the result of another query.
    pub fn from_query(query: QueryIR, alias: &str) -> Self {
        Self {
            ir: QueryIR::new(Source::Query {
                query: Box::new(query),
                alias: alias.to_string(),
            }),
        }
    }

    pub fn join(mut self, from: Source, kind: JoinKind, left: Expr, right: Expr) -> Self {
        self.ir.join.push(JoinClause {
            from,
            kind,
            left,
            right,
        });
        self
    }

    /// Joins a collection under `alias` on `left = right`.
    pub fn join_collection(self, id: &str, alias: &str, kind: JoinKind, left: Expr, right: Expr) -> Self {
        let from = Source::Collection {
            id: id.to_string(),
            alias: alias.to_string(),
        };
        self.join(from, kind, left, right)
    }

    /// Adds a WHERE conjunct.
    pub fn where_(mut self, expr: Expr) -> Self {
        self.ir.where_.push(expr);
        self
    }

    pub fn select<I, K>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = (K, Expr)>,
        K: Into<String>,
    {
        self.ir.select = Some(columns.into_iter().map(|(k, e)| (k.into(), e)).collect());
        self
    }

    pub fn group_by(mut self, expr: Expr) -> Self {
        self.ir.group_by.push(expr);
        self
    }

    /// Adds a HAVING conjunct.
    pub fn having(mut self, expr: Expr) -> Self {
        self.ir.having.push(expr);
        self
    }

    pub fn order_by(self, expr: Expr, direction: Direction) -> Self {
        let nulls = match direction {
            Direction::Asc => Nulls::First,
            Direction::Desc => Nulls::Last,
        };
        self.order_by_nulls(expr, direction, nulls)
    }

    pub fn order_by_nulls(mut self, expr: Expr, direction: Direction, nulls: Nulls) -> Self {
        self.ir.order_by.push(OrderBy {
            expr,
            direction,
            nulls,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.ir.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.ir.offset = Some(offset);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.ir.distinct = true;
        self
    }

    pub fn build(self) -> QueryIR {
        self.ir
    }
}
