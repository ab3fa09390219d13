//! Query IR.

use crate::ast::Expr;
use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

/// A query source.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Source {
    /// A registered collection, read under `alias`.
    Collection { id: String, alias: String },
    /// A subquery whose result rows are read under `alias`.
    Query { query: Box<QueryIR>, alias: String },
}

impl Source {
    /// Alias the source is visible under.
    pub fn alias(&self) -> &str {
        match self {
            Source::Collection { alias, .. } | Source::Query { alias, .. } => alias,
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, Source::Collection { .. })
    }
}

/// Join kinds of the query language.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    /// Every pair of rows; the join condition is ignored.
    Cross,
}

/// `JOIN <from> ON <left> = <right>`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JoinClause {
    pub from: Source,
    pub kind: JoinKind,
    pub left: Expr,
    pub right: Expr,
}

/// Sort direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// Placement of nulls in an ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Nulls {
    #[default]
    First,
    Last,
}

/// One ORDER BY term.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OrderBy {
    pub expr: Expr,
    pub direction: Direction,
    pub nulls: Nulls,
}

/// Declarative representation of a query.
///
/// `where_` and `having` hold conjuncts. `select` keeps its column order; when
/// absent a query without joins yields its source rows and a query with joins
/// yields the namespaced rows (`{alias: row, ...}`).
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QueryIR {
    pub from: Source,
    pub join: Vec<JoinClause>,
    pub where_: Vec<Expr>,
    pub select: Option<Vec<(String, Expr)>>,
    pub group_by: Vec<Expr>,
    pub having: Vec<Expr>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub distinct: bool,
}

impl QueryIR {
    /// A query reading every row of `from`.
    pub fn new(from: Source) -> Self {
        Self {
            from,
            join: Vec::new(),
            where_: Vec::new(),
            select: None,
            group_by: Vec::new(),
            having: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            distinct: false,
        }
    }

    /// Aliases visible in this query's scope, main source first.
    pub fn aliases(&self) -> Vec<String> {
        core::iter::once(&self.from)
            .chain(self.join.iter().map(|j| &j.from))
            .map(|s| String::from(s.alias()))
            .collect()
    }

    /// True if the query aggregates rows.
    pub fn is_grouped(&self) -> bool {
        !self.group_by.is_empty()
            || self
                .select
                .iter()
                .flatten()
                .any(|(_, e)| e.contains_aggregate())
            || self.having.iter().any(Expr::contains_aggregate)
    }

    /// Every `(alias, collection id)` read by the query, subqueries included.
    pub fn collection_sources(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        self.collect_sources(&mut out);
        out
    }

    fn collect_sources(&self, out: &mut Vec<(String, String)>) {
        for source in core::iter::once(&self.from).chain(self.join.iter().map(|j| &j.from)) {
            match source {
                Source::Collection { id, alias } => out.push((alias.clone(), id.clone())),
                Source::Query { query, .. } => query.collect_sources(out),
            }
        }
    }
}
