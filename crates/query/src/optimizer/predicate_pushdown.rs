//! Predicate pushdown.
//!
//! Splits WHERE into conjuncts and moves every conjunct that reads a single
//! source into that source:
//! 1. A collection source is wrapped in a subquery filtering it
//! 2. A plain filtering subquery gets the conjunct appended to its WHERE
//! 3. Conjuncts touching several sources, whole rows, aggregates, or the
//!    nullable side of an outer join stay at the join level
//!
//! Queries without joins keep their WHERE in place; pushing would not shrink
//! any join input. Their single-source conjuncts are still recorded so the
//! source subscription can pre-filter through indexes.

use crate::ast::{Expr, JoinKind, QueryIR, Source};
use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use hashbrown::{HashMap, HashSet};

/// Predicate pushdown over query IR.
#[derive(Default)]
pub struct PredicatePushdown {
    /// Conjuncts pushed to each collection-backed alias.
    source_clauses: HashMap<String, Vec<Expr>>,
}

impl PredicatePushdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes the pass, returning the conjunction pushed to each
    /// collection alias.
    pub fn into_source_clauses(self) -> HashMap<String, Expr> {
        self.source_clauses
            .into_iter()
            .filter_map(|(alias, clauses)| Expr::conjunction(clauses).map(|e| (alias, e)))
            .collect()
    }

    /// Rewrites `query` and its subqueries.
    pub fn optimize(&mut self, mut query: QueryIR) -> QueryIR {
        query.from = self.optimize_source(query.from);
        query.join = core::mem::take(&mut query.join)
            .into_iter()
            .map(|mut join| {
                join.from = self.optimize_source(join.from);
                join
            })
            .collect();

        if query.where_.is_empty() {
            return query;
        }
        let conjuncts: Vec<Expr> = core::mem::take(&mut query.where_)
            .into_iter()
            .flat_map(Expr::split_and)
            .collect();

        if query.join.is_empty() {
            if let Source::Collection { alias, .. } = &query.from {
                for clause in conjuncts.iter().filter(|c| single_source(c).as_deref() == Some(alias.as_str())) {
                    self.record(alias, clause.clone());
                }
            }
            query.where_ = conjuncts;
            return query;
        }

        let nullable = nullable_aliases(&query);
        let mut pushed: HashMap<String, Vec<Expr>> = HashMap::new();
        let mut remaining = Vec::new();
        for clause in conjuncts {
            match single_source(&clause) {
                Some(alias) if !nullable.contains(&alias) && accepts_pushdown(&query, &alias) => {
                    pushed.entry(alias).or_default().push(clause)
                }
                _ => remaining.push(clause),
            }
        }

        if !pushed.is_empty() {
            tracing::trace!(aliases = pushed.len(), kept = remaining.len(), "pushed down predicates");
        }
        query.from = self.push_into(query.from, &mut pushed);
        query.join = core::mem::take(&mut query.join)
            .into_iter()
            .map(|mut join| {
                join.from = self.push_into(join.from, &mut pushed);
                join
            })
            .collect();
        query.where_ = remaining;
        query
    }

    fn optimize_source(&mut self, source: Source) -> Source {
        match source {
            Source::Query { query, alias } => Source::Query {
                query: Box::new(self.optimize(*query)),
                alias,
            },
            collection => collection,
        }
    }

    fn push_into(&mut self, source: Source, pushed: &mut HashMap<String, Vec<Expr>>) -> Source {
        let Some(clauses) = pushed.remove(source.alias()) else {
            return source;
        };
        match source {
            Source::Collection { id, alias } => {
                for clause in &clauses {
                    self.record(&alias, clause.clone());
                }
                let mut inner = QueryIR::new(Source::Collection {
                    id,
                    alias: alias.clone(),
                });
                inner.where_ = clauses;
                Source::Query {
                    query: Box::new(inner),
                    alias,
                }
            }
            Source::Query { mut query, alias } => {
                let inner_alias = String::from(query.from.alias());
                for clause in clauses {
                    let renamed = clause.rename_alias(&alias, &inner_alias);
                    if query.from.is_collection() {
                        self.record(&inner_alias, renamed.clone());
                    }
                    query.where_.push(renamed);
                }
                Source::Query { query, alias }
            }
        }
    }

    fn record(&mut self, alias: &str, clause: Expr) {
        let clauses = self.source_clauses.entry(String::from(alias)).or_default();
        if !clauses.contains(&clause) {
            clauses.push(clause);
        }
    }
}

/// The alias a conjunct reads, if it reads exactly one source and can be
/// evaluated on that source's rows alone.
fn single_source(clause: &Expr) -> Option<String> {
    if clause.contains_aggregate() || clause.references_whole_row() {
        return None;
    }
    let aliases = clause.referenced_aliases();
    if aliases.len() == 1 {
        aliases.into_iter().next()
    } else {
        None
    }
}

/// Aliases that may be null-extended by an outer join. Filtering them before
/// the join would turn removed rows into null-extended ones.
fn nullable_aliases(query: &QueryIR) -> HashSet<String> {
    let mut nullable = HashSet::new();
    let mut seen: Vec<&str> = Vec::from([query.from.alias()]);
    for join in &query.join {
        let joined = join.from.alias();
        match join.kind {
            JoinKind::Left => {
                nullable.insert(String::from(joined));
            }
            JoinKind::Right => nullable.extend(seen.iter().map(|a| String::from(*a))),
            JoinKind::Full => {
                nullable.extend(seen.iter().map(|a| String::from(*a)));
                nullable.insert(String::from(joined));
            }
            JoinKind::Inner | JoinKind::Cross => {}
        }
        seen.push(joined);
    }
    nullable
}

/// True if the source under `alias` can absorb a filter without changing the
/// rows it produces otherwise.
fn accepts_pushdown(query: &QueryIR, alias: &str) -> bool {
    let source = core::iter::once(&query.from)
        .chain(query.join.iter().map(|j| &j.from))
        .find(|s| s.alias() == alias);
    match source {
        Some(Source::Collection { .. }) => true,
        Some(Source::Query { query, .. }) => {
            query.join.is_empty()
                && query.select.is_none()
                && query.group_by.is_empty()
                && query.having.is_empty()
                && query.limit.is_none()
                && query.offset.is_none()
                && !query.distinct
        }
        None => false,
    }
}
