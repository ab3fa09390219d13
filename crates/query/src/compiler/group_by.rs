//! GROUP BY / HAVING compilation.
//!
//! Grouping turns namespaced rows into one aggregated row per group:
//! `{__group_0: .., __group_1: .., __agg_0: .., __agg_1: ..}`. SELECT, HAVING
//! and ORDER BY of a grouped query are rewritten to read those columns, so an
//! aggregate appearing in several clauses is computed once.

use crate::ast::{Expr, QueryIR};
use crate::compiler::expression::{compile_expression, compile_single_row_expression, is_truthy, CompiledExpr};
use crate::compiler::SourceStream;
use alloc::format;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use rivulet_core::{Error, Result, Value};
use rivulet_incremental::{AggregateKind, AggregateSpec};

const GROUP_PREFIX: &str = "__group_";
const AGG_PREFIX: &str = "__agg_";

/// Rewrites expressions of a grouped query onto its aggregated rows.
pub struct GroupRewriter {
    group_by: Vec<Expr>,
    aggregates: Vec<Expr>,
}

impl GroupRewriter {
    /// Collects the aggregates used anywhere in `query`.
    pub fn new(query: &QueryIR) -> Self {
        let mut aggregates = Vec::new();
        let exprs = query
            .select
            .iter()
            .flatten()
            .map(|(_, e)| e)
            .chain(query.having.iter())
            .chain(query.order_by.iter().map(|o| &o.expr));
        for expr in exprs {
            collect_aggregates(expr, &mut aggregates);
        }
        Self {
            group_by: query.group_by.clone(),
            aggregates,
        }
    }

    /// Distinct aggregate calls, in order of first appearance.
    pub fn aggregates(&self) -> &[Expr] {
        &self.aggregates
    }

    /// Rewrites `expr` onto aggregated rows, rejecting references to columns
    /// that are neither grouped nor aggregated.
    pub fn rewrite(&self, expr: &Expr) -> Result<Expr> {
        let rewritten = replace_aggregates_by_refs(expr, &self.aggregates, &self.group_by);
        if has_ungrouped_ref(&rewritten) {
            return Err(Error::non_aggregate_not_grouped(format!("{}", expr)));
        }
        Ok(rewritten)
    }

    pub(crate) fn compile(&self, expr: &Expr) -> Result<CompiledExpr> {
        compile_single_row_expression(&self.rewrite(expr)?)
    }
}

fn collect_aggregates(expr: &Expr, out: &mut Vec<Expr>) {
    match expr {
        Expr::Aggregate { .. } => {
            if !out.contains(expr) {
                out.push(expr.clone());
            }
        }
        Expr::Func { args, .. } => {
            for arg in args {
                collect_aggregates(arg, out);
            }
        }
        Expr::Value(_) | Expr::PropRef { .. } => {}
    }
}

fn column(prefix: &str, i: usize) -> Expr {
    Expr::PropRef {
        path: Vec::from([format!("{}{}", prefix, i)]),
    }
}

/// Replaces grouped sub-expressions and aggregate calls by references to the
/// columns of the aggregated row that hold their values.
pub fn replace_aggregates_by_refs(expr: &Expr, aggregates: &[Expr], group_by: &[Expr]) -> Expr {
    if let Some(i) = group_by.iter().position(|g| g == expr) {
        return column(GROUP_PREFIX, i);
    }
    match expr {
        Expr::Aggregate { .. } => match aggregates.iter().position(|a| a == expr) {
            Some(i) => column(AGG_PREFIX, i),
            None => expr.clone(),
        },
        Expr::Func { name, args } => Expr::Func {
            name: name.clone(),
            args: args
                .iter()
                .map(|a| replace_aggregates_by_refs(a, aggregates, group_by))
                .collect(),
        },
        Expr::Value(_) | Expr::PropRef { .. } => expr.clone(),
    }
}

fn has_ungrouped_ref(expr: &Expr) -> bool {
    match expr {
        Expr::PropRef { path } => match path.as_slice() {
            [column] => !(column.starts_with(GROUP_PREFIX) || column.starts_with(AGG_PREFIX)),
            _ => true,
        },
        Expr::Func { args, .. } => args.iter().any(has_ungrouped_ref),
        Expr::Aggregate { .. } => true,
        Expr::Value(_) => false,
    }
}

/// Groups namespaced rows and maintains their aggregates. Returns one
/// `(group key, aggregated row)` per group passing HAVING.
pub(crate) fn process_group_by(
    rows: SourceStream,
    query: &QueryIR,
    scope: &[String],
    rewriter: &GroupRewriter,
) -> Result<SourceStream> {
    let keys = query
        .group_by
        .iter()
        .map(|e| compile_expression(e, scope))
        .collect::<Result<Vec<_>>>()?;

    let mut specs = Vec::with_capacity(rewriter.aggregates().len());
    for aggregate in rewriter.aggregates() {
        specs.push(aggregate_spec(aggregate, scope)?);
    }

    let having = query
        .having
        .iter()
        .map(|e| rewriter.rewrite(e))
        .collect::<Result<Vec<_>>>()?;
    let having = Expr::conjunction(having)
        .map(|e| compile_single_row_expression(&e))
        .transpose()?;

    tracing::debug!(
        keys = keys.len(),
        aggregates = specs.len(),
        having = having.is_some(),
        "compiling group by"
    );

    let group_key = move |(_, row): &(Value, Value)| Value::Array(keys.iter().map(|k| k(row)).collect());
    let grouped = rows.group_by(group_key, specs).map(|(key, values)| {
        let mut fields: Vec<(String, Value)> = Vec::new();
        if let Value::Array(parts) = &key {
            for (i, part) in parts.iter().enumerate() {
                fields.push((format!("{}{}", GROUP_PREFIX, i), part.clone()));
            }
        }
        for (i, value) in values.into_iter().enumerate() {
            fields.push((format!("{}{}", AGG_PREFIX, i), value));
        }
        (key, Value::object(fields))
    });

    Ok(match having {
        Some(predicate) => grouped.filter(move |(_, row)| is_truthy(&predicate(row))),
        None => grouped,
    })
}

fn aggregate_spec(aggregate: &Expr, scope: &[String]) -> Result<AggregateSpec<(Value, Value)>> {
    let Expr::Aggregate { name, args } = aggregate else {
        return Err(Error::invalid_query(format!("`{}` is not an aggregate", aggregate)));
    };
    let kind = AggregateKind::from_name(name).ok_or_else(|| Error::unknown_function(name.clone()))?;
    let value: CompiledExpr = match (kind, args.as_slice()) {
        // count() counts rows
        (AggregateKind::Count, []) => Rc::new(|_: &Value| Value::Int64(1)),
        (_, [arg]) => compile_expression(arg, scope)?,
        _ => {
            return Err(Error::invalid_query(format!(
                "`{}` takes one argument, got {}",
                name,
                args.len()
            )))
        }
    };
    Ok(AggregateSpec::new(kind, move |(_, row): &(Value, Value)| value(row)))
}
