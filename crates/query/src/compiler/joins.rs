//! Join compilation.
//!
//! Both sides are keyed by the value of their side of the equality condition
//! and joined incrementally. The joined row merges the namespaced objects of
//! both sides; a side missing from an outer join contributes `null` for each
//! of its aliases. The result key is `[main key, joined key]`.

use crate::ast::{Expr, JoinClause, JoinKind, QueryIR, Source};
use crate::compiler::expression::{compile_expression, CompiledExpr};
use crate::compiler::{Compiler, LazyLoader, SourceStream};
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::rc::Rc;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use hashbrown::HashSet;
use rivulet_core::{Error, Result, Value};
use rivulet_incremental::{JoinType, MultiSet, Stream};

/// Join key of one row. Rows whose condition value is null never match, so
/// they get a key unique to the row and to its side.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum JoinKey {
    Value(Value),
    Unmatched(bool, Value),
}

impl JoinKey {
    fn new(value: Value, main_side: bool, row_key: &Value) -> Self {
        if value.is_null() {
            JoinKey::Unmatched(main_side, row_key.clone())
        } else {
            JoinKey::Value(value)
        }
    }
}

type KeyedRows = Stream<(JoinKey, (Value, Value))>;

fn join_type(kind: JoinKind) -> JoinType {
    match kind {
        JoinKind::Inner | JoinKind::Cross => JoinType::Inner,
        JoinKind::Left => JoinType::Left,
        JoinKind::Right => JoinType::Right,
        JoinKind::Full => JoinType::Full,
    }
}

/// Orders the condition as `(main side, joined side)`.
fn orient<'a>(clause: &'a JoinClause, scope: &[String], joined: &str) -> Result<(&'a Expr, &'a Expr)> {
    let belongs_to_main = |e: &Expr| {
        let aliases = e.referenced_aliases();
        !aliases.is_empty() && aliases.iter().all(|a| scope.contains(a))
    };
    let belongs_to_joined = |e: &Expr| {
        let aliases = e.referenced_aliases();
        aliases.len() == 1 && aliases.contains(joined)
    };
    if belongs_to_main(&clause.left) && belongs_to_joined(&clause.right) {
        Ok((&clause.left, &clause.right))
    } else if belongs_to_main(&clause.right) && belongs_to_joined(&clause.left) {
        Ok((&clause.right, &clause.left))
    } else {
        Err(Error::invalid_query(format!(
            "join condition `{} = {}` must compare `{}` with an earlier source",
            clause.left, clause.right, joined
        )))
    }
}

fn key_rows(rows: &SourceStream, key: Option<CompiledExpr>, main_side: bool) -> KeyedRows {
    rows.map(move |(row_key, row)| {
        let join_key = match &key {
            Some(key) => JoinKey::new(key(&row), main_side, &row_key),
            None => JoinKey::Value(Value::Null),
        };
        (join_key, (row_key, row))
    })
}

/// The field path a lazy source is loaded by: a reference to one of its
/// fields.
fn lazy_path(expr: &Expr) -> Option<Vec<String>> {
    match expr.as_prop_ref() {
        Some(path) if path.len() >= 2 => Some(path[1..].to_vec()),
        _ => None,
    }
}

fn loader_for(compiler: &Compiler<'_>, source: &Source) -> Option<Rc<dyn LazyLoader>> {
    match source {
        Source::Collection { alias, .. } => compiler.inputs().lazy_loaders.get(alias).cloned(),
        Source::Query { .. } => None,
    }
}

/// Requests the lazy side's rows for every key the active side produces.
fn load_on_demand(active: KeyedRows, loader: Rc<dyn LazyLoader>, path: Vec<String>) -> KeyedRows {
    active.tap(move |batch: &MultiSet<(JoinKey, (Value, Value))>| {
        let mut seen = HashSet::new();
        let keys: Vec<Value> = batch
            .iter()
            .filter(|(_, m)| *m > 0)
            .filter_map(|((key, _), _)| match key {
                JoinKey::Value(v) if seen.insert(v.clone()) => Some(v.clone()),
                _ => None,
            })
            .collect();
        if !keys.is_empty() {
            tracing::trace!(keys = keys.len(), "loading joined rows");
            loader.load_keys(&path, &keys);
        }
    })
}

fn merge(target: &mut Value, side: Option<(Value, Value)>, aliases: &[String]) -> Value {
    match side {
        Some((key, Value::Object(fields))) => {
            for (alias, row) in fields {
                target.set(alias, row);
            }
            key
        }
        Some((key, _)) => key,
        None => {
            for alias in aliases {
                target.set(alias.clone(), Value::Null);
            }
            Value::Null
        }
    }
}

/// Joins `rows`, the namespaced rows of the sources in `scope`, with the
/// source of the `index`-th join clause. Adds the joined alias to `scope`.
pub(crate) fn process_join(
    compiler: &mut Compiler<'_>,
    query: &QueryIR,
    index: usize,
    clause: &JoinClause,
    rows: SourceStream,
    scope: &mut Vec<String>,
) -> Result<SourceStream> {
    let joined = clause.from.alias().to_string();
    if scope.contains(&joined) {
        return Err(Error::invalid_query(format!("duplicate source alias `{}`", joined)));
    }
    let other = compiler.source_stream(&clause.from)?;

    let (main, joined_rows) = if clause.kind == JoinKind::Cross {
        (key_rows(&rows, None, true), key_rows(&other, None, false))
    } else {
        let (main_expr, joined_expr) = orient(clause, scope, &joined)?;
        let main_key = compile_expression(main_expr, scope)?;
        let joined_key = compile_expression(joined_expr, core::slice::from_ref(&joined))?;
        let mut main = key_rows(&rows, Some(main_key), true);
        let mut joined_rows = key_rows(&other, Some(joined_key), false);

        match clause.kind {
            JoinKind::Inner | JoinKind::Left => {
                if let (Some(loader), Some(path)) = (loader_for(compiler, &clause.from), lazy_path(joined_expr)) {
                    main = load_on_demand(main, loader, path);
                    compiler.mark_lazy(&joined);
                }
            }
            JoinKind::Right if index == 0 => {
                if let (Some(loader), Some(path)) = (loader_for(compiler, &query.from), lazy_path(main_expr)) {
                    joined_rows = load_on_demand(joined_rows, loader, path);
                    compiler.mark_lazy(query.from.alias());
                }
            }
            _ => {}
        }
        (main, joined_rows)
    };
    tracing::debug!(alias = %joined, kind = ?clause.kind, "compiling join");

    let main_aliases = scope.clone();
    let joined_aliases = Vec::from([joined.clone()]);
    let output = main
        .join(&joined_rows, join_type(clause.kind))
        .map(move |(_, (left, right))| {
            let mut row = Value::Object(BTreeMap::new());
            let left_key = merge(&mut row, left, &main_aliases);
            let right_key = merge(&mut row, right, &joined_aliases);
            (Value::Array(Vec::from([left_key, right_key])), row)
        });

    scope.push(joined);
    Ok(output)
}
