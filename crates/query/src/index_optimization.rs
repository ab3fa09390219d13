//! Resolving WHERE expressions against secondary indexes.
//!
//! Expressions here are single-row expressions: references are field paths
//! relative to a collection row. Comparisons of an indexed field with a
//! literal become point or range lookups; `and` intersects and `or` unions the
//! candidate key sets.

use crate::ast::Expr;
use alloc::string::String;
use alloc::vec::Vec;
use hashbrown::HashSet;
use rivulet_core::Value;
use rivulet_index::{FieldPath, Index, IndexSet, KeyRange, RowKey};

/// Outcome of resolving an expression against indexes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexOptimization {
    /// True if `matching_keys` is usable instead of a full scan.
    pub can_optimize: bool,
    /// Candidate row keys.
    pub matching_keys: HashSet<RowKey>,
    /// True if every candidate satisfies the expression; otherwise candidates
    /// must still be checked against it.
    pub exact: bool,
}

impl IndexOptimization {
    fn none() -> Self {
        Self::default()
    }

    fn exact(keys: HashSet<RowKey>) -> Self {
        Self {
            can_optimize: true,
            matching_keys: keys,
            exact: true,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Cmp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Cmp {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "eq" => Some(Cmp::Eq),
            "gt" => Some(Cmp::Gt),
            "gte" => Some(Cmp::Gte),
            "lt" => Some(Cmp::Lt),
            "lte" => Some(Cmp::Lte),
            _ => None,
        }
    }

    /// The operator with its operands swapped: `5 < x` is `x > 5`.
    fn flip(self) -> Self {
        match self {
            Cmp::Eq => Cmp::Eq,
            Cmp::Gt => Cmp::Lt,
            Cmp::Gte => Cmp::Lte,
            Cmp::Lt => Cmp::Gt,
            Cmp::Lte => Cmp::Gte,
        }
    }

    fn range(self, value: Value) -> KeyRange<Value> {
        match self {
            Cmp::Eq => KeyRange::only(value),
            Cmp::Gt => KeyRange::lower_bound(value, true),
            Cmp::Gte => KeyRange::lower_bound(value, false),
            Cmp::Lt => KeyRange::upper_bound(value, true),
            Cmp::Lte => KeyRange::upper_bound(value, false),
        }
    }
}

/// Splits `field op literal` (in either operand order) into its parts.
fn field_comparison(name: &str, args: &[Expr]) -> Option<(Cmp, FieldPath, Value)> {
    let cmp = Cmp::from_name(name)?;
    match args {
        [Expr::PropRef { path }, Expr::Value(v)] => Some((cmp, path.clone(), v.clone())),
        [Expr::Value(v), Expr::PropRef { path }] => Some((cmp.flip(), path.clone(), v.clone())),
        _ => None,
    }
}

/// Resolves `expr` to the keys of the rows that can satisfy it, using only
/// `indexes`. Falls back to `can_optimize == false` when the expression is not
/// index-shaped or a field it needs is not indexed.
pub fn optimize_expression_with_indexes(expr: &Expr, indexes: &IndexSet) -> IndexOptimization {
    let (name, args) = match expr {
        Expr::Func { name, args } => (name.as_str(), args.as_slice()),
        _ => return IndexOptimization::none(),
    };

    if let Some((cmp, path, value)) = field_comparison(name, args) {
        let Some(index) = indexes.get(&path) else {
            return IndexOptimization::none();
        };
        // comparing with null is never true
        if value.is_null() {
            return IndexOptimization::exact(HashSet::new());
        }
        let keys = match cmp {
            Cmp::Eq => index.lookup(&value),
            _ => index.range_lookup(&cmp.range(value)),
        };
        return IndexOptimization::exact(keys);
    }

    match (name, args) {
        ("in", [Expr::PropRef { path }, Expr::Value(Value::Array(items))]) => {
            let Some(index) = indexes.get(path) else {
                return IndexOptimization::none();
            };
            let keys = items
                .iter()
                .filter(|v| !v.is_null())
                .flat_map(|v| index.lookup(v))
                .collect();
            IndexOptimization::exact(keys)
        }
        ("and", parts) => optimize_and(parts, indexes),
        ("or", parts) => optimize_or(parts, indexes),
        _ => IndexOptimization::none(),
    }
}

fn optimize_and(parts: &[Expr], indexes: &IndexSet) -> IndexOptimization {
    let mut result: Option<HashSet<RowKey>> = None;
    let mut exact = true;
    for part in parts {
        let opt = optimize_expression_with_indexes(part, indexes);
        if !opt.can_optimize {
            exact = false;
            continue;
        }
        exact &= opt.exact;
        result = Some(match result {
            None => opt.matching_keys,
            Some(acc) => acc.intersection(&opt.matching_keys).cloned().collect(),
        });
    }
    match result {
        Some(keys) => IndexOptimization {
            can_optimize: true,
            matching_keys: keys,
            exact,
        },
        None => IndexOptimization::none(),
    }
}

fn optimize_or(parts: &[Expr], indexes: &IndexSet) -> IndexOptimization {
    let mut keys = HashSet::new();
    let mut exact = true;
    for part in parts {
        let opt = optimize_expression_with_indexes(part, indexes);
        if !opt.can_optimize {
            return IndexOptimization::none();
        }
        exact &= opt.exact;
        keys.extend(opt.matching_keys);
    }
    IndexOptimization {
        can_optimize: !parts.is_empty(),
        matching_keys: keys,
        exact,
    }
}

/// Field paths an index could serve for `expr`, in order of appearance.
pub fn indexable_fields(expr: &Expr) -> Vec<FieldPath> {
    let mut out: Vec<FieldPath> = Vec::new();
    collect_indexable(expr, &mut out);
    out
}

fn collect_indexable(expr: &Expr, out: &mut Vec<FieldPath>) {
    let Expr::Func { name, args } = expr else {
        return;
    };
    let path: Option<&Vec<String>> = match (name.as_str(), args.as_slice()) {
        ("and" | "or", parts) => {
            for part in parts {
                collect_indexable(part, out);
            }
            None
        }
        ("in", [Expr::PropRef { path }, Expr::Value(Value::Array(_))]) => Some(path),
        (name, [Expr::PropRef { path }, Expr::Value(_)] | [Expr::Value(_), Expr::PropRef { path }])
            if Cmp::from_name(name).is_some() =>
        {
            Some(path)
        }
        _ => None,
    };
    if let Some(path) = path {
        if !path.is_empty() && !out.contains(path) {
            out.push(path.clone());
        }
    }
}
