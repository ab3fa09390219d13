//! Expression IR.

use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;
use hashbrown::HashSet;
use rivulet_core::Value;

/// Expression IR node.
///
/// A `PropRef` path starts with a source alias (`["users", "dept"]`) when the
/// expression is evaluated over namespaced rows. A single-segment path refers
/// to the whole row of that source.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Expr {
    /// Literal value.
    Value(Value),
    /// Reference to a (possibly nested) field.
    PropRef { path: Vec<String> },
    /// Scalar function call.
    Func { name: String, args: Vec<Expr> },
    /// Aggregate function call, only valid in grouped SELECT/HAVING/ORDER BY.
    Aggregate { name: String, args: Vec<Expr> },
}

impl Expr {
    /// Creates a property reference from a dotted path (`"users.dept"`).
    pub fn prop(path: &str) -> Self {
        Expr::PropRef {
            path: path.split('.').map(|s| s.to_string()).collect(),
        }
    }

    /// Creates a literal.
    pub fn value(value: impl Into<Value>) -> Self {
        Expr::Value(value.into())
    }

    /// Creates a function call.
    pub fn func(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Func {
            name: name.into(),
            args,
        }
    }

    /// Creates an aggregate call.
    pub fn aggregate(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Aggregate {
            name: name.into(),
            args,
        }
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::func("eq", vec![left, right])
    }

    pub fn gt(left: Expr, right: Expr) -> Self {
        Self::func("gt", vec![left, right])
    }

    pub fn gte(left: Expr, right: Expr) -> Self {
        Self::func("gte", vec![left, right])
    }

    pub fn lt(left: Expr, right: Expr) -> Self {
        Self::func("lt", vec![left, right])
    }

    pub fn lte(left: Expr, right: Expr) -> Self {
        Self::func("lte", vec![left, right])
    }

    pub fn and(left: Expr, right: Expr) -> Self {
        Self::func("and", vec![left, right])
    }

    pub fn or(left: Expr, right: Expr) -> Self {
        Self::func("or", vec![left, right])
    }

    pub fn not(expr: Expr) -> Self {
        Self::func("not", vec![expr])
    }

    /// Creates `expr IN (values)`.
    pub fn in_list(expr: Expr, values: Vec<Value>) -> Self {
        Self::func("in", vec![expr, Expr::Value(Value::Array(values))])
    }

    /// Returns the path if this is a property reference.
    pub fn as_prop_ref(&self) -> Option<&[String]> {
        match self {
            Expr::PropRef { path } => Some(path),
            _ => None,
        }
    }

    /// Returns the literal if this is a value.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Expr::Value(v) => Some(v),
            _ => None,
        }
    }

    /// Returns true if the tree contains an aggregate call.
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expr::Aggregate { .. } => true,
            Expr::Func { args, .. } => args.iter().any(Expr::contains_aggregate),
            Expr::Value(_) | Expr::PropRef { .. } => false,
        }
    }

    /// Returns true if the tree references a whole source row.
    pub fn references_whole_row(&self) -> bool {
        match self {
            Expr::PropRef { path } => path.len() == 1,
            Expr::Func { args, .. } | Expr::Aggregate { args, .. } => {
                args.iter().any(Expr::references_whole_row)
            }
            Expr::Value(_) => false,
        }
    }

    /// Source aliases referenced by the tree (first path segments).
    pub fn referenced_aliases(&self) -> HashSet<String> {
        let mut aliases = HashSet::new();
        self.collect_aliases(&mut aliases);
        aliases
    }

    fn collect_aliases(&self, out: &mut HashSet<String>) {
        match self {
            Expr::PropRef { path } => {
                if let Some(alias) = path.first() {
                    out.insert(alias.clone());
                }
            }
            Expr::Func { args, .. } | Expr::Aggregate { args, .. } => {
                for arg in args {
                    arg.collect_aliases(out);
                }
            }
            Expr::Value(_) => {}
        }
    }

    /// Rewrites references to `from` so they point at `to`.
    pub fn rename_alias(&self, from: &str, to: &str) -> Expr {
        self.map_refs(&|path| {
            let mut path = path.to_vec();
            if path.first().map(String::as_str) == Some(from) {
                path[0] = to.to_string();
            }
            path
        })
    }

    /// Drops the leading `alias` segment from references, turning a
    /// namespaced expression into one evaluated directly on a source row.
    pub fn strip_alias(&self, alias: &str) -> Expr {
        self.map_refs(&|path| {
            if path.first().map(String::as_str) == Some(alias) {
                path[1..].to_vec()
            } else {
                path.to_vec()
            }
        })
    }

    fn map_refs(&self, f: &dyn Fn(&[String]) -> Vec<String>) -> Expr {
        match self {
            Expr::Value(v) => Expr::Value(v.clone()),
            Expr::PropRef { path } => Expr::PropRef { path: f(path) },
            Expr::Func { name, args } => Expr::Func {
                name: name.clone(),
                args: args.iter().map(|a| a.map_refs(f)).collect(),
            },
            Expr::Aggregate { name, args } => Expr::Aggregate {
                name: name.clone(),
                args: args.iter().map(|a| a.map_refs(f)).collect(),
            },
        }
    }

    /// Splits a conjunction into its conjuncts, flattening nested `and`s.
    pub fn split_and(self) -> Vec<Expr> {
        match self {
            Expr::Func { name, args } if name == "and" => {
                args.into_iter().flat_map(Expr::split_and).collect()
            }
            other => vec![other],
        }
    }

    /// Joins conjuncts back into one expression. `None` for an empty list.
    pub fn conjunction(mut exprs: Vec<Expr>) -> Option<Expr> {
        match exprs.len() {
            0 => None,
            1 => exprs.pop(),
            _ => Some(Expr::func("and", exprs)),
        }
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Value(value)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Value(v) => write!(f, "{}", v),
            Expr::PropRef { path } => write!(f, "{}", path.join(".")),
            Expr::Func { name, args } | Expr::Aggregate { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;

    #[test]
    fn test_prop_splits_path() {
        let e = Expr::prop("users.address.city");
        assert_eq!(
            e.as_prop_ref(),
            Some(&["users".to_string(), "address".to_string(), "city".to_string()][..])
        );
    }

    #[test]
    fn test_contains_aggregate() {
        let count = Expr::aggregate("count", vec![]);
        assert!(count.contains_aggregate());
        assert!(Expr::gt(count, Expr::value(1i64)).contains_aggregate());
        assert!(!Expr::eq(Expr::prop("u.a"), Expr::value(1i64)).contains_aggregate());
    }

    #[test]
    fn test_referenced_aliases() {
        let e = Expr::and(
            Expr::eq(Expr::prop("u.dept_id"), Expr::prop("d.id")),
            Expr::gt(Expr::prop("u.age"), Expr::value(30i64)),
        );
        let aliases = e.referenced_aliases();
        assert_eq!(aliases.len(), 2);
        assert!(aliases.contains("u"));
        assert!(aliases.contains("d"));
    }

    #[test]
    fn test_whole_row_reference() {
        assert!(Expr::func("isNull", vec![Expr::prop("u")]).references_whole_row());
        assert!(!Expr::prop("u.id").references_whole_row());
    }

    #[test]
    fn test_rename_and_strip_alias() {
        let e = Expr::eq(Expr::prop("u.dept"), Expr::prop("d.name"));
        assert_eq!(
            e.rename_alias("u", "users"),
            Expr::eq(Expr::prop("users.dept"), Expr::prop("d.name"))
        );
        assert_eq!(
            Expr::eq(Expr::prop("u.dept"), Expr::value("eng")).strip_alias("u"),
            Expr::eq(Expr::prop("dept"), Expr::value("eng"))
        );
    }

    #[test]
    fn test_split_and_flattens() {
        let a = Expr::eq(Expr::prop("u.a"), Expr::value(1i64));
        let b = Expr::eq(Expr::prop("u.b"), Expr::value(2i64));
        let c = Expr::eq(Expr::prop("u.c"), Expr::value(3i64));
        let e = Expr::and(a.clone(), Expr::and(b.clone(), c.clone()));
        assert_eq!(e.split_and(), vec![a.clone(), b.clone(), c.clone()]);

        let or = Expr::or(a.clone(), b.clone());
        assert_eq!(or.clone().split_and(), vec![or]);

        assert_eq!(Expr::conjunction(vec![]), None);
        assert_eq!(Expr::conjunction(vec![a.clone()]), Some(a));
    }

    #[test]
    fn test_display() {
        let e = Expr::and(
            Expr::eq(Expr::prop("u.dept"), Expr::value("eng")),
            Expr::gt(Expr::aggregate("count", vec![]), Expr::value(2i64)),
        );
        assert_eq!(format!("{}", e), "and(eq(u.dept, \"eng\"), gt(count(), 2))");
    }
}
