//! Expression compilation.
//!
//! An `Expr` tree is compiled once into a closure so that evaluating a row
//! never walks the tree or matches on function names.

use crate::ast::Expr;
use crate::compiler::functions::compile_function;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use rivulet_core::{Error, Result, Value};

/// A compiled expression evaluated against one row.
pub type CompiledExpr = Rc<dyn Fn(&Value) -> Value>;

/// Compiles an expression evaluated over namespaced rows (`{alias: row}`).
///
/// Every reference must start with one of `aliases`.
pub fn compile_expression(expr: &Expr, aliases: &[String]) -> Result<CompiledExpr> {
    compile(expr, Some(aliases))
}

/// Compiles an expression evaluated directly on a single row; references are
/// plain field paths.
pub fn compile_single_row_expression(expr: &Expr) -> Result<CompiledExpr> {
    compile(expr, None)
}

/// Interprets an expression result in boolean context. Unknown is false.
#[inline]
pub fn is_truthy(value: &Value) -> bool {
    truth(value) == Some(true)
}

/// Three-valued truth of a value: Null is unknown, non-booleans are true.
pub(crate) fn truth(value: &Value) -> Option<bool> {
    match value {
        Value::Null => None,
        Value::Boolean(b) => Some(*b),
        _ => Some(true),
    }
}

fn compile(expr: &Expr, aliases: Option<&[String]>) -> Result<CompiledExpr> {
    match expr {
        Expr::Value(v) => {
            let v = v.clone();
            Ok(Rc::new(move |_| v.clone()))
        }
        Expr::PropRef { path } => {
            if let Some(aliases) = aliases {
                let alias = path
                    .first()
                    .ok_or_else(|| Error::invalid_query("empty property reference"))?;
                if !aliases.contains(alias) {
                    return Err(Error::unknown_alias(alias.clone()));
                }
            }
            let path = path.clone();
            Ok(Rc::new(move |row: &Value| row.get_path(&path).clone()))
        }
        Expr::Func { name, args } => {
            let args = args
                .iter()
                .map(|a| compile(a, aliases))
                .collect::<Result<Vec<_>>>()?;
            compile_function(name, args)
        }
        Expr::Aggregate { name, .. } => Err(Error::invalid_query(alloc::format!(
            "aggregate `{}` used outside of a grouped query",
            name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;
    use alloc::vec;

    fn aliases() -> Vec<String> {
        vec!["u".to_string()]
    }

    fn row(age: Value, dept: &str) -> Value {
        Value::object([(
            "u",
            Value::object([("age", age), ("dept", Value::from(dept))]),
        )])
    }

    #[test]
    fn test_compile_literal_and_ref() {
        let f = compile_expression(&Expr::prop("u.dept"), &aliases()).unwrap();
        assert_eq!(f(&row(Value::Int64(3), "eng")), Value::from("eng"));

        let f = compile_expression(&Expr::value(7i64), &aliases()).unwrap();
        assert_eq!(f(&Value::Null), Value::Int64(7));

        let f = compile_expression(&Expr::prop("u.missing.deep"), &aliases()).unwrap();
        assert_eq!(f(&row(Value::Int64(3), "eng")), Value::Null);
    }

    #[test]
    fn test_unknown_alias_is_compile_error() {
        let err = compile_expression(&Expr::prop("x.dept"), &aliases()).err();
        assert_eq!(err, Some(Error::unknown_alias("x")));
    }

    #[test]
    fn test_unknown_function_is_compile_error() {
        let e = Expr::func("frobnicate", vec![Expr::prop("u.age")]);
        assert_eq!(
            compile_expression(&e, &aliases()).err(),
            Some(Error::unknown_function("frobnicate"))
        );
    }

    #[test]
    fn test_aggregate_outside_group_is_error() {
        let e = Expr::aggregate("count", vec![]);
        assert!(matches!(
            compile_expression(&e, &aliases()),
            Err(Error::InvalidQuery { .. })
        ));
    }

    #[test]
    fn test_null_comparison_is_not_truthy() {
        let e = Expr::gt(Expr::prop("u.age"), Expr::value(30i64));
        let f = compile_expression(&e, &aliases()).unwrap();
        assert!(is_truthy(&f(&row(Value::Int64(40), "eng"))));
        assert!(!is_truthy(&f(&row(Value::Int64(20), "eng"))));
        assert_eq!(f(&row(Value::Null, "eng")), Value::Null);
        assert!(!is_truthy(&f(&row(Value::Null, "eng"))));

        // NOT unknown stays unknown
        let f = compile_expression(&Expr::not(e), &aliases()).unwrap();
        assert!(!is_truthy(&f(&row(Value::Null, "eng"))));
    }

    #[test]
    fn test_single_row_expression() {
        let e = Expr::eq(Expr::prop("dept"), Expr::value("eng"));
        let f = compile_single_row_expression(&e).unwrap();
        let user = Value::object([("dept", Value::from("eng"))]);
        assert_eq!(f(&user), Value::Boolean(true));
    }
}
