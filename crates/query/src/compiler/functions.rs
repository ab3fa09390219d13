//! Scalar function library.
//!
//! Comparisons follow SQL: a Null operand yields Null (unknown). Non-null
//! operands compare with `Value`'s total order, so values of different types
//! are still comparable. `and`/`or`/`not` implement three-valued logic.

use crate::compiler::expression::{truth, CompiledExpr};
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cmp::Ordering;
use rivulet_core::pattern_match;
use rivulet_core::{Error, Result, Value};

/// Builds the closure for a function call over already-compiled arguments.
pub(crate) fn compile_function(name: &str, mut args: Vec<CompiledExpr>) -> Result<CompiledExpr> {
    let f: CompiledExpr = match name {
        "eq" => comparison(name, args, |o| o == Ordering::Equal)?,
        "gt" => comparison(name, args, |o| o == Ordering::Greater)?,
        "gte" => comparison(name, args, |o| o != Ordering::Less)?,
        "lt" => comparison(name, args, |o| o == Ordering::Less)?,
        "lte" => comparison(name, args, |o| o != Ordering::Greater)?,
        "and" => {
            Rc::new(move |row: &Value| {
                let mut unknown = false;
                for arg in &args {
                    match truth(&arg(row)) {
                        Some(false) => return Value::Boolean(false),
                        None => unknown = true,
                        Some(true) => {}
                    }
                }
                if unknown {
                    Value::Null
                } else {
                    Value::Boolean(true)
                }
            })
        }
        "or" => {
            Rc::new(move |row: &Value| {
                let mut unknown = false;
                for arg in &args {
                    match truth(&arg(row)) {
                        Some(true) => return Value::Boolean(true),
                        None => unknown = true,
                        Some(false) => {}
                    }
                }
                if unknown {
                    Value::Null
                } else {
                    Value::Boolean(false)
                }
            })
        }
        "not" => {
            let [a] = take::<1>(name, &mut args)?;
            Rc::new(move |row: &Value| match truth(&a(row)) {
                Some(b) => Value::Boolean(!b),
                None => Value::Null,
            })
        }
        "in" => {
            let [a, list] = take::<2>(name, &mut args)?;
            Rc::new(move |row: &Value| {
                let needle = a(row);
                if needle.is_null() {
                    return Value::Null;
                }
                match list(row) {
                    Value::Array(items) => {
                        if items.contains(&needle) {
                            Value::Boolean(true)
                        } else if items.iter().any(Value::is_null) {
                            Value::Null
                        } else {
                            Value::Boolean(false)
                        }
                    }
                    Value::Null => Value::Null,
                    _ => Value::Boolean(false),
                }
            })
        }
        "like" => pattern(name, args, pattern_match::like)?,
        "ilike" => pattern(name, args, pattern_match::ilike)?,
        "upper" => string_map(name, args, |s| s.to_uppercase())?,
        "lower" => string_map(name, args, |s| s.to_lowercase())?,
        "length" => {
            let [a] = take::<1>(name, &mut args)?;
            Rc::new(move |row: &Value| match a(row) {
                Value::String(s) => Value::Int64(s.chars().count() as i64),
                Value::Array(items) => Value::Int64(items.len() as i64),
                _ => Value::Null,
            })
        }
        "concat" => Rc::new(move |row: &Value| {
            let mut out = String::new();
            for arg in &args {
                match arg(row) {
                    Value::Null => {}
                    Value::String(s) => out.push_str(&s),
                    other => out.push_str(&alloc::format!("{}", other)),
                }
            }
            Value::String(out)
        }),
        "coalesce" => Rc::new(move |row: &Value| {
            args.iter()
                .map(|arg| arg(row))
                .find(|v| !v.is_null())
                .unwrap_or(Value::Null)
        }),
        "add" => arithmetic(name, args, i64::checked_add, |a, b| a + b)?,
        "subtract" => arithmetic(name, args, i64::checked_sub, |a, b| a - b)?,
        "multiply" => arithmetic(name, args, i64::checked_mul, |a, b| a * b)?,
        "divide" => {
            let [a, b] = take::<2>(name, &mut args)?;
            Rc::new(move |row: &Value| match (a(row).as_number(), b(row).as_number()) {
                (Some(_), Some(d)) if d == 0.0 => Value::Null,
                (Some(n), Some(d)) => Value::Float64(n / d),
                _ => Value::Null,
            })
        }
        "isNull" => {
            let [a] = take::<1>(name, &mut args)?;
            Rc::new(move |row: &Value| Value::Boolean(a(row).is_null()))
        }
        "isNotNull" => {
            let [a] = take::<1>(name, &mut args)?;
            Rc::new(move |row: &Value| Value::Boolean(!a(row).is_null()))
        }
        _ => return Err(Error::unknown_function(name)),
    };
    Ok(f)
}

/// Moves exactly `N` arguments out of `args`.
fn take<const N: usize>(name: &str, args: &mut Vec<CompiledExpr>) -> Result<[CompiledExpr; N]> {
    let taken = core::mem::take(args);
    let found = taken.len();
    taken.try_into().map_err(|_| {
        Error::invalid_query(alloc::format!(
            "`{}` expects {} argument(s), got {}",
            name,
            N,
            found
        ))
    })
}

fn comparison(
    name: &str,
    mut args: Vec<CompiledExpr>,
    accept: fn(Ordering) -> bool,
) -> Result<CompiledExpr> {
    let [a, b] = take::<2>(name, &mut args)?;
    Ok(Rc::new(move |row: &Value| {
        let (l, r) = (a(row), b(row));
        if l.is_null() || r.is_null() {
            Value::Null
        } else {
            Value::Boolean(accept(l.cmp(&r)))
        }
    }))
}

fn pattern(name: &str, mut args: Vec<CompiledExpr>, matcher: fn(&str, &str) -> bool) -> Result<CompiledExpr> {
    let [a, p] = take::<2>(name, &mut args)?;
    Ok(Rc::new(move |row: &Value| match (a(row), p(row)) {
        (Value::String(s), Value::String(p)) => Value::Boolean(matcher(&s, &p)),
        _ => Value::Null,
    }))
}

fn string_map(name: &str, mut args: Vec<CompiledExpr>, f: fn(&str) -> String) -> Result<CompiledExpr> {
    let [a] = take::<1>(name, &mut args)?;
    Ok(Rc::new(move |row: &Value| match a(row) {
        Value::String(s) => Value::String(f(&s)),
        _ => Value::Null,
    }))
}

/// Integer arithmetic stays integral until it overflows; any float operand
/// makes the result a float.
fn arithmetic(
    name: &str,
    mut args: Vec<CompiledExpr>,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<CompiledExpr> {
    let [a, b] = take::<2>(name, &mut args)?;
    Ok(Rc::new(move |row: &Value| match (a(row), b(row)) {
        (Value::Int64(x), Value::Int64(y)) => match int_op(x, y) {
            Some(v) => Value::Int64(v),
            None => Value::Float64(float_op(x as f64, y as f64)),
        },
        (x, y) => match (x.as_number(), y.as_number()) {
            (Some(x), Some(y)) => Value::Float64(float_op(x, y)),
            _ => Value::Null,
        },
    }))
}
