//! ORDER BY compilation and result ordering.

use crate::ast::{Direction, Nulls, OrderBy};
use crate::compiler::expression::CompiledExpr;
use crate::compiler::{ResultRow, RowScope};
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cmp::Ordering;
use rivulet_core::{Result, Value};

/// Compiles the ORDER BY list into one expression yielding the array of sort
/// values of a row.
pub(crate) fn compile_order_key(order_by: &[OrderBy], scope: &RowScope<'_>) -> Result<CompiledExpr> {
    let keys = order_by
        .iter()
        .map(|o| scope.compile(&o.expr))
        .collect::<Result<Vec<_>>>()?;
    Ok(Rc::new(move |row: &Value| Value::Array(keys.iter().map(|k| k(row)).collect())))
}

/// Compares two sort-key arrays column by column.
pub fn compare_order_keys(a: &Value, b: &Value, spec: &[(Direction, Nulls)]) -> Ordering {
    let (a, b) = match (a.as_array(), b.as_array()) {
        (Some(a), Some(b)) => (a, b),
        _ => return a.cmp(b),
    };
    for ((x, y), (direction, nulls)) in a.iter().zip(b).zip(spec) {
        let ord = match (x.is_null(), y.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) if *nulls == Nulls::First => Ordering::Less,
            (true, false) => Ordering::Greater,
            (false, true) if *nulls == Nulls::First => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => match direction {
                Direction::Asc => x.cmp(y),
                Direction::Desc => y.cmp(x),
            },
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Total order of result rows: ORDER BY first, then result key.
#[derive(Clone, Debug, Default)]
pub struct RowOrdering {
    spec: Vec<(Direction, Nulls)>,
}

impl RowOrdering {
    pub fn new(order_by: &[OrderBy]) -> Self {
        Self {
            spec: order_by.iter().map(|o| (o.direction, o.nulls)).collect(),
        }
    }

    pub fn is_ordered(&self) -> bool {
        !self.spec.is_empty()
    }

    pub fn compare(&self, a_key: &Value, a: &ResultRow, b_key: &Value, b: &ResultRow) -> Ordering {
        compare_order_keys(&a.order_key, &b.order_key, &self.spec).then_with(|| a_key.cmp(b_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn key(values: &[Value]) -> Value {
        Value::Array(values.to_vec())
    }

    #[test]
    fn test_direction() {
        let asc = [(Direction::Asc, Nulls::First)];
        let desc = [(Direction::Desc, Nulls::Last)];
        let (one, two) = (key(&[Value::Int64(1)]), key(&[Value::Int64(2)]));
        assert_eq!(compare_order_keys(&one, &two, &asc), Ordering::Less);
        assert_eq!(compare_order_keys(&one, &two, &desc), Ordering::Greater);
        assert_eq!(compare_order_keys(&one, &one, &desc), Ordering::Equal);
    }

    #[test]
    fn test_nulls_placement_ignores_direction() {
        let null = key(&[Value::Null]);
        let one = key(&[Value::Int64(1)]);
        for direction in [Direction::Asc, Direction::Desc] {
            assert_eq!(compare_order_keys(&null, &one, &[(direction, Nulls::First)]), Ordering::Less);
            assert_eq!(compare_order_keys(&null, &one, &[(direction, Nulls::Last)]), Ordering::Greater);
            assert_eq!(compare_order_keys(&null, &null, &[(direction, Nulls::Last)]), Ordering::Equal);
        }
    }

    #[test]
    fn test_later_columns_break_ties() {
        let spec = [(Direction::Asc, Nulls::First), (Direction::Desc, Nulls::Last)];
        let a = key(&[Value::from("eng"), Value::Int64(5)]);
        let b = key(&[Value::from("eng"), Value::Int64(9)]);
        assert_eq!(compare_order_keys(&a, &b, &spec), Ordering::Greater);
    }

    #[test]
    fn test_row_ordering_ties_by_key() {
        let ordering = RowOrdering::new(&[]);
        assert!(!ordering.is_ordered());
        let row = ResultRow {
            value: Value::Null,
            order_key: key(&[]),
        };
        let mut rows = vec![(Value::Int64(3), row.clone()), (Value::Int64(1), row.clone()), (Value::Int64(2), row)];
        rows.sort_by(|(ka, a), (kb, b)| ordering.compare(ka, a, kb, b));
        let keys: Vec<_> = rows.into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![Value::Int64(1), Value::Int64(2), Value::Int64(3)]);
    }
}
