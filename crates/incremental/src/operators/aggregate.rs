//! Incremental GROUP BY aggregation.
//!
//! Each group keeps one `AggregateState` per aggregate function:
//! - COUNT/SUM/AVG: running totals, O(1) per delta
//! - MIN/MAX: ordered multiset of values, O(log n) per delta, so deletes never
//!   force a recomputation of the group

use crate::dataflow::{Data, Operator, OperatorId, Stream, UnaryOperator};
use crate::multiset::{Multiplicity, MultiSet};
use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::vec::Vec;
use hashbrown::{HashMap, HashSet};
use rivulet_core::Value;

/// Aggregate functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AggregateKind {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateKind {
    /// Resolves an aggregate by its query-language name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "count" => Some(AggregateKind::Count),
            "sum" => Some(AggregateKind::Sum),
            "avg" => Some(AggregateKind::Avg),
            "min" => Some(AggregateKind::Min),
            "max" => Some(AggregateKind::Max),
            _ => None,
        }
    }
}

/// One aggregate column: the function and the value it aggregates.
pub struct AggregateSpec<T> {
    pub kind: AggregateKind,
    pub value: Rc<dyn Fn(&T) -> Value>,
}

impl<T> Clone for AggregateSpec<T> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            value: Rc::clone(&self.value),
        }
    }
}

impl<T> AggregateSpec<T> {
    pub fn new(kind: AggregateKind, value: impl Fn(&T) -> Value + 'static) -> Self {
        Self {
            kind,
            value: Rc::new(value),
        }
    }
}

/// Per-function aggregate state. Null inputs are ignored by every function.
#[derive(Clone, Debug)]
pub enum AggregateState {
    Count { count: i64 },
    Sum { int_sum: i64, float_sum: f64, floats: i64 },
    Avg { sum: f64, count: i64 },
    /// Value -> multiplicity, ordered so the minimum is the first key
    Min { values: BTreeMap<Value, i64> },
    /// Value -> multiplicity, ordered so the maximum is the last key
    Max { values: BTreeMap<Value, i64> },
}

impl AggregateState {
    pub fn new(kind: AggregateKind) -> Self {
        match kind {
            AggregateKind::Count => AggregateState::Count { count: 0 },
            AggregateKind::Sum => AggregateState::Sum {
                int_sum: 0,
                float_sum: 0.0,
                floats: 0,
            },
            AggregateKind::Avg => AggregateState::Avg { sum: 0.0, count: 0 },
            AggregateKind::Min => AggregateState::Min {
                values: BTreeMap::new(),
            },
            AggregateKind::Max => AggregateState::Max {
                values: BTreeMap::new(),
            },
        }
    }

    /// Apply a single delta to this aggregate state.
    pub fn apply(&mut self, value: &Value, diff: Multiplicity) {
        if value.is_null() {
            return;
        }
        match self {
            AggregateState::Count { count } => *count += diff,
            AggregateState::Sum {
                int_sum,
                float_sum,
                floats,
            } => match value {
                Value::Int64(i) => *int_sum = int_sum.wrapping_add(i.wrapping_mul(diff)),
                Value::Float64(f) => {
                    *float_sum += *f * diff as f64;
                    *floats += diff;
                }
                _ => {}
            },
            AggregateState::Avg { sum, count } => {
                if let Some(n) = value.as_number() {
                    *sum += n * diff as f64;
                    *count += diff;
                }
            }
            AggregateState::Min { values } | AggregateState::Max { values } => {
                let entry = values.entry(value.clone()).or_insert(0);
                *entry += diff;
                if *entry == 0 {
                    values.remove(value);
                }
            }
        }
    }

    /// Get the current aggregate value.
    pub fn get_value(&self) -> Value {
        match self {
            AggregateState::Count { count } => Value::Int64(*count),
            AggregateState::Sum {
                int_sum,
                float_sum,
                floats,
            } => {
                if *floats == 0 {
                    Value::Int64(*int_sum)
                } else {
                    Value::Float64(*int_sum as f64 + *float_sum)
                }
            }
            AggregateState::Avg { sum, count } => {
                if *count == 0 {
                    Value::Null
                } else {
                    Value::Float64(*sum / *count as f64)
                }
            }
            AggregateState::Min { values } => values
                .iter()
                .find(|(_, m)| **m > 0)
                .map(|(v, _)| v.clone())
                .unwrap_or(Value::Null),
            AggregateState::Max { values } => values
                .iter()
                .rev()
                .find(|(_, m)| **m > 0)
                .map(|(v, _)| v.clone())
                .unwrap_or(Value::Null),
        }
    }
}

/// State of one group: row count plus one state per aggregate.
struct GroupState {
    rows: Multiplicity,
    states: Vec<AggregateState>,
}

impl GroupState {
    fn values(&self) -> Vec<Value> {
        self.states.iter().map(AggregateState::get_value).collect()
    }
}

impl<T: Data> Stream<T> {
    /// Groups items by `key` and maintains the aggregates of each group.
    ///
    /// Emits `(group_key, aggregate_values)`. A changed group retracts its
    /// previous row and asserts the new one; an emptied group only retracts.
    pub fn group_by(
        &self,
        key: impl Fn(&T) -> Value + 'static,
        aggregates: Vec<AggregateSpec<T>>,
    ) -> Stream<(Value, Vec<Value>)> {
        let (writer, stream) = self.derive();
        let id = self.graph().next_operator_id();
        self.graph().add_operator(GroupByOperator {
            base: UnaryOperator::new(id, self.connect_reader(), writer),
            key: Rc::new(key),
            aggregates,
            groups: HashMap::new(),
        });
        stream
    }
}

struct GroupByOperator<T> {
    base: UnaryOperator<T, (Value, Vec<Value>)>,
    key: Rc<dyn Fn(&T) -> Value>,
    aggregates: Vec<AggregateSpec<T>>,
    groups: HashMap<Value, GroupState>,
}

impl<T: Clone> Operator for GroupByOperator<T> {
    fn id(&self) -> OperatorId {
        self.base.id
    }

    fn run(&mut self) {
        let batch = self.base.input_messages();
        if batch.is_empty() {
            return;
        }

        // group key -> output row before this run
        let mut touched: Vec<(Value, Option<Vec<Value>>)> = Vec::new();
        let mut seen: HashSet<Value> = HashSet::new();
        for (item, m) in batch {
            let group_key = (self.key)(&item);
            if seen.insert(group_key.clone()) {
                let old = self.groups.get(&group_key).map(GroupState::values);
                touched.push((group_key.clone(), old));
            }
            let aggregates = &self.aggregates;
            let group = self.groups.entry(group_key).or_insert_with(|| GroupState {
                rows: 0,
                states: aggregates.iter().map(|a| AggregateState::new(a.kind)).collect(),
            });
            group.rows += m;
            for (state, spec) in group.states.iter_mut().zip(aggregates) {
                state.apply(&(spec.value)(&item), m);
            }
        }

        let mut output = MultiSet::new();
        for (group_key, old) in touched {
            let new = match self.groups.get(&group_key) {
                Some(group) if group.rows > 0 => Some(group.values()),
                _ => None,
            };
            if self.groups.get(&group_key).map_or(false, |g| g.rows == 0) {
                self.groups.remove(&group_key);
            }
            if old == new {
                continue;
            }
            if let Some(old) = old {
                output.add((group_key.clone(), old), -1);
            }
            if let Some(new) = new {
                output.add((group_key, new), 1);
            }
        }

        if !output.is_empty() {
            self.base.output.send_data(output);
        }
    }

    fn has_pending_work(&self) -> bool {
        self.base.has_pending_work()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataflow::{Graph, StreamReader};
    use alloc::vec;

    fn collect<T: Clone>(reader: &StreamReader<T>) -> Vec<(T, i64)> {
        reader.drain().into_iter().flat_map(|b| b.into_inner()).collect()
    }

    fn sale(dept: &str, amount: i64) -> Value {
        Value::object([("dept", Value::from(dept)), ("amount", Value::from(amount))])
    }

    fn amount_of(row: &Value) -> Value {
        row.get("amount").clone()
    }

    #[test]
    fn test_aggregate_state_min_max_survive_deletes() {
        let mut min = AggregateState::new(AggregateKind::Min);
        let mut max = AggregateState::new(AggregateKind::Max);
        for v in [5i64, 3, 8] {
            min.apply(&Value::Int64(v), 1);
            max.apply(&Value::Int64(v), 1);
        }
        assert_eq!(min.get_value(), Value::Int64(3));
        assert_eq!(max.get_value(), Value::Int64(8));

        min.apply(&Value::Int64(3), -1);
        max.apply(&Value::Int64(8), -1);
        assert_eq!(min.get_value(), Value::Int64(5));
        assert_eq!(max.get_value(), Value::Int64(5));
    }

    #[test]
    fn test_aggregate_state_ignores_null() {
        let mut count = AggregateState::new(AggregateKind::Count);
        let mut avg = AggregateState::new(AggregateKind::Avg);
        count.apply(&Value::Null, 1);
        avg.apply(&Value::Null, 1);
        assert_eq!(count.get_value(), Value::Int64(0));
        assert!(avg.get_value().is_null());

        avg.apply(&Value::Int64(2), 1);
        avg.apply(&Value::Float64(4.0), 1);
        assert_eq!(avg.get_value(), Value::Float64(3.0));
    }

    #[test]
    fn test_sum_stays_integral_for_integers() {
        let mut sum = AggregateState::new(AggregateKind::Sum);
        sum.apply(&Value::Int64(2), 3);
        assert_eq!(sum.get_value(), Value::Int64(6));
        sum.apply(&Value::Float64(0.5), 1);
        assert_eq!(sum.get_value(), Value::Float64(6.5));
    }

    #[test]
    fn test_group_by_emits_delete_then_insert() {
        let graph = Graph::new();
        let input = graph.new_input::<Value>();
        let reader = input
            .group_by(
                |row| row.get("dept").clone(),
                vec![
                    AggregateSpec::new(AggregateKind::Count, amount_of),
                    AggregateSpec::new(AggregateKind::Sum, amount_of),
                ],
            )
            .connect_reader();

        input.send_data(MultiSet::from_vec(vec![(sale("eng", 10), 1), (sale("eng", 20), 1)]));
        graph.run();
        assert_eq!(
            collect(&reader),
            vec![((Value::from("eng"), vec![Value::Int64(2), Value::Int64(30)]), 1)]
        );

        input.send_data(MultiSet::singleton(sale("eng", 10), -1));
        graph.run();
        assert_eq!(
            collect(&reader),
            vec![
                ((Value::from("eng"), vec![Value::Int64(2), Value::Int64(30)]), -1),
                ((Value::from("eng"), vec![Value::Int64(1), Value::Int64(20)]), 1),
            ]
        );

        input.send_data(MultiSet::singleton(sale("eng", 20), -1));
        graph.run();
        assert_eq!(
            collect(&reader),
            vec![((Value::from("eng"), vec![Value::Int64(1), Value::Int64(20)]), -1)]
        );
    }

    #[test]
    fn test_group_by_cancelling_batch_is_silent() {
        let graph = Graph::new();
        let input = graph.new_input::<Value>();
        let reader = input
            .group_by(
                |row| row.get("dept").clone(),
                vec![AggregateSpec::new(AggregateKind::Max, amount_of)],
            )
            .connect_reader();

        input.send_data(MultiSet::from_vec(vec![(sale("ops", 1), 1), (sale("ops", 1), -1)]));
        graph.run();
        assert!(collect(&reader).is_empty());
    }

    #[test]
    fn test_group_by_many_groups_in_one_batch() {
        let graph = Graph::new();
        let input = graph.new_input::<Value>();
        let reader = input
            .group_by(
                |row| row.get("dept").clone(),
                vec![AggregateSpec::new(AggregateKind::Sum, amount_of)],
            )
            .connect_reader();

        let groups = 20_000i64;
        let rows: Vec<(Value, Multiplicity)> = (0..groups * 2)
            .map(|i| {
                let dept = alloc::format!("d{}", i % groups);
                (sale(&dept, 1), 1)
            })
            .collect();
        input.send_data(MultiSet::from_vec(rows));
        graph.run();

        let out = collect(&reader);
        assert_eq!(out.len(), groups as usize);
        assert!(out.iter().all(|((_, values), m)| *m == 1 && values == &vec![Value::Int64(2)]));

        // first-seen order is kept
        assert_eq!((out[0].0).0, Value::from("d0"));
        assert_eq!((out[1].0).0, Value::from("d1"));
    }

    #[test]
    fn test_aggregate_kind_names() {
        assert_eq!(AggregateKind::from_name("avg"), Some(AggregateKind::Avg));
        assert_eq!(AggregateKind::from_name("median"), None);
    }
}
