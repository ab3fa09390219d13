//! Incremental keyed join.

use crate::dataflow::{BinaryOperator, Data, Operator, OperatorId, Stream};
use crate::multiset::{Multiplicity, MultiSet};
use crate::operators::keyed_index::KeyedIndex;
use alloc::vec::Vec;
use core::hash::Hash;
use hashbrown::HashSet;

/// Join kinds supported by `Stream::join`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum JoinType {
    Inner,
    /// Unmatched left rows are kept with `None` on the right.
    Left,
    /// Unmatched right rows are kept with `None` on the left.
    Right,
    Full,
    /// Only left rows without any right match.
    Anti,
}

impl JoinType {
    fn keeps_left_unmatched(self) -> bool {
        matches!(self, JoinType::Left | JoinType::Full | JoinType::Anti)
    }

    fn keeps_right_unmatched(self) -> bool {
        matches!(self, JoinType::Right | JoinType::Full)
    }
}

/// A joined pair; a side is `None` when an outer join found no match.
pub type Joined<L, R> = (Option<L>, Option<R>);

type JoinOutput<K, L, R> = MultiSet<(K, Joined<L, R>)>;

impl<K, L> Stream<(K, L)>
where
    K: Data + Eq + Hash,
    L: Data + Eq + Hash,
{
    /// Joins two keyed streams on their key.
    pub fn join<R>(&self, other: &Stream<(K, R)>, kind: JoinType) -> Stream<(K, Joined<L, R>)>
    where
        R: Data + Eq + Hash,
    {
        let (writer, stream) = self.derive();
        let id = self.graph().next_operator_id();
        self.graph().add_operator(JoinOperator {
            base: BinaryOperator::new(id, self.connect_reader(), other.connect_reader(), writer),
            kind,
            left: KeyedIndex::new(),
            right: KeyedIndex::new(),
        });
        stream
    }

    /// Keeps the rows whose key is present in `other`.
    pub fn filter_by<R: Data>(&self, other: &Stream<(K, R)>) -> Stream<(K, L)> {
        let keys = other.map(|(k, _)| (k, ())).distinct();
        self.join(&keys, JoinType::Inner)
            .filter_map(|(k, (l, _))| l.map(|l| (k, l)))
    }
}

struct JoinOperator<K, L, R> {
    base: BinaryOperator<(K, L), (K, R), (K, Joined<L, R>)>,
    kind: JoinType,
    left: KeyedIndex<K, L>,
    right: KeyedIndex<K, R>,
}

impl<K, L, R> JoinOperator<K, L, R>
where
    K: Clone + Eq + Hash,
    L: Clone + Eq,
    R: Clone + Eq,
{
    /// Rows of `key` that currently have no partner on the other side.
    fn unmatched(&self, key: &K, sign: Multiplicity, out: &mut JoinOutput<K, L, R>) {
        if self.kind.keeps_left_unmatched() && !self.right.is_present(key) {
            for (l, m) in self.left.get(key) {
                out.add((key.clone(), (Some(l.clone()), None)), sign * m);
            }
        }
        if self.kind.keeps_right_unmatched() && !self.left.is_present(key) {
            for (r, m) in self.right.get(key) {
                out.add((key.clone(), (None, Some(r.clone()))), sign * m);
            }
        }
    }
}

impl<K, L, R> Operator for JoinOperator<K, L, R>
where
    K: Clone + Eq + Hash,
    L: Clone + Eq + Hash,
    R: Clone + Eq + Hash,
{
    fn id(&self) -> OperatorId {
        self.base.id
    }

    fn run(&mut self) {
        let delta_left = self.base.input_a_messages();
        let delta_right = self.base.input_b_messages();
        if delta_left.is_empty() && delta_right.is_empty() {
            return;
        }

        let mut touched: Vec<K> = Vec::new();
        let mut seen: HashSet<&K> = HashSet::new();
        for k in delta_left
            .iter()
            .map(|((k, _), _)| k)
            .chain(delta_right.iter().map(|((k, _), _)| k))
        {
            if seen.insert(k) {
                touched.push(k.clone());
            }
        }
        drop(seen);

        let mut output = MultiSet::new();
        for key in &touched {
            self.unmatched(key, -1, &mut output);
        }

        // ΔL ⋈ R_old, then L_new ⋈ ΔR
        let inner = self.kind != JoinType::Anti;
        for ((k, l), m) in delta_left {
            if inner {
                for (r, n) in self.right.get(&k) {
                    output.add((k.clone(), (Some(l.clone()), Some(r.clone()))), m * n);
                }
            }
            self.left.add(k, l, m);
        }
        for ((k, r), n) in delta_right {
            if inner {
                for (l, m) in self.left.get(&k) {
                    output.add((k.clone(), (Some(l.clone()), Some(r.clone()))), m * n);
                }
            }
            self.right.add(k, r, n);
        }

        for key in &touched {
            self.unmatched(key, 1, &mut output);
            self.left.compact(key);
            self.right.compact(key);
        }

        let output = output.consolidate();
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

    fn collect<T: Clone + Ord>(reader: &StreamReader<T>) -> Vec<(T, i64)> {
        let mut all: Vec<_> = reader.drain().into_iter().flat_map(|b| b.into_inner()).collect();
        all.sort();
        all
    }

    #[test]
    fn test_inner_join_both_orders() {
        let graph = Graph::new();
        let employees = graph.new_input::<(i32, &str)>();
        let depts = graph.new_input::<(i32, &str)>();
        let reader = employees.join(&depts, JoinType::Inner).connect_reader();

        employees.send_data(MultiSet::singleton((10, "alice"), 1));
        graph.run();
        assert!(collect(&reader).is_empty());

        depts.send_data(MultiSet::singleton((10, "eng"), 1));
        employees.send_data(MultiSet::singleton((10, "bob"), 1));
        graph.run();
        assert_eq!(
            collect(&reader),
            vec![
                ((10, (Some("alice"), Some("eng"))), 1),
                ((10, (Some("bob"), Some("eng"))), 1),
            ]
        );

        depts.send_data(MultiSet::singleton((10, "eng"), -1));
        graph.run();
        assert_eq!(
            collect(&reader),
            vec![
                ((10, (Some("alice"), Some("eng"))), -1),
                ((10, (Some("bob"), Some("eng"))), -1),
            ]
        );
    }

    #[test]
    fn test_join_multiplies_multiplicities() {
        let graph = Graph::new();
        let a = graph.new_input::<(i32, i32)>();
        let b = graph.new_input::<(i32, i32)>();
        let reader = a.join(&b, JoinType::Inner).connect_reader();

        a.send_data(MultiSet::singleton((1, 100), 2));
        b.send_data(MultiSet::singleton((1, 200), 3));
        graph.run();
        assert_eq!(collect(&reader), vec![((1, (Some(100), Some(200))), 6)]);
    }

    #[test]
    fn test_left_join_unmatched_transitions() {
        let graph = Graph::new();
        let users = graph.new_input::<(i32, &str)>();
        let orders = graph.new_input::<(i32, &str)>();
        let reader = users.join(&orders, JoinType::Left).connect_reader();

        users.send_data(MultiSet::singleton((1, "ann"), 1));
        graph.run();
        assert_eq!(collect(&reader), vec![((1, (Some("ann"), None)), 1)]);

        orders.send_data(MultiSet::singleton((1, "o1"), 1));
        graph.run();
        assert_eq!(
            collect(&reader),
            vec![
                ((1, (Some("ann"), None)), -1),
                ((1, (Some("ann"), Some("o1"))), 1),
            ]
        );

        orders.send_data(MultiSet::singleton((1, "o1"), -1));
        graph.run();
        assert_eq!(
            collect(&reader),
            vec![
                ((1, (Some("ann"), None)), 1),
                ((1, (Some("ann"), Some("o1"))), -1),
            ]
        );
    }

    #[test]
    fn test_right_and_full_join() {
        let graph = Graph::new();
        let a = graph.new_input::<(i32, char)>();
        let b = graph.new_input::<(i32, char)>();
        let right = a.join(&b, JoinType::Right).connect_reader();
        let full = a.join(&b, JoinType::Full).connect_reader();

        a.send_data(MultiSet::singleton((1, 'a'), 1));
        b.send_data(MultiSet::singleton((2, 'b'), 1));
        graph.run();
        assert_eq!(collect(&right), vec![((2, (None, Some('b'))), 1)]);
        assert_eq!(
            collect(&full),
            vec![((1, (Some('a'), None)), 1), ((2, (None, Some('b'))), 1)]
        );
    }

    #[test]
    fn test_anti_join() {
        let graph = Graph::new();
        let a = graph.new_input::<(i32, char)>();
        let b = graph.new_input::<(i32, char)>();
        let reader = a.join(&b, JoinType::Anti).connect_reader();

        a.send_data(MultiSet::from_vec(vec![((1, 'x'), 1), ((2, 'y'), 1)]));
        b.send_data(MultiSet::singleton((2, 'z'), 1));
        graph.run();
        assert_eq!(collect(&reader), vec![((1, (Some('x'), None)), 1)]);
    }

    #[test]
    fn test_filter_by_uses_key_presence() {
        let graph = Graph::new();
        let rows = graph.new_input::<(i32, &str)>();
        let allowed = graph.new_input::<(i32, ())>();
        let reader = rows.filter_by(&allowed).connect_reader();

        rows.send_data(MultiSet::from_vec(vec![((1, "a"), 1), ((2, "b"), 1)]));
        allowed.send_data(MultiSet::from_vec(vec![((1, ()), 1), ((1, ()), 1)]));
        graph.run();
        assert_eq!(collect(&reader), vec![((1, "a"), 1)]);
    }
}
