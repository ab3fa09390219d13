//! Stateless operators: map, filter, negate, concat, consolidate and keying.

use crate::dataflow::{BinaryOperator, Data, LinearUnaryOperator, Operator, OperatorId, Stream, UnaryOperator};
use crate::multiset::MultiSet;
use core::hash::Hash;

impl<T: Data> Stream<T> {
    /// Emits `(f(item), multiplicity)` for every input pair.
    pub fn map<U: Data>(&self, f: impl Fn(T) -> U + 'static) -> Stream<U> {
        self.linear(move |batch| batch.map(&f))
    }

    /// Emits only the pairs whose item satisfies `pred`.
    pub fn filter(&self, pred: impl Fn(&T) -> bool + 'static) -> Stream<T> {
        self.linear(move |batch| batch.filter(&pred))
    }

    /// Maps and filters in one pass; `None` drops the pair.
    pub fn filter_map<U: Data>(&self, f: impl Fn(T) -> Option<U> + 'static) -> Stream<U> {
        self.linear(move |batch| {
            batch
                .into_iter()
                .filter_map(|(item, m)| f(item).map(|u| (u, m)))
                .collect()
        })
    }

    /// Emits every pair with its multiplicity negated.
    pub fn negate(&self) -> Stream<T> {
        self.linear(MultiSet::negate)
    }

    /// Merges two streams into one (bag union).
    pub fn concat(&self, other: &Stream<T>) -> Stream<T> {
        let (writer, stream) = self.derive();
        let id = self.graph().next_operator_id();
        self.graph().add_operator(ConcatOperator {
            base: BinaryOperator::new(id, self.connect_reader(), other.connect_reader(), writer),
        });
        stream
    }

    fn linear<U: Data>(&self, inner: impl FnMut(MultiSet<T>) -> MultiSet<U> + 'static) -> Stream<U> {
        let (writer, stream) = self.derive();
        let id = self.graph().next_operator_id();
        self.graph()
            .add_operator(LinearUnaryOperator::new(id, self.connect_reader(), writer, inner));
        stream
    }
}

impl<T: Data + Eq + Hash> Stream<T> {
    /// Collapses all pending batches into one net delta per run.
    pub fn consolidate(&self) -> Stream<T> {
        let (writer, stream) = self.derive();
        let id = self.graph().next_operator_id();
        self.graph().add_operator(ConsolidateOperator {
            base: UnaryOperator::new(id, self.connect_reader(), writer),
        });
        stream
    }
}

impl<T: Data> Stream<T> {
    /// Tags every item with a key.
    pub fn key_by<K: Data>(&self, key: impl Fn(&T) -> K + 'static) -> Stream<(K, T)> {
        self.map(move |item| (key(&item), item))
    }
}

impl<K: Data, V: Data> Stream<(K, V)> {
    /// Drops the key component.
    pub fn unkey(&self) -> Stream<V> {
        self.map(|(_, v)| v)
    }

    /// Replaces the key component with one derived from the value.
    pub fn rekey<K2: Data>(&self, key: impl Fn(&V) -> K2 + 'static) -> Stream<(K2, V)> {
        self.map(move |(_, v)| (key(&v), v))
    }
}

struct ConcatOperator<T> {
    base: BinaryOperator<T, T, T>,
}

impl<T: Clone> Operator for ConcatOperator<T> {
    fn id(&self) -> OperatorId {
        self.base.id
    }

    fn run(&mut self) {
        for batch in self.base.input_a.drain().into_iter().chain(self.base.input_b.drain()) {
            if !batch.is_empty() {
                self.base.output.send_data(batch);
            }
        }
    }

    fn has_pending_work(&self) -> bool {
        self.base.has_pending_work()
    }
}

struct ConsolidateOperator<T> {
    base: UnaryOperator<T, T>,
}

impl<T: Clone + Eq + Hash> Operator for ConsolidateOperator<T> {
    fn id(&self) -> OperatorId {
        self.base.id
    }

    fn run(&mut self) {
        let consolidated = self.base.input_messages().consolidate();
        if !consolidated.is_empty() {
            self.base.output.send_data(consolidated);
        }
    }

    fn has_pending_work(&self) -> bool {
        self.base.has_pending_work()
    }
}

#[cfg(test)]
mod tests {
    use crate::dataflow::Graph;
    use crate::multiset::MultiSet;
    use alloc::vec;
    use alloc::vec::Vec;

    fn collect<T: Clone>(reader: &crate::dataflow::StreamReader<T>) -> Vec<(T, i64)> {
        reader.drain().into_iter().flat_map(|b| b.into_inner()).collect()
    }

    #[test]
    fn test_map_filter_negate_pipeline() {
        let graph = Graph::new();
        let input = graph.new_input::<i64>();
        let out = input.map(|x| x * 3).filter(|x| x % 2 == 0).negate();
        let reader = out.connect_reader();

        input.send_data(MultiSet::from_vec(vec![(1, 1), (2, 2), (4, -1)]));
        graph.run();
        assert_eq!(collect(&reader), vec![(6, -2), (12, 1)]);
    }

    #[test]
    fn test_concat_merges_both_inputs() {
        let graph = Graph::new();
        let a = graph.new_input::<&str>();
        let b = graph.new_input::<&str>();
        let reader = a.concat(&b).connect_reader();

        a.send_data(MultiSet::from_vec(vec![("a", 1)]));
        b.send_data(MultiSet::from_vec(vec![("b", 1)]));
        graph.run();
        assert_eq!(collect(&reader), vec![("a", 1), ("b", 1)]);
    }

    #[test]
    fn test_consolidate_collapses_batches() {
        let graph = Graph::new();
        let input = graph.new_input::<i32>();
        let reader = input.consolidate().connect_reader();

        input.send_data(MultiSet::from_vec(vec![(1, 1), (2, 1)]));
        input.send_data(MultiSet::from_vec(vec![(1, -1), (2, 1)]));
        graph.run();

        let batches = reader.drain();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].inner(), &[(2, 2)]);
    }

    #[test]
    fn test_consolidate_cancelling_batch_emits_nothing() {
        let graph = Graph::new();
        let input = graph.new_input::<i32>();
        let reader = input.consolidate().connect_reader();

        input.send_data(MultiSet::from_vec(vec![(1, 1), (1, -1)]));
        input.send_data(MultiSet::new());
        graph.run();
        assert!(reader.drain().is_empty());
    }

    #[test]
    fn test_keying_operators() {
        let graph = Graph::new();
        let input = graph.new_input::<(i32, &str)>();
        let keyed = input.unkey().key_by(|s| s.len());
        let rekeyed = keyed.rekey(|s| s.starts_with('a'));
        let keyed_reader = keyed.connect_reader();
        let rekeyed_reader = rekeyed.connect_reader();

        input.send_data(MultiSet::from_vec(vec![((0, "abc"), 1), ((1, "xy"), -1)]));
        graph.run();
        assert_eq!(collect(&keyed_reader), vec![((3, "abc"), 1), ((2, "xy"), -1)]);
        assert_eq!(collect(&rekeyed_reader), vec![((true, "abc"), 1), ((false, "xy"), -1)]);
    }
}
