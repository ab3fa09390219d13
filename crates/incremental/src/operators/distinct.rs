//! Incremental distinct.

use crate::dataflow::{Data, Operator, OperatorId, Stream, UnaryOperator};
use crate::multiset::{Multiplicity, MultiSet};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::hash::Hash;
use hashbrown::HashMap;

impl<T: Data + Eq + Hash> Stream<T> {
    /// Emits each distinct item once while its net count is positive.
    pub fn distinct(&self) -> Stream<T> {
        self.distinct_by(T::clone)
    }
}

impl<T: Data + Eq> Stream<T> {
    /// Distinct membership by a derived identity.
    ///
    /// An identity whose running count rises above zero emits `+1` for a
    /// representative item; one whose count drops to zero or below emits `-1`
    /// for the same representative.
    pub fn distinct_by<K>(&self, by: impl Fn(&T) -> K + 'static) -> Stream<T>
    where
        K: Eq + Hash + Clone + 'static,
    {
        let (writer, stream) = self.derive();
        let id = self.graph().next_operator_id();
        self.graph().add_operator(DistinctOperator {
            base: UnaryOperator::new(id, self.connect_reader(), writer),
            by: Box::new(by),
            counts: HashMap::new(),
        });
        stream
    }
}

struct DistinctOperator<T, K> {
    base: UnaryOperator<T, T>,
    by: Box<dyn Fn(&T) -> K>,
    /// identity -> (representative item, running count)
    counts: HashMap<K, (T, Multiplicity)>,
}

impl<T: Clone + Eq, K: Eq + Hash + Clone> Operator for DistinctOperator<T, K> {
    fn id(&self) -> OperatorId {
        self.base.id
    }

    fn run(&mut self) {
        let batch = self.base.input_messages();
        if batch.is_empty() {
            return;
        }

        // identity, count before this run, representative before this run
        let mut touched: Vec<(K, Multiplicity, Option<T>)> = Vec::new();
        let mut seen: HashMap<K, ()> = HashMap::new();

        for (item, m) in batch {
            let key = (self.by)(&item);
            let entry = self
                .counts
                .entry(key.clone())
                .or_insert_with(|| (item.clone(), 0));
            if seen.insert(key.clone(), ()).is_none() {
                let old_rep = (entry.1 > 0).then(|| entry.0.clone());
                touched.push((key, entry.1, old_rep));
            }
            if entry.1 <= 0 && m > 0 {
                entry.0 = item;
            }
            entry.1 += m;
        }

        let mut output = MultiSet::new();
        for (key, old, old_rep) in touched {
            let Some((rep, new)) = self.counts.get(&key) else {
                continue;
            };
            let new = *new;
            match old_rep {
                Some(old_rep) if new <= 0 => output.add(old_rep, -1),
                Some(old_rep) if old_rep != *rep => {
                    output.add(old_rep, -1);
                    output.add(rep.clone(), 1);
                }
                None if old <= 0 && new > 0 => output.add(rep.clone(), 1),
                _ => {}
            }
            if new == 0 {
                self.counts.remove(&key);
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
    use crate::dataflow::{Graph, StreamReader};
    use crate::multiset::MultiSet;
    use alloc::vec;
    use alloc::vec::Vec;

    fn collect<T: Clone>(reader: &StreamReader<T>) -> Vec<(T, i64)> {
        reader.drain().into_iter().flat_map(|b| b.into_inner()).collect()
    }

    #[test]
    fn test_distinct_emits_membership_changes_only() {
        let graph = Graph::new();
        let input = graph.new_input::<&str>();
        let reader = input.distinct().connect_reader();

        input.send_data(MultiSet::singleton("A", 1));
        graph.run();
        assert_eq!(collect(&reader), vec![("A", 1)]);

        input.send_data(MultiSet::singleton("A", 1));
        graph.run();
        assert!(collect(&reader).is_empty());

        input.send_data(MultiSet::singleton("A", -1));
        graph.run();
        assert!(collect(&reader).is_empty());

        input.send_data(MultiSet::singleton("A", -1));
        graph.run();
        assert_eq!(collect(&reader), vec![("A", -1)]);
    }

    #[test]
    fn test_distinct_cancelling_batch_is_silent() {
        let graph = Graph::new();
        let input = graph.new_input::<i32>();
        let reader = input.distinct().connect_reader();

        input.send_data(MultiSet::from_vec(vec![(1, 1), (1, -1)]));
        graph.run();
        assert!(collect(&reader).is_empty());
    }

    #[test]
    fn test_distinct_multiplicity_above_one() {
        let graph = Graph::new();
        let input = graph.new_input::<i32>();
        let reader = input.distinct().connect_reader();

        input.send_data(MultiSet::from_vec(vec![(7, 3), (8, 1)]));
        graph.run();
        assert_eq!(collect(&reader), vec![(7, 1), (8, 1)]);

        input.send_data(MultiSet::from_vec(vec![(7, -3)]));
        graph.run();
        assert_eq!(collect(&reader), vec![(7, -1)]);
    }

    #[test]
    fn test_distinct_by_identity() {
        let graph = Graph::new();
        let input = graph.new_input::<(i32, &str)>();
        let reader = input.distinct_by(|(id, _)| *id).connect_reader();

        input.send_data(MultiSet::from_vec(vec![((1, "a"), 1), ((1, "b"), 1)]));
        graph.run();
        assert_eq!(collect(&reader), vec![((1, "a"), 1)]);

        input.send_data(MultiSet::singleton((1, "a"), -1));
        graph.run();
        assert!(collect(&reader).is_empty());

        // retraction uses the item that was emitted
        input.send_data(MultiSet::singleton((1, "b"), -1));
        graph.run();
        assert_eq!(collect(&reader), vec![((1, "a"), -1)]);
    }
}
