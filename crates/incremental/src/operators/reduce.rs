//! Keyed reduction.

use crate::dataflow::{Data, Operator, OperatorId, Stream, UnaryOperator};
use crate::multiset::{Multiplicity, MultiSet};
use crate::operators::keyed_index::KeyedIndex;
use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;
use core::hash::Hash;
use hashbrown::{HashMap, HashSet};

/// Reduction over the consolidated values of one key.
pub type ReduceFn<V, O> = Box<dyn Fn(&[(V, Multiplicity)]) -> Vec<(O, Multiplicity)>>;

impl<K, V> Stream<(K, V)>
where
    K: Data + Eq + Hash,
    V: Data + Eq,
{
    /// Recomputes `f` for every key touched by a batch and emits the change
    /// between its previous and current output bag.
    pub fn reduce<O>(
        &self,
        f: impl Fn(&[(V, Multiplicity)]) -> Vec<(O, Multiplicity)> + 'static,
    ) -> Stream<(K, O)>
    where
        O: Data + Eq + Hash,
    {
        let (writer, stream) = self.derive();
        let id = self.graph().next_operator_id();
        self.graph().add_operator(ReduceOperator {
            base: UnaryOperator::new(id, self.connect_reader(), writer),
            f: Box::new(f),
            input: KeyedIndex::new(),
            output: HashMap::new(),
        });
        stream
    }

    /// Net multiplicity of each key.
    pub fn count(&self) -> Stream<(K, i64)> {
        self.reduce(|values| {
            let total: Multiplicity = values.iter().map(|(_, m)| *m).sum();
            if total == 0 {
                Vec::new()
            } else {
                vec![(total, 1)]
            }
        })
    }
}

struct ReduceOperator<K, V, O> {
    base: UnaryOperator<(K, V), (K, O)>,
    f: ReduceFn<V, O>,
    input: KeyedIndex<K, V>,
    /// Last output bag emitted per key.
    output: HashMap<K, Vec<(O, Multiplicity)>>,
}

impl<K, V, O> Operator for ReduceOperator<K, V, O>
where
    K: Clone + Eq + Hash,
    V: Clone + Eq,
    O: Clone + Eq + Hash,
{
    fn id(&self) -> OperatorId {
        self.base.id
    }

    fn run(&mut self) {
        let batch = self.base.input_messages();
        if batch.is_empty() {
            return;
        }

        let mut touched: Vec<K> = Vec::new();
        let mut seen: HashSet<K> = HashSet::new();
        for ((k, v), m) in batch {
            if seen.insert(k.clone()) {
                touched.push(k.clone());
            }
            self.input.add(k, v, m);
        }

        let mut result = MultiSet::new();
        for key in touched {
            let new_out = (self.f)(self.input.get(&key));
            self.input.compact(&key);
            let old_out = self.output.remove(&key).unwrap_or_default();

            let diff = old_out
                .iter()
                .map(|(o, m)| (o.clone(), -m))
                .chain(new_out.iter().cloned())
                .collect::<MultiSet<O>>()
                .consolidate();
            result.extend(diff.into_iter().map(|(o, m)| ((key.clone(), o), m)));

            if !new_out.is_empty() {
                self.output.insert(key, new_out);
            }
        }

        if !result.is_empty() {
            self.base.output.send_data(result);
        }
    }

    fn has_pending_work(&self) -> bool {
        self.base.has_pending_work()
    }
}
