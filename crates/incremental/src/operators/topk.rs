//! Incremental top-k over keyed groups.

use crate::dataflow::{Data, Operator, OperatorId, Stream, UnaryOperator};
use crate::multiset::{Multiplicity, MultiSet};
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cmp::Ordering;
use core::hash::Hash;
use hashbrown::{HashMap, HashSet};

/// Window of a top-k operator: `[offset, offset + limit)` over each group.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TopKOptions {
    /// Maximum window size; `None` keeps everything after `offset`.
    pub limit: Option<usize>,
    pub offset: usize,
}

impl TopKOptions {
    pub fn limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            offset: 0,
        }
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// Shared comparator used to order group members.
pub type Comparator<V> = Rc<dyn Fn(&V, &V) -> Ordering>;

/// Sorted members of one group with their multiplicities.
struct SortedGroup<V> {
    entries: Vec<(V, Multiplicity)>,
}

impl<V: Eq> SortedGroup<V> {
    fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Adds to an existing equal value, or inserts after every member that
    /// compares equal so ties keep insertion order.
    fn add(&mut self, cmp: &Comparator<V>, value: V, m: Multiplicity) {
        let end = self
            .entries
            .partition_point(|(e, _)| cmp(e, &value) != Ordering::Greater);
        let start = self.entries[..end].partition_point(|(e, _)| cmp(e, &value) == Ordering::Less);
        match (start..end).find(|&i| self.entries[i].0 == value) {
            Some(pos) => {
                self.entries[pos].1 += m;
                if self.entries[pos].1 == 0 {
                    self.entries.remove(pos);
                }
            }
            None if m != 0 => self.entries.insert(end, (value, m)),
            None => {}
        }
    }

    /// Present members inside the window, with their absolute rank.
    fn window(&self, options: &TopKOptions) -> impl Iterator<Item = (usize, &V)> {
        let limit = options.limit.unwrap_or(usize::MAX);
        self.entries
            .iter()
            .filter(|(_, m)| *m > 0)
            .map(|(v, _)| v)
            .enumerate()
            .skip(options.offset)
            .take(limit)
    }
}

impl<K, V> Stream<(K, V)>
where
    K: Data + Eq + Hash,
    V: Data + Eq + Hash,
{
    /// Maintains the `[offset, offset + limit)` window of each key group
    /// under `comparator` and emits only the members entering or leaving it.
    pub fn top_k(
        &self,
        comparator: impl Fn(&V, &V) -> Ordering + 'static,
        options: TopKOptions,
    ) -> Stream<(K, V)> {
        self.top_k_emit(Rc::new(comparator), options, |_, v| v.clone())
    }

    /// Like `top_k`, but every emitted value carries its rank in the group.
    ///
    /// Members whose rank changes are retracted and reasserted with the new
    /// rank.
    pub fn top_k_with_index(
        &self,
        comparator: impl Fn(&V, &V) -> Ordering + 'static,
        options: TopKOptions,
    ) -> Stream<(K, (V, usize))> {
        self.top_k_emit(Rc::new(comparator), options, |rank, v| (v.clone(), rank))
    }

    fn top_k_emit<O>(
        &self,
        comparator: Comparator<V>,
        options: TopKOptions,
        emit: fn(usize, &V) -> O,
    ) -> Stream<(K, O)>
    where
        O: Data + Eq + Hash,
    {
        let (writer, stream) = self.derive();
        let id = self.graph().next_operator_id();
        self.graph().add_operator(TopKOperator {
            base: UnaryOperator::new(id, self.connect_reader(), writer),
            comparator,
            options,
            emit,
            groups: HashMap::new(),
        });
        stream
    }
}

struct TopKOperator<K, V, O> {
    base: UnaryOperator<(K, V), (K, O)>,
    comparator: Comparator<V>,
    options: TopKOptions,
    emit: fn(usize, &V) -> O,
    groups: HashMap<K, SortedGroup<V>>,
}

impl<K, V, O> TopKOperator<K, V, O>
where
    K: Eq + Hash,
    V: Eq,
{
    fn window_of(&self, key: &K) -> Vec<O> {
        match self.groups.get(key) {
            Some(group) => group
                .window(&self.options)
                .map(|(rank, v)| (self.emit)(rank, v))
                .collect(),
            None => Vec::new(),
        }
    }
}

impl<K, V, O> Operator for TopKOperator<K, V, O>
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

        let mut touched: Vec<(K, Vec<O>)> = Vec::new();
        let mut seen: HashSet<K> = HashSet::new();
        for ((key, value), m) in batch {
            if seen.insert(key.clone()) {
                touched.push((key.clone(), self.window_of(&key)));
            }
            let group = self.groups.entry(key).or_insert_with(SortedGroup::new);
            group.add(&self.comparator, value, m);
        }

        let mut output = MultiSet::new();
        for (key, old_window) in touched {
            let new_window = self.window_of(&key);
            if self.groups.get(&key).map_or(false, |g| g.entries.is_empty()) {
                self.groups.remove(&key);
            }
            let diff = old_window
                .into_iter()
                .map(|o| (o, -1))
                .chain(new_window.into_iter().map(|o| (o, 1)))
                .collect::<MultiSet<O>>()
                .consolidate();
            output.extend(diff.into_iter().map(|(o, m)| ((key.clone(), o), m)));
        }

        if !output.is_empty() {
            self.base.output.send_data(output);
        }
    }

    fn has_pending_work(&self) -> bool {
        self.base.has_pending_work()
    }
}
