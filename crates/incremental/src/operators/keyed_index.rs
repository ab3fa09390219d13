//! Per-key consolidated state shared by the stateful keyed operators.

use crate::multiset::Multiplicity;
use alloc::vec::Vec;
use core::hash::Hash;
use hashbrown::HashMap;

/// Maps each key to the consolidated values stored under it.
pub(crate) struct KeyedIndex<K, V> {
    entries: HashMap<K, Vec<(V, Multiplicity)>>,
}

impl<K: Eq + Hash, V: Eq> KeyedIndex<K, V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Adds `m` to the multiplicity of `value` under `key`.
    pub fn add(&mut self, key: K, value: V, m: Multiplicity) {
        if m == 0 {
            return;
        }
        let values = self.entries.entry(key).or_default();
        match values.iter().position(|(v, _)| *v == value) {
            Some(pos) => {
                values[pos].1 += m;
                if values[pos].1 == 0 {
                    values.swap_remove(pos);
                }
            }
            None => values.push((value, m)),
        }
        // empty buckets are dropped lazily by `compact`
    }

    pub fn get(&self, key: &K) -> &[(V, Multiplicity)] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// True if any value under `key` has positive multiplicity.
    pub fn is_present(&self, key: &K) -> bool {
        self.get(key).iter().any(|(_, m)| *m > 0)
    }

    /// Drops the bucket of `key` if it holds no values.
    pub fn compact(&mut self, key: &K) {
        if self.entries.get(key).map_or(false, Vec::is_empty) {
            self.entries.remove(key);
        }
    }

    #[cfg(test)]
    fn key_count(&self) -> usize {
        self.entries.len()
    }
}
