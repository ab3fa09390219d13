//! Multiset type for Incremental View Maintenance.
//!
//! A `MultiSet` is a bag of `(item, multiplicity)` pairs. Positive
//! multiplicities are insertions, negative ones are retractions, so the same
//! type describes both a delta and a full snapshot.

use alloc::vec;
use alloc::vec::Vec;
use core::hash::Hash;
use hashbrown::HashMap;

/// Signed multiplicity of an item in a multiset.
pub type Multiplicity = i64;

/// A value tagged with a grouping key.
pub type Keyed<K, V> = (K, V);

/// A bag of items with signed multiplicities.
///
/// Entries keep the order in which they were added; `consolidate` preserves
/// the order in which each distinct item was first seen.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct MultiSet<T> {
    inner: Vec<(T, Multiplicity)>,
}

impl<T> Default for MultiSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MultiSet<T> {
    /// Creates an empty multiset.
    pub fn new() -> Self {
        Self { inner: Vec::new() }
    }

    /// Creates a multiset from raw `(item, multiplicity)` pairs.
    pub fn from_vec(inner: Vec<(T, Multiplicity)>) -> Self {
        Self { inner }
    }

    /// Creates a multiset holding a single item.
    pub fn singleton(item: T, multiplicity: Multiplicity) -> Self {
        Self {
            inner: vec![(item, multiplicity)],
        }
    }

    /// Returns the raw entries.
    #[inline]
    pub fn inner(&self) -> &[(T, Multiplicity)] {
        &self.inner
    }

    /// Consumes the multiset, returning the raw entries.
    #[inline]
    pub fn into_inner(self) -> Vec<(T, Multiplicity)> {
        self.inner
    }

    /// Returns the number of entries (not the net count).
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if the multiset holds no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns an iterator over the entries.
    pub fn iter(&self) -> impl Iterator<Item = &(T, Multiplicity)> {
        self.inner.iter()
    }

    /// Returns the sum of all multiplicities.
    pub fn net_count(&self) -> Multiplicity {
        self.inner.iter().map(|(_, m)| *m).sum()
    }

    /// Transforms every item, keeping multiplicities.
    pub fn map<U, F>(self, mut f: F) -> MultiSet<U>
    where
        F: FnMut(T) -> U,
    {
        MultiSet {
            inner: self.inner.into_iter().map(|(item, m)| (f(item), m)).collect(),
        }
    }

    /// Keeps only the entries whose item satisfies the predicate.
    pub fn filter<F>(self, mut pred: F) -> Self
    where
        F: FnMut(&T) -> bool,
    {
        Self {
            inner: self.inner.into_iter().filter(|(item, _)| pred(item)).collect(),
        }
    }

    /// Flips the sign of every multiplicity.
    pub fn negate(self) -> Self {
        Self {
            inner: self.inner.into_iter().map(|(item, m)| (item, -m)).collect(),
        }
    }

    /// Bag union of two multisets.
    pub fn concat(mut self, other: MultiSet<T>) -> Self {
        self.inner.extend(other.inner);
        self
    }

    /// Appends a single entry.
    pub fn add(&mut self, item: T, multiplicity: Multiplicity) {
        self.inner.push((item, multiplicity));
    }
}

impl<T: Eq + Hash> MultiSet<T> {
    /// Sums multiplicities of equal items and drops zero-sum entries.
    ///
    /// Runs in linear time by hashing items. Consolidating an already
    /// consolidated multiset returns it unchanged.
    pub fn consolidate(self) -> Self {
        let n = self.inner.len();
        let mut sums: Vec<Multiplicity> = vec![0; n];
        {
            let mut first_seen: HashMap<&T, usize> = HashMap::with_capacity(n);
            for (i, (item, m)) in self.inner.iter().enumerate() {
                let slot = *first_seen.entry(item).or_insert(i);
                sums[slot] += *m;
            }
        }
        Self {
            inner: self
                .inner
                .into_iter()
                .zip(sums)
                .filter_map(|((item, _), sum)| (sum != 0).then_some((item, sum)))
                .collect(),
        }
    }
}

impl<T> Extend<(T, Multiplicity)> for MultiSet<T> {
    fn extend<I: IntoIterator<Item = (T, Multiplicity)>>(&mut self, iter: I) {
        self.inner.extend(iter);
    }
}

impl<T> FromIterator<(T, Multiplicity)> for MultiSet<T> {
    fn from_iter<I: IntoIterator<Item = (T, Multiplicity)>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}

impl<T> IntoIterator for MultiSet<T> {
    type Item = (T, Multiplicity);
    type IntoIter = vec::IntoIter<(T, Multiplicity)>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

impl<T> From<Vec<(T, Multiplicity)>> for MultiSet<T> {
    fn from(inner: Vec<(T, Multiplicity)>) -> Self {
        Self { inner }
    }
}
