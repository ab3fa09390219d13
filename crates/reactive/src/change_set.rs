//! Change messages delivered to subscribers.
//!
//! A `ChangeSet` is the keyed form of a delta: per key at most one insert,
//! update or delete. Converting from a multiset pairs the retraction and the
//! assertion of the same key into an update.

use alloc::vec::Vec;
use core::slice;
use hashbrown::HashMap;
use rivulet_core::Value;
use rivulet_incremental::MultiSet;

/// Kind of a change to one key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeType {
    Insert,
    Update,
    Delete,
}

/// A change to the row stored under `key`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeMessage {
    pub change_type: ChangeType,
    pub key: Value,
    /// The new row, or the deleted row for deletes.
    pub value: Value,
    /// The replaced row of an update.
    pub previous_value: Option<Value>,
}

impl ChangeMessage {
    pub fn insert(key: Value, value: Value) -> Self {
        Self {
            change_type: ChangeType::Insert,
            key,
            value,
            previous_value: None,
        }
    }

    pub fn update(key: Value, previous: Value, value: Value) -> Self {
        Self {
            change_type: ChangeType::Update,
            key,
            value,
            previous_value: Some(previous),
        }
    }

    pub fn delete(key: Value, value: Value) -> Self {
        Self {
            change_type: ChangeType::Delete,
            key,
            value,
            previous_value: None,
        }
    }

    /// The change between two visible states of `key`, if any.
    pub fn between(key: Value, before: Option<Value>, after: Option<Value>) -> Option<Self> {
        match (before, after) {
            (None, Some(after)) => Some(Self::insert(key, after)),
            (Some(before), None) => Some(Self::delete(key, before)),
            (Some(before), Some(after)) if before != after => Some(Self::update(key, before, after)),
            _ => None,
        }
    }

    /// The row this change removes, if any.
    pub fn removed(&self) -> Option<&Value> {
        match self.change_type {
            ChangeType::Insert => None,
            ChangeType::Update => self.previous_value.as_ref(),
            ChangeType::Delete => Some(&self.value),
        }
    }

    /// The row this change adds, if any.
    pub fn added(&self) -> Option<&Value> {
        match self.change_type {
            ChangeType::Delete => None,
            ChangeType::Insert | ChangeType::Update => Some(&self.value),
        }
    }
}

/// An ordered batch of changes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeSet {
    messages: Vec<ChangeMessage>,
}

impl ChangeSet {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the keyed changes of a `(key, row)` delta.
    ///
    /// Entries cancelling out produce nothing. Keys keep the order in which
    /// they first appear.
    pub fn from_deltas(deltas: MultiSet<(Value, Value)>) -> Self {
        let mut order: Vec<Value> = Vec::new();
        let mut per_key: HashMap<Value, (Option<Value>, Option<Value>)> = HashMap::new();
        for ((key, row), m) in deltas.consolidate() {
            let slot = per_key.entry(key.clone()).or_insert_with(|| {
                order.push(key);
                (None, None)
            });
            if m < 0 {
                slot.0 = Some(row);
            } else {
                slot.1 = Some(row);
            }
        }
        let messages = order
            .into_iter()
            .filter_map(|key| {
                let (removed, added) = per_key.remove(&key)?;
                ChangeMessage::between(key, removed, added)
            })
            .collect();
        Self { messages }
    }

    /// The inverse conversion: each change as signed `(key, row)` entries.
    pub fn to_deltas(&self) -> MultiSet<(Value, Value)> {
        let mut deltas = MultiSet::new();
        for message in &self.messages {
            if let Some(removed) = message.removed() {
                deltas.add((message.key.clone(), removed.clone()), -1);
            }
            if let Some(added) = message.added() {
                deltas.add((message.key.clone(), added.clone()), 1);
            }
        }
        deltas
    }

    #[inline]
    pub fn push(&mut self, message: ChangeMessage) {
        self.messages.push(message);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn iter(&self) -> slice::Iter<'_, ChangeMessage> {
        self.messages.iter()
    }

    pub fn as_slice(&self) -> &[ChangeMessage] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<ChangeMessage> {
        self.messages
    }
}

impl From<Vec<ChangeMessage>> for ChangeSet {
    fn from(messages: Vec<ChangeMessage>) -> Self {
        Self { messages }
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a ChangeMessage;
    type IntoIter = slice::Iter<'a, ChangeMessage>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}
