//! Subscriptions to collection changes.
//!
//! Each subscription remembers which keys it has been sent. Changes are
//! filtered by the subscription's WHERE expression and then reconciled with
//! that set, so a subscriber never sees an update or delete of a row it was
//! never given.

use crate::change_set::{ChangeMessage, ChangeSet, ChangeType};
use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::vec::Vec;
use hashbrown::HashSet;
use rivulet_core::{Result, Value};
use rivulet_query::compiler::{compile_single_row_expression, is_truthy, CompiledExpr};
use rivulet_query::Expr;

/// Unique identifier for a subscription within its collection.
pub type SubscriptionId = u64;

/// Callback type for change notifications.
pub type ChangeCallback = Rc<dyn Fn(&ChangeSet)>;

/// Options of `Collection::subscribe_changes`.
#[derive(Clone, Debug, Default)]
pub struct SubscribeOptions {
    /// Deliver the current matching rows as inserts when subscribing.
    pub include_initial_state: bool,
    /// Row filter; references are field paths of the collection's rows.
    pub where_expression: Option<Expr>,
}

impl SubscribeOptions {
    pub fn with_initial_state() -> Self {
        Self {
            include_initial_state: true,
            where_expression: None,
        }
    }

    pub fn filter(mut self, expr: Expr) -> Self {
        self.where_expression = Some(expr);
        self
    }
}

/// The state of one subscription.
pub(crate) struct Subscription {
    callback: ChangeCallback,
    where_expression: Option<Expr>,
    filter: Option<CompiledExpr>,
    sent_keys: HashSet<Value>,
    loaded_initial_state: bool,
}

impl Subscription {
    pub(crate) fn new(callback: ChangeCallback, where_expression: Option<Expr>) -> Result<Self> {
        let filter = where_expression
            .as_ref()
            .map(compile_single_row_expression)
            .transpose()?;
        Ok(Self {
            callback,
            where_expression,
            filter,
            sent_keys: HashSet::new(),
            loaded_initial_state: false,
        })
    }

    pub(crate) fn callback(&self) -> ChangeCallback {
        Rc::clone(&self.callback)
    }

    pub(crate) fn where_expression(&self) -> Option<&Expr> {
        self.where_expression.as_ref()
    }

    pub(crate) fn matches(&self, row: &Value) -> bool {
        self.filter.as_ref().map_or(true, |f| is_truthy(&f(row)))
    }

    pub(crate) fn has_loaded_initial_state(&self) -> bool {
        self.loaded_initial_state
    }

    pub(crate) fn mark_initial_state_loaded(&mut self) {
        self.loaded_initial_state = true;
    }

    /// Inserts for the given rows this subscription has not been sent yet.
    pub(crate) fn unsent<'a>(&mut self, rows: impl IntoIterator<Item = (&'a Value, &'a Value)>) -> ChangeSet {
        let mut changes = ChangeSet::new();
        for (key, row) in rows {
            if !self.sent_keys.contains(key) && self.matches(row) {
                self.sent_keys.insert(key.clone());
                changes.push(ChangeMessage::insert(key.clone(), row.clone()));
            }
        }
        changes
    }

    /// Applies the filter to `changes` and reconciles them with the keys
    /// already sent.
    pub(crate) fn filter_changes(&mut self, changes: &ChangeSet) -> ChangeSet {
        let mut out = ChangeSet::new();
        for change in changes {
            let Some(filtered) = self.apply_filter(change) else {
                continue;
            };
            let sent = self.sent_keys.contains(&filtered.key);
            let reconciled = match (filtered.change_type, sent) {
                (ChangeType::Insert, true) => ChangeMessage {
                    change_type: ChangeType::Update,
                    previous_value: None,
                    ..filtered
                },
                (ChangeType::Update, false) => ChangeMessage::insert(filtered.key, filtered.value),
                (ChangeType::Delete, false) => continue,
                _ => filtered,
            };
            if reconciled.change_type == ChangeType::Delete {
                self.sent_keys.remove(&reconciled.key);
            } else {
                self.sent_keys.insert(reconciled.key.clone());
            }
            out.push(reconciled);
        }
        out
    }

    /// Turns updates crossing the filter boundary into inserts or deletes.
    fn apply_filter(&self, change: &ChangeMessage) -> Option<ChangeMessage> {
        if self.filter.is_none() {
            return Some(change.clone());
        }
        let before = change.removed().filter(|row| self.matches(row));
        let after = change.added().filter(|row| self.matches(row));
        match (before, after) {
            (Some(before), Some(after)) => Some(ChangeMessage::update(change.key.clone(), before.clone(), after.clone())),
            (None, Some(after)) => Some(ChangeMessage::insert(change.key.clone(), after.clone())),
            (Some(before), None) => Some(ChangeMessage::delete(change.key.clone(), before.clone())),
            (None, None) => None,
        }
    }
}

/// The subscriptions of one collection, notified in subscription order.
#[derive(Default)]
pub(crate) struct SubscriptionManager {
    subscriptions: BTreeMap<SubscriptionId, Subscription>,
    next_id: SubscriptionId,
}

impl SubscriptionManager {
    pub(crate) fn subscribe(&mut self, subscription: Subscription) -> SubscriptionId {
        self.next_id += 1;
        self.subscriptions.insert(self.next_id, subscription);
        self.next_id
    }

    pub(crate) fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscriptions.remove(&id).is_some()
    }

    pub(crate) fn get_mut(&mut self, id: SubscriptionId) -> Option<&mut Subscription> {
        self.subscriptions.get_mut(&id)
    }

    pub(crate) fn contains(&self, id: SubscriptionId) -> bool {
        self.subscriptions.contains_key(&id)
    }

    /// Per subscription, the callback and the changes it should receive.
    pub(crate) fn dispatch(&mut self, changes: &ChangeSet) -> Vec<(ChangeCallback, ChangeSet)> {
        if changes.is_empty() {
            return Vec::new();
        }
        self.subscriptions
            .values_mut()
            .filter_map(|sub| {
                let filtered = sub.filter_changes(changes);
                (!filtered.is_empty()).then(|| (sub.callback(), filtered))
            })
            .collect()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub(crate) fn clear(&mut self) {
        self.subscriptions.clear();
    }
}
