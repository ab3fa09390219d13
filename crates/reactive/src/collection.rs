//! Keyed collections.
//!
//! A collection holds a synced layer (rows confirmed by the data source) and
//! an ordered list of optimistic mutations made by pending transactions. The
//! visible state of a key is the synced row overlaid with every pending
//! mutation of that key, in order. Indexes and subscriptions always follow the
//! visible state.

use crate::change_set::{ChangeMessage, ChangeSet, ChangeType};
use crate::scheduler::{ContextId, JobId, Scheduler};
use crate::subscription::{ChangeCallback, SubscribeOptions, Subscription, SubscriptionId, SubscriptionManager};
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::rc::{Rc, Weak};
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;
use core::mem;
use hashbrown::HashSet;
use rivulet_core::{Error, Result, Value};
use rivulet_index::{Index, IndexError, IndexSet};
use rivulet_query::{indexable_fields, optimize_expression_with_indexes};

/// Extracts the key of a row.
pub type KeyFn = Rc<dyn Fn(&Value) -> Value>;

/// Whether indexes are created on demand for filtered subscriptions and
/// lazy key loads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AutoIndex {
    #[default]
    Eager,
    Off,
}

/// Configuration of a collection.
#[derive(Clone)]
pub struct CollectionConfig {
    pub id: String,
    pub get_key: KeyFn,
    pub auto_index: AutoIndex,
}

impl CollectionConfig {
    pub fn new(id: impl Into<String>, get_key: impl Fn(&Value) -> Value + 'static) -> Self {
        Self {
            id: id.into(),
            get_key: Rc::new(get_key),
            auto_index: AutoIndex::default(),
        }
    }

    /// A collection keyed by the top-level field `field`.
    pub fn keyed_by(id: impl Into<String>, field: &str) -> Self {
        let field = String::from(field);
        Self::new(id, move |row| row.get(&field).clone())
    }

    pub fn auto_index(mut self, auto_index: AutoIndex) -> Self {
        self.auto_index = auto_index;
        self
    }
}

impl fmt::Debug for CollectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionConfig")
            .field("id", &self.id)
            .field("auto_index", &self.auto_index)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollectionStatus {
    Ready,
    CleanedUp,
}

/// A change to one row, as recorded by a transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mutation {
    pub collection: String,
    pub change_type: ChangeType,
    pub key: Value,
    /// The visible row before the mutation.
    pub previous: Option<Value>,
    /// The row after the mutation; `None` for deletes.
    pub value: Option<Value>,
}

struct CollectionState {
    config: CollectionConfig,
    synced: BTreeMap<Value, Value>,
    /// Optimistic mutations in application order, tagged with their transaction.
    pending: Vec<(ContextId, Mutation)>,
    visible: BTreeMap<Value, Value>,
    indexes: IndexSet,
    subscriptions: SubscriptionManager,
    status: CollectionStatus,
    read_only: bool,
    /// The live query maintaining this collection, if any.
    source_job: Option<JobId>,
}

fn index_error(err: IndexError) -> Error {
    Error::invalid_state(err.to_string())
}

impl CollectionState {
    fn new(config: CollectionConfig) -> Self {
        Self {
            config,
            synced: BTreeMap::new(),
            pending: Vec::new(),
            visible: BTreeMap::new(),
            indexes: IndexSet::new(),
            subscriptions: SubscriptionManager::default(),
            status: CollectionStatus::Ready,
            read_only: false,
            source_job: None,
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.status {
            CollectionStatus::Ready => Ok(()),
            CollectionStatus::CleanedUp => Err(Error::invalid_state(format!(
                "collection `{}` was cleaned up",
                self.config.id
            ))),
        }
    }

    fn ensure_writable(&self) -> Result<()> {
        self.ensure_ready()?;
        if self.read_only {
            return Err(Error::invalid_state(format!(
                "collection `{}` is maintained by a live query",
                self.config.id
            )));
        }
        Ok(())
    }

    fn overlay(&self, key: &Value) -> Option<Value> {
        self.pending
            .iter()
            .filter(|(_, m)| &m.key == key)
            .fold(self.synced.get(key).cloned(), |_, (_, m)| m.value.clone())
    }

    /// Recomputes the visible rows of `keys`, keeping indexes in step.
    fn refresh(&mut self, keys: impl IntoIterator<Item = Value>) -> Result<ChangeSet> {
        let mut seen = HashSet::new();
        let mut changes = ChangeSet::new();
        for key in keys {
            if !seen.insert(key.clone()) {
                continue;
            }
            let after = self.overlay(&key);
            let before = match &after {
                Some(row) => self.visible.insert(key.clone(), row.clone()),
                None => self.visible.remove(&key),
            };
            match (&before, &after) {
                (None, Some(new)) => self.indexes.on_insert(&key, new),
                (Some(old), Some(new)) => self.indexes.on_update(&key, old, new).map_err(index_error)?,
                (Some(old), None) => self.indexes.on_delete(&key, old).map_err(index_error)?,
                (None, None) => {}
            }
            if let Some(change) = ChangeMessage::between(key, before, after) {
                changes.push(change);
            }
        }
        Ok(changes)
    }

    fn mutation(&self, change_type: ChangeType, key: Value, previous: Option<Value>, value: Option<Value>) -> Mutation {
        Mutation {
            collection: self.config.id.clone(),
            change_type,
            key,
            previous,
            value,
        }
    }

    fn prepare_insert(&self, row: Value) -> Result<Mutation> {
        self.ensure_writable()?;
        let key = (self.config.get_key)(&row);
        if self.visible.contains_key(&key) {
            return Err(Error::duplicate_key(self.config.id.clone(), key));
        }
        Ok(self.mutation(ChangeType::Insert, key, None, Some(row)))
    }

    fn prepare_update(&self, key: &Value, f: impl FnOnce(&mut Value)) -> Result<Mutation> {
        self.ensure_writable()?;
        let previous = self
            .visible
            .get(key)
            .cloned()
            .ok_or_else(|| Error::key_not_found(self.config.id.clone(), key.clone()))?;
        let mut row = previous.clone();
        f(&mut row);
        let new_key = (self.config.get_key)(&row);
        if &new_key != key {
            return Err(Error::invalid_state(format!(
                "update of {} in `{}` changed its key to {}",
                key, self.config.id, new_key
            )));
        }
        Ok(self.mutation(ChangeType::Update, key.clone(), Some(previous), Some(row)))
    }

    fn prepare_delete(&self, key: &Value) -> Result<Mutation> {
        self.ensure_writable()?;
        let previous = self
            .visible
            .get(key)
            .cloned()
            .ok_or_else(|| Error::key_not_found(self.config.id.clone(), key.clone()))?;
        Ok(self.mutation(ChangeType::Delete, key.clone(), Some(previous), None))
    }

    fn ensure_index(&mut self, path: &[String]) {
        if self.config.auto_index == AutoIndex::Eager {
            self.indexes.ensure_index(path, self.visible.iter());
        }
    }

    /// Keys of the visible rows whose `path` field holds one of `values`.
    fn keys_where(&mut self, path: &[String], values: &[Value]) -> Vec<Value> {
        self.ensure_index(path);
        let mut keys: Vec<Value> = match self.indexes.get(path) {
            Some(index) => values.iter().flat_map(|v| index.lookup(v)).collect(),
            None => self
                .visible
                .iter()
                .filter(|(_, row)| values.contains(row.get_path(path)))
                .map(|(key, _)| key.clone())
                .collect(),
        };
        keys.sort();
        keys.dedup();
        keys
    }

    /// Candidate keys for the initial state of subscription `id`.
    fn initial_keys(&mut self, id: SubscriptionId) -> Option<Vec<Value>> {
        let expr = self.subscriptions.get_mut(id)?.where_expression().cloned();
        if let Some(expr) = expr {
            for path in indexable_fields(&expr) {
                self.ensure_index(&path);
            }
            let optimized = optimize_expression_with_indexes(&expr, &self.indexes);
            if optimized.can_optimize {
                let mut keys: Vec<Value> = optimized.matching_keys.into_iter().collect();
                keys.sort();
                return Some(keys);
            }
        }
        Some(self.visible.keys().cloned().collect())
    }

    /// Inserts for the rows of `keys` subscription `id` has not been sent.
    fn send_rows(&mut self, id: SubscriptionId, keys: &[Value]) -> Option<(ChangeCallback, ChangeSet)> {
        let subscription = self.subscriptions.get_mut(id)?;
        let changes = subscription.unsent(keys.iter().filter_map(|k| self.visible.get_key_value(k)));
        (!changes.is_empty()).then(|| (subscription.callback(), changes))
    }
}

/// A shared handle to a keyed collection.
///
/// Clones refer to the same collection.
#[derive(Clone)]
pub struct Collection {
    state: Rc<RefCell<CollectionState>>,
    scheduler: Scheduler,
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Collection")
            .field("id", &state.config.id)
            .field("len", &state.visible.len())
            .field("status", &state.status)
            .finish()
    }
}

impl Collection {
    pub fn new(config: CollectionConfig, scheduler: &Scheduler) -> Self {
        tracing::debug!(collection = %config.id, "created collection");
        Self {
            state: Rc::new(RefCell::new(CollectionState::new(config))),
            scheduler: scheduler.clone(),
        }
    }

    /// The read-only result collection of live query `job`.
    pub(crate) fn derived(id: String, scheduler: &Scheduler, job: JobId) -> Self {
        let mut state = CollectionState::new(CollectionConfig::new(id, |_| Value::Null));
        state.read_only = true;
        state.source_job = Some(job);
        Self {
            state: Rc::new(RefCell::new(state)),
            scheduler: scheduler.clone(),
        }
    }

    pub fn id(&self) -> String {
        self.state.borrow().config.id.clone()
    }

    pub fn status(&self) -> CollectionStatus {
        self.state.borrow().status
    }

    /// True for collections maintained by a live query.
    pub fn is_read_only(&self) -> bool {
        self.state.borrow().read_only
    }

    /// True if both handles refer to the same collection.
    pub fn ptr_eq(&self, other: &Collection) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    pub(crate) fn source_job(&self) -> Option<JobId> {
        self.state.borrow().source_job
    }

    /// The key `row` would be stored under.
    pub fn key_of(&self, row: &Value) -> Value {
        let get_key = Rc::clone(&self.state.borrow().config.get_key);
        get_key(row)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.state.borrow().visible.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.state.borrow().visible.is_empty()
    }

    /// The visible row stored under `key`.
    pub fn get(&self, key: &Value) -> Option<Value> {
        self.state.borrow().visible.get(key).cloned()
    }

    pub fn has(&self, key: &Value) -> bool {
        self.state.borrow().visible.contains_key(key)
    }

    /// Visible rows in key order.
    pub fn to_vec(&self) -> Vec<Value> {
        self.state.borrow().visible.values().cloned().collect()
    }

    /// Visible `(key, row)` pairs in key order.
    pub fn entries(&self) -> Vec<(Value, Value)> {
        self.state
            .borrow()
            .visible
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Returns true if some transaction has uncommitted mutations here.
    pub fn has_pending_mutations(&self) -> bool {
        !self.state.borrow().pending.is_empty()
    }

    /// Builds an index on the field at `path` unless one exists.
    pub fn create_index(&self, path: &[&str]) -> bool {
        let path: Vec<String> = path.iter().map(|s| s.to_string()).collect();
        let state = &mut *self.state.borrow_mut();
        state.indexes.ensure_index(&path, state.visible.iter())
    }

    pub fn has_index(&self, path: &[&str]) -> bool {
        let path: Vec<String> = path.iter().map(|s| s.to_string()).collect();
        self.state.borrow().indexes.has_index(&path)
    }

    /// Inserts `row` directly into the synced layer and returns its key.
    pub fn insert(&self, row: Value) -> Result<Value> {
        let mutation = self.state.borrow().prepare_insert(row)?;
        let key = mutation.key.clone();
        self.write_synced(mutation)?;
        Ok(key)
    }

    /// Replaces the row under `key` with the result of `f` on a copy of it.
    pub fn update(&self, key: &Value, f: impl FnOnce(&mut Value)) -> Result<()> {
        let mutation = self.state.borrow().prepare_update(key, f)?;
        self.write_synced(mutation)
    }

    pub fn delete(&self, key: &Value) -> Result<()> {
        let mutation = self.state.borrow().prepare_delete(key)?;
        self.write_synced(mutation)
    }

    fn write_synced(&self, mutation: Mutation) -> Result<()> {
        self.in_context(|| {
            self.modify(|state| {
                match mutation.value {
                    Some(row) => state.synced.insert(mutation.key.clone(), row),
                    None => state.synced.remove(&mutation.key),
                };
                Ok(vec![mutation.key])
            })
        })
    }

    /// Starts a batch of writes from the data source.
    pub fn begin_sync(&self) -> SyncWriter {
        SyncWriter {
            collection: self.clone(),
            writes: Vec::new(),
        }
    }

    /// Subscribes `callback` to the visible changes of this collection.
    pub fn subscribe_changes(
        &self,
        callback: impl Fn(&ChangeSet) + 'static,
        options: SubscribeOptions,
    ) -> Result<SubscriptionHandle> {
        let subscription = Subscription::new(Rc::new(callback), options.where_expression)?;
        let id = {
            let mut state = self.state.borrow_mut();
            state.ensure_ready()?;
            let id = state.subscriptions.subscribe(subscription);
            tracing::debug!(collection = %state.config.id, subscription = id, "subscribed");
            id
        };
        let handle = SubscriptionHandle {
            id,
            collection: Rc::downgrade(&self.state),
        };
        if options.include_initial_state {
            handle.load_initial_state()?;
        }
        Ok(handle)
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.borrow().subscriptions.len()
    }

    /// Drops every row, index and subscription. Later writes fail.
    pub fn cleanup(&self) {
        let mut state = self.state.borrow_mut();
        state.status = CollectionStatus::CleanedUp;
        state.synced.clear();
        state.pending.clear();
        state.visible.clear();
        state.indexes.clear();
        state.subscriptions.clear();
        tracing::debug!(collection = %state.config.id, "collection cleaned up");
    }

    pub(crate) fn prepare_insert(&self, row: Value) -> Result<Mutation> {
        self.state.borrow().prepare_insert(row)
    }

    pub(crate) fn prepare_update(&self, key: &Value, f: impl FnOnce(&mut Value)) -> Result<Mutation> {
        self.state.borrow().prepare_update(key, f)
    }

    pub(crate) fn prepare_delete(&self, key: &Value) -> Result<Mutation> {
        self.state.borrow().prepare_delete(key)
    }

    /// Applies `mutation` optimistically on behalf of `transaction`.
    pub(crate) fn apply_pending(&self, transaction: ContextId, mutation: Mutation) -> Result<()> {
        self.modify(|state| {
            state.ensure_writable()?;
            let key = mutation.key.clone();
            state.pending.push((transaction, mutation));
            Ok(vec![key])
        })
    }

    /// Moves the mutations of `transaction` into the synced layer.
    pub(crate) fn confirm(&self, transaction: ContextId) -> Result<()> {
        self.modify(|state| {
            let (confirmed, kept): (Vec<_>, Vec<_>) = mem::take(&mut state.pending)
                .into_iter()
                .partition(|(tx, _)| *tx == transaction);
            state.pending = kept;
            let mut keys = Vec::with_capacity(confirmed.len());
            for (_, mutation) in confirmed {
                match mutation.value {
                    Some(row) => state.synced.insert(mutation.key.clone(), row),
                    None => state.synced.remove(&mutation.key),
                };
                keys.push(mutation.key);
            }
            Ok(keys)
        })
    }

    /// Drops the mutations of `transaction`.
    pub(crate) fn discard(&self, transaction: ContextId) -> Result<()> {
        self.modify(|state| {
            let mut keys = Vec::new();
            state.pending.retain(|(tx, mutation)| {
                if *tx == transaction {
                    keys.push(mutation.key.clone());
                }
                *tx != transaction
            });
            Ok(keys)
        })
    }

    /// Runs `f` on the state, then notifies subscribers of the visible
    /// changes to the keys it returns.
    fn modify(&self, f: impl FnOnce(&mut CollectionState) -> Result<Vec<Value>>) -> Result<()> {
        let deliveries = {
            let mut state = self.state.borrow_mut();
            let keys = f(&mut *state)?;
            let changes = state.refresh(keys)?;
            if changes.is_empty() {
                return Ok(());
            }
            tracing::trace!(collection = %state.config.id, changes = changes.len(), "visible state changed");
            state.subscriptions.dispatch(&changes)
        };
        for (callback, changes) in deliveries {
            callback(&changes);
        }
        Ok(())
    }

    /// Runs `f` in the current scheduler context, or in a fresh context
    /// flushed and cleared afterwards.
    fn in_context(&self, f: impl FnOnce() -> Result<()>) -> Result<()> {
        if self.scheduler.current_context().is_some() {
            return f();
        }
        let context = self.scheduler.new_context();
        let applied = self.scheduler.with_context(context, f);
        let flushed = applied.and_then(|()| self.scheduler.flush(context));
        self.scheduler.clear(context);
        flushed
    }
}

/// A batch of writes to the synced layer of a collection.
///
/// Nothing is visible until `commit`.
pub struct SyncWriter {
    collection: Collection,
    writes: Vec<(Value, Option<Value>)>,
}

impl SyncWriter {
    /// Writes `row` under its key, replacing any synced row.
    pub fn insert(&mut self, row: Value) -> &mut Self {
        let key = self.collection.key_of(&row);
        self.writes.push((key, Some(row)));
        self
    }

    /// Same as `insert`: the synced layer takes rows as the source sends them.
    pub fn update(&mut self, row: Value) -> &mut Self {
        self.insert(row)
    }

    pub fn delete(&mut self, key: Value) -> &mut Self {
        self.writes.push((key, None));
        self
    }

    pub(crate) fn write(&mut self, key: Value, row: Option<Value>) -> &mut Self {
        self.writes.push((key, row));
        self
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn commit(self) -> Result<()> {
        let Self { collection, writes } = self;
        collection.in_context(|| {
            collection.modify(|state| {
                state.ensure_ready()?;
                let mut keys = Vec::with_capacity(writes.len());
                for (key, row) in writes {
                    match row {
                        Some(row) => state.synced.insert(key.clone(), row),
                        None => state.synced.remove(&key),
                    };
                    keys.push(key);
                }
                Ok(keys)
            })
        })
    }
}

/// A handle to one subscription of a collection.
#[derive(Clone, Debug)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    collection: Weak<RefCell<CollectionState>>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.collection
            .upgrade()
            .map_or(false, |state| state.borrow().subscriptions.contains(self.id))
    }

    pub fn unsubscribe(&self) -> bool {
        self.collection
            .upgrade()
            .map_or(false, |state| state.borrow_mut().subscriptions.unsubscribe(self.id))
    }

    fn inactive(&self) -> Error {
        Error::invalid_state(format!("subscription {} is no longer active", self.id))
    }

    fn state(&self) -> Result<Rc<RefCell<CollectionState>>> {
        self.collection.upgrade().ok_or_else(|| self.inactive())
    }

    /// Sends every visible matching row not sent yet.
    pub fn load_initial_state(&self) -> Result<()> {
        let state = self.state()?;
        let delivery = {
            let mut state = state.borrow_mut();
            let keys = state.initial_keys(self.id).ok_or_else(|| self.inactive())?;
            if let Some(subscription) = state.subscriptions.get_mut(self.id) {
                subscription.mark_initial_state_loaded();
            }
            state.send_rows(self.id, &keys)
        };
        if let Some((callback, changes)) = delivery {
            callback(&changes);
        }
        Ok(())
    }

    /// Sends the matching rows whose field at `path` equals one of `values`
    /// and that were not sent yet.
    pub fn load_keys(&self, path: &[String], values: &[Value]) -> Result<()> {
        let state = self.state()?;
        let delivery = {
            let mut state = state.borrow_mut();
            match state.subscriptions.get_mut(self.id) {
                None => return Err(self.inactive()),
                Some(subscription) if subscription.has_loaded_initial_state() => return Ok(()),
                Some(_) => {}
            }
            let keys = state.keys_where(path, values);
            tracing::trace!(
                collection = %state.config.id,
                path = %path.join("."),
                requested = values.len(),
                found = keys.len(),
                "loading keys"
            );
            state.send_rows(self.id, &keys)
        };
        if let Some((callback, changes)) = delivery {
            callback(&changes);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rivulet_query::ast::builder::{ref_, val};
    use rivulet_query::Expr;

    fn todo(id: i64, done: bool) -> Value {
        Value::object([("id", Value::Int64(id)), ("done", Value::Boolean(done))])
    }

    fn todos() -> Collection {
        Collection::new(CollectionConfig::keyed_by("todos", "id"), &Scheduler::new())
    }

    fn recorder(collection: &Collection, options: SubscribeOptions) -> (Rc<RefCell<Vec<ChangeMessage>>>, SubscriptionHandle) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let handle = collection
            .subscribe_changes(move |changes| sink.borrow_mut().extend(changes.iter().cloned()), options)
            .unwrap();
        (log, handle)
    }

    #[test]
    fn test_direct_writes() {
        let c = todos();
        let key = c.insert(todo(1, false)).unwrap();
        assert_eq!(key, Value::Int64(1));
        assert!(matches!(c.insert(todo(1, true)), Err(Error::DuplicateKey { .. })));

        c.update(&key, |row| row.set("done", Value::Boolean(true))).unwrap();
        assert_eq!(c.get(&key), Some(todo(1, true)));
        assert!(matches!(
            c.update(&key, |row| row.set("id", Value::Int64(9))),
            Err(Error::InvalidState { .. })
        ));

        c.delete(&key).unwrap();
        assert!(c.is_empty());
        assert!(matches!(c.delete(&key), Err(Error::KeyNotFound { .. })));
    }

    #[test]
    fn test_direct_writes_release_their_contexts() {
        let scheduler = Scheduler::new();
        let c = Collection::new(CollectionConfig::keyed_by("todos", "id"), &scheduler);
        for id in 0..100 {
            c.insert(todo(id, false)).unwrap();
        }
        assert!(c.insert(todo(0, false)).is_err());
        let mut sync = c.begin_sync();
        sync.delete(Value::Int64(0));
        sync.commit().unwrap();
        assert_eq!(scheduler.open_context_count(), 0);
    }

    #[test]
    fn test_subscription_sees_initial_state_and_changes() {
        let c = todos();
        c.insert(todo(1, false)).unwrap();
        let (log, _handle) = recorder(&c, SubscribeOptions::with_initial_state());
        assert_eq!(*log.borrow(), vec![ChangeMessage::insert(Value::Int64(1), todo(1, false))]);

        c.update(&Value::Int64(1), |row| row.set("done", Value::Boolean(true))).unwrap();
        assert_eq!(
            log.borrow()[1],
            ChangeMessage::update(Value::Int64(1), todo(1, false), todo(1, true))
        );
    }

    #[test]
    fn test_filtered_subscription_uses_index() {
        let c = todos();
        for id in 0..6 {
            c.insert(todo(id, id % 2 == 0)).unwrap();
        }
        let options = SubscribeOptions::with_initial_state().filter(Expr::eq(ref_("done"), val(true)));
        let (log, _handle) = recorder(&c, options);
        assert!(c.has_index(&["done"]));
        let keys: Vec<Value> = log.borrow().iter().map(|m| m.key.clone()).collect();
        assert_eq!(keys, vec![Value::Int64(0), Value::Int64(2), Value::Int64(4)]);

        // leaving the filter is a delete for this subscriber
        c.update(&Value::Int64(0), |row| row.set("done", Value::Boolean(false))).unwrap();
        assert_eq!(log.borrow().last().unwrap().change_type, ChangeType::Delete);
    }

    #[test]
    fn test_auto_index_off() {
        let c = Collection::new(
            CollectionConfig::keyed_by("todos", "id").auto_index(AutoIndex::Off),
            &Scheduler::new(),
        );
        c.insert(todo(1, true)).unwrap();
        let options = SubscribeOptions::with_initial_state().filter(Expr::eq(ref_("done"), val(true)));
        let (log, _handle) = recorder(&c, options);
        assert!(!c.has_index(&["done"]));
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_load_keys_sends_each_row_once() {
        let c = todos();
        for id in 0..4 {
            c.insert(todo(id, id < 2)).unwrap();
        }
        let (log, handle) = recorder(&c, SubscribeOptions::default());
        assert!(log.borrow().is_empty());

        let path = vec![String::from("done")];
        handle.load_keys(&path, &[Value::Boolean(true)]).unwrap();
        assert_eq!(log.borrow().len(), 2);
        handle.load_keys(&path, &[Value::Boolean(true)]).unwrap();
        assert_eq!(log.borrow().len(), 2);

        handle.load_initial_state().unwrap();
        assert_eq!(log.borrow().len(), 4);
    }

    #[test]
    fn test_sync_writer() {
        let c = todos();
        let (log, _handle) = recorder(&c, SubscribeOptions::default());
        let mut sync = c.begin_sync();
        sync.insert(todo(1, false)).insert(todo(2, false));
        assert!(c.is_empty());
        sync.commit().unwrap();
        assert_eq!(c.len(), 2);

        let mut sync = c.begin_sync();
        sync.update(todo(1, true)).delete(Value::Int64(2));
        sync.commit().unwrap();
        assert_eq!(c.to_vec(), vec![todo(1, true)]);
        assert_eq!(log.borrow().len(), 4);
    }

    #[test]
    fn test_cleanup() {
        let c = todos();
        c.insert(todo(1, false)).unwrap();
        let (_log, handle) = recorder(&c, SubscribeOptions::default());
        c.cleanup();
        assert_eq!(c.status(), CollectionStatus::CleanedUp);
        assert!(!handle.is_active());
        assert!(matches!(c.insert(todo(2, false)), Err(Error::InvalidState { .. })));
        assert!(c.subscribe_changes(|_| {}, SubscribeOptions::default()).is_err());
    }
}
