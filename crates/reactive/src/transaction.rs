//! Optimistic transactions.
//!
//! A transaction applies its mutations to the collections immediately, as a
//! pending layer over their synced rows, so live queries reflect them before
//! the data source has confirmed anything. Committing hands the mutations to
//! a persist callback: on success they move into the synced layer, on failure
//! they are dropped and subscribers see the inverse changes.
//!
//! The transaction id doubles as its scheduler context, so the live queries
//! touched by one batch of mutations recompute once per flush.

use crate::collection::{Collection, Mutation};
use crate::scheduler::{ContextId, Scheduler};
use alloc::format;
use alloc::string::ToString;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::fmt;
use rivulet_core::{Error, Result, Value};

/// Identifies a transaction; equal to its scheduler context.
pub type TransactionId = ContextId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionState {
    Pending,
    Completed,
    Failed,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransactionState::Pending => "pending",
            TransactionState::Completed => "completed",
            TransactionState::Failed => "failed",
        })
    }
}

pub struct Transaction {
    id: TransactionId,
    scheduler: Scheduler,
    state: Cell<TransactionState>,
    mutations: RefCell<Vec<Mutation>>,
    collections: RefCell<Vec<Collection>>,
    batching: Cell<bool>,
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("state", &self.state.get())
            .field("mutations", &self.mutations.borrow().len())
            .finish()
    }
}

impl Transaction {
    pub fn new(scheduler: &Scheduler) -> Self {
        Self {
            id: scheduler.new_context(),
            scheduler: scheduler.clone(),
            state: Cell::new(TransactionState::Pending),
            mutations: RefCell::new(Vec::new()),
            collections: RefCell::new(Vec::new()),
            batching: Cell::new(false),
        }
    }

    #[inline]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    #[inline]
    pub fn state(&self) -> TransactionState {
        self.state.get()
    }

    /// The mutations applied so far, in order.
    pub fn mutations(&self) -> Vec<Mutation> {
        self.mutations.borrow().clone()
    }

    fn ensure_pending(&self) -> Result<()> {
        match self.state.get() {
            TransactionState::Pending => Ok(()),
            state => Err(Error::invalid_state(format!(
                "transaction {} is already {}",
                self.id, state
            ))),
        }
    }

    /// Inserts `row` into `collection` and returns its key.
    pub fn insert(&self, collection: &Collection, row: Value) -> Result<Value> {
        self.ensure_pending()?;
        let mutation = collection.prepare_insert(row)?;
        let key = mutation.key.clone();
        self.apply(collection, mutation)?;
        Ok(key)
    }

    pub fn update(&self, collection: &Collection, key: &Value, f: impl FnOnce(&mut Value)) -> Result<()> {
        self.ensure_pending()?;
        let mutation = collection.prepare_update(key, f)?;
        self.apply(collection, mutation)
    }

    pub fn delete(&self, collection: &Collection, key: &Value) -> Result<()> {
        self.ensure_pending()?;
        let mutation = collection.prepare_delete(key)?;
        self.apply(collection, mutation)
    }

    /// Runs `f` and flushes the scheduled live-query work once at the end
    /// instead of after every mutation.
    pub fn mutate<R>(&self, f: impl FnOnce(&Self) -> Result<R>) -> Result<R> {
        self.ensure_pending()?;
        let outer = self.batching.replace(true);
        let result = f(self);
        self.batching.set(outer);
        if !outer {
            self.scheduler.flush(self.id)?;
        }
        result
    }

    fn apply(&self, collection: &Collection, mutation: Mutation) -> Result<()> {
        self.scheduler
            .with_context(self.id, || collection.apply_pending(self.id, mutation.clone()))?;
        tracing::trace!(transaction = self.id, collection = %mutation.collection, change = ?mutation.change_type, "applied mutation");
        self.mutations.borrow_mut().push(mutation);
        {
            let mut collections = self.collections.borrow_mut();
            if !collections.iter().any(|c| c.ptr_eq(collection)) {
                collections.push(collection.clone());
            }
        }
        if self.batching.get() {
            Ok(())
        } else {
            self.scheduler.flush(self.id)
        }
    }

    /// Persists the mutations through `persist`, then confirms them.
    ///
    /// If `persist` fails the transaction is rolled back and the error is
    /// returned as `TransactionFailed`.
    pub fn commit<E: fmt::Display>(
        &self,
        persist: impl FnOnce(&[Mutation]) -> core::result::Result<(), E>,
    ) -> Result<()> {
        self.ensure_pending()?;
        let mutations = self.mutations();
        match persist(&mutations) {
            Ok(()) => {
                self.finish(TransactionState::Completed, Collection::confirm)?;
                tracing::debug!(transaction = self.id, mutations = mutations.len(), "transaction committed");
                Ok(())
            }
            Err(err) => {
                let message = err.to_string();
                tracing::warn!(transaction = self.id, error = %message, "persist failed, rolling back");
                self.finish(TransactionState::Failed, Collection::discard)?;
                Err(Error::transaction_failed(self.id, message))
            }
        }
    }

    /// Commits without a persist step.
    pub fn commit_local(&self) -> Result<()> {
        self.commit(|_| Ok::<(), Error>(()))
    }

    /// Drops every mutation of this transaction.
    pub fn rollback(&self) -> Result<()> {
        self.ensure_pending()?;
        self.finish(TransactionState::Failed, Collection::discard)?;
        tracing::debug!(transaction = self.id, "transaction rolled back");
        Ok(())
    }

    fn finish(&self, state: TransactionState, settle: fn(&Collection, ContextId) -> Result<()>) -> Result<()> {
        self.state.set(state);
        let collections = self.collections.borrow().clone();
        let settled = self
            .scheduler
            .with_context(self.id, || collections.iter().try_for_each(|c| settle(c, self.id)));
        let flushed = self.scheduler.flush(self.id);
        self.scheduler.clear(self.id);
        settled.and(flushed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change_set::{ChangeMessage, ChangeType};
    use crate::collection::CollectionConfig;
    use crate::subscription::SubscribeOptions;
    use alloc::rc::Rc;
    use alloc::vec;

    fn item(id: i64, qty: i64) -> Value {
        Value::object([("id", Value::Int64(id)), ("qty", Value::Int64(qty))])
    }

    fn setup() -> (Scheduler, Collection) {
        let scheduler = Scheduler::new();
        let items = Collection::new(CollectionConfig::keyed_by("items", "id"), &scheduler);
        items.insert(item(1, 1)).unwrap();
        (scheduler, items)
    }

    #[test]
    fn test_commit_moves_mutations_to_synced() {
        let (scheduler, items) = setup();
        let tx = Transaction::new(&scheduler);
        tx.insert(&items, item(2, 5)).unwrap();
        tx.update(&items, &Value::Int64(1), |row| row.set("qty", Value::Int64(3))).unwrap();
        assert!(items.has_pending_mutations());
        assert_eq!(items.get(&Value::Int64(1)), Some(item(1, 3)));

        let seen = Rc::new(RefCell::new(0));
        let s = Rc::clone(&seen);
        tx.commit(move |mutations| {
            *s.borrow_mut() = mutations.len();
            Ok::<(), &str>(())
        })
        .unwrap();
        assert_eq!(*seen.borrow(), 2);
        assert_eq!(tx.state(), TransactionState::Completed);
        assert!(!items.has_pending_mutations());
        assert_eq!(items.to_vec(), vec![item(1, 3), item(2, 5)]);
        assert_eq!(scheduler.open_context_count(), 0);
    }

    #[test]
    fn test_failed_persist_emits_inverse_changes() {
        let (scheduler, items) = setup();
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let _sub = items
            .subscribe_changes(
                move |c| sink.borrow_mut().extend(c.iter().cloned()),
                SubscribeOptions::with_initial_state(),
            )
            .unwrap();

        let tx = Transaction::new(&scheduler);
        tx.mutate(|tx| {
            tx.insert(&items, item(2, 5))?;
            tx.delete(&items, &Value::Int64(1))
        })
        .unwrap();
        assert!(items.get(&Value::Int64(1)).is_none());

        let err = tx.commit(|_| Err("offline")).unwrap_err();
        assert_eq!(err, Error::transaction_failed(tx.id(), "offline"));
        assert_eq!(tx.state(), TransactionState::Failed);
        assert_eq!(items.to_vec(), vec![item(1, 1)]);

        let log = log.borrow();
        let kinds: Vec<ChangeType> = log.iter().map(|m| m.change_type).collect();
        assert_eq!(
            kinds,
            vec![
                ChangeType::Insert,
                ChangeType::Insert,
                ChangeType::Delete,
                ChangeType::Delete,
                ChangeType::Insert
            ]
        );
        assert_eq!(log[4], ChangeMessage::insert(Value::Int64(1), item(1, 1)));
    }

    #[test]
    fn test_finished_transaction_rejects_work() {
        let (scheduler, items) = setup();
        let tx = Transaction::new(&scheduler);
        tx.rollback().unwrap();
        assert!(matches!(tx.rollback(), Err(Error::InvalidState { .. })));
        assert!(matches!(tx.commit_local(), Err(Error::InvalidState { .. })));
        assert!(matches!(tx.insert(&items, item(3, 1)), Err(Error::InvalidState { .. })));
    }

    #[test]
    fn test_duplicate_key_sees_pending_rows() {
        let (scheduler, items) = setup();
        let a = Transaction::new(&scheduler);
        a.insert(&items, item(2, 1)).unwrap();
        let b = Transaction::new(&scheduler);
        assert!(matches!(b.insert(&items, item(2, 2)), Err(Error::DuplicateKey { .. })));

        // rolling back `a` frees the key again
        a.rollback().unwrap();
        b.insert(&items, item(2, 2)).unwrap();
        b.commit_local().unwrap();
        assert_eq!(items.get(&Value::Int64(2)), Some(item(2, 2)));
    }
}
