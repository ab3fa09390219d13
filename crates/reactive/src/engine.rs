//! The engine: a registry of collections sharing one scheduler.

use crate::collection::{Collection, CollectionConfig, CollectionStatus};
use crate::live_query::{LiveQuery, LiveQueryConfig};
use crate::scheduler::{JobId, Scheduler};
use crate::transaction::Transaction;
use alloc::format;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use hashbrown::HashMap;
use rivulet_core::{Error, Result};

/// Entry point for creating collections, transactions and live queries.
///
/// Clones refer to the same engine.
#[derive(Clone, Default)]
pub struct Engine {
    scheduler: Scheduler,
    collections: Rc<RefCell<HashMap<String, Collection>>>,
    next_job: Rc<Cell<JobId>>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Creates and registers a collection.
    ///
    /// The id may reuse the id of a collection that was cleaned up.
    pub fn create_collection(&self, config: CollectionConfig) -> Result<Collection> {
        let collection = Collection::new(config, &self.scheduler);
        self.register(collection.clone())?;
        Ok(collection)
    }

    pub(crate) fn register(&self, collection: Collection) -> Result<()> {
        let id = collection.id();
        let mut collections = self.collections.borrow_mut();
        if let Some(existing) = collections.get(&id) {
            if existing.status() == CollectionStatus::Ready {
                return Err(Error::invalid_state(format!("collection `{}` already exists", id)));
            }
        }
        collections.insert(id, collection);
        Ok(())
    }

    /// Looks up a live collection by id.
    pub fn collection(&self, id: &str) -> Result<Collection> {
        self.collections
            .borrow()
            .get(id)
            .filter(|c| c.status() == CollectionStatus::Ready)
            .cloned()
            .ok_or_else(|| Error::collection_not_found(id))
    }

    /// Ids of the live collections, sorted.
    pub fn collection_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .collections
            .borrow()
            .iter()
            .filter(|(_, c)| c.status() == CollectionStatus::Ready)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Cleans up and unregisters a collection. Returns false if unknown.
    pub fn remove_collection(&self, id: &str) -> bool {
        let removed = self.collections.borrow_mut().remove(id);
        match removed {
            Some(collection) => {
                collection.cleanup();
                true
            }
            None => false,
        }
    }

    pub fn transaction(&self) -> Transaction {
        Transaction::new(&self.scheduler)
    }

    /// Starts a live query. Its result collection is registered under the
    /// query's id.
    pub fn live_query(&self, config: impl Into<LiveQueryConfig>) -> Result<LiveQuery> {
        let job = self.next_job.get() + 1;
        self.next_job.set(job);
        LiveQuery::start(self, job, config.into())
    }

    /// Runs every pending scheduled job.
    pub fn flush_all(&self) -> Result<()> {
        self.scheduler.flush_all()
    }
}
