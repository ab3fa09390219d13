//! Context-scoped job scheduler.
//!
//! Jobs are grouped under a context (typically one transaction) and run
//! together when the context is flushed. Within a context a job id is unique:
//! scheduling it again replaces its run callback, so a live query touched by
//! several mutations recomputes once. A flush runs jobs in passes; each pass
//! runs every job none of whose dependencies is still pending.
//!
//! # Example
//!
//! ```
//! use rivulet_reactive::Scheduler;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let scheduler = Scheduler::new();
//! let ctx = scheduler.new_context();
//! let log = Rc::new(RefCell::new(Vec::new()));
//!
//! let l = log.clone();
//! scheduler.schedule(Some(ctx), 2, Some(vec![1]), move || l.borrow_mut().push("child"));
//! let l = log.clone();
//! scheduler.schedule(Some(ctx), 1, None, move || l.borrow_mut().push("parent"));
//!
//! scheduler.flush(ctx).unwrap();
//! assert_eq!(*log.borrow(), vec!["parent", "child"]);
//! ```

use alloc::boxed::Box;
use alloc::format;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;
use hashbrown::{HashMap, HashSet};
use rivulet_core::{Error, Result};

/// Identifies a batching boundary.
pub type ContextId = u64;

/// Identifies a job within a context.
pub type JobId = u64;

/// Identifies a registered clear listener.
pub type ListenerId = u64;

type JobFn = Box<dyn FnOnce()>;
type ClearListener = Rc<dyn Fn(ContextId)>;

struct PendingJob {
    dependencies: Vec<JobId>,
    run: JobFn,
}

#[derive(Default)]
struct ContextJobs {
    /// Scheduling order; ties between ready jobs are broken by it.
    order: Vec<JobId>,
    jobs: HashMap<JobId, PendingJob>,
}

impl ContextJobs {
    fn is_ready(&self, id: JobId) -> bool {
        self.jobs.get(&id).map_or(false, |job| {
            job.dependencies
                .iter()
                .all(|dep| *dep == id || !self.jobs.contains_key(dep))
        })
    }
}

#[derive(Default)]
struct SchedulerState {
    contexts: HashMap<ContextId, ContextJobs>,
    /// Contexts in order of first use, for `flush_all`.
    context_order: Vec<ContextId>,
    /// Issued contexts that have not been cleared.
    open: HashSet<ContextId>,
    current: Option<ContextId>,
    next_context: ContextId,
    listeners: Vec<(ListenerId, ClearListener)>,
    next_listener: ListenerId,
}

/// A shared handle to a job scheduler.
///
/// Clones refer to the same scheduler.
#[derive(Clone, Default)]
pub struct Scheduler {
    state: Rc<RefCell<SchedulerState>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a context id that has never been used.
    pub fn new_context(&self) -> ContextId {
        let mut state = self.state.borrow_mut();
        state.next_context += 1;
        let context = state.next_context;
        state.open.insert(context);
        context
    }

    /// The context whose work is currently being applied or flushed.
    pub fn current_context(&self) -> Option<ContextId> {
        self.state.borrow().current
    }

    /// Runs `f` with `context` as the current context.
    pub fn with_context<R>(&self, context: ContextId, f: impl FnOnce() -> R) -> R {
        let previous = self.state.borrow_mut().current.replace(context);
        let result = f();
        self.state.borrow_mut().current = previous;
        result
    }

    /// Schedules `run` as job `job` of `context`, or runs it now when there
    /// is no context.
    ///
    /// Re-scheduling a pending job replaces its callback; its dependencies
    /// are replaced only if new ones are given.
    pub fn schedule(
        &self,
        context: Option<ContextId>,
        job: JobId,
        dependencies: Option<Vec<JobId>>,
        run: impl FnOnce() + 'static,
    ) {
        let Some(context) = context else {
            run();
            return;
        };
        let mut state = self.state.borrow_mut();
        // scheduling reopens a cleared context
        state.open.insert(context);
        state.next_context = state.next_context.max(context);
        if !state.contexts.contains_key(&context) {
            state.context_order.push(context);
        }
        let bucket = state.contexts.entry(context).or_default();
        match bucket.jobs.get_mut(&job) {
            Some(pending) => {
                pending.run = Box::new(run);
                if let Some(dependencies) = dependencies {
                    pending.dependencies = dependencies;
                }
            }
            None => {
                bucket.order.push(job);
                bucket.jobs.insert(
                    job,
                    PendingJob {
                        dependencies: dependencies.unwrap_or_default(),
                        run: Box::new(run),
                    },
                );
            }
        }
        tracing::trace!(context, job, "scheduled job");
    }

    /// Returns true if `context` has jobs waiting for a flush.
    pub fn has_pending_jobs(&self, context: ContextId) -> bool {
        self.state
            .borrow()
            .contexts
            .get(&context)
            .map_or(false, |bucket| !bucket.order.is_empty())
    }

    /// Runs every job of `context` in dependency order, including jobs
    /// scheduled into it while flushing.
    ///
    /// Fails with `DependencyCycle` if a pass makes no progress; the
    /// remaining jobs stay pending. Flushing a cleared context is an
    /// invalid-state error.
    pub fn flush(&self, context: ContextId) -> Result<()> {
        if self.is_cleared(context) {
            return Err(Error::invalid_state(format!(
                "scheduler context {} was cleared",
                context
            )));
        }
        self.with_context(context, || self.run_passes(context))
    }

    fn is_cleared(&self, context: ContextId) -> bool {
        let state = self.state.borrow();
        context <= state.next_context && !state.open.contains(&context)
    }

    #[cfg(test)]
    pub(crate) fn open_context_count(&self) -> usize {
        self.state.borrow().open.len()
    }

    fn run_passes(&self, context: ContextId) -> Result<()> {
        let mut pass = 0usize;
        loop {
            let ready = {
                let mut state = self.state.borrow_mut();
                let exhausted = state
                    .contexts
                    .get(&context)
                    .map_or(true, |bucket| bucket.order.is_empty());
                if exhausted {
                    state.contexts.remove(&context);
                    state.context_order.retain(|c| *c != context);
                    return Ok(());
                }
                let Some(bucket) = state.contexts.get_mut(&context) else {
                    return Ok(());
                };
                let ready: Vec<JobId> = bucket
                    .order
                    .iter()
                    .copied()
                    .filter(|id| bucket.is_ready(*id))
                    .collect();
                if ready.is_empty() {
                    let pending = bucket.order.clone();
                    tracing::warn!(context, ?pending, "dependency cycle, flush made no progress");
                    return Err(Error::dependency_cycle(context, pending));
                }
                bucket.order.retain(|id| !ready.contains(id));
                ready
                    .iter()
                    .filter_map(|id| bucket.jobs.remove(id))
                    .map(|job| job.run)
                    .collect::<Vec<_>>()
            };
            pass += 1;
            tracing::trace!(context, pass, jobs = ready.len(), "scheduler pass");
            // the state borrow is released: jobs may schedule more work
            for run in ready {
                run();
            }
        }
    }

    /// Flushes every context with pending jobs, oldest first.
    pub fn flush_all(&self) -> Result<()> {
        loop {
            let next = {
                let state = self.state.borrow();
                state.context_order.first().copied()
            };
            match next {
                Some(context) => self.flush(context)?,
                None => return Ok(()),
            }
        }
    }

    /// Drops every pending job of `context` and notifies clear listeners.
    pub fn clear(&self, context: ContextId) {
        let listeners: Vec<ClearListener> = {
            let mut state = self.state.borrow_mut();
            state.contexts.remove(&context);
            state.context_order.retain(|c| *c != context);
            state.open.remove(&context);
            state.listeners.iter().map(|(_, l)| Rc::clone(l)).collect()
        };
        tracing::trace!(context, "cleared scheduler context");
        for listener in listeners {
            listener(context);
        }
    }

    /// Drops one pending job. Returns true if it was pending.
    pub fn clear_job(&self, context: ContextId, job: JobId) -> bool {
        let mut state = self.state.borrow_mut();
        let Some(bucket) = state.contexts.get_mut(&context) else {
            return false;
        };
        bucket.order.retain(|id| *id != job);
        bucket.jobs.remove(&job).is_some()
    }

    /// Registers a callback invoked with the id of every cleared context.
    pub fn on_clear(&self, listener: impl Fn(ContextId) + 'static) -> ListenerId {
        let mut state = self.state.borrow_mut();
        state.next_listener += 1;
        let id = state.next_listener;
        state.listeners.push((id, Rc::new(listener)));
        id
    }

    pub fn remove_clear_listener(&self, id: ListenerId) -> bool {
        let mut state = self.state.borrow_mut();
        let before = state.listeners.len();
        state.listeners.retain(|(l, _)| *l != id);
        state.listeners.len() != before
    }
}
