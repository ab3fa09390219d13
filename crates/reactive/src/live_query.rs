//! Live queries.
//!
//! A live query owns a private dataflow graph compiled from its query. Every
//! source collection feeds one graph input through a subscription; changes
//! arriving in a scheduler context schedule one recomputation job for that
//! context, which runs after the jobs of any live query this one reads from.
//! The job's output is written into a read-only result collection, so live
//! queries can be sources of other live queries.

use crate::change_set::ChangeSet;
use crate::collection::{Collection, SubscriptionHandle};
use crate::engine::Engine;
use crate::scheduler::{ContextId, JobId, ListenerId, Scheduler};
use crate::subscription::SubscribeOptions;
use alloc::format;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::fmt;
use core::mem;
use hashbrown::HashMap;
use rivulet_core::{Result, Value};
use rivulet_incremental::{Graph, Input, MultiSet, Multiplicity};
use rivulet_query::{compile_query, optimize_query, CompileInputs, LazyLoader, QueryIR, ResultRow, RowOrdering};

/// Configuration of a live query.
#[derive(Clone, Debug)]
pub struct LiveQueryConfig {
    /// Id of the result collection; generated if absent.
    pub id: Option<String>,
    pub query: QueryIR,
}

impl LiveQueryConfig {
    pub fn new(query: QueryIR) -> Self {
        Self { id: None, query }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

impl From<QueryIR> for LiveQueryConfig {
    fn from(query: QueryIR) -> Self {
        Self::new(query)
    }
}

/// Serves lazy-load requests of the compiled graph from a subscription.
#[derive(Default)]
struct SourceLoader {
    subscription: RefCell<Option<SubscriptionHandle>>,
}

impl LazyLoader for SourceLoader {
    fn load_keys(&self, path: &[String], keys: &[Value]) {
        let subscription = self.subscription.borrow().clone();
        if let Some(subscription) = subscription {
            if let Err(err) = subscription.load_keys(path, keys) {
                tracing::warn!(error = %err, "lazy load failed");
            }
        }
    }
}

struct SourceBinding {
    alias: String,
    collection: Collection,
    input: Input<(Value, Value)>,
    loader: Rc<SourceLoader>,
}

struct LiveQueryInner {
    id: String,
    job: JobId,
    scheduler: Scheduler,
    graph: Graph,
    sources: Vec<SourceBinding>,
    lazy_aliases: Vec<String>,
    ordering: RowOrdering,
    /// Parent live queries whose jobs must run first.
    dependencies: Vec<JobId>,
    output: Rc<RefCell<Vec<((Value, ResultRow), Multiplicity)>>>,
    rows: RefCell<HashMap<Value, (ResultRow, Multiplicity)>>,
    result: Collection,
    subscriptions: RefCell<Vec<SubscriptionHandle>>,
    listener: Cell<Option<ListenerId>>,
    ready: Cell<bool>,
    running: Cell<bool>,
    disposed: Cell<bool>,
    scheduled_in: Cell<Option<ContextId>>,
    runs: Cell<usize>,
}

impl LiveQueryInner {
    fn receive(self: &Rc<Self>, source: usize, changes: &ChangeSet) {
        if let Some(binding) = self.sources.get(source) {
            binding.input.send_data(changes.to_deltas());
            self.schedule();
        }
    }

    fn schedule(self: &Rc<Self>) {
        // before the first run everything is picked up by it; while running
        // the graph drains new input itself
        if !self.ready.get() || self.running.get() || self.disposed.get() {
            return;
        }
        let context = self.scheduler.current_context();
        if context.is_some() {
            self.scheduled_in.set(context);
        }
        let weak = Rc::downgrade(self);
        self.scheduler
            .schedule(context, self.job, Some(self.dependencies.clone()), move || {
                if let Some(query) = weak.upgrade() {
                    query.run();
                }
            });
    }

    fn on_context_cleared(&self, context: ContextId) {
        if self.scheduled_in.get() == Some(context) {
            self.run();
        }
    }

    fn run(&self) {
        if self.disposed.get() || self.running.replace(true) {
            return;
        }
        self.scheduled_in.set(None);
        self.graph.run();
        self.running.set(false);

        let output = mem::take(&mut *self.output.borrow_mut());
        let changes = self.apply_output(output);
        self.runs.set(self.runs.get() + 1);
        tracing::debug!(query = %self.id, run = self.runs.get(), changes = changes.len(), "live query run");
        if changes.is_empty() {
            return;
        }
        let mut sync = self.result.begin_sync();
        for change in &changes {
            sync.write(change.key.clone(), change.added().cloned());
        }
        if let Err(err) = sync.commit() {
            tracing::warn!(query = %self.id, error = %err, "failed to write live query result");
        }
    }

    /// Folds output deltas into the result rows and returns the keyed changes.
    fn apply_output(&self, output: Vec<((Value, ResultRow), Multiplicity)>) -> ChangeSet {
        let mut rows = self.rows.borrow_mut();
        let mut deltas = MultiSet::new();
        for ((key, row), m) in output {
            deltas.add((key.clone(), row.value.clone()), m);
            let count = {
                let entry = rows.entry(key.clone()).or_insert_with(|| (row.clone(), 0));
                if m > 0 {
                    entry.0 = row;
                }
                entry.1 += m;
                entry.1
            };
            if count == 0 {
                rows.remove(&key);
            }
        }
        ChangeSet::from_deltas(deltas)
    }

    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        for subscription in self.subscriptions.borrow_mut().drain(..) {
            subscription.unsubscribe();
        }
        for source in &self.sources {
            source.loader.subscription.borrow_mut().take();
        }
        if let Some(listener) = self.listener.take() {
            self.scheduler.remove_clear_listener(listener);
        }
        self.result.cleanup();
        tracing::debug!(query = %self.id, "live query disposed");
    }
}

impl Drop for LiveQueryInner {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// A handle to a running live query.
///
/// Clones refer to the same query. The query is maintained until `dispose`
/// is called or the last handle is dropped.
#[derive(Clone)]
pub struct LiveQuery {
    inner: Rc<LiveQueryInner>,
}

impl fmt::Debug for LiveQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveQuery")
            .field("id", &self.inner.id)
            .field("job", &self.inner.job)
            .field("rows", &self.len())
            .finish()
    }
}

impl LiveQuery {
    /// Compiles `config.query`, subscribes to its sources and runs it once.
    pub(crate) fn start(engine: &Engine, job: JobId, config: LiveQueryConfig) -> Result<Self> {
        let id = config.id.unwrap_or_else(|| format!("live-query-{}", job));
        let optimized = optimize_query(config.query);

        let graph = Graph::new();
        let mut inputs = CompileInputs::new();
        let mut sources = Vec::new();
        let mut dependencies = Vec::new();
        for (alias, collection_id) in optimized.query.collection_sources() {
            let collection = engine.collection(&collection_id)?;
            if let Some(parent) = collection.source_job() {
                if !dependencies.contains(&parent) {
                    dependencies.push(parent);
                }
            }
            let input = graph.new_input::<(Value, Value)>();
            let loader = Rc::new(SourceLoader::default());
            inputs = inputs
                .with_stream(&alias, input.stream().clone())
                .with_lazy_loader(&alias, loader.clone());
            sources.push(SourceBinding {
                alias,
                collection,
                input,
                loader,
            });
        }

        let compiled = compile_query(&optimized.query, &inputs)?;
        let output = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&output);
        compiled
            .output
            .output(move |batch| sink.borrow_mut().extend(batch.iter().cloned()));

        let result = Collection::derived(id.clone(), engine.scheduler(), job);
        engine.register(result.clone())?;

        let mut lazy_aliases: Vec<String> = compiled.lazy_aliases.iter().cloned().collect();
        lazy_aliases.sort();
        let inner = Rc::new(LiveQueryInner {
            id,
            job,
            scheduler: engine.scheduler().clone(),
            graph,
            sources,
            lazy_aliases,
            ordering: compiled.ordering.clone(),
            dependencies,
            output,
            rows: RefCell::new(HashMap::new()),
            result,
            subscriptions: RefCell::new(Vec::new()),
            listener: Cell::new(None),
            ready: Cell::new(false),
            running: Cell::new(false),
            disposed: Cell::new(false),
            scheduled_in: Cell::new(None),
            runs: Cell::new(0),
        });

        for (index, source) in inner.sources.iter().enumerate() {
            let options = SubscribeOptions {
                include_initial_state: !compiled.lazy_aliases.contains(&source.alias),
                where_expression: optimized
                    .source_where_clauses
                    .get(&source.alias)
                    .map(|expr| expr.strip_alias(&source.alias)),
            };
            let weak = Rc::downgrade(&inner);
            let handle = source.collection.subscribe_changes(
                move |changes| {
                    if let Some(query) = weak.upgrade() {
                        query.receive(index, changes);
                    }
                },
                options,
            )?;
            *source.loader.subscription.borrow_mut() = Some(handle.clone());
            inner.subscriptions.borrow_mut().push(handle);
        }

        let weak = Rc::downgrade(&inner);
        let listener = inner.scheduler.on_clear(move |context| {
            if let Some(query) = weak.upgrade() {
                query.on_context_cleared(context);
            }
        });
        inner.listener.set(Some(listener));

        inner.ready.set(true);
        inner.run();
        tracing::debug!(
            query = %inner.id,
            sources = inner.sources.len(),
            lazy = inner.lazy_aliases.len(),
            rows = inner.rows.borrow().len(),
            "live query started"
        );
        Ok(Self { inner })
    }

    /// Id of the result collection.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// The scheduler job id of this query.
    pub fn job_id(&self) -> JobId {
        self.inner.job
    }

    /// The read-only collection holding the result rows.
    pub fn collection(&self) -> &Collection {
        &self.inner.result
    }

    /// Aliases of the sources loaded by key on demand.
    pub fn lazy_sources(&self) -> &[String] {
        &self.inner.lazy_aliases
    }

    /// Number of times the query has been recomputed.
    pub fn run_count(&self) -> usize {
        self.inner.runs.get()
    }

    pub fn len(&self) -> usize {
        self.inner.rows.borrow().values().filter(|(_, m)| *m > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &Value) -> Option<Value> {
        self.inner
            .rows
            .borrow()
            .get(key)
            .filter(|(_, m)| *m > 0)
            .map(|(row, _)| row.value.clone())
    }

    /// `(key, row)` pairs in ORDER BY order, ties by key.
    pub fn entries(&self) -> Vec<(Value, Value)> {
        let rows = self.inner.rows.borrow();
        let mut entries: Vec<(&Value, &ResultRow)> = rows
            .iter()
            .filter(|(_, (_, m))| *m > 0)
            .map(|(key, (row, _))| (key, row))
            .collect();
        entries.sort_by(|(ak, a), (bk, b)| self.inner.ordering.compare(ak, a, bk, b));
        entries
            .into_iter()
            .map(|(key, row)| (key.clone(), row.value.clone()))
            .collect()
    }

    /// Result rows in ORDER BY order.
    pub fn to_vec(&self) -> Vec<Value> {
        self.entries().into_iter().map(|(_, row)| row).collect()
    }

    /// Subscribes to the changes of the result collection.
    pub fn subscribe_changes(
        &self,
        callback: impl Fn(&ChangeSet) + 'static,
        options: SubscribeOptions,
    ) -> Result<SubscriptionHandle> {
        self.inner.result.subscribe_changes(callback, options)
    }

    /// Stops maintaining the query and cleans up its result collection.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }
}
