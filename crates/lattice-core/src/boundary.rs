//! Execution boundary: asynchronous facade over the pivot engine
//!
//! Callers get `async` operations whether the work runs on a background worker or on
//! the calling thread. Each dispatched request carries a request id and the store
//! generation it was issued against; a response-pump thread routes worker replies back
//! to the awaiting caller through a oneshot channel.
//!
//! The boundary keeps its own in-process [`EngineSession`] built from the caller's
//! items. When the worker cannot be started, disconnects, reports a fault, or leaves a
//! response outstanding past the configured timeout, the boundary switches to
//! synchronous execution for good and answers every outstanding request locally.

use crate::config::{BoundaryConfig, ExecutionMode};
use crate::constants::boundary::RESPONSE_PUMP_THREAD_NAME;
use crate::error::{PivotError, PivotResult};
use crate::facets::FacetCount;
use crate::filter::{FilterResult, FilterSpec};
use crate::grouping::{GroupSpec, GroupingResult};
use crate::index::PivotIndexes;
use crate::protocol::{Envelope, OperationKind, RequestId, StoreMessage, WorkerRequest, WorkerResponse};
use crate::session::EngineSession;
use crate::store::{FieldExtractors, ItemId, Store, build_store};
use crate::worker::{PivotWorker, WorkerThread, spawn_worker};
use ahash::AHashMap;
use crossbeam::channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard};
use std::thread::{self, JoinHandle};
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, instrument, warn};

type Responder = oneshot::Sender<PivotResult<WorkerResponse>>;

/// A dispatched request waiting for its worker response
struct Pending {
    kind: OperationKind,
    generation: u64,
    /// Copy of the request for local replay; `None` for `BuildIndexes`, whose local
    /// answer is the boundary's own indexes
    replay: Option<WorkerRequest>,
    /// `None` when nobody awaits the answer (index builds only flip readiness)
    responder: Option<Responder>,
}

impl Pending {
    fn complete(self, outcome: PivotResult<WorkerResponse>) {
        if let Some(responder) = self.responder {
            // The caller may have stopped waiting; nothing to do then
            let _ = responder.send(outcome);
        }
    }
}

/// State shared between the boundary and its response pump
struct Shared<T> {
    local: RwLock<EngineSession<T>>,
    pending: Mutex<AHashMap<RequestId, Pending>>,
    generation: AtomicU64,
    faulted: AtomicBool,
    shutting_down: AtomicBool,
    grouping_in_flight: AtomicBool,
    ready: watch::Sender<bool>,
}

impl<T> Shared<T> {
    fn local(&self) -> RwLockReadGuard<'_, EngineSession<T>> {
        self.local.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn pending(&self) -> MutexGuard<'_, AHashMap<RequestId, Pending>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn is_faulted(&self) -> bool {
        self.faulted.load(Ordering::SeqCst)
    }

    fn answer_locally(&self, request: &WorkerRequest) -> WorkerResponse {
        self.local().answer(request)
    }

    /// Answer a pending request in-process, or reject it if the store moved on
    fn complete_locally(&self, pending: Pending) {
        let current = self.current_generation();
        if pending.generation != current {
            let error = PivotError::superseded(pending.kind.as_str(), pending.generation, current);
            pending.complete(Err(error));
            return;
        }

        let response = match &pending.replay {
            Some(request) => self.answer_locally(request),
            None => WorkerResponse::IndexesReady {
                indexes: self.local().indexes().cloned().unwrap_or_default(),
            },
        };
        if pending.kind == OperationKind::BuildIndexes {
            self.ready.send_replace(true);
        }
        pending.complete(Ok(response));
    }

    /// Route one worker response to whoever is waiting for it
    fn resolve(&self, envelope: Envelope<WorkerResponse>) {
        let Envelope { request_id, generation, message } = envelope;

        let Some(pending) = self.pending().remove(&request_id) else {
            warn!(request_id, kind = ?message.kind(), "Dropping worker response with no pending request");
            return;
        };

        if message.kind() != Some(pending.kind) {
            warn!(
                request_id,
                expected = %pending.kind,
                received = ?message.kind(),
                "Worker response does not match its request, answering locally"
            );
            self.complete_locally(pending);
            return;
        }

        let current = self.current_generation();
        if generation != current {
            debug!(request_id, generation, current, kind = %pending.kind, "Discarding stale worker response");
            let error = PivotError::superseded(pending.kind.as_str(), generation, current);
            pending.complete(Err(error));
            return;
        }

        if pending.kind == OperationKind::BuildIndexes {
            info!(generation, "Worker indexes ready");
            self.ready.send_replace(true);
        }
        pending.complete(Ok(message));
    }

    /// Switch permanently to synchronous execution and answer everything outstanding
    fn enter_fallback(&self, reason: &PivotError) {
        if !self.faulted.swap(true, Ordering::SeqCst) {
            warn!(error = %reason, category = reason.category(), "Pivot worker unavailable, switching to synchronous execution");
        }

        let drained: Vec<Pending> = self.pending().drain().map(|(_, pending)| pending).collect();
        if !drained.is_empty() {
            debug!(count = drained.len(), "Replaying pending requests locally");
        }
        for pending in drained {
            self.complete_locally(pending);
        }
        self.ready.send_replace(true);
    }
}

fn run_response_pump<T>(shared: Arc<Shared<T>>, responses: Receiver<Envelope<WorkerResponse>>) {
    for envelope in responses.iter() {
        if let WorkerResponse::Faulted { message } = &envelope.message {
            let error = PivotError::transport("worker", format!("worker faulted: {message}"));
            shared.enter_fallback(&error);
            continue;
        }
        shared.resolve(envelope);
    }

    if !shared.shutting_down.load(Ordering::SeqCst) {
        shared.enter_fallback(&PivotError::transport("worker", "response channel disconnected"));
    }
}

/// Running worker plus the thread that pumps its responses
struct WorkerLink {
    requests: Sender<Envelope<WorkerRequest>>,
    worker: JoinHandle<()>,
    pump: JoinHandle<()>,
}

impl WorkerLink {
    /// Close the request channel and join both threads; a faulted worker may be wedged,
    /// so its threads are detached instead
    fn shutdown(self, detach: bool) {
        drop(self.requests);
        if detach {
            debug!("Detaching faulted worker threads");
            return;
        }
        if self.worker.join().is_err() {
            warn!("Pivot worker thread panicked during shutdown");
        }
        if self.pump.join().is_err() {
            warn!("Response pump thread panicked during shutdown");
        }
    }
}

/// Clears the grouping single-flight flag when the call finishes or is dropped
struct GroupingGuard<'a>(&'a AtomicBool);

impl Drop for GroupingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Asynchronous pivot engine with worker dispatch and synchronous fallback
pub struct PivotBoundary<T: Send + Sync + 'static> {
    config: BoundaryConfig,
    shared: Arc<Shared<T>>,
    link: Option<WorkerLink>,
    next_request_id: AtomicU64,
    // held from reading (or bumping) the generation until the request is on the channel
    send_order: Mutex<()>,
}

impl<T: Send + Sync + 'static> PivotBoundary<T> {
    /// Create a boundary; in `Worker` mode this starts the default engine worker
    pub fn new(config: BoundaryConfig) -> Self {
        match config.execution_mode {
            ExecutionMode::Worker => Self::with_worker(config, EngineSession::<()>::new()),
            ExecutionMode::Synchronous => Self::build::<EngineSession<()>>(config, None),
        }
    }

    /// Create a boundary backed by a custom worker implementation
    ///
    /// Ignores `execution_mode`: the worker is always started.
    pub fn with_worker<W: PivotWorker>(config: BoundaryConfig, worker: W) -> Self {
        Self::build(config, Some(worker))
    }

    #[instrument(skip_all, fields(config = %config.description()))]
    fn build<W: PivotWorker>(config: BoundaryConfig, worker: Option<W>) -> Self {
        let (ready, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            local: RwLock::new(EngineSession::new()),
            pending: Mutex::new(AHashMap::new()),
            generation: AtomicU64::new(0),
            faulted: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            grouping_in_flight: AtomicBool::new(false),
            ready,
        });

        let link = worker.and_then(|worker| match Self::start_worker(&config, &shared, worker) {
            Ok(link) => Some(link),
            Err(error) => {
                shared.enter_fallback(&error);
                None
            }
        });

        info!(worker = link.is_some(), "Pivot boundary created");
        Self { config, shared, link, next_request_id: AtomicU64::new(1), send_order: Mutex::new(()) }
    }

    fn start_worker<W: PivotWorker>(
        config: &BoundaryConfig,
        shared: &Arc<Shared<T>>,
        worker: W,
    ) -> PivotResult<WorkerLink> {
        let WorkerThread { requests, responses, handle } =
            spawn_worker(worker, &config.worker_thread_name, config.channel_capacity)
                .map_err(|e| PivotError::transport("spawn_worker", e.to_string()))?;

        let pump_shared = Arc::clone(shared);
        let pump = thread::Builder::new()
            .name(RESPONSE_PUMP_THREAD_NAME.to_string())
            .spawn(move || run_response_pump(pump_shared, responses))
            .map_err(|e| PivotError::transport("spawn_response_pump", e.to_string()))?;

        Ok(WorkerLink { requests, worker: handle, pump })
    }

    /// Effective execution mode; a worker boundary reports `Synchronous` once it has fallen back
    pub fn mode(&self) -> ExecutionMode {
        if self.link.is_some() && !self.shared.is_faulted() {
            ExecutionMode::Worker
        } else {
            ExecutionMode::Synchronous
        }
    }

    pub fn config(&self) -> &BoundaryConfig {
        &self.config
    }

    /// Generation of the current store; bumped by every [`PivotBoundary::load`]
    pub fn generation(&self) -> u64 {
        self.shared.current_generation()
    }

    pub fn is_ready(&self) -> bool {
        *self.shared.ready.borrow()
    }

    pub fn store(&self) -> Option<Arc<Store<T>>> {
        self.shared.local().store().cloned()
    }

    pub fn indexes(&self) -> Option<Arc<PivotIndexes>> {
        self.shared.local().indexes().cloned()
    }

    /// Replace the dataset
    ///
    /// Builds the store and indexes in-process, then ships the columns to the worker.
    /// Readiness drops until the worker acknowledges its indexes; without a worker it is
    /// restored immediately. Returns the new store generation.
    #[instrument(skip_all, fields(index_fields = index_fields.len()))]
    pub fn load(
        &self,
        items: impl Into<Arc<[T]>>,
        extractors: &FieldExtractors<T>,
        index_fields: &[String],
    ) -> u64 {
        self.shared.ready.send_replace(false);

        let store = Arc::new(build_store(items, extractors));
        let message = self.active_link().map(|_| StoreMessage::from(store.as_ref()));

        let _order = self.send_order.lock().unwrap_or_else(PoisonError::into_inner);
        let generation = {
            let mut local = self.shared.local.write().unwrap_or_else(PoisonError::into_inner);
            local.load(Arc::clone(&store), index_fields);
            self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1
        };
        info!(generation, item_count = store.count(), "Dataset loaded");

        match (self.active_link(), message) {
            (Some(link), Some(store)) => {
                let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
                let pending = Pending {
                    kind: OperationKind::BuildIndexes,
                    generation,
                    replay: None,
                    responder: None,
                };
                let request = WorkerRequest::BuildIndexes { store, fields: index_fields.to_vec() };
                self.send(link, request_id, generation, pending, request);
            }
            _ => {
                self.shared.ready.send_replace(true);
            }
        }

        generation
    }

    /// Wait until the current generation's indexes are usable
    ///
    /// Falls back to synchronous execution if the worker does not acknowledge within
    /// the response timeout.
    pub async fn wait_until_ready(&self) {
        let mut ready = self.shared.ready.subscribe();
        match self.config.response_timeout {
            Some(limit) => {
                if tokio::time::timeout(limit, ready.wait_for(|r| *r)).await.is_err() {
                    let error =
                        PivotError::timeout(OperationKind::BuildIndexes.as_str(), limit.as_millis() as u64);
                    self.shared.enter_fallback(&error);
                }
            }
            None => {
                let _ = ready.wait_for(|r| *r).await;
            }
        }
    }

    /// Resolve filters to the visible id set
    pub async fn apply_filters(&self, filters: Vec<FilterSpec>) -> PivotResult<FilterResult> {
        match self.dispatch(WorkerRequest::ApplyFilters { filters }).await? {
            WorkerResponse::FilterResult { result } => Ok(result),
            other => Err(unexpected(OperationKind::ApplyFilters, &other)),
        }
    }

    /// Group the visible ids
    ///
    /// Only one grouping may be in flight; a concurrent call is rejected with an empty
    /// result. A `GroupSpec` without a bucket count uses the configured default.
    pub async fn compute_grouping(
        &self,
        visible_ids: Vec<ItemId>,
        mut group_by: GroupSpec,
    ) -> PivotResult<GroupingResult> {
        if self.shared.grouping_in_flight.swap(true, Ordering::SeqCst) {
            warn!(field = %group_by.field, "Grouping already in progress, ignoring request");
            return Ok(GroupingResult::empty());
        }
        let _guard = GroupingGuard(&self.shared.grouping_in_flight);

        if group_by.buckets.is_none() {
            group_by.buckets = Some(self.config.default_buckets);
        }
        match self.dispatch(WorkerRequest::ComputeGrouping { visible_ids, group_by }).await? {
            WorkerResponse::GroupingResult { result } => Ok(result),
            other => Err(unexpected(OperationKind::ComputeGrouping, &other)),
        }
    }

    /// Order ids by a field's values
    pub async fn sort_ids(&self, ids: Vec<ItemId>, sort_by: impl Into<String>) -> PivotResult<Vec<ItemId>> {
        match self.dispatch(WorkerRequest::Sort { ids, sort_by: sort_by.into() }).await? {
            WorkerResponse::SortResult { result } => Ok(result),
            other => Err(unexpected(OperationKind::Sort, &other)),
        }
    }

    /// Per-value counts for a categorical field; always computed in-process
    pub fn facet_counts(&self, visible_ids: &[ItemId], field: &str) -> Vec<FacetCount> {
        self.shared.local().facet_counts(visible_ids, field)
    }

    fn active_link(&self) -> Option<&WorkerLink> {
        self.link.as_ref().filter(|_| !self.shared.is_faulted())
    }

    /// Register `pending` and send `request`; a closed channel triggers fallback, which
    /// answers the just-registered request too
    fn send(
        &self,
        link: &WorkerLink,
        request_id: RequestId,
        generation: u64,
        pending: Pending,
        request: WorkerRequest,
    ) {
        let kind = pending.kind;
        self.shared.pending().insert(request_id, pending);

        if self.shared.is_faulted() {
            // Fallback may have drained the map before the insert landed
            if let Some(pending) = self.shared.pending().remove(&request_id) {
                self.shared.complete_locally(pending);
            }
            return;
        }

        debug!(request_id, generation, %kind, "Dispatching to worker");
        if let Err(e) = link.requests.send(Envelope::new(request_id, generation, request)) {
            self.shared.enter_fallback(&PivotError::transport(kind.as_str(), e.to_string()));
        }
    }

    #[instrument(skip_all, fields(kind = %request.kind()))]
    async fn dispatch(&self, request: WorkerRequest) -> PivotResult<WorkerResponse> {
        let Some(link) = self.active_link() else {
            return Ok(self.shared.answer_locally(&request));
        };

        let kind = request.kind();
        let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (responder, mut response) = oneshot::channel();
        {
            let _order = self.send_order.lock().unwrap_or_else(PoisonError::into_inner);
            let generation = self.shared.current_generation();
            let pending = Pending { kind, generation, replay: Some(request.clone()), responder: Some(responder) };
            self.send(link, request_id, generation, pending, request);
        }

        if let Some(limit) = self.config.response_timeout {
            match tokio::time::timeout(limit, &mut response).await {
                Ok(outcome) => return outcome.unwrap_or_else(|_| Err(closed(kind))),
                Err(_) => {
                    warn!(request_id, %kind, timeout_ms = limit.as_millis() as u64, "Worker response timed out");
                    self.shared.enter_fallback(&PivotError::timeout(kind.as_str(), limit.as_millis() as u64));
                }
            }
        }

        response.await.unwrap_or_else(|_| Err(closed(kind)))
    }
}

impl<T: Send + Sync + 'static> Drop for PivotBoundary<T> {
    fn drop(&mut self) {
        self.shared.shutting_down.store(true, Ordering::SeqCst);
        if let Some(link) = self.link.take() {
            link.shutdown(self.shared.is_faulted());
        }
    }
}

fn unexpected(kind: OperationKind, response: &WorkerResponse) -> PivotError {
    PivotError::internal_component(
        "boundary",
        format!("{kind} answered with {:?}", response.kind()),
    )
}

fn closed(kind: OperationKind) -> PivotError {
    PivotError::transport(kind.as_str(), "response dropped before completion")
}
