//! Engine session: the store/index pair an executor works against
//!
//! Both sides of the execution boundary own one. The worker keeps an
//! `EngineSession<()>` populated by `BuildIndexes` messages; the boundary keeps an
//! `EngineSession<T>` with the caller's items for in-process fallback.

use crate::facets::{FacetCount, facet_counts};
use crate::filter::{FilterResult, FilterSpec, apply_filters};
use crate::grouping::{GroupSpec, GroupingResult, compute_grouping};
use crate::index::{PivotIndexes, build_indexes};
use crate::protocol::{WorkerRequest, WorkerResponse};
use crate::sort::sort_ids;
use crate::store::{ItemId, Store};
use std::sync::Arc;
use tracing::{debug, instrument};

#[derive(Debug)]
pub struct EngineSession<T> {
    store: Option<Arc<Store<T>>>,
    indexes: Option<Arc<PivotIndexes>>,
}

impl<T> Default for EngineSession<T> {
    fn default() -> Self {
        Self { store: None, indexes: None }
    }
}

impl<T> Clone for EngineSession<T> {
    fn clone(&self) -> Self {
        Self { store: self.store.clone(), indexes: self.indexes.clone() }
    }
}

impl<T> EngineSession<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the session's store and build indexes for `fields`
    pub fn load(&mut self, store: Arc<Store<T>>, fields: &[String]) -> Arc<PivotIndexes> {
        let indexes = Arc::new(build_indexes(&store, fields));
        self.store = Some(store);
        self.indexes = Some(Arc::clone(&indexes));
        indexes
    }

    pub fn store(&self) -> Option<&Arc<Store<T>>> {
        self.store.as_ref()
    }

    pub fn indexes(&self) -> Option<&Arc<PivotIndexes>> {
        self.indexes.as_ref()
    }

    pub fn is_loaded(&self) -> bool {
        self.store.is_some()
    }

    /// Filters against the loaded store; with nothing loaded the visible set is empty
    pub fn apply_filters(&self, filters: &[FilterSpec]) -> FilterResult {
        match (&self.store, &self.indexes) {
            (Some(store), Some(indexes)) => apply_filters(store, indexes, filters),
            _ => FilterResult::default(),
        }
    }

    pub fn compute_grouping(&self, visible_ids: &[ItemId], group_by: &GroupSpec) -> GroupingResult {
        match (&self.store, &self.indexes) {
            (Some(store), Some(indexes)) => compute_grouping(store, indexes, visible_ids, group_by),
            _ => GroupingResult::empty(),
        }
    }

    pub fn sort_ids(&self, ids: &[ItemId], sort_by: &str) -> Vec<ItemId> {
        match &self.store {
            Some(store) => sort_ids(store, ids, sort_by),
            None => ids.to_vec(),
        }
    }

    pub fn facet_counts(&self, visible_ids: &[ItemId], field: &str) -> Vec<FacetCount> {
        match (&self.store, &self.indexes) {
            (Some(store), Some(indexes)) => facet_counts(store, indexes, visible_ids, field),
            _ => Vec::new(),
        }
    }

    /// Answer a query request locally; `BuildIndexes` is answered from the already-loaded
    /// indexes since this side's store was built from the caller's items directly
    pub fn answer(&self, request: &WorkerRequest) -> WorkerResponse {
        match request {
            WorkerRequest::BuildIndexes { .. } => WorkerResponse::IndexesReady {
                indexes: self.indexes.clone().unwrap_or_default(),
            },
            WorkerRequest::ApplyFilters { filters } => {
                WorkerResponse::FilterResult { result: self.apply_filters(filters) }
            }
            WorkerRequest::ComputeGrouping { visible_ids, group_by } => {
                WorkerResponse::GroupingResult { result: self.compute_grouping(visible_ids, group_by) }
            }
            WorkerRequest::Sort { ids, sort_by } => {
                WorkerResponse::SortResult { result: self.sort_ids(ids, sort_by) }
            }
        }
    }
}

impl EngineSession<()> {
    /// Worker-side dispatch: `BuildIndexes` rebuilds the session from the message,
    /// everything else is answered against the current session
    #[instrument(skip_all, fields(kind = %request.kind()))]
    pub fn handle(&mut self, request: WorkerRequest) -> WorkerResponse {
        match request {
            WorkerRequest::BuildIndexes { store, fields } => {
                let store = Arc::new(store.into_store());
                debug!(item_count = store.count(), fields = fields.len(), "Worker rebuilding indexes");
                let indexes = self.load(store, &fields);
                WorkerResponse::IndexesReady { indexes }
            }
            other => self.answer(&other),
        }
    }
}
