//! Messages exchanged across the execution boundary
//!
//! The protocol is transport-agnostic: every message is a serde-tagged enum, so it can
//! travel over an in-process channel (as the boundary does) or be encoded as JSON. The
//! store crosses as an array of `(name, field)` entries rather than a map.

use crate::filter::{FilterResult, FilterSpec};
use crate::grouping::{GroupSpec, GroupingResult};
use crate::index::PivotIndexes;
use crate::store::{Field, ItemId, Store};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Monotonically increasing request identifier
pub type RequestId = u64;

/// Logical operation kind; the unit of single-flight tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationKind {
    BuildIndexes,
    ApplyFilters,
    ComputeGrouping,
    Sort,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::BuildIndexes => "build_indexes",
            OperationKind::ApplyFilters => "apply_filters",
            OperationKind::ComputeGrouping => "compute_grouping",
            OperationKind::Sort => "sort",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Array-of-entries form of a store's columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMessage {
    pub count: usize,
    pub fields: Vec<(String, Field)>,
}

impl StoreMessage {
    /// Rebuild a store on the receiving side; items stay behind, so the store is `Store<()>`
    pub fn into_store(self) -> Store<()> {
        let items: Arc<[()]> = vec![(); self.count].into();
        Store::from_parts(self.fields.into_iter().collect(), items)
    }
}

impl<T> From<&Store<T>> for StoreMessage {
    fn from(store: &Store<T>) -> Self {
        Self {
            count: store.count(),
            fields: store.fields().iter().map(|(name, field)| (name.clone(), field.clone())).collect(),
        }
    }
}

/// Inbound to the worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum WorkerRequest {
    BuildIndexes { store: StoreMessage, fields: Vec<String> },
    ApplyFilters { filters: Vec<FilterSpec> },
    ComputeGrouping { visible_ids: Vec<ItemId>, group_by: GroupSpec },
    Sort { ids: Vec<ItemId>, sort_by: String },
}

impl WorkerRequest {
    pub fn kind(&self) -> OperationKind {
        match self {
            WorkerRequest::BuildIndexes { .. } => OperationKind::BuildIndexes,
            WorkerRequest::ApplyFilters { .. } => OperationKind::ApplyFilters,
            WorkerRequest::ComputeGrouping { .. } => OperationKind::ComputeGrouping,
            WorkerRequest::Sort { .. } => OperationKind::Sort,
        }
    }
}

/// Outbound from the worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WorkerResponse {
    IndexesReady { indexes: Arc<PivotIndexes> },
    FilterResult { result: FilterResult },
    GroupingResult { result: GroupingResult },
    SortResult { result: Vec<ItemId> },
    /// The worker hit an unrecoverable error and is shutting down
    Faulted { message: String },
}

impl WorkerResponse {
    /// The operation this response answers; `None` for a fault
    pub fn kind(&self) -> Option<OperationKind> {
        match self {
            WorkerResponse::IndexesReady { .. } => Some(OperationKind::BuildIndexes),
            WorkerResponse::FilterResult { .. } => Some(OperationKind::ApplyFilters),
            WorkerResponse::GroupingResult { .. } => Some(OperationKind::ComputeGrouping),
            WorkerResponse::SortResult { .. } => Some(OperationKind::Sort),
            WorkerResponse::Faulted { .. } => None,
        }
    }
}

/// A message tagged with its request id and the store generation it was issued against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<M> {
    pub request_id: RequestId,
    pub generation: u64,
    pub message: M,
}

impl<M> Envelope<M> {
    pub fn new(request_id: RequestId, generation: u64, message: M) -> Self {
        Self { request_id, generation, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FieldExtractors, build_store};

    #[test]
    fn store_crosses_as_entries() {
        let store = build_store(
            vec![(1.0, "a"), (2.0, "b")],
            &FieldExtractors::new()
                .with("n", |r: &(f64, &'static str)| r.0)
                .with("s", |r: &(f64, &'static str)| r.1),
        );
        let message = StoreMessage::from(&store);
        assert_eq!(message.count, 2);
        assert_eq!(message.fields.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(), vec!["n", "s"]);

        let rebuilt = message.into_store();
        assert_eq!(rebuilt.count(), 2);
        assert_eq!(rebuilt.ids(), store.ids());
        assert_eq!(rebuilt.fields(), store.fields());
    }

    #[test]
    fn wire_tags_are_camel_case() {
        let request = WorkerRequest::ComputeGrouping {
            visible_ids: vec![1, 2],
            group_by: GroupSpec::new("v").with_buckets(2),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["type"], "computeGrouping");
        assert_eq!(json["visibleIds"], serde_json::json!([1, 2]));
        assert_eq!(json["groupBy"]["buckets"], 2);
        assert_eq!(request.kind(), OperationKind::ComputeGrouping);

        let response = WorkerResponse::SortResult { result: vec![2, 1] };
        assert_eq!(serde_json::to_value(&response).unwrap()["type"], "sortResult");
        assert_eq!(response.kind(), Some(OperationKind::Sort));
    }
}
