//! Per-value counts over a visible id set, for rendering filter panels

use crate::index::PivotIndexes;
use crate::set_ops::intersect_sorted;
use crate::store::{ItemId, Store};
use serde::{Deserialize, Serialize};
use tracing::instrument;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetCount {
    pub value: String,
    /// Visible ids carrying `value`
    pub count: usize,
    /// Ids carrying `value` across the whole store
    pub total: usize,
}

/// Count, for every distinct value of an indexed categorical field, how many of the
/// (sorted) `visible_ids` carry it. Values with no visible ids are kept with a zero count.
#[instrument(skip_all, fields(field = %field))]
pub fn facet_counts<T>(
    store: &Store<T>,
    indexes: &PivotIndexes,
    visible_ids: &[ItemId],
    field: &str,
) -> Vec<FacetCount> {
    let Some(index) = indexes.categorical(field) else {
        return Vec::new();
    };
    let everything_visible = visible_ids.len() == store.count();

    index
        .values
        .iter()
        .filter_map(|value| {
            let ids = index.ids_for(value)?;
            let count = if everything_visible {
                ids.len()
            } else {
                intersect_sorted(ids, visible_ids).len()
            };
            Some(FacetCount { value: value.clone(), count, total: ids.len() })
        })
        .collect()
}
