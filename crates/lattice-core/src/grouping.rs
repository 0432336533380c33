//! Grouping of a visible id set by one field
//!
//! String (and boolean) fields are grouped categorically. Number fields are split into
//! equal-width buckets spanning the min/max of the *visible* values; empty buckets are
//! left out, so the result is sparse.

use crate::constants::grouping::{BUCKET_LABEL_PRECISION, DEFAULT_NUMERIC_BUCKETS};
use crate::index::PivotIndexes;
use crate::store::{Field, ItemId, Store};
use ahash::AHashMap;
use lattice_types::{PivotValue, format_fixed};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Group-by request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpec {
    pub field: String,
    /// Bucket count for number fields; ignored otherwise
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buckets: Option<usize>,
}

impl GroupSpec {
    pub fn new(field: impl Into<String>) -> Self {
        Self { field: field.into(), buckets: None }
    }

    pub fn with_buckets(mut self, buckets: usize) -> Self {
        self.buckets = Some(buckets);
        self
    }

    /// Effective bucket count; zero is treated as one bucket
    pub fn bucket_count(&self) -> usize {
        self.buckets.unwrap_or(DEFAULT_NUMERIC_BUCKETS).max(1)
    }
}

/// One group of ids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupResult {
    pub key: String,
    pub label: String,
    /// Category value, or the lower bound of a numeric bucket
    pub value: PivotValue,
    pub ids: Vec<ItemId>,
    pub count: usize,
}

impl GroupResult {
    fn new(key: String, label: String, value: PivotValue, ids: Vec<ItemId>) -> Self {
        let count = ids.len();
        Self { key, label, value, ids, count }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupingResult {
    pub groups: Vec<GroupResult>,
}

impl GroupingResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total ids across all groups
    pub fn total_count(&self) -> usize {
        self.groups.iter().map(|g| g.count).sum()
    }
}

/// Partition `visible_ids` by the field named in `group_by`
#[instrument(skip_all, fields(field = %group_by.field, visible = visible_ids.len()))]
pub fn compute_grouping<T>(
    store: &Store<T>,
    indexes: &PivotIndexes,
    visible_ids: &[ItemId],
    group_by: &GroupSpec,
) -> GroupingResult {
    let Some(field) = store.field(&group_by.field) else {
        debug!("Group-by field not found");
        return GroupingResult::empty();
    };

    let result = match field {
        Field::String(column) => {
            let ordered = indexes.categorical(&group_by.field).map(|index| index.values.as_slice());
            group_strings(column, ordered, visible_ids)
        }
        Field::Boolean(column) => group_booleans(column, visible_ids),
        Field::Number(column) => group_numbers(column, visible_ids, group_by.bucket_count()),
    };

    debug!(groups = result.groups.len(), "Computed grouping");
    result
}

fn group_strings(
    column: &[String],
    ordered_values: Option<&[String]>,
    visible_ids: &[ItemId],
) -> GroupingResult {
    let mut buckets: AHashMap<&str, Vec<ItemId>> = AHashMap::new();
    for &id in visible_ids {
        if let Some(value) = column.get(id as usize) {
            buckets.entry(value.as_str()).or_default().push(id);
        }
    }

    let mut groups = Vec::with_capacity(buckets.len());
    if let Some(values) = ordered_values {
        for value in values {
            if let Some(ids) = buckets.remove(value.as_str()) {
                groups.push(category_group(value, ids));
            }
        }
    }

    // keys the index does not know about (or every key, with no index) in sorted order
    let mut rest: Vec<(&str, Vec<ItemId>)> = buckets.into_iter().collect();
    rest.sort_unstable_by(|a, b| a.0.cmp(b.0));
    groups.extend(rest.into_iter().map(|(value, ids)| category_group(value, ids)));

    GroupingResult { groups }
}

fn category_group(value: &str, ids: Vec<ItemId>) -> GroupResult {
    GroupResult::new(value.to_string(), value.to_string(), PivotValue::from(value), ids)
}

fn group_booleans(column: &[u8], visible_ids: &[ItemId]) -> GroupingResult {
    let (mut falses, mut trues) = (Vec::new(), Vec::new());
    for &id in visible_ids {
        match column.get(id as usize) {
            Some(1) => trues.push(id),
            Some(_) => falses.push(id),
            None => {}
        }
    }

    let groups = [(false, falses), (true, trues)]
        .into_iter()
        .filter(|(_, ids)| !ids.is_empty())
        .map(|(flag, ids)| {
            GroupResult::new(flag.to_string(), flag.to_string(), PivotValue::Boolean(flag), ids)
        })
        .collect();
    GroupingResult { groups }
}

fn group_numbers(column: &[f64], visible_ids: &[ItemId], bucket_count: usize) -> GroupingResult {
    let values = || numeric_values(column, visible_ids);

    let (min, max) = values().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), (_, v)| {
        (lo.min(v), hi.max(v))
    });
    if !min.is_finite() || !max.is_finite() {
        return GroupingResult::empty();
    }

    let width = (max - min) / bucket_count as f64;
    if width == 0.0 {
        let ids: Vec<ItemId> = values().map(|(id, _)| id).collect();
        let label = bucket_label(min, max);
        return GroupingResult {
            groups: vec![GroupResult::new("0".to_string(), label, PivotValue::Number(min), ids)],
        };
    }

    let mut buckets: Vec<Vec<ItemId>> = vec![Vec::new(); bucket_count];
    for (id, v) in values() {
        // the top edge (v == max) would land one past the end
        let slot = (((v - min) / width).floor() as usize).min(bucket_count - 1);
        buckets[slot].push(id);
    }

    let groups = buckets
        .into_iter()
        .enumerate()
        .filter(|(_, ids)| !ids.is_empty())
        .map(|(slot, ids)| {
            let lower = min + slot as f64 * width;
            let upper = min + (slot + 1) as f64 * width;
            let label = bucket_label(lower, upper);
            GroupResult::new(slot.to_string(), label, PivotValue::Number(lower), ids)
        })
        .collect();
    GroupingResult { groups }
}

fn numeric_values<'a>(
    column: &'a [f64],
    visible_ids: &'a [ItemId],
) -> impl Iterator<Item = (ItemId, f64)> + 'a {
    visible_ids
        .iter()
        .filter_map(move |&id| column.get(id as usize).map(|v| (id, *v)))
        .filter(|(_, v)| !v.is_nan())
}

fn bucket_label(lower: f64, upper: f64) -> String {
    format!(
        "{} - {}",
        format_fixed(lower, BUCKET_LABEL_PRECISION),
        format_fixed(upper, BUCKET_LABEL_PRECISION)
    )
}
