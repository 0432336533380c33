//! Filter evaluation against [`PivotIndexes`]
//!
//! Each active filter produces a sorted candidate id set from its field's index; the
//! visible set is the intersection of all candidate sets. A filter whose field has no
//! index is treated as inactive rather than as "exclude everything", so a misconfigured
//! facet never blanks the result.

use crate::index::PivotIndexes;
use crate::set_ops::{intersect_sorted, union_many};
use crate::store::{ItemId, Store};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, instrument, trace};

/// Inclusive numeric range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericRange {
    pub min: f64,
    pub max: f64,
}

impl NumericRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Declarative filter over one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FilterSpec {
    /// Keep items whose value is one of `values`; inert when `values` is empty
    Categorical { field: String, values: BTreeSet<String> },
    /// Keep items whose value lies in `range`; inert when `range` is `None`
    Numeric { field: String, range: Option<NumericRange> },
}

impl FilterSpec {
    pub fn categorical<I, S>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FilterSpec::Categorical {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn numeric(field: impl Into<String>, min: f64, max: f64) -> Self {
        FilterSpec::Numeric { field: field.into(), range: Some(NumericRange::new(min, max)) }
    }

    pub fn field(&self) -> &str {
        match self {
            FilterSpec::Categorical { field, .. } | FilterSpec::Numeric { field, .. } => field,
        }
    }

    /// Whether the filter takes part in evaluation at all
    pub fn is_active(&self) -> bool {
        match self {
            FilterSpec::Categorical { values, .. } => !values.is_empty(),
            FilterSpec::Numeric { range, .. } => range.is_some(),
        }
    }

    /// Candidate ids for this filter, or `None` when the filter is inert or its field
    /// has no index of the matching kind
    pub fn candidates(&self, indexes: &PivotIndexes) -> Option<Vec<ItemId>> {
        match self {
            FilterSpec::Categorical { field, values } => {
                if values.is_empty() {
                    return None;
                }
                let index = indexes.categorical(field)?;
                Some(union_many(values.iter().filter_map(|value| index.ids_for(value))))
            }
            FilterSpec::Numeric { field, range } => {
                let range = range.as_ref()?;
                let index = indexes.numeric(field)?;
                let mut ids = index.ids_in_range(range.min, range.max).to_vec();
                // index order is by value; intersection needs id order
                ids.sort_unstable();
                Some(ids)
            }
        }
    }
}

/// Visible id set produced by [`apply_filters`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterResult {
    /// Strictly increasing ids surviving every active filter
    pub visible_ids: Vec<ItemId>,
    pub count: usize,
}

impl FilterResult {
    pub fn new(visible_ids: Vec<ItemId>) -> Self {
        let count = visible_ids.len();
        Self { visible_ids, count }
    }
}

/// Compute the visible id set for a list of filters
#[instrument(skip_all, fields(filter_count = filters.len()))]
pub fn apply_filters<T>(
    store: &Store<T>,
    indexes: &PivotIndexes,
    filters: &[FilterSpec],
) -> FilterResult {
    if filters.is_empty() {
        return FilterResult::new(store.ids().to_vec());
    }

    let mut visible: Option<Vec<ItemId>> = None;
    for filter in filters {
        let Some(candidates) = filter.candidates(indexes) else {
            trace!(field = filter.field(), "Filter inactive or field not indexed");
            continue;
        };

        let next = match visible {
            None => candidates,
            Some(current) => intersect_sorted(&current, &candidates),
        };
        let empty = next.is_empty();
        visible = Some(next);
        if empty {
            break;
        }
    }

    // no filter contributed a candidate set: nothing is filtered out
    let visible_ids = visible.unwrap_or_else(|| store.ids().to_vec());
    debug!(visible = visible_ids.len(), total = store.count(), "Applied filters");
    FilterResult::new(visible_ids)
}
