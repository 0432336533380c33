//! Per-field indexes derived from a [`Store`]
//!
//! String columns get a [`CategoricalIndex`] (an inverted index from value to sorted ids);
//! number columns get a [`NumericIndex`] (values sorted ascending with a parallel id
//! array). Boolean columns are never indexed, and field names the store does not know
//! are skipped without complaint.

use crate::constants::memory::HASH_ENTRY_OVERHEAD_BYTES;
use crate::store::{Field, ItemId, Store};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// Inverted index for a string field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoricalIndex {
    /// Distinct value -> strictly increasing ids carrying it
    pub value_to_ids: BTreeMap<String, Vec<ItemId>>,
    /// Distinct values in sorted order
    pub values: Vec<String>,
}

impl CategoricalIndex {
    /// Build from a string column in one pass over the ids
    pub fn build(column: &[String]) -> Self {
        let mut buckets: AHashMap<&str, Vec<ItemId>> = AHashMap::new();
        for (id, value) in column.iter().enumerate() {
            // ids are visited in ascending order, so every bucket comes out sorted
            buckets.entry(value.as_str()).or_default().push(id as ItemId);
        }

        let mut values: Vec<String> = buckets.keys().map(|v| (*v).to_string()).collect();
        values.sort_unstable();

        let value_to_ids = buckets
            .into_iter()
            .map(|(value, mut ids)| {
                ids.shrink_to_fit();
                (value.to_string(), ids)
            })
            .collect();

        Self { value_to_ids, values }
    }

    /// Sorted ids for a value, if any item carries it
    pub fn ids_for(&self, value: &str) -> Option<&[ItemId]> {
        self.value_to_ids.get(value).map(Vec::as_slice)
    }

    pub fn distinct_count(&self) -> usize {
        self.values.len()
    }
}

/// Sorted index for a number field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericIndex {
    /// Non-NaN values, ascending
    pub values: Vec<f64>,
    /// `ids[i]` carries `values[i]`
    pub ids: Vec<ItemId>,
    /// Smallest value, `NaN` when the index is empty
    pub min: f64,
    /// Largest value, `NaN` when the index is empty
    pub max: f64,
}

impl NumericIndex {
    /// Build from a number column, dropping `NaN` entries
    pub fn build(column: &[f64]) -> Self {
        let mut pairs: Vec<(f64, ItemId)> = column
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_nan())
            .map(|(id, v)| (*v, id as ItemId))
            .collect();
        // stable sort keeps equal values in ascending id order
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let (min, max) = match (pairs.first(), pairs.last()) {
            (Some(first), Some(last)) => (first.0, last.0),
            _ => (f64::NAN, f64::NAN),
        };
        let (values, ids) = pairs.into_iter().unzip();

        Self { values, ids, min, max }
    }

    /// Ids whose value lies in `[min, max]`, in index (value) order
    pub fn ids_in_range(&self, min: f64, max: f64) -> &[ItemId] {
        if min.is_nan() || max.is_nan() || min > max {
            return &[];
        }
        let start = self.values.partition_point(|v| *v < min);
        let end = self.values.partition_point(|v| *v <= max);
        &self.ids[start..end.max(start)]
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// All indexes built for a store, keyed by field name and disjoint by field kind
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PivotIndexes {
    pub categorical: BTreeMap<String, CategoricalIndex>,
    pub numeric: BTreeMap<String, NumericIndex>,
}

impl PivotIndexes {
    pub fn categorical(&self, field: &str) -> Option<&CategoricalIndex> {
        self.categorical.get(field)
    }

    pub fn numeric(&self, field: &str) -> Option<&NumericIndex> {
        self.numeric.get(field)
    }

    /// Names of every indexed field
    pub fn indexed_fields(&self) -> Vec<String> {
        self.categorical.keys().chain(self.numeric.keys()).cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.categorical.is_empty() && self.numeric.is_empty()
    }

    /// Get statistics about the indexes
    pub fn stats(&self) -> IndexStats {
        let distinct_values = self.categorical.values().map(CategoricalIndex::distinct_count).sum();
        let categorical_refs: usize =
            self.categorical.values().flat_map(|idx| idx.value_to_ids.values()).map(Vec::len).sum();
        let numeric_refs: usize = self.numeric.values().map(NumericIndex::len).sum();

        IndexStats {
            categorical_fields: self.categorical.len(),
            numeric_fields: self.numeric.len(),
            distinct_values,
            total_id_refs: categorical_refs + numeric_refs,
            memory_usage_bytes: self.estimate_memory_usage(),
        }
    }

    /// Estimate memory usage of the indexes (rough calculation)
    fn estimate_memory_usage(&self) -> usize {
        let mut size = std::mem::size_of::<Self>();

        for (field, index) in &self.categorical {
            size += field.len() + std::mem::size_of::<CategoricalIndex>();
            for (value, ids) in &index.value_to_ids {
                // the key is stored twice: once in the map, once in `values`
                size += value.len() * 2 + HASH_ENTRY_OVERHEAD_BYTES;
                size += ids.len() * std::mem::size_of::<ItemId>();
            }
        }

        for (field, index) in &self.numeric {
            size += field.len() + std::mem::size_of::<NumericIndex>();
            size += index.len() * (std::mem::size_of::<f64>() + std::mem::size_of::<ItemId>());
        }

        size
    }
}

/// Statistics about the built indexes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    pub categorical_fields: usize,
    pub numeric_fields: usize,
    pub distinct_values: usize,
    pub total_id_refs: usize,
    pub memory_usage_bytes: usize,
}

impl IndexStats {
    /// Average ids per distinct categorical value
    pub fn avg_ids_per_value(&self) -> f64 {
        if self.distinct_values == 0 {
            0.0
        } else {
            self.total_id_refs as f64 / self.distinct_values as f64
        }
    }
}

/// Build indexes for the requested fields of a store
#[instrument(skip_all, fields(requested = field_names.len()))]
pub fn build_indexes<T>(store: &Store<T>, field_names: &[String]) -> PivotIndexes {
    let mut indexes = PivotIndexes::default();

    for name in field_names {
        match store.field(name) {
            Some(Field::String(column)) => {
                indexes.categorical.insert(name.clone(), CategoricalIndex::build(column));
            }
            Some(Field::Number(column)) => {
                indexes.numeric.insert(name.clone(), NumericIndex::build(column));
            }
            Some(Field::Boolean(_)) => {
                debug!(field = %name, "Boolean fields are not indexed");
            }
            None => {
                debug!(field = %name, "Skipping index for unknown field");
            }
        }
    }

    debug!(
        categorical = indexes.categorical.len(),
        numeric = indexes.numeric.len(),
        "Built pivot indexes"
    );
    indexes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::set_ops::{is_strictly_increasing, union_many};
    use crate::store::{FieldExtractors, build_store};

    #[derive(Debug)]
    struct Row {
        color: &'static str,
        size: f64,
        flag: bool,
    }

    fn store() -> Store<Row> {
        let rows = vec![
            Row { color: "red", size: 3.0, flag: true },
            Row { color: "blue", size: f64::NAN, flag: false },
            Row { color: "red", size: 1.0, flag: false },
            Row { color: "green", size: 3.0, flag: true },
            Row { color: "blue", size: 2.0, flag: true },
        ];
        let extractors = FieldExtractors::new()
            .with("color", |r: &Row| r.color)
            .with("size", |r: &Row| r.size)
            .with("flag", |r: &Row| r.flag);
        build_store(rows, &extractors)
    }

    fn all_fields() -> Vec<String> {
        ["color", "size", "flag", "missing"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn categorical_index_partitions_ids() {
        let store = store();
        let indexes = build_indexes(&store, &all_fields());
        let color = indexes.categorical("color").unwrap();

        assert_eq!(color.values, vec!["blue", "green", "red"]);
        assert_eq!(color.ids_for("red").unwrap(), &[0, 2]);
        assert_eq!(color.ids_for("blue").unwrap(), &[1, 4]);
        assert!(color.ids_for("purple").is_none());

        assert!(color.value_to_ids.values().all(|ids| is_strictly_increasing(ids)));
        let all = union_many(color.value_to_ids.values().map(Vec::as_slice));
        assert_eq!(all, store.ids());
    }

    #[test]
    fn numeric_index_sorts_and_drops_nan() {
        let indexes = build_indexes(&store(), &all_fields());
        let size = indexes.numeric("size").unwrap();

        assert_eq!(size.values, vec![1.0, 2.0, 3.0, 3.0]);
        assert_eq!(size.ids, vec![2, 4, 0, 3]);
        assert_eq!(size.min, 1.0);
        assert_eq!(size.max, 3.0);
        assert_eq!(size.ids_in_range(2.0, 3.0), &[4, 0, 3]);
        assert!(size.ids_in_range(3.5, 9.0).is_empty());
        assert!(size.ids_in_range(3.0, 1.0).is_empty());
        assert!(size.ids_in_range(f64::NAN, 1.0).is_empty());
    }

    #[test]
    fn boolean_and_unknown_fields_are_skipped() {
        let indexes = build_indexes(&store(), &all_fields());
        assert!(indexes.categorical("flag").is_none());
        assert!(indexes.numeric("flag").is_none());
        assert_eq!(indexes.indexed_fields(), vec!["color".to_string(), "size".to_string()]);
    }

    #[test]
    fn empty_numeric_index_has_nan_bounds() {
        let index = NumericIndex::build(&[f64::NAN, f64::NAN]);
        assert!(index.is_empty());
        assert!(index.min.is_nan() && index.max.is_nan());
    }

    #[test]
    fn stats_count_references() {
        let stats = build_indexes(&store(), &all_fields()).stats();
        assert_eq!(stats.categorical_fields, 1);
        assert_eq!(stats.numeric_fields, 1);
        assert_eq!(stats.distinct_values, 3);
        assert_eq!(stats.total_id_refs, 5 + 4);
        assert!(stats.memory_usage_bytes > 0);
        assert!(stats.avg_ids_per_value() > 0.0);
    }
}
