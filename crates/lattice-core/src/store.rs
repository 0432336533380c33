//! Columnar store construction
//!
//! A [`Store`] is built once per dataset from a set of named extractors. Every extractor
//! is run exactly once per item and its results are normalized into a dense column whose
//! kind is fixed by the first item. Later items that disagree with that kind are coerced
//! rather than rejected.

use lattice_types::{FieldKind, PivotValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Dense item identifier; ids are positions in the store's item array
pub type ItemId = u32;

/// Extractor closure producing one field value from an item
pub type Extractor<T> = Arc<dyn Fn(&T) -> PivotValue + Send + Sync>;

/// Ordered set of named field extractors
pub struct FieldExtractors<T> {
    extractors: Vec<(String, Extractor<T>)>,
}

impl<T> FieldExtractors<T> {
    /// Create an empty extractor set
    pub fn new() -> Self {
        Self { extractors: Vec::new() }
    }

    /// Register an extractor, replacing any earlier one with the same name
    pub fn insert<F, V>(&mut self, name: impl Into<String>, extractor: F)
    where
        T: 'static,
        F: Fn(&T) -> V + Send + Sync + 'static,
        V: Into<PivotValue> + 'static,
    {
        let name = name.into();
        let extractor: Extractor<T> = Arc::new(move |item: &T| extractor(item).into());
        match self.extractors.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = extractor,
            None => self.extractors.push((name, extractor)),
        }
    }

    /// Builder-style variant of [`FieldExtractors::insert`]
    pub fn with<F, V>(mut self, name: impl Into<String>, extractor: F) -> Self
    where
        T: 'static,
        F: Fn(&T) -> V + Send + Sync + 'static,
        V: Into<PivotValue> + 'static,
    {
        self.insert(name, extractor);
        self
    }

    /// Names of the registered fields in registration order
    pub fn names(&self) -> Vec<String> {
        self.extractors.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Extractor<T>)> {
        self.extractors.iter().map(|(name, extractor)| (name.as_str(), extractor))
    }
}

impl<T> Default for FieldExtractors<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for FieldExtractors<T> {
    fn clone(&self) -> Self {
        Self { extractors: self.extractors.clone() }
    }
}

impl<T> fmt::Debug for FieldExtractors<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldExtractors").field("fields", &self.names()).finish()
    }
}

/// One normalized column, parallel to the store's item ids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "values", rename_all = "camelCase")]
pub enum Field {
    /// Canonical string form of every value, including `"null"` for missing ones
    String(Vec<String>),
    /// `NaN` wherever the extracted value was not a number
    Number(Vec<f64>),
    /// `0` or `1`
    Boolean(Vec<u8>),
}

impl Field {
    fn with_capacity(kind: FieldKind, capacity: usize) -> Self {
        match kind {
            FieldKind::String => Field::String(Vec::with_capacity(capacity)),
            FieldKind::Number => Field::Number(Vec::with_capacity(capacity)),
            FieldKind::Boolean => Field::Boolean(Vec::with_capacity(capacity)),
        }
    }

    fn push(&mut self, value: &PivotValue) {
        match self {
            Field::String(values) => values.push(value.stringify()),
            Field::Number(values) => values.push(value.as_number()),
            Field::Boolean(values) => values.push(u8::from(value.is_truthy())),
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Field::String(_) => FieldKind::String,
            Field::Number(_) => FieldKind::Number,
            Field::Boolean(_) => FieldKind::Boolean,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Field::String(values) => values.len(),
            Field::Number(values) => values.len(),
            Field::Boolean(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read back the normalized value for an item id
    pub fn value(&self, id: ItemId) -> Option<PivotValue> {
        let idx = id as usize;
        match self {
            Field::String(values) => values.get(idx).map(|s| PivotValue::String(s.clone())),
            Field::Number(values) => values.get(idx).map(|n| PivotValue::Number(*n)),
            Field::Boolean(values) => values.get(idx).map(|b| PivotValue::Boolean(*b == 1)),
        }
    }

    pub fn as_strings(&self) -> Option<&[String]> {
        match self {
            Field::String(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_numbers(&self) -> Option<&[f64]> {
        match self {
            Field::Number(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_booleans(&self) -> Option<&[u8]> {
        match self {
            Field::Boolean(values) => Some(values),
            _ => None,
        }
    }
}

/// Columnar snapshot of a dataset
///
/// `items` is a read-only pass-through for rendering; nothing in the engine looks at it.
#[derive(Debug)]
pub struct Store<T> {
    count: usize,
    ids: Vec<ItemId>,
    fields: BTreeMap<String, Field>,
    items: Arc<[T]>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            count: self.count,
            ids: self.ids.clone(),
            fields: self.fields.clone(),
            items: Arc::clone(&self.items),
        }
    }
}

impl<T> Store<T> {
    /// Assemble a store from already-normalized columns
    ///
    /// Callers are responsible for every column having `items.len()` values.
    pub fn from_parts(fields: BTreeMap<String, Field>, items: Arc<[T]>) -> Self {
        let count = items.len();
        debug_assert!(fields.values().all(|field| field.len() == count));
        Self { count, ids: identity_ids(count), fields, items }
    }

    /// Number of items
    pub fn count(&self) -> usize {
        self.count
    }

    /// The identity id array `[0, 1, ..., count - 1]`
    pub fn ids(&self) -> &[ItemId] {
        &self.ids
    }

    pub fn fields(&self) -> &BTreeMap<String, Field> {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn item(&self, id: ItemId) -> Option<&T> {
        self.items.get(id as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Share the item array with another store
    pub fn shared_items(&self) -> Arc<[T]> {
        Arc::clone(&self.items)
    }
}

/// Build a columnar store from items and field extractors
#[instrument(skip_all)]
pub fn build_store<T>(items: impl Into<Arc<[T]>>, extractors: &FieldExtractors<T>) -> Store<T> {
    let items: Arc<[T]> = items.into();
    let count = items.len();
    assert!(u32::try_from(count).is_ok(), "store item count exceeds the u32 id space");
    debug!(item_count = count, field_count = extractors.len(), "Building pivot store");

    let mut fields = BTreeMap::new();
    for (name, extractor) in extractors.iter() {
        let mut values = items.iter().map(|item| extractor(item));

        // Kind is fixed by the first item; an empty dataset yields empty string columns
        let field = match values.next() {
            Some(first) => {
                let mut field = Field::with_capacity(first.kind(), count);
                field.push(&first);
                for value in values {
                    field.push(&value);
                }
                field
            }
            None => Field::String(Vec::new()),
        };

        debug!(field = name, kind = %field.kind(), "Built store column");
        fields.insert(name.to_string(), field);
    }

    Store::from_parts(fields, items)
}

pub(crate) fn identity_ids(count: usize) -> Vec<ItemId> {
    (0..count as ItemId).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Car {
        make: &'static str,
        price: Option<f64>,
        electric: bool,
    }

    fn cars() -> Vec<Car> {
        vec![
            Car { make: "volvo", price: Some(31_000.0), electric: false },
            Car { make: "tesla", price: None, electric: true },
            Car { make: "kia", price: Some(22_500.5), electric: true },
        ]
    }

    fn extractors() -> FieldExtractors<Car> {
        FieldExtractors::new()
            .with("make", |c: &Car| c.make)
            .with("price", |c: &Car| c.price)
            .with("electric", |c: &Car| c.electric)
    }

    #[test]
    fn builds_parallel_columns() {
        let store = build_store(cars(), &extractors());

        assert_eq!(store.count(), 3);
        assert_eq!(store.ids(), &[0, 1, 2]);
        assert!(store.fields().values().all(|f| f.len() == 3));

        assert_eq!(store.field("make").unwrap().kind(), FieldKind::String);
        assert_eq!(store.field("electric").unwrap().as_booleans().unwrap(), &[0, 1, 1]);

        let prices = store.field("price").unwrap().as_numbers().unwrap();
        assert_eq!(prices[0], 31_000.0);
        assert!(prices[1].is_nan());
        assert_eq!(store.item(2).unwrap().make, "kia");
    }

    #[test]
    fn kind_comes_from_first_item() {
        // first item has no price, so the whole column is a string column
        let mut items = cars();
        items.swap(0, 1);
        let store = build_store(items, &extractors());

        let prices = store.field("price").unwrap().as_strings().unwrap();
        assert_eq!(prices, &["null", "31000", "22500.5"]);
    }

    #[test]
    fn later_items_are_coerced_into_first_kind() {
        let items = vec![PivotValue::from(1.0), PivotValue::from("2"), PivotValue::from(true)];
        let store = build_store(items, &FieldExtractors::new().with("v", |v: &PivotValue| v.clone()));

        let values = store.field("v").unwrap().as_numbers().unwrap();
        assert_eq!(values[0], 1.0);
        assert!(values[1].is_nan());
        assert!(values[2].is_nan());
    }

    #[test]
    fn empty_dataset_yields_empty_string_columns() {
        let store = build_store(Vec::<Car>::new(), &extractors());
        assert_eq!(store.count(), 0);
        assert!(store.ids().is_empty());
        assert_eq!(store.field("price").unwrap().kind(), FieldKind::String);
        assert!(store.field("price").unwrap().is_empty());
    }

    #[test]
    fn reinserting_a_name_replaces_the_extractor() {
        let mut extractors = extractors();
        extractors.insert("make", |c: &Car| c.make.to_uppercase());
        assert_eq!(extractors.len(), 3);

        let store = build_store(cars(), &extractors);
        assert_eq!(store.field("make").unwrap().as_strings().unwrap()[0], "VOLVO");
    }
}
