//! Reordering of id arrays by a field
//!
//! Sorting never touches the caller's array; it returns a new ordering. The sort is
//! stable, so ties keep their input order. Numbers place `NaN` last in both directions.

use crate::store::{Field, ItemId, Store};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: SortDirection::Ascending }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: SortDirection::Descending }
    }
}

/// Sort ids ascending by a field; an unknown field returns the ids unchanged
pub fn sort_ids<T>(store: &Store<T>, ids: &[ItemId], sort_by: &str) -> Vec<ItemId> {
    sort_ids_by(store, ids, &SortSpec::ascending(sort_by))
}

/// Sort ids by a field in the requested direction
#[instrument(skip_all, fields(field = %spec.field, id_count = ids.len()))]
pub fn sort_ids_by<T>(store: &Store<T>, ids: &[ItemId], spec: &SortSpec) -> Vec<ItemId> {
    let mut sorted = ids.to_vec();
    let Some(field) = store.field(&spec.field) else {
        debug!("Sort field not found, keeping input order");
        return sorted;
    };
    let descending = spec.direction == SortDirection::Descending;

    match field {
        Field::Number(column) => sorted.sort_by(|&a, &b| {
            compare_numbers(lookup(column, a), lookup(column, b), descending)
        }),
        Field::String(column) => sorted.sort_by(|&a, &b| {
            compare_present(column.get(a as usize), column.get(b as usize), descending, |x, y| {
                collate(x, y)
            })
        }),
        Field::Boolean(column) => sorted.sort_by(|&a, &b| {
            compare_present(column.get(a as usize), column.get(b as usize), descending, |x, y| {
                x.cmp(y)
            })
        }),
    }
    sorted
}

fn lookup(column: &[f64], id: ItemId) -> f64 {
    column.get(id as usize).copied().unwrap_or(f64::NAN)
}

fn compare_numbers(a: f64, b: f64, descending: bool) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            let ord = a.partial_cmp(&b).unwrap_or(Ordering::Equal);
            if descending { ord.reverse() } else { ord }
        }
    }
}

/// Ids without a value (out of range) sort after every present value
fn compare_present<V, F>(a: Option<&V>, b: Option<&V>, descending: bool, cmp: F) -> Ordering
where
    V: ?Sized,
    F: Fn(&V, &V) -> Ordering,
{
    match (a, b) {
        (Some(x), Some(y)) => {
            let ord = cmp(x, y);
            if descending { ord.reverse() } else { ord }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Locale-style string collation: case-insensitive first, then lowercase before
/// titlecase and uncased characters before uppercase, then raw byte order.
pub fn collate(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
        .then_with(|| a.chars().map(case_rank).cmp(b.chars().map(case_rank)))
        .then_with(|| a.cmp(b))
}

fn case_rank(c: char) -> u8 {
    if c.is_lowercase() {
        0
    } else if c.is_uppercase() {
        2
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FieldExtractors, build_store};

    #[derive(Debug)]
    struct Book {
        title: &'static str,
        pages: f64,
        signed: bool,
    }

    fn store() -> Store<Book> {
        let books = vec![
            Book { title: "banana", pages: 300.0, signed: true },
            Book { title: "Apple", pages: f64::NAN, signed: false },
            Book { title: "cherry", pages: 120.0, signed: true },
            Book { title: "apple", pages: 120.0, signed: false },
        ];
        let extractors = FieldExtractors::new()
            .with("title", |b: &Book| b.title)
            .with("pages", |b: &Book| b.pages)
            .with("signed", |b: &Book| b.signed);
        build_store(books, &extractors)
    }

    #[test]
    fn numbers_ascending_with_nan_last() {
        let store = store();
        let ids = vec![0, 1, 2, 3];
        assert_eq!(sort_ids(&store, &ids, "pages"), vec![2, 3, 0, 1]);
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn numbers_descending_keep_nan_last_and_ties_stable() {
        let store = store();
        let sorted = sort_ids_by(&store, &[3, 2, 1, 0], &SortSpec::descending("pages"));
        assert_eq!(sorted, vec![0, 3, 2, 1]);
    }

    #[test]
    fn strings_use_collation() {
        let store = store();
        assert_eq!(sort_ids(&store, &[0, 1, 2, 3], "title"), vec![3, 1, 0, 2]);
        assert_eq!(collate("a", "B"), Ordering::Less);
        assert_eq!(collate("b", "B"), Ordering::Less);
        assert_eq!(collate("Zeta", "alpha"), Ordering::Greater);
        assert_eq!(collate("aB", "Ab"), Ordering::Less);
    }

    #[test]
    fn collation_is_a_total_order_over_titlecase() {
        // lower, title and upper forms of the same digraph
        let forms = ["\u{01C6}", "\u{01C5}", "\u{01C4}", "dz", "Dz", "DZ"];

        for a in forms {
            assert_eq!(collate(a, a), Ordering::Equal);
            for b in forms {
                assert_eq!(collate(a, b), collate(b, a).reverse(), "{a} vs {b}");
                for c in forms {
                    if collate(a, b) == Ordering::Less && collate(b, c) == Ordering::Less {
                        assert_eq!(collate(a, c), Ordering::Less, "{a} < {b} < {c}");
                    }
                }
            }
        }

        assert_eq!(collate("\u{01C6}", "\u{01C5}"), Ordering::Less);
        assert_eq!(collate("\u{01C5}", "\u{01C4}"), Ordering::Less);

        let mut forward = forms.to_vec();
        let mut backward: Vec<&str> = forms.iter().rev().copied().collect();
        forward.sort_by(|a, b| collate(a, b));
        backward.sort_by(|a, b| collate(a, b));
        assert_eq!(forward, backward);
    }

    #[test]
    fn booleans_false_first() {
        let store = store();
        assert_eq!(sort_ids(&store, &[0, 1, 2, 3], "signed"), vec![1, 3, 0, 2]);
    }

    #[test]
    fn unknown_field_keeps_order() {
        let store = store();
        assert_eq!(sort_ids(&store, &[2, 0, 3], "isbn"), vec![2, 0, 3]);
    }
}
