//! Merge-based set operations over sorted id arrays
//!
//! Every input must be strictly increasing; every output is strictly increasing.

use crate::store::ItemId;
use std::cmp::Ordering;

/// Intersect two sorted id arrays in `O(a.len() + b.len())`
pub fn intersect_sorted(a: &[ItemId], b: &[ItemId]) -> Vec<ItemId> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

/// Union two sorted id arrays in `O(a.len() + b.len())`
pub fn union_sorted(a: &[ItemId], b: &[ItemId]) -> Vec<ItemId> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            Ordering::Less => {
                out.push(a[i]);
                i += 1;
            }
            Ordering::Greater => {
                out.push(b[j]);
                j += 1;
            }
            Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

/// Union any number of sorted id arrays by folding [`union_sorted`]
pub fn union_many<'a, I>(arrays: I) -> Vec<ItemId>
where
    I: IntoIterator<Item = &'a [ItemId]>,
{
    arrays.into_iter().fold(Vec::new(), |acc, ids| {
        if acc.is_empty() { ids.to_vec() } else { union_sorted(&acc, ids) }
    })
}

/// Check the strictly-increasing invariant
pub fn is_strictly_increasing(ids: &[ItemId]) -> bool {
    ids.windows(2).all(|w| w[0] < w[1])
}
