//! Random selection over pooled slices.

use std::collections::HashMap;

use rand::Rng;

/// Draw `count` distinct positions from `0..n` with a partial Fisher-Yates
/// shuffle.
///
/// Swaps are tracked in a sparse map instead of a shuffled copy, so time and
/// space are O(count) regardless of `n`. `count` is clamped to `n`.
pub fn sample_indices<R: Rng + ?Sized>(rng: &mut R, n: usize, count: usize) -> Vec<usize> {
    let count = count.min(n);
    if count == 0 {
        return Vec::new();
    }

    let mut swaps: HashMap<usize, usize> = HashMap::with_capacity(count * 2);
    let mut picked = Vec::with_capacity(count);
    for i in 0..count {
        let j = rng.random_range(i..n);
        let at_j = swaps.get(&j).copied().unwrap_or(j);
        let at_i = swaps.get(&i).copied().unwrap_or(i);
        swaps.insert(j, at_i);
        picked.push(at_j);
    }
    picked
}

/// Clone `count` distinct-position elements of `items` in random order.
pub fn sample<T: Clone>(items: &[T], count: usize) -> Vec<T> {
    let mut rng = rand::rng();
    sample_indices(&mut rng, items.len(), count)
        .into_iter()
        .map(|index| items[index].clone())
        .collect()
}

/// One uniformly chosen element, or `None` for an empty slice.
pub fn choose<T: Clone>(items: &[T]) -> Option<T> {
    if items.is_empty() {
        return None;
    }
    let index = rand::rng().random_range(0..items.len());
    Some(items[index].clone())
}
