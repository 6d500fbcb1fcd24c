//! Weight normalization.
//!
//! Turns arbitrary raw weights (possibly `NaN`, negative or `+inf`) into a
//! probability distribution in place.

/// Sums below `NEGLIGIBLE_PER_ITEM * count` are treated as zero.
const NEGLIGIBLE_PER_ITEM: f64 = 1e-9;

/// Normalize the weights of `items` in place so they sum to 1.
///
/// Rules, in order:
///
/// - `NaN` and negative weights count as zero.
/// - If any weight is `+inf`, each infinite item gets `1/k` (k = number of
///   infinite items) and every other item gets 0.
/// - If the remaining sum is negligible (including all zero), every item gets
///   `1/count`.
/// - Otherwise each item gets `max(0, w) / sum`. Finite weights whose sum
///   overflows are first scaled down by the largest of them.
///
/// An empty slice is left untouched.
pub fn normalize<T>(items: &mut [(T, f64)]) {
    let count = items.len();
    if count == 0 {
        return;
    }

    let infinite = items.iter().filter(|(_, w)| *w == f64::INFINITY).count();
    if infinite > 0 {
        let share = 1.0 / infinite as f64;
        for (_, w) in items.iter_mut() {
            *w = if *w == f64::INFINITY { share } else { 0.0 };
        }
        return;
    }

    let sum: f64 = items.iter().map(|(_, w)| sanitize(*w)).sum();
    if sum < NEGLIGIBLE_PER_ITEM * count as f64 {
        let share = 1.0 / count as f64;
        for (_, w) in items.iter_mut() {
            *w = share;
        }
        return;
    }

    let (scale, sum) = if sum.is_finite() {
        (1.0, sum)
    } else {
        let largest = items.iter().map(|(_, w)| sanitize(*w)).fold(0.0, f64::max);
        (largest, items.iter().map(|(_, w)| sanitize(*w) / largest).sum())
    };

    for (_, w) in items.iter_mut() {
        *w = sanitize(*w) / scale / sum;
    }
}

/// Normalize a bare weight vector. See [`normalize`].
pub fn normalized(weights: &[f64]) -> Vec<f64> {
    let mut items: Vec<((), f64)> = weights.iter().map(|w| ((), *w)).collect();
    normalize(&mut items);
    items.into_iter().map(|(_, w)| w).collect()
}

#[inline]
fn sanitize(w: f64) -> f64 {
    if w.is_nan() || w < 0.0 {
        0.0
    } else {
        w
    }
}
