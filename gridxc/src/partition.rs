//! Shell-batched partitioner.
//!
//! Re-partitions a range of grid tasks into device-sized sub-problems whose
//! union shell list stays under an AO budget. The overlap threshold against
//! the seed (largest-nbe) task is tuned adaptively: candidate thresholds
//! T(p) = max(1, |max_list|·p) for p = k/20, probed by an explicit binary
//! search over the candidates, caching (selection prefix, union) per probe
//! so a looser probe extends the last selection instead of rescanning.

use crate::task::{DeviceBatch, XCTask};
use basis::BasisSet;
use std::collections::BTreeSet;
use tracing::debug;

/// Size-imbalance ratio at which the intersection switches from the
/// synchronized two-pointer walk to binary probing of the larger list.
const SIZE_RATIO: usize = 100;

/// Number of threshold-probability subdivisions.
const N_OVERLAP_PTHRESH: usize = 20;

#[inline]
fn lower_bound(v: &[usize], key: usize) -> usize {
    v.partition_point(|&x| x < key)
}

/// True iff the sorted lists share at least one element.
pub fn list_intersect(a: &[usize], b: &[usize]) -> bool {
    list_intersect_at_least(a, b, 1)
}

/// True iff the sorted lists share at least `threshold` elements; the scan
/// short-circuits as soon as the count is reached.
pub fn list_intersect_at_least(a: &[usize], b: &[usize], threshold: usize) -> bool {
    if threshold == 0 {
        return true;
    }
    if threshold > a.len().min(b.len()) {
        return false;
    }

    let mut count = 0usize;

    // Query the smaller list against the much larger one
    if a.len() * SIZE_RATIO < b.len() {
        for &x in a {
            if b.binary_search(&x).is_ok() {
                count += 1;
                if count == threshold {
                    return true;
                }
            }
        }
        return false;
    }
    if b.len() * SIZE_RATIO < a.len() {
        for &x in b {
            if a.binary_search(&x).is_ok() {
                count += 1;
                if count == threshold {
                    return true;
                }
            }
        }
        return false;
    }

    // Comparable sizes: synchronized walk with lower_bound skipping
    let (mut ia, mut ib) = (0usize, 0usize);
    while ia < a.len() && ib < b.len() {
        if a[ia] < b[ib] {
            ia += lower_bound(&a[ia..], b[ib]);
        } else if b[ib] < a[ia] {
            ib += lower_bound(&b[ib..], a[ia]);
        } else {
            count += 1;
            ia += 1;
            ib += 1;
            if count == threshold {
                return true;
            }
        }
    }
    false
}

/// True iff sorted `b` is a subset of sorted `a`.
pub fn list_subset(a: &[usize], b: &[usize]) -> bool {
    let mut ia = 0usize;
    for &x in b {
        ia += lower_bound(&a[ia..], x);
        if ia >= a.len() || a[ia] != x {
            return false;
        }
        ia += 1;
    }
    true
}

/// Overlap threshold for probability `p` against a seed list length.
#[inline]
pub fn overlap_threshold(max_list_len: usize, p: f64) -> usize {
    (max_list_len as f64 * p).max(1.0) as usize
}

/// Grow a union from the seed by selecting, within `order[..]`, tasks whose
/// shell list intersects `seed_list` in at least `threshold` shells.
/// Selected tasks are swapped to the front of `order`; returns the
/// selection count. The union set is extended in place.
pub fn select_overlapping(
    tasks: &[XCTask],
    order: &mut [usize],
    seed_list: &[usize],
    threshold: usize,
    union_set: &mut BTreeSet<usize>,
) -> usize {
    let mut nsel = 0usize;
    for i in 0..order.len() {
        let t = &tasks[order[i]];
        if list_intersect_at_least(seed_list, &t.bfn_screening.shell_list, threshold) {
            order.swap(nsel, i);
            union_set.extend(t.bfn_screening.shell_list.iter().cloned());
            nsel += 1;
        }
    }
    nsel
}

struct ProbeCache {
    /// Last probed candidate index and its (selection count, union).
    idx: Option<usize>,
    nsel: usize,
    union_set: BTreeSet<usize>,
}

/// Generate the next device batch from `order[begin..]`.
///
/// Returns the batch and the new cursor. Invariant on the result: every
/// member task's shell list is a subset of the union, and either
/// nbf(union) < `nbf_threshold` or the union equals the single seed task's
/// shell list (degenerate case).
pub fn generate_device_batch(
    tasks: &[XCTask],
    order: &mut Vec<usize>,
    begin: usize,
    basis: &BasisSet,
    nbf_threshold: usize,
) -> (DeviceBatch, usize) {
    let work = &mut order[begin..];
    debug_assert!(!work.is_empty());

    // Seed with the largest-nbe task; move it to the front so every
    // candidate selection retains it.
    let imax = (0..work.len())
        .max_by_key(|&i| tasks[work[i]].nbe())
        .unwrap_or(0);
    work.swap(0, imax);
    let seed_list = tasks[work[0]].bfn_screening.shell_list.clone();
    let seed_set: BTreeSet<usize> = seed_list.iter().cloned().collect();

    // Candidate probabilities p_k = k/N, k = 1..N−1, probed in descending
    // candidate order: larger index = larger p = stricter threshold =
    // smaller union. pred(idx) = nbf(union(idx)) < budget is monotone
    // non-decreasing in idx, so an explicit lower-boundary binary search
    // replaces the original partition-point construction.
    let pthresh: Vec<f64> = (1..N_OVERLAP_PTHRESH)
        .map(|k| k as f64 / N_OVERLAP_PTHRESH as f64)
        .collect();

    let mut cache = ProbeCache {
        idx: None,
        nsel: 1,
        union_set: seed_set.clone(),
    };

    let probe = |cache: &mut ProbeCache, work: &mut [usize], idx: usize| -> (usize, usize) {
        let threshold = overlap_threshold(seed_list.len(), pthresh[idx]);
        let (start, union_set, base_nsel, scan_end) = match cache.idx {
            // Looser than the cached probe: previously selected tasks stay
            // selected, scan only the unselected suffix.
            Some(prev) if prev > idx => {
                (cache.nsel, cache.union_set.clone(), cache.nsel, work.len())
            }
            // Tighter probe: re-scan from the seed, restricted to the
            // previously selected prefix.
            Some(_) => (1, seed_set.clone(), 1, cache.nsel),
            None => (1, seed_set.clone(), 1, work.len()),
        };
        let mut union_set = union_set;
        let nsel_new = select_overlapping(
            tasks,
            &mut work[start..scan_end],
            &seed_list,
            threshold,
            &mut union_set,
        );
        let nsel = base_nsel + nsel_new;
        let nbe = basis.nbf_subset(union_set.iter().cloned());
        cache.idx = Some(idx);
        cache.nsel = nsel;
        cache.union_set = union_set;
        (nsel, nbe)
    };

    // Binary search for the smallest candidate index (loosest threshold)
    // whose union stays under budget.
    let (mut lo, mut hi) = (0usize, pthresh.len());
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let (_, nbe) = probe(&mut cache, work, mid);
        if nbe < nbf_threshold {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }

    let (nsel, union_set) = if lo == pthresh.len() {
        // Even the strictest threshold exceeds the budget: degenerate batch
        // of the seed task alone under its own shell list.
        (1usize, seed_set.clone())
    } else {
        if cache.idx != Some(lo) {
            probe(&mut cache, work, lo);
        }
        (cache.nsel, cache.union_set)
    };

    let union_list: Vec<usize> = union_set.into_iter().collect();

    // Subset pass: pull in any remaining task fully contained in the union
    // (no growth).
    let mut nsel = nsel;
    for i in nsel..work.len() {
        if list_subset(&union_list, &tasks[work[i]].bfn_screening.shell_list) {
            work.swap(nsel, i);
            nsel += 1;
        }
    }

    debug!(
        "device batch: {} tasks, union nshells = {}, nbe = {}",
        nsel,
        union_list.len(),
        basis.nbf_subset(union_list.iter().cloned())
    );

    let batch = DeviceBatch {
        task_idx: order[begin..begin + nsel].to_vec(),
        shell_list: union_list,
    };
    (batch, begin + nsel)
}
