//! Batched two-electron kernel bank.
//!
//! One function per angular-momentum bucket, iterating every task of the
//! batch in order (the master-stream discipline: kernel launches are
//! strictly ordered with respect to each other). Diagonal kernels handle
//! shell pairs of a shell with itself; the (ℓA,ℓB) kernels handle distinct
//! shells, with `swap` selecting which orientation of the stored pair the
//! bucket covers. `max_prim_pairs` is the batch-wide primitive-pair
//! capacity every dispatched pair must respect. Quadrature weights are
//! folded inside the G accumulation.

use super::ExxTaskWork;
use basis::hermite::pair_potential_block;
use basis::BoysTable;

/// Accumulate one shell pair's potential into a task's G matrix.
fn accumulate_pair(
    work: &mut ExxTaskWork<'_>,
    ipair: usize,
    max_prim_pairs: usize,
    boys: &BoysTable,
) {
    let pw = &work.pairs[ipair];
    debug_assert!(
        pw.pair.nprim_pairs() <= max_prim_pairs,
        "shell pair exceeds the batch primitive-pair capacity"
    );
    let (na, nb) = (pw.na, pw.nb);
    let mut block = vec![0.0; na * nb];
    for (ipt, pt) in work.points.iter().enumerate() {
        block.fill(0.0);
        pair_potential_block(pw.la, pw.lb, pw.pair, pt, boys, &mut block);
        let w = work.weights[ipt];
        for a in 0..na {
            let fa = work.fmat[(pw.off_a + a, ipt)];
            for b in 0..nb {
                let v = w * block[a * nb + b];
                work.gmat[(pw.off_a + a, ipt)] += v * work.fmat[(pw.off_b + b, ipt)];
                if !pw.diag {
                    work.gmat[(pw.off_b + b, ipt)] += v * fa;
                }
            }
        }
    }
}

fn run_diag(l: i32, max_prim_pairs: usize, tasks: &mut [ExxTaskWork<'_>], boys: &BoysTable) {
    for work in tasks.iter_mut() {
        let idx: Vec<usize> = (0..work.pairs.len())
            .filter(|&i| work.pairs[i].diag && work.pairs[i].la == l)
            .collect();
        for i in idx {
            accumulate_pair(work, i, max_prim_pairs, boys);
        }
    }
}

fn run_offdiag(
    la: i32,
    lb: i32,
    swap: bool,
    max_prim_pairs: usize,
    tasks: &mut [ExxTaskWork<'_>],
    boys: &BoysTable,
) {
    let (want_a, want_b) = if swap { (lb, la) } else { (la, lb) };
    for work in tasks.iter_mut() {
        let idx: Vec<usize> = (0..work.pairs.len())
            .filter(|&i| {
                let p = &work.pairs[i];
                !p.diag && p.la == want_a && p.lb == want_b
            })
            .collect();
        for i in idx {
            accumulate_pair(work, i, max_prim_pairs, boys);
        }
    }
}

pub fn integral_0_task_batched(
    max_prim_pairs: usize,
    tasks: &mut [ExxTaskWork<'_>],
    boys: &BoysTable,
) {
    run_diag(0, max_prim_pairs, tasks, boys);
}

pub fn integral_1_task_batched(
    max_prim_pairs: usize,
    tasks: &mut [ExxTaskWork<'_>],
    boys: &BoysTable,
) {
    run_diag(1, max_prim_pairs, tasks, boys);
}

pub fn integral_2_task_batched(
    max_prim_pairs: usize,
    tasks: &mut [ExxTaskWork<'_>],
    boys: &BoysTable,
) {
    run_diag(2, max_prim_pairs, tasks, boys);
}

pub fn integral_0_0_task_batched(
    max_prim_pairs: usize,
    tasks: &mut [ExxTaskWork<'_>],
    boys: &BoysTable,
) {
    run_offdiag(0, 0, false, max_prim_pairs, tasks, boys);
}

pub fn integral_1_1_task_batched(
    max_prim_pairs: usize,
    tasks: &mut [ExxTaskWork<'_>],
    boys: &BoysTable,
) {
    run_offdiag(1, 1, false, max_prim_pairs, tasks, boys);
}

pub fn integral_2_2_task_batched(
    max_prim_pairs: usize,
    tasks: &mut [ExxTaskWork<'_>],
    boys: &BoysTable,
) {
    run_offdiag(2, 2, false, max_prim_pairs, tasks, boys);
}

pub fn integral_1_0_task_batched(
    swap: bool,
    max_prim_pairs: usize,
    tasks: &mut [ExxTaskWork<'_>],
    boys: &BoysTable,
) {
    run_offdiag(1, 0, swap, max_prim_pairs, tasks, boys);
}

pub fn integral_2_0_task_batched(
    swap: bool,
    max_prim_pairs: usize,
    tasks: &mut [ExxTaskWork<'_>],
    boys: &BoysTable,
) {
    run_offdiag(2, 0, swap, max_prim_pairs, tasks, boys);
}

pub fn integral_2_1_task_batched(
    swap: bool,
    max_prim_pairs: usize,
    tasks: &mut [ExxTaskWork<'_>],
    boys: &BoysTable,
) {
    run_offdiag(2, 1, swap, max_prim_pairs, tasks, boys);
}

/// Drive the full bank over a batch, guarding each bucket by the basis
/// max-ℓ exactly as the buckets are enumerated upstream.
pub fn dispatch_all(
    max_l: i32,
    max_prim_pairs: usize,
    tasks: &mut [ExxTaskWork<'_>],
    boys: &BoysTable,
) {
    integral_0_task_batched(max_prim_pairs, tasks, boys);
    if max_l > 0 {
        integral_1_task_batched(max_prim_pairs, tasks, boys);
    }
    if max_l > 1 {
        integral_2_task_batched(max_prim_pairs, tasks, boys);
    }

    integral_0_0_task_batched(max_prim_pairs, tasks, boys);
    if max_l > 0 {
        integral_1_1_task_batched(max_prim_pairs, tasks, boys);
    }
    if max_l > 1 {
        integral_2_2_task_batched(max_prim_pairs, tasks, boys);
    }

    if max_l > 0 {
        integral_1_0_task_batched(true, max_prim_pairs, tasks, boys);
        integral_1_0_task_batched(false, max_prim_pairs, tasks, boys);
    }
    if max_l > 1 {
        integral_2_0_task_batched(true, max_prim_pairs, tasks, boys);
        integral_2_0_task_batched(false, max_prim_pairs, tasks, boys);
        integral_2_1_task_batched(true, max_prim_pairs, tasks, boys);
        integral_2_1_task_batched(false, max_prim_pairs, tasks, boys);
    }
}
