//! Exchange (EK) screening.
//!
//! Two phases: per-task collocation bounds F_i^(k) = |P|·max_bfn and
//! max_bfn_sum (driver-provided), then a per-task collision of those
//! bounds with shell-pair Coulomb bounds. Significant shells are collected
//! in a packed 32-bit bitmap and expanded to a sorted list; significant
//! pairs are appended in canonical (i major, j ≤ i) order.

extern crate nalgebra as na;

use crate::driver::LocalWorkDriver;
use crate::task::XCTask;
use basis::{BasisSet, BasisSetMap};
use na::DMatrix;
use rayon::prelude::*;
use tracing::debug;

/// Per-task result of the pair-collision phase.
struct TaskSelection {
    shell_list: Vec<usize>,
    shell_pair_list: Vec<(usize, usize)>,
    nbe: usize,
}

/// Populate `cou_screening` for every task in `task_idx`.
///
/// `p_abs` is |P| (element-wise), `v_shell_max` the per-shell-pair
/// max-Coulomb bounds. A pair (i, j ≤ i) is significant iff
/// F_i·F_j·V_ij > eps_E  or  max(F_i, F_j)·V_ij·max_bfn_sum > eps_K.
#[allow(clippy::too_many_arguments)]
pub fn exx_ek_screening(
    basis: &BasisSet,
    basis_map: &BasisSetMap,
    p_abs: &DMatrix<f64>,
    v_shell_max: &DMatrix<f64>,
    eps_e: f64,
    eps_k: f64,
    lwd: &dyn LocalWorkDriver,
    tasks: &mut [XCTask],
    task_idx: &[usize],
) {
    let nshells = basis.nshells();
    let ntasks = task_idx.len();
    debug!("EK screening: ntasks = {}, eps_E = {:e}, eps_K = {:e}", ntasks, eps_e, eps_k);

    // Phase 1: per-task collocation statistics
    let stats = lwd.eval_ek_bfn_stats(basis, basis_map, tasks, task_idx);

    // Global collision: F[k, t] = Σ_j |P|[k, j] · bfn_max[j, t]
    let approx_f = p_abs * &stats.bfn_max;

    // Phase 2: per-task shell/pair selection
    let selections: Vec<TaskSelection> = (0..ntasks)
        .into_par_iter()
        .map(|it| {
            // Collapse F to shell level
            let mut f_shell = vec![0.0_f64; nshells];
            let mut ibf = 0;
            for (ish, fs) in f_shell.iter_mut().enumerate() {
                let sz = basis_map.shell_size(ish);
                let mut mx = 0.0_f64;
                for k in 0..sz {
                    mx = mx.max(approx_f[(ibf + k, it)].abs());
                }
                *fs = mx;
                ibf += sz;
            }

            let max_bf_sum = stats.max_bfn_sum[it];
            let nwords = nshells.div_ceil(32);
            let mut bitmap = vec![0u32; nwords];
            let mut shell_pair_list = Vec::new();
            for i in 0..nshells {
                for j in 0..=i {
                    let v_ij = v_shell_max[(i, j)];
                    let f_i = f_shell[i];
                    let f_j = f_shell[j];
                    let eps_e_cmp = f_i * f_j * v_ij;
                    let eps_k_cmp = f_i.max(f_j) * v_ij * max_bf_sum;
                    if eps_e_cmp > eps_e || eps_k_cmp > eps_k {
                        bitmap[i / 32] |= 1 << (i % 32);
                        bitmap[j / 32] |= 1 << (j % 32);
                        shell_pair_list.push((i, j));
                    }
                }
            }

            // Expand the bitmap to a sorted shell list
            let total: u32 = bitmap.iter().map(|w| w.count_ones()).sum();
            let mut shell_list = Vec::with_capacity(total as usize);
            for (iw, &word) in bitmap.iter().enumerate() {
                for ib in 0..32 {
                    if word & (1 << ib) != 0 {
                        shell_list.push(iw * 32 + ib);
                    }
                }
            }
            let nbe = basis.nbf_subset(shell_list.iter().cloned());
            TaskSelection {
                shell_list,
                shell_pair_list,
                nbe,
            }
        })
        .collect();

    for (it, sel) in selections.into_iter().enumerate() {
        let task = &mut tasks[task_idx[it]];
        task.cou_screening.shell_list = sel.shell_list;
        task.cou_screening.shell_pair_list = sel.shell_pair_list;
        task.cou_screening.nbe = sel.nbe;
    }
}
