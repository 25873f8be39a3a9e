//! Exact-exchange (EK) task machinery.
//!
//! Per task, the semi-numerical exchange build runs
//! F(ν,i) = Σ_μ P(μ,ν)·B(μ,i) over the bfn/cou screened sub-blocks,
//! G(ν,i) = w_i Σ_λ A_{νλ}(r_i)·F(λ,i) through the batched shell-pair
//! kernel bank, and K_sub += B·Gᵀ scattered into the global K.

pub mod kernels;

extern crate nalgebra as na;

use crate::error::{GridXcError, Result};
use crate::submat::SubmatMap;
use crate::task::XCTask;
use basis::{BasisSet, BasisSetMap, ShellPair, ShellPairCollection};
use na::{DMatrix, Vector3};

/// One significant shell pair of a task, resolved against the cou-local AO
/// numbering.
pub struct PairWork<'a> {
    pub pair: &'a ShellPair,
    pub la: i32,
    pub lb: i32,
    pub off_a: usize,
    pub off_b: usize,
    pub na: usize,
    pub nb: usize,
    /// Shell paired with itself (i == j).
    pub diag: bool,
}

/// Mutable per-task state threaded through the exchange pipeline.
pub struct ExxTaskWork<'a> {
    pub points: &'a [Vector3<f64>],
    pub weights: &'a [f64],
    pub row_map: SubmatMap,
    pub col_map: SubmatMap,
    pub bf: DMatrix<f64>,
    pub fmat: DMatrix<f64>,
    pub gmat: DMatrix<f64>,
    pub pairs: Vec<PairWork<'a>>,
}

/// Build the per-task exchange state: asym-packed sub-density, collocation
/// and the F-matrix GEMM; G starts zeroed.
pub fn build_exx_task_work<'a>(
    basis: &BasisSet,
    basis_map: &BasisSetMap,
    task: &'a XCTask,
    p: &DMatrix<f64>,
    shell_pairs: &'a ShellPairCollection,
) -> Result<ExxTaskWork<'a>> {
    let b_list = &task.bfn_screening.shell_list;
    let c_list = &task.cou_screening.shell_list;
    if c_list.is_empty() {
        return Err(GridXcError::InternalState(
            "exchange task with empty cou shell list reached the dispatcher".into(),
        ));
    }
    let row_map = SubmatMap::new(b_list, basis_map);
    let col_map = SubmatMap::new(c_list, basis_map);
    let (nbe_bfn, nbe_cou) = (row_map.nbe(), col_map.nbe());
    let npts = task.npts();

    // P(bfn, cou) sub-block
    let mut psub = DMatrix::zeros(nbe_bfn, nbe_cou);
    row_map.extract_asym(&col_map, p, &mut psub);

    let bf = basis::eval::eval_collocation(basis, b_list, &task.points);

    // F(cou, i) = Σ_bfn P(bfn, cou)ᵀ · B(bfn, i)
    let mut fmat = DMatrix::zeros(nbe_cou, npts);
    fmat.gemm_tr(1.0, &psub, &bf, 0.0);

    // cou-local AO offsets per shell
    let mut cou_off = Vec::with_capacity(c_list.len());
    let mut off = 0;
    for &s in c_list {
        cou_off.push(off);
        off += basis_map.shell_size(s);
    }

    let mut pairs = Vec::with_capacity(task.cou_screening.shell_pair_list.len());
    for &(i, j) in &task.cou_screening.shell_pair_list {
        let Some(pair) = shell_pairs.at(i, j) else {
            continue; // overlap-screened pair carries no charge distribution
        };
        let pos_i = c_list
            .binary_search(&i)
            .map_err(|_| GridXcError::InternalState("pair shell missing from cou list".into()))?;
        let pos_j = c_list
            .binary_search(&j)
            .map_err(|_| GridXcError::InternalState("pair shell missing from cou list".into()))?;
        pairs.push(PairWork {
            pair,
            la: basis.shell(i).l,
            lb: basis.shell(j).l,
            off_a: cou_off[pos_i],
            off_b: cou_off[pos_j],
            na: basis.shell(i).size(),
            nb: basis.shell(j).size(),
            diag: i == j,
        });
    }

    Ok(ExxTaskWork {
        points: &task.points,
        weights: &task.weights,
        row_map,
        col_map,
        bf,
        fmat,
        gmat: DMatrix::zeros(nbe_cou, npts),
        pairs,
    })
}

/// K_task(bfn, cou) = B · Gᵀ after the kernel bank has filled G.
pub fn finish_exx_task(work: &ExxTaskWork<'_>) -> DMatrix<f64> {
    let mut k = DMatrix::zeros(work.row_map.nbe(), work.col_map.nbe());
    let gt = work.gmat.transpose();
    k.gemm(1.0, &work.bf, &gt, 0.0);
    k
}
