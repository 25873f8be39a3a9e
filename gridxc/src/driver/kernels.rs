//! Per-task quadrature kernels shared by the work drivers.
//!
//! One task runs the fixed pipeline: pack → collocation → X-matrix →
//! U-variables → functional → weight fold → Z-matrix → rank-2k. The
//! drivers differ only in how tasks are executed (serially against the
//! shared arena, or fanned out with per-worker stacks).

extern crate nalgebra as na;

use crate::error::{GridXcError, Result};
use crate::functional::XcFunctional;
use crate::host_data::XCHostData;
use crate::spin::{
    deinterleave2, deinterleave3, interleave2, interleave3, DensityKind, KsScheme,
};
use crate::submat::SubmatMap;
use crate::task::XCTask;
use basis::eval::{eval_collocation_gradient_into, eval_collocation_into};
use basis::BasisSet;
use na::{DMatrix, DMatrixView, DMatrixViewMut};
use tracing::trace;

/// Execution phases of one task batch; a failed kernel short-circuits the
/// remaining phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    Ready,
    Packed,
    Collocated,
    XBuilt,
    UBuilt,
    FunctionalDone,
    ZBuilt,
    VAccumulated,
    Failed,
}

/// A task's sub-density: referenced in place inside the union density when
/// the task's AO support is one contiguous run, packed otherwise.
pub enum PackedDensity<'a> {
    InPlace(DMatrixView<'a, f64>),
    Packed(DMatrix<f64>),
}

impl PackedDensity<'_> {
    pub fn view(&self) -> DMatrixView<'_, f64> {
        match self {
            PackedDensity::InPlace(v) => *v,
            PackedDensity::Packed(m) => m.view((0, 0), (m.nrows(), m.ncols())),
        }
    }
}

/// Extract one task's sub-density from the packed union density.
pub fn pack_task_density<'a>(
    p_union: &'a DMatrix<f64>,
    task_map: &SubmatMap,
) -> PackedDensity<'a> {
    let nbe = task_map.nbe();
    if let Some(ibf) = task_map.ibf_begin() {
        PackedDensity::InPlace(p_union.view((ibf, ibf), (nbe, nbe)))
    } else {
        let mut sub = DMatrix::zeros(nbe, nbe);
        task_map.extract(p_union, &mut sub);
        PackedDensity::Packed(sub)
    }
}

/// One task's additions to the union-level accumulators.
pub struct XcTaskContribution {
    pub v: Vec<DMatrix<f64>>,
    pub exc: f64,
    pub nel: f64,
}

/// Run the quadrature pipeline for one task.
pub fn process_xc_task(
    basis: &BasisSet,
    task: &XCTask,
    p_task: &[PackedDensity<'_>],
    scheme: KsScheme,
    n_deriv: usize,
    func: &dyn XcFunctional,
    scratch: &mut XCHostData,
) -> Result<XcTaskContribution> {
    let npts = task.npts();
    let nbe = task.nbe();
    let nxn = nbe * npts;
    let shell_list = &task.bfn_screening.shell_list;
    let channels = scheme.channels();
    let mut phase = BatchPhase::Packed;

    if scratch.basis_eval.len() < (3 * n_deriv + 1) * nxn || scratch.eps.len() < npts {
        return Err(GridXcError::InternalState(format!(
            "scratch arena too small for task (npts = {npts}, nbe = {nbe})"
        )));
    }

    // Collocation
    if n_deriv == 0 {
        eval_collocation_into(basis, shell_list, &task.points, &mut scratch.basis_eval[..nxn]);
    } else {
        let (bf, rest) = scratch.basis_eval.split_at_mut(nxn);
        let (dx, rest) = rest.split_at_mut(nxn);
        let (dy, rest) = rest.split_at_mut(nxn);
        let dz = &mut rest[..nxn];
        eval_collocation_gradient_into(basis, shell_list, &task.points, [bf, dx, dy, dz]);
    }
    phase = BatchPhase::Collocated;
    trace!("phase {:?}", phase);

    // X-matrix and U-variables, one routed channel at a time
    for (ci, kind) in channels.iter().enumerate() {
        {
            let bf_view = DMatrixView::from_slice(&scratch.basis_eval[..nxn], nbe, npts);
            let mut x_view = DMatrixViewMut::from_slice(&mut scratch.xmat[..nxn], nbe, npts);
            x_view.gemm(1.0, &p_task[ci].view(), &bf_view, 0.0);
        }
        let den = match kind {
            DensityKind::S => &mut scratch.den_s,
            DensityKind::Z => &mut scratch.den_z,
            DensityKind::Y => &mut scratch.den_y,
            DensityKind::X => &mut scratch.den_x,
        };
        // ρ_c(i) = Σ_μ φ(μ,i)·X_c(μ,i)
        for i in 0..npts {
            let mut acc = 0.0;
            for mu in 0..nbe {
                acc += scratch.basis_eval[i * nbe + mu] * scratch.xmat[i * nbe + mu];
            }
            den[i] = acc;
        }
        if n_deriv > 0 {
            // ∇ρ_c,a(i) = 2 Σ_μ X_c(μ,i)·∂_aφ(μ,i)
            let dden = match kind {
                DensityKind::S => &mut scratch.dden_s,
                DensityKind::Z => &mut scratch.dden_z,
                _ => {
                    return Err(GridXcError::unsupported(
                        "gradient U-variables for transverse spin channels",
                    ))
                }
            };
            for a in 0..3 {
                let dbf = &scratch.basis_eval[(a + 1) * nxn..(a + 2) * nxn];
                for i in 0..npts {
                    let mut acc = 0.0;
                    for mu in 0..nbe {
                        acc += scratch.xmat[i * nbe + mu] * dbf[i * nbe + mu];
                    }
                    dden[a * npts + i] = 2.0 * acc;
                }
            }
        }
    }
    phase = BatchPhase::XBuilt;
    trace!("phase {:?}", phase);

    // Assemble functional inputs
    match scheme {
        KsScheme::Rks => {
            if n_deriv > 0 {
                for i in 0..npts {
                    let (dx, dy, dz) = (
                        scratch.dden_s[i],
                        scratch.dden_s[npts + i],
                        scratch.dden_s[2 * npts + i],
                    );
                    scratch.gamma[i] = dx * dx + dy * dy + dz * dz;
                }
            }
        }
        KsScheme::Uks => {
            for i in 0..npts {
                scratch.den_pos[i] = 0.5 * (scratch.den_s[i] + scratch.den_z[i]);
                scratch.den_neg[i] = 0.5 * (scratch.den_s[i] - scratch.den_z[i]);
            }
            interleave2(
                &scratch.den_pos[..npts],
                &scratch.den_neg[..npts],
                &mut scratch.den_pack[..2 * npts],
            );
            if n_deriv > 0 {
                for i in 0..npts {
                    let mut gpp = 0.0;
                    let mut gpm = 0.0;
                    let mut gmm = 0.0;
                    for a in 0..3 {
                        let du = 0.5 * (scratch.dden_s[a * npts + i] + scratch.dden_z[a * npts + i]);
                        let dd = 0.5 * (scratch.dden_s[a * npts + i] - scratch.dden_z[a * npts + i]);
                        gpp += du * du;
                        gpm += du * dd;
                        gmm += dd * dd;
                    }
                    scratch.gamma_pp[i] = gpp;
                    scratch.gamma_pm[i] = gpm;
                    scratch.gamma_mm[i] = gmm;
                }
                interleave3(
                    &scratch.gamma_pp[..npts],
                    &scratch.gamma_pm[..npts],
                    &scratch.gamma_mm[..npts],
                    &mut scratch.gamma_pack[..3 * npts],
                );
            }
        }
        KsScheme::Gks => {
            if n_deriv > 0 {
                return Err(GridXcError::unsupported("GKS beyond the LDA kernel"));
            }
            for i in 0..npts {
                let m = (scratch.den_z[i] * scratch.den_z[i]
                    + scratch.den_y[i] * scratch.den_y[i]
                    + scratch.den_x[i] * scratch.den_x[i])
                    .sqrt();
                scratch.den_pos[i] = 0.5 * (scratch.den_s[i] + m);
                scratch.den_neg[i] = 0.5 * (scratch.den_s[i] - m);
            }
            interleave2(
                &scratch.den_pos[..npts],
                &scratch.den_neg[..npts],
                &mut scratch.den_pack[..2 * npts],
            );
        }
    }
    phase = BatchPhase::UBuilt;
    trace!("phase {:?}", phase);

    // Functional kernel on (interleaved) U-variables
    let polarized = scheme != KsScheme::Rks;
    match (n_deriv, polarized) {
        (0, false) => func.eval_exc_vxc_lda(
            npts,
            &scratch.den_s[..npts],
            &mut scratch.eps[..npts],
            &mut scratch.vrho[..npts],
        ),
        (0, true) => func.eval_exc_vxc_lda_polar(
            npts,
            &scratch.den_pack[..2 * npts],
            &mut scratch.eps[..npts],
            &mut scratch.vrho[..2 * npts],
        ),
        (_, false) => func.eval_exc_vxc_gga(
            npts,
            &scratch.den_s[..npts],
            &scratch.gamma[..npts],
            &mut scratch.eps[..npts],
            &mut scratch.vrho[..npts],
            &mut scratch.vgamma[..npts],
        ),
        (_, true) => func.eval_exc_vxc_gga_polar(
            npts,
            &scratch.den_pack[..2 * npts],
            &scratch.gamma_pack[..3 * npts],
            &mut scratch.eps[..npts],
            &mut scratch.vrho[..2 * npts],
            &mut scratch.vgamma[..3 * npts],
        ),
    }
    phase = BatchPhase::FunctionalDone;
    trace!("phase {:?}", phase);

    // De-interleave the spin-resolved outputs
    if polarized {
        deinterleave2(
            &scratch.vrho[..2 * npts],
            &mut scratch.vrho_pos[..npts],
            &mut scratch.vrho_neg[..npts],
        );
        if n_deriv > 0 {
            deinterleave3(
                &scratch.vgamma[..3 * npts],
                &mut scratch.vgamma_pp[..npts],
                &mut scratch.vgamma_pm[..npts],
                &mut scratch.vgamma_mm[..npts],
            );
        }
    }

    // Weight fold
    for i in 0..npts {
        let w = task.weights[i];
        scratch.eps[i] *= w;
        if polarized {
            scratch.vrho_pos[i] *= w;
            scratch.vrho_neg[i] *= w;
            if n_deriv > 0 {
                scratch.vgamma_pp[i] *= w;
                scratch.vgamma_pm[i] *= w;
                scratch.vgamma_mm[i] *= w;
            }
        } else {
            scratch.vrho[i] *= w;
            if n_deriv > 0 {
                scratch.vgamma[i] *= w;
            }
        }
    }

    // Z-matrix and rank-2k per output channel
    let mut v_out = Vec::with_capacity(channels.len());
    for (ci, _kind) in channels.iter().enumerate() {
        for i in 0..npts {
            // point-wise factors (already weight-folded)
            let (fr, h) = zmat_point_factors(scratch, scheme, n_deriv, ci, i, npts);
            let bfcol = &scratch.basis_eval[i * nbe..(i + 1) * nbe];
            let zcol = &mut scratch.zmat[i * nbe..(i + 1) * nbe];
            for mu in 0..nbe {
                zcol[mu] = 0.5 * fr * bfcol[mu];
            }
            if n_deriv > 0 {
                for a in 0..3 {
                    let dbf = &scratch.basis_eval[(a + 1) * nxn + i * nbe..(a + 1) * nxn + (i + 1) * nbe];
                    for mu in 0..nbe {
                        zcol[mu] += h[a] * dbf[mu];
                    }
                }
            }
        }
        let bf_view = DMatrixView::from_slice(&scratch.basis_eval[..nxn], nbe, npts);
        let z_view = DMatrixView::from_slice(&scratch.zmat[..nxn], nbe, npts);
        let bt = bf_view.transpose();
        let zt = z_view.transpose();
        let mut v = DMatrix::zeros(nbe, nbe);
        v.gemm(1.0, &z_view, &bt, 0.0);
        v.gemm(1.0, &bf_view, &zt, 1.0);
        v_out.push(v);
    }
    phase = BatchPhase::ZBuilt;
    trace!("phase {:?}", phase);

    // Scalar accumulators: EXC from the folded ε against the scalar
    // density, N_el from the raw weights.
    let mut exc = 0.0;
    let mut nel = 0.0;
    for i in 0..npts {
        exc += scratch.eps[i] * scratch.den_s[i];
        nel += task.weights[i] * scratch.den_s[i];
    }
    phase = BatchPhase::VAccumulated;
    trace!("task complete in phase {:?}", phase);

    Ok(XcTaskContribution { v: v_out, exc, nel })
}

/// Collocation statistics of one task for the exchange screener:
/// (max_bfn_sum, per-AO maxima scattered to a full-basis column).
pub fn ek_bfn_stats_task(
    basis: &BasisSet,
    basis_map: &basis::BasisSetMap,
    task: &XCTask,
) -> (f64, Vec<f64>) {
    let b_list = &task.bfn_screening.shell_list;
    let bf = basis::eval::eval_collocation(basis, b_list, &task.points);
    let (nbe, npts) = (bf.nrows(), bf.ncols());

    // MBFS = max_i √w_i Σ_μ |B(μ,i)|
    let mut max_bfn_sum = 0.0_f64;
    for i in 0..npts {
        let mut acc = 0.0;
        for mu in 0..nbe {
            acc += bf[(mu, i)].abs();
        }
        max_bfn_sum = max_bfn_sum.max(task.weights[i].sqrt() * acc);
    }

    // per-bfn maxima over the grid
    let mut grid_max = vec![0.0_f64; nbe];
    for i in 0..npts {
        let sw = task.weights[i].sqrt();
        for mu in 0..nbe {
            grid_max[mu] = grid_max[mu].max(sw * bf[(mu, i)].abs());
        }
    }

    // scatter into the full-basis AO numbering
    let mut column = vec![0.0_f64; basis.nbf()];
    let mut local = 0;
    for &ish in b_list {
        let off = basis_map.shell_to_first_ao(ish);
        let sz = basis_map.shell_size(ish);
        column[off..off + sz].copy_from_slice(&grid_max[local..local + sz]);
        local += sz;
    }
    (max_bfn_sum, column)
}

/// Point-wise Z factors for one output channel: the density factor fρ and
/// the gradient vector h (GGA only), all weight-folded.
fn zmat_point_factors(
    scratch: &XCHostData,
    scheme: KsScheme,
    n_deriv: usize,
    ci: usize,
    i: usize,
    npts: usize,
) -> (f64, [f64; 3]) {
    match scheme {
        KsScheme::Rks => {
            let fr = scratch.vrho[i];
            let mut h = [0.0; 3];
            if n_deriv > 0 {
                for (a, ha) in h.iter_mut().enumerate() {
                    *ha = 2.0 * scratch.vgamma[i] * scratch.dden_s[a * npts + i];
                }
            }
            (fr, h)
        }
        KsScheme::Uks => {
            let vu = scratch.vrho_pos[i];
            let vd = scratch.vrho_neg[i];
            let sign = if ci == 0 { 1.0 } else { -1.0 };
            let fr = 0.5 * (vu + sign * vd);
            let mut h = [0.0; 3];
            if n_deriv > 0 {
                let (gpp, gpm, gmm) = (
                    scratch.vgamma_pp[i],
                    scratch.vgamma_pm[i],
                    scratch.vgamma_mm[i],
                );
                for (a, ha) in h.iter_mut().enumerate() {
                    let du = 0.5 * (scratch.dden_s[a * npts + i] + scratch.dden_z[a * npts + i]);
                    let dd = 0.5 * (scratch.dden_s[a * npts + i] - scratch.dden_z[a * npts + i]);
                    let hu = 2.0 * gpp * du + gpm * dd;
                    let hd = 2.0 * gmm * dd + gpm * du;
                    *ha = 0.5 * (hu + sign * hd);
                }
            }
            (fr, h)
        }
        KsScheme::Gks => {
            let vu = scratch.vrho_pos[i];
            let vd = scratch.vrho_neg[i];
            if ci == 0 {
                (0.5 * (vu + vd), [0.0; 3])
            } else {
                let m = (scratch.den_z[i] * scratch.den_z[i]
                    + scratch.den_y[i] * scratch.den_y[i]
                    + scratch.den_x[i] * scratch.den_x[i])
                    .sqrt();
                if m < 1e-14 {
                    (0.0, [0.0; 3])
                } else {
                    let comp = match ci {
                        1 => scratch.den_z[i],
                        2 => scratch.den_y[i],
                        _ => scratch.den_x[i],
                    };
                    (0.5 * (vu - vd) * comp / m, [0.0; 3])
                }
            }
        }
    }
}

