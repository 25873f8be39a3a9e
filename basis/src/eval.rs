//! Collocation: basis-function values and gradients on point sets.
//!
//! Output layout is column-major `nbe × npts` (one column per grid point),
//! matching what the quadrature kernels consume directly.

extern crate nalgebra as na;

use crate::basis::BasisSet;
use crate::shell::{cart_component_norm, cart_components};
use na::{DMatrix, Vector3};

#[inline]
fn powi_or_zero(x: f64, n: i32) -> f64 {
    if n < 0 {
        0.0
    } else {
        x.powi(n)
    }
}

/// Evaluate φ_μ(r) for every shell in `shell_list` at every point, writing
/// into a caller-provided column-major `nbe × npts` buffer (arena slice).
pub fn eval_collocation_into(
    basis: &BasisSet,
    shell_list: &[usize],
    points: &[Vector3<f64>],
    out: &mut [f64],
) {
    let nbe = basis.nbf_subset(shell_list.iter().cloned());
    let npts = points.len();
    debug_assert!(out.len() >= nbe * npts);

    for (ipt, pt) in points.iter().enumerate() {
        let col = &mut out[ipt * nbe..(ipt + 1) * nbe];
        let mut row = 0;
        for &ish in shell_list {
            let sh = basis.shell(ish);
            let d = pt - sh.center;
            let r2 = d.norm_squared();
            let mut s0 = 0.0;
            for (&a, &c) in sh.alpha.iter().zip(sh.coeff.iter()) {
                s0 += c * (-a * r2).exp();
            }
            for (i, j, k) in cart_components(sh.l) {
                let ang = cart_component_norm(i, j, k)
                    * powi_or_zero(d.x, i)
                    * powi_or_zero(d.y, j)
                    * powi_or_zero(d.z, k);
                col[row] = ang * s0;
                row += 1;
            }
        }
    }
}

/// Evaluate φ_μ(r) for every shell in `shell_list` at every point.
pub fn eval_collocation(
    basis: &BasisSet,
    shell_list: &[usize],
    points: &[Vector3<f64>],
) -> DMatrix<f64> {
    let nbe = basis.nbf_subset(shell_list.iter().cloned());
    let npts = points.len();
    let mut bf = DMatrix::zeros(nbe, npts);
    eval_collocation_into(basis, shell_list, points, bf.as_mut_slice());
    bf
}

/// Evaluate φ_μ(r) and its cartesian gradient for every shell in
/// `shell_list` at every point, writing into caller-provided column-major
/// `nbe × npts` buffers `[φ, ∂xφ, ∂yφ, ∂zφ]`.
pub fn eval_collocation_gradient_into(
    basis: &BasisSet,
    shell_list: &[usize],
    points: &[Vector3<f64>],
    out: [&mut [f64]; 4],
) {
    let nbe = basis.nbf_subset(shell_list.iter().cloned());
    let [bf, dx, dy, dz] = out;

    for (ipt, pt) in points.iter().enumerate() {
        let off = ipt * nbe;
        let mut row = 0;
        for &ish in shell_list {
            let sh = basis.shell(ish);
            let d = pt - sh.center;
            let r2 = d.norm_squared();
            // s0 = Σ c e^{−αr²},  s1 = Σ c α e^{−αr²}
            let mut s0 = 0.0;
            let mut s1 = 0.0;
            for (&a, &c) in sh.alpha.iter().zip(sh.coeff.iter()) {
                let e = c * (-a * r2).exp();
                s0 += e;
                s1 += a * e;
            }
            for (i, j, k) in cart_components(sh.l) {
                let cn = cart_component_norm(i, j, k);
                let (px, py, pz) = (
                    powi_or_zero(d.x, i),
                    powi_or_zero(d.y, j),
                    powi_or_zero(d.z, k),
                );
                bf[off + row] = cn * px * py * pz * s0;
                // ∂x (x^i e^{−αr²}) = i x^{i−1} e − 2α x^{i+1} e
                dx[off + row] = cn
                    * py
                    * pz
                    * (i as f64 * powi_or_zero(d.x, i - 1) * s0 - 2.0 * powi_or_zero(d.x, i + 1) * s1);
                dy[off + row] = cn
                    * px
                    * pz
                    * (j as f64 * powi_or_zero(d.y, j - 1) * s0 - 2.0 * powi_or_zero(d.y, j + 1) * s1);
                dz[off + row] = cn
                    * px
                    * py
                    * (k as f64 * powi_or_zero(d.z, k - 1) * s0 - 2.0 * powi_or_zero(d.z, k + 1) * s1);
                row += 1;
            }
        }
    }
}

/// Evaluate φ_μ(r) and its cartesian gradient for every shell in
/// `shell_list` at every point. Returns `[φ, ∂xφ, ∂yφ, ∂zφ]`.
pub fn eval_collocation_gradient(
    basis: &BasisSet,
    shell_list: &[usize],
    points: &[Vector3<f64>],
) -> [DMatrix<f64>; 4] {
    let nbe = basis.nbf_subset(shell_list.iter().cloned());
    let npts = points.len();
    let mut bf = DMatrix::zeros(nbe, npts);
    let mut dx = DMatrix::zeros(nbe, npts);
    let mut dy = DMatrix::zeros(nbe, npts);
    let mut dz = DMatrix::zeros(nbe, npts);
    eval_collocation_gradient_into(
        basis,
        shell_list,
        points,
        [
            bf.as_mut_slice(),
            dx.as_mut_slice(),
            dy.as_mut_slice(),
            dz.as_mut_slice(),
        ],
    );
    [bf, dx, dy, dz]
}
