//! Contracted cartesian Gaussian shells.

extern crate nalgebra as na;

use na::Vector3;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Number of cartesian components of an angular momentum ℓ shell.
#[inline]
pub fn ncart(l: i32) -> usize {
    ((l + 1) * (l + 2) / 2) as usize
}

/// Cartesian component exponents (i, j, k) with i + j + k = ℓ, in the
/// conventional lexicographic order: xx, xy, xz, yy, yz, zz for ℓ = 2.
pub fn cart_components(l: i32) -> Vec<(i32, i32, i32)> {
    let mut comps = Vec::with_capacity(ncart(l));
    for i in (0..=l).rev() {
        for j in (0..=(l - i)).rev() {
            comps.push((i, j, l - i - j));
        }
    }
    comps
}

/// (2n − 1)!! with the convention (−1)!! = 1.
pub fn double_factorial(n: i32) -> f64 {
    let mut acc = 1.0;
    let mut k = n;
    while k > 1 {
        acc *= k as f64;
        k -= 2;
    }
    acc
}

/// Per-component angular normalisation relative to the (ℓ,0,0) component.
#[inline]
pub fn cart_component_norm(i: i32, j: i32, k: i32) -> f64 {
    let l = i + j + k;
    (double_factorial(2 * l - 1)
        / (double_factorial(2 * i - 1) * double_factorial(2 * j - 1) * double_factorial(2 * k - 1)))
    .sqrt()
}

/// A contracted cartesian Gaussian shell.
///
/// Primitive radial normalisation is folded into `coeff` at construction,
/// and the contraction is rescaled so the (ℓ,0,0) component has unit
/// self-overlap. Per-component angular factors are applied at evaluation
/// and integral time via [`cart_component_norm`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shell {
    pub l: i32,
    /// Spherical-harmonic flag. This crate evaluates cartesian shells only;
    /// the flag is carried so consumers can detect and reject pure shells.
    pub pure: bool,
    pub alpha: Vec<f64>,
    pub coeff: Vec<f64>,
    pub center: Vector3<f64>,
    pub atom_idx: usize,
}

impl Shell {
    pub fn new(l: i32, alpha: Vec<f64>, coeff: Vec<f64>, center: Vector3<f64>, atom_idx: usize) -> Self {
        assert_eq!(alpha.len(), coeff.len(), "primitive count mismatch");
        let mut shell = Shell {
            l,
            pure: false,
            alpha,
            coeff,
            center,
            atom_idx,
        };
        shell.fold_primitive_norms();
        shell.normalize_contracted();
        shell
    }

    pub fn nprim(&self) -> usize {
        self.alpha.len()
    }

    pub fn size(&self) -> usize {
        ncart(self.l)
    }

    /// Radial primitive normalisation for ℓ folded into each coefficient:
    /// N(α, ℓ) = (2α/π)^{3/4} (4α)^{ℓ/2}.
    fn fold_primitive_norms(&mut self) {
        for (c, &a) in self.coeff.iter_mut().zip(self.alpha.iter()) {
            *c *= (2.0 * a / PI).powf(0.75) * (4.0 * a).powf(0.5 * self.l as f64);
        }
    }

    /// Rescale coefficients so ⟨(ℓ,0,0)|(ℓ,0,0)⟩ = 1 for the contraction.
    fn normalize_contracted(&mut self) {
        let l = self.l;
        let mut s = 0.0;
        for (&aa, &ca) in self.alpha.iter().zip(self.coeff.iter()) {
            for (&ab, &cb) in self.alpha.iter().zip(self.coeff.iter()) {
                let p = aa + ab;
                s += ca * cb * (PI / p).powf(1.5) * double_factorial(2 * l - 1)
                    / (2.0 * p).powi(l);
            }
        }
        let scale = 1.0 / s.sqrt();
        for c in self.coeff.iter_mut() {
            *c *= scale;
        }
    }

    /// Smallest primitive exponent; governs the shell's spatial extent.
    pub fn min_alpha(&self) -> f64 {
        self.alpha.iter().cloned().fold(f64::INFINITY, f64::min)
    }
}
