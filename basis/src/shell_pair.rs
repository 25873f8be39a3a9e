//! Precomputed shell-pair data for the two-electron kernels.

extern crate nalgebra as na;

use crate::basis::BasisSet;
use crate::boys::BoysTable;
use crate::hermite::max_coulomb;
use crate::shell::Shell;
use na::{DMatrix, Vector3};
use rayon::prelude::*;

/// One Gaussian product of a primitive pair.
#[derive(Debug, Clone)]
pub struct PrimPair {
    pub p: f64,
    pub center: Vector3<f64>,
    /// c_a · c_b · exp(−(αβ/p)·|AB|²), primitive norms included.
    pub k_coeff: f64,
    pub alpha_a: f64,
    pub alpha_b: f64,
}

/// A shell pair (i, j ≤ i) with its surviving primitive products.
#[derive(Debug, Clone)]
pub struct ShellPair {
    pub i: usize,
    pub j: usize,
    /// Center displacement A − B.
    pub ab: Vector3<f64>,
    pub prim_pairs: Vec<PrimPair>,
}

impl ShellPair {
    pub fn new(i: usize, j: usize, sa: &Shell, sb: &Shell, screen_tol: f64) -> Self {
        let ab = sa.center - sb.center;
        let ab2 = ab.norm_squared();
        let mut prim_pairs = Vec::with_capacity(sa.nprim() * sb.nprim());
        for (&aa, &ca) in sa.alpha.iter().zip(sa.coeff.iter()) {
            for (&bb, &cb) in sb.alpha.iter().zip(sb.coeff.iter()) {
                let p = aa + bb;
                let k = ca * cb * (-(aa * bb / p) * ab2).exp();
                if k.abs() <= screen_tol {
                    continue;
                }
                prim_pairs.push(PrimPair {
                    p,
                    center: (aa * sa.center + bb * sb.center) / p,
                    k_coeff: k,
                    alpha_a: aa,
                    alpha_b: bb,
                });
            }
        }
        ShellPair {
            i,
            j,
            ab,
            prim_pairs,
        }
    }

    pub fn nprim_pairs(&self) -> usize {
        self.prim_pairs.len()
    }
}

/// All overlap-surviving shell pairs (i, j ≤ i) of a basis.
#[derive(Debug, Clone)]
pub struct ShellPairCollection {
    pairs: Vec<ShellPair>,
    /// Dense (i, j) → pair index (usize::MAX for screened-out pairs).
    index: Vec<usize>,
    nshells: usize,
}

impl ShellPairCollection {
    pub fn new(basis: &BasisSet, screen_tol: f64) -> Self {
        let nshells = basis.nshells();
        let mut pairs = Vec::new();
        let mut index = vec![usize::MAX; nshells * nshells];
        for i in 0..nshells {
            for j in 0..=i {
                let pair = ShellPair::new(i, j, basis.shell(i), basis.shell(j), screen_tol);
                if pair.prim_pairs.is_empty() {
                    continue;
                }
                index[i * nshells + j] = pairs.len();
                index[j * nshells + i] = pairs.len();
                pairs.push(pair);
            }
        }
        ShellPairCollection {
            pairs,
            index,
            nshells,
        }
    }

    pub fn npairs(&self) -> usize {
        self.pairs.len()
    }

    pub fn pairs(&self) -> &[ShellPair] {
        &self.pairs
    }

    /// Look up the stored (max(i,j), min(i,j)) pair.
    pub fn at(&self, i: usize, j: usize) -> Option<&ShellPair> {
        let idx = self.index[i * self.nshells + j];
        if idx == usize::MAX {
            None
        } else {
            Some(&self.pairs[idx])
        }
    }

    pub fn max_nprim_pairs(&self) -> usize {
        self.pairs.iter().map(|p| p.nprim_pairs()).max().unwrap_or(0)
    }

    /// Dense per-pair max-Coulomb bounds V(i,j) = √(max (μν|μν)); zero for
    /// screened-out pairs.
    pub fn max_coulomb_matrix(&self, basis: &BasisSet, boys: &BoysTable) -> DMatrix<f64> {
        let n = self.nshells;
        let bounds: Vec<f64> = self
            .pairs
            .par_iter()
            .map(|pair| max_coulomb(basis.shell(pair.i), basis.shell(pair.j), boys))
            .collect();
        let mut v = DMatrix::zeros(n, n);
        for (pair, bound) in self.pairs.iter().zip(bounds) {
            v[(pair.i, pair.j)] = bound;
            v[(pair.j, pair.i)] = bound;
        }
        v
    }
}
