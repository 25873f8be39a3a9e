//! Spin / polarization dispatch.
//!
//! Densities are routed through channels: the scalar density S, the
//! collinear spin density Z, and the transverse components Y, X for
//! general (noncollinear) Kohn–Sham. The functional layer always sees
//! interleaved spin blocks: ρ = [ρ↑, ρ↓] stride 2 and
//! γ = [γ↑↑, γ↑↓, γ↓↓] stride 3.

extern crate nalgebra as na;

use crate::error::{GridXcError, Result};
use na::DMatrix;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KsScheme {
    Rks,
    Uks,
    Gks,
}

/// Which of the (scalar, spin-z, spin-y, spin-x) densities a kernel pass
/// operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DensityKind {
    S,
    Z,
    Y,
    X,
}

impl KsScheme {
    pub fn channels(&self) -> &'static [DensityKind] {
        match self {
            KsScheme::Rks => &[DensityKind::S],
            KsScheme::Uks => &[DensityKind::S, DensityKind::Z],
            KsScheme::Gks => &[DensityKind::S, DensityKind::Z, DensityKind::Y, DensityKind::X],
        }
    }

    pub fn nchannels(&self) -> usize {
        self.channels().len()
    }
}

/// A Kohn–Sham density: one matrix per channel, aligned with
/// `scheme.channels()`.
#[derive(Debug, Clone)]
pub struct KsDensity {
    pub scheme: KsScheme,
    pub channels: Vec<DMatrix<f64>>,
}

impl KsDensity {
    pub fn rks(p: DMatrix<f64>) -> Self {
        KsDensity {
            scheme: KsScheme::Rks,
            channels: vec![p],
        }
    }

    /// UKS from the scalar and spin-z densities:
    /// (ρ↑, ρ↓) = ((S+Z)/2, (S−Z)/2).
    pub fn uks(p_s: DMatrix<f64>, p_z: DMatrix<f64>) -> Self {
        KsDensity {
            scheme: KsScheme::Uks,
            channels: vec![p_s, p_z],
        }
    }

    /// UKS from per-spin densities.
    pub fn uks_from_spin(p_up: &DMatrix<f64>, p_dn: &DMatrix<f64>) -> Self {
        KsDensity::uks(p_up + p_dn, p_up - p_dn)
    }

    pub fn gks(p_s: DMatrix<f64>, p_z: DMatrix<f64>, p_y: DMatrix<f64>, p_x: DMatrix<f64>) -> Self {
        KsDensity {
            scheme: KsScheme::Gks,
            channels: vec![p_s, p_z, p_y, p_x],
        }
    }

    pub fn validate(&self, nbf: usize) -> Result<()> {
        if self.channels.len() != self.scheme.nchannels() {
            return Err(GridXcError::InternalState(format!(
                "density carries {} channels, scheme expects {}",
                self.channels.len(),
                self.scheme.nchannels()
            )));
        }
        for (kind, p) in self.scheme.channels().iter().zip(self.channels.iter()) {
            if p.nrows() != p.ncols() {
                return Err(GridXcError::invalid_input(format!(
                    "density channel {:?} must be square, got {}x{}",
                    kind,
                    p.nrows(),
                    p.ncols()
                )));
            }
            if p.nrows() != nbf {
                return Err(GridXcError::invalid_input(format!(
                    "density channel {:?} dimension {} does not match nbf = {}",
                    kind,
                    p.nrows(),
                    nbf
                )));
            }
        }
        Ok(())
    }
}

/// The integrator's output: XC energy, integrated electron count and one
/// potential matrix per density channel.
#[derive(Debug, Clone)]
pub struct KsPotential {
    pub scheme: KsScheme,
    pub exc: f64,
    pub n_el: f64,
    pub vxc: Vec<DMatrix<f64>>,
}

impl KsPotential {
    pub fn vxc_s(&self) -> &DMatrix<f64> {
        &self.vxc[0]
    }

    pub fn vxc_z(&self) -> Option<&DMatrix<f64>> {
        self.vxc.get(1)
    }
}

/// Pack two per-spin point arrays into a stride-2 interleaved block.
pub fn interleave2(up: &[f64], dn: &[f64], out: &mut [f64]) {
    debug_assert_eq!(up.len(), dn.len());
    for i in 0..up.len() {
        out[2 * i] = up[i];
        out[2 * i + 1] = dn[i];
    }
}

/// Unpack a stride-2 interleaved block into per-spin arrays.
pub fn deinterleave2(packed: &[f64], up: &mut [f64], dn: &mut [f64]) {
    for i in 0..up.len() {
        up[i] = packed[2 * i];
        dn[i] = packed[2 * i + 1];
    }
}

/// Pack (γ↑↑, γ↑↓, γ↓↓) point arrays into a stride-3 interleaved block.
pub fn interleave3(pp: &[f64], pm: &[f64], mm: &[f64], out: &mut [f64]) {
    for i in 0..pp.len() {
        out[3 * i] = pp[i];
        out[3 * i + 1] = pm[i];
        out[3 * i + 2] = mm[i];
    }
}

/// Unpack a stride-3 interleaved block.
pub fn deinterleave3(packed: &[f64], pp: &mut [f64], pm: &mut [f64], mm: &mut [f64]) {
    for i in 0..pp.len() {
        pp[i] = packed[3 * i];
        pm[i] = packed[3 * i + 1];
        mm[i] = packed[3 * i + 2];
    }
}
