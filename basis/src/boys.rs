//! Boys function F_m(t) = ∫₀¹ s^{2m} e^{−t·s²} ds.
//!
//! `boys_function` is the reference kernel (series / asymptotic split with
//! downward recursion). [`BoysTable`] pre-tabulates F on a uniform grid and
//! evaluates by 7-term Taylor expansion; it is the process-wide read-only
//! resource owned by the exchange driver.

use std::f64::consts::PI;

/// Large-argument switch point: for t > T_ASYM, erf(√t) = 1 to below 1e-14
/// and the asymptotic closed form with upward recursion is exact enough.
const T_ASYM: f64 = 30.0;

/// Fill `out[0..=mmax]` with F_0(t) .. F_mmax(t).
pub fn boys_function(mmax: usize, t: f64, out: &mut [f64]) {
    debug_assert!(out.len() > mmax);
    if t < 1e-14 {
        for (m, f) in out.iter_mut().enumerate().take(mmax + 1) {
            *f = 1.0 / (2.0 * m as f64 + 1.0);
        }
        return;
    }
    if t > T_ASYM {
        // F_0 = ½√(π/t); upward F_{m+1} = ((2m+1)F_m − e^{−t}) / (2t)
        let emt = (-t).exp();
        out[0] = 0.5 * (PI / t).sqrt();
        for m in 0..mmax {
            out[m + 1] = ((2.0 * m as f64 + 1.0) * out[m] - emt) / (2.0 * t);
        }
        return;
    }
    // Convergent series at the highest order, then downward recursion:
    // F_m(t) = e^{−t} Σ_k (2t)^k / (2m+1)(2m+3)…(2m+2k+1)
    let emt = (-t).exp();
    let mut term = 1.0 / (2.0 * mmax as f64 + 1.0);
    let mut sum = term;
    let mut k = 0u32;
    loop {
        term *= 2.0 * t / (2.0 * mmax as f64 + 2.0 * k as f64 + 3.0);
        sum += term;
        k += 1;
        if term < 1e-17 * sum {
            break;
        }
    }
    out[mmax] = emt * sum;
    for m in (0..mmax).rev() {
        out[m] = (2.0 * t * out[m + 1] + emt) / (2.0 * m as f64 + 1.0);
    }
}

/// Pre-tabulated Boys evaluator.
///
/// The table stores F_m on a uniform grid over [0, T_ASYM] for m up to
/// `mmax + TAYLOR_TERMS`; evaluation Taylor-expands around the nearest grid
/// point. Beyond T_ASYM the asymptotic branch of [`boys_function`] is exact.
#[derive(Debug, Clone)]
pub struct BoysTable {
    delta: f64,
    mmax: usize,
    ncols: usize,
    table: Vec<f64>,
}

const TAYLOR_TERMS: usize = 7;

impl BoysTable {
    pub fn new(mmax: usize) -> Self {
        let delta = 1.0 / 32.0;
        let npts = (T_ASYM / delta) as usize + 2;
        let ncols = mmax + TAYLOR_TERMS + 1;
        let mut table = vec![0.0; npts * ncols];
        let mut buf = vec![0.0; ncols];
        for ipt in 0..npts {
            boys_function(ncols - 1, ipt as f64 * delta, &mut buf);
            table[ipt * ncols..(ipt + 1) * ncols].copy_from_slice(&buf);
        }
        BoysTable {
            delta,
            mmax,
            ncols,
            table,
        }
    }

    pub fn mmax(&self) -> usize {
        self.mmax
    }

    /// Fill `out[0..=mmax]` with F_0(t) .. F_mmax(t); `mmax` must not exceed
    /// the table's construction order.
    pub fn eval(&self, mmax: usize, t: f64, out: &mut [f64]) {
        debug_assert!(mmax <= self.mmax);
        if t > T_ASYM - self.delta {
            boys_function(mmax, t, out);
            return;
        }
        let ipt = (t / self.delta).round() as usize;
        let t0 = ipt as f64 * self.delta;
        let dt = t0 - t;
        let row = &self.table[ipt * self.ncols..(ipt + 1) * self.ncols];
        for m in 0..=mmax {
            // F_m(t) = Σ_k F_{m+k}(t0) (t0 − t)^k / k!
            let mut acc = 0.0;
            let mut fac = 1.0;
            for k in 0..=TAYLOR_TERMS {
                acc += row[m + k] * fac;
                fac *= dt / (k as f64 + 1.0);
            }
            out[m] = acc;
        }
    }
}
