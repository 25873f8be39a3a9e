//! LDA kernels: Slater exchange and VWN5 correlation, spin-resolved.

use super::{LdaPoint, RHO_CUTOFF};
use std::f64::consts::PI;

#[inline]
fn cx_unpol() -> f64 {
    -0.75 * (3.0 / PI).powf(1.0 / 3.0)
}

/// Slater exchange. Spin scaling is exact for exchange:
/// E_x[ρ↑, ρ↓] = (E_x[2ρ↑] + E_x[2ρ↓]) / 2.
pub fn slater_x_point(rho: [f64; 2]) -> LdaPoint {
    let rho_t = rho[0] + rho[1];
    if rho_t < RHO_CUTOFF {
        return LdaPoint::default();
    }
    let c = 2.0_f64.powf(1.0 / 3.0) * cx_unpol();
    let e_den = c * (rho[0].max(0.0).powf(4.0 / 3.0) + rho[1].max(0.0).powf(4.0 / 3.0));
    LdaPoint {
        eps: e_den / rho_t,
        vrho: [
            4.0 / 3.0 * c * rho[0].max(0.0).powf(1.0 / 3.0),
            4.0 / 3.0 * c * rho[1].max(0.0).powf(1.0 / 3.0),
        ],
    }
}

// VWN5 fit parameters: paramagnetic, ferromagnetic and spin-stiffness
// channels (A, b, c, x0).
const VWN_P: [f64; 4] = [0.0310907, 3.72744, 12.9352, -0.10498];
const VWN_F: [f64; 4] = [0.01554535, 7.06042, 18.0578, -0.32500];
const VWN_A: [f64; 4] = [-0.016886863940390205, 1.13107, 13.0045, -0.00475840];

/// The VWN interpolation function G(x) and dG/dx, x = √rs.
fn vwn_g(x: f64, p: &[f64; 4]) -> (f64, f64) {
    let (a, b, c, x0) = (p[0], p[1], p[2], p[3]);
    let xx = x * x + b * x + c;
    let xx0 = x0 * x0 + b * x0 + c;
    let q = (4.0 * c - b * b).sqrt();
    let atn = (q / (2.0 * x + b)).atan();
    let g = a
        * ((x * x / xx).ln() + 2.0 * b / q * atn
            - b * x0 / xx0 * (((x - x0) * (x - x0) / xx).ln() + 2.0 * (b + 2.0 * x0) / q * atn));
    let dxx = 2.0 * x + b;
    let denom = dxx * dxx + q * q;
    let dg = a
        * (2.0 / x - dxx / xx - 4.0 * b / denom
            - b * x0 / xx0 * (2.0 / (x - x0) - dxx / xx - 4.0 * (b + 2.0 * x0) / denom));
    (g, dg)
}

#[inline]
fn zeta_f(z: f64) -> f64 {
    let d = 2.0 * (2.0_f64.powf(1.0 / 3.0) - 1.0);
    ((1.0 + z).powf(4.0 / 3.0) + (1.0 - z).powf(4.0 / 3.0) - 2.0) / d
}

#[inline]
fn zeta_df(z: f64) -> f64 {
    let d = 2.0 * (2.0_f64.powf(1.0 / 3.0) - 1.0);
    4.0 / 3.0 * ((1.0 + z).powf(1.0 / 3.0) - (1.0 - z).powf(1.0 / 3.0)) / d
}

/// VWN5 correlation.
pub fn vwn5_c_point(rho: [f64; 2]) -> LdaPoint {
    let rho_t = rho[0] + rho[1];
    if rho_t < RHO_CUTOFF {
        return LdaPoint::default();
    }
    let zeta = ((rho[0] - rho[1]) / rho_t).clamp(-1.0, 1.0);
    let rs = (3.0 / (4.0 * PI * rho_t)).powf(1.0 / 3.0);
    let x = rs.sqrt();

    let (ep, dep) = vwn_g(x, &VWN_P);
    let (ef, def) = vwn_g(x, &VWN_F);
    let (ea, dea) = vwn_g(x, &VWN_A);

    let fz = zeta_f(zeta);
    let dfz = zeta_df(zeta);
    let fpp0 = 4.0 / (9.0 * (2.0_f64.powf(1.0 / 3.0) - 1.0));
    let z3 = zeta * zeta * zeta;
    let z4 = z3 * zeta;

    let eps = ep + ea * fz / fpp0 * (1.0 - z4) + (ef - ep) * fz * z4;

    // dε/drs through dG/dx with dx/drs = 1/(2x)
    let deps_drs =
        (dep + dea * fz / fpp0 * (1.0 - z4) + (def - dep) * fz * z4) / (2.0 * x);
    let deps_dz = ea / fpp0 * (dfz * (1.0 - z4) - 4.0 * fz * z3) + (ef - ep) * (dfz * z4 + 4.0 * fz * z3);

    let common = eps - rs / 3.0 * deps_drs;
    LdaPoint {
        eps,
        vrho: [
            common + (1.0 - zeta) * deps_dz,
            common - (1.0 + zeta) * deps_dz,
        ],
    }
}
