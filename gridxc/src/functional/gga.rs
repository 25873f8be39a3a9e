//! GGA kernels: B88 and PBE exchange, LYP and PBE correlation.
//!
//! All kernels are spin-resolved; exchange uses the exact spin-scaling
//! relation E_x[ρ↑, ρ↓] = (E_x[2ρ↑] + E_x[2ρ↓])/2. Derivatives are fully
//! analytic and cross-checked against finite differences in the module
//! tests of `functional`.

use super::{GgaPoint, RHO_CUTOFF};
use std::f64::consts::PI;

#[inline]
fn cx_unpol() -> f64 {
    -0.75 * (3.0 / PI).powf(1.0 / 3.0)
}

#[inline]
fn clamp_zeta(z: f64) -> f64 {
    z.clamp(-1.0 + 1e-10, 1.0 - 1e-10)
}

// ---------------------------------------------------------------------------
// B88 exchange
// ---------------------------------------------------------------------------

const B88_BETA: f64 = 0.0042;

/// Per-spin B88 energy density and partials: (e, ∂e/∂ρσ, ∂e/∂γσσ).
fn b88_x_spin(rho: f64, gamma: f64) -> (f64, f64, f64) {
    if rho < RHO_CUTOFF {
        return (0.0, 0.0, 0.0);
    }
    let cls = 2.0_f64.powf(1.0 / 3.0) * cx_unpol();
    let r13 = rho.powf(1.0 / 3.0);
    let r43 = rho * r13;
    let beta = B88_BETA;

    if gamma < 1e-40 {
        // x → 0 limit: h ≈ x², dh/dγ → ρ^{−8/3}
        let e = cls * r43;
        let de_drho = 4.0 / 3.0 * cls * r13;
        let de_dgamma = -beta * r43 / (r43 * r43);
        return (e, de_drho, de_dgamma);
    }

    let x = gamma.sqrt() / r43;
    let ash = x.asinh();
    let denom = 1.0 + 6.0 * beta * x * ash;
    let h = x * x / denom;
    let dh =
        (2.0 * x * denom - x * x * 6.0 * beta * (ash + x / (1.0 + x * x).sqrt())) / (denom * denom);

    let e = r43 * (cls - beta * h);
    let de_drho = 4.0 / 3.0 * r13 * (cls - beta * (h - x * dh));
    let de_dgamma = -beta * r43 * dh * x / (2.0 * gamma);
    (e, de_drho, de_dgamma)
}

/// B88 exchange; γ↑↓ does not enter.
pub fn b88_x_point(rho: [f64; 2], gamma: [f64; 3]) -> GgaPoint {
    let rho_t = rho[0] + rho[1];
    if rho_t < RHO_CUTOFF {
        return GgaPoint::default();
    }
    let (e0, v0, g0) = b88_x_spin(rho[0].max(0.0), gamma[0].max(0.0));
    let (e1, v1, g1) = b88_x_spin(rho[1].max(0.0), gamma[2].max(0.0));
    GgaPoint {
        eps: (e0 + e1) / rho_t,
        vrho: [v0, v1],
        vgamma: [g0, 0.0, g1],
    }
}

// ---------------------------------------------------------------------------
// PBE exchange
// ---------------------------------------------------------------------------

const PBE_KAPPA: f64 = 0.804;
const PBE_MU: f64 = 0.219_514_972_764_517_1;

/// Unpolarized PBE-x energy density and partials at (ρ, γ).
fn pbe_x_unpol(rho: f64, gamma: f64) -> (f64, f64, f64) {
    if rho < RHO_CUTOFF {
        return (0.0, 0.0, 0.0);
    }
    let r13 = rho.powf(1.0 / 3.0);
    let r43 = rho * r13;
    // u = s² = γ / (4 (3π²)^{2/3} ρ^{8/3})
    let cu = 1.0 / (4.0 * (3.0 * PI * PI).powf(2.0 / 3.0) * r43 * r43);
    let u = gamma * cu;
    let t = 1.0 + PBE_MU * u / PBE_KAPPA;
    let fx = 1.0 + PBE_KAPPA - PBE_KAPPA / t;
    let fx_u = PBE_MU / (t * t);

    let e = cx_unpol() * r43 * fx;
    let de_drho = 4.0 / 3.0 * cx_unpol() * r13 * (fx - 2.0 * u * fx_u);
    let de_dgamma = cx_unpol() * r43 * fx_u * cu;
    (e, de_drho, de_dgamma)
}

pub fn pbe_x_point(rho: [f64; 2], gamma: [f64; 3]) -> GgaPoint {
    let rho_t = rho[0] + rho[1];
    if rho_t < RHO_CUTOFF {
        return GgaPoint::default();
    }
    let (e0, v0, g0) = pbe_x_unpol(2.0 * rho[0].max(0.0), 4.0 * gamma[0].max(0.0));
    let (e1, v1, g1) = pbe_x_unpol(2.0 * rho[1].max(0.0), 4.0 * gamma[2].max(0.0));
    GgaPoint {
        eps: 0.5 * (e0 + e1) / rho_t,
        vrho: [v0, v1],
        vgamma: [2.0 * g0, 0.0, 2.0 * g1],
    }
}

// ---------------------------------------------------------------------------
// PW92 local correlation (used by PBE-c)
// ---------------------------------------------------------------------------

// (A, α1, β1, β2, β3, β4)
const PW_EC0: [f64; 6] = [0.031091, 0.21370, 7.5957, 3.5876, 1.6382, 0.49294];
const PW_EC1: [f64; 6] = [0.015545, 0.20548, 14.1189, 6.1977, 3.3662, 0.62517];
const PW_AC: [f64; 6] = [0.016887, 0.11125, 10.357, 3.6231, 0.88026, 0.49671];

/// PW92 interpolation G(rs) and dG/drs.
fn pw92_g(rs: f64, p: &[f64; 6]) -> (f64, f64) {
    let (a, a1, b1, b2, b3, b4) = (p[0], p[1], p[2], p[3], p[4], p[5]);
    let srs = rs.sqrt();
    let q0 = -2.0 * a * (1.0 + a1 * rs);
    let q1 = 2.0 * a * (b1 * srs + b2 * rs + b3 * rs * srs + b4 * rs * rs);
    let q1p = a * (b1 / srs + 2.0 * b2 + 3.0 * b3 * srs + 4.0 * b4 * rs);
    let lg = (1.0 + 1.0 / q1).ln();
    let g = q0 * lg;
    let dg = -2.0 * a * a1 * lg - q0 * q1p / (q1 * q1 + q1);
    (g, dg)
}

/// ε_c^{PW92}(rs, ζ) and its partials (∂/∂rs, ∂/∂ζ).
fn pw92_eps(rs: f64, zeta: f64) -> (f64, f64, f64) {
    let (e0, de0) = pw92_g(rs, &PW_EC0);
    let (e1, de1) = pw92_g(rs, &PW_EC1);
    let (ga, dga) = pw92_g(rs, &PW_AC); // fit of −α_c
    let ac = -ga;
    let dac = -dga;

    let d = 2.0 * (2.0_f64.powf(1.0 / 3.0) - 1.0);
    let fz = ((1.0 + zeta).powf(4.0 / 3.0) + (1.0 - zeta).powf(4.0 / 3.0) - 2.0) / d;
    let dfz = 4.0 / 3.0 * ((1.0 + zeta).powf(1.0 / 3.0) - (1.0 - zeta).powf(1.0 / 3.0)) / d;
    let fpp0 = 4.0 / (9.0 * (2.0_f64.powf(1.0 / 3.0) - 1.0));
    let z3 = zeta * zeta * zeta;
    let z4 = z3 * zeta;

    let eps = e0 + ac * fz / fpp0 * (1.0 - z4) + (e1 - e0) * fz * z4;
    let deps_drs = de0 + dac * fz / fpp0 * (1.0 - z4) + (de1 - de0) * fz * z4;
    let deps_dz =
        ac / fpp0 * (dfz * (1.0 - z4) - 4.0 * fz * z3) + (e1 - e0) * (dfz * z4 + 4.0 * fz * z3);
    (eps, deps_drs, deps_dz)
}

// ---------------------------------------------------------------------------
// PBE correlation
// ---------------------------------------------------------------------------

const PBE_BETA_C: f64 = 0.066_724_550_603_149_22;

pub fn pbe_c_point(rho: [f64; 2], gamma: [f64; 3]) -> GgaPoint {
    let rho_t = rho[0] + rho[1];
    if rho_t < RHO_CUTOFF {
        return GgaPoint::default();
    }
    let gamma_c = (1.0 - 2.0_f64.ln()) / (PI * PI);
    let beta = PBE_BETA_C;

    let zeta = clamp_zeta((rho[0] - rho[1]) / rho_t);
    let rs = (3.0 / (4.0 * PI * rho_t)).powf(1.0 / 3.0);
    let gamma_tot = (gamma[0] + 2.0 * gamma[1] + gamma[2]).max(0.0);

    let (eps_pw, deps_drs, deps_dz) = pw92_eps(rs, zeta);

    let phi = 0.5 * ((1.0 + zeta).powf(2.0 / 3.0) + (1.0 - zeta).powf(2.0 / 3.0));
    let dphi_dz = ((1.0 + zeta).powf(-1.0 / 3.0) - (1.0 - zeta).powf(-1.0 / 3.0)) / 3.0;
    let phi3 = phi * phi * phi;

    // u = t² = γ_tot · π / (16 φ² (3π²)^{1/3} ρ^{7/3})
    let cu = PI / (16.0 * phi * phi * (3.0 * PI * PI).powf(1.0 / 3.0) * rho_t.powf(7.0 / 3.0));
    let u = gamma_tot * cu;

    let e_exp = (-eps_pw / (gamma_c * phi3)).exp();
    let a = (beta / gamma_c) / (e_exp - 1.0);

    let num = u * (1.0 + a * u);
    let den = 1.0 + a * u + a * a * u * u;
    let g = num / den;
    let arg = 1.0 + (beta / gamma_c) * g;
    let lg = arg.ln();
    let h = gamma_c * phi3 * lg;

    let g_u = ((1.0 + 2.0 * a * u) * den - num * (a + 2.0 * a * a * u)) / (den * den);
    let g_a = (u * u * den - num * (u + 2.0 * a * u * u)) / (den * den);
    let h_u = phi3 * beta * g_u / arg;
    let h_a = phi3 * beta * g_a / arg;
    let h_phi = 3.0 * gamma_c * phi * phi * lg;

    let a_eps = a * a * (gamma_c / beta) * e_exp / (gamma_c * phi3);
    let a_phi = -a * a * (gamma_c / beta) * e_exp * 3.0 * eps_pw / (gamma_c * phi3 * phi);

    let rs_rho = -rs / (3.0 * rho_t);
    let u_rho = -7.0 / 3.0 * u / rho_t;
    let u_phi = -2.0 * u / phi;

    let eps = eps_pw + h;

    let mut vrho = [0.0; 2];
    for (s, v) in vrho.iter_mut().enumerate() {
        let z_s = if s == 0 {
            (1.0 - zeta) / rho_t
        } else {
            -(1.0 + zeta) / rho_t
        };
        let phi_s = dphi_dz * z_s;
        let eps_pw_s = deps_drs * rs_rho + deps_dz * z_s;
        let deps = eps_pw_s
            + h_u * (u_rho + u_phi * phi_s)
            + h_a * (a_eps * eps_pw_s + a_phi * phi_s)
            + h_phi * phi_s;
        *v = eps + rho_t * deps;
    }

    let dv = rho_t * h_u * cu;
    GgaPoint {
        eps,
        vrho,
        vgamma: [dv, 2.0 * dv, dv],
    }
}

// ---------------------------------------------------------------------------
// LYP correlation (Miehlich reformulation)
// ---------------------------------------------------------------------------

const LYP_A: f64 = 0.04918;
const LYP_B: f64 = 0.132;
const LYP_C: f64 = 0.2533;
const LYP_D: f64 = 0.349;

pub fn lyp_c_point(rho: [f64; 2], gamma: [f64; 3]) -> GgaPoint {
    let ra = rho[0].max(0.0);
    let rb = rho[1].max(0.0);
    let rho_t = ra + rb;
    if rho_t < RHO_CUTOFF {
        return GgaPoint::default();
    }
    let (gaa, gab, gbb) = (gamma[0], gamma[1], gamma[2]);
    let gt = gaa + 2.0 * gab + gbb;

    let cf = 0.3 * (3.0 * PI * PI).powf(2.0 / 3.0);
    let c2 = 2.0_f64.powf(11.0 / 3.0);
    let (a, b, c, d) = (LYP_A, LYP_B, LYP_C, LYP_D);

    let x = rho_t.powf(-1.0 / 3.0);
    let den_d = 1.0 + d * x;
    let omega = (-c * x).exp() * x.powi(11) / den_d;
    let delta = c * x + d * x / den_d;
    // d/dρ of ω and δ through x(ρ)
    let omega_r = omega * (delta - 11.0) / (3.0 * rho_t);
    let delta_r = -(c + d / (den_d * den_d)) * x / (3.0 * rho_t);

    // local term: −4a ρ↑ρ↓ / (ρ (1 + d ρ^{-1/3}))
    let f_loc = 1.0 / (rho_t * den_d);
    let t1 = -4.0 * a * ra * rb * f_loc;
    let df_loc = -f_loc * (1.0 / rho_t - d * x / (3.0 * rho_t * den_d));

    let c1 = (47.0 - 7.0 * delta) / 18.0;
    let c1_r = -7.0 * delta_r / 18.0;
    let c2d = 2.5 - delta / 18.0;
    let c2d_r = -delta_r / 18.0;
    let c3 = (delta - 11.0) / 9.0;
    let c3_r = delta_r / 9.0;

    let r83 = |r: f64| r.powf(8.0 / 3.0);
    let wsum = (ra * gaa + rb * gbb) / rho_t;
    let t_big = c2 * cf * (r83(ra) + r83(rb)) + c1 * gt - c2d * (gaa + gbb) - c3 * wsum;
    let u_big = -(2.0 / 3.0) * rho_t * rho_t * gt
        + (2.0 / 3.0 * rho_t * rho_t - ra * ra) * gbb
        + (2.0 / 3.0 * rho_t * rho_t - rb * rb) * gaa;
    let s_big = ra * rb * t_big + u_big;

    let e_den = t1 - a * b * omega * s_big;
    let eps = e_den / rho_t;

    // γ derivatives
    let ds_gaa = ra * rb * (c1 - c2d - c3 * ra / rho_t) - rb * rb;
    let ds_gab = ra * rb * 2.0 * c1 - (4.0 / 3.0) * rho_t * rho_t;
    let ds_gbb = ra * rb * (c1 - c2d - c3 * rb / rho_t) - ra * ra;
    let vgamma = [
        -a * b * omega * ds_gaa,
        -a * b * omega * ds_gab,
        -a * b * omega * ds_gbb,
    ];

    // ρσ derivatives
    let dwsum = |g_own: f64| (g_own * rho_t - (ra * gaa + rb * gbb)) / (rho_t * rho_t);
    let dt_common = c1_r * gt - c2d_r * (gaa + gbb) - c3_r * wsum;
    let dt_ra = c2 * cf * (8.0 / 3.0) * ra.powf(5.0 / 3.0) + dt_common - c3 * dwsum(gaa);
    let dt_rb = c2 * cf * (8.0 / 3.0) * rb.powf(5.0 / 3.0) + dt_common - c3 * dwsum(gbb);
    let du_ra = -(4.0 / 3.0) * rho_t * gt + (4.0 / 3.0 * rho_t - 2.0 * ra) * gbb
        + (4.0 / 3.0) * rho_t * gaa;
    let du_rb = -(4.0 / 3.0) * rho_t * gt + (4.0 / 3.0 * rho_t - 2.0 * rb) * gaa
        + (4.0 / 3.0) * rho_t * gbb;
    let ds_ra = rb * t_big + ra * rb * dt_ra + du_ra;
    let ds_rb = ra * t_big + ra * rb * dt_rb + du_rb;

    let dt1_ra = -4.0 * a * (rb * f_loc + ra * rb * df_loc);
    let dt1_rb = -4.0 * a * (ra * f_loc + ra * rb * df_loc);

    let vrho = [
        dt1_ra - a * b * (omega_r * s_big + omega * ds_ra),
        dt1_rb - a * b * (omega_r * s_big + omega * ds_rb),
    ];

    GgaPoint { eps, vrho, vgamma }
}
