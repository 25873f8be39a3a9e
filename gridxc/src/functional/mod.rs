//! Density-functional kernels.
//!
//! The integrator consumes functionals through the [`XcFunctional`] trait:
//! a black box mapping (ρ[, γ]) → (ε, ∂ε/∂ρ[, ∂ε/∂γ]) point-wise, with ε
//! the energy density per particle. Polarized entry points take the
//! interleaved layout ρ = [ρ↑, ρ↓] stride 2, γ = [γ↑↑, γ↑↓, γ↓↓] stride 3.
//!
//! Built-in kernels are implemented in their spin-resolved form; the
//! unpolarized entry points evaluate the polarized form at ζ = 0, so the
//! restricted and unrestricted-singlet paths agree to machine precision.

mod gga;
mod lda;

pub use gga::{b88_x_point, lyp_c_point, pbe_c_point, pbe_x_point};
pub use lda::{slater_x_point, vwn5_c_point};

use serde::{Deserialize, Serialize};

/// Density threshold below which a point contributes nothing.
pub const RHO_CUTOFF: f64 = 1e-12;

#[derive(Debug, Clone, Copy, Default)]
pub struct LdaPoint {
    pub eps: f64,
    pub vrho: [f64; 2],
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GgaPoint {
    pub eps: f64,
    pub vrho: [f64; 2],
    pub vgamma: [f64; 3],
}

pub trait XcFunctional: Send + Sync {
    fn is_lda(&self) -> bool;

    fn is_gga(&self) -> bool {
        !self.is_lda()
    }

    /// Unpolarized LDA kernel over `n` points.
    fn eval_exc_vxc_lda(&self, n: usize, rho: &[f64], eps: &mut [f64], vrho: &mut [f64]);

    /// Polarized LDA kernel: `rho` interleaved [ρ↑, ρ↓], `vrho` likewise.
    fn eval_exc_vxc_lda_polar(&self, n: usize, rho: &[f64], eps: &mut [f64], vrho: &mut [f64]);

    /// Unpolarized GGA kernel over `n` points.
    fn eval_exc_vxc_gga(
        &self,
        n: usize,
        rho: &[f64],
        gamma: &[f64],
        eps: &mut [f64],
        vrho: &mut [f64],
        vgamma: &mut [f64],
    );

    /// Polarized GGA kernel: interleaved ρ (stride 2) and γ (stride 3).
    fn eval_exc_vxc_gga_polar(
        &self,
        n: usize,
        rho: &[f64],
        gamma: &[f64],
        eps: &mut [f64],
        vrho: &mut [f64],
        vgamma: &mut [f64],
    );
}

/// The built-in functional catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuiltinFunctional {
    /// Slater exchange only.
    SlaterX,
    /// Slater exchange + VWN5 correlation.
    Svwn5,
    /// PBE exchange only.
    PbeX,
    /// PBE exchange + PBE correlation.
    Pbe,
    /// B88 exchange + LYP correlation.
    Blyp,
}

impl BuiltinFunctional {
    fn eval_point_lda(&self, rho: [f64; 2]) -> LdaPoint {
        match self {
            BuiltinFunctional::SlaterX => slater_x_point(rho),
            BuiltinFunctional::Svwn5 => {
                let x = slater_x_point(rho);
                let c = vwn5_c_point(rho);
                LdaPoint {
                    eps: x.eps + c.eps,
                    vrho: [x.vrho[0] + c.vrho[0], x.vrho[1] + c.vrho[1]],
                }
            }
            _ => panic!("XC kernel is not LDA"),
        }
    }

    fn eval_point_gga(&self, rho: [f64; 2], gamma: [f64; 3]) -> GgaPoint {
        let add = |a: GgaPoint, b: GgaPoint| GgaPoint {
            eps: a.eps + b.eps,
            vrho: [a.vrho[0] + b.vrho[0], a.vrho[1] + b.vrho[1]],
            vgamma: [
                a.vgamma[0] + b.vgamma[0],
                a.vgamma[1] + b.vgamma[1],
                a.vgamma[2] + b.vgamma[2],
            ],
        };
        match self {
            BuiltinFunctional::PbeX => pbe_x_point(rho, gamma),
            BuiltinFunctional::Pbe => add(pbe_x_point(rho, gamma), pbe_c_point(rho, gamma)),
            BuiltinFunctional::Blyp => add(b88_x_point(rho, gamma), lyp_c_point(rho, gamma)),
            _ => panic!("XC kernel is not GGA"),
        }
    }
}

impl XcFunctional for BuiltinFunctional {
    fn is_lda(&self) -> bool {
        matches!(self, BuiltinFunctional::SlaterX | BuiltinFunctional::Svwn5)
    }

    fn eval_exc_vxc_lda(&self, n: usize, rho: &[f64], eps: &mut [f64], vrho: &mut [f64]) {
        for i in 0..n {
            let half = 0.5 * rho[i];
            let out = self.eval_point_lda([half, half]);
            eps[i] = out.eps;
            vrho[i] = 0.5 * (out.vrho[0] + out.vrho[1]);
        }
    }

    fn eval_exc_vxc_lda_polar(&self, n: usize, rho: &[f64], eps: &mut [f64], vrho: &mut [f64]) {
        for i in 0..n {
            let out = self.eval_point_lda([rho[2 * i], rho[2 * i + 1]]);
            eps[i] = out.eps;
            vrho[2 * i] = out.vrho[0];
            vrho[2 * i + 1] = out.vrho[1];
        }
    }

    fn eval_exc_vxc_gga(
        &self,
        n: usize,
        rho: &[f64],
        gamma: &[f64],
        eps: &mut [f64],
        vrho: &mut [f64],
        vgamma: &mut [f64],
    ) {
        for i in 0..n {
            let half = 0.5 * rho[i];
            let quarter = 0.25 * gamma[i];
            let out = self.eval_point_gga([half, half], [quarter, quarter, quarter]);
            eps[i] = out.eps;
            vrho[i] = 0.5 * (out.vrho[0] + out.vrho[1]);
            // dE/dγ_tot with γ_σσ' = γ_tot/4
            vgamma[i] = 0.25 * (out.vgamma[0] + out.vgamma[1] + out.vgamma[2]);
        }
    }

    fn eval_exc_vxc_gga_polar(
        &self,
        n: usize,
        rho: &[f64],
        gamma: &[f64],
        eps: &mut [f64],
        vrho: &mut [f64],
        vgamma: &mut [f64],
    ) {
        for i in 0..n {
            let out = self.eval_point_gga(
                [rho[2 * i], rho[2 * i + 1]],
                [gamma[3 * i], gamma[3 * i + 1], gamma[3 * i + 2]],
            );
            eps[i] = out.eps;
            vrho[2 * i] = out.vrho[0];
            vrho[2 * i + 1] = out.vrho[1];
            vgamma[3 * i] = out.vgamma[0];
            vgamma[3 * i + 1] = out.vgamma[1];
            vgamma[3 * i + 2] = out.vgamma[2];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn fd_check_lda(f: BuiltinFunctional, rho: [f64; 2]) {
        let out = f.eval_point_lda(rho);
        let h = 1e-6;
        for s in 0..2 {
            let mut rp = rho;
            rp[s] += h;
            let mut rm = rho;
            rm[s] -= h;
            let ep = f.eval_point_lda(rp);
            let em = f.eval_point_lda(rm);
            let e_p = ep.eps * (rp[0] + rp[1]);
            let e_m = em.eps * (rm[0] + rm[1]);
            let fd = (e_p - e_m) / (2.0 * h);
            assert_relative_eq!(out.vrho[s], fd, max_relative = 1e-5, epsilon = 1e-8);
        }
    }

    fn fd_check_gga(f: BuiltinFunctional, rho: [f64; 2], gamma: [f64; 3]) {
        let out = f.eval_point_gga(rho, gamma);
        let h = 1e-6;
        for s in 0..2 {
            let mut rp = rho;
            rp[s] += h;
            let mut rm = rho;
            rm[s] -= h;
            let e_p = f.eval_point_gga(rp, gamma).eps * (rp[0] + rp[1]);
            let e_m = f.eval_point_gga(rm, gamma).eps * (rm[0] + rm[1]);
            let fd = (e_p - e_m) / (2.0 * h);
            assert_relative_eq!(out.vrho[s], fd, max_relative = 2e-5, epsilon = 1e-8);
        }
        let rho_t = rho[0] + rho[1];
        for g in 0..3 {
            let h = 1e-7;
            let mut gp = gamma;
            gp[g] += h;
            let mut gm = gamma;
            gm[g] -= h;
            let e_p = f.eval_point_gga(rho, gp).eps * rho_t;
            let e_m = f.eval_point_gga(rho, gm).eps * rho_t;
            let fd = (e_p - e_m) / (2.0 * h);
            assert_relative_eq!(out.vgamma[g], fd, max_relative = 2e-5, epsilon = 1e-8);
        }
    }

    #[test]
    fn lda_derivatives_match_finite_difference() {
        for f in [BuiltinFunctional::SlaterX, BuiltinFunctional::Svwn5] {
            fd_check_lda(f, [0.3, 0.3]);
            fd_check_lda(f, [0.8, 0.1]);
            fd_check_lda(f, [0.02, 0.05]);
        }
    }

    #[test]
    fn gga_derivatives_match_finite_difference() {
        for f in [
            BuiltinFunctional::PbeX,
            BuiltinFunctional::Pbe,
            BuiltinFunctional::Blyp,
        ] {
            fd_check_gga(f, [0.3, 0.3], [0.04, 0.02, 0.04]);
            fd_check_gga(f, [0.7, 0.2], [0.1, 0.05, 0.02]);
            fd_check_gga(f, [0.05, 0.04], [0.002, 0.001, 0.003]);
        }
    }

    #[test]
    fn unpolarized_equals_polarized_at_zeta_zero() {
        let f = BuiltinFunctional::Pbe;
        let (rho_t, gamma_t) = (0.47, 0.083);
        let mut eps_u = [0.0];
        let mut vrho_u = [0.0];
        let mut vgamma_u = [0.0];
        f.eval_exc_vxc_gga(1, &[rho_t], &[gamma_t], &mut eps_u, &mut vrho_u, &mut vgamma_u);

        let rho_p = [0.5 * rho_t, 0.5 * rho_t];
        let gamma_p = [0.25 * gamma_t, 0.25 * gamma_t, 0.25 * gamma_t];
        let mut eps_p = [0.0];
        let mut vrho_p = [0.0; 2];
        let mut vgamma_p = [0.0; 3];
        f.eval_exc_vxc_gga_polar(1, &rho_p, &gamma_p, &mut eps_p, &mut vrho_p, &mut vgamma_p);

        assert_relative_eq!(eps_u[0], eps_p[0], epsilon = 1e-15);
        assert_relative_eq!(vrho_u[0], vrho_p[0], epsilon = 1e-15);
    }

    #[test]
    fn slater_matches_closed_form() {
        // Unpolarized Slater: ε = Cx ρ^{1/3}, v = (4/3) Cx ρ^{1/3}
        let cx = -0.75 * (3.0 / std::f64::consts::PI).powf(1.0 / 3.0);
        let rho = 0.37;
        let mut eps = [0.0];
        let mut v = [0.0];
        BuiltinFunctional::SlaterX.eval_exc_vxc_lda(1, &[rho], &mut eps, &mut v);
        assert_relative_eq!(eps[0], cx * rho.powf(1.0 / 3.0), epsilon = 1e-13);
        assert_relative_eq!(v[0], 4.0 / 3.0 * cx * rho.powf(1.0 / 3.0), epsilon = 1e-13);
    }

    #[test]
    fn vwn5_paramagnetic_reference_scale() {
        // ε_c at rs = 1, ζ = 0 is ≈ −0.060 Ha in the VWN5 fit
        let rho = 3.0 / (4.0 * std::f64::consts::PI); // rs = 1
        let out = vwn5_c_point([0.5 * rho, 0.5 * rho]);
        assert!(out.eps < -0.055 && out.eps > -0.065, "eps = {}", out.eps);
    }
}
