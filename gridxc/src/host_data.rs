//! Per-call scratch arenas.
//!
//! Sized once per integrator call from the load balancer's maxima and
//! reused across every task of every batch. Point-wise arrays are sized
//! for the polarized (interleaved) case; the meta-GGA extension fields are
//! allocated only for derivative order 2, which the entry points reject,
//! so they stay empty in practice.

/// Derivative order of the density functional: 0 = LDA, 1 = GGA.
pub type DerivOrder = usize;

#[derive(Debug, Clone)]
pub struct XCHostData {
    pub eps: Vec<f64>,
    pub vrho: Vec<f64>,
    pub gamma: Vec<f64>,
    pub vgamma: Vec<f64>,
    pub tau: Vec<f64>,
    pub vtau: Vec<f64>,
    pub lapl: Vec<f64>,
    pub vlapl: Vec<f64>,

    /// Interleaved functional inputs (ρ stride 2, γ stride 3).
    pub den_pack: Vec<f64>,
    pub gamma_pack: Vec<f64>,

    /// Per-spin densities (ρ↑, ρ↓) staged for interleaving.
    pub den_pos: Vec<f64>,
    pub den_neg: Vec<f64>,
    /// Per-spin γ components staged for interleaving.
    pub gamma_pp: Vec<f64>,
    pub gamma_pm: Vec<f64>,
    pub gamma_mm: Vec<f64>,
    /// De-interleaved functional outputs.
    pub vrho_pos: Vec<f64>,
    pub vrho_neg: Vec<f64>,
    pub vgamma_pp: Vec<f64>,
    pub vgamma_pm: Vec<f64>,
    pub vgamma_mm: Vec<f64>,

    /// Per-channel densities and gradients on the task's points.
    pub den_s: Vec<f64>,
    pub den_z: Vec<f64>,
    pub den_y: Vec<f64>,
    pub den_x: Vec<f64>,
    pub dden_s: Vec<f64>,
    pub dden_z: Vec<f64>,

    /// Collocation table φ (and ∇φ for n_deriv ≥ 1), column-major.
    pub basis_eval: Vec<f64>,
    /// X = P·φ for the channel currently being routed.
    pub xmat: Vec<f64>,
    /// Z factor of the rank-2k update.
    pub zmat: Vec<f64>,
    pub mmat: Vec<f64>,
    /// Packed sub-density / accumulation scratch.
    pub nbe_scr: Vec<f64>,
}

impl XCHostData {
    pub fn new(n_deriv: DerivOrder, nbf: usize, max_npts: usize, max_npts_x_nbe: usize) -> Self {
        let g = (n_deriv > 0) as usize;
        let mgga = (n_deriv > 1) as usize;
        XCHostData {
            eps: vec![0.0; max_npts],
            vrho: vec![0.0; 2 * max_npts],
            gamma: vec![0.0; 3 * g * max_npts],
            vgamma: vec![0.0; 3 * g * max_npts],
            tau: vec![0.0; mgga * max_npts],
            vtau: vec![0.0; mgga * max_npts],
            lapl: vec![0.0; mgga * max_npts],
            vlapl: vec![0.0; mgga * max_npts],
            den_pack: vec![0.0; 2 * max_npts],
            gamma_pack: vec![0.0; 3 * g * max_npts],
            den_pos: vec![0.0; max_npts],
            den_neg: vec![0.0; max_npts],
            gamma_pp: vec![0.0; g * max_npts],
            gamma_pm: vec![0.0; g * max_npts],
            gamma_mm: vec![0.0; g * max_npts],
            vrho_pos: vec![0.0; max_npts],
            vrho_neg: vec![0.0; max_npts],
            vgamma_pp: vec![0.0; g * max_npts],
            vgamma_pm: vec![0.0; g * max_npts],
            vgamma_mm: vec![0.0; g * max_npts],
            den_s: vec![0.0; max_npts],
            den_z: vec![0.0; max_npts],
            den_y: vec![0.0; max_npts],
            den_x: vec![0.0; max_npts],
            dden_s: vec![0.0; 3 * g * max_npts],
            dden_z: vec![0.0; 3 * g * max_npts],
            basis_eval: vec![0.0; (3 * g + 1) * max_npts_x_nbe],
            xmat: vec![0.0; max_npts_x_nbe],
            zmat: vec![0.0; max_npts_x_nbe],
            mmat: vec![0.0; 3 * mgga * max_npts_x_nbe],
            nbe_scr: vec![0.0; nbf * nbf],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lda_sizing_skips_gradient_arrays() {
        let d = XCHostData::new(0, 10, 32, 32 * 10);
        assert_eq!(d.eps.len(), 32);
        assert_eq!(d.vrho.len(), 64);
        assert!(d.gamma.is_empty());
        assert!(d.gamma_pp.is_empty());
        assert!(d.tau.is_empty());
        assert_eq!(d.basis_eval.len(), 320);
        assert_eq!(d.nbe_scr.len(), 100);
    }

    #[test]
    fn gga_sizing_has_gradients_but_no_mgga() {
        let d = XCHostData::new(1, 4, 16, 16 * 4);
        assert_eq!(d.gamma.len(), 3 * 16);
        assert_eq!(d.basis_eval.len(), 4 * 64);
        assert_eq!(d.gamma_pp.len(), 16);
        assert_eq!(d.vgamma_pm.len(), 16);
        assert_eq!(d.vrho_pos.len(), 16);
        assert!(d.tau.is_empty());
        assert!(d.mmat.is_empty());
    }
}
