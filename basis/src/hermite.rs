//! McMurchie–Davidson Hermite machinery.
//!
//! Hermite expansion coefficients E_t^{ij}, the Hermite Coulomb tensor
//! R_{tuv}, point-charge potential blocks over a shell pair, and analytic
//! (ab|cd) two-electron integrals for low angular momenta. The potential
//! block is the scalar kernel behind the batched exchange integral drivers;
//! the analytic integrals provide Schwarz-style bounds and test anchors.

extern crate nalgebra as na;

use crate::boys::BoysTable;
use crate::shell::{cart_component_norm, cart_components, Shell};
use crate::shell_pair::ShellPair;
use itertools::iproduct;
use na::Vector3;
use std::f64::consts::PI;

/// Hermite expansion coefficient E_t^{ij} for the 1D Gaussian product with
/// exponents (a, b) and center displacement `q_ab` = A − B.
pub fn hermite_e(i: i32, j: i32, t: i32, q_ab: f64, a: f64, b: f64) -> f64 {
    let p = a + b;
    let q = a * b / p;
    if t < 0 || t > i + j || i < 0 || j < 0 {
        0.0
    } else if i == 0 && j == 0 && t == 0 {
        (-q * q_ab * q_ab).exp()
    } else if j == 0 {
        hermite_e(i - 1, j, t - 1, q_ab, a, b) / (2.0 * p)
            - hermite_e(i - 1, j, t, q_ab, a, b) * q * q_ab / a
            + hermite_e(i - 1, j, t + 1, q_ab, a, b) * ((t + 1) as f64)
    } else {
        hermite_e(i, j - 1, t - 1, q_ab, a, b) / (2.0 * p)
            + hermite_e(i, j - 1, t, q_ab, a, b) * q * q_ab / b
            + hermite_e(i, j - 1, t + 1, q_ab, a, b) * ((t + 1) as f64)
    }
}

/// Hermite Coulomb tensor R^n_{tuv}(p, PC) given Boys values
/// `fm[n] = F_n(p·|PC|²)`.
pub fn hermite_r(t: i32, u: i32, v: i32, n: i32, p: f64, pc: &Vector3<f64>, fm: &[f64]) -> f64 {
    if t < 0 || u < 0 || v < 0 {
        0.0
    } else if t == 0 && u == 0 && v == 0 {
        (-2.0 * p).powi(n) * fm[n as usize]
    } else if t > 0 {
        (t - 1) as f64 * hermite_r(t - 2, u, v, n + 1, p, pc, fm)
            + pc.x * hermite_r(t - 1, u, v, n + 1, p, pc, fm)
    } else if u > 0 {
        (u - 1) as f64 * hermite_r(t, u - 2, v, n + 1, p, pc, fm)
            + pc.y * hermite_r(t, u - 1, v, n + 1, p, pc, fm)
    } else {
        (v - 1) as f64 * hermite_r(t, u, v - 2, n + 1, p, pc, fm)
            + pc.z * hermite_r(t, u, v - 1, n + 1, p, pc, fm)
    }
}

/// Potential of the (A,B) shell-pair charge distributions at point `c`:
/// out(μ,ν) += Σ_prims (2π/p) Σ_{tuv} E_t E_u E_v R_{tuv}(p, P−c), row-major
/// `na × nb` into `out`.
///
/// This is the per-point kernel of the semi-numerical exchange G build.
pub fn pair_potential_block(
    la: i32,
    lb: i32,
    pair: &ShellPair,
    c: &Vector3<f64>,
    boys: &BoysTable,
    out: &mut [f64],
) {
    let comps_a = cart_components(la);
    let comps_b = cart_components(lb);
    let lt = (la + lb) as usize;
    let mut fm = vec![0.0; lt + 1];

    for pp in &pair.prim_pairs {
        let p = pp.p;
        let pc = pp.center - c;
        boys.eval(lt, p * pc.norm_squared(), &mut fm);
        let pref = pp.k_coeff * 2.0 * PI / p;
        for (ia, &(ax, ay, az)) in comps_a.iter().enumerate() {
            let na_norm = cart_component_norm(ax, ay, az);
            for (ib, &(bx, by, bz)) in comps_b.iter().enumerate() {
                let nb_norm = cart_component_norm(bx, by, bz);
                let mut val = 0.0;
                for (t, u, v) in iproduct!(0..=(ax + bx), 0..=(ay + by), 0..=(az + bz)) {
                    let e = hermite_e(ax, bx, t, pair.ab.x, pp.alpha_a, pp.alpha_b)
                        * hermite_e(ay, by, u, pair.ab.y, pp.alpha_a, pp.alpha_b)
                        * hermite_e(az, bz, v, pair.ab.z, pp.alpha_a, pp.alpha_b);
                    if e == 0.0 {
                        continue;
                    }
                    val += e * hermite_r(t, u, v, 0, p, &pc, &fm);
                }
                out[ia * comps_b.len() + ib] += pref * na_norm * nb_norm * val;
            }
        }
    }
}

/// Analytic overlap block ⟨a|b⟩ over cartesian components, row-major
/// `na × nb`.
pub fn overlap_shell_pair(sa: &Shell, sb: &Shell) -> Vec<f64> {
    let comps_a = cart_components(sa.l);
    let comps_b = cart_components(sb.l);
    let nb = comps_b.len();
    let mut out = vec![0.0; comps_a.len() * nb];
    let ab = sa.center - sb.center;

    for (&aa, &ca) in sa.alpha.iter().zip(sa.coeff.iter()) {
        for (&bb, &cb) in sb.alpha.iter().zip(sb.coeff.iter()) {
            let p = aa + bb;
            let pref = ca * cb * (PI / p).powf(1.5);
            for (ia, &(ax, ay, az)) in comps_a.iter().enumerate() {
                for (ib, &(bx, by, bz)) in comps_b.iter().enumerate() {
                    let val = hermite_e(ax, bx, 0, ab.x, aa, bb)
                        * hermite_e(ay, by, 0, ab.y, aa, bb)
                        * hermite_e(az, bz, 0, ab.z, aa, bb);
                    out[ia * nb + ib] += pref
                        * cart_component_norm(ax, ay, az)
                        * cart_component_norm(bx, by, bz)
                        * val;
                }
            }
        }
    }
    out
}

/// Analytic (ab|cd) over cartesian components, returned as a row-major
/// `na·nb·nc·nd` array. Exact for any ℓ, used here for ℓ ≤ 2.
pub fn eri_shell_quartet(
    sa: &Shell,
    sb: &Shell,
    sc: &Shell,
    sd: &Shell,
    boys: &BoysTable,
) -> Vec<f64> {
    let (la, lb, lc, ld) = (sa.l, sb.l, sc.l, sd.l);
    let comps_a = cart_components(la);
    let comps_b = cart_components(lb);
    let comps_c = cart_components(lc);
    let comps_d = cart_components(ld);
    let (nb, nc, nd) = (comps_b.len(), comps_c.len(), comps_d.len());
    let mut out = vec![0.0; comps_a.len() * nb * nc * nd];

    let ab = sa.center - sb.center;
    let cd = sc.center - sd.center;
    let lt = (la + lb + lc + ld) as usize;
    let mut fm = vec![0.0; lt + 1];

    for (&aa, &ca) in sa.alpha.iter().zip(sa.coeff.iter()) {
        for (&ab_e, &cb) in sb.alpha.iter().zip(sb.coeff.iter()) {
            let p = aa + ab_e;
            let pp = (aa * sa.center + ab_e * sb.center) / p;
            for (&ac, &cc) in sc.alpha.iter().zip(sc.coeff.iter()) {
                for (&ad, &cdc) in sd.alpha.iter().zip(sd.coeff.iter()) {
                    let q = ac + ad;
                    let qq = (ac * sc.center + ad * sd.center) / q;
                    let omega = p * q / (p + q);
                    let pq = pp - qq;
                    boys.eval(lt, omega * pq.norm_squared(), &mut fm);
                    let pref = ca * cb * cc * cdc * 2.0 * PI.powf(2.5)
                        / (p * q * (p + q).sqrt());

                    let mut idx = 0;
                    for &(ax, ay, az) in &comps_a {
                        for &(bx, by, bz) in &comps_b {
                            for &(cx, cy, cz) in &comps_c {
                                for &(dx, dy, dz) in &comps_d {
                                    let mut val = 0.0;
                                    for (t1, u1, v1) in
                                        iproduct!(0..=(ax + bx), 0..=(ay + by), 0..=(az + bz))
                                    {
                                        let e123 = hermite_e(ax, bx, t1, ab.x, aa, ab_e)
                                            * hermite_e(ay, by, u1, ab.y, aa, ab_e)
                                            * hermite_e(az, bz, v1, ab.z, aa, ab_e);
                                        if e123 == 0.0 {
                                            continue;
                                        }
                                        for (t2, u2, v2) in iproduct!(
                                            0..=(cx + dx),
                                            0..=(cy + dy),
                                            0..=(cz + dz)
                                        ) {
                                            let f123 = hermite_e(cx, dx, t2, cd.x, ac, ad)
                                                * hermite_e(cy, dy, u2, cd.y, ac, ad)
                                                * hermite_e(cz, dz, v2, cd.z, ac, ad);
                                            if f123 == 0.0 {
                                                continue;
                                            }
                                            let sign =
                                                if (t2 + u2 + v2) % 2 == 0 { 1.0 } else { -1.0 };
                                            val += e123
                                                * f123
                                                * sign
                                                * hermite_r(
                                                    t1 + t2,
                                                    u1 + u2,
                                                    v1 + v2,
                                                    0,
                                                    omega,
                                                    &pq,
                                                    &fm,
                                                );
                                        }
                                    }
                                    let norm = cart_component_norm(ax, ay, az)
                                        * cart_component_norm(bx, by, bz)
                                        * cart_component_norm(cx, cy, cz)
                                        * cart_component_norm(dx, dy, dz);
                                    out[idx] += pref * norm * val;
                                    idx += 1;
                                }
                            }
                        }
                    }
                }
            }
        }
    }
    out
}

/// Max-Coulomb bound of a shell pair: √(max_{μν} (μν|μν)).
pub fn max_coulomb(sa: &Shell, sb: &Shell, boys: &BoysTable) -> f64 {
    let quartet = eri_shell_quartet(sa, sb, sa, sb, boys);
    let (na, nb) = (sa.size(), sb.size());
    let mut vmax: f64 = 0.0;
    for mu in 0..na {
        for nu in 0..nb {
            // diagonal element (μν|μν) of the (ab|ab) quartet
            let idx = ((mu * nb + nu) * na + mu) * nb + nu;
            vmax = vmax.max(quartet[idx].abs());
        }
    }
    vmax.sqrt()
}
