//! Atom-centered molecular quadrature grids.
//!
//! Gauss–Legendre radial shells times small octahedral angular sets,
//! chunked into spatial tasks with per-task basis screening. Weights are
//! emitted unpartitioned; the integrator applies the partition scheme on
//! first use.

extern crate nalgebra as na;

use crate::task::{BfnScreening, XCTask};
use basis::{BasisSet, MolMeta, Molecule};
use na::Vector3;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AngularOrder {
    /// 6-point octahedral set (exact through ℓ = 3).
    Lebedev6,
    /// 26-point set (exact through ℓ = 7).
    Lebedev26,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MolGridSpec {
    pub n_rad: usize,
    pub angular: AngularOrder,
    pub r_max: f64,
    pub max_points_per_task: usize,
    /// Collocation screening tolerance for per-task shell lists
    /// (0 disables screening).
    pub bfn_tol: f64,
}

impl Default for MolGridSpec {
    fn default() -> Self {
        MolGridSpec {
            n_rad: 64,
            angular: AngularOrder::Lebedev26,
            r_max: 12.0,
            max_points_per_task: 128,
            bfn_tol: 1e-14,
        }
    }
}

/// Gauss–Legendre nodes and weights on [a, b] (Newton iteration on P_n).
fn gauss_legendre(n: usize, a: f64, b: f64) -> (Vec<f64>, Vec<f64>) {
    assert!(n >= 2);
    let m = (n + 1) / 2;
    let mut x = vec![0.0_f64; n];
    let mut w = vec![0.0_f64; n];
    let eps = 1e-14;
    for i in 0..m {
        let nn = n as f64;
        let mut z = (PI * (i as f64 + 0.75) / (nn + 0.5)).cos();
        loop {
            let (p1, p2) = legendre_pn(n, z);
            let pp = (nn * (z * p1 - p2)) / (z * z - 1.0);
            let z1 = z;
            z = z1 - p1 / pp;
            if (z - z1).abs() < eps {
                let xm = 0.5 * (b + a);
                let xl = 0.5 * (b - a);
                x[i] = xm - xl * z;
                x[n - 1 - i] = xm + xl * z;
                let wi = 2.0 * xl / ((1.0 - z * z) * pp * pp);
                w[i] = wi;
                w[n - 1 - i] = wi;
                break;
            }
        }
    }
    (x, w)
}

/// Returns (P_n(z), P_{n−1}(z)).
fn legendre_pn(n: usize, z: f64) -> (f64, f64) {
    let mut p1 = 1.0;
    let mut p2 = 0.0;
    for j in 1..=n {
        let p3 = p2;
        p2 = p1;
        p1 = ((2.0 * j as f64 - 1.0) * z * p2 - (j as f64 - 1.0) * p3) / (j as f64);
    }
    (p1, p2)
}

fn angular_set(order: AngularOrder) -> Vec<(Vector3<f64>, f64)> {
    let four_pi = 4.0 * PI;
    match order {
        AngularOrder::Lebedev6 => {
            let w = four_pi / 6.0;
            octahedron_vertices()
                .into_iter()
                .map(|d| (d, w))
                .collect()
        }
        AngularOrder::Lebedev26 => {
            let mut pts = Vec::with_capacity(26);
            let w1 = four_pi / 21.0;
            for d in octahedron_vertices() {
                pts.push((d, w1));
            }
            let w2 = four_pi * 4.0 / 105.0;
            let s = 1.0 / 2.0_f64.sqrt();
            for (i, j) in [(0, 1), (0, 2), (1, 2)] {
                for si in [s, -s] {
                    for sj in [s, -s] {
                        let mut d = Vector3::zeros();
                        d[i] = si;
                        d[j] = sj;
                        pts.push((d, w2));
                    }
                }
            }
            let w3 = four_pi * 27.0 / 840.0;
            let c = 1.0 / 3.0_f64.sqrt();
            for sx in [c, -c] {
                for sy in [c, -c] {
                    for sz in [c, -c] {
                        pts.push((Vector3::new(sx, sy, sz), w3));
                    }
                }
            }
            pts
        }
    }
}

fn octahedron_vertices() -> Vec<Vector3<f64>> {
    vec![
        Vector3::new(1.0, 0.0, 0.0),
        Vector3::new(-1.0, 0.0, 0.0),
        Vector3::new(0.0, 1.0, 0.0),
        Vector3::new(0.0, -1.0, 0.0),
        Vector3::new(0.0, 0.0, 1.0),
        Vector3::new(0.0, 0.0, -1.0),
    ]
}

/// Shells whose smallest exponent still reaches any of the points.
fn screen_shells(basis: &BasisSet, pts: &[Vector3<f64>], tol: f64) -> Vec<usize> {
    if tol <= 0.0 {
        return (0..basis.nshells()).collect();
    }
    let log_tol = -tol.ln();
    (0..basis.nshells())
        .filter(|&ish| {
            let sh = basis.shell(ish);
            let d2_min = pts
                .iter()
                .map(|p| (p - sh.center).norm_squared())
                .fold(f64::INFINITY, f64::min);
            sh.min_alpha() * d2_min < log_tol
        })
        .collect()
}

/// Build the task list of an atom-centered molecular grid.
pub fn build_tasks(
    mol: &Molecule,
    meta: &MolMeta,
    basis: &BasisSet,
    spec: &MolGridSpec,
) -> Vec<XCTask> {
    let (r_nodes, r_weights) = gauss_legendre(spec.n_rad, 0.0, spec.r_max);
    let ang = angular_set(spec.angular);
    let positions = mol.positions();

    let mut tasks = Vec::new();
    for (ia, ra) in positions.iter().enumerate() {
        let mut points = Vec::new();
        let mut weights = Vec::new();
        let mut flush = |points: &mut Vec<Vector3<f64>>, weights: &mut Vec<f64>, tasks: &mut Vec<XCTask>| {
            if points.is_empty() {
                return;
            }
            let pts = std::mem::take(points);
            let wts = std::mem::take(weights);
            let shell_list = screen_shells(basis, &pts, spec.bfn_tol);
            let nbe = basis.nbf_subset(shell_list.iter().cloned());
            tasks.push(XCTask {
                iparent: ia,
                dist_nearest: meta.dist_nearest[ia],
                points: pts,
                weights: wts,
                bfn_screening: BfnScreening { shell_list, nbe },
                cou_screening: Default::default(),
            });
        };
        for (ir, &r) in r_nodes.iter().enumerate() {
            let wr = r_weights[ir] * r * r;
            for &(dir, wang) in &ang {
                points.push(ra + dir * r);
                weights.push(wr * wang);
                if points.len() >= spec.max_points_per_task {
                    flush(&mut points, &mut weights, &mut tasks);
                }
            }
        }
        flush(&mut points, &mut weights, &mut tasks);
    }
    // drop tasks with no surviving shells
    tasks.retain(|t| !t.bfn_screening.shell_list.is_empty());
    tasks
}

#[cfg(test)]
mod tests {
    use super::*;
    use basis::{Atom, Shell};
    use approx::assert_relative_eq;

    #[test]
    fn gauss_legendre_integrates_polynomials() {
        let (x, w) = gauss_legendre(8, 0.0, 2.0);
        // ∫₀² x³ dx = 4
        let s: f64 = x.iter().zip(w.iter()).map(|(&xi, &wi)| wi * xi * xi * xi).sum();
        assert_relative_eq!(s, 4.0, epsilon = 1e-12);
    }

    #[test]
    fn angular_weights_sum_to_sphere() {
        for order in [AngularOrder::Lebedev6, AngularOrder::Lebedev26] {
            let ang = angular_set(order);
            let s: f64 = ang.iter().map(|&(_, w)| w).sum();
            assert_relative_eq!(s, 4.0 * PI, epsilon = 1e-12);
            for &(d, _) in &ang {
                assert_relative_eq!(d.norm(), 1.0, epsilon = 1e-14);
            }
        }
    }

    #[test]
    fn grid_integrates_gaussian_density() {
        // ∫ e^{−2r²} d³r = (π/2)^{3/2}
        let mol = Molecule::new(vec![Atom::new("He", Vector3::zeros())]);
        let meta = MolMeta::new(&mol);
        let basis = BasisSet::new(vec![Shell::new(0, vec![1.0], vec![1.0], Vector3::zeros(), 0)]);
        let spec = MolGridSpec {
            n_rad: 48,
            angular: AngularOrder::Lebedev6,
            r_max: 10.0,
            max_points_per_task: 64,
            bfn_tol: 0.0,
        };
        let tasks = build_tasks(&mol, &meta, &basis, &spec);
        assert!(tasks.len() > 1);
        let mut s = 0.0;
        for t in &tasks {
            for (p, w) in t.points.iter().zip(t.weights.iter()) {
                s += w * (-2.0 * p.norm_squared()).exp();
            }
        }
        assert_relative_eq!(s, (PI / 2.0).powf(1.5), max_relative = 1e-10);
    }

    #[test]
    fn tasks_screen_far_shells() {
        let mol = Molecule::new(vec![
            Atom::new("H", Vector3::zeros()),
            Atom::new("H", Vector3::new(0.0, 0.0, 60.0)),
        ]);
        let meta = MolMeta::new(&mol);
        let basis = BasisSet::new(vec![
            Shell::new(0, vec![1.0], vec![1.0], Vector3::zeros(), 0),
            Shell::new(0, vec![1.0], vec![1.0], Vector3::new(0.0, 0.0, 60.0), 1),
        ]);
        let spec = MolGridSpec {
            n_rad: 16,
            angular: AngularOrder::Lebedev6,
            r_max: 8.0,
            max_points_per_task: 1024,
            bfn_tol: 1e-14,
        };
        let tasks = build_tasks(&mol, &meta, &basis, &spec);
        // each atom's tasks only see their own shell
        for t in &tasks {
            assert_eq!(t.bfn_screening.shell_list, vec![t.iparent]);
            assert_eq!(t.nbe(), 1);
        }
    }
}
