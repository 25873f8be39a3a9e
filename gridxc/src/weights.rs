//! Partition-weight modification.
//!
//! Raw per-atom quadrature weights are turned into molecular weights by a
//! space-partitioning scheme, applied in place on the task weights. The
//! operation runs at most once per load-balancer lifetime; the caller
//! latches it.

extern crate nalgebra as na;

use crate::task::XCTask;
use basis::MolMeta;
use na::Vector3;
use serde::{Deserialize, Serialize};

/// Frisch cutoff of the Stratmann–Scuseria–Frisch scheme.
const SSF_A: f64 = 0.64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum XCWeightScheme {
    Ssf,
    Becke,
}

/// SSF switching polynomial g(x) = (35x − 35x³ + 21x⁵ − 5x⁷)/16 on [−1, 1].
#[inline]
fn ssf_g(x: f64) -> f64 {
    let x2 = x * x;
    x * (35.0 + x2 * (-35.0 + x2 * (21.0 - 5.0 * x2))) / 16.0
}

#[inline]
fn ssf_s(mu: f64) -> f64 {
    if mu <= -SSF_A {
        1.0
    } else if mu >= SSF_A {
        0.0
    } else {
        0.5 * (1.0 - ssf_g(mu / SSF_A))
    }
}

/// Becke smoothing: three passes of f(μ) = (3μ − μ³)/2.
#[inline]
fn becke_s(mu: f64) -> f64 {
    let mut m = mu;
    for _ in 0..3 {
        m = 0.5 * m * (3.0 - m * m);
    }
    0.5 * (1.0 - m)
}

/// Modify one task's weights in place.
pub fn modify_weights_task(
    scheme: XCWeightScheme,
    positions: &[Vector3<f64>],
    meta: &MolMeta,
    task: &mut XCTask,
) {
    let natoms = positions.len();
    if natoms < 2 {
        return;
    }
    let iparent = task.iparent;
    // Points closer to the parent than this radius keep their weight
    // untouched (SSF screening shortcut).
    let r_cut = 0.5 * (1.0 - SSF_A) * task.dist_nearest;

    let mut dist = vec![0.0; natoms];
    let mut cell = vec![0.0; natoms];

    for (pt, w) in task.points.iter().zip(task.weights.iter_mut()) {
        if scheme == XCWeightScheme::Ssf && (pt - positions[iparent]).norm() < r_cut {
            continue;
        }
        for a in 0..natoms {
            dist[a] = (pt - positions[a]).norm();
            cell[a] = 1.0;
        }
        for a in 0..natoms {
            for b in 0..a {
                let mu = (dist[a] - dist[b]) / meta.rab[(a, b)];
                let s = match scheme {
                    XCWeightScheme::Ssf => ssf_s(mu),
                    XCWeightScheme::Becke => becke_s(mu),
                };
                cell[a] *= s;
                cell[b] *= 1.0 - s;
            }
        }
        let denom: f64 = cell.iter().sum();
        if denom > 0.0 && denom.is_finite() {
            *w *= cell[iparent] / denom;
        } else {
            *w = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::BfnScreening;
    use basis::{Atom, MolMeta, Molecule};

    fn two_atom_setup() -> (Vec<Vector3<f64>>, MolMeta) {
        let mol = Molecule::new(vec![
            Atom::new("H", Vector3::new(0.0, 0.0, 0.0)),
            Atom::new("H", Vector3::new(0.0, 0.0, 2.0)),
        ]);
        (mol.positions(), MolMeta::new(&mol))
    }

    fn mk_task(iparent: usize, pts: Vec<Vector3<f64>>, dist_nearest: f64) -> XCTask {
        let n = pts.len();
        XCTask {
            iparent,
            dist_nearest,
            points: pts,
            weights: vec![1.0; n],
            bfn_screening: BfnScreening::default(),
            cou_screening: Default::default(),
        }
    }

    #[test]
    fn switching_functions_bracket() {
        assert_eq!(ssf_s(-1.0), 1.0);
        assert_eq!(ssf_s(1.0), 0.0);
        assert!((ssf_s(0.0) - 0.5).abs() < 1e-15);
        assert!((becke_s(0.0) - 0.5).abs() < 1e-15);
        assert!(becke_s(-0.999) > 0.999);
    }

    #[test]
    fn cell_functions_partition_unity() {
        // weights of the two atoms' copies of the same point must sum to
        // the unmodified weight
        let (pos, meta) = two_atom_setup();
        let pt = Vector3::new(0.3, -0.2, 0.9);
        for scheme in [XCWeightScheme::Ssf, XCWeightScheme::Becke] {
            let mut t0 = mk_task(0, vec![pt], 2.0);
            let mut t1 = mk_task(1, vec![pt], 2.0);
            modify_weights_task(scheme, &pos, &meta, &mut t0);
            modify_weights_task(scheme, &pos, &meta, &mut t1);
            assert!((t0.weights[0] + t1.weights[0] - 1.0).abs() < 1e-12);
            assert!(t0.weights[0] >= 0.0 && t1.weights[0] >= 0.0);
        }
    }

    #[test]
    fn point_deep_inside_parent_keeps_weight() {
        let (pos, meta) = two_atom_setup();
        let pt = Vector3::new(0.0, 0.0, 0.01);
        let mut t = mk_task(0, vec![pt], 2.0);
        modify_weights_task(XCWeightScheme::Ssf, &pos, &meta, &mut t);
        assert_eq!(t.weights[0], 1.0);
    }

    #[test]
    fn point_near_other_atom_loses_weight() {
        let (pos, meta) = two_atom_setup();
        let pt = Vector3::new(0.0, 0.0, 1.99);
        let mut t = mk_task(0, vec![pt], 2.0);
        modify_weights_task(XCWeightScheme::Ssf, &pos, &meta, &mut t);
        assert!(t.weights[0] < 1e-10);
    }

    #[test]
    fn single_atom_is_untouched() {
        let mol = Molecule::new(vec![Atom::new("He", Vector3::zeros())]);
        let meta = MolMeta::new(&mol);
        let mut t = mk_task(0, vec![Vector3::new(1.0, 0.0, 0.0)], f64::INFINITY);
        modify_weights_task(XCWeightScheme::Ssf, &mol.positions(), &meta, &mut t);
        assert_eq!(t.weights[0], 1.0);
    }
}
