//! Shared fixtures for the integration tests.

extern crate nalgebra as na;

use basis::hermite::overlap_shell_pair;
use basis::{Atom, BasisSet, BasisSetMap, MolMeta, Molecule, Shell};
use gridxc::driver::{make_local_work_driver, ExecutionSpace, LocalWorkDriver};
use gridxc::grid::{build_tasks, MolGridSpec};
use gridxc::{
    BuiltinFunctional, IntegratorSettings, LoadBalancer, LocalReductionDriver,
    ReplicatedXcIntegrator,
};
use na::{DMatrix, DVector, Vector3};

/// Route tracing output through the test harness (idempotent).
pub fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn he_molecule() -> Molecule {
    Molecule::new(vec![Atom::new("He", Vector3::zeros())])
}

/// Two-shell s basis for helium.
pub fn he_basis() -> BasisSet {
    BasisSet::new(vec![
        Shell::new(0, vec![2.5, 0.8], vec![0.4, 0.7], Vector3::zeros(), 0),
        Shell::new(0, vec![0.3], vec![1.0], Vector3::zeros(), 0),
    ])
}

pub fn h2_molecule() -> Molecule {
    Molecule::new(vec![
        Atom::new("H", Vector3::new(0.0, 0.0, 0.0)),
        Atom::new("H", Vector3::new(0.0, 0.0, 1.4)),
    ])
}

/// Hydrogen 6-31G: a three-primitive inner s and a single outer s.
pub fn h2_631g_basis() -> BasisSet {
    let mol = h2_molecule();
    let mut shells = Vec::new();
    for (ia, pos) in mol.positions().into_iter().enumerate() {
        shells.push(Shell::new(
            0,
            vec![18.731_136_96, 2.825_394_365, 0.640_121_692],
            vec![0.033_494_60, 0.234_726_95, 0.813_757_33],
            pos,
            ia,
        ));
        shells.push(Shell::new(0, vec![0.161_277_759], vec![1.0], pos, ia));
    }
    BasisSet::new(shells)
}

/// A small mixed-ℓ basis on H2 exercising every exchange bucket up to d.
pub fn h2_spd_basis() -> BasisSet {
    let mol = h2_molecule();
    let pos = mol.positions();
    BasisSet::new(vec![
        Shell::new(0, vec![1.2], vec![1.0], pos[0], 0),
        Shell::new(1, vec![0.8], vec![1.0], pos[0], 0),
        Shell::new(2, vec![0.7], vec![1.0], pos[0], 0),
        Shell::new(0, vec![1.0], vec![1.0], pos[1], 1),
        Shell::new(1, vec![0.9], vec![1.0], pos[1], 1),
    ])
}

/// A chain of widely spaced hydrogens for partitioner stress.
pub fn h_chain(n: usize, spacing: f64) -> (Molecule, BasisSet) {
    let atoms: Vec<Atom> = (0..n)
        .map(|i| Atom::new("H", Vector3::new(0.0, 0.0, spacing * i as f64)))
        .collect();
    let mol = Molecule::new(atoms);
    let shells: Vec<Shell> = mol
        .positions()
        .into_iter()
        .enumerate()
        .flat_map(|(ia, pos)| {
            vec![
                Shell::new(0, vec![1.3], vec![1.0], pos, ia),
                Shell::new(0, vec![0.35], vec![1.0], pos, ia),
            ]
        })
        .collect();
    (mol, BasisSet::new(shells))
}

pub fn overlap_matrix(basis: &BasisSet) -> DMatrix<f64> {
    let map = BasisSetMap::new(basis);
    let nbf = basis.nbf();
    let mut s = DMatrix::zeros(nbf, nbf);
    for i in 0..basis.nshells() {
        for j in 0..basis.nshells() {
            let block = overlap_shell_pair(basis.shell(i), basis.shell(j));
            let (ni, nj) = (basis.shell(i).size(), basis.shell(j).size());
            for a in 0..ni {
                for b in 0..nj {
                    s[(map.shell_to_first_ao(i) + a, map.shell_to_first_ao(j) + b)] =
                        block[a * nj + b];
                }
            }
        }
    }
    s
}

/// Closed-shell density with exactly `nelec` electrons: P = n·c cᵀ with
/// cᵀS c = 1, built from a smooth non-trivial coefficient vector.
pub fn normalized_density(basis: &BasisSet, nelec: f64) -> DMatrix<f64> {
    let nbf = basis.nbf();
    let s = overlap_matrix(basis);
    let mut c = DVector::from_fn(nbf, |i, _| 1.0 / (1.0 + 0.3 * i as f64));
    let norm = (c.transpose() * &s * &c)[(0, 0)];
    c /= norm.sqrt();
    nelec * &c * c.transpose()
}

pub fn build_load_balancer(mol: &Molecule, basis: &BasisSet, spec: &MolGridSpec) -> LoadBalancer {
    let meta = MolMeta::new(mol);
    let tasks = build_tasks(mol, &meta, basis, spec);
    LoadBalancer::new(mol.clone(), basis.clone(), tasks)
}

pub fn make_integrator(
    func: BuiltinFunctional,
    lb: LoadBalancer,
    space: ExecutionSpace,
    settings: IntegratorSettings,
) -> ReplicatedXcIntegrator {
    let lwd: Box<dyn LocalWorkDriver> =
        make_local_work_driver(space, "default", Default::default()).unwrap();
    ReplicatedXcIntegrator::new(
        Box::new(func),
        lb,
        lwd,
        Box::new(LocalReductionDriver),
        settings,
    )
}

/// Max absolute element difference.
pub fn max_abs_diff(a: &DMatrix<f64>, b: &DMatrix<f64>) -> f64 {
    (a - b).abs().max()
}

/// Max absolute asymmetry |M − Mᵀ|.
pub fn max_asymmetry(m: &DMatrix<f64>) -> f64 {
    max_abs_diff(m, &m.transpose())
}
