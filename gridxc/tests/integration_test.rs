//! End-to-end tests of the XC and exchange integrators.

mod common;

extern crate nalgebra as na;

use basis::hermite::{eri_shell_quartet, pair_potential_block};
use basis::{BasisSetMap, BoysTable, Shell, ShellPairCollection};
use common::*;
use gridxc::driver::ExecutionSpace;
use gridxc::grid::{build_tasks, AngularOrder, MolGridSpec};
use gridxc::partition::generate_device_batch;
use gridxc::{
    BuiltinFunctional, ExxSettings, GridXcError, IntegratorSettings, KsDensity,
};
use na::{DMatrix, Vector3};

fn he_spec() -> MolGridSpec {
    MolGridSpec {
        n_rad: 80,
        angular: AngularOrder::Lebedev6,
        r_max: 14.0,
        max_points_per_task: 96,
        bfn_tol: 0.0,
    }
}

fn h2_spec() -> MolGridSpec {
    MolGridSpec {
        n_rad: 72,
        angular: AngularOrder::Lebedev26,
        r_max: 12.0,
        max_points_per_task: 128,
        bfn_tol: 0.0,
    }
}

#[test]
fn nel_matches_electron_count_on_spherical_atom() {
    init_logging();
    let mol = he_molecule();
    let basis = he_basis();
    let lb = build_load_balancer(&mol, &basis, &he_spec());
    let p = normalized_density(&basis, 2.0);
    let mut integ = make_integrator(
        BuiltinFunctional::Svwn5,
        lb,
        ExecutionSpace::Host,
        Default::default(),
    );
    let out = integ.eval_exc_vxc(&KsDensity::rks(p)).unwrap();
    assert!((out.n_el - 2.0).abs() < 1e-6, "N_el = {}", out.n_el);
    assert!(out.exc < 0.0);
    assert!(max_asymmetry(out.vxc_s()) < 1e-14);
}

#[test]
fn h2_nel_within_grid_accuracy() {
    let mol = h2_molecule();
    let basis = h2_631g_basis();
    let lb = build_load_balancer(&mol, &basis, &h2_spec());
    let p = normalized_density(&basis, 2.0);
    let mut integ = make_integrator(
        BuiltinFunctional::Svwn5,
        lb,
        ExecutionSpace::Host,
        Default::default(),
    );
    let out = integ.eval_exc_vxc(&KsDensity::rks(p.clone())).unwrap();
    // tr(P·S) = 2 by construction; the residual is pure quadrature error
    assert!((out.n_el - 2.0).abs() < 5e-3, "N_el = {}", out.n_el);
    assert!(out.exc < 0.0);
    assert!(max_asymmetry(out.vxc_s()) < 1e-14);
}

#[test]
fn uks_singlet_matches_rks() {
    for func in [
        BuiltinFunctional::Svwn5,
        BuiltinFunctional::Blyp,
        BuiltinFunctional::Pbe,
    ] {
        let mol = h2_molecule();
        let basis = h2_631g_basis();
        let p = normalized_density(&basis, 2.0);

        let lb = build_load_balancer(&mol, &basis, &h2_spec());
        let mut rks = make_integrator(func, lb, ExecutionSpace::Host, Default::default());
        let out_r = rks.eval_exc_vxc(&KsDensity::rks(p.clone())).unwrap();

        let lb = build_load_balancer(&mol, &basis, &h2_spec());
        let mut uks = make_integrator(func, lb, ExecutionSpace::Host, Default::default());
        let pz = DMatrix::zeros(p.nrows(), p.ncols());
        let out_u = uks.eval_exc_vxc(&KsDensity::uks(p.clone(), pz)).unwrap();

        assert!(
            (out_r.exc - out_u.exc).abs() < 1e-10,
            "{func:?}: RKS EXC {} vs UKS {}",
            out_r.exc,
            out_u.exc
        );
        assert!((out_r.n_el - out_u.n_el).abs() < 1e-10);
        assert!(max_abs_diff(out_r.vxc_s(), out_u.vxc_s()) < 1e-10);
        // the spin-z potential of a singlet vanishes identically
        assert!(out_u.vxc_z().unwrap().abs().max() < 1e-10);
    }
}

#[test]
fn gks_collinear_matches_uks_for_lda() {
    let mol = h2_molecule();
    let basis = h2_631g_basis();
    let p_s = normalized_density(&basis, 2.0);
    let p_z = 0.5 * &p_s;
    let zero = DMatrix::zeros(p_s.nrows(), p_s.ncols());

    let lb = build_load_balancer(&mol, &basis, &h2_spec());
    let mut uks = make_integrator(
        BuiltinFunctional::Svwn5,
        lb,
        ExecutionSpace::Host,
        Default::default(),
    );
    let out_u = uks
        .eval_exc_vxc(&KsDensity::uks(p_s.clone(), p_z.clone()))
        .unwrap();

    let lb = build_load_balancer(&mol, &basis, &h2_spec());
    let mut gks = make_integrator(
        BuiltinFunctional::Svwn5,
        lb,
        ExecutionSpace::Host,
        Default::default(),
    );
    let out_g = gks
        .eval_exc_vxc(&KsDensity::gks(p_s, p_z, zero.clone(), zero))
        .unwrap();

    assert!((out_u.exc - out_g.exc).abs() < 1e-12);
    assert!(max_abs_diff(&out_u.vxc[0], &out_g.vxc[0]) < 1e-12);
    assert!(max_abs_diff(&out_u.vxc[1], &out_g.vxc[1]) < 1e-12);
    // no transverse magnetization, no transverse potential
    assert!(out_g.vxc[2].abs().max() < 1e-14);
    assert!(out_g.vxc[3].abs().max() < 1e-14);
}

#[test]
fn shell_batched_partitions_match_across_budgets_and_drivers() {
    init_logging();
    let (mol, basis) = h_chain(6, 3.0);
    let spec = MolGridSpec {
        n_rad: 24,
        angular: AngularOrder::Lebedev6,
        r_max: 8.0,
        max_points_per_task: 64,
        bfn_tol: 1e-14,
    };
    let p = normalized_density(&basis, 6.0);

    // the tight budget must force several batches
    {
        let meta = basis::MolMeta::new(&mol);
        let tasks = build_tasks(&mol, &meta, &basis, &spec);
        let mut order: Vec<usize> = (0..tasks.len()).collect();
        let mut cursor = 0;
        let mut nbatches = 0;
        while cursor < order.len() {
            let (_, next) = generate_device_batch(&tasks, &mut order, cursor, &basis, 5);
            assert!(next > cursor);
            cursor = next;
            nbatches += 1;
        }
        assert!(nbatches >= 2, "nbatches = {nbatches}");
    }

    let run = |space: ExecutionSpace, nbf_threshold: usize| {
        let lb = build_load_balancer(&mol, &basis, &spec);
        let settings = IntegratorSettings {
            nbf_threshold,
            ..Default::default()
        };
        let mut integ = make_integrator(BuiltinFunctional::Pbe, lb, space, settings);
        integ.eval_exc_vxc(&KsDensity::rks(p.clone())).unwrap()
    };

    let tight = run(ExecutionSpace::Host, 5);
    let loose = run(ExecutionSpace::Host, 8000);
    let device = run(ExecutionSpace::Device, 5);

    assert!((tight.exc - loose.exc).abs() < 1e-10);
    assert!((tight.n_el - loose.n_el).abs() < 1e-10);
    assert!(max_abs_diff(tight.vxc_s(), loose.vxc_s()) < 1e-10);

    assert!((tight.exc - device.exc).abs() < 1e-10);
    assert!(max_abs_diff(tight.vxc_s(), device.vxc_s()) < 1e-10);
}

#[test]
fn weight_modification_is_latched() {
    let mol = h2_molecule();
    let basis = h2_631g_basis();
    let lb = build_load_balancer(&mol, &basis, &h2_spec());
    let p = normalized_density(&basis, 2.0);
    let mut integ = make_integrator(
        BuiltinFunctional::SlaterX,
        lb,
        ExecutionSpace::Host,
        Default::default(),
    );

    let first = integ.eval_exc_vxc(&KsDensity::rks(p.clone())).unwrap();
    assert!(integ.load_balancer().state().modified_weights_are_stored);
    let weights_snapshot: Vec<Vec<f64>> = integ
        .load_balancer()
        .tasks()
        .iter()
        .map(|t| t.weights.clone())
        .collect();

    let second = integ.eval_exc_vxc(&KsDensity::rks(p)).unwrap();
    for (t, snap) in integ.load_balancer().tasks().iter().zip(&weights_snapshot) {
        assert_eq!(&t.weights, snap);
    }
    assert!((first.exc - second.exc).abs() < 1e-14);
    assert!((first.n_el - second.n_el).abs() < 1e-14);
}

#[test]
fn invalid_density_dimensions_are_rejected() {
    let mol = he_molecule();
    let basis = he_basis();
    let lb = build_load_balancer(&mol, &basis, &he_spec());
    let mut integ = make_integrator(
        BuiltinFunctional::SlaterX,
        lb,
        ExecutionSpace::Host,
        Default::default(),
    );
    let bad = DMatrix::zeros(3, 3);
    let err = integ.eval_exc_vxc(&KsDensity::rks(bad.clone())).unwrap_err();
    assert!(matches!(err, GridXcError::InvalidInput(_)));
    let err = integ.eval_exx(&bad, &ExxSettings::default()).unwrap_err();
    assert!(matches!(err, GridXcError::InvalidInput(_)));
}

#[test]
fn exx_matches_brute_force_seminumerical() {
    let mol = h2_molecule();
    let basis = h2_spd_basis();
    let spec = MolGridSpec {
        n_rad: 16,
        angular: AngularOrder::Lebedev6,
        r_max: 8.0,
        max_points_per_task: 48,
        bfn_tol: 0.0,
    };
    let lb = build_load_balancer(&mol, &basis, &spec);
    let p = normalized_density(&basis, 2.0);
    let mut integ = make_integrator(
        BuiltinFunctional::SlaterX,
        lb,
        ExecutionSpace::Host,
        Default::default(),
    );
    let k = integ
        .eval_exx(
            &p,
            &ExxSettings {
                eps_e: 0.0,
                eps_k: 0.0,
            },
        )
        .unwrap();

    // Unscreened reference on the same (weight-modified) grid
    let nbf = basis.nbf();
    let nshells = basis.nshells();
    let map = BasisSetMap::new(&basis);
    let shell_pairs = ShellPairCollection::new(&basis, 1e-16);
    let boys = BoysTable::new(16);
    let all_shells: Vec<usize> = (0..nshells).collect();
    let mut k_ref = DMatrix::zeros(nbf, nbf);
    for task in integ.load_balancer().tasks() {
        let bf = basis::eval::eval_collocation(&basis, &all_shells, &task.points);
        let f = &p * &bf;
        for (ipt, pt) in task.points.iter().enumerate() {
            let mut a = DMatrix::zeros(nbf, nbf);
            for i in 0..nshells {
                for j in 0..=i {
                    let Some(pair) = shell_pairs.at(i, j) else {
                        continue;
                    };
                    let (ni, nj) = (basis.shell(i).size(), basis.shell(j).size());
                    let mut block = vec![0.0; ni * nj];
                    pair_potential_block(
                        basis.shell(i).l,
                        basis.shell(j).l,
                        pair,
                        pt,
                        &boys,
                        &mut block,
                    );
                    let (oi, oj) = (map.shell_to_first_ao(i), map.shell_to_first_ao(j));
                    for bi in 0..ni {
                        for bj in 0..nj {
                            a[(oi + bi, oj + bj)] = block[bi * nj + bj];
                            if i != j {
                                a[(oj + bj, oi + bi)] = block[bi * nj + bj];
                            }
                        }
                    }
                }
            }
            let g = &a * f.column(ipt);
            let w = task.weights[ipt];
            for nu in 0..nbf {
                for mu in 0..nbf {
                    k_ref[(mu, nu)] += w * bf[(mu, ipt)] * g[nu];
                }
            }
        }
    }
    let k_ref = 0.5 * (&k_ref + k_ref.transpose());

    assert!(
        max_abs_diff(&k, &k_ref) < 1e-10,
        "max diff = {}",
        max_abs_diff(&k, &k_ref)
    );
}

#[test]
fn exx_symmetry_and_analytic_anchor() {
    let mol = h2_molecule();
    let basis = h2_631g_basis();
    let spec = MolGridSpec {
        n_rad: 80,
        angular: AngularOrder::Lebedev26,
        r_max: 12.0,
        max_points_per_task: 256,
        bfn_tol: 0.0,
    };
    let lb = build_load_balancer(&mol, &basis, &spec);
    let p = normalized_density(&basis, 2.0);
    let mut integ = make_integrator(
        BuiltinFunctional::SlaterX,
        lb,
        ExecutionSpace::Host,
        Default::default(),
    );
    let k = integ.eval_exx(&p, &ExxSettings::default()).unwrap();
    assert!(max_asymmetry(&k) < 1e-12);

    // Analytic K(μ,ν) = Σ_{λσ} P_{λσ} (μλ|νσ)
    let nbf = basis.nbf();
    let nshells = basis.nshells();
    let map = BasisSetMap::new(&basis);
    let boys = BoysTable::new(16);
    let mut k_an = DMatrix::zeros(nbf, nbf);
    for a in 0..nshells {
        for c in 0..nshells {
            for b in 0..nshells {
                for d in 0..nshells {
                    let quartet = eri_shell_quartet(
                        basis.shell(a),
                        basis.shell(c),
                        basis.shell(b),
                        basis.shell(d),
                        &boys,
                    );
                    let (na_, nc_, nb_, nd_) = (
                        basis.shell(a).size(),
                        basis.shell(c).size(),
                        basis.shell(b).size(),
                        basis.shell(d).size(),
                    );
                    for mu in 0..na_ {
                        for lam in 0..nc_ {
                            for nu in 0..nb_ {
                                for sig in 0..nd_ {
                                    let v =
                                        quartet[((mu * nc_ + lam) * nb_ + nu) * nd_ + sig];
                                    k_an[(map.shell_to_first_ao(a) + mu,
                                          map.shell_to_first_ao(b) + nu)] += p
                                        [(map.shell_to_first_ao(c) + lam,
                                          map.shell_to_first_ao(d) + sig)]
                                        * v;
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    let e_sn = 0.5 * (&p * &k).trace();
    let e_an = 0.5 * (&p * &k_an).trace();
    assert!(
        (e_sn - e_an).abs() / e_an.abs() < 1e-3,
        "seminumerical {} vs analytic {}",
        e_sn,
        e_an
    );
}

#[test]
fn exx_reference_matches_scheme1() {
    let mol = h2_molecule();
    let basis = h2_spd_basis();
    let spec = MolGridSpec {
        n_rad: 12,
        angular: AngularOrder::Lebedev6,
        r_max: 7.0,
        max_points_per_task: 32,
        bfn_tol: 0.0,
    };
    let p = normalized_density(&basis, 2.0);
    let settings = ExxSettings::default();

    let lb = build_load_balancer(&mol, &basis, &spec);
    let mut host = make_integrator(
        BuiltinFunctional::SlaterX,
        lb,
        ExecutionSpace::Host,
        Default::default(),
    );
    let k_host = host.eval_exx(&p, &settings).unwrap();

    let lb = build_load_balancer(&mol, &basis, &spec);
    let mut dev = make_integrator(
        BuiltinFunctional::SlaterX,
        lb,
        ExecutionSpace::Device,
        Default::default(),
    );
    let k_dev = dev.eval_exx(&p, &settings).unwrap();

    assert!(max_abs_diff(&k_host, &k_dev) < 1e-10);
}

#[test]
fn exx_rejects_unsupported_bases() {
    // f shells
    let mol = he_molecule();
    let basis = basis::BasisSet::new(vec![Shell::new(
        3,
        vec![0.8],
        vec![1.0],
        Vector3::zeros(),
        0,
    )]);
    let spec = MolGridSpec {
        n_rad: 8,
        angular: AngularOrder::Lebedev6,
        r_max: 6.0,
        max_points_per_task: 32,
        bfn_tol: 0.0,
    };
    let lb = build_load_balancer(&mol, &basis, &spec);
    let mut integ = make_integrator(
        BuiltinFunctional::SlaterX,
        lb,
        ExecutionSpace::Host,
        Default::default(),
    );
    let p = DMatrix::zeros(basis.nbf(), basis.nbf());
    let err = integ.eval_exx(&p, &ExxSettings::default()).unwrap_err();
    assert!(matches!(err, GridXcError::UnsupportedFeature(_)));

    // spherical-harmonic shells
    let mut sph = Shell::new(2, vec![0.8], vec![1.0], Vector3::zeros(), 0);
    sph.pure = true;
    let basis = basis::BasisSet::new(vec![sph]);
    let lb = build_load_balancer(&mol, &basis, &spec);
    let mut integ = make_integrator(
        BuiltinFunctional::SlaterX,
        lb,
        ExecutionSpace::Host,
        Default::default(),
    );
    let p = DMatrix::zeros(basis.nbf(), basis.nbf());
    let err = integ.eval_exx(&p, &ExxSettings::default()).unwrap_err();
    assert!(matches!(err, GridXcError::UnsupportedFeature(_)));
    let err = integ
        .eval_exc_vxc(&KsDensity::rks(DMatrix::zeros(basis.nbf(), basis.nbf())))
        .unwrap_err();
    assert!(matches!(err, GridXcError::UnsupportedFeature(_)));
}

#[test]
fn gks_is_rejected_on_the_device_driver() {
    let mol = h2_molecule();
    let basis = h2_631g_basis();
    let lb = build_load_balancer(&mol, &basis, &h2_spec());
    let p = normalized_density(&basis, 2.0);
    let zero = DMatrix::zeros(p.nrows(), p.ncols());
    let mut integ = make_integrator(
        BuiltinFunctional::Svwn5,
        lb,
        ExecutionSpace::Device,
        Default::default(),
    );
    let den = KsDensity::gks(p, zero.clone(), zero.clone(), zero);
    let err = integ.eval_exc_vxc(&den).unwrap_err();
    assert!(matches!(err, GridXcError::UnsupportedFeature(_)));
}
