//! Replicated-density integrator.
//!
//! Entry points over a load balancer's task list: `eval_exc_vxc` streams
//! shell-batched sub-problems through a producer/worker pipeline into the
//! XC accumulators; `eval_exx` screens tasks against two-electron bounds
//! and drives the batched exchange build. Each rank holds a replicated
//! density; results are combined through the reduction driver.

extern crate nalgebra as na;

use crate::driver::{ExxBatchJob, LocalWorkDriver, XcBatchJob, XcBatchOut};
use crate::error::{GridXcError, Result};
use crate::functional::XcFunctional;
use crate::host_data::XCHostData;
use crate::load_balancer::LoadBalancer;
use crate::partition::generate_device_batch;
use crate::reduction::{ReductionDriver, ReductionOp};
use crate::screening::exx_ek_screening;
use crate::spin::{KsDensity, KsPotential, KsScheme};
use crate::submat::SubmatMap;
use crate::task::DeviceBatch;
use crate::weights::XCWeightScheme;
use basis::ShellPairCollection;
use na::DMatrix;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// Worker poll interval while waiting for produced batches.
const PIPELINE_POLL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IntegratorSettings {
    /// AO budget of one shell-batched sub-problem.
    pub nbf_threshold: usize,
    pub weight_scheme: XCWeightScheme,
    /// Tasks per exchange batch.
    pub exx_batch_size: usize,
}

impl Default for IntegratorSettings {
    fn default() -> Self {
        IntegratorSettings {
            nbf_threshold: 8000,
            weight_scheme: XCWeightScheme::Ssf,
            exx_batch_size: 32,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExxSettings {
    pub eps_e: f64,
    pub eps_k: f64,
}

impl Default for ExxSettings {
    fn default() -> Self {
        ExxSettings {
            eps_e: 1e-10,
            eps_k: 1e-10,
        }
    }
}

pub struct ReplicatedXcIntegrator {
    func: Box<dyn XcFunctional>,
    lb: LoadBalancer,
    lwd: Box<dyn LocalWorkDriver>,
    reduction: Box<dyn ReductionDriver>,
    settings: IntegratorSettings,
}

struct XcAccumulators {
    vxc: Vec<DMatrix<f64>>,
    exc: f64,
    nel: f64,
    host_data: XCHostData,
}

impl ReplicatedXcIntegrator {
    pub fn new(
        func: Box<dyn XcFunctional>,
        lb: LoadBalancer,
        lwd: Box<dyn LocalWorkDriver>,
        reduction: Box<dyn ReductionDriver>,
        settings: IntegratorSettings,
    ) -> Self {
        ReplicatedXcIntegrator {
            func,
            lb,
            lwd,
            reduction,
            settings,
        }
    }

    pub fn load_balancer(&self) -> &LoadBalancer {
        &self.lb
    }

    pub fn load_balancer_mut(&mut self) -> &mut LoadBalancer {
        &mut self.lb
    }

    /// Apply partition weights once per load-balancer lifetime.
    fn apply_weights(&mut self) {
        if self.lb.state().modified_weights_are_stored {
            return;
        }
        let scheme = self.settings.weight_scheme;
        let (mol, meta, tasks) = self.lb.split_for_weights();
        self.lwd.partition_weights(scheme, mol, meta, tasks);
        self.lb.state_mut().modified_weights_are_stored = true;
        info!("partition weights applied ({:?})", scheme);
    }

    fn n_deriv(&self) -> Result<usize> {
        if self.func.is_lda() {
            Ok(0)
        } else if self.func.is_gga() {
            Ok(1)
        } else {
            Err(GridXcError::unsupported("meta-GGA functionals"))
        }
    }

    /// Evaluate EXC, VXC and the integrated electron count.
    pub fn eval_exc_vxc(&mut self, den: &KsDensity) -> Result<KsPotential> {
        let nbf = self.lb.basis().nbf();
        den.validate(nbf)?;
        if self.lb.basis_map().any_pure() {
            return Err(GridXcError::unsupported(
                "spherical-harmonic shells in the quadrature driver",
            ));
        }
        let n_deriv = self.n_deriv()?;
        let scheme = den.scheme;
        if scheme == KsScheme::Gks && (!self.lwd.supports_gks() || n_deriv > 0) {
            return Err(GridXcError::unsupported(
                "GKS outside the reference LDA path",
            ));
        }

        self.apply_weights();

        let ntasks = self.lb.tasks().len();
        info!(
            "exc/vxc: nbf = {}, ntasks = {}, nbf_threshold = {}",
            nbf, ntasks, self.settings.nbf_threshold
        );

        let tasks = self.lb.tasks();
        let basis = self.lb.basis();
        let basis_map = self.lb.basis_map();
        let lwd = self.lwd.as_ref();
        let func = self.func.as_ref();
        let nchan = scheme.nchannels();
        let nbf_threshold = self.settings.nbf_threshold;

        let mut order: Vec<usize> = (0..ntasks).collect();
        let mut cursor = 0usize;
        let produce = move |order: &mut Vec<usize>| -> Result<Option<DeviceBatch>> {
            if cursor >= order.len() {
                return Ok(None);
            }
            let (batch, next) = generate_device_batch(tasks, order, cursor, basis, nbf_threshold);
            cursor = next;
            Ok(Some(batch))
        };

        let acc = XcAccumulators {
            vxc: (0..nchan).map(|_| DMatrix::zeros(nbf, nbf)).collect(),
            exc: 0.0,
            nel: 0.0,
            host_data: XCHostData::new(
                n_deriv,
                nbf,
                self.lb.max_npts(),
                self.lb.max_npts_x_nbe(),
            ),
        };

        let exec = move |acc: &mut XcAccumulators, batch: DeviceBatch| -> Result<()> {
            let union_map = SubmatMap::new(&batch.shell_list, basis_map);
            let nbe_u = union_map.nbe();
            debug!(
                "executing batch: {} tasks, nbe union = {}",
                batch.ntasks(),
                nbe_u
            );
            let task_maps: Vec<SubmatMap> = batch
                .task_idx
                .iter()
                .map(|&t| {
                    SubmatMap::new_relative(
                        &tasks[t].bfn_screening.shell_list,
                        &batch.shell_list,
                        basis_map,
                    )
                })
                .collect();
            let p_union: Vec<DMatrix<f64>> = den
                .channels
                .iter()
                .map(|p| {
                    let mut sub = DMatrix::zeros(nbe_u, nbe_u);
                    union_map.extract(p, &mut sub);
                    sub
                })
                .collect();
            let job = XcBatchJob {
                basis,
                tasks,
                task_idx: &batch.task_idx,
                task_maps: &task_maps,
                p_union: &p_union,
                scheme,
                n_deriv,
            };
            let mut out = XcBatchOut::new(nbe_u, nchan);
            lwd.process_xc_batch(&job, func, &mut acc.host_data, &mut out)?;
            for (ci, v) in out.v_union.iter().enumerate() {
                union_map.scatter_add(v, &mut acc.vxc[ci]);
            }
            acc.exc += out.exc;
            acc.nel += out.nel;
            Ok(())
        };

        let mut acc = run_pipeline(&mut order, produce, acc, exec)?;

        for v in acc.vxc.iter_mut() {
            symmetrize_from_lower(v);
        }

        // Reduce only after local work completed
        for v in acc.vxc.iter_mut() {
            self.reduction
                .allreduce_inplace(v.as_mut_slice(), ReductionOp::Sum)?;
        }
        let mut scalars = [acc.exc, acc.nel];
        self.reduction
            .allreduce_inplace(&mut scalars, ReductionOp::Sum)?;

        info!("exc/vxc done: EXC = {:.10}, N_el = {:.10}", scalars[0], scalars[1]);
        Ok(KsPotential {
            scheme,
            exc: scalars[0],
            n_el: scalars[1],
            vxc: acc.vxc,
        })
    }

    /// Evaluate the exact-exchange matrix K.
    pub fn eval_exx(&mut self, p: &DMatrix<f64>, exx: &ExxSettings) -> Result<DMatrix<f64>> {
        let nbf = self.lb.basis().nbf();
        if p.nrows() != p.ncols() {
            return Err(GridXcError::invalid_input(format!(
                "P must be square, got {}x{}",
                p.nrows(),
                p.ncols()
            )));
        }
        if p.nrows() != nbf {
            return Err(GridXcError::invalid_input(format!(
                "P dimension {} does not match nbf = {}",
                p.nrows(),
                nbf
            )));
        }
        if self.lb.basis_map().any_pure() {
            return Err(GridXcError::unsupported(
                "spherical-harmonic shells under exchange",
            ));
        }
        if self.lb.basis_map().max_l() > 2 {
            return Err(GridXcError::unsupported(
                "angular momentum above d shells under exchange",
            ));
        }

        self.apply_weights();

        // Two-electron bounds
        let shell_pairs = ShellPairCollection::new(self.lb.basis(), 1e-16);
        let v_max = shell_pairs.max_coulomb_matrix(self.lb.basis(), self.lwd.boys_table());
        let p_abs = p.map(f64::abs);

        // Largest work first
        let mut order: Vec<usize> = (0..self.lb.tasks().len()).collect();
        {
            let tasks = self.lb.tasks();
            order.sort_by(|&a, &b| tasks[b].cost().cmp(&tasks[a].cost()));
        }

        // Screening annotates each task's cou lists in place
        {
            let lwd = self.lwd.as_ref();
            let (basis, basis_map, tasks) = self.lb.split_for_screening();
            exx_ek_screening(
                basis,
                basis_map,
                &p_abs,
                &v_max,
                exx.eps_e,
                exx.eps_k,
                lwd,
                tasks,
                &order,
            );
        }

        // Drop tasks with no significant cou shells (stable)
        {
            let tasks = self.lb.tasks();
            order.retain(|&t| !tasks[t].cou_screening.shell_list.is_empty());
        }
        info!("exx: {} tasks survive EK screening", order.len());

        let tasks = self.lb.tasks();
        let basis = self.lb.basis();
        let basis_map = self.lb.basis_map();
        let lwd = self.lwd.as_ref();
        let shell_pairs_ref = &shell_pairs;
        let chunk = self.settings.exx_batch_size.max(1);

        let mut cursor = 0usize;
        let produce = move |order: &mut Vec<usize>| -> Result<Option<Vec<usize>>> {
            if cursor >= order.len() {
                return Ok(None);
            }
            let end = (cursor + chunk).min(order.len());
            let batch = order[cursor..end].to_vec();
            cursor = end;
            Ok(Some(batch))
        };

        let exec = move |k: &mut DMatrix<f64>, task_idx: Vec<usize>| -> Result<()> {
            debug!("executing exchange batch of {} tasks", task_idx.len());
            let job = ExxBatchJob {
                basis,
                basis_map,
                tasks,
                task_idx: &task_idx,
                p,
                shell_pairs: shell_pairs_ref,
            };
            lwd.process_exx_batch(&job, k)
        };

        let mut k = run_pipeline(&mut order, produce, DMatrix::zeros(nbf, nbf), exec)?;

        // Final symmetrization: K ← (K + Kᵀ)/2
        for j in 0..nbf {
            for i in 0..j {
                let avg = 0.5 * (k[(i, j)] + k[(j, i)]);
                k[(i, j)] = avg;
                k[(j, i)] = avg;
            }
        }

        self.reduction
            .allreduce_inplace(k.as_mut_slice(), ReductionOp::Sum)?;
        info!("exx done: tr K = {:.10}", k.trace());
        Ok(k)
    }
}

/// Copy the accumulated lower triangle onto the upper one.
fn symmetrize_from_lower(m: &mut DMatrix<f64>) {
    let n = m.nrows();
    for j in 1..n {
        for i in 0..j {
            m[(i, j)] = m[(j, i)];
        }
    }
}

/// Single-producer / single-worker batch pipeline.
///
/// The producer re-partitions remaining work while the worker drains the
/// queue in enqueue order; a worker failure flips the abort flag, the
/// producer stops after its current batch and the queued remainder is
/// dropped with no partial results surfaced.
fn run_pipeline<B, Acc, P, E>(
    order: &mut Vec<usize>,
    mut produce: P,
    acc: Acc,
    exec: E,
) -> Result<Acc>
where
    B: Send,
    Acc: Send,
    P: FnMut(&mut Vec<usize>) -> Result<Option<B>>,
    E: FnMut(&mut Acc, B) -> Result<()> + Send,
{
    let abort = AtomicBool::new(false);
    thread::scope(|s| {
        let (tx, rx) = mpsc::channel::<B>();
        let abort_ref = &abort;

        let worker = s.spawn(move || {
            let mut acc = acc;
            let mut exec = exec;
            loop {
                match rx.recv_timeout(PIPELINE_POLL) {
                    Ok(batch) => {
                        if let Err(e) = exec(&mut acc, batch) {
                            abort_ref.store(true, Ordering::SeqCst);
                            return Err(e);
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            Ok(acc)
        });

        let mut produce_err = None;
        while !abort.load(Ordering::SeqCst) {
            match produce(order) {
                Ok(Some(batch)) => {
                    if tx.send(batch).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    produce_err = Some(e);
                    break;
                }
            }
        }
        drop(tx);

        let out = worker
            .join()
            .map_err(|_| GridXcError::DeviceFailure("batch worker panicked".into()))?;
        if let Some(e) = produce_err {
            return Err(e);
        }
        out
    })
}
