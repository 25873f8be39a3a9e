//! Local work drivers.
//!
//! A work driver executes the per-task kernels of one batch. Two concrete
//! backends exist behind one trait level: the serial, arena-backed
//! [`ReferenceDriver`] and the fan-out [`Scheme1Driver`] whose worker pool
//! stands in for the original's device stream pool. A factory selects the
//! implementation by execution space and name.

pub mod kernels;
mod reference;
mod scheme1;

pub use kernels::{BatchPhase, PackedDensity};
pub use reference::ReferenceDriver;
pub use scheme1::Scheme1Driver;

extern crate nalgebra as na;

use crate::error::{GridXcError, Result};
use crate::functional::XcFunctional;
use crate::host_data::XCHostData;
use crate::spin::KsScheme;
use crate::submat::SubmatMap;
use crate::task::XCTask;
use basis::{BasisSet, BasisSetMap, BoysTable, MolMeta, Molecule, ShellPairCollection};
use na::DMatrix;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionSpace {
    Host,
    Device,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LocalWorkSettings {
    /// Worker-pool width of the scheme1 driver (0 = one worker per core).
    pub blas_pool_size: usize,
}

impl Default for LocalWorkSettings {
    fn default() -> Self {
        LocalWorkSettings { blas_pool_size: 0 }
    }
}

/// One XC batch handed to a driver: the union-packed densities plus
/// per-task maps relative to the union.
pub struct XcBatchJob<'a> {
    pub basis: &'a BasisSet,
    pub tasks: &'a [XCTask],
    pub task_idx: &'a [usize],
    pub task_maps: &'a [SubmatMap],
    pub p_union: &'a [DMatrix<f64>],
    pub scheme: KsScheme,
    pub n_deriv: usize,
}

/// A driver's additions to the union-level accumulators for one batch.
pub struct XcBatchOut {
    pub v_union: Vec<DMatrix<f64>>,
    pub exc: f64,
    pub nel: f64,
}

impl XcBatchOut {
    pub fn new(nbe_union: usize, nchannels: usize) -> Self {
        XcBatchOut {
            v_union: (0..nchannels).map(|_| DMatrix::zeros(nbe_union, nbe_union)).collect(),
            exc: 0.0,
            nel: 0.0,
        }
    }
}

/// One exchange batch: tasks carry their own bfn/cou screening data and
/// scatter straight into the global K accumulator.
pub struct ExxBatchJob<'a> {
    pub basis: &'a BasisSet,
    pub basis_map: &'a BasisSetMap,
    pub tasks: &'a [XCTask],
    pub task_idx: &'a [usize],
    pub p: &'a DMatrix<f64>,
    pub shell_pairs: &'a ShellPairCollection,
}

/// Per-task collocation statistics feeding the exchange screener.
pub struct EkBfnStats {
    /// max_i √w_i Σ_μ |B(μ,i)| per task.
    pub max_bfn_sum: Vec<f64>,
    /// Column t holds max_i √w_i |B(μ,i)| scattered to full-basis AO rows.
    pub bfn_max: DMatrix<f64>,
}

pub trait LocalWorkDriver: Send + Sync {
    fn name(&self) -> &'static str;

    fn execution_space(&self) -> ExecutionSpace;

    /// The process-wide Boys table owned by this driver.
    fn boys_table(&self) -> &BoysTable;

    /// GKS is only wired through the serial reference path.
    fn supports_gks(&self) -> bool;

    /// Apply partition weights in place (one-shot per load balancer).
    fn partition_weights(
        &self,
        scheme: crate::weights::XCWeightScheme,
        mol: &Molecule,
        meta: &MolMeta,
        tasks: &mut [XCTask],
    );

    /// Execute the quadrature pipeline for every task of a batch.
    fn process_xc_batch(
        &self,
        job: &XcBatchJob<'_>,
        func: &dyn XcFunctional,
        host_data: &mut XCHostData,
        out: &mut XcBatchOut,
    ) -> Result<()>;

    /// Collocation statistics for the exchange screener.
    fn eval_ek_bfn_stats(
        &self,
        basis: &BasisSet,
        basis_map: &BasisSetMap,
        tasks: &[XCTask],
        task_idx: &[usize],
    ) -> EkBfnStats;

    /// Execute the exchange pipeline (F → G → K) for every task of a batch.
    fn process_exx_batch(&self, job: &ExxBatchJob<'_>, k: &mut DMatrix<f64>) -> Result<()>;
}

/// Select a work-driver implementation.
pub fn make_local_work_driver(
    space: ExecutionSpace,
    name: &str,
    settings: LocalWorkSettings,
) -> Result<Box<dyn LocalWorkDriver>> {
    let canonical = if name.is_empty() || name.eq_ignore_ascii_case("default") {
        match space {
            ExecutionSpace::Host => "reference",
            ExecutionSpace::Device => "scheme1",
        }
    } else {
        name
    };
    match space {
        ExecutionSpace::Host => {
            if canonical.eq_ignore_ascii_case("reference") {
                Ok(Box::new(ReferenceDriver::new()))
            } else {
                Err(GridXcError::invalid_input(format!(
                    "local work driver not recognized: {canonical}"
                )))
            }
        }
        ExecutionSpace::Device => {
            if canonical.eq_ignore_ascii_case("scheme1") {
                Ok(Box::new(Scheme1Driver::new(settings)))
            } else if canonical.eq_ignore_ascii_case("scheme1-magma") {
                // the magma variant differs only in its BLAS pool policy
                let mut s = settings;
                if s.blas_pool_size == 0 {
                    s.blas_pool_size = 2 * num_threads();
                }
                Ok(Box::new(Scheme1Driver::new(s)))
            } else {
                Err(GridXcError::invalid_input(format!(
                    "local work driver not recognized: {canonical}"
                )))
            }
        }
    }
}

pub(crate) fn num_threads() -> usize {
    rayon::current_num_threads().max(1)
}
