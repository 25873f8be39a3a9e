//! Fan-out work driver ("scheme1").
//!
//! Per-task kernels are independent, so they are fanned out across a
//! worker pool, each worker carrying its own scratch stack; the G-build
//! kernel bank stays on the calling thread, strictly ordered, and every
//! scatter into shared accumulators runs serially in task order.

extern crate nalgebra as na;

use super::kernels::{ek_bfn_stats_task, pack_task_density, process_xc_task, PackedDensity};
use super::{
    EkBfnStats, ExecutionSpace, ExxBatchJob, LocalWorkDriver, LocalWorkSettings, XcBatchJob,
    XcBatchOut,
};
use crate::error::Result;
use crate::exx::{build_exx_task_work, finish_exx_task, kernels as exx_kernels, ExxTaskWork};
use crate::functional::XcFunctional;
use crate::host_data::XCHostData;
use crate::task::XCTask;
use crate::weights::{modify_weights_task, XCWeightScheme};
use basis::{BasisSet, BasisSetMap, BoysTable, MolMeta, Molecule};
use na::DMatrix;
use rayon::prelude::*;

pub struct Scheme1Driver {
    boys: BoysTable,
    pool_size: usize,
}

impl Scheme1Driver {
    pub fn new(settings: LocalWorkSettings) -> Self {
        let pool_size = if settings.blas_pool_size == 0 {
            super::num_threads()
        } else {
            settings.blas_pool_size
        };
        Scheme1Driver {
            boys: BoysTable::new(16),
            pool_size,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }
}

impl LocalWorkDriver for Scheme1Driver {
    fn name(&self) -> &'static str {
        "scheme1"
    }

    fn execution_space(&self) -> ExecutionSpace {
        ExecutionSpace::Device
    }

    fn boys_table(&self) -> &BoysTable {
        &self.boys
    }

    fn supports_gks(&self) -> bool {
        false
    }

    fn partition_weights(
        &self,
        scheme: XCWeightScheme,
        mol: &Molecule,
        meta: &MolMeta,
        tasks: &mut [XCTask],
    ) {
        let positions = mol.positions();
        tasks
            .par_iter_mut()
            .for_each(|task| modify_weights_task(scheme, &positions, meta, task));
    }

    fn process_xc_batch(
        &self,
        job: &XcBatchJob<'_>,
        func: &dyn XcFunctional,
        _host_data: &mut XCHostData,
        out: &mut XcBatchOut,
    ) -> Result<()> {
        // Per-worker scratch stacks sized for the largest task of the batch
        let nbe_union = job.p_union.first().map_or(0, |p| p.nrows());
        let max_npts = job
            .task_idx
            .iter()
            .map(|&t| job.tasks[t].npts())
            .max()
            .unwrap_or(0);
        let max_nxn = job
            .task_idx
            .iter()
            .map(|&t| job.tasks[t].npts() * job.tasks[t].nbe())
            .max()
            .unwrap_or(0);

        let contribs = (0..job.task_idx.len())
            .into_par_iter()
            .map_init(
                || XCHostData::new(job.n_deriv, nbe_union, max_npts, max_nxn),
                |scratch, k| {
                    let it = job.task_idx[k];
                    let task = &job.tasks[it];
                    let p_task: Vec<PackedDensity<'_>> = job
                        .p_union
                        .iter()
                        .map(|p| pack_task_density(p, &job.task_maps[k]))
                        .collect();
                    process_xc_task(
                        job.basis,
                        task,
                        &p_task,
                        job.scheme,
                        job.n_deriv,
                        func,
                        scratch,
                    )
                },
            )
            .collect::<Result<Vec<_>>>()?;

        // Scatter serially, in batch task order
        for (k, contrib) in contribs.iter().enumerate() {
            for (ci, v) in contrib.v.iter().enumerate() {
                job.task_maps[k].scatter_add(v, &mut out.v_union[ci]);
            }
            out.exc += contrib.exc;
            out.nel += contrib.nel;
        }
        Ok(())
    }

    fn eval_ek_bfn_stats(
        &self,
        basis: &BasisSet,
        basis_map: &BasisSetMap,
        tasks: &[XCTask],
        task_idx: &[usize],
    ) -> EkBfnStats {
        let per_task: Vec<(f64, Vec<f64>)> = task_idx
            .par_iter()
            .map(|&t| ek_bfn_stats_task(basis, basis_map, &tasks[t]))
            .collect();
        let mut max_bfn_sum = vec![0.0; task_idx.len()];
        let mut bfn_max = DMatrix::zeros(basis.nbf(), task_idx.len());
        for (it, (mbs, column)) in per_task.into_iter().enumerate() {
            max_bfn_sum[it] = mbs;
            bfn_max.column_mut(it).copy_from_slice(&column);
        }
        EkBfnStats {
            max_bfn_sum,
            bfn_max,
        }
    }

    fn process_exx_batch(&self, job: &ExxBatchJob<'_>, k: &mut DMatrix<f64>) -> Result<()> {
        // F-matrix build fans out across the pool
        let mut works: Vec<ExxTaskWork<'_>> = job
            .task_idx
            .par_iter()
            .map(|&it| {
                build_exx_task_work(
                    job.basis,
                    job.basis_map,
                    &job.tasks[it],
                    job.p,
                    job.shell_pairs,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        // Kernel bank on the calling thread, strictly ordered
        exx_kernels::dispatch_all(
            job.basis.max_l(),
            job.shell_pairs.max_nprim_pairs(),
            &mut works,
            &self.boys,
        );

        // K_task GEMMs fan out; the scatter stays serial in task order
        let k_tasks: Vec<DMatrix<f64>> = works.par_iter().map(finish_exx_task).collect();
        for (work, k_task) in works.iter().zip(k_tasks.iter()) {
            work.row_map.scatter_add_asym(&work.col_map, k_task, k);
        }
        Ok(())
    }
}
