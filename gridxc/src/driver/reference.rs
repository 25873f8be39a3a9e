//! Serial host work driver.
//!
//! Tasks run one after another against the shared scratch arena; this is
//! the reference semantics every other backend must reproduce.

extern crate nalgebra as na;

use super::kernels::{ek_bfn_stats_task, pack_task_density, process_xc_task, PackedDensity};
use super::{EkBfnStats, ExecutionSpace, ExxBatchJob, LocalWorkDriver, XcBatchJob, XcBatchOut};
use crate::error::Result;
use crate::exx::{build_exx_task_work, finish_exx_task, kernels as exx_kernels};
use crate::functional::XcFunctional;
use crate::host_data::XCHostData;
use crate::task::XCTask;
use crate::weights::{modify_weights_task, XCWeightScheme};
use basis::{BasisSet, BasisSetMap, BoysTable, MolMeta, Molecule};
use na::DMatrix;

pub struct ReferenceDriver {
    boys: BoysTable,
}

impl ReferenceDriver {
    pub fn new() -> Self {
        ReferenceDriver {
            boys: BoysTable::new(16),
        }
    }
}

impl Default for ReferenceDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalWorkDriver for ReferenceDriver {
    fn name(&self) -> &'static str {
        "reference"
    }

    fn execution_space(&self) -> ExecutionSpace {
        ExecutionSpace::Host
    }

    fn boys_table(&self) -> &BoysTable {
        &self.boys
    }

    fn supports_gks(&self) -> bool {
        true
    }

    fn partition_weights(
        &self,
        scheme: XCWeightScheme,
        mol: &Molecule,
        meta: &MolMeta,
        tasks: &mut [XCTask],
    ) {
        let positions = mol.positions();
        for task in tasks.iter_mut() {
            modify_weights_task(scheme, &positions, meta, task);
        }
    }

    fn process_xc_batch(
        &self,
        job: &XcBatchJob<'_>,
        func: &dyn XcFunctional,
        host_data: &mut XCHostData,
        out: &mut XcBatchOut,
    ) -> Result<()> {
        for (k, &it) in job.task_idx.iter().enumerate() {
            let task = &job.tasks[it];
            let task_map = &job.task_maps[k];
            let p_task: Vec<PackedDensity<'_>> = job
                .p_union
                .iter()
                .map(|p| pack_task_density(p, task_map))
                .collect();
            let contrib = process_xc_task(
                job.basis,
                task,
                &p_task,
                job.scheme,
                job.n_deriv,
                func,
                host_data,
            )?;
            for (ci, v) in contrib.v.iter().enumerate() {
                task_map.scatter_add(v, &mut out.v_union[ci]);
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
        let ntasks = task_idx.len();
        let mut max_bfn_sum = vec![0.0; ntasks];
        let mut bfn_max = DMatrix::zeros(basis.nbf(), ntasks);
        for (it, &t) in task_idx.iter().enumerate() {
            let (mbs, column) = ek_bfn_stats_task(basis, basis_map, &tasks[t]);
            max_bfn_sum[it] = mbs;
            bfn_max.column_mut(it).copy_from_slice(&column);
        }
        EkBfnStats {
            max_bfn_sum,
            bfn_max,
        }
    }

    fn process_exx_batch(&self, job: &ExxBatchJob<'_>, k: &mut DMatrix<f64>) -> Result<()> {
        let mut works = Vec::with_capacity(job.task_idx.len());
        for &it in job.task_idx {
            works.push(build_exx_task_work(
                job.basis,
                job.basis_map,
                &job.tasks[it],
                job.p,
                job.shell_pairs,
            )?);
        }
        exx_kernels::dispatch_all(
            job.basis.max_l(),
            job.shell_pairs.max_nprim_pairs(),
            &mut works,
            &self.boys,
        );
        for work in &works {
            let k_task = finish_exx_task(work);
            work.row_map.scatter_add_asym(&work.col_map, &k_task, k);
        }
        Ok(())
    }
}
