//! Load balancer: owns the molecule, basis, grid tasks and the one-shot
//! weight-modification latch.

use crate::task::XCTask;
use basis::{BasisSet, BasisSetMap, MolMeta, Molecule};

#[derive(Debug, Clone, Default)]
pub struct LoadBalancerState {
    /// Set after partition weights have been applied in place; re-entry
    /// uses the stored weights.
    pub modified_weights_are_stored: bool,
}

pub struct LoadBalancer {
    mol: Molecule,
    meta: MolMeta,
    basis: BasisSet,
    basis_map: BasisSetMap,
    tasks: Vec<XCTask>,
    state: LoadBalancerState,
}

impl LoadBalancer {
    pub fn new(mol: Molecule, basis: BasisSet, tasks: Vec<XCTask>) -> Self {
        let meta = MolMeta::new(&mol);
        let basis_map = BasisSetMap::new(&basis);
        LoadBalancer {
            mol,
            meta,
            basis,
            basis_map,
            tasks,
            state: LoadBalancerState::default(),
        }
    }

    pub fn molecule(&self) -> &Molecule {
        &self.mol
    }

    pub fn molmeta(&self) -> &MolMeta {
        &self.meta
    }

    pub fn basis(&self) -> &BasisSet {
        &self.basis
    }

    pub fn basis_map(&self) -> &BasisSetMap {
        &self.basis_map
    }

    pub fn tasks(&self) -> &[XCTask] {
        &self.tasks
    }

    pub fn tasks_mut(&mut self) -> &mut Vec<XCTask> {
        &mut self.tasks
    }

    /// Disjoint borrows for the in-place weight pass.
    pub fn split_for_weights(&mut self) -> (&Molecule, &MolMeta, &mut Vec<XCTask>) {
        (&self.mol, &self.meta, &mut self.tasks)
    }

    /// Disjoint borrows for the in-place screening pass.
    pub fn split_for_screening(&mut self) -> (&BasisSet, &BasisSetMap, &mut Vec<XCTask>) {
        (&self.basis, &self.basis_map, &mut self.tasks)
    }

    pub fn state(&self) -> &LoadBalancerState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut LoadBalancerState {
        &mut self.state
    }

    pub fn max_npts(&self) -> usize {
        self.tasks.iter().map(|t| t.npts()).max().unwrap_or(0)
    }

    pub fn max_nbe(&self) -> usize {
        self.tasks.iter().map(|t| t.nbe()).max().unwrap_or(0)
    }

    pub fn max_npts_x_nbe(&self) -> usize {
        self.tasks
            .iter()
            .map(|t| t.npts() * t.nbe())
            .max()
            .unwrap_or(0)
    }
}
