//! Grid tasks: one spatial batch of quadrature points with its screening
//! metadata, and the device-sized sub-problems the shell-batched
//! partitioner emits.

extern crate nalgebra as na;

use na::Vector3;

/// Basis-function screening data: shells whose collocation magnitude is
/// significant on this task's points.
#[derive(Debug, Clone, Default)]
pub struct BfnScreening {
    /// Sorted, unique shell indices into the full basis.
    pub shell_list: Vec<usize>,
    /// Σ shell_size over `shell_list`.
    pub nbe: usize,
}

impl BfnScreening {
    pub fn nshells(&self) -> usize {
        self.shell_list.len()
    }
}

/// Coulomb screening data, populated only for exact-exchange evaluation.
#[derive(Debug, Clone, Default)]
pub struct CouScreening {
    pub shell_list: Vec<usize>,
    /// Significant shell pairs in canonical (i major, j ≤ i) order.
    pub shell_pair_list: Vec<(usize, usize)>,
    pub nbe: usize,
}

/// One spatial batch of grid points.
#[derive(Debug, Clone)]
pub struct XCTask {
    /// Atom that generated this batch (weight partitioning needs it).
    pub iparent: usize,
    /// Distance from the parent atom to its nearest neighbour.
    pub dist_nearest: f64,
    pub points: Vec<Vector3<f64>>,
    /// Quadrature weights; finite and non-negative after weight
    /// modification.
    pub weights: Vec<f64>,
    pub bfn_screening: BfnScreening,
    pub cou_screening: CouScreening,
}

impl XCTask {
    pub fn npts(&self) -> usize {
        self.points.len()
    }

    pub fn nbe(&self) -> usize {
        self.bfn_screening.nbe
    }

    /// Work estimate used to order exchange tasks.
    pub fn cost(&self) -> usize {
        self.npts() * self.nbe()
    }
}

/// A device-sized sub-problem: a set of tasks plus the union of their shell
/// lists. Every member task's `shell_list` is a subset of `shell_list`;
/// task-local indices relative to the union are derived at execution time
/// and never written back into the shared tasks.
#[derive(Debug, Clone)]
pub struct DeviceBatch {
    pub task_idx: Vec<usize>,
    /// Sorted union shell list.
    pub shell_list: Vec<usize>,
}

impl DeviceBatch {
    pub fn ntasks(&self) -> usize {
        self.task_idx.len()
    }
}
