//! Grid-based exchange-correlation and exact-exchange integrator.
//!
//! Given a one-particle density matrix over an atom-centered Gaussian
//! basis and a molecular quadrature grid partitioned into spatial tasks,
//! this crate evaluates the XC energy, the XC potential matrix and the
//! integrated electron count, and optionally the semi-numerical
//! exact-exchange matrix.
//!
//! # Modules
//!
//! - `task` / `load_balancer` / `grid`: the task model, its owner, and an
//!   atom-centered grid builder
//! - `weights`: one-shot partition-weight modification (SSF / Becke)
//! - `submat`: compressed sub-matrix maps (extract / scatter-add)
//! - `partition`: the shell-batched partitioner and intersection oracle
//! - `driver`: local work drivers (reference, scheme1) behind one trait
//! - `functional`: the functional contract and built-in LDA/GGA kernels
//! - `spin`: RKS/UKS/GKS channel dispatch and interleaving
//! - `screening` / `exx`: exchange screening and the batched kernel bank
//! - `reduction`: rank-wide reduction adapter
//! - `integrator`: the replicated-density entry points

pub mod driver;
pub mod error;
pub mod exx;
pub mod functional;
pub mod grid;
pub mod host_data;
pub mod integrator;
pub mod load_balancer;
pub mod partition;
pub mod reduction;
pub mod screening;
pub mod spin;
pub mod submat;
pub mod task;
pub mod weights;

pub use driver::{make_local_work_driver, ExecutionSpace, LocalWorkDriver, LocalWorkSettings};
pub use error::{GridXcError, Result};
pub use functional::{BuiltinFunctional, XcFunctional};
pub use integrator::{ExxSettings, IntegratorSettings, ReplicatedXcIntegrator};
pub use load_balancer::LoadBalancer;
pub use reduction::{LocalReductionDriver, ReductionDriver, ReductionOp};
pub use spin::{KsDensity, KsPotential, KsScheme};
pub use task::XCTask;
pub use weights::XCWeightScheme;
