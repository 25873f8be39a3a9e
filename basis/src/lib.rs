//! Gaussian-basis data layer for grid-based DFT integrators.
//!
//! This crate owns everything that is a pure function of the basis set and
//! molecular geometry:
//!
//! - `shell` / `basis`: contracted cartesian Gaussian shells, the basis set
//!   and its derived shell-to-AO maps
//! - `molecule`: atoms and pairwise geometry metadata
//! - `eval`: collocation (basis values and gradients on point sets)
//! - `boys`: the Boys function and a tabulated fast evaluator
//! - `hermite`: McMurchie–Davidson machinery (Hermite expansion
//!   coefficients, Hermite Coulomb tensor, point-potential blocks and
//!   analytic two-electron integrals for low angular momenta)
//! - `shell_pair`: precomputed primitive-pair data for shell pairs

pub mod basis;
pub mod boys;
pub mod eval;
pub mod hermite;
pub mod molecule;
pub mod shell;
pub mod shell_pair;

pub use basis::{BasisSet, BasisSetMap};
pub use boys::BoysTable;
pub use molecule::{Atom, MolMeta, Molecule};
pub use shell::Shell;
pub use shell_pair::{ShellPair, ShellPairCollection};
