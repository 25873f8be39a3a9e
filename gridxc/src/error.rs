//! Error taxonomy of the integrator.
//!
//! Every failure is fatal for the call that raised it; there is no
//! partial-result path. The rank-wide reduction is only issued after local
//! work completed.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GridXcError {
    /// Caller-supplied operands are malformed (non-square density,
    /// dimension mismatch against the basis, bad leading dimension).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The requested combination is recognized but not implemented
    /// (meta-GGA, spherical basis under exchange, ℓ > 2 under exchange,
    /// GKS outside the reference LDA path, unknown work-driver name).
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// Internal wiring invariant violated; indicates a bug, not bad input.
    #[error("internal state error: {0}")]
    InternalState(String),

    /// The batch worker failed; the call's accumulated state is considered
    /// corrupt and is discarded.
    #[error("device failure: {0}")]
    DeviceFailure(String),
}

pub type Result<T> = std::result::Result<T, GridXcError>;

impl GridXcError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        GridXcError::InvalidInput(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        GridXcError::UnsupportedFeature(msg.into())
    }
}
