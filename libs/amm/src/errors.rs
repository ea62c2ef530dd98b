//! Error types for the sphere AMM engine
//!
//! Every variant rejects the whole operation: the pool state is left exactly
//! as it was before the call. Newton non-convergence is not an error; the
//! solver absorbs it with a discounted estimate and the slippage check is
//! the only place an approximation can surface to the caller.

use crate::custody::CustodyError;
use crate::tick::TickId;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, SphereError>;

/// Errors that can occur while operating a sphere pool
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SphereError {
    /// Plane constant outside `[max((√n−1)·r, r/√n), 4·r/√n]`
    #[error("Invalid plane constant {plane_constant}: must lie in [{min}, {max}]")]
    InvalidPlaneConstant {
        plane_constant: u128,
        min: u128,
        max: u128,
    },

    /// Withdrawal larger than the caller's share balance
    #[error("Insufficient shares: requested {requested}, available {available}")]
    InsufficientShares { requested: u128, available: u128 },

    #[error("Cannot swap an asset for itself")]
    SameTokenSwap,

    #[error("Token index {index} out of range for {asset_count} assets")]
    InvalidTokenIndex { index: usize, asset_count: usize },

    #[error("Amount must be positive")]
    ZeroAmount,

    /// Total output after all segments and fees is below the caller's minimum
    #[error("Slippage exceeded: output {amount_out} below minimum {min_amount_out}")]
    SlippageExceeded { amount_out: u128, min_amount_out: u128 },

    #[error("Insufficient liquidity in asset {asset}: requested {requested}, available {available}")]
    InsufficientLiquidity {
        asset: usize,
        requested: u128,
        available: u128,
    },

    /// Deposit did not grow the tick radius, so it would mint nothing
    #[error("Deposit adds no net radius (before {radius_before}, after {radius_after})")]
    NoNetDeposit {
        radius_before: u128,
        radius_after: u128,
    },

    #[error("Expected {expected} amounts, got {actual}")]
    AmountCountMismatch { expected: usize, actual: usize },

    #[error("Tick {0} not found")]
    TickNotFound(TickId),

    #[error("Arithmetic overflow in {0}")]
    Overflow(&'static str),

    #[error("Division by zero in fixed-point arithmetic")]
    DivisionByZero,

    #[error("Integrity check failed: {0}")]
    IntegrityViolation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Custody transfer failed: {0}")]
    Custody(#[from] CustodyError),

    #[error("Snapshot error: {0}")]
    Snapshot(String),
}

impl From<bincode::Error> for SphereError {
    fn from(err: bincode::Error) -> Self {
        SphereError::Snapshot(err.to_string())
    }
}
