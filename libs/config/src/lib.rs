//! # Sphere Pool Configuration
//!
//! This crate provides the settings and numeric limits shared by every
//! sphere AMM pool instance, so hosts and tests build pools from one
//! validated source instead of scattering literals.
//!
//! ## Features
//!
//! - **Pool Settings**: asset count, fixed-point scale, fee rate and fee side
//! - **Policy Switches**: tick identity, first-deposit share formula, crossing estimate
//! - **Solver Tuning**: Newton iteration cap, tolerance, step clamps, fallback haircut
//! - **Limits**: bounds every setting is validated against
//!
//! ## Usage
//!
//! ```rust
//! use sphere_config::{limits, PoolSettings};
//!
//! let settings = PoolSettings::default();
//! assert!(settings.validate().is_ok());
//! assert!(limits::assets::ASSET_COUNT_RANGE.contains(&settings.asset_count));
//! ```

pub mod limits;
pub mod pool_settings;

// Re-export commonly used types
pub use pool_settings::{
    load_settings, CrossingEstimate, FeeMode, FirstDepositShares, PoolSettings, SolverSettings,
    TickIdentity,
};
