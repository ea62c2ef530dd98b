//! Numeric limits and defaults for sphere pools
//!
//! This module contains the constants that bound a pool's shape and the
//! default tuning values used when a settings file omits a key.

/// Basis-point denominator (10_000 = 100%)
pub const BPS_DENOMINATOR: u32 = 10_000;

/// Asset count bounds
pub mod assets {
    use std::ops::RangeInclusive;

    /// Pools need at least two reserves to trade.
    ///
    /// The upper bound comes from the plane-constant window
    /// `(√n − 1)·r ≤ k ≤ 4·r/√n`, which is empty once `n − √n > 4`.
    pub const ASSET_COUNT_RANGE: RangeInclusive<usize> = 2..=6;

    /// Default number of reserve assets
    pub const DEFAULT_ASSET_COUNT: usize = 3;
}

/// Fixed-point precision bounds
pub mod precision {
    use std::ops::RangeInclusive;

    /// Supported decimal scales (1e6 through 1e18)
    pub const DECIMALS_RANGE: RangeInclusive<u32> = 6..=18;

    /// Default scale (1e18)
    pub const DEFAULT_DECIMALS: u32 = 18;
}

/// Fee defaults
pub mod fees {
    /// Default flat fee (0.30%)
    pub const DEFAULT_FEE_BPS: u32 = 30;

    /// Highest accepted fee (10%)
    pub const MAX_FEE_BPS: u32 = 1_000;
}

/// Newton solver defaults
pub mod solver {
    use std::ops::RangeInclusive;

    /// Iteration cap before falling back to the constant-product estimate
    pub const DEFAULT_MAX_ITERATIONS: u32 = 25;

    /// Accepted iteration caps; the solve stays bounded and cheap
    pub const MAX_ITERATIONS_RANGE: RangeInclusive<u32> = 20..=30;

    /// Convergence tolerance is `initial_invariant / divisor`
    pub const DEFAULT_TOLERANCE_DIVISOR: u64 = 1_000_000;

    /// A single Newton step never moves more than 25% of the current guess
    pub const DEFAULT_MAX_STEP_BPS: u32 = 2_500;

    /// Smallest finite-difference step, in raw fixed-point units
    pub const DEFAULT_MIN_STEP: u64 = 1_000;

    /// Haircut applied to the constant-product fallback (2%)
    pub const DEFAULT_FALLBACK_HAIRCUT_BPS: u32 = 200;

    /// Output is capped at 95% of the out-asset reserve
    pub const DEFAULT_MAX_OUTPUT_BPS: u32 = 9_500;
}

/// Tick classification defaults
pub mod ticks {
    /// Tolerance on `α_norm` vs `k_norm` when classifying a tick (0.01%)
    pub const DEFAULT_STATUS_TOLERANCE_BPS: u32 = 1;
}
