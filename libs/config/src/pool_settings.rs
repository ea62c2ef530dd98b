//! Pool Settings Module
//!
//! Provides settings loading and validation for sphere pools.
//! Supports loading from TOML files with environment-specific overrides.

use crate::limits::{self, BPS_DENOMINATOR};
use anyhow::{bail, Context, Result};
use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Which side of a swap the flat fee is taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FeeMode {
    /// Fee deducted from the input before the invariant is solved
    #[default]
    Input,
    /// Fee deducted from the total output after all segments
    Output,
}

/// How a deposit's plane constant maps onto a tick identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TickIdentity {
    /// Keyed by the deposit radius and the plane constant
    #[default]
    RadiusAndPlane,
    /// Keyed by the plane constant alone
    PlaneOnly,
}

/// Share formula for the first deposit into an empty tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FirstDepositShares {
    /// `shares = radius`
    #[default]
    Radius,
    /// `shares = geometric_mean(non-zero amounts) · √m`
    GeometricMean,
}

/// How the input amount at a tick boundary crossing is estimated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CrossingEstimate {
    /// Quadratic fit of the normalized projection from finite differences
    #[default]
    Quadratic,
    /// `remaining / 2`
    Midpoint,
}

/// Newton solver tuning
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SolverSettings {
    pub max_iterations: u32,
    pub tolerance_divisor: u64,
    pub max_step_bps: u32,
    pub min_step: u64,
    pub fallback_haircut_bps: u32,
    pub max_output_bps: u32,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: limits::solver::DEFAULT_MAX_ITERATIONS,
            tolerance_divisor: limits::solver::DEFAULT_TOLERANCE_DIVISOR,
            max_step_bps: limits::solver::DEFAULT_MAX_STEP_BPS,
            min_step: limits::solver::DEFAULT_MIN_STEP,
            fallback_haircut_bps: limits::solver::DEFAULT_FALLBACK_HAIRCUT_BPS,
            max_output_bps: limits::solver::DEFAULT_MAX_OUTPUT_BPS,
        }
    }
}

/// Main pool settings structure
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct PoolSettings {
    /// Number of reserve assets (N)
    pub asset_count: usize,

    /// Fixed-point scale is `10^precision_decimals`
    pub precision_decimals: u32,

    /// Flat swap fee in basis points
    pub fee_bps: u32,

    pub fee_mode: FeeMode,
    pub tick_identity: TickIdentity,
    pub first_deposit: FirstDepositShares,
    pub crossing_estimate: CrossingEstimate,

    /// Tolerance on the normalized projection test, in basis points
    pub status_tolerance_bps: u32,

    pub solver: SolverSettings,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            asset_count: limits::assets::DEFAULT_ASSET_COUNT,
            precision_decimals: limits::precision::DEFAULT_DECIMALS,
            fee_bps: limits::fees::DEFAULT_FEE_BPS,
            fee_mode: FeeMode::default(),
            tick_identity: TickIdentity::default(),
            first_deposit: FirstDepositShares::default(),
            crossing_estimate: CrossingEstimate::default(),
            status_tolerance_bps: limits::ticks::DEFAULT_STATUS_TOLERANCE_BPS,
            solver: SolverSettings::default(),
        }
    }
}

impl PoolSettings {
    /// Default settings for a pool of `asset_count` assets
    pub fn with_assets(asset_count: usize) -> Self {
        Self {
            asset_count,
            ..Self::default()
        }
    }

    /// Load settings from files with environment overrides
    pub fn load(base_path: Option<&Path>, environment: Option<&str>) -> Result<Self> {
        let base = base_path.unwrap_or(Path::new("config/pool.toml"));

        let mut builder = Config::builder().add_source(File::from(base).required(true));

        // Add environment-specific overrides if specified
        if let Some(env) = environment {
            let env_file = base
                .parent()
                .unwrap_or(Path::new("config"))
                .join("environments")
                .join(format!("{}.toml", env));

            if env_file.exists() {
                info!("Loading environment settings: {:?}", env_file);
                builder = builder.add_source(File::from(env_file));
            } else {
                warn!("Environment settings not found: {:?}", env_file);
            }
        }

        // Override with environment variables (SPHERE__ prefix)
        builder = builder.add_source(
            Environment::with_prefix("SPHERE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build pool settings")?;

        let settings: Self = config
            .try_deserialize()
            .context("Failed to deserialize pool settings")?;

        settings.validate()?;
        debug!(?settings, "pool settings loaded");
        Ok(settings)
    }

    /// Parse settings from an in-memory TOML document
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let settings: Self = toml::from_str(raw).context("Failed to parse pool settings")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check every value against [`crate::limits`]
    pub fn validate(&self) -> Result<()> {
        if !limits::assets::ASSET_COUNT_RANGE.contains(&self.asset_count) {
            bail!(
                "asset_count {} outside {:?}",
                self.asset_count,
                limits::assets::ASSET_COUNT_RANGE
            );
        }
        if !limits::precision::DECIMALS_RANGE.contains(&self.precision_decimals) {
            bail!(
                "precision_decimals {} outside {:?}",
                self.precision_decimals,
                limits::precision::DECIMALS_RANGE
            );
        }
        if self.fee_bps > limits::fees::MAX_FEE_BPS {
            bail!(
                "fee_bps {} exceeds maximum {}",
                self.fee_bps,
                limits::fees::MAX_FEE_BPS
            );
        }
        if self.status_tolerance_bps >= BPS_DENOMINATOR {
            bail!("status_tolerance_bps must be below {}", BPS_DENOMINATOR);
        }

        let solver = &self.solver;
        if !limits::solver::MAX_ITERATIONS_RANGE.contains(&solver.max_iterations) {
            bail!(
                "solver.max_iterations {} outside {:?}",
                solver.max_iterations,
                limits::solver::MAX_ITERATIONS_RANGE
            );
        }
        if solver.tolerance_divisor == 0 {
            bail!("solver.tolerance_divisor must be positive");
        }
        if solver.max_step_bps == 0 || solver.max_step_bps > BPS_DENOMINATOR {
            bail!("solver.max_step_bps must be in 1..={}", BPS_DENOMINATOR);
        }
        if solver.min_step == 0 {
            bail!("solver.min_step must be positive");
        }
        if solver.fallback_haircut_bps >= BPS_DENOMINATOR {
            bail!("solver.fallback_haircut_bps must be below {}", BPS_DENOMINATOR);
        }
        if solver.max_output_bps == 0 || solver.max_output_bps >= BPS_DENOMINATOR {
            bail!("solver.max_output_bps must be in 1..{}", BPS_DENOMINATOR);
        }

        Ok(())
    }

    /// Render settings back to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize pool settings")
    }
}

/// Convenience function to load settings from the default location
pub fn load_settings(environment: Option<&str>) -> Result<PoolSettings> {
    let base = PathBuf::from("config/pool.toml");
    PoolSettings::load(Some(&base), environment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let settings = PoolSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.asset_count, 3);
        assert_eq!(settings.fee_mode, FeeMode::Input);
        assert_eq!(settings.solver.max_step_bps, 2_500);
    }

    #[test]
    fn test_load_base_settings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pool.toml");

        let content = r#"
asset_count = 5
precision_decimals = 15
fee_bps = 10
fee_mode = "output"
tick_identity = "plane_only"
crossing_estimate = "midpoint"

[solver]
max_iterations = 30
"#;

        fs::write(&path, content).unwrap();

        let settings = PoolSettings::load(Some(&path), None).unwrap();

        assert_eq!(settings.asset_count, 5);
        assert_eq!(settings.precision_decimals, 15);
        assert_eq!(settings.fee_mode, FeeMode::Output);
        assert_eq!(settings.tick_identity, TickIdentity::PlaneOnly);
        assert_eq!(settings.crossing_estimate, CrossingEstimate::Midpoint);
        assert_eq!(settings.first_deposit, FirstDepositShares::Radius);
        assert_eq!(settings.solver.max_iterations, 30);
        // untouched keys keep their defaults
        assert_eq!(settings.solver.max_output_bps, 9_500);
    }

    #[test]
    fn test_environment_overlay() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("pool.toml");
        fs::write(&base, "asset_count = 4\nfee_bps = 30\n").unwrap();

        let env_dir = dir.path().join("environments");
        fs::create_dir_all(&env_dir).unwrap();
        fs::write(env_dir.join("staging.toml"), "fee_bps = 5\n").unwrap();

        let settings = PoolSettings::load(Some(&base), Some("staging")).unwrap();
        assert_eq!(settings.asset_count, 4);
        assert_eq!(settings.fee_bps, 5);
    }

    #[test]
    fn test_rejects_asset_count_outside_window() {
        assert!(PoolSettings::with_assets(1).validate().is_err());
        assert!(PoolSettings::with_assets(7).validate().is_err());
        assert!(PoolSettings::with_assets(6).validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_solver_settings() {
        let mut settings = PoolSettings::default();
        settings.solver.max_iterations = 0;
        assert!(settings.validate().is_err());
        for out_of_range in [19, 31, 50] {
            settings.solver.max_iterations = out_of_range;
            assert!(settings.validate().is_err(), "{out_of_range} iterations accepted");
        }
        for in_range in [20, 30] {
            settings.solver.max_iterations = in_range;
            assert!(settings.validate().is_ok());
        }

        let mut settings = PoolSettings::default();
        settings.solver.max_output_bps = 10_000;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut settings = PoolSettings::with_assets(5);
        settings.first_deposit = FirstDepositShares::GeometricMean;
        let rendered = settings.to_toml_string().unwrap();
        let parsed = PoolSettings::from_toml_str(&rendered).unwrap();
        assert_eq!(parsed, settings);
    }
}
