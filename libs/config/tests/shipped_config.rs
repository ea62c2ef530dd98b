//! Shipped Configuration Test
//!
//! The settings files checked in under `config/` must load and validate.

use sphere_config::{FeeMode, PoolSettings};
use std::path::PathBuf;

fn workspace_config() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../config/pool.toml")
}

#[test]
fn test_shipped_defaults_match_code_defaults() {
    let settings = PoolSettings::load(Some(&workspace_config()), None).unwrap();
    assert_eq!(settings, PoolSettings::default());
}

#[test]
fn test_staging_overrides_apply() {
    let settings = PoolSettings::load(Some(&workspace_config()), Some("staging")).unwrap();
    assert_eq!(settings.fee_bps, 5);
    assert_eq!(settings.solver.max_iterations, 30);
    // untouched keys keep the base file's values
    assert_eq!(settings.fee_mode, FeeMode::Input);
    assert_eq!(settings.solver.max_step_bps, 2_500);
}
