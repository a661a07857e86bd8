//! Scenario tests for formflow.
//!
//! The tests live under `integrations/`; this library only holds the
//! configuration shared between them.

use formflow_core::FormConfig;

/// Storage key used by scenarios that persist snapshots
pub const STORAGE_KEY: &str = "scenario-form";

/// Default configuration with snapshots under [`STORAGE_KEY`]
pub fn persisted_config() -> FormConfig {
    FormConfig::default().with_storage_key(STORAGE_KEY)
}
