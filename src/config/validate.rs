// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, SwarmError};
use crate::types::GcMethod;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = SwarmError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.manager, raw.journal, raw.gc))
    }
}

/// Check the invariants serde cannot express.
pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    validate_manager(cfg)?;
    validate_journal(cfg)?;
    validate_gc(cfg)?;
    Ok(())
}

fn validate_manager(cfg: &RawConfigFile) -> Result<()> {
    if cfg.manager.state_dir.as_os_str().is_empty() {
        return Err(SwarmError::ConfigError(
            "[manager].state_dir must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_journal(cfg: &RawConfigFile) -> Result<()> {
    if cfg.journal.max_concurrent_writes == 0 {
        return Err(SwarmError::ConfigError(
            "[journal].max_concurrent_writes must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_gc(cfg: &RawConfigFile) -> Result<()> {
    let gc = &cfg.gc;
    if gc.method != GcMethod::OnDemand {
        return Ok(());
    }

    if gc.capacity_bytes == 0 {
        return Err(SwarmError::ConfigError(
            "[gc].capacity_bytes must be > 0 when method = \"on_demand\"".to_string(),
        ));
    }
    if gc.threshold_bytes > gc.capacity_bytes {
        return Err(SwarmError::ConfigError(format!(
            "[gc].threshold_bytes ({}) must not exceed capacity_bytes ({})",
            gc.threshold_bytes, gc.capacity_bytes
        )));
    }
    if gc.sweep_interval_ms == 0 {
        return Err(SwarmError::ConfigError(
            "[gc].sweep_interval_ms must be >= 1 when method = \"on_demand\"".to_string(),
        ));
    }
    Ok(())
}
