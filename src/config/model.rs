// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::types::GcMethod;

/// Configuration exactly as read from TOML, before validation.
///
/// ```toml
/// [manager]
/// state_dir = ".swarmstate"
/// devices = 4
///
/// [journal]
/// commit_retries = 2
/// max_concurrent_writes = 4
///
/// [gc]
/// method = "on_demand"
/// capacity_bytes = 1073741824
/// threshold_bytes = 104857600
/// sweep_interval_ms = 1000
/// ```
///
/// Every section and key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub manager: ManagerSection,

    #[serde(default)]
    pub journal: JournalSection,

    #[serde(default)]
    pub gc: GcSection,
}

/// Validated configuration. Only obtainable through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub manager: ManagerSection,
    pub journal: JournalSection,
    pub gc: GcSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(manager: ManagerSection, journal: JournalSection, gc: GcSection) -> Self {
        Self { manager, journal, gc }
    }

    /// Back to the raw form, e.g. to apply overrides and validate again.
    pub fn into_raw(self) -> RawConfigFile {
        RawConfigFile {
            manager: self.manager,
            journal: self.journal,
            gc: self.gc,
        }
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        match self.gc.method {
            GcMethod::OnDemand => Some(Duration::from_millis(self.gc.sweep_interval_ms)),
            _ => None,
        }
    }
}

/// `[manager]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ManagerSection {
    /// Journal root; `tasks/` and `files/` live beneath it.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Exclusive units in the device pool. 0 disables device allocation.
    #[serde(default)]
    pub devices: usize,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".swarmstate")
}

impl Default for ManagerSection {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            devices: 0,
        }
    }
}

/// `[journal]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct JournalSection {
    /// Extra attempts at a whole commit before the failure is fatal.
    #[serde(default = "default_commit_retries")]
    pub commit_retries: u32,

    /// Journal writes allowed in flight at once.
    #[serde(default = "default_max_concurrent_writes")]
    pub max_concurrent_writes: usize,
}

fn default_commit_retries() -> u32 {
    2
}

fn default_max_concurrent_writes() -> usize {
    4
}

impl Default for JournalSection {
    fn default() -> Self {
        Self {
            commit_retries: default_commit_retries(),
            max_concurrent_writes: default_max_concurrent_writes(),
        }
    }
}

/// `[gc]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct GcSection {
    /// `"none"`, `"ref_count"`, `"on_demand"` or `"force"`.
    #[serde(default)]
    pub method: GcMethod,

    /// Storage capacity that `on_demand` measures availability against.
    #[serde(default)]
    pub capacity_bytes: u64,

    /// `on_demand` collects while available bytes are below this.
    #[serde(default)]
    pub threshold_bytes: u64,

    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

fn default_sweep_interval_ms() -> u64 {
    1000
}

impl Default for GcSection {
    fn default() -> Self {
        Self {
            method: GcMethod::None,
            capacity_bytes: 0,
            threshold_bytes: 0,
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}
