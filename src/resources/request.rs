// src/resources/request.rs

use serde::{Deserialize, Serialize};

/// Resources requested by a task.
///
/// Counts left at `-1` are unspecified. Only `devices` is backed by an
/// exclusive ledger; the others are carried for the matching collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Resources {
    #[serde(default = "unset")]
    pub cores: i64,
    #[serde(default = "unset")]
    pub memory: i64,
    #[serde(default = "unset")]
    pub disk: i64,
    #[serde(default = "unset")]
    pub devices: i64,
}

fn unset() -> i64 {
    -1
}

impl Default for Resources {
    fn default() -> Self {
        Self {
            cores: unset(),
            memory: unset(),
            disk: unset(),
            devices: unset(),
        }
    }
}

impl Resources {
    /// Number of exclusive units this request needs from the device pool.
    pub fn exclusive_units(&self) -> usize {
        self.devices.max(0) as usize
    }
}
