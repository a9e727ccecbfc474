// src/resources/pool.rs

//! Ledger of exclusive units.
//!
//! The pool is owned by the manager core and handed by reference to
//! whatever dispatches tasks. A unit is either free or held by exactly one
//! task. Asking for more units than are free is an accounting error on the
//! caller's side: the request is refused as a whole and reported as fatal.

use std::fmt;

use tracing::{debug, error, info};

use crate::errors::{Result, SwarmError};
use crate::types::TaskId;

#[derive(Debug, Clone, Default)]
pub struct DevicePool {
    /// `None` until `init` runs; one slot per unit afterwards.
    units: Option<Vec<Option<TaskId>>>,
}

impl DevicePool {
    pub fn new() -> Self {
        Self { units: None }
    }

    /// Establish the pool size.
    ///
    /// Only the first call has an effect; later calls keep the existing
    /// assignments. Returns `true` if this call created the pool.
    pub fn init(&mut self, total: usize) -> bool {
        if self.units.is_some() {
            debug!(total, "device pool already initialised; ignoring init");
            return false;
        }
        self.units = Some(vec![None; total]);
        info!(total, "device pool initialised");
        true
    }

    pub fn is_initialized(&self) -> bool {
        self.units.is_some()
    }

    /// Total number of units, or 0 before `init`.
    pub fn total(&self) -> usize {
        self.units.as_ref().map(|u| u.len()).unwrap_or(0)
    }

    pub fn free_count(&self) -> usize {
        self.units
            .as_ref()
            .map(|u| u.iter().filter(|slot| slot.is_none()).count())
            .unwrap_or(0)
    }

    /// Claim the first `count` free units, in index order, for `owner`.
    ///
    /// Either all `count` units are claimed or none are.
    pub fn allocate(&mut self, count: usize, owner: TaskId) -> Result<()> {
        if count == 0 {
            return Ok(());
        }

        let free = self.free_count();
        if free < count {
            error!(
                owner,
                requested = count,
                free,
                units = %self,
                "device over-allocation"
            );
            return Err(SwarmError::Accounting(format!(
                "task {owner} requested {count} devices but only {free} of {} are free [{self}]",
                self.total()
            )));
        }

        // free >= count > 0 implies the pool exists.
        if let Some(units) = self.units.as_mut() {
            units
                .iter_mut()
                .filter(|slot| slot.is_none())
                .take(count)
                .for_each(|slot| *slot = Some(owner));
        }

        debug!(owner, count, units = %self, "allocated devices");
        Ok(())
    }

    /// Release every unit held by `owner`. Returns how many were released.
    pub fn free(&mut self, owner: TaskId) -> usize {
        let mut released = 0;
        if let Some(units) = self.units.as_mut() {
            for slot in units.iter_mut().filter(|slot| **slot == Some(owner)) {
                *slot = None;
                released += 1;
            }
        }
        if released > 0 {
            debug!(owner, released, "freed devices");
        }
        released
    }

    /// Indices of the units held by `owner`, ascending.
    pub fn held_by(&self, owner: TaskId) -> Vec<usize> {
        self.units
            .as_ref()
            .map(|units| {
                units
                    .iter()
                    .enumerate()
                    .filter(|(_, slot)| **slot == Some(owner))
                    .map(|(i, _)| i)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Comma-joined unit indices held by `owner` (e.g. `"1,3"`), empty if none.
    pub fn describe(&self, owner: TaskId) -> String {
        self.held_by(owner)
            .iter()
            .map(|i| i.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Drop the ledger entirely (manager shutdown).
    pub fn teardown(&mut self) {
        if let Some(units) = self.units.take() {
            let held = units.iter().filter(|slot| slot.is_some()).count();
            info!(total = units.len(), held, "device pool torn down");
        }
    }
}

/// Renders the unit -> owner mapping, e.g. `0:10 1:10 2:free`.
impl fmt::Display for DevicePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(units) = self.units.as_ref() else {
            return f.write_str("uninitialised");
        };
        for (i, slot) in units.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match slot {
                Some(owner) => write!(f, "{i}:{owner}")?,
                None => write!(f, "{i}:free")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let mut pool = DevicePool::new();
        assert!(pool.init(4));
        pool.allocate(2, 7).unwrap();
        assert!(!pool.init(8));
        assert_eq!(pool.total(), 4);
        assert_eq!(pool.describe(7), "0,1");
    }

    #[test]
    fn over_allocation_is_all_or_nothing() {
        let mut pool = DevicePool::new();
        pool.init(4);
        pool.allocate(2, 10).unwrap();
        assert_eq!(pool.describe(10), "0,1");

        let err = pool.allocate(3, 11).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(pool.describe(11), "");
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn freed_units_are_reused_in_index_order() {
        let mut pool = DevicePool::new();
        pool.init(4);
        pool.allocate(2, 10).unwrap();
        assert_eq!(pool.free(10), 2);
        pool.allocate(4, 12).unwrap();
        assert_eq!(pool.describe(12), "0,1,2,3");
    }

    #[test]
    fn describe_reports_gaps() {
        let mut pool = DevicePool::new();
        pool.init(4);
        pool.allocate(1, 1).unwrap();
        pool.allocate(1, 2).unwrap();
        pool.allocate(1, 1).unwrap();
        pool.allocate(1, 2).unwrap();
        assert_eq!(pool.describe(1), "0,2");
        assert_eq!(pool.describe(2), "1,3");
        assert_eq!(pool.to_string(), "0:1 1:2 2:1 3:2");
    }

    #[test]
    fn free_unknown_owner_is_noop() {
        let mut pool = DevicePool::new();
        assert_eq!(pool.free(3), 0);
        pool.init(2);
        assert_eq!(pool.free(3), 0);
        assert_eq!(pool.free_count(), 2);
    }

    #[test]
    fn allocation_before_init_is_refused() {
        let mut pool = DevicePool::new();
        assert!(pool.allocate(0, 1).is_ok());
        assert!(pool.allocate(1, 1).unwrap_err().is_fatal());
    }
}
