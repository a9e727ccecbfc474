// src/resources/mod.rs

//! Resource accounting.
//!
//! - [`pool`] holds the ledger of exclusive units (devices) and hands them
//!   out to tasks.
//! - [`request`] describes what a task asks for.

pub mod pool;
pub mod request;

pub use pool::DevicePool;
pub use request::Resources;
