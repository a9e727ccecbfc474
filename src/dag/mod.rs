// src/dag/mod.rs

//! File membership of an external DAG.
//!
//! The DAG itself is parsed elsewhere; the manager only needs to know which
//! files each node names, so it can seed the garbage collector's reference
//! counts. [`graph`] holds that membership and checks it is well formed.

pub mod graph;

pub use graph::{DagNode, FileDag};
