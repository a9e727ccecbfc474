// src/dag/graph.rs

use std::collections::{BTreeMap, HashMap};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::errors::{Result, SwarmError};
use crate::types::{FileId, NodeId};

/// Files named by one DAG node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DagNode {
    pub inputs: Vec<FileId>,
    pub outputs: Vec<FileId>,
}

impl DagNode {
    /// Distinct files named by this node, inputs first.
    pub fn files(&self) -> Vec<FileId> {
        let mut files = Vec::new();
        for f in self.inputs.iter().chain(self.outputs.iter()) {
            if !files.contains(f) {
                files.push(f.clone());
            }
        }
        files
    }
}

/// Node -> files membership of a DAG, keyed by node id.
#[derive(Debug, Clone, Default)]
pub struct FileDag {
    nodes: BTreeMap<NodeId, DagNode>,
}

impl FileDag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(
        &mut self,
        node: impl Into<NodeId>,
        inputs: impl IntoIterator<Item = impl Into<FileId>>,
        outputs: impl IntoIterator<Item = impl Into<FileId>>,
    ) -> &mut Self {
        self.nodes.insert(
            node.into(),
            DagNode {
                inputs: inputs.into_iter().map(Into::into).collect(),
                outputs: outputs.into_iter().map(Into::into).collect(),
            },
        );
        self
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&str, &DagNode)> {
        self.nodes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Files named by `node`, or empty if the node is unknown.
    pub fn files_of(&self, node: &str) -> Vec<FileId> {
        self.nodes.get(node).map(DagNode::files).unwrap_or_default()
    }

    /// Every `(node, file)` membership pair, one per distinct file per node.
    pub fn memberships(&self) -> Vec<(NodeId, FileId)> {
        self.nodes
            .iter()
            .flat_map(|(name, node)| node.files().into_iter().map(move |f| (name.clone(), f)))
            .collect()
    }

    /// Check that each file has at most one producer and that the
    /// producer -> consumer relation has no cycles.
    pub fn validate(&self) -> Result<()> {
        let mut producers: HashMap<&str, &str> = HashMap::new();
        for (name, node) in &self.nodes {
            for out in &node.outputs {
                if let Some(other) = producers.insert(out.as_str(), name.as_str()) {
                    return Err(SwarmError::Validation(format!(
                        "file '{out}' is produced by both '{other}' and '{name}'"
                    )));
                }
            }
        }

        // Edge direction: producer -> consumer.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for name in self.nodes.keys() {
            graph.add_node(name.as_str());
        }
        for (name, node) in &self.nodes {
            for input in &node.inputs {
                if let Some(&producer) = producers.get(input.as_str()) {
                    graph.add_edge(producer, name.as_str(), ());
                }
            }
        }

        match toposort(&graph, None) {
            Ok(_order) => Ok(()),
            Err(cycle) => Err(SwarmError::Validation(format!(
                "cycle detected in DAG involving node '{}'",
                cycle.node_id()
            ))),
        }
    }
}
