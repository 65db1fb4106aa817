//! Node selection
//!
//! A [`Selector`] is a value-type predicate; applying it to a
//! [`TopologySnapshot`] yields a [`NodeSelection`], the immutable ordered set
//! of handles one fan-out targets.

use crate::error::{ClusterError, Result};
use crate::node::{NodeHandle, NodeId, NodeInfo, NodeRole};
use crate::topology::TopologySnapshot;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Arbitrary predicate over node metadata
pub type NodePredicate = Arc<dyn Fn(&NodeInfo) -> bool + Send + Sync>;

/// Which nodes a command targets
#[derive(Clone)]
pub enum Selector {
    /// Every known node, in topology order
    All,
    /// Nodes with the master role
    Masters,
    /// Nodes with the replica role
    Replicas,
    /// Explicit nodes, in the given order; unknown ids are skipped
    Nodes(Vec<NodeId>),
    /// Nodes accepted by a predicate, in topology order
    Matching(NodePredicate),
}

impl Selector {
    pub fn nodes<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        Selector::Nodes(ids.into_iter().map(Into::into).collect())
    }

    pub fn matching(predicate: impl Fn(&NodeInfo) -> bool + Send + Sync + 'static) -> Self {
        Selector::Matching(Arc::new(predicate))
    }

    /// Resolve against a snapshot
    ///
    /// Fails with `ClusterError::EmptySelection` when nothing matches.
    pub fn select(&self, snapshot: &TopologySnapshot) -> Result<NodeSelection> {
        let mut skipped = Vec::new();
        let candidates: Vec<NodeHandle> = match self {
            Selector::All => snapshot.nodes().to_vec(),
            Selector::Masters => by_role(snapshot, NodeRole::Master),
            Selector::Replicas => by_role(snapshot, NodeRole::Replica),
            Selector::Nodes(ids) => ids
                .iter()
                .filter_map(|id| {
                    let handle = snapshot.get(id);
                    if handle.is_none() && !skipped.contains(id) {
                        warn!(
                            node = %id,
                            epoch = snapshot.epoch(),
                            "Selected node is not in the topology, skipping"
                        );
                        skipped.push(id.clone());
                    }
                    handle.cloned()
                })
                .collect(),
            Selector::Matching(predicate) => snapshot
                .nodes()
                .iter()
                .filter(|n| predicate(n.info()))
                .cloned()
                .collect(),
        };

        let selection =
            NodeSelection::from_handles(snapshot.epoch(), candidates).with_skipped(skipped);
        if selection.is_empty() {
            return Err(ClusterError::EmptySelection(format!(
                "selector {:?} matched no node (topology epoch {}, {} nodes, unknown ids {:?})",
                self,
                snapshot.epoch(),
                snapshot.len(),
                selection.skipped()
            )));
        }
        Ok(selection)
    }
}

fn by_role(snapshot: &TopologySnapshot, role: NodeRole) -> Vec<NodeHandle> {
    snapshot
        .nodes()
        .iter()
        .filter(|n| n.role() == role)
        .cloned()
        .collect()
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::All => write!(f, "All"),
            Selector::Masters => write!(f, "Masters"),
            Selector::Replicas => write!(f, "Replicas"),
            Selector::Nodes(ids) => f.debug_tuple("Nodes").field(ids).finish(),
            Selector::Matching(_) => write!(f, "Matching(<predicate>)"),
        }
    }
}

/// Immutable, ordered, duplicate-free set of targeted nodes
#[derive(Debug, Clone)]
pub struct NodeSelection {
    epoch: u64,
    nodes: Arc<[NodeHandle]>,
    skipped: Arc<[NodeId]>,
}

impl NodeSelection {
    /// Build from handles, keeping the first occurrence of each node id
    pub fn from_handles(epoch: u64, handles: impl IntoIterator<Item = NodeHandle>) -> Self {
        let mut seen = HashSet::new();
        let nodes: Vec<NodeHandle> = handles
            .into_iter()
            .filter(|h| seen.insert(h.id().clone()))
            .collect();
        Self {
            epoch,
            nodes: nodes.into(),
            skipped: Vec::<NodeId>::new().into(),
        }
    }

    /// Record explicitly requested ids the topology did not know
    pub fn with_skipped(mut self, skipped: Vec<NodeId>) -> Self {
        self.skipped = skipped.into();
        self
    }

    /// A selection targeting no node
    pub fn empty() -> Self {
        Self {
            epoch: 0,
            nodes: Vec::<NodeHandle>::new().into(),
            skipped: Vec::<NodeId>::new().into(),
        }
    }

    /// Topology epoch this selection was taken from
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeHandle> {
        self.nodes.iter()
    }

    pub fn ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|n| n.id().clone()).collect()
    }

    /// Requested ids that were not in the topology, in request order
    pub fn skipped(&self) -> &[NodeId] {
        &self.skipped
    }
}
