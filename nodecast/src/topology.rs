//! Cluster membership
//!
//! Maintains the live list of node handles and hands out immutable
//! [`TopologySnapshot`]s. Every mutation publishes a new snapshot with a
//! bumped epoch, so a selection built from an older snapshot keeps its size
//! and order while membership changes underneath it.

use crate::channel::ChannelFactory;
use crate::config::ClusterConfig;
use crate::error::Result;
use crate::node::{NodeHandle, NodeId, NodeInfo, NodeRole};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Membership change notifications
#[derive(Debug, Clone)]
pub enum TopologyEvent {
    NodeJoined(NodeInfo),
    NodeLeft(NodeId),
    NodeUpdated(NodeInfo),
}

/// A consistent, immutable view of cluster membership
#[derive(Debug, Clone, Default)]
pub struct TopologySnapshot {
    epoch: u64,
    nodes: Vec<NodeHandle>,
}

impl TopologySnapshot {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Nodes in registration order
    pub fn nodes(&self) -> &[NodeHandle] {
        &self.nodes
    }

    pub fn get(&self, id: &NodeId) -> Option<&NodeHandle> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Live cluster membership
pub struct Topology {
    current: RwLock<Arc<TopologySnapshot>>,
    event_tx: broadcast::Sender<TopologyEvent>,
}

impl Default for Topology {
    fn default() -> Self {
        Self::new()
    }
}

impl Topology {
    /// Create an empty topology
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            current: RwLock::new(Arc::new(TopologySnapshot::default())),
            event_tx,
        }
    }

    /// Build a topology from statically configured nodes
    pub fn from_config(config: &ClusterConfig, factory: &dyn ChannelFactory) -> Result<Self> {
        config.validate()?;
        let topology = Self::new();
        for node in &config.nodes {
            let info = NodeInfo::new(node.id.as_str(), node.address.as_str(), node.role);
            let channel = factory.create(&info)?;
            topology.register(NodeHandle::new(info, channel));
        }
        info!(nodes = config.nodes.len(), "Loaded static cluster topology");
        Ok(topology)
    }

    /// Current membership snapshot
    pub fn snapshot(&self) -> Arc<TopologySnapshot> {
        self.current.read().clone()
    }

    /// Subscribe to membership events
    pub fn subscribe(&self) -> broadcast::Receiver<TopologyEvent> {
        self.event_tx.subscribe()
    }

    /// Add a node, or replace the node with the same id in place
    pub fn register(&self, handle: NodeHandle) {
        let info = handle.info().clone();
        let replaced = self.update(|nodes| {
            if let Some(existing) = nodes.iter_mut().find(|n| n.id() == handle.id()) {
                *existing = handle;
                true
            } else {
                nodes.push(handle);
                false
            }
        });

        debug!(node = %info.id, address = %info.address, role = %info.role, "Registered node");
        let event = if replaced {
            TopologyEvent::NodeUpdated(info)
        } else {
            TopologyEvent::NodeJoined(info)
        };
        let _ = self.event_tx.send(event);
    }

    /// Remove a node
    pub fn remove(&self, id: &NodeId) -> Option<NodeHandle> {
        let removed = self.update(|nodes| {
            nodes
                .iter()
                .position(|n| n.id() == id)
                .map(|pos| nodes.remove(pos))
        });

        if removed.is_some() {
            debug!(node = %id, "Removed node");
            let _ = self.event_tx.send(TopologyEvent::NodeLeft(id.clone()));
        }
        removed
    }

    /// Change a node's role (e.g. after a failover); returns false for unknown ids
    pub fn set_role(&self, id: &NodeId, role: NodeRole) -> bool {
        let updated = self.update(|nodes| {
            let node = nodes.iter_mut().find(|n| n.id() == id)?;
            let mut info = node.info().clone();
            info.role = role;
            *node = NodeHandle::new(info.clone(), node.channel());
            Some(info)
        });

        match updated {
            Some(info) => {
                let _ = self.event_tx.send(TopologyEvent::NodeUpdated(info));
                true
            }
            None => false,
        }
    }

    /// Copy-on-write update publishing a new snapshot
    fn update<R>(&self, f: impl FnOnce(&mut Vec<NodeHandle>) -> R) -> R {
        let mut current = self.current.write();
        let mut nodes = current.nodes.clone();
        let result = f(&mut nodes);
        *current = Arc::new(TopologySnapshot {
            epoch: current.epoch + 1,
            nodes,
        });
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use crate::testing::{ScriptedChannel, ScriptedFactory};

    fn handle(id: &str, role: NodeRole) -> NodeHandle {
        NodeHandle::new(
            NodeInfo::new(id, format!("{}:6379", id), role),
            Arc::new(ScriptedChannel::new()),
        )
    }

    #[test]
    fn test_register_and_snapshot() {
        let topology = Topology::new();
        topology.register(handle("a", NodeRole::Master));
        topology.register(handle("b", NodeRole::Replica));

        let snapshot = topology.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.epoch(), 2);
        assert_eq!(snapshot.nodes()[0].id().as_str(), "a");
        assert!(snapshot.get(&NodeId::from("b")).is_some());
    }

    #[test]
    fn test_register_replaces_same_id_in_place() {
        let topology = Topology::new();
        topology.register(handle("a", NodeRole::Master));
        topology.register(handle("b", NodeRole::Master));
        topology.register(handle("a", NodeRole::Replica));

        let snapshot = topology.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.nodes()[0].role(), NodeRole::Replica);
    }

    #[test]
    fn test_snapshot_is_isolated_from_changes() {
        let topology = Topology::new();
        topology.register(handle("a", NodeRole::Master));
        let before = topology.snapshot();

        topology.register(handle("b", NodeRole::Master));
        topology.remove(&NodeId::from("a"));

        assert_eq!(before.len(), 1);
        assert_eq!(before.nodes()[0].id().as_str(), "a");
        assert_eq!(topology.snapshot().nodes()[0].id().as_str(), "b");
    }

    #[test]
    fn test_set_role() {
        let topology = Topology::new();
        topology.register(handle("a", NodeRole::Replica));
        assert!(topology.set_role(&NodeId::from("a"), NodeRole::Master));
        assert!(!topology.set_role(&NodeId::from("zz"), NodeRole::Master));
        assert_eq!(topology.snapshot().nodes()[0].role(), NodeRole::Master);
    }

    #[test]
    fn test_events() {
        let topology = Topology::new();
        let mut rx = topology.subscribe();

        topology.register(handle("a", NodeRole::Master));
        topology.remove(&NodeId::from("a"));

        assert!(matches!(rx.try_recv().unwrap(), TopologyEvent::NodeJoined(_)));
        assert!(matches!(rx.try_recv().unwrap(), TopologyEvent::NodeLeft(id) if id.as_str() == "a"));
    }

    #[test]
    fn test_from_config() {
        let config = ClusterConfig {
            nodes: vec![
                NodeConfig {
                    id: "n1".into(),
                    address: "10.0.0.1:7000".into(),
                    role: NodeRole::Master,
                },
                NodeConfig {
                    id: "n2".into(),
                    address: "10.0.0.2:7000".into(),
                    role: NodeRole::Replica,
                },
            ],
            ..Default::default()
        };
        let factory = ScriptedFactory::default();
        let topology = Topology::from_config(&config, &factory).unwrap();
        let snapshot = topology.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.nodes()[1].address(), "10.0.0.2:7000");
        assert_eq!(factory.created(), 2);
    }
}
