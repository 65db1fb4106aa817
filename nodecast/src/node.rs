//! Node identity and handles

use crate::channel::NodeChannel;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Unique identifier for a node in the cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        NodeId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        NodeId(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        NodeId(id)
    }
}

/// Replication role of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    #[default]
    #[serde(alias = "primary", alias = "upstream")]
    Master,
    #[serde(alias = "slave")]
    Replica,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Master => "master",
            NodeRole::Replica => "replica",
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Node metadata visible to selectors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: NodeId,
    /// host:port
    pub address: String,
    pub role: NodeRole,
}

impl NodeInfo {
    pub fn new(id: impl Into<NodeId>, address: impl Into<String>, role: NodeRole) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            role,
        }
    }
}

/// A cluster member that can execute commands
///
/// Cloning is cheap; the channel is shared.
#[derive(Clone)]
pub struct NodeHandle {
    info: NodeInfo,
    channel: Arc<dyn NodeChannel>,
}

impl NodeHandle {
    pub fn new(info: NodeInfo, channel: Arc<dyn NodeChannel>) -> Self {
        Self { info, channel }
    }

    pub fn id(&self) -> &NodeId {
        &self.info.id
    }

    pub fn address(&self) -> &str {
        &self.info.address
    }

    pub fn role(&self) -> NodeRole {
        self.info.role
    }

    pub fn info(&self) -> &NodeInfo {
        &self.info
    }

    pub fn channel(&self) -> Arc<dyn NodeChannel> {
        Arc::clone(&self.channel)
    }
}

impl fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeHandle")
            .field("id", &self.info.id)
            .field("address", &self.info.address)
            .field("role", &self.info.role)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_display() {
        let id = NodeId::new("node-1");
        assert_eq!(id.to_string(), "node-1");
        assert_eq!(NodeId::from("node-1"), id);
    }

    #[test]
    fn test_role_aliases() {
        let role: NodeRole = serde_json::from_str("\"slave\"").unwrap();
        assert_eq!(role, NodeRole::Replica);
        let role: NodeRole = serde_json::from_str("\"primary\"").unwrap();
        assert_eq!(role, NodeRole::Master);
        assert_eq!(serde_json::to_string(&NodeRole::Replica).unwrap(), "\"replica\"");
    }
}
