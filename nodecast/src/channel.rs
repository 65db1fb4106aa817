//! Per-node command execution seam
//!
//! The dispatcher never talks to the wire directly. Each node handle carries
//! a [`NodeChannel`] that accepts one command and yields one reply or one
//! failure cause. The default implementation is
//! [`RedisChannel`](crate::transport::RedisChannel).

use crate::command::Command;
use crate::error::{NodeError, Result};
use crate::node::NodeInfo;
use crate::reply::Reply;
use async_trait::async_trait;
use std::sync::Arc;

/// A node's own connection: submit one command, receive one outcome
#[async_trait]
pub trait NodeChannel: Send + Sync {
    /// Execute a command on this node
    ///
    /// Server error replies are reported as `NodeError::Server`, not as `Ok`.
    async fn execute(&self, command: &Command) -> std::result::Result<Reply, NodeError>;

    /// Get the channel backend name
    fn backend_name(&self) -> &'static str;
}

/// Builds channels for statically configured nodes
pub trait ChannelFactory: Send + Sync {
    fn create(&self, node: &NodeInfo) -> Result<Arc<dyn NodeChannel>>;
}
