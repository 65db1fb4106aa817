//! nodecast - Fan-out administration for clustered key-value stores
//!
//! Issues one administrative command (persistence control, configuration,
//! client introspection, slow log inspection, ...) to a *selection* of
//! cluster nodes and gathers every node's outcome into one
//! [`Executions`] aggregate.
//!
//! # Architecture
//!
//! - **Topology**: live membership, handing out immutable snapshots
//! - **Selection**: value-type selectors resolved against a snapshot
//! - **Dispatch**: one independent task per selected node, with per-node timeouts
//! - **Executions**: all-settle barrier producing a sealed, node-indexed aggregate
//! - **Commands**: blocking facade with one method per administrative command
//! - **Transport**: pluggable [`NodeChannel`], redis-protocol by default
//!
//! # Example
//!
//! ```no_run
//! use nodecast::{ClusterClient, Config};
//!
//! # fn main() -> nodecast::Result<()> {
//! let config = Config::load(std::path::Path::new("nodecast.toml"))?;
//! let client = ClusterClient::connect(config.cluster)?;
//!
//! let sizes = client.masters().dbsize()?;
//! for outcome in &sizes {
//!     match outcome.result() {
//!         Ok(keys) => println!("{}: {} keys", outcome.node(), keys),
//!         Err(e) => println!("{}: {}", outcome.node(), e),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod args;
pub mod channel;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod executions;
pub mod metrics;
pub mod node;
pub mod reply;
pub mod selection;
pub mod testing;
pub mod topology;
pub mod transport;

mod client;
mod commands;

pub use args::{ClientListArgs, ClientType, FlushMode, KillArgs, TrackingArgs, UnblockType};
pub use channel::{ChannelFactory, NodeChannel};
pub use client::ClusterClient;
pub use command::{Command, CommandType};
pub use commands::NodeSelectionCommands;
pub use config::{ClusterConfig, Config, EmptySelectionPolicy, NodeConfig, ObservabilityConfig};
pub use dispatch::Dispatcher;
pub use error::{ClusterError, NodeError, Result};
pub use executions::{Executions, NodeOutcome, PartialFailure, PendingExecutions};
pub use node::{NodeHandle, NodeId, NodeInfo, NodeRole};
pub use reply::{FromReply, Reply};
pub use selection::{NodePredicate, NodeSelection, Selector};
pub use topology::{Topology, TopologyEvent, TopologySnapshot};
#[cfg(feature = "redis-transport")]
pub use transport::{RedisChannel, RedisChannelFactory};
