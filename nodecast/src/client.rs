//! Cluster client
//!
//! [`ClusterClient`] owns the topology, the runtime per-node tasks run on,
//! and the configuration. Selector methods return a
//! [`NodeSelectionCommands`] facade bound to this client.

use crate::command::Command;
use crate::commands::NodeSelectionCommands;
use crate::config::{ClusterConfig, EmptySelectionPolicy};
use crate::dispatch::Dispatcher;
use crate::error::{ClusterError, Result};
use crate::executions::Executions;
use crate::metrics::record_rejected_call;
use crate::node::{NodeId, NodeInfo};
use crate::reply::FromReply;
use crate::selection::{NodeSelection, Selector};
use crate::topology::Topology;
use std::sync::Arc;
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};
use tracing::{debug, info};

/// Entry point for fan-out administration
pub struct ClusterClient {
    config: ClusterConfig,
    topology: Arc<Topology>,
    runtime: Option<Runtime>,
    dispatcher: Dispatcher,
}

impl ClusterClient {
    /// Connect to the configured nodes over the redis protocol
    ///
    /// Connections are established lazily on the first command to each node.
    #[cfg(feature = "redis-transport")]
    pub fn connect(config: ClusterConfig) -> Result<Self> {
        let factory = crate::transport::RedisChannelFactory::new(config.connect_timeout());
        let topology = Topology::from_config(&config, &factory)?;
        Self::with_topology(config, Arc::new(topology))
    }

    /// Create a client with its own multi-threaded runtime
    pub fn with_topology(config: ClusterConfig, topology: Arc<Topology>) -> Result<Self> {
        config.validate()?;

        let mut builder = tokio::runtime::Builder::new_multi_thread();
        builder.enable_all().thread_name("nodecast-worker");
        if let Some(threads) = config.worker_threads {
            builder.worker_threads(threads);
        }
        let runtime = builder
            .build()
            .map_err(|e| ClusterError::Runtime(format!("Failed to start client runtime: {}", e)))?;

        let dispatcher = Dispatcher::new(runtime.handle().clone(), config.request_timeout());
        info!(
            nodes = topology.snapshot().len(),
            request_timeout_ms = config.request_timeout_ms,
            "Cluster client started"
        );

        Ok(Self {
            config,
            topology,
            runtime: Some(runtime),
            dispatcher,
        })
    }

    /// Create a client that spawns onto an existing runtime
    pub fn with_handle(config: ClusterConfig, topology: Arc<Topology>, handle: Handle) -> Result<Self> {
        config.validate()?;
        let dispatcher = Dispatcher::new(handle, config.request_timeout());
        Ok(Self {
            config,
            topology,
            runtime: None,
            dispatcher,
        })
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn topology(&self) -> &Arc<Topology> {
        &self.topology
    }

    // ========================================
    // Selections
    // ========================================

    pub fn select(&self, selector: Selector) -> NodeSelectionCommands<'_> {
        NodeSelectionCommands::new(self, selector)
    }

    pub fn all(&self) -> NodeSelectionCommands<'_> {
        self.select(Selector::All)
    }

    pub fn masters(&self) -> NodeSelectionCommands<'_> {
        self.select(Selector::Masters)
    }

    pub fn replicas(&self) -> NodeSelectionCommands<'_> {
        self.select(Selector::Replicas)
    }

    pub fn nodes<I, S>(&self, ids: I) -> NodeSelectionCommands<'_>
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        self.select(Selector::nodes(ids))
    }

    pub fn matching(
        &self,
        predicate: impl Fn(&NodeInfo) -> bool + Send + Sync + 'static,
    ) -> NodeSelectionCommands<'_> {
        self.select(Selector::matching(predicate))
    }

    /// A one-node selection
    pub fn node(&self, id: impl Into<NodeId>) -> NodeSelectionCommands<'_> {
        self.select(Selector::Nodes(vec![id.into()]))
    }

    // ========================================
    // Execution
    // ========================================

    /// Resolve `selector` against the current topology snapshot
    ///
    /// Returns `None` when nothing matched and the policy allows an empty
    /// aggregate.
    pub fn resolve(&self, selector: &Selector) -> Result<Option<NodeSelection>> {
        match selector.select(&self.topology.snapshot()) {
            Ok(selection) => Ok(Some(selection)),
            Err(ClusterError::EmptySelection(reason))
                if self.config.empty_selection == EmptySelectionPolicy::Empty =>
            {
                debug!(%reason, "Selection is empty, returning an empty aggregate");
                Ok(None)
            }
            Err(e) => {
                record_rejected_call(e.error_type());
                Err(e)
            }
        }
    }

    /// Fan `command` out and wait for every node to settle
    pub async fn execute<T: FromReply>(
        &self,
        selector: &Selector,
        command: Command,
    ) -> Result<Executions<T>> {
        match self.resolve(selector)? {
            Some(selection) => Ok(self
                .dispatcher
                .dispatch(&selection, Arc::new(command))
                .settle()
                .await),
            None => Ok(Executions::empty(command.name())),
        }
    }

    /// Blocking variant of [`execute`](Self::execute)
    ///
    /// Usable from plain threads, `spawn_blocking` closures and tasks of
    /// other runtimes. Fails with `ClusterError::Runtime` when the calling
    /// thread drives the current-thread runtime the per-node tasks are
    /// spawned on.
    pub fn execute_blocking<T: FromReply>(
        &self,
        selector: &Selector,
        command: Command,
    ) -> Result<Executions<T>> {
        let wait = self.blocking_wait();
        if wait == BlockingWait::Refused {
            let err = ClusterError::Runtime(format!(
                "{} called from the current-thread runtime its node tasks run on; use ClusterClient::execute",
                command.name()
            ));
            record_rejected_call(err.error_type());
            return Err(err);
        }

        let selection = match self.resolve(selector)? {
            Some(selection) => selection,
            None => return Ok(Executions::empty(command.name())),
        };
        let pending = self.dispatcher.dispatch(&selection, Arc::new(command));
        Ok(match wait {
            BlockingWait::InPlace => {
                tokio::task::block_in_place(|| futures::executor::block_on(pending.settle()))
            }
            _ => futures::executor::block_on(pending.settle()),
        })
    }

    fn blocking_wait(&self) -> BlockingWait {
        let current = match Handle::try_current() {
            Ok(current) => current,
            Err(_) => return BlockingWait::Park,
        };
        let tasks = self.dispatcher.handle();
        if current.id() != tasks.id() {
            return BlockingWait::Park;
        }
        match tasks.runtime_flavor() {
            RuntimeFlavor::CurrentThread => BlockingWait::Refused,
            _ => BlockingWait::InPlace,
        }
    }
}

/// How a blocking call waits for the settle barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockingWait {
    /// Park the calling thread; node tasks run on another runtime
    Park,
    /// Hand the worker's queued tasks off before parking
    InPlace,
    /// Waiting would starve the node tasks
    Refused,
}

impl Drop for ClusterClient {
    fn drop(&mut self) {
        // Dropping a runtime blocks, which is not allowed inside another runtime
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeRole;
    use crate::reply::Reply;
    use crate::testing::ScriptedChannel;

    fn client(policy: EmptySelectionPolicy) -> (ClusterClient, Arc<ScriptedChannel>) {
        let channel = Arc::new(ScriptedChannel::new().reply(Reply::Int(7)));
        let topology = Topology::new();
        topology.register(channel.handle("m1", NodeRole::Master));
        topology.register(channel.handle("r1", NodeRole::Replica));
        let config = ClusterConfig {
            empty_selection: policy,
            worker_threads: Some(2),
            ..Default::default()
        };
        let client = ClusterClient::with_topology(config, Arc::new(topology)).unwrap();
        (client, channel)
    }

    #[test]
    fn test_execute_blocking() {
        let (client, channel) = client(EmptySelectionPolicy::Error);
        let executions: Executions<i64> = client
            .execute_blocking(&Selector::All, Command::dbsize())
            .unwrap();
        assert_eq!(executions.len(), 2);
        assert!(executions.all_succeeded());
        assert_eq!(channel.calls(), 2);
    }

    #[test]
    fn test_resolve_policy() {
        let (strict, _) = client(EmptySelectionPolicy::Error);
        assert!(matches!(
            strict.resolve(&Selector::nodes(["missing"])),
            Err(ClusterError::EmptySelection(_))
        ));

        let (lenient, channel) = client(EmptySelectionPolicy::Empty);
        assert!(lenient.resolve(&Selector::nodes(["missing"])).unwrap().is_none());
        let executions: Executions<i64> = lenient
            .execute_blocking(&Selector::nodes(["missing"]), Command::dbsize())
            .unwrap();
        assert!(executions.is_empty());
        assert_eq!(channel.calls(), 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ClusterConfig {
            request_timeout_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            ClusterClient::with_topology(config, Arc::new(Topology::new())),
            Err(ClusterError::Config(_))
        ));
    }

    fn handle_client(handle: Handle) -> (ClusterClient, Arc<ScriptedChannel>) {
        let channel = Arc::new(ScriptedChannel::new().reply(Reply::Int(7)));
        let topology = Topology::new();
        topology.register(channel.handle("m1", NodeRole::Master));
        topology.register(channel.handle("r1", NodeRole::Replica));
        let client =
            ClusterClient::with_handle(ClusterConfig::default(), Arc::new(topology), handle).unwrap();
        (client, channel)
    }

    #[tokio::test]
    async fn test_blocking_inside_other_runtime_waits() {
        let (client, channel) = client(EmptySelectionPolicy::Error);
        assert_eq!(client.blocking_wait(), BlockingWait::Park);

        let executions: Executions<i64> = client
            .execute_blocking(&Selector::All, Command::dbsize())
            .unwrap();
        assert_eq!(executions.len(), 2);
        assert!(executions.all_succeeded());
        assert_eq!(channel.calls(), 2);
    }

    #[tokio::test]
    async fn test_blocking_on_current_thread_node_runtime_is_refused() {
        let (client, channel) = handle_client(Handle::current());
        assert_eq!(client.blocking_wait(), BlockingWait::Refused);

        let result: Result<Executions<i64>> =
            client.execute_blocking(&Selector::All, Command::dbsize());
        assert!(matches!(result, Err(ClusterError::Runtime(_))));
        assert_eq!(channel.calls(), 0);

        let executions: Executions<i64> =
            client.execute(&Selector::Masters, Command::dbsize()).await.unwrap();
        assert_eq!(executions.nodes()[0].as_str(), "m1");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_on_multi_thread_node_runtime_runs_in_place() {
        let (client, channel) = handle_client(Handle::current());
        assert_eq!(client.blocking_wait(), BlockingWait::InPlace);

        let executions: Executions<i64> = client
            .execute_blocking(&Selector::All, Command::dbsize())
            .unwrap();
        assert_eq!(executions.len(), 2);
        assert_eq!(channel.calls(), 2);
    }

    #[test]
    fn test_blocking_from_spawn_blocking() {
        let (client, channel) = client(EmptySelectionPolicy::Error);
        let client = Arc::new(client);
        let caller = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let worker = Arc::clone(&client);
        let _guard = caller.enter();
        let executions: Executions<i64> = caller
            .block_on(tokio::task::spawn_blocking(move || {
                worker.execute_blocking(&Selector::All, Command::dbsize())
            }))
            .unwrap()
            .unwrap();
        assert_eq!(executions.len(), 2);
        assert_eq!(channel.calls(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_with_handle_uses_caller_runtime() {
        let channel = Arc::new(ScriptedChannel::new());
        let topology = Topology::new();
        topology.register(channel.handle("m1", NodeRole::Master));
        let client = ClusterClient::with_handle(
            ClusterConfig::default(),
            Arc::new(topology),
            Handle::current(),
        )
        .unwrap();

        let executions: Executions<String> =
            client.execute(&Selector::All, Command::save()).await.unwrap();
        assert_eq!(executions.single().unwrap(), "OK");
    }
}
