//! Synchronous administration commands over a node selection
//!
//! Every method builds its [`Command`] first, so invalid arguments fail
//! before any node is selected or contacted. The selection is then resolved
//! against the current topology snapshot, the command is fanned out, and the
//! calling thread blocks until every targeted node has settled.
//!
//! No retries and no caching: each call is a fresh fan-out.

use crate::args::{ClientListArgs, FlushMode, KillArgs, TrackingArgs, UnblockType};
use crate::client::ClusterClient;
use crate::command::{Command, CommandType};
use crate::error::Result;
use crate::executions::Executions;
use crate::metrics::record_rejected_call;
use crate::reply::{FromReply, Reply};
use crate::selection::{NodeSelection, Selector};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

/// Administrative commands bound to a selector
pub struct NodeSelectionCommands<'a> {
    client: &'a ClusterClient,
    selector: Selector,
}

impl<'a> NodeSelectionCommands<'a> {
    pub(crate) fn new(client: &'a ClusterClient, selector: Selector) -> Self {
        Self { client, selector }
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Nodes the next command would target, without contacting them
    pub fn selection(&self) -> Result<NodeSelection> {
        Ok(self
            .client
            .resolve(&self.selector)?
            .unwrap_or_else(NodeSelection::empty))
    }

    /// Run an arbitrary command, decoding every reply as `T`
    pub fn dispatch<T: FromReply>(&self, command: Command) -> Result<Executions<T>> {
        self.client.execute_blocking(&self.selector, command)
    }

    fn run<T: FromReply>(&self, command: Result<Command>) -> Result<Executions<T>> {
        let command = command.inspect_err(|e| record_rejected_call(e.error_type()))?;
        self.dispatch(command)
    }

    // ========================================
    // Persistence
    // ========================================

    pub fn bgrewriteaof(&self) -> Result<Executions<String>> {
        self.dispatch(Command::bgrewriteaof())
    }

    pub fn bgsave(&self) -> Result<Executions<String>> {
        self.dispatch(Command::bgsave())
    }

    pub fn save(&self) -> Result<Executions<String>> {
        self.dispatch(Command::save())
    }

    /// Time of the last successful save on each node
    pub fn lastsave(&self) -> Result<Executions<DateTime<Utc>>> {
        self.dispatch(Command::lastsave())
    }

    pub fn flushall(&self) -> Result<Executions<String>> {
        self.dispatch(Command::flushall())
    }

    pub fn flushall_with(&self, mode: FlushMode) -> Result<Executions<String>> {
        self.dispatch(Command::flushall_with(mode))
    }

    #[deprecated(since = "0.2.0", note = "use `flushall_with(FlushMode::Async)`")]
    pub fn flushall_async(&self) -> Result<Executions<String>> {
        self.flushall_with(FlushMode::Async)
    }

    pub fn flushdb(&self) -> Result<Executions<String>> {
        self.dispatch(Command::flushdb())
    }

    pub fn flushdb_with(&self, mode: FlushMode) -> Result<Executions<String>> {
        self.dispatch(Command::flushdb_with(mode))
    }

    #[deprecated(since = "0.2.0", note = "use `flushdb_with(FlushMode::Async)`")]
    pub fn flushdb_async(&self) -> Result<Executions<String>> {
        self.flushdb_with(FlushMode::Async)
    }

    pub fn dbsize(&self) -> Result<Executions<i64>> {
        self.dispatch(Command::dbsize())
    }

    // ========================================
    // Client introspection
    // ========================================

    pub fn client_caching(&self, enabled: bool) -> Result<Executions<String>> {
        self.dispatch(Command::client_caching(enabled))
    }

    /// `None` for nodes where the connection has no name
    pub fn client_getname(&self) -> Result<Executions<Option<String>>> {
        self.dispatch(Command::client_getname())
    }

    pub fn client_getredir(&self) -> Result<Executions<i64>> {
        self.dispatch(Command::client_getredir())
    }

    pub fn client_id(&self) -> Result<Executions<i64>> {
        self.dispatch(Command::client_id())
    }

    pub fn client_info(&self) -> Result<Executions<String>> {
        self.dispatch(Command::client_info())
    }

    pub fn client_kill(&self, addr: &str) -> Result<Executions<String>> {
        self.run(Command::client_kill(addr))
    }

    /// Number of clients killed on each node
    pub fn client_kill_with(&self, kill: &KillArgs) -> Result<Executions<i64>> {
        self.run(Command::client_kill_with(kill))
    }

    pub fn client_list(&self) -> Result<Executions<String>> {
        self.dispatch(Command::client_list())
    }

    pub fn client_list_with(&self, list: &ClientListArgs) -> Result<Executions<String>> {
        self.dispatch(Command::client_list_with(list))
    }

    pub fn client_no_evict(&self, on: bool) -> Result<Executions<String>> {
        self.dispatch(Command::client_no_evict(on))
    }

    pub fn client_pause(&self, timeout_ms: i64) -> Result<Executions<String>> {
        self.run(Command::client_pause(timeout_ms))
    }

    pub fn client_setname(&self, name: &str) -> Result<Executions<String>> {
        self.run(Command::client_setname(name))
    }

    pub fn client_setinfo(&self, key: &str, value: &str) -> Result<Executions<String>> {
        self.run(Command::client_setinfo(key, value))
    }

    pub fn client_tracking(&self, tracking: &TrackingArgs) -> Result<Executions<String>> {
        self.run(Command::client_tracking(tracking))
    }

    pub fn client_unblock(&self, id: i64, unblock: UnblockType) -> Result<Executions<i64>> {
        self.dispatch(Command::client_unblock(id, unblock))
    }

    // ========================================
    // Command introspection
    // ========================================

    pub fn command(&self) -> Result<Executions<Vec<Reply>>> {
        self.dispatch(Command::command())
    }

    pub fn command_count(&self) -> Result<Executions<i64>> {
        self.dispatch(Command::command_count())
    }

    pub fn command_info<S: AsRef<str>>(&self, commands: &[S]) -> Result<Executions<Vec<Reply>>> {
        self.run(Command::command_info(commands))
    }

    pub fn command_info_for(&self, types: &[CommandType]) -> Result<Executions<Vec<Reply>>> {
        self.run(Command::command_info_for(types))
    }

    // ========================================
    // Configuration
    // ========================================

    pub fn config_get(&self, parameter: &str) -> Result<Executions<HashMap<String, String>>> {
        self.run(Command::config_get(parameter))
    }

    pub fn config_get_many<S: AsRef<str>>(
        &self,
        parameters: &[S],
    ) -> Result<Executions<HashMap<String, String>>> {
        self.run(Command::config_get_many(parameters))
    }

    pub fn config_resetstat(&self) -> Result<Executions<String>> {
        self.dispatch(Command::config_resetstat())
    }

    pub fn config_rewrite(&self) -> Result<Executions<String>> {
        self.dispatch(Command::config_rewrite())
    }

    pub fn config_set(&self, parameter: &str, value: &str) -> Result<Executions<String>> {
        self.run(Command::config_set(parameter, value))
    }

    pub fn config_set_many(&self, kvs: &BTreeMap<String, String>) -> Result<Executions<String>> {
        self.run(Command::config_set_many(kvs))
    }

    // ========================================
    // Debugging
    // ========================================

    pub fn debug_crash_and_recover(&self, delay_ms: Option<i64>) -> Result<Executions<String>> {
        self.run(Command::debug_crash_and_recover(delay_ms))
    }

    pub fn debug_htstats(&self, db: i32) -> Result<Executions<String>> {
        self.run(Command::debug_htstats(db))
    }

    pub fn debug_object(&self, key: &str) -> Result<Executions<String>> {
        self.dispatch(Command::debug_object(key))
    }

    pub fn debug_reload(&self) -> Result<Executions<String>> {
        self.dispatch(Command::debug_reload())
    }

    pub fn debug_restart(&self, delay_ms: Option<i64>) -> Result<Executions<String>> {
        self.run(Command::debug_restart(delay_ms))
    }

    pub fn debug_sdslen(&self, key: &str) -> Result<Executions<String>> {
        self.dispatch(Command::debug_sdslen(key))
    }

    // ========================================
    // Server info
    // ========================================

    pub fn info(&self) -> Result<Executions<String>> {
        self.dispatch(Command::info())
    }

    pub fn info_section(&self, section: &str) -> Result<Executions<String>> {
        self.run(Command::info_section(section))
    }

    /// Bytes used by `key`, `None` where the key does not exist
    pub fn memory_usage(&self, key: &str) -> Result<Executions<Option<i64>>> {
        self.dispatch(Command::memory_usage(key))
    }

    /// Unix seconds and microseconds as reported by each node
    pub fn time(&self) -> Result<Executions<Vec<String>>> {
        self.dispatch(Command::time())
    }

    // ========================================
    // Replication
    // ========================================

    pub fn replicaof(&self, host: &str, port: u16) -> Result<Executions<String>> {
        self.run(Command::replicaof(host, port))
    }

    pub fn replicaof_no_one(&self) -> Result<Executions<String>> {
        self.dispatch(Command::replicaof_no_one())
    }

    #[deprecated(since = "0.2.0", note = "use `replicaof`")]
    pub fn slaveof(&self, host: &str, port: u16) -> Result<Executions<String>> {
        self.replicaof(host, port)
    }

    #[deprecated(since = "0.2.0", note = "use `replicaof_no_one`")]
    pub fn slaveof_no_one(&self) -> Result<Executions<String>> {
        self.replicaof_no_one()
    }

    // ========================================
    // Slow log
    // ========================================

    pub fn slowlog_get(&self) -> Result<Executions<Vec<Reply>>> {
        self.dispatch(Command::slowlog_get())
    }

    pub fn slowlog_get_count(&self, count: i32) -> Result<Executions<Vec<Reply>>> {
        self.dispatch(Command::slowlog_get_count(count))
    }

    pub fn slowlog_len(&self) -> Result<Executions<i64>> {
        self.dispatch(Command::slowlog_len())
    }

    pub fn slowlog_reset(&self) -> Result<Executions<String>> {
        self.dispatch(Command::slowlog_reset())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusterConfig;
    use crate::error::{ClusterError, NodeError};
    use crate::node::{NodeId, NodeRole};
    use crate::testing::ScriptedChannel;
    use crate::topology::Topology;
    use std::sync::Arc;

    fn single_node(channel: Arc<ScriptedChannel>) -> ClusterClient {
        let topology = Topology::new();
        topology.register(channel.handle("n1", NodeRole::Master));
        ClusterClient::with_topology(ClusterConfig::default(), Arc::new(topology)).unwrap()
    }

    #[test]
    fn test_validation_happens_before_dispatch() {
        let channel = Arc::new(ScriptedChannel::new());
        let client = single_node(Arc::clone(&channel));

        assert!(matches!(
            client.all().client_pause(-1),
            Err(ClusterError::InvalidArgument(_))
        ));
        assert!(matches!(
            client.all().client_setname("has space"),
            Err(ClusterError::InvalidArgument(_))
        ));
        assert!(matches!(
            client.all().command_info::<&str>(&[]),
            Err(ClusterError::InvalidArgument(_))
        ));
        assert_eq!(channel.calls(), 0);
    }

    #[test]
    fn test_typed_replies() {
        let channel = Arc::new(
            ScriptedChannel::new()
                .reply_to("LASTSAVE", Reply::Int(1_700_000_000))
                .reply_to("CLIENT GETNAME", Reply::Nil)
                .reply_to(
                    "CONFIG GET",
                    Reply::Array(vec![Reply::bulk("maxmemory"), Reply::bulk("0")]),
                )
                .reply_to("MEMORY USAGE", Reply::Int(72))
                .reply_to(
                    "TIME",
                    Reply::Array(vec![Reply::bulk("1700000000"), Reply::bulk("123")]),
                ),
        );
        let client = single_node(channel);
        let node = client.node("n1");

        let lastsave = node.lastsave().unwrap().into_single().unwrap();
        assert_eq!(lastsave.timestamp(), 1_700_000_000);
        assert_eq!(node.client_getname().unwrap().into_single().unwrap(), None);
        assert_eq!(
            node.config_get("maxmemory").unwrap().into_single().unwrap()["maxmemory"],
            "0"
        );
        assert_eq!(node.memory_usage("k").unwrap().into_single().unwrap(), Some(72));
        assert_eq!(node.time().unwrap().into_single().unwrap().len(), 2);
        assert_eq!(node.save().unwrap().into_single().unwrap(), "OK");
    }

    #[test]
    fn test_ok_command_surfaces_server_error() {
        let channel = Arc::new(ScriptedChannel::new().fail_with(NodeError::Server(
            "ERR Background save already in progress".into(),
        )));
        let client = single_node(channel);

        let executions = client.all().bgsave().unwrap();
        assert_eq!(executions.len(), 1);
        assert!(matches!(
            executions.get(&NodeId::from("n1")).unwrap().error(),
            Some(NodeError::Server(_))
        ));
        assert!(matches!(executions.single(), Err(ClusterError::NoSuchElement(_))));
    }

    #[test]
    fn test_selection_preview_does_not_dispatch() {
        let channel = Arc::new(ScriptedChannel::new());
        let client = single_node(Arc::clone(&channel));
        let selection = client.masters().selection().unwrap();
        assert_eq!(selection.ids(), vec![NodeId::from("n1")]);
        assert_eq!(channel.calls(), 0);
    }
}
