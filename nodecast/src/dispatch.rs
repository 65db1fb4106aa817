//! Fan-out dispatcher
//!
//! Starts one independent task per selected node. Tasks never observe each
//! other: a slow, failing or crashed node only affects its own slot in the
//! resulting [`PendingExecutions`].

use crate::command::Command;
use crate::error::NodeError;
use crate::executions::{PendingExecutions, Slot};
use crate::metrics::NodeCallTimer;
use crate::reply::FromReply;
use crate::selection::NodeSelection;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Spawns per-node executions on a runtime
#[derive(Debug, Clone)]
pub struct Dispatcher {
    runtime: Handle,
    request_timeout: Duration,
}

impl Dispatcher {
    pub fn new(runtime: Handle, request_timeout: Duration) -> Self {
        Self {
            runtime,
            request_timeout,
        }
    }

    /// Runtime the per-node tasks are spawned on
    pub fn handle(&self) -> &Handle {
        &self.runtime
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Send `command` to every node in `selection`
    ///
    /// Returns immediately; the replies are decoded as `T` by each node's own
    /// task.
    pub fn dispatch<T: FromReply>(
        &self,
        selection: &NodeSelection,
        command: Arc<Command>,
    ) -> PendingExecutions<T> {
        let started = Instant::now();
        let name = command.name();
        let mut slots = Vec::with_capacity(selection.len());

        debug!(
            command = %name,
            nodes = selection.len(),
            epoch = selection.epoch(),
            "Dispatching command"
        );

        for node in selection.iter() {
            let (tx, rx) = oneshot::channel();
            let channel = node.channel();
            let command = Arc::clone(&command);
            let node_id = node.id().clone();
            let label = name.clone();
            let timeout = self.request_timeout;

            self.runtime.spawn(async move {
                let timer = NodeCallTimer::new(&label, node_id.as_str());
                let result = match tokio::time::timeout(timeout, channel.execute(&command)).await {
                    Ok(Ok(reply)) => T::from_reply(reply),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(NodeError::Timeout(format!(
                        "no reply from {} within {}ms",
                        node_id,
                        timeout.as_millis()
                    ))),
                };

                let latency = match &result {
                    Ok(_) => timer.success(),
                    Err(e) => {
                        warn!(node = %node_id, command = %label, error = %e, "Node execution failed");
                        timer.error(e.error_type())
                    }
                };

                // The receiver is gone only if the aggregate was dropped unsettled
                let _ = tx.send((result, latency));
            });

            slots.push(Slot {
                node: node.id().clone(),
                address: node.address().to_string(),
                rx,
            });
        }

        PendingExecutions::new(name, slots, started)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeId, NodeRole};
    use crate::reply::Reply;
    use crate::testing::ScriptedChannel;

    fn dispatcher(timeout: Duration) -> Dispatcher {
        Dispatcher::new(Handle::current(), timeout)
    }

    #[tokio::test]
    async fn test_dispatch_one_task_per_node() {
        let a = Arc::new(ScriptedChannel::new().reply(Reply::Int(10)));
        let b = Arc::new(ScriptedChannel::new().reply(Reply::Int(20)));
        let selection = NodeSelection::from_handles(
            1,
            vec![a.handle("a", NodeRole::Master), b.handle("b", NodeRole::Replica)],
        );

        let pending: PendingExecutions<i64> =
            dispatcher(Duration::from_secs(1)).dispatch(&selection, Arc::new(Command::dbsize()));
        let executions = pending.settle().await;

        let values: Vec<i64> = executions.successes().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![10, 20]);
        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 1);
        assert_eq!(executions.command(), "DBSIZE");
    }

    #[tokio::test]
    async fn test_decode_failure_is_protocol_error() {
        let a = Arc::new(ScriptedChannel::new().reply(Reply::bulk("not a number")));
        let selection = NodeSelection::from_handles(1, vec![a.handle("a", NodeRole::Master)]);

        let executions = dispatcher(Duration::from_secs(1))
            .dispatch::<i64>(&selection, Arc::new(Command::dbsize()))
            .settle()
            .await;

        assert!(matches!(
            executions.get(&NodeId::from("a")).unwrap().error(),
            Some(NodeError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_slow_node_times_out_alone() {
        let fast = Arc::new(ScriptedChannel::new().reply(Reply::Int(1)));
        let slow = Arc::new(
            ScriptedChannel::new()
                .reply(Reply::Int(2))
                .delay(Duration::from_secs(5)),
        );
        let selection = NodeSelection::from_handles(
            1,
            vec![fast.handle("fast", NodeRole::Master), slow.handle("slow", NodeRole::Master)],
        );

        let executions = dispatcher(Duration::from_millis(50))
            .dispatch::<i64>(&selection, Arc::new(Command::dbsize()))
            .settle()
            .await;

        assert_eq!(executions.get(&NodeId::from("fast")).unwrap().value(), Some(&1));
        assert!(executions
            .get(&NodeId::from("slow"))
            .unwrap()
            .error()
            .is_some_and(NodeError::is_timeout));
    }

    #[tokio::test]
    async fn test_panicking_node_is_aborted() {
        let ok = Arc::new(ScriptedChannel::new());
        let crashing = Arc::new(ScriptedChannel::new().panicking());
        let selection = NodeSelection::from_handles(
            1,
            vec![ok.handle("ok", NodeRole::Master), crashing.handle("crash", NodeRole::Master)],
        );

        let executions = dispatcher(Duration::from_secs(1))
            .dispatch::<String>(&selection, Arc::new(Command::save()))
            .settle()
            .await;

        assert_eq!(executions.len(), 2);
        assert_eq!(
            executions.get(&NodeId::from("ok")).unwrap().value().map(String::as_str),
            Some("OK")
        );
        assert!(matches!(
            executions.get(&NodeId::from("crash")).unwrap().error(),
            Some(NodeError::Aborted(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_selection_settles_empty() {
        let executions = dispatcher(Duration::from_secs(1))
            .dispatch::<i64>(&NodeSelection::empty(), Arc::new(Command::dbsize()))
            .settle()
            .await;
        assert!(executions.is_empty());
    }
}
