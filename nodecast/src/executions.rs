//! Execution aggregates
//!
//! [`PendingExecutions`] is what a dispatch hands back while per-node tasks
//! are in flight. Its storage is one single-use slot per node: each task owns
//! the sending half of its own `oneshot` channel, so a slot is written
//! exactly once, by exactly one task, without a shared lock.
//!
//! [`PendingExecutions::settle`] is an all-settle barrier. It resolves only
//! after every slot has been written (or its task has died) and yields a
//! sealed [`Executions`] in selection order.

use crate::error::{ClusterError, NodeError, Result};
use crate::metrics::record_fanout;
use crate::node::NodeId;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// What a per-node task writes into its slot
pub(crate) type SlotValue<T> = (std::result::Result<T, NodeError>, Duration);

/// Settled outcome of one node's execution
#[derive(Debug, Clone, PartialEq)]
pub struct NodeOutcome<T> {
    node: NodeId,
    address: String,
    result: std::result::Result<T, NodeError>,
    latency: Duration,
}

impl<T> NodeOutcome<T> {
    pub fn new(
        node: NodeId,
        address: impl Into<String>,
        result: std::result::Result<T, NodeError>,
        latency: Duration,
    ) -> Self {
        Self {
            node,
            address: address.into(),
            result,
            latency,
        }
    }

    pub fn node(&self) -> &NodeId {
        &self.node
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn result(&self) -> &std::result::Result<T, NodeError> {
        &self.result
    }

    pub fn into_result(self) -> std::result::Result<T, NodeError> {
        self.result
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn value(&self) -> Option<&T> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&NodeError> {
        self.result.as_ref().err()
    }

    /// Time from dispatch until this node settled
    pub fn latency(&self) -> Duration {
        self.latency
    }

    fn map<U>(self, f: impl FnOnce(T) -> U) -> NodeOutcome<U> {
        NodeOutcome {
            node: self.node,
            address: self.address,
            result: self.result.map(f),
            latency: self.latency,
        }
    }
}

/// Report of the nodes that failed in an otherwise settled aggregate
#[derive(Debug, Clone, PartialEq)]
pub struct PartialFailure {
    pub total: usize,
    pub failed: Vec<(NodeId, NodeError)>,
}

impl PartialFailure {
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// True when no node succeeded
    pub fn is_total(&self) -> bool {
        self.failed.len() == self.total
    }
}

/// Sealed per-node results of one fan-out, in selection order
#[derive(Debug, Clone, PartialEq)]
pub struct Executions<T> {
    command: String,
    outcomes: Vec<NodeOutcome<T>>,
}

impl<T> Executions<T> {
    pub fn new(command: impl Into<String>, outcomes: Vec<NodeOutcome<T>>) -> Self {
        Self {
            command: command.into(),
            outcomes,
        }
    }

    /// An aggregate over an empty selection
    pub fn empty(command: impl Into<String>) -> Self {
        Self::new(command, Vec::new())
    }

    /// Name of the command that produced this aggregate
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Number of targeted nodes, failed ones included
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NodeOutcome<T>> {
        self.outcomes.iter()
    }

    pub fn get(&self, node: &NodeId) -> Option<&NodeOutcome<T>> {
        self.outcomes.iter().find(|o| &o.node == node)
    }

    pub fn nodes(&self) -> Vec<&NodeId> {
        self.outcomes.iter().map(|o| &o.node).collect()
    }

    pub fn successes(&self) -> impl Iterator<Item = (&NodeId, &T)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.value().map(|v| (&o.node, v)))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&NodeId, &NodeError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.error().map(|e| (&o.node, e)))
    }

    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.len() - self.success_count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.is_ok())
    }

    /// Failed nodes, if any
    pub fn partial_failure(&self) -> Option<PartialFailure> {
        let failed: Vec<(NodeId, NodeError)> = self
            .failures()
            .map(|(node, err)| (node.clone(), err.clone()))
            .collect();
        if failed.is_empty() {
            None
        } else {
            Some(PartialFailure {
                total: self.len(),
                failed,
            })
        }
    }

    /// Turn any node failure into `ClusterError::PartialFailure`
    pub fn require_all(self) -> Result<Self> {
        let failed = self.failure_count();
        if failed > 0 {
            return Err(ClusterError::PartialFailure {
                failed,
                total: self.len(),
            });
        }
        Ok(self)
    }

    /// Success value of a one-node aggregate
    pub fn single(&self) -> Result<&T> {
        match self.outcomes.as_slice() {
            [only] => only.result.as_ref().map_err(|e| {
                ClusterError::NoSuchElement(format!("node {} failed: {}", only.node, e))
            }),
            _ => Err(ClusterError::NotSingleNode(self.len())),
        }
    }

    /// Owned variant of [`single`](Self::single)
    pub fn into_single(mut self) -> Result<T> {
        if self.outcomes.len() != 1 {
            return Err(ClusterError::NotSingleNode(self.len()));
        }
        let only = self.outcomes.remove(0);
        let node = only.node;
        only.result
            .map_err(|e| ClusterError::NoSuchElement(format!("node {} failed: {}", node, e)))
    }

    /// Transform success values, keeping node identity and failures
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Executions<U> {
        Executions {
            command: self.command,
            outcomes: self.outcomes.into_iter().map(|o| o.map(&mut f)).collect(),
        }
    }
}

impl<T> IntoIterator for Executions<T> {
    type Item = NodeOutcome<T>;
    type IntoIter = std::vec::IntoIter<NodeOutcome<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.outcomes.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a Executions<T> {
    type Item = &'a NodeOutcome<T>;
    type IntoIter = std::slice::Iter<'a, NodeOutcome<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.outcomes.iter()
    }
}

/// A node's slot in a pending aggregate
pub(crate) struct Slot<T> {
    pub(crate) node: NodeId,
    pub(crate) address: String,
    pub(crate) rx: oneshot::Receiver<SlotValue<T>>,
}

/// Per-node executions still in flight
pub struct PendingExecutions<T> {
    command: String,
    slots: Vec<Slot<T>>,
    started: Instant,
}

impl<T> PendingExecutions<T> {
    pub(crate) fn new(command: String, slots: Vec<Slot<T>>, started: Instant) -> Self {
        Self {
            command,
            slots,
            started,
        }
    }

    /// Number of nodes the command was dispatched to
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Wait until every node has settled and seal the aggregate
    pub async fn settle(self) -> Executions<T> {
        let started = self.started;
        let command = self.command;

        let outcomes = futures::future::join_all(self.slots.into_iter().map(|slot| async move {
            match slot.rx.await {
                Ok((result, latency)) => NodeOutcome::new(slot.node, slot.address, result, latency),
                Err(_) => {
                    warn!(node = %slot.node, "Execution task ended without settling its slot");
                    NodeOutcome::new(
                        slot.node,
                        slot.address,
                        Err(NodeError::Aborted("execution task terminated".to_string())),
                        started.elapsed(),
                    )
                }
            }
        }))
        .await;

        let executions = Executions::new(command, outcomes);
        let elapsed = started.elapsed();
        let failed = executions.failure_count();
        record_fanout(executions.command(), executions.len(), failed, elapsed);

        if failed > 0 {
            warn!(
                command = %executions.command(),
                failed,
                total = executions.len(),
                "Fan-out settled with node failures"
            );
        } else {
            debug!(
                command = %executions.command(),
                total = executions.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Fan-out settled"
            );
        }

        executions
    }
}
