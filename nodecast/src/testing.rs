//! In-memory node channels for tests and dry runs
//!
//! [`ScriptedChannel`] answers commands from a script instead of a server,
//! with optional latency and failure injection, and records every command it
//! receives.

use crate::channel::{ChannelFactory, NodeChannel};
use crate::command::Command;
use crate::error::{NodeError, Result};
use crate::node::{NodeHandle, NodeInfo, NodeRole};
use crate::reply::Reply;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A node channel driven by canned replies
pub struct ScriptedChannel {
    default_reply: Reply,
    replies: HashMap<String, Reply>,
    failure: Option<NodeError>,
    delay: Duration,
    panic_on_execute: bool,
    calls: AtomicUsize,
    received: Mutex<Vec<Command>>,
}

impl Default for ScriptedChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedChannel {
    /// A channel that answers `OK` to everything
    pub fn new() -> Self {
        Self {
            default_reply: Reply::ok(),
            replies: HashMap::new(),
            failure: None,
            delay: Duration::ZERO,
            panic_on_execute: false,
            calls: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
        }
    }

    /// Reply used for commands without a specific script entry
    pub fn reply(mut self, reply: Reply) -> Self {
        self.default_reply = reply;
        self
    }

    /// Reply for one command, keyed by [`Command::name`]
    pub fn reply_to(mut self, command_name: &str, reply: Reply) -> Self {
        self.replies.insert(command_name.to_string(), reply);
        self
    }

    /// Fail every command with `error`
    pub fn fail_with(mut self, error: NodeError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Sleep before answering
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Panic inside `execute`, simulating a crashed execution task
    pub fn panicking(mut self) -> Self {
        self.panic_on_execute = true;
        self
    }

    /// Number of commands received
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Commands received, in arrival order
    pub fn received(&self) -> Vec<Command> {
        self.received.lock().clone()
    }

    /// Wrap into a handle for a node with the given identity
    pub fn handle(self: &Arc<Self>, id: &str, role: NodeRole) -> NodeHandle {
        let channel: Arc<dyn NodeChannel> = Arc::clone(self) as Arc<dyn NodeChannel>;
        NodeHandle::new(NodeInfo::new(id, format!("{}:6379", id), role), channel)
    }
}

#[async_trait]
impl NodeChannel for ScriptedChannel {
    async fn execute(&self, command: &Command) -> std::result::Result<Reply, NodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.received.lock().push(command.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.panic_on_execute {
            panic!("scripted channel panicked on {}", command.name());
        }
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }

        Ok(self
            .replies
            .get(&command.name())
            .unwrap_or(&self.default_reply)
            .clone())
    }

    fn backend_name(&self) -> &'static str {
        "scripted"
    }
}

/// Factory handing out fresh `OK`-answering scripted channels
#[derive(Default)]
pub struct ScriptedFactory {
    created: AtomicUsize,
}

impl ScriptedFactory {
    /// Number of channels created so far
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl ChannelFactory for ScriptedFactory {
    fn create(&self, _node: &NodeInfo) -> Result<Arc<dyn NodeChannel>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ScriptedChannel::new()))
    }
}
