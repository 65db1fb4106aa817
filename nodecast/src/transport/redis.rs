//! Redis-protocol node channel
//!
//! Wraps a lazily established `MultiplexedConnection` per node. The
//! connection is cached and shared by concurrent fan-outs; it is dropped
//! after a connection-level failure so the next call reconnects. Setup is
//! serialized so concurrent first calls open a single connection.

use crate::channel::{ChannelFactory, NodeChannel};
use crate::command::Command;
use crate::error::{ClusterError, NodeError, Result};
use crate::metrics::{record_connection_established, record_connection_failed};
use crate::node::NodeInfo;
use crate::reply::Reply;
use ::redis::aio::MultiplexedConnection;
use ::redis::Value;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Channel to one node over the redis protocol
pub struct RedisChannel {
    address: String,
    client: ::redis::Client,
    connect_timeout: Duration,
    connection: RwLock<Option<MultiplexedConnection>>,
    connect_lock: tokio::sync::Mutex<()>,
}

impl RedisChannel {
    /// Create a channel for `host:port`; no connection is made yet
    pub fn new(address: &str, connect_timeout: Duration) -> Result<Self> {
        let client = ::redis::Client::open(format!("redis://{}", address)).map_err(|e| {
            ClusterError::Config(format!("Invalid node address '{}': {}", address, e))
        })?;

        Ok(Self {
            address: address.to_string(),
            client,
            connect_timeout,
            connection: RwLock::new(None),
            connect_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Get or create the node connection
    async fn get_connection(&self) -> std::result::Result<MultiplexedConnection, NodeError> {
        if let Some(conn) = self.cached_connection() {
            return Ok(conn);
        }

        let _setup = self.connect_lock.lock().await;
        // Another caller may have connected while we waited
        if let Some(conn) = self.cached_connection() {
            return Ok(conn);
        }

        debug!("Connecting to node at {}", self.address);
        let conn = tokio::time::timeout(
            self.connect_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| {
            record_connection_failed(&self.address, "timeout");
            NodeError::Timeout(format!("Connection to {} timed out", self.address))
        })?
        .map_err(|e| {
            record_connection_failed(&self.address, "connect_error");
            NodeError::Connection(format!("Failed to connect to {}: {}", self.address, e))
        })?;

        info!("Connected to node at {}", self.address);
        record_connection_established(&self.address);
        *self.connection.write() = Some(conn.clone());
        Ok(conn)
    }

    fn cached_connection(&self) -> Option<MultiplexedConnection> {
        self.connection.read().clone()
    }

    /// Drop the cached connection
    pub fn reset_connection(&self) {
        self.connection.write().take();
    }
}

#[async_trait]
impl NodeChannel for RedisChannel {
    async fn execute(&self, command: &Command) -> std::result::Result<Reply, NodeError> {
        let mut conn = self.get_connection().await?;

        let mut cmd = ::redis::cmd(command.command_type().as_str());
        for arg in command.args() {
            cmd.arg(arg);
        }

        let value: Value = match cmd.query_async(&mut conn).await {
            Ok(value) => value,
            Err(e) => {
                let err = NodeError::from(e);
                if err.is_connection() {
                    debug!("Dropping connection to {}: {}", self.address, err);
                    self.reset_connection();
                }
                return Err(err);
            }
        };

        to_reply(value)
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

/// Convert a redis-rs value into a protocol-neutral reply
fn to_reply(value: Value) -> std::result::Result<Reply, NodeError> {
    match value {
        Value::Nil => Ok(Reply::Nil),
        Value::Okay => Ok(Reply::ok()),
        Value::Int(n) => Ok(Reply::Int(n)),
        Value::SimpleString(s) => Ok(Reply::Status(s)),
        Value::BulkString(bytes) => Ok(Reply::Bulk(bytes)),
        Value::VerbatimString { text, .. } => Ok(Reply::Bulk(text.into_bytes())),
        Value::Double(d) => Ok(Reply::Double(d)),
        Value::Boolean(b) => Ok(Reply::Boolean(b)),
        Value::Array(items) | Value::Set(items) => items
            .into_iter()
            .map(to_reply)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(Reply::Array),
        Value::Map(pairs) => pairs
            .into_iter()
            .map(|(k, v)| Ok((to_reply(k)?, to_reply(v)?)))
            .collect::<std::result::Result<Vec<_>, NodeError>>()
            .map(Reply::Map),
        Value::Attribute { data, .. } => to_reply(*data),
        other => Err(NodeError::Protocol(format!(
            "unsupported reply value: {:?}",
            other
        ))),
    }
}

/// Creates a [`RedisChannel`] for each configured node
pub struct RedisChannelFactory {
    connect_timeout: Duration,
}

impl RedisChannelFactory {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl ChannelFactory for RedisChannelFactory {
    fn create(&self, node: &NodeInfo) -> Result<Arc<dyn NodeChannel>> {
        Ok(Arc::new(RedisChannel::new(&node.address, self.connect_timeout)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    /// Serve a tiny RESP subset: DBSIZE answers 5, SAVE answers an error
    /// reply, FLUSHALL closes the socket and anything else answers OK.
    async fn spawn_node() -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let accepted = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&accepted);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let (read, mut write) = socket.into_split();
                    let mut lines = BufReader::new(read).lines();
                    while let Ok(Some(header)) = lines.next_line().await {
                        let argc: usize = header.trim_start_matches('*').parse().unwrap_or(0);
                        let mut argv = Vec::with_capacity(argc);
                        for _ in 0..argc {
                            let _len = lines.next_line().await;
                            if let Ok(Some(arg)) = lines.next_line().await {
                                argv.push(arg);
                            }
                        }
                        let reply: &[u8] = match argv.first().map(|a| a.to_ascii_uppercase()) {
                            Some(name) if name == "DBSIZE" => b":5\r\n",
                            Some(name) if name == "SAVE" => b"-ERR Background save already in progress\r\n",
                            Some(name) if name == "FLUSHALL" => return,
                            _ => b"+OK\r\n",
                        };
                        if write.write_all(reply).await.is_err() {
                            return;
                        }
                    }
                });
            }
        });

        (address, accepted)
    }

    #[test]
    fn test_to_reply_scalars() {
        assert_eq!(to_reply(Value::Okay).unwrap(), Reply::ok());
        assert_eq!(to_reply(Value::Int(30)).unwrap(), Reply::Int(30));
        assert_eq!(to_reply(Value::Nil).unwrap(), Reply::Nil);
        assert_eq!(
            to_reply(Value::BulkString(b"100mb".to_vec())).unwrap(),
            Reply::bulk("100mb")
        );
    }

    #[test]
    fn test_to_reply_nested() {
        let value = Value::Array(vec![
            Value::BulkString(b"maxmemory".to_vec()),
            Value::BulkString(b"0".to_vec()),
        ]);
        assert_eq!(
            to_reply(value).unwrap(),
            Reply::Array(vec![Reply::bulk("maxmemory"), Reply::bulk("0")])
        );

        let value = Value::Map(vec![(Value::SimpleString("a".into()), Value::Int(1))]);
        assert_eq!(
            to_reply(value).unwrap(),
            Reply::Map(vec![(Reply::Status("a".into()), Reply::Int(1))])
        );
    }

    #[test]
    fn test_channel_creation_is_lazy() {
        let channel = RedisChannel::new("127.0.0.1:6379", Duration::from_millis(100)).unwrap();
        assert!(channel.connection.read().is_none());
        assert_eq!(channel.backend_name(), "redis");
    }

    #[tokio::test]
    async fn test_unreachable_node_is_connection_failure() {
        // Port 1 on localhost is not expected to accept connections
        let channel = RedisChannel::new("127.0.0.1:1", Duration::from_millis(500)).unwrap();
        let err = channel.execute(&Command::dbsize()).await.unwrap_err();
        assert!(matches!(
            err,
            NodeError::Connection(_) | NodeError::Timeout(_)
        ));
    }

    #[tokio::test]
    async fn test_connection_reset_only_on_connection_failure() {
        let (address, accepted) = spawn_node().await;
        let channel = RedisChannel::new(&address, Duration::from_secs(2)).unwrap();

        assert_eq!(channel.execute(&Command::dbsize()).await.unwrap(), Reply::Int(5));
        assert!(channel.connection.read().is_some());

        // Error replies come over a healthy connection
        let err = channel.execute(&Command::save()).await.unwrap_err();
        assert!(matches!(err, NodeError::Server(ref msg) if msg.contains("Background save")));
        assert!(channel.connection.read().is_some());
        assert_eq!(accepted.load(Ordering::SeqCst), 1);

        let err = channel.execute(&Command::flushall()).await.unwrap_err();
        assert!(err.is_connection(), "unexpected error {:?}", err);
        assert!(channel.connection.read().is_none());

        assert_eq!(channel.execute(&Command::dbsize()).await.unwrap(), Reply::Int(5));
        assert_eq!(accepted.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_calls_share_one_connection() {
        let (address, accepted) = spawn_node().await;
        let channel = Arc::new(RedisChannel::new(&address, Duration::from_secs(2)).unwrap());

        let calls: Vec<_> = (0..8)
            .map(|_| {
                let channel = Arc::clone(&channel);
                tokio::spawn(async move { channel.execute(&Command::dbsize()).await })
            })
            .collect();
        for call in futures::future::join_all(calls).await {
            assert_eq!(call.unwrap().unwrap(), Reply::Int(5));
        }

        assert_eq!(accepted.load(Ordering::SeqCst), 1);
    }
}
