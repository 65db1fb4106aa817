//! Error types for fan-out administration
//!
//! Two levels of failure exist. [`ClusterError`] is raised by the facade
//! itself, before or instead of a fan-out. [`NodeError`] is the failure cause
//! of a single node's execution and only ever lives inside an
//! [`Executions`](crate::Executions) aggregate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by a facade call itself
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClusterError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Empty selection: {0}")]
    EmptySelection(String),

    #[error("No such element: {0}")]
    NoSuchElement(String),

    #[error("Expected exactly one node, aggregate holds {0}")]
    NotSingleNode(usize),

    #[error("Partial failure: {failed}/{total} nodes failed")]
    PartialFailure { failed: usize, total: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl ClusterError {
    /// Get the error type as a string for metrics labeling
    pub fn error_type(&self) -> &'static str {
        match self {
            ClusterError::InvalidArgument(_) => "invalid_argument",
            ClusterError::EmptySelection(_) => "empty_selection",
            ClusterError::NoSuchElement(_) => "no_such_element",
            ClusterError::NotSingleNode(_) => "not_single_node",
            ClusterError::PartialFailure { .. } => "partial_failure",
            ClusterError::Config(_) => "config",
            ClusterError::Runtime(_) => "runtime",
            ClusterError::Io(_) => "io",
        }
    }
}

impl From<std::io::Error> for ClusterError {
    fn from(err: std::io::Error) -> Self {
        ClusterError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for ClusterError {
    fn from(err: toml::de::Error) -> Self {
        ClusterError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for ClusterError {
    fn from(err: toml::ser::Error) -> Self {
        ClusterError::Config(err.to_string())
    }
}

/// Failure cause of one node's execution
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeError {
    /// The reply could not be decoded into the command's result type
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The node answered with an error reply
    #[error("Server error: {0}")]
    Server(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    /// The execution task ended without settling its slot
    #[error("Execution aborted: {0}")]
    Aborted(String),
}

impl NodeError {
    /// Get the error type as a string for metrics labeling
    pub fn error_type(&self) -> &'static str {
        match self {
            NodeError::Protocol(_) => "protocol",
            NodeError::Server(_) => "server",
            NodeError::Connection(_) => "connection",
            NodeError::Timeout(_) => "timeout",
            NodeError::Aborted(_) => "aborted",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, NodeError::Timeout(_))
    }

    /// Whether the transport to the node is no longer usable
    pub fn is_connection(&self) -> bool {
        matches!(self, NodeError::Connection(_))
    }
}

#[cfg(feature = "redis-transport")]
impl From<redis::RedisError> for NodeError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_timeout() {
            NodeError::Timeout(err.to_string())
        } else if err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() {
            NodeError::Connection(err.to_string())
        } else if err.kind() == redis::ErrorKind::TypeError {
            NodeError::Protocol(err.to_string())
        } else {
            NodeError::Server(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, ClusterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_type_labels() {
        assert_eq!(
            ClusterError::InvalidArgument("x".into()).error_type(),
            "invalid_argument"
        );
        assert_eq!(
            ClusterError::PartialFailure { failed: 1, total: 3 }.error_type(),
            "partial_failure"
        );
        assert_eq!(NodeError::Timeout("slow".into()).error_type(), "timeout");
        assert_eq!(NodeError::Connection("reset".into()).error_type(), "connection");
    }

    #[test]
    fn test_partial_failure_display() {
        let err = ClusterError::PartialFailure { failed: 1, total: 3 };
        assert_eq!(err.to_string(), "Partial failure: 1/3 nodes failed");
    }

    #[test]
    fn test_node_error_serde() {
        let err = NodeError::Server("ERR unknown command".into());
        let json = serde_json::to_string(&err).unwrap();
        let back: NodeError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
        assert!(!back.is_timeout());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: ClusterError = io.into();
        assert!(matches!(err, ClusterError::Io(msg) if msg.contains("missing")));
    }

    #[cfg(feature = "redis-transport")]
    #[test]
    fn test_redis_error_classification() {
        use redis::{ErrorKind, RedisError};
        use std::io;

        let err = NodeError::from(RedisError::from((ErrorKind::ResponseError, "ERR unknown command")));
        assert!(matches!(err, NodeError::Server(ref msg) if msg.contains("unknown command")));

        let err = NodeError::from(RedisError::from(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "reset by peer",
        )));
        assert!(err.is_connection());

        let err = NodeError::from(RedisError::from(io::Error::from(io::ErrorKind::ConnectionRefused)));
        assert!(err.is_connection());

        let err = NodeError::from(RedisError::from((ErrorKind::TypeError, "unexpected reply")));
        assert_eq!(err.error_type(), "protocol");

        let err = NodeError::from(RedisError::from(io::Error::new(
            io::ErrorKind::TimedOut,
            "read timed out",
        )));
        assert!(err.is_timeout());
        assert!(!err.is_connection());
    }
}
