//! Protocol-neutral reply values and typed decoding
//!
//! A [`NodeChannel`](crate::NodeChannel) hands back a [`Reply`]; the
//! dispatcher then decodes it into the command's result type through
//! [`FromReply`]. The same decoder runs for every node of a fan-out, so a
//! reply that does not fit the grammar becomes a `NodeError::Protocol` for
//! that node only.

use crate::error::NodeError;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::fmt;

/// A decoded server reply
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Nil,
    /// Simple status string, e.g. `OK`
    Status(String),
    Int(i64),
    Bulk(Vec<u8>),
    Array(Vec<Reply>),
    Map(Vec<(Reply, Reply)>),
    Double(f64),
    Boolean(bool),
}

impl Reply {
    /// Build a bulk reply from text
    pub fn bulk(text: impl Into<String>) -> Self {
        Reply::Bulk(text.into().into_bytes())
    }

    /// The `OK` status reply
    pub fn ok() -> Self {
        Reply::Status("OK".to_string())
    }

    /// Short name of the reply kind for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Reply::Nil => "nil",
            Reply::Status(_) => "status",
            Reply::Int(_) => "integer",
            Reply::Bulk(_) => "bulk string",
            Reply::Array(_) => "array",
            Reply::Map(_) => "map",
            Reply::Double(_) => "double",
            Reply::Boolean(_) => "boolean",
        }
    }

    /// Text content of status and bulk replies
    pub fn as_text(&self) -> Option<String> {
        match self {
            Reply::Status(s) => Some(s.clone()),
            Reply::Bulk(b) => Some(String::from_utf8_lossy(b).into_owned()),
            _ => None,
        }
    }

    /// JSON rendering; map keys are rendered as text
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            Reply::Nil => Value::Null,
            Reply::Status(s) => Value::String(s.clone()),
            Reply::Int(n) => Value::from(*n),
            Reply::Bulk(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
            Reply::Double(d) => Value::from(*d),
            Reply::Boolean(b) => Value::Bool(*b),
            Reply::Array(items) => Value::Array(items.iter().map(Reply::to_json).collect()),
            Reply::Map(pairs) => Value::Object(
                pairs
                    .iter()
                    .map(|(k, v)| (k.as_text().unwrap_or_else(|| k.to_string()), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Nil => write!(f, "(nil)"),
            Reply::Status(s) => write!(f, "{}", s),
            Reply::Int(n) => write!(f, "(integer) {}", n),
            Reply::Bulk(b) => write!(f, "\"{}\"", String::from_utf8_lossy(b)),
            Reply::Double(d) => write!(f, "(double) {}", d),
            Reply::Boolean(b) => write!(f, "({})", b),
            Reply::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Reply::Map(pairs) => {
                write!(f, "{{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

fn unexpected(expected: &str, reply: &Reply) -> NodeError {
    NodeError::Protocol(format!("expected {}, got {}", expected, reply.kind()))
}

/// Decoding of a [`Reply`] into a command result type
pub trait FromReply: Sized + Send + 'static {
    fn from_reply(reply: Reply) -> Result<Self, NodeError>;
}

impl FromReply for Reply {
    fn from_reply(reply: Reply) -> Result<Self, NodeError> {
        Ok(reply)
    }
}

impl FromReply for String {
    fn from_reply(reply: Reply) -> Result<Self, NodeError> {
        match reply {
            Reply::Status(s) => Ok(s),
            Reply::Bulk(bytes) => String::from_utf8(bytes)
                .map_err(|e| NodeError::Protocol(format!("bulk string is not UTF-8: {}", e))),
            other => Err(unexpected("string", &other)),
        }
    }
}

impl FromReply for i64 {
    fn from_reply(reply: Reply) -> Result<Self, NodeError> {
        match reply {
            Reply::Int(n) => Ok(n),
            other => Err(unexpected("integer", &other)),
        }
    }
}

impl FromReply for bool {
    fn from_reply(reply: Reply) -> Result<Self, NodeError> {
        match reply {
            Reply::Boolean(b) => Ok(b),
            Reply::Int(n) => Ok(n != 0),
            other => Err(unexpected("boolean", &other)),
        }
    }
}

impl<T: FromReply> FromReply for Option<T> {
    fn from_reply(reply: Reply) -> Result<Self, NodeError> {
        match reply {
            Reply::Nil => Ok(None),
            other => T::from_reply(other).map(Some),
        }
    }
}

impl<T: FromReply> FromReply for Vec<T> {
    fn from_reply(reply: Reply) -> Result<Self, NodeError> {
        match reply {
            Reply::Nil => Ok(Vec::new()),
            Reply::Array(items) => items.into_iter().map(T::from_reply).collect(),
            other => Err(unexpected("array", &other)),
        }
    }
}

/// Accepts a RESP3 map or a flat key/value array
impl FromReply for HashMap<String, String> {
    fn from_reply(reply: Reply) -> Result<Self, NodeError> {
        match reply {
            Reply::Map(pairs) => pairs
                .into_iter()
                .map(|(k, v)| Ok((String::from_reply(k)?, String::from_reply(v)?)))
                .collect(),
            Reply::Array(items) => {
                if items.len() % 2 != 0 {
                    return Err(NodeError::Protocol(format!(
                        "key/value array has odd length {}",
                        items.len()
                    )));
                }
                let mut map = HashMap::with_capacity(items.len() / 2);
                let mut iter = items.into_iter();
                while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
                    map.insert(String::from_reply(k)?, String::from_reply(v)?);
                }
                Ok(map)
            }
            other => Err(unexpected("map", &other)),
        }
    }
}

/// Unix timestamp in seconds
impl FromReply for DateTime<Utc> {
    fn from_reply(reply: Reply) -> Result<Self, NodeError> {
        let secs = i64::from_reply(reply)?;
        Utc.timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| NodeError::Protocol(format!("timestamp {} out of range", secs)))
    }
}
