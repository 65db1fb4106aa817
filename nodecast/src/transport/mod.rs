//! Node transports
//!
//! Provides the redis-backed [`NodeChannel`](crate::NodeChannel) used for
//! statically configured clusters.

#[cfg(feature = "redis-transport")]
mod redis;

#[cfg(feature = "redis-transport")]
pub use self::redis::{RedisChannel, RedisChannelFactory};
