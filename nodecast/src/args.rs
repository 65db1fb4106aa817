//! Argument builders for administration commands
//!
//! Plain parameter bags that serialise to protocol argument lists. Anything
//! that can be rejected without talking to a node is rejected by
//! `validate()`, which command construction calls before dispatch.

use crate::error::{ClusterError, Result};
use serde::{Deserialize, Serialize};

/// Flush mode for FLUSHALL / FLUSHDB
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushMode {
    Async,
    Sync,
}

impl FlushMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushMode::Async => "ASYNC",
            FlushMode::Sync => "SYNC",
        }
    }
}

/// How CLIENT UNBLOCK wakes a blocked client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnblockType {
    Timeout,
    Error,
}

impl UnblockType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnblockType::Timeout => "TIMEOUT",
            UnblockType::Error => "ERROR",
        }
    }
}

/// Client connection type used by CLIENT LIST and CLIENT KILL filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    Normal,
    Master,
    Replica,
    Pubsub,
}

impl ClientType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientType::Normal => "normal",
            ClientType::Master => "master",
            ClientType::Replica => "replica",
            ClientType::Pubsub => "pubsub",
        }
    }
}

/// Filters for CLIENT KILL
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillArgs {
    pub id: Option<i64>,
    pub client_type: Option<ClientType>,
    pub user: Option<String>,
    pub addr: Option<String>,
    pub laddr: Option<String>,
    pub skipme: Option<bool>,
    pub maxage: Option<u64>,
}

impl KillArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn client_type(mut self, client_type: ClientType) -> Self {
        self.client_type = Some(client_type);
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = Some(addr.into());
        self
    }

    pub fn laddr(mut self, laddr: impl Into<String>) -> Self {
        self.laddr = Some(laddr.into());
        self
    }

    pub fn skipme(mut self, skipme: bool) -> Self {
        self.skipme = Some(skipme);
        self
    }

    pub fn maxage(mut self, seconds: u64) -> Self {
        self.maxage = Some(seconds);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if *self == Self::default() {
            return Err(ClusterError::InvalidArgument(
                "CLIENT KILL requires at least one filter".to_string(),
            ));
        }
        for (name, value) in [("ADDR", &self.addr), ("LADDR", &self.laddr)] {
            if let Some(addr) = value {
                validate_host_port(name, addr)?;
            }
        }
        Ok(())
    }

    pub fn build(&self, args: &mut Vec<String>) {
        if let Some(id) = self.id {
            args.push("ID".into());
            args.push(id.to_string());
        }
        if let Some(client_type) = self.client_type {
            args.push("TYPE".into());
            args.push(client_type.as_str().into());
        }
        if let Some(user) = &self.user {
            args.push("USER".into());
            args.push(user.clone());
        }
        if let Some(addr) = &self.addr {
            args.push("ADDR".into());
            args.push(addr.clone());
        }
        if let Some(laddr) = &self.laddr {
            args.push("LADDR".into());
            args.push(laddr.clone());
        }
        if let Some(skipme) = self.skipme {
            args.push("SKIPME".into());
            args.push(if skipme { "yes" } else { "no" }.into());
        }
        if let Some(maxage) = self.maxage {
            args.push("MAXAGE".into());
            args.push(maxage.to_string());
        }
    }
}

/// Filters for CLIENT LIST
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientListArgs {
    pub client_type: Option<ClientType>,
    pub ids: Vec<i64>,
}

impl ClientListArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client_type(mut self, client_type: ClientType) -> Self {
        self.client_type = Some(client_type);
        self
    }

    pub fn ids(mut self, ids: impl IntoIterator<Item = i64>) -> Self {
        self.ids.extend(ids);
        self
    }

    pub fn build(&self, args: &mut Vec<String>) {
        if let Some(client_type) = self.client_type {
            args.push("TYPE".into());
            args.push(client_type.as_str().into());
        }
        if !self.ids.is_empty() {
            args.push("ID".into());
            args.extend(self.ids.iter().map(|id| id.to_string()));
        }
    }
}

/// Options for CLIENT TRACKING
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingArgs {
    pub enabled: bool,
    pub redirect: Option<i64>,
    pub prefixes: Vec<String>,
    pub bcast: bool,
    pub optin: bool,
    pub optout: bool,
    pub noloop: bool,
}

impl TrackingArgs {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Default::default()
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn redirect(mut self, client_id: i64) -> Self {
        self.redirect = Some(client_id);
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefixes.push(prefix.into());
        self
    }

    pub fn bcast(mut self) -> Self {
        self.bcast = true;
        self
    }

    pub fn optin(mut self) -> Self {
        self.optin = true;
        self
    }

    pub fn optout(mut self) -> Self {
        self.optout = true;
        self
    }

    pub fn noloop(mut self) -> Self {
        self.noloop = true;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.optin && self.optout {
            return Err(ClusterError::InvalidArgument(
                "CLIENT TRACKING accepts OPTIN or OPTOUT, not both".to_string(),
            ));
        }
        if !self.prefixes.is_empty() && !self.bcast {
            return Err(ClusterError::InvalidArgument(
                "CLIENT TRACKING PREFIX requires BCAST".to_string(),
            ));
        }
        Ok(())
    }

    pub fn build(&self, args: &mut Vec<String>) {
        args.push(if self.enabled { "ON" } else { "OFF" }.into());
        if let Some(redirect) = self.redirect {
            args.push("REDIRECT".into());
            args.push(redirect.to_string());
        }
        for prefix in &self.prefixes {
            args.push("PREFIX".into());
            args.push(prefix.clone());
        }
        if self.bcast {
            args.push("BCAST".into());
        }
        if self.optin {
            args.push("OPTIN".into());
        }
        if self.optout {
            args.push("OPTOUT".into());
        }
        if self.noloop {
            args.push("NOLOOP".into());
        }
    }
}

/// Reject anything that is not `host:port` with a numeric port
pub(crate) fn validate_host_port(what: &str, addr: &str) -> Result<()> {
    match addr.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => Ok(()),
        _ => Err(ClusterError::InvalidArgument(format!(
            "{} must be host:port, got '{}'",
            what, addr
        ))),
    }
}
