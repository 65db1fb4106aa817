//! Command descriptors
//!
//! A [`Command`] is the immutable, already-validated description of one
//! administrative command. Constructors that take user input validate it and
//! return `ClusterError::InvalidArgument`, so a bad argument fails before any
//! node is selected or contacted.

use crate::args::{validate_host_port, ClientListArgs, FlushMode, KillArgs, TrackingArgs, UnblockType};
use crate::error::{ClusterError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Top-level protocol keyword of an administrative command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandType {
    Bgrewriteaof,
    Bgsave,
    Client,
    Command,
    Config,
    Dbsize,
    Debug,
    Flushall,
    Flushdb,
    Info,
    Lastsave,
    Memory,
    Replicaof,
    Save,
    Slowlog,
    Time,
}

impl CommandType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::Bgrewriteaof => "BGREWRITEAOF",
            CommandType::Bgsave => "BGSAVE",
            CommandType::Client => "CLIENT",
            CommandType::Command => "COMMAND",
            CommandType::Config => "CONFIG",
            CommandType::Dbsize => "DBSIZE",
            CommandType::Debug => "DEBUG",
            CommandType::Flushall => "FLUSHALL",
            CommandType::Flushdb => "FLUSHDB",
            CommandType::Info => "INFO",
            CommandType::Lastsave => "LASTSAVE",
            CommandType::Memory => "MEMORY",
            CommandType::Replicaof => "REPLICAOF",
            CommandType::Save => "SAVE",
            CommandType::Slowlog => "SLOWLOG",
            CommandType::Time => "TIME",
        }
    }

    /// Whether the first argument is a subcommand (CLIENT KILL, CONFIG GET, ...)
    pub fn has_subcommands(&self) -> bool {
        matches!(
            self,
            CommandType::Client
                | CommandType::Command
                | CommandType::Config
                | CommandType::Debug
                | CommandType::Memory
                | CommandType::Slowlog
        )
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable command descriptor shared by every per-node execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    command_type: CommandType,
    args: Vec<String>,
}

impl Command {
    fn new(command_type: CommandType) -> Self {
        Self {
            command_type,
            args: Vec::new(),
        }
    }

    fn sub(command_type: CommandType, subcommand: &str) -> Self {
        Self {
            command_type,
            args: vec![subcommand.to_string()],
        }
    }

    fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn command_type(&self) -> CommandType {
        self.command_type
    }

    /// Arguments after the top-level keyword
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Keyword plus subcommand, used for logs and metric labels
    pub fn name(&self) -> String {
        match self.args.first() {
            Some(sub) if self.command_type.has_subcommands() => {
                format!("{} {}", self.command_type, sub)
            }
            _ => self.command_type.to_string(),
        }
    }

    // ========================================
    // Persistence
    // ========================================

    pub fn bgrewriteaof() -> Self {
        Self::new(CommandType::Bgrewriteaof)
    }

    pub fn bgsave() -> Self {
        Self::new(CommandType::Bgsave)
    }

    pub fn save() -> Self {
        Self::new(CommandType::Save)
    }

    pub fn lastsave() -> Self {
        Self::new(CommandType::Lastsave)
    }

    pub fn flushall() -> Self {
        Self::new(CommandType::Flushall)
    }

    pub fn flushall_with(mode: FlushMode) -> Self {
        Self::new(CommandType::Flushall).arg(mode.as_str())
    }

    pub fn flushdb() -> Self {
        Self::new(CommandType::Flushdb)
    }

    pub fn flushdb_with(mode: FlushMode) -> Self {
        Self::new(CommandType::Flushdb).arg(mode.as_str())
    }

    pub fn dbsize() -> Self {
        Self::new(CommandType::Dbsize)
    }

    // ========================================
    // Client introspection
    // ========================================

    pub fn client_caching(enabled: bool) -> Self {
        Self::sub(CommandType::Client, "CACHING").arg(if enabled { "YES" } else { "NO" })
    }

    pub fn client_getname() -> Self {
        Self::sub(CommandType::Client, "GETNAME")
    }

    pub fn client_getredir() -> Self {
        Self::sub(CommandType::Client, "GETREDIR")
    }

    pub fn client_id() -> Self {
        Self::sub(CommandType::Client, "ID")
    }

    pub fn client_info() -> Self {
        Self::sub(CommandType::Client, "INFO")
    }

    /// Old-style `CLIENT KILL ip:port`
    pub fn client_kill(addr: &str) -> Result<Self> {
        validate_host_port("client address", addr)?;
        Ok(Self::sub(CommandType::Client, "KILL").arg(addr))
    }

    /// Filter-style `CLIENT KILL`, replies with the number of killed clients
    pub fn client_kill_with(kill: &KillArgs) -> Result<Self> {
        kill.validate()?;
        let mut command = Self::sub(CommandType::Client, "KILL");
        kill.build(&mut command.args);
        Ok(command)
    }

    pub fn client_list() -> Self {
        Self::sub(CommandType::Client, "LIST")
    }

    pub fn client_list_with(list: &ClientListArgs) -> Self {
        let mut command = Self::sub(CommandType::Client, "LIST");
        list.build(&mut command.args);
        command
    }

    pub fn client_no_evict(on: bool) -> Self {
        Self::sub(CommandType::Client, "NO-EVICT").arg(if on { "ON" } else { "OFF" })
    }

    /// Suspend clients for `timeout_ms` milliseconds
    pub fn client_pause(timeout_ms: i64) -> Result<Self> {
        if timeout_ms < 0 {
            return Err(ClusterError::InvalidArgument(format!(
                "CLIENT PAUSE timeout must not be negative, got {}",
                timeout_ms
            )));
        }
        Ok(Self::sub(CommandType::Client, "PAUSE").arg(timeout_ms.to_string()))
    }

    pub fn client_setname(name: &str) -> Result<Self> {
        if name.chars().any(char::is_whitespace) {
            return Err(ClusterError::InvalidArgument(format!(
                "client name must not contain whitespace: '{}'",
                name
            )));
        }
        Ok(Self::sub(CommandType::Client, "SETNAME").arg(name))
    }

    pub fn client_setinfo(key: &str, value: &str) -> Result<Self> {
        if key.trim().is_empty() {
            return Err(ClusterError::InvalidArgument(
                "CLIENT SETINFO attribute must not be empty".to_string(),
            ));
        }
        Ok(Self::sub(CommandType::Client, "SETINFO").arg(key).arg(value))
    }

    pub fn client_tracking(tracking: &TrackingArgs) -> Result<Self> {
        tracking.validate()?;
        let mut command = Self::sub(CommandType::Client, "TRACKING");
        tracking.build(&mut command.args);
        Ok(command)
    }

    pub fn client_unblock(id: i64, unblock: UnblockType) -> Self {
        Self::sub(CommandType::Client, "UNBLOCK")
            .arg(id.to_string())
            .arg(unblock.as_str())
    }

    // ========================================
    // Command introspection
    // ========================================

    pub fn command() -> Self {
        Self::new(CommandType::Command)
    }

    pub fn command_count() -> Self {
        Self::sub(CommandType::Command, "COUNT")
    }

    pub fn command_info<S: AsRef<str>>(commands: &[S]) -> Result<Self> {
        if commands.is_empty() {
            return Err(ClusterError::InvalidArgument(
                "COMMAND INFO requires at least one command name".to_string(),
            ));
        }
        let mut command = Self::sub(CommandType::Command, "INFO");
        command
            .args
            .extend(commands.iter().map(|c| c.as_ref().to_string()));
        Ok(command)
    }

    pub fn command_info_for(types: &[CommandType]) -> Result<Self> {
        let names: Vec<&str> = types.iter().map(|t| t.as_str()).collect();
        Self::command_info(&names)
    }

    // ========================================
    // Configuration
    // ========================================

    pub fn config_get(parameter: &str) -> Result<Self> {
        Self::config_get_many(&[parameter])
    }

    pub fn config_get_many<S: AsRef<str>>(parameters: &[S]) -> Result<Self> {
        if parameters.is_empty() || parameters.iter().any(|p| p.as_ref().is_empty()) {
            return Err(ClusterError::InvalidArgument(
                "CONFIG GET requires non-empty parameter patterns".to_string(),
            ));
        }
        let mut command = Self::sub(CommandType::Config, "GET");
        command
            .args
            .extend(parameters.iter().map(|p| p.as_ref().to_string()));
        Ok(command)
    }

    pub fn config_resetstat() -> Self {
        Self::sub(CommandType::Config, "RESETSTAT")
    }

    pub fn config_rewrite() -> Self {
        Self::sub(CommandType::Config, "REWRITE")
    }

    pub fn config_set(parameter: &str, value: &str) -> Result<Self> {
        let mut kvs = BTreeMap::new();
        kvs.insert(parameter.to_string(), value.to_string());
        Self::config_set_many(&kvs)
    }

    /// Parameters are sent in key order so every node sees identical arguments
    pub fn config_set_many(kvs: &BTreeMap<String, String>) -> Result<Self> {
        if kvs.is_empty() || kvs.keys().any(|k| k.is_empty()) {
            return Err(ClusterError::InvalidArgument(
                "CONFIG SET requires non-empty parameter names".to_string(),
            ));
        }
        let mut command = Self::sub(CommandType::Config, "SET");
        for (k, v) in kvs {
            command.args.push(k.clone());
            command.args.push(v.clone());
        }
        Ok(command)
    }

    // ========================================
    // Debugging
    // ========================================

    pub fn debug_crash_and_recover(delay_ms: Option<i64>) -> Result<Self> {
        Self::debug_with_delay("CRASH-AND-RECOVER", delay_ms)
    }

    pub fn debug_restart(delay_ms: Option<i64>) -> Result<Self> {
        Self::debug_with_delay("RESTART", delay_ms)
    }

    fn debug_with_delay(subcommand: &str, delay_ms: Option<i64>) -> Result<Self> {
        let command = Self::sub(CommandType::Debug, subcommand);
        match delay_ms {
            Some(delay) if delay < 0 => Err(ClusterError::InvalidArgument(format!(
                "DEBUG {} delay must not be negative, got {}",
                subcommand, delay
            ))),
            Some(delay) => Ok(command.arg(delay.to_string())),
            None => Ok(command),
        }
    }

    pub fn debug_htstats(db: i32) -> Result<Self> {
        if db < 0 {
            return Err(ClusterError::InvalidArgument(format!(
                "database index must not be negative, got {}",
                db
            )));
        }
        Ok(Self::sub(CommandType::Debug, "HTSTATS").arg(db.to_string()))
    }

    pub fn debug_object(key: &str) -> Self {
        Self::sub(CommandType::Debug, "OBJECT").arg(key)
    }

    pub fn debug_reload() -> Self {
        Self::sub(CommandType::Debug, "RELOAD")
    }

    pub fn debug_sdslen(key: &str) -> Self {
        Self::sub(CommandType::Debug, "SDSLEN").arg(key)
    }

    // ========================================
    // Server info
    // ========================================

    pub fn info() -> Self {
        Self::new(CommandType::Info)
    }

    pub fn info_section(section: &str) -> Result<Self> {
        if section.trim().is_empty() {
            return Err(ClusterError::InvalidArgument(
                "INFO section must not be empty".to_string(),
            ));
        }
        Ok(Self::new(CommandType::Info).arg(section))
    }

    pub fn memory_usage(key: &str) -> Self {
        Self::sub(CommandType::Memory, "USAGE").arg(key)
    }

    pub fn time() -> Self {
        Self::new(CommandType::Time)
    }

    // ========================================
    // Replication
    // ========================================

    pub fn replicaof(host: &str, port: u16) -> Result<Self> {
        if host.trim().is_empty() {
            return Err(ClusterError::InvalidArgument(
                "REPLICAOF host must not be empty".to_string(),
            ));
        }
        if port == 0 {
            return Err(ClusterError::InvalidArgument(
                "REPLICAOF port must be greater than zero".to_string(),
            ));
        }
        Ok(Self::new(CommandType::Replicaof)
            .arg(host)
            .arg(port.to_string()))
    }

    pub fn replicaof_no_one() -> Self {
        Self::new(CommandType::Replicaof).arg("NO").arg("ONE")
    }

    // ========================================
    // Slow log
    // ========================================

    pub fn slowlog_get() -> Self {
        Self::sub(CommandType::Slowlog, "GET")
    }

    /// A negative count asks the server for the whole log
    pub fn slowlog_get_count(count: i32) -> Self {
        Self::sub(CommandType::Slowlog, "GET").arg(count.to_string())
    }

    pub fn slowlog_len() -> Self {
        Self::sub(CommandType::Slowlog, "LEN")
    }

    pub fn slowlog_reset() -> Self {
        Self::sub(CommandType::Slowlog, "RESET")
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command_type)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}
