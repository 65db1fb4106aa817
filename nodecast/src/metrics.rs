//! Fan-out observability metrics
//!
//! Prometheus-compatible metrics recorded through the `metrics` facade:
//! - Per-node command duration and outcome
//! - Fan-out width, failures and barrier latency
//! - Node connection establishment

use std::time::{Duration, Instant};

/// Record per-node command duration
pub fn record_node_command_duration(command: &str, node: &str, duration: Duration) {
    metrics::histogram!(
        "nodecast_node_command_duration_seconds",
        "command" => command.to_string(),
        "node" => node.to_string(),
    )
    .record(duration.as_secs_f64());
}

/// Record per-node command success
pub fn record_node_command_success(command: &str, node: &str) {
    metrics::counter!(
        "nodecast_node_commands_total",
        "command" => command.to_string(),
        "node" => node.to_string(),
        "status" => "ok",
    )
    .increment(1);
}

/// Record per-node command failure
pub fn record_node_command_error(command: &str, node: &str, error_type: &str) {
    metrics::counter!(
        "nodecast_node_commands_total",
        "command" => command.to_string(),
        "node" => node.to_string(),
        "status" => "error",
    )
    .increment(1);

    metrics::counter!(
        "nodecast_node_command_errors_total",
        "command" => command.to_string(),
        "error_type" => error_type.to_string(),
    )
    .increment(1);
}

/// Record a settled fan-out
pub fn record_fanout(command: &str, targeted: usize, failed: usize, duration: Duration) {
    metrics::counter!(
        "nodecast_fanouts_total",
        "command" => command.to_string(),
        "partial" => if failed > 0 { "true" } else { "false" },
    )
    .increment(1);

    metrics::histogram!(
        "nodecast_fanout_width",
        "command" => command.to_string(),
    )
    .record(targeted as f64);

    metrics::histogram!(
        "nodecast_fanout_duration_seconds",
        "command" => command.to_string(),
    )
    .record(duration.as_secs_f64());
}

/// Record a facade call rejected before dispatch
pub fn record_rejected_call(error_type: &str) {
    metrics::counter!(
        "nodecast_rejected_calls_total",
        "error_type" => error_type.to_string(),
    )
    .increment(1);
}

/// Record connection establishment
pub fn record_connection_established(node: &str) {
    metrics::counter!(
        "nodecast_connections_established_total",
        "node" => node.to_string(),
    )
    .increment(1);
}

/// Record connection failure
pub fn record_connection_failed(node: &str, error_type: &str) {
    metrics::counter!(
        "nodecast_connections_failed_total",
        "node" => node.to_string(),
        "error_type" => error_type.to_string(),
    )
    .increment(1);
}

/// Guard for timing one node's command execution
pub struct NodeCallTimer {
    command: String,
    node: String,
    start: Instant,
}

impl NodeCallTimer {
    /// Start timing a node command
    pub fn new(command: &str, node: &str) -> Self {
        Self {
            command: command.to_string(),
            node: node.to_string(),
            start: Instant::now(),
        }
    }

    /// Elapsed time since the timer started
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Record success and duration
    pub fn success(self) -> Duration {
        let duration = self.start.elapsed();
        record_node_command_duration(&self.command, &self.node, duration);
        record_node_command_success(&self.command, &self.node);
        duration
    }

    /// Record error and duration
    pub fn error(self, error_type: &str) -> Duration {
        let duration = self.start.elapsed();
        record_node_command_duration(&self.command, &self.node, duration);
        record_node_command_error(&self.command, &self.node, error_type);
        duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_call_timer() {
        let timer = NodeCallTimer::new("DBSIZE", "node-1");
        std::thread::sleep(Duration::from_millis(1));
        let elapsed = timer.success();
        assert!(elapsed >= Duration::from_millis(1));
    }

    #[test]
    fn test_node_call_timer_error() {
        let timer = NodeCallTimer::new("CONFIG SET", "node-2");
        timer.error("connection");
    }

    #[test]
    fn test_record_fanout() {
        // Should not panic without an installed recorder
        record_fanout("INFO", 3, 1, Duration::from_millis(12));
        record_rejected_call("invalid_argument");
    }
}
