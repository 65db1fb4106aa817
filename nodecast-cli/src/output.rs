//! Rendering of per-node outcomes

use clap::ValueEnum;
use nodecast::{Executions, Reply};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Table,
    Json,
}

/// A command result value the CLI knows how to print
pub trait Render {
    fn to_text(&self) -> String;
    fn to_json(&self) -> Value;
}

impl Render for String {
    fn to_text(&self) -> String {
        self.clone()
    }

    fn to_json(&self) -> Value {
        Value::String(self.clone())
    }
}

impl Render for i64 {
    fn to_text(&self) -> String {
        self.to_string()
    }

    fn to_json(&self) -> Value {
        Value::from(*self)
    }
}

impl Render for chrono::DateTime<chrono::Utc> {
    fn to_text(&self) -> String {
        self.to_rfc3339()
    }

    fn to_json(&self) -> Value {
        Value::String(self.to_rfc3339())
    }
}

impl Render for Vec<String> {
    fn to_text(&self) -> String {
        self.join(" ")
    }

    fn to_json(&self) -> Value {
        Value::from(self.clone())
    }
}

impl Render for Vec<Reply> {
    fn to_text(&self) -> String {
        self.iter().map(|r| r.to_string()).collect::<Vec<_>>().join("\n")
    }

    fn to_json(&self) -> Value {
        Value::Array(self.iter().map(Reply::to_json).collect())
    }
}

impl Render for HashMap<String, String> {
    fn to_text(&self) -> String {
        let sorted: BTreeMap<_, _> = self.iter().collect();
        sorted
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn to_json(&self) -> Value {
        let sorted: BTreeMap<_, _> = self.iter().collect();
        serde_json::to_value(sorted).unwrap_or(Value::Null)
    }
}

#[derive(Serialize)]
struct Report {
    command: String,
    targeted: usize,
    failed: usize,
    nodes: Vec<Row>,
}

#[derive(Serialize)]
struct Row {
    node: String,
    address: String,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    latency_ms: u64,
}

/// Print an aggregate and return the number of failed nodes
pub fn print<T: Render>(executions: &Executions<T>, format: Format) -> anyhow::Result<usize> {
    let failed = executions.failure_count();
    match format {
        Format::Json => {
            let report = Report {
                command: executions.command().to_string(),
                targeted: executions.len(),
                failed,
                nodes: executions
                    .iter()
                    .map(|o| Row {
                        node: o.node().to_string(),
                        address: o.address().to_string(),
                        ok: o.is_ok(),
                        value: o.value().map(Render::to_json),
                        error: o.error().map(|e| e.to_string()),
                        latency_ms: o.latency().as_millis() as u64,
                    })
                    .collect(),
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Format::Table => {
            println!(
                "{:<20} {:<22} {:<8} {:>8}  {}",
                "NODE", "ADDRESS", "STATUS", "MS", "RESULT"
            );
            println!("{}", "-".repeat(80));
            for o in executions {
                let (status, text) = match o.result() {
                    Ok(value) => ("ok", value.to_text()),
                    Err(e) => (e.error_type(), e.to_string()),
                };
                let mut lines = text.lines();
                println!(
                    "{:<20} {:<22} {:<8} {:>8}  {}",
                    o.node(),
                    o.address(),
                    status,
                    o.latency().as_millis(),
                    lines.next().unwrap_or("")
                );
                for line in lines {
                    println!("{:<62}{}", "", line);
                }
            }
            println!();
            println!(
                "{}: {} node(s), {} failed",
                executions.command(),
                executions.len(),
                failed
            );
        }
    }
    Ok(failed)
}
