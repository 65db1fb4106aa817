use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use nodecast::{ClusterClient, Config, NodeSelectionCommands, ObservabilityConfig, Selector};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod output;

use output::Format;

#[derive(Parser, Debug)]
#[command(name = "nodecast")]
#[command(about = "Run administration commands across the nodes of a cluster")]
#[command(version)]
struct Cli {
    /// Cluster configuration file
    #[arg(short, long, env = "NODECAST_CONFIG", default_value = "nodecast.toml")]
    config: PathBuf,

    /// Target nodes: all, masters, replicas, or a comma-separated list of node ids
    #[arg(short, long, default_value = "all")]
    select: String,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Table)]
    format: Format,

    /// Override the per-node request timeout
    #[arg(long)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Number of keys on each node
    Dbsize,

    /// Server information
    Info {
        /// Only this INFO section
        section: Option<String>,
    },

    /// Read configuration parameters
    ConfigGet {
        /// Parameter names or glob patterns
        #[arg(required = true)]
        parameters: Vec<String>,
    },

    /// Set a configuration parameter
    ConfigSet { parameter: String, value: String },

    /// Delete every key on the selected nodes
    Flushall {
        /// Flush in the background
        #[arg(long = "async")]
        asynchronous: bool,

        /// Confirm the flush
        #[arg(long)]
        yes: bool,
    },

    /// Synchronous save
    Save,

    /// Background save
    Bgsave,

    /// Background append-only file rewrite
    Bgrewriteaof,

    /// Time of the last successful save
    Lastsave,

    /// Number of slow log entries
    SlowlogLen,

    /// Clear the slow log
    SlowlogReset,

    /// Connected clients
    ClientList,

    /// Suspend clients for a number of milliseconds
    ClientPause { timeout_ms: i64 },

    /// Server time
    Time,

    /// List the selected nodes without contacting them
    Nodes,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_or_default(&cli.config)
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    init_tracing(&config.observability);

    if let Some(timeout_ms) = cli.timeout_ms {
        config.cluster.request_timeout_ms = timeout_ms;
    }
    if config.cluster.nodes.is_empty() {
        bail!("No nodes configured in {}", cli.config.display());
    }

    let client = ClusterClient::connect(config.cluster)?;
    let selection = client.select(parse_selector(&cli.select));
    tracing::debug!(selector = ?selection.selector(), "Resolved command target");

    let failed = run(&selection, cli.command, cli.format)?;
    if failed > 0 {
        bail!("{} node(s) failed", failed);
    }
    Ok(())
}

fn run(nodes: &NodeSelectionCommands<'_>, command: Commands, format: Format) -> Result<usize> {
    let failed = match command {
        Commands::Dbsize => output::print(&nodes.dbsize()?, format)?,
        Commands::Info { section: Some(section) } => {
            output::print(&nodes.info_section(&section)?, format)?
        }
        Commands::Info { section: None } => output::print(&nodes.info()?, format)?,
        Commands::ConfigGet { parameters } => {
            output::print(&nodes.config_get_many(parameters.as_slice())?, format)?
        }
        Commands::ConfigSet { parameter, value } => {
            output::print(&nodes.config_set(&parameter, &value)?, format)?
        }
        Commands::Flushall { asynchronous, yes } => {
            if !yes {
                bail!("Refusing to flush without --yes");
            }
            let executions = if asynchronous {
                nodes.flushall_with(nodecast::FlushMode::Async)?
            } else {
                nodes.flushall()?
            };
            output::print(&executions, format)?
        }
        Commands::Save => output::print(&nodes.save()?, format)?,
        Commands::Bgsave => output::print(&nodes.bgsave()?, format)?,
        Commands::Bgrewriteaof => output::print(&nodes.bgrewriteaof()?, format)?,
        Commands::Lastsave => output::print(&nodes.lastsave()?, format)?,
        Commands::SlowlogLen => output::print(&nodes.slowlog_len()?, format)?,
        Commands::SlowlogReset => output::print(&nodes.slowlog_reset()?, format)?,
        Commands::ClientList => output::print(&nodes.client_list()?, format)?,
        Commands::ClientPause { timeout_ms } => {
            output::print(&nodes.client_pause(timeout_ms)?, format)?
        }
        Commands::Time => output::print(&nodes.time()?, format)?,
        Commands::Nodes => {
            print_nodes(nodes, format)?;
            0
        }
    };
    Ok(failed)
}

fn print_nodes(nodes: &NodeSelectionCommands<'_>, format: Format) -> Result<()> {
    let selection = nodes.selection()?;
    match format {
        Format::Json => {
            let infos: Vec<_> = selection.iter().map(|n| n.info().clone()).collect();
            println!("{}", serde_json::to_string_pretty(&infos)?);
        }
        Format::Table => {
            println!("{:<20} {:<22} {:<8}", "NODE", "ADDRESS", "ROLE");
            println!("{}", "-".repeat(52));
            for node in selection.iter() {
                println!("{:<20} {:<22} {:<8}", node.id(), node.address(), node.role());
            }
        }
    }
    for id in selection.skipped() {
        eprintln!("warning: node '{}' is not in the topology", id);
    }
    Ok(())
}

fn parse_selector(target: &str) -> Selector {
    match target.trim() {
        "all" => Selector::All,
        "masters" | "master" => Selector::Masters,
        "replicas" | "replica" => Selector::Replicas,
        ids => Selector::nodes(
            ids.split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string),
        ),
    }
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| config.log_format.clone());

    let registry = tracing_subscriber::registry().with(filter);
    if format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_selector() {
        assert!(matches!(parse_selector("all"), Selector::All));
        assert!(matches!(parse_selector("masters"), Selector::Masters));
        assert!(matches!(parse_selector("replica"), Selector::Replicas));
        match parse_selector("node-1, node-3,") {
            Selector::Nodes(ids) => {
                let ids: Vec<&str> = ids.iter().map(|id| id.as_str()).collect();
                assert_eq!(ids, vec!["node-1", "node-3"]);
            }
            other => panic!("unexpected selector {:?}", other),
        }
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from([
            "nodecast",
            "--select",
            "replicas",
            "--format",
            "json",
            "config-get",
            "maxmemory",
            "timeout",
        ])
        .unwrap();
        assert_eq!(cli.format, Format::Json);
        assert!(matches!(cli.command, Commands::ConfigGet { ref parameters } if parameters.len() == 2));

        assert!(Cli::try_parse_from(["nodecast", "config-get"]).is_err());
    }
}
