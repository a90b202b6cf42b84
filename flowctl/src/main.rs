//! flowctl: run the controller logic against a recorded event trace.
//!
//! The OpenFlow channel is not part of this binary. `replay` reads
//! protocol events as JSON lines and writes the resulting commands as JSON
//! lines on stdout; `check` validates a configuration and prints the
//! static rule set of every switch followed by the host table.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flowctl::{Controller, ControllerConfig, Event, JsonLinesDatapath, ValidatedConfig, rules_for};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "flowctl", version, about = "Per-switch policy, MAC learning and ARP proxy controller")]
struct Args {
    /// Configuration file (JSON). Uses the built-in topology if omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate the configuration and print every switch's static rules
    Check,
    /// Feed a JSON-lines event trace through the controller
    Replay {
        /// Event file, or '-' for stdin
        #[arg(short, long, default_value = "-")]
        events: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the command stream
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => ControllerConfig::load(path)?,
        None => ControllerConfig::default(),
    };
    let config = config.validate().context("configuration rejected")?;
    info!(switches = config.roles.len(), "Configuration validated");

    match args.command {
        Commands::Check => check(&config),
        Commands::Replay { events } => replay(&config, &events).await,
    }
}

fn check(config: &ValidatedConfig) -> Result<()> {
    for (dpid, role) in config.roles.entries() {
        let rules = config.priority.assign(rules_for(role, &config.policy));
        let doc = serde_json::json!({
            "dpid": dpid.0,
            "switch": dpid.to_string(),
            "role": role,
            "rules": rules,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
    }

    let policy = &config.policy;
    let hosts = serde_json::json!({
        "hosts": config.hosts,
        "untrusted": { "name": config.host_name(policy.untrusted), "ip": policy.untrusted },
        "protected": { "name": config.host_name(policy.protected), "ip": policy.protected },
    });
    println!("{}", serde_json::to_string_pretty(&hosts)?);
    Ok(())
}

async fn replay(config: &ValidatedConfig, events: &str) -> Result<()> {
    let input: Box<dyn AsyncRead + Unpin + Send> = if events == "-" {
        Box::new(tokio::io::stdin())
    } else {
        let file = tokio::fs::File::open(events)
            .await
            .with_context(|| format!("failed to open {}", events))?;
        Box::new(file)
    };

    let datapath = Arc::new(JsonLinesDatapath::new(std::io::stdout()));
    let controller = Controller::new(config, datapath);

    let mut sigint = signal(SignalKind::interrupt()).context("failed to set up SIGINT handler")?;
    let mut sigterm = signal(SignalKind::terminate()).context("failed to set up SIGTERM handler")?;

    let mut lines = BufReader::new(input).lines();
    let mut line_no = 0usize;

    loop {
        let line = tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down...");
                break;
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
                break;
            }
            line = lines.next_line() => line.context("failed to read event")?,
        };
        let Some(line) = line else { break };
        line_no += 1;

        if line.trim().is_empty() {
            continue;
        }

        let event: Event = match serde_json::from_str(&line) {
            Ok(e) => e,
            Err(e) => {
                warn!(line = line_no, error = %e, "Skipping malformed event");
                continue;
            }
        };

        if let Err(e) = controller.handle_event(event).await {
            error!(line = line_no, error = %e, "Event rejected");
        }
    }

    controller.shutdown().await;
    info!(events = line_no, "Replay finished");
    Ok(())
}
