//! mesh-c2s-replay - replay stanzas through the c2s handlers.
//!
//! Reads one stanza per line from stdin, dispatches it against the state of a
//! JSON fixture and prints every outbound stanza to stdout.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use mesh_c2s::replay::{parse_stanza, Fixture, PipelineEvent, DEFAULT_CAPACITY};
use mesh_c2s::{telemetry, C2sConfig};

/// Replay stanzas through the c2s handlers
#[derive(Parser)]
#[command(name = "mesh-c2s-replay")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON fixture with presence, offline queue, sessions, peers and keys
    #[arg(short, long)]
    fixture: Option<PathBuf>,

    /// Hostname of this node (overrides MESH_SERVERNAME)
    #[arg(short, long)]
    servername: Option<String>,

    /// Log full stanza XML
    #[arg(long)]
    log_traffic: bool,

    /// Capacity of the outbound channel (grown to fit the fixture's snapshot)
    #[arg(long, default_value_t = DEFAULT_CAPACITY)]
    capacity: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    telemetry::init().map_err(|e| anyhow!("failed to initialize logging: {}", e))?;

    let mut config = C2sConfig::from_env();
    if let Some(servername) = cli.servername {
        config = config.with_servername(servername);
    }
    if cli.log_traffic {
        config = config.with_log_traffic(true);
    }
    config.validate()?;
    config.log_config();

    let fixture = match &cli.fixture {
        Some(path) => Fixture::load(path)
            .with_context(|| format!("loading fixture {}", path.display()))?,
        None => Fixture::default(),
    };
    let mut node = fixture.build(config, cli.capacity)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let stanza = match parse_stanza(&line) {
            Ok(stanza) => stanza,
            Err(e) => {
                warn!(error = %e, "Skipping unparsable line");
                continue;
            }
        };

        let route = node.dispatcher.dispatch(stanza).await;
        println!("# {}", route.map(|r| r.name()).unwrap_or("unrouted"));

        for stanza in node.drain_outbound() {
            println!("{}", String::from(&stanza));
        }
        for event in node.pipeline.drain() {
            match event {
                PipelineEvent::Process(stanza) => println!("# process {}", String::from(&stanza)),
                PipelineEvent::Undeliverable(stanza) => {
                    println!("# undeliverable {}", String::from(&stanza))
                }
            }
        }
    }

    Ok(())
}
