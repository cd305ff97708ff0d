//! garaga-bridge entry point
//!
//! Reads configuration from the environment, a request from stdin (bridge and
//! self-test), and prints one JSON object to stdout. Logs go to stderr.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use garaga_bridge::{Bridge, BridgeConfig, ProofRequest};
use serde::Serialize;
use std::io::{Read, Write};
use tracing_subscriber::EnvFilter;

/// Proof-request bridge between the backend and the Garaga prover
#[derive(Parser, Debug)]
#[command(name = "garaga-bridge", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Same as the `warmup` subcommand
    #[arg(long, hide = true)]
    warmup: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Bind a proof for the request read from stdin (default)
    Bridge,
    /// Delegate to GARAGA_REAL_PROVER_CMD and validate its outputs
    Prove,
    /// Generate artifacts once for a sample request
    Warmup,
    /// Bridge two distinct intents and fail if their proofs match
    SelfTest,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("garaga_bridge=info,admission_queue=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let command = match (cli.command, cli.warmup) {
        (None, true) => Commands::Warmup,
        (Some(command), _) => command,
        (None, false) => Commands::Bridge,
    };

    let config = BridgeConfig::from_env().context("invalid bridge configuration")?;
    let bridge = Bridge::from_config(config).context("failed to set up admission queue")?;

    match command {
        Commands::Bridge => {
            let request = read_request()?;
            let payload = bridge.bridge(&request).await.context("bridge failed")?;
            emit(&payload)?;
        }
        Commands::Prove => {
            let report = bridge.prove().await.context("prove failed")?;
            emit(&report)?;
        }
        Commands::Warmup => {
            let report = bridge.warmup().await.context("warmup failed")?;
            emit(&report)?;
        }
        Commands::SelfTest => {
            let request = read_request()?;
            let report = bridge.self_test(&request).await.context("self-test failed")?;
            emit(&report)?;
            if !report.ok {
                bail!("self-test failed: both intents produced the same proof");
            }
        }
    }

    Ok(())
}

fn read_request() -> anyhow::Result<ProofRequest> {
    let mut raw = String::new();
    std::io::stdin()
        .read_to_string(&mut raw)
        .context("failed to read stdin")?;
    Ok(ProofRequest::from_json(&raw)?)
}

fn emit<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer(&mut stdout, value).context("failed to encode output")?;
    stdout.flush().context("failed to write output")?;
    Ok(())
}
