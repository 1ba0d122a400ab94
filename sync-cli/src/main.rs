//! # relaysync
//!
//! Backfill Nostr events for a set of identities from public relays.
//!
//! ## Commands
//!
//! - `backfill`: Fetch, verify and print stored events as JSON lines
//! - `resolve`: Resolve an npub, hex key or NIP-05 identifier
//! - `validate`: Check a public key offline
//!
//! ## Example
//!
//! ```bash
//! # Everything from relaysync.toml
//! relaysync backfill > events.jsonl
//!
//! # Ad hoc
//! relaysync backfill --relay wss://relay.damus.io --identity _@example.com --kind 1 --limit 50
//!
//! relaysync resolve bob@example.com
//! relaysync validate npub1...
//! ```
//!
//! Logs go to stderr; stdout carries only command output.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{backfill, resolve, validate};
use config::Config;

/// Backfill Nostr events from public relays.
#[derive(Parser, Debug)]
#[command(name = "relaysync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// TOML config file (default: ./relaysync.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `relaysync_client=trace` (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch stored events for the configured identities
    Backfill(BackfillArgs),

    /// Resolve an npub, hex key or NIP-05 identifier
    Resolve {
        /// npub, 64-char hex, or name@domain
        input: String,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Validate an npub or hex public key
    Validate {
        /// npub or 64-char hex
        input: String,
    },
}

/// Additions to the `[backfill]` config section.
#[derive(Args, Debug, Default)]
struct BackfillArgs {
    /// Relay URL (repeatable)
    #[arg(long = "relay")]
    relays: Vec<String>,

    /// npub, hex or NIP-05 identity (repeatable)
    #[arg(long = "identity")]
    identities: Vec<String>,

    /// Event kind (repeatable; replaces configured kinds)
    #[arg(long = "kind")]
    kinds: Vec<u32>,

    /// Only events at or after this unix time
    #[arg(long)]
    since: Option<i64>,

    /// Only events at or before this unix time
    #[arg(long)]
    until: Option<i64>,

    /// Per-relay event limit
    #[arg(long)]
    limit: Option<u64>,
}

impl BackfillArgs {
    fn apply(self, config: &mut config::BackfillConfig) {
        config.relays.extend(self.relays);
        config.identities.extend(self.identities);
        if !self.kinds.is_empty() {
            config.kinds = self.kinds;
        }
        config.since = self.since.or(config.since);
        config.until = self.until.or(config.until);
        config.limit = self.limit.or(config.limit);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref())?;

    match cli.command {
        Commands::Backfill(args) => {
            let mut config = Config::load(cli.config.as_deref())?;
            args.apply(&mut config.backfill);
            backfill::run(&config.backfill, &config.client_config()).await?;
        }
        Commands::Resolve { input, json } => {
            let config = Config::load(cli.config.as_deref())?;
            resolve::run(&input, &config.client_config(), json).await?;
        }
        Commands::Validate { input } => {
            validate::run(&input)?;
        }
    }

    Ok(())
}

/// Install the stderr subscriber. `--log-level` beats `RUST_LOG`, which beats `info`.
fn init_tracing(log_level: Option<&str>) -> Result<()> {
    let filter = match log_level {
        Some(level) => EnvFilter::try_new(level).context("invalid --log-level")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}
