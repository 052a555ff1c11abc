//! muninn: offline tooling for a muninn deployment
//!
//! Computes fingerprints the way the orchestrator does, reads entries from a
//! file-backed durable store, and validates configuration files.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use muninn::{Config, FileDurableStore, Fingerprint};
use serde_json::Value;

/// Muninn CLI
#[derive(Parser)]
#[command(name = "muninn")]
#[command(version)]
#[command(about = "Tiered cache-and-generate orchestrator tooling")]
struct Args {
    /// Config file (default: ~/.muninn/config.toml, then /etc/muninn/config.toml)
    #[arg(short, long, env = "MUNINN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compute the fingerprint of a JSON request
    Fingerprint {
        /// File holding the request (or omit to read from stdin)
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Also print the canonical form
        #[arg(long)]
        canonical: bool,
    },

    /// Show the durable entry for a fingerprint
    Inspect {
        /// 64-character hex fingerprint
        fingerprint: String,
        /// Durable store directory (default: `[durable] path` from config)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },

    /// Load and validate the config file, then print the effective settings
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Command::Fingerprint { file, canonical } => {
            // Without a config file, fingerprint with defaults.
            let config = match args.config {
                Some(path) => Config::load(Some(&path))?,
                None => Config::load(None).unwrap_or_default(),
            };
            let input = match file {
                Some(path) => tokio::fs::read_to_string(&path).await?,
                None => read_stdin()?,
            };
            let request: Value = serde_json::from_str(&input)?;
            let canonical_request = config.fingerprinter().canonicalize(&request)?;
            println!("{}", canonical_request.fingerprint);
            if canonical {
                println!("{}", canonical_request.text);
            }
        }

        Command::Inspect { fingerprint, dir } => {
            let fingerprint = Fingerprint::parse(&fingerprint)?;
            let dir = match dir {
                Some(dir) => dir,
                None => Config::load(args.config.as_deref())?
                    .durable
                    .path
                    .ok_or("no durable store: pass --dir or set [durable] path")?,
            };
            let store = FileDurableStore::open(dir)?;
            match store.peek(&fingerprint).await? {
                Some(entry) => println!("{}", serde_json::to_string_pretty(&entry)?),
                None => {
                    eprintln!("{fingerprint}: not found in {}", store.dir().display());
                    std::process::exit(1);
                }
            }
        }

        Command::CheckConfig => {
            let config = Config::load(args.config.as_deref())?;
            let dedup = config.dedup_config();
            let limits = config.rate_limit_config();
            println!("fingerprint salt:      {}", config.fingerprint.salt.as_deref().unwrap_or("(none)"));
            println!("order-insensitive:     {:?}", config.fingerprint.order_insensitive);
            println!(
                "fast cache:            {} entries, ttl {}s",
                config.fast_cache.max_entries, config.fast_cache.ttl_secs
            );
            match &config.durable.path {
                Some(path) => println!("durable store:         {}", path.display()),
                None => println!("durable store:         in memory"),
            }
            println!(
                "dedup:                 claim {:?}, poll {:?}, wait {:?}",
                dedup.claim_ttl, dedup.poll_interval, dedup.max_wait
            );
            println!(
                "rate limits:           anonymous {}, authenticated {} per {:?} (fail {:?})",
                limits.anonymous.limit,
                limits.authenticated.limit,
                limits.anonymous.window,
                limits.on_store_failure
            );
            println!("generation timeout:    {:?}", config.generation_timeout());
            println!("required collections:  {:?}", config.generation.required_collections);
        }
    }

    Ok(())
}

fn read_stdin() -> Result<String, Box<dyn std::error::Error>> {
    if io::stdin().is_terminal() {
        return Err("fingerprint: no input provided (pass --file or pipe JSON via stdin)".into());
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}
