//! Command-line interface for keyspace-verify
//!
//! # Usage Examples
//!
//! ```bash
//! # Full comparison, source-driven
//! keyspace-verify compare --source source.jsonl --target replica.jsonl
//!
//! # Quick mode with a TTL tolerance
//! keyspace-verify compare --source source.jsonl --target replica.jsonl \
//!   --quick --ttl-tolerance 2s
//!
//! # Only user keys, prefix rewritten on the replica
//! keyspace-verify compare --source source.jsonl --target replica.jsonl \
//!   --key-include 'user:*' --source-prefix user: --target-prefix app1:user:
//!
//! # Options from a settings file
//! keyspace-verify compare --source source.jsonl --target replica.jsonl \
//!   --config verify.yaml
//! ```
//!
//! ## Exit Codes
//! - `0`: every compared key matched
//! - `1`: the run completed and found differences
//! - `2`: the run failed, was interrupted, or could not start

use clap::{Parser, Subcommand};
use keyspace_verify::compare::{exit_code, run_compare, CompareArgs, EXIT_INCONCLUSIVE};
use keyspace_verify::shutdown::cancel_on_ctrl_c;

#[derive(Parser)]
#[command(name = "keyspace-verify")]
#[command(about = "Verify that a replicated key-value keyspace matches its source")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare a source keyspace with its replica
    Compare(CompareArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    match run().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(EXIT_INCONCLUSIVE);
        }
    }
}

async fn run() -> anyhow::Result<i32> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Compare(args) => {
            let cancel = cancel_on_ctrl_c();
            let report = run_compare(args, cancel).await?;
            println!("{}", report.summary());
            Ok(exit_code(&report))
        }
    }
}
