// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! Developer-facing binary for exercising a bundle against the execution
//! engine from a terminal (spec.md §2: *not* the submission/scheduling
//! surface — no queuing, no multi-worker coordination).

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use sx_host::HostConfig;
use tracing_subscriber::EnvFilter;

use commands::SchemaKind;

/// Exit code for runtime errors (engine/config/IO failures).
const EXIT_RUNTIME_ERROR: i32 = 1;

#[derive(Parser, Debug)]
#[command(name = "sx", version, about = "Simulation execution engine developer CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one simulation task against a bundle.
    Run {
        /// Bundle reference: `sha256:<digest>`, `file://...`, `local://...`,
        /// or a bare path. `local://dev` runs against the current
        /// directory with the fixed sentinel digest.
        #[arg(long, default_value = "local://dev")]
        bundle: String,

        /// `module.path/scenario` or `module.path:symbol`.
        #[arg(long)]
        entrypoint: String,

        /// Repeated `name=value` parameter flags; the value is parsed as
        /// JSON when possible, otherwise kept as a string.
        #[arg(long = "param")]
        params: Vec<String>,

        /// Random seed for this replicate.
        #[arg(long, default_value_t = 0)]
        seed: i64,

        /// Restrict to these named outputs (repeatable). Omit to request
        /// every output the wire function produces.
        #[arg(long = "output")]
        outputs: Vec<String>,

        /// Write the resulting `SimReturn` JSON to this file instead of
        /// stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Aggregate a batch of previously-computed `SimReturn`s through a
    /// bundle's target entrypoint.
    Aggregate {
        /// Bundle reference the target entrypoint lives in.
        #[arg(long, default_value = "local://dev")]
        bundle: String,

        /// `module.path:symbol` naming the target callable.
        #[arg(long)]
        target: String,

        /// Paths to `SimReturn` JSON files, as written by `sx run --out`.
        #[arg(long = "sim-return", required = true)]
        sim_returns: Vec<PathBuf>,

        /// Optional observed-data JSON payload passed through to the
        /// target.
        #[arg(long)]
        target_data: Option<PathBuf>,

        /// Write the resulting `AggregationReturn` JSON to this file
        /// instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Drive a warm process through repeated `execute` calls against one
    /// bundle and report how many the resulting process served, to
    /// demonstrate subprocess reuse without the provenance cache in the
    /// way.
    PoolStats {
        /// Bundle reference to spawn a warm process for.
        #[arg(long, default_value = "local://dev")]
        bundle: String,

        /// Entrypoint to call on each iteration.
        #[arg(long)]
        entrypoint: String,

        /// Repeated `name=value` parameter flags.
        #[arg(long = "param")]
        params: Vec<String>,

        /// Base seed; iteration `i` uses `seed + i`.
        #[arg(long, default_value_t = 0)]
        seed: i64,

        /// Number of `execute` calls to issue.
        #[arg(long, default_value_t = 5)]
        calls: usize,
    },

    /// Print a JSON schema to stdout.
    Schema {
        /// Which schema to print.
        #[arg(value_enum)]
        kind: SchemaArg,
    },
}

/// Schema kind argument for the `schema` subcommand.
#[derive(Debug, Clone, ValueEnum)]
enum SchemaArg {
    /// `SimTask` schema.
    SimTask,
    /// `SimReturn` schema.
    SimReturn,
    /// `AggregationTask` schema.
    AggregationTask,
    /// `AggregationReturn` schema.
    AggregationReturn,
    /// `JobState` schema.
    JobState,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("sx=debug,sx_host=debug,sx_protocol=debug")
    } else {
        EnvFilter::new("sx=info,sx_host=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = match cli.command {
        Commands::Run { bundle, entrypoint, params, seed, outputs, out } => {
            cmd_run(bundle, entrypoint, params, seed, outputs, out).await
        }
        Commands::Aggregate { bundle, target, sim_returns, target_data, out } => {
            cmd_aggregate(bundle, target, sim_returns, target_data, out).await
        }
        Commands::PoolStats { bundle, entrypoint, params, seed, calls } => {
            cmd_pool_stats(bundle, entrypoint, params, seed, calls).await
        }
        Commands::Schema { kind } => cmd_schema(kind),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(EXIT_RUNTIME_ERROR);
    }
}

fn emit(body: String, out: Option<PathBuf>) -> Result<()> {
    match out {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("create directory '{}'", parent.display()))?;
                }
            }
            std::fs::write(&path, body).with_context(|| format!("write '{}'", path.display()))?;
        }
        None => println!("{body}"),
    }
    Ok(())
}

async fn cmd_run(
    bundle: String,
    entrypoint: String,
    params: Vec<String>,
    seed: i64,
    outputs: Vec<String>,
    out: Option<PathBuf>,
) -> Result<()> {
    let config = HostConfig::from_env();
    let task = commands::build_task(&bundle, &entrypoint, &params, seed, &outputs)?;
    let body = commands::run_task(&config, &task).await?;
    emit(body, out)
}

async fn cmd_aggregate(
    bundle: String,
    target: String,
    sim_return_paths: Vec<PathBuf>,
    target_data: Option<PathBuf>,
    out: Option<PathBuf>,
) -> Result<()> {
    let config = HostConfig::from_env();
    let sim_returns = sim_return_paths
        .iter()
        .map(|p| commands::load_sim_return(p))
        .collect::<Result<Vec<_>>>()?;
    let target_data = target_data
        .map(|p| -> Result<serde_json::Value> {
            let content = std::fs::read_to_string(&p).with_context(|| format!("read '{}'", p.display()))?;
            serde_json::from_str(&content).with_context(|| format!("parse '{}' as JSON", p.display()))
        })
        .transpose()?;
    let body = commands::run_aggregation(&config, &bundle, &target, sim_returns, target_data).await?;
    emit(body, out)
}

async fn cmd_pool_stats(
    bundle: String,
    entrypoint: String,
    params: Vec<String>,
    seed: i64,
    calls: usize,
) -> Result<()> {
    let config = HostConfig::from_env();
    let task = commands::build_task(&bundle, &entrypoint, &params, seed, &[])?;
    let stats = commands::pool_stats(&config, &task, calls).await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn cmd_schema(kind: SchemaArg) -> Result<()> {
    let sk = match kind {
        SchemaArg::SimTask => SchemaKind::SimTask,
        SchemaArg::SimReturn => SchemaKind::SimReturn,
        SchemaArg::AggregationTask => SchemaKind::AggregationTask,
        SchemaArg::AggregationReturn => SchemaKind::AggregationReturn,
        SchemaArg::JobState => SchemaKind::JobState,
    };
    let json = commands::schema_json(sk)?;
    println!("{json}");
    Ok(())
}
