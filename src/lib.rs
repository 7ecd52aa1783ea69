// src/lib.rs

pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod plan;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use crate::checkpoint::{BatchOutcome, CheckpointStore};
use crate::cli::{CheckpointCommand, CliArgs, Command};
use crate::config::{load_and_validate, load_or_default};
use crate::dag::DependencyResolver;
use crate::plan::decode_plan;

/// High-level entry point used by `main.rs`.
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);

    match args.command {
        Command::Batches => {
            let cfg = load_and_validate(&config_path)
                .with_context(|| format!("loading {}", config_path.display()))?;
            print_batches(&cfg.to_tasks())
        }
        Command::Checkpoints { action } => {
            let cfg = load_or_default(&config_path)
                .with_context(|| format!("loading {}", config_path.display()))?;
            let store = CheckpointStore::new(&cfg.checkpoints.root);
            store.initialize().await?;
            run_checkpoint_command(&store, action, &cfg.checkpoints).await
        }
        Command::Plan { file } => {
            let json = std::fs::read_to_string(&file).with_context(|| format!("reading plan {file}"))?;
            let plan = decode_plan(&json).with_context(|| format!("decoding plan {file}"))?;
            let summary = plan.summary();
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
    }
}

/// Dry-run output: one line per batch.
fn print_batches(tasks: &[dag::Task]) -> Result<()> {
    if tasks.is_empty() {
        println!("no tasks configured");
        return Ok(());
    }

    let resolution = DependencyResolver::new().resolve(tasks)?;
    println!("phasedag batches ({} tasks)", tasks.len());
    for (level, batch) in resolution.batches.iter().enumerate() {
        println!("  batch {level}: {}", batch.join(", "));
    }

    debug!("batch listing complete (no execution)");
    Ok(())
}

async fn run_checkpoint_command(
    store: &CheckpointStore,
    action: CheckpointCommand,
    settings: &config::CheckpointSection,
) -> Result<()> {
    match action {
        CheckpointCommand::List => {
            for info in store.list_info().await? {
                println!(
                    "{}  {}  {:>8}B{}  {}",
                    info.id,
                    info.timestamp.to_rfc3339(),
                    info.size,
                    if info.compressed { " gz" } else { "   " },
                    info.description
                );
            }
        }
        CheckpointCommand::Stats => {
            let stats = store.get_stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        CheckpointCommand::Prune { older_than_days } => {
            let cutoff = Utc::now() - Duration::days(i64::from(older_than_days));
            let outcome = store.prune_older_than(cutoff).await?;
            report_outcome("pruned", &outcome);
        }
        CheckpointCommand::Compress { id } => {
            if store.compress(&id).await? {
                println!("compressed {id}");
            } else {
                println!("{id} was already compressed");
            }
        }
        CheckpointCommand::Rebuild => {
            let count = store.rebuild_index_from_disk().await?;
            println!("index rebuilt with {count} checkpoint(s)");
        }
        CheckpointCommand::Retain => {
            let report = store.apply_retention(Utc::now(), &settings.retention()).await?;
            report_outcome("pruned", &report.pruned);
            report_outcome("trimmed", &report.trimmed);
            report_outcome("compressed", &report.compressed);
        }
    }
    Ok(())
}

fn report_outcome(action: &str, outcome: &BatchOutcome) {
    println!("{action} {} checkpoint(s)", outcome.succeeded);
    if let Some(warning) = outcome.warning() {
        warn!("{warning}");
    } else {
        info!(action, count = outcome.succeeded, "checkpoint maintenance done");
    }
}
