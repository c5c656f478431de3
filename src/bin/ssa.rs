//! ssa - server-side apply reconciliation CLI
//!
//! Diffs, applies and deletes manifests against a cluster snapshot kept in a
//! multi-document YAML file.
//!
//! Usage:
//!   ssa --state cluster.yaml diff -f manifests.yaml
//!   ssa --state cluster.yaml apply -f manifests.yaml --staged --prune
//!   ssa --state cluster.yaml delete -f manifests.yaml
//!
//! Logging is controlled with `RUST_LOG` and goes to stderr.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use ssa_engine::fieldpath::ManagedFields;
use ssa_engine::resource::set_native_kinds_defaults;
use ssa_engine::value::{self, Value};
use ssa_engine::{BatchError, ChangeSet, Config, Context, InMemoryCluster, ResourceManager};

/// Server-side apply reconciliation against a cluster snapshot
#[derive(Parser, Debug)]
#[command(name = "ssa", version)]
#[command(about = "Diff, apply and delete manifests with server-side apply")]
struct Cli {
    /// Cluster snapshot (multi-document YAML); written back after apply and delete
    #[arg(long, short = 's', global = true)]
    state: Option<PathBuf>,

    /// Engine configuration file (YAML)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Field manager name, overriding the configuration
    #[arg(long, global = true)]
    field_manager: Option<String>,

    /// Take ownership of fields other managers own
    #[arg(long, global = true)]
    force: bool,

    /// Give up after this many seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show what applying the manifests would change
    Diff {
        #[arg(long, short = 'f')]
        file: PathBuf,
    },
    /// Apply the manifests
    Apply {
        #[arg(long, short = 'f')]
        file: PathBuf,

        /// Apply namespaces and definitions first and wait for them
        #[arg(long)]
        staged: bool,

        /// Delete objects applied earlier by this field manager that the
        /// manifests no longer contain
        #[arg(long)]
        prune: bool,
    },
    /// Delete the objects named by the manifests
    Delete {
        #[arg(long, short = 'f')]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => Config::from_yaml(&read(path)?)?,
        None => Config::default(),
    };
    if let Some(manager) = cli.field_manager {
        config.apply.field_manager = manager;
    }
    config.apply.force |= cli.force;

    let objects = match &cli.state {
        Some(path) if path.exists() => value::from_yaml_documents(&read(path)?)?,
        _ => Vec::new(),
    };
    let cluster = Arc::new(InMemoryCluster::from_objects(objects)?.with_schema(config.schema()));
    let manager = ResourceManager::new(cluster.clone())
        .with_schema(config.schema())
        .with_masker(config.masking.clone());

    let ctx = match cli.timeout {
        Some(secs) => Context::background().with_timeout(Duration::from_secs(secs)),
        None => Context::background(),
    };

    let mut output = io::stdout();
    match cli.command {
        Command::Diff { file } => {
            let manifests = load_manifests(&file)?;
            for object in &manifests {
                let outcome = manager.diff(&ctx, object, &config.apply).await?;
                writeln!(output, "{}", outcome.entry)?;
                if let Some(patch) = &outcome.entry.patch {
                    for line in patch.lines() {
                        writeln!(output, "    {}", line)?;
                    }
                }
            }
            return Ok(());
        }
        Command::Apply { file, staged, prune } => {
            let manifests = load_manifests(&file)?;
            let previous = cluster.snapshot().await;

            let result = if staged {
                manager.apply_all_staged(&ctx, &manifests, &config.apply).await
            } else {
                manager.apply_all(&ctx, &manifests, &config.apply).await
            };
            let mut failed = report(&mut output, result)?;

            if prune && failed.is_none() {
                let applied: Vec<Value> = previous
                    .into_iter()
                    .filter(|object| applied_by(object, &config.apply.field_manager))
                    .collect();
                let result = manager
                    .delete_stale(&ctx, &applied, &manifests, &config.delete)
                    .await;
                failed = report(&mut output, result)?;
            }

            save(cli.state.as_deref(), &cluster).await?;
            if let Some(err) = failed {
                return Err(err.into());
            }
        }
        Command::Delete { file } => {
            let manifests = load_manifests(&file)?;
            let result = manager.delete_all(&ctx, &manifests, &config.delete).await;
            let failed = report(&mut output, result)?;

            save(cli.state.as_deref(), &cluster).await?;
            if let Some(err) = failed {
                return Err(err.into());
            }
        }
    }

    Ok(())
}

fn read(path: &Path) -> Result<String, Box<dyn std::error::Error>> {
    Ok(fs::read_to_string(path).map_err(|e| format!("Failed to read file {:?}: {}", path, e))?)
}

fn load_manifests(path: &Path) -> Result<Vec<Value>, Box<dyn std::error::Error>> {
    let mut objects = value::from_yaml_documents(&read(path)?)?;
    set_native_kinds_defaults(&mut objects);
    Ok(objects)
}

/// Prints the change set of a batch, including the partial one of a failed
/// batch, and hands the failure back.
fn report(
    output: &mut dyn Write,
    result: Result<ChangeSet, BatchError>,
) -> Result<Option<BatchError>, Box<dyn std::error::Error>> {
    let (changeset, failed) = match result {
        Ok(changeset) => (changeset, None),
        Err(err) => (err.changeset.clone(), Some(err)),
    };
    if !changeset.is_empty() {
        writeln!(output, "{}", changeset)?;
    }
    Ok(failed)
}

fn applied_by(object: &Value, field_manager: &str) -> bool {
    ManagedFields::from_object(object)
        .map(|managers| managers.get(field_manager).is_some_and(|vs| vs.applied()))
        .unwrap_or(false)
}

async fn save(
    path: Option<&Path>,
    cluster: &InMemoryCluster,
) -> Result<(), Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(());
    };
    let documents = cluster
        .snapshot()
        .await
        .iter()
        .map(value::to_yaml)
        .collect::<Result<Vec<_>, _>>()?;
    fs::write(path, documents.join("---\n"))
        .map_err(|e| format!("Failed to write file {:?}: {}", path, e))?;
    Ok(())
}
