//! git-checkpoint - checkpoint and restore working trees per unit of work

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

use gitcheckpoint::ops::{cleanup, create, create_automatic, delete, get, list, restore};
use gitcheckpoint::store::GitStore;
use gitcheckpoint::types::{CheckpointKind, RestoreOptions, RestoreResult, StatusTransition};
use gitcheckpoint::{with_lock, Repo};

#[derive(Parser)]
#[command(name = "git-checkpoint")]
#[command(about = "named snapshots of a git working tree, grouped by unit of work")]
#[command(version)]
struct Cli {
    /// repository path
    #[arg(short, long, default_value = ".", global = true)]
    repo: PathBuf,

    /// print results as json
    #[arg(long, global = true)]
    json: bool,

    /// more logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// snapshot the working tree
    Create {
        /// unit of work id
        unit: String,

        /// checkpoint name
        name: String,
    },

    /// snapshot on a status transition, named <unit>-auto-<previous-status>
    Auto {
        /// unit of work id
        unit: String,

        /// status the unit is leaving
        previous_status: String,
    },

    /// list checkpoints of a unit, newest first
    List {
        /// unit of work id
        unit: String,
    },

    /// show one checkpoint and its files
    Show {
        /// unit of work id
        unit: String,

        /// checkpoint name
        name: String,
    },

    /// restore a checkpoint into the working tree
    Restore {
        /// unit of work id
        unit: String,

        /// checkpoint name
        name: String,

        /// overwrite conflicting files and ignore unrelated changes
        #[arg(short, long)]
        force: bool,
    },

    /// delete all but the newest checkpoints of a unit
    Cleanup {
        /// unit of work id
        unit: String,

        /// how many to keep (defaults to keep_last from checkpoint.toml)
        #[arg(short, long)]
        keep_last: Option<usize>,
    },

    /// delete one checkpoint
    Delete {
        /// unit of work id
        unit: String,

        /// checkpoint name
        name: String,
    },

    /// print the effective configuration
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("gitcheckpoint={level},git_checkpoint={level}")));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn run(cli: Cli) -> gitcheckpoint::Result<ExitCode> {
    let repo = Repo::open(&cli.repo)?;
    let store = GitStore::new(&repo);
    let config = repo.config();

    match cli.command {
        Commands::Create { unit, name } => {
            let checkpoint = with_lock(&repo, || {
                create(&store, config, &unit, &name, CheckpointKind::Manual)
            })?;
            if cli.json {
                print_json(&checkpoint)?;
            } else {
                println!(
                    "created {} ({} files) {}",
                    checkpoint.name(),
                    checkpoint.captured_files.len(),
                    checkpoint.commit().short()
                );
            }
        }

        Commands::Auto {
            unit,
            previous_status,
        } => {
            let event = StatusTransition::new(unit, previous_status);
            let checkpoint = with_lock(&repo, || create_automatic(&store, config, &event))?;
            if cli.json {
                print_json(&checkpoint)?;
            } else {
                println!(
                    "created {} ({} files) {}",
                    checkpoint.name(),
                    checkpoint.captured_files.len(),
                    checkpoint.commit().short()
                );
            }
        }

        Commands::List { unit } => {
            let checkpoints = list(&store, config, &unit)?;
            if cli.json {
                print_json(&checkpoints)?;
            } else if checkpoints.is_empty() {
                println!("no checkpoints for {}", unit);
            } else {
                for checkpoint in &checkpoints {
                    println!(
                        "{} {}  {}  {}",
                        kind_icon(checkpoint.kind),
                        checkpoint.commit.short(),
                        format_millis(checkpoint.created_at),
                        checkpoint.name
                    );
                }
            }
        }

        Commands::Show { unit, name } => match get(&store, config, &unit, &name)? {
            Some(checkpoint) => {
                if cli.json {
                    print_json(&checkpoint)?;
                } else {
                    println!("name    {}", checkpoint.name());
                    println!("kind    {}", checkpoint.kind());
                    println!("commit  {}", checkpoint.commit());
                    println!("ref     {}", checkpoint.ref_path());
                    println!("created {}", format_millis(checkpoint.summary.created_at));
                    println!();
                    for path in &checkpoint.captured_files {
                        println!("  {}", path);
                    }
                }
            }
            None => {
                eprintln!("checkpoint {} not found for {}", name, unit);
                return Ok(ExitCode::FAILURE);
            }
        },

        Commands::Restore { unit, name, force } => {
            let options = RestoreOptions { force };
            let result = with_lock(&repo, || restore(&store, config, &unit, &name, options))?;
            if cli.json {
                print_json(&result)?;
            } else {
                print_restore(&unit, &name, &result);
            }
            if !result.success {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Cleanup { unit, keep_last } => {
            let keep = keep_last.unwrap_or(config.keep_last);
            let report = with_lock(&repo, || cleanup(&store, config, &unit, keep))?;
            if cli.json {
                print_json(&report)?;
            } else {
                for name in &report.deleted {
                    println!("deleted {}", name);
                }
                println!(
                    "kept {}, deleted {}",
                    report.preserved.len(),
                    report.deleted.len()
                );
            }
        }

        Commands::Delete { unit, name } => {
            if with_lock(&repo, || delete(&store, config, &unit, &name))? {
                println!("deleted {}", name);
            } else {
                eprintln!("checkpoint {} not found for {}", name, unit);
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Config => {
            if cli.json {
                print_json(config)?;
            } else {
                print!("{}", toml::to_string_pretty(config)?);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_restore(unit: &str, name: &str, result: &RestoreResult) {
    if result.not_found {
        eprintln!("checkpoint {} not found for {}", name, unit);
        return;
    }

    if result.requires_user_choice {
        println!("working tree has changes outside the checkpoint:");
        for path in &result.dirty_files {
            println!("  {}", path);
        }
        println!();
        println!("options:");
        for choice in &result.options {
            println!("  {:<18} [{:?}] {}", choice.name, choice.risk_level, choice.description);
        }
        println!();
        println!("re-run with --force to restore anyway");
        return;
    }

    for path in &result.restored_files {
        println!("restored   {}", path);
    }
    for path in &result.conflicted_files {
        let note = if result.not_restored.contains(path) {
            "kept local changes"
        } else {
            "overwritten"
        };
        println!("conflict   {} ({})", path, note);
    }
    for failure in &result.failed_files {
        println!("failed     {}: {}", failure.path, failure.error);
    }
    println!(
        "{} restored, {} unchanged, {} conflicts, {} failed",
        result.restored_files.len(),
        result.unchanged_files.len(),
        result.conflicted_files.len(),
        result.failed_files.len()
    );
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> gitcheckpoint::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn kind_icon(kind: CheckpointKind) -> &'static str {
    match kind {
        CheckpointKind::Manual => "●",
        CheckpointKind::Automatic => "○",
    }
}

/// utc timestamp, raw milliseconds if it cannot be formatted
fn format_millis(millis: u64) -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let formatted = OffsetDateTime::from_unix_timestamp_nanos(millis as i128 * 1_000_000)
        .ok()
        .and_then(|stamp| stamp.format(format).ok());
    match formatted {
        Some(stamp) => format!("{} UTC", stamp),
        None => millis.to_string(),
    }
}
