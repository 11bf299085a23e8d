//! Quizsync CLI
//!
//! Drives the sync engine over file-backed stores, so several simulated
//! devices can share one remote record.
//!
//! # Commands
//!
//! - `status` - Show local counts, remote metadata, and the cursor
//! - `init` - Run the sign-in check (backup, restore, pull, or report a conflict)
//! - `push-seen` / `push-mistake` - Record progress and push it
//! - `pull` - Pull changes since the cursor
//! - `backup` / `restore` / `restore-mistakes` - Full sync
//! - `resolve` - Settle a conflict
//! - `clear-remote` - Delete all remote progress
//! - `repair` - Recount remote collections and rewrite metadata

mod commands;

use clap::{ArgGroup, Parser, Subcommand};
use commands::Context;
use quizsync_engine::ConflictStrategy;
use quizsync_model::QuestionIdType;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Quiz progress sync tools.
#[derive(Parser)]
#[command(name = "quizsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to this device's local store
    #[arg(global = true, long, env = "QUIZSYNC_LOCAL", default_value = "quizsync-local.json")]
    local: PathBuf,

    /// Path to the shared remote store
    #[arg(global = true, long, env = "QUIZSYNC_REMOTE", default_value = "quizsync-remote.json")]
    remote: PathBuf,

    /// Path to a JSON question catalog used to rehydrate mistakes
    #[arg(global = true, long, env = "QUIZSYNC_CATALOG")]
    catalog: Option<PathBuf>,

    /// Sign this user in before running the command
    #[arg(global = true, short, long, env = "QUIZSYNC_USER")]
    user: Option<String>,

    /// Device ID (generated and remembered when omitted)
    #[arg(global = true, long, env = "QUIZSYNC_DEVICE")]
    device: Option<String>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show local counts, remote metadata, and the cursor
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Decide what to do at sign-in
    Init,

    /// Record a seen question and push it
    PushSeen {
        /// Question ID
        question_id: String,
    },

    /// Record a mistake and push it
    #[command(group(ArgGroup::new("answer").required(true).args(["choice", "input"])))]
    PushMistake {
        /// Question ID
        question_id: String,

        /// ID namespace (external, ibn)
        #[arg(long, default_value = "external", value_parser = parse_id_type)]
        id_type: QuestionIdType,

        /// Selected option of a multiple-choice question
        #[arg(long)]
        choice: Option<String>,

        /// Typed answer of a student-produced response
        #[arg(long)]
        input: Option<String>,
    },

    /// Pull changes since the last sync
    Pull,

    /// Overwrite remote progress with local progress
    Backup,

    /// Overwrite local progress with remote progress
    Restore {
        /// Restore mistakes later with `restore-mistakes`
        #[arg(long)]
        defer_mistakes: bool,
    },

    /// Restore mistakes after `restore --defer-mistakes`
    RestoreMistakes,

    /// Settle a conflict (keep-local, use-cloud, merge)
    Resolve {
        /// Resolution strategy
        strategy: ConflictStrategy,

        /// Show the merge plan without applying it
        #[arg(long)]
        dry_run: bool,
    },

    /// Delete all remote progress
    ClearRemote {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Recount remote collections and rewrite metadata
    Repair,

    /// Show version information
    Version,
}

fn parse_id_type(value: &str) -> Result<QuestionIdType, String> {
    match value {
        "external" => Ok(QuestionIdType::External),
        "ibn" => Ok(QuestionIdType::Ibn),
        other => Err(format!("unknown id type '{other}' (expected external or ibn)")),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Version = cli.command {
        println!("quizsync CLI v{}", env!("CARGO_PKG_VERSION"));
        println!("metadata schema v{}", quizsync_model::SYNC_METADATA_VERSION);
        return Ok(());
    }

    let ctx = Context::open(
        &cli.local,
        &cli.remote,
        cli.catalog.as_deref(),
        cli.user.as_deref(),
        cli.device.as_deref(),
    )?;

    match cli.command {
        Commands::Status { format } => commands::status::run(&ctx, &format).await?,
        Commands::Init => commands::sync::init(&ctx).await?,
        Commands::PushSeen { question_id } => commands::sync::push_seen(&ctx, &question_id).await?,
        Commands::PushMistake {
            question_id,
            id_type,
            choice,
            input,
        } => commands::sync::push_mistake(&ctx, &question_id, id_type, choice, input).await?,
        Commands::Pull => commands::sync::pull(&ctx).await?,
        Commands::Backup => commands::full::backup(&ctx).await?,
        Commands::Restore { defer_mistakes } => {
            commands::full::restore(&ctx, defer_mistakes).await?
        }
        Commands::RestoreMistakes => commands::full::restore_mistakes(&ctx).await?,
        Commands::Resolve { strategy, dry_run } => {
            commands::full::resolve(&ctx, strategy, dry_run).await?
        }
        Commands::ClearRemote { yes } => {
            if !yes {
                return Err("Refusing to delete remote progress without --yes".into());
            }
            commands::full::clear_remote(&ctx).await?
        }
        Commands::Repair => commands::full::repair(&ctx).await?,
        Commands::Version => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_push_mistake() {
        let cli = Cli::try_parse_from([
            "quizsync",
            "push-mistake",
            "Q1",
            "--id-type",
            "ibn",
            "--input",
            "12",
        ])
        .unwrap();
        match cli.command {
            Commands::PushMistake {
                question_id,
                id_type,
                input,
                choice,
            } => {
                assert_eq!(question_id, "Q1");
                assert_eq!(id_type, QuestionIdType::Ibn);
                assert_eq!(input.as_deref(), Some("12"));
                assert!(choice.is_none());
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn push_mistake_needs_an_answer() {
        assert!(Cli::try_parse_from(["quizsync", "push-mistake", "Q1"]).is_err());
    }

    #[test]
    fn parses_resolve_strategy() {
        let cli = Cli::try_parse_from(["quizsync", "resolve", "use-cloud"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Resolve {
                strategy: ConflictStrategy::UseCloud,
                dry_run: false
            }
        ));
        assert!(Cli::try_parse_from(["quizsync", "resolve", "both"]).is_err());
    }
}
