//! Status command implementation.

use super::Context;
use chrono::{DateTime, Utc};
use quizsync_engine::RestoreState;
use serde::Serialize;

/// Status as printed by the CLI.
#[derive(Debug, Serialize)]
pub struct StatusView {
    /// Device ID.
    pub device_id: String,
    /// Signed-in user.
    pub user_id: Option<String>,
    /// Seen questions stored locally.
    pub local_seen: usize,
    /// Mistakes stored locally.
    pub local_mistakes: usize,
    /// Local pull cursor.
    pub last_sync: Option<DateTime<Utc>>,
    /// Remote seen-question count from metadata.
    pub remote_seen: Option<u64>,
    /// Remote mistake count from metadata.
    pub remote_mistakes: Option<u64>,
    /// Why remote metadata is unavailable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_error: Option<String>,
    /// Restore progress message, if restoring.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restoring: Option<String>,
    /// Why the last restore failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restore_error: Option<String>,
}

/// Runs the status command.
pub async fn run(ctx: &Context, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let status = ctx.engine.status().await?;
    let (restoring, restore_error) = match status.restore {
        RestoreState::Idle => (None, None),
        RestoreState::Restoring { message } => (Some(message), None),
        RestoreState::Failed { message } => (None, Some(message)),
    };
    let view = StatusView {
        device_id: ctx.engine.config().device_id.clone(),
        user_id: status.user_id,
        local_seen: status.local_seen,
        local_mistakes: status.local_mistakes,
        last_sync: status.last_sync,
        remote_seen: status.remote.as_ref().map(|m| m.seen_questions_count),
        remote_mistakes: status.remote.as_ref().map(|m| m.mistakes_count),
        remote_error: status.remote_error,
        restoring,
        restore_error,
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        _ => {
            print_text_output(&view);
        }
    }

    Ok(())
}

fn print_text_output(view: &StatusView) {
    println!("Device:          {}", view.device_id);
    println!(
        "User:            {}",
        view.user_id.as_deref().unwrap_or("(signed out)")
    );
    println!("Local seen:      {}", view.local_seen);
    println!("Local mistakes:  {}", view.local_mistakes);
    match view.last_sync {
        Some(at) => println!("Last sync:       {}", at.to_rfc3339()),
        None => println!("Last sync:       never"),
    }
    match (view.remote_seen, view.remote_mistakes) {
        (Some(seen), Some(mistakes)) => {
            println!("Remote seen:     {seen}");
            println!("Remote mistakes: {mistakes}");
        }
        _ => match &view.remote_error {
            Some(err) => println!("Remote:          unavailable ({err})"),
            None => println!("Remote:          no metadata"),
        },
    }
    if let Some(message) = &view.restoring {
        println!("Restore:         {message}");
    }
    if let Some(err) = &view.restore_error {
        println!("Restore:         failed ({err})");
    }
}
