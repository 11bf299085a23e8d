//! Incremental sync commands.

use super::Context;
use chrono::Utc;
use quizsync_engine::{InitialSyncOutcome, QuestionLookup, SyncOutcome};
use quizsync_model::{Mistake, MistakeEntry, QuestionIdType};
use quizsync_store::LocalStore;
use tracing::warn;

/// Runs the sign-in check.
pub async fn init(ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
    match ctx.engine.check_initial_sync().await? {
        InitialSyncOutcome::NothingToSync => println!("Nothing to sync"),
        InitialSyncOutcome::BackedUp(report) => {
            println!("✓ Backed up local progress");
            println!("  Seen questions: {}", report.seen_questions);
            println!("  Mistakes: {}", report.mistakes);
        }
        InitialSyncOutcome::Restored(report) => {
            println!("✓ Restored cloud progress");
            println!("  Seen questions: {}", report.seen_questions);
            println!("  Mistakes: {}", report.mistakes_restored);
            if report.mistakes_skipped > 0 {
                println!("  Skipped mistakes: {}", report.mistakes_skipped);
            }
        }
        InitialSyncOutcome::Pulled(report) => {
            println!("✓ Pulled changes");
            println!("  New seen questions: {}", report.seen_added);
            println!("  New mistakes: {}", report.mistakes_added);
        }
        InitialSyncOutcome::ConflictDetected(summary) => {
            println!("! Local and cloud progress differ");
            println!(
                "  Local: {} seen, {} mistakes",
                summary.local_seen, summary.local_mistakes
            );
            println!(
                "  Cloud: {} seen, {} mistakes",
                summary.remote_seen, summary.remote_mistakes
            );
            println!("  Run `quizsync resolve <keep-local|use-cloud|merge>`");
        }
    }
    Ok(())
}

/// Records a seen question locally and pushes it.
pub async fn push_seen(ctx: &Context, question_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    ctx.engine
        .local()
        .add_seen_questions(&[question_id.to_string()])?;
    let outcome = ctx.engine.sync_seen_question(question_id).await;
    report_push(question_id, outcome)
}

/// Records a mistake locally and pushes it.
///
/// The local copy needs question content; without it only the push happens.
pub async fn push_mistake(
    ctx: &Context,
    question_id: &str,
    id_type: QuestionIdType,
    choice: Option<String>,
    input: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let now = Utc::now();
    let entry = match (choice, input) {
        (Some(choice), _) => MistakeEntry::choice(question_id, id_type, choice, now),
        (None, Some(input)) => MistakeEntry::input(question_id, id_type, input, now),
        (None, None) => return Err("A mistake needs --choice or --input".into()),
    }
    .with_device(ctx.engine.config().device_id.as_str());

    match ctx.catalog.resolve(question_id, id_type).await {
        Ok(content) => {
            ctx.engine
                .local()
                .upsert_mistakes(vec![Mistake::new(entry.clone(), content)])?;
        }
        Err(e) => warn!(question_id, error = %e, "not stored locally"),
    }
    let outcome = ctx.engine.sync_mistake(&entry).await;
    report_push(question_id, outcome)
}

/// Pulls changes since the last sync.
pub async fn pull(ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
    let report = ctx.engine.pull_changes().await?;
    println!("✓ Pulled changes");
    println!("  New seen questions: {}", report.seen_added);
    println!("  New mistakes: {}", report.mistakes_added);
    if report.mistakes_skipped > 0 {
        println!("  Skipped mistakes: {}", report.mistakes_skipped);
    }
    if report.settings_applied {
        println!("  Settings updated");
    }
    if report.filters_applied {
        println!("  Filters updated");
    }
    println!("  Cursor: {}", report.cursor.to_rfc3339());
    Ok(())
}

/// Prints a push outcome. Expected failures are reported, not returned,
/// since the progress is already recorded locally.
fn report_push(
    question_id: &str,
    outcome: quizsync_engine::SyncResult<SyncOutcome>,
) -> Result<(), Box<dyn std::error::Error>> {
    match outcome {
        Ok(SyncOutcome::Synced) => println!("✓ Pushed {question_id}"),
        Ok(SyncOutcome::ConflictDetected) => {
            println!("! Cloud has a newer record for {question_id}; kept it")
        }
        Err(e) if e.is_expected() => println!("✗ Not pushed ({e}); recorded locally"),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}
