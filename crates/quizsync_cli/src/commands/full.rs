//! Full sync, conflict resolution, and maintenance commands.

use super::Context;
use quizsync_engine::{ConflictStrategy, Resolution};

/// Overwrites remote progress with local progress.
pub async fn backup(ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
    let report = ctx.engine.backup_to_cloud().await?;
    println!("✓ Backup complete");
    println!("  Seen questions: {}", report.seen_questions);
    println!("  Mistakes: {}", report.mistakes);
    println!("  Commits: {}", report.commits);
    Ok(())
}

/// Overwrites local progress with remote progress.
pub async fn restore(ctx: &Context, defer_mistakes: bool) -> Result<(), Box<dyn std::error::Error>> {
    let report = if defer_mistakes {
        ctx.engine.restore_without_mistakes().await?
    } else {
        ctx.engine.restore_from_cloud().await?
    };
    println!("✓ Restore complete");
    println!("  Seen questions: {}", report.seen_questions);
    if report.mistakes_deferred {
        println!("  Mistakes: deferred (run `quizsync restore-mistakes`)");
    } else {
        println!("  Mistakes: {}", report.mistakes_restored);
    }
    if report.mistakes_skipped > 0 {
        println!("  Skipped mistakes: {}", report.mistakes_skipped);
    }
    Ok(())
}

/// Restores mistakes after a deferred restore.
pub async fn restore_mistakes(ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
    let report = ctx.engine.restore_mistakes_only().await?;
    println!("✓ Mistakes restored: {}", report.mistakes_restored);
    if report.mistakes_skipped > 0 {
        println!("  Skipped mistakes: {}", report.mistakes_skipped);
    }
    Ok(())
}

/// Settles a conflict with `strategy`.
pub async fn resolve(
    ctx: &Context,
    strategy: ConflictStrategy,
    dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if dry_run {
        let plan = ctx.engine.merge_plan().await?;
        println!("Merge plan:");
        println!("  Seen questions to pull: {}", plan.unique_cloud_seen.len());
        println!("  Seen questions to push: {}", plan.unique_local_seen.len());
        println!("  Mistakes to pull: {}", plan.unique_cloud_mistakes.len());
        println!("  Mistakes to push: {}", plan.unique_local_mistakes.len());
        if !plan.legacy_skipped.is_empty() {
            println!("  Legacy mistakes skipped: {}", plan.legacy_skipped.len());
        }
        return Ok(());
    }

    match ctx.engine.resolve_conflict(strategy).await? {
        Resolution::KeptLocal(report) => {
            println!("✓ Kept local progress");
            println!(
                "  Uploaded {} seen, {} mistakes",
                report.seen_questions, report.mistakes
            );
        }
        Resolution::UsedCloud(report) => {
            println!("✓ Used cloud progress");
            println!(
                "  Restored {} seen, {} mistakes",
                report.seen_questions, report.mistakes_restored
            );
        }
        Resolution::Merged(report) => {
            println!("✓ Merged progress");
            println!(
                "  Pulled {} seen, {} mistakes",
                report.seen_added_locally, report.mistakes_added_locally
            );
            println!(
                "  Pushed {} seen, {} mistakes",
                report.seen_pushed, report.mistakes_pushed
            );
            if report.mistakes_skipped > 0 {
                println!("  Skipped mistakes: {}", report.mistakes_skipped);
            }
        }
    }
    Ok(())
}

/// Deletes all remote progress.
pub async fn clear_remote(ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
    let report = ctx.engine.clear_all().await?;
    println!("✓ Remote progress cleared");
    println!("  Seen questions deleted: {}", report.seen_questions);
    println!("  Mistakes deleted: {}", report.mistakes);
    println!("  Preference documents deleted: {}", report.preferences);
    Ok(())
}

/// Recounts remote collections and rewrites metadata.
pub async fn repair(ctx: &Context) -> Result<(), Box<dyn std::error::Error>> {
    let metadata = ctx.engine.reconcile_metadata().await?;
    println!("✓ Metadata rewritten");
    println!("  Seen questions: {}", metadata.seen_questions_count);
    println!("  Mistakes: {}", metadata.mistakes_count);
    Ok(())
}
