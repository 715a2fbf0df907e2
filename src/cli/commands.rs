//! CLI command implementations.

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::Settings;
use crate::engine::{drain, MessageQueue};
use crate::repository::run_migrations;
use crate::server::AppState;
use crate::tasks::TaskFamily;

/// Initialize the database and run migrations.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    run_migrations(&settings.database_url).await?;
    println!(
        "{} Initialized database at {}",
        style("✓").green(),
        settings.database_url
    );
    Ok(())
}

/// Start the web trigger server.
pub async fn cmd_serve(settings: Settings) -> anyhow::Result<()> {
    println!("{} Running database migrations...", style("→").cyan());
    run_migrations(&settings.database_url).await?;

    println!(
        "{} Starting trigger server at http://{}",
        style("→").cyan(),
        settings.bind_addr
    );
    println!("  Press Ctrl+C to stop");

    crate::server::serve(settings).await
}

/// Fan a family's work domain out into its queue.
pub async fn cmd_enqueue(settings: &Settings, family: &str) -> anyhow::Result<()> {
    let family: TaskFamily = family.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let state = AppState::new(settings.clone());

    let progress_id = if family.tracks_progress() {
        let total = state.work_repo.count_active_trackers().await? as i32;
        let progress = state.progress_repo.create(total).await?;
        println!(
            "{} Progress record {} created for {} trackers",
            style("→").cyan(),
            progress.id,
            total
        );
        Some(progress.id)
    } else {
        None
    };

    let extra = progress_id.map(|id| {
        let mut map = serde_json::Map::new();
        map.insert("progress_id".into(), serde_json::json!(id));
        map
    });

    let producer = state.producer_for(family);
    let enqueued = producer
        .enumerate_and_enqueue_with(settings.queue.page_size, extra.as_ref())
        .await?;

    // Reconcile the run's total to what actually enqueued
    if let Some(id) = progress_id {
        state.progress_repo.set_total(id, enqueued as i32).await?;
    }

    println!(
        "{} Enqueued {} {} task(s)",
        style("✓").green(),
        enqueued,
        family
    );
    Ok(())
}

/// Drain a family's queue until empty.
pub async fn cmd_drain(settings: &Settings, family: &str) -> anyhow::Result<()> {
    let family: TaskFamily = family.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let state = AppState::new(settings.clone());
    let dispatcher = state.dispatcher_for(family)?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
    spinner.set_message(format!("draining {family}"));
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));

    let report = drain(&dispatcher).await?;
    spinner.finish_and_clear();

    println!(
        "{} Drained {}: {} processed, {} failed in {} batch(es)",
        style("✓").green(),
        family,
        report.processed,
        report.failed,
        report.batches
    );
    if report.failed > 0 {
        println!(
            "  {} Failed tasks stay queued and are retried on the next drain",
            style("!").yellow()
        );
    }
    Ok(())
}

/// Show queue depths for all families.
pub async fn cmd_status(settings: &Settings) -> anyhow::Result<()> {
    let state = AppState::new(settings.clone());

    println!("{}", style("Queue status").bold());
    for family in TaskFamily::ALL {
        let pending = state.queue_repo.pending_count(family.queue_name()).await?;
        let dead = state
            .queue_repo
            .dead_letter_count(family.queue_name())
            .await?;
        println!("  {:<16} {:>6} pending  {:>4} dead", family, pending, dead);
    }
    Ok(())
}
