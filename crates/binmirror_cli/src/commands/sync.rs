//! One-shot sync of selected categories.
//!
//! Categories are enqueued on the task queue (joining any run already in
//! flight) and the local pool drains the queue. `--dry-run` bypasses the
//! queue and walks the categories directly without writing anything.

use std::sync::Arc;

use binmirror::sync::{SyncContext, SyncReport, sync_category};
use binmirror::task::{WorkerPool, WorkerStats, resume_hint};
use binmirror::TaskEngine;
use console::style;

use crate::commands::shared::Runtime;
use crate::config::Config;
use crate::progress::ProgressReporter;
use crate::shutdown::shutdown_signal;
use crate::SyncArgs;

pub(crate) async fn handle_sync(
    args: SyncArgs,
    config: &Config,
    database_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::open(config, database_url).await?;
    let categories = runtime.select(&args.categories, args.all)?;

    if args.dry_run {
        return dry_run(&runtime, config, &categories).await;
    }

    for category in &categories {
        let enqueued = runtime.engine.create_or_join(category).await?;
        if enqueued.joined {
            println!(
                "{} {} already {}, joining",
                style("→").dim(),
                style(category).cyan(),
                enqueued.task.state
            );
        } else {
            println!("{} {} queued", style("→").dim(), style(category).cyan());
        }
    }

    let reporter = Arc::new(ProgressReporter::new());
    let pool = WorkerPool::new(
        runtime.engine.clone(),
        Arc::clone(&runtime.registry),
        Arc::clone(&runtime.db),
        Arc::clone(&runtime.store),
        runtime.downloader.clone(),
        config.worker_config(false, args.concurrency),
    )
    .with_progress(reporter.as_callback());

    let mut shutdown = shutdown_signal();
    let stats = tokio::select! {
        stats = pool.run_until_idle() => stats?,
        _ = shutdown.changed() => {
            reporter.finish();
            println!(
                "{} Interrupted; unfinished categories are requeued by the next worker sweep.",
                style("⚠").yellow().bold()
            );
            return Ok(());
        }
    };
    reporter.finish();

    print_stats(&stats);
    let failed = stats.failed + stats.timed_out;
    if failed > 0 {
        return Err(format!("{failed} category sync(s) failed; see `binmirror status`").into());
    }
    Ok(())
}

async fn dry_run(
    runtime: &Runtime,
    config: &Config,
    categories: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let reporter = Arc::new(ProgressReporter::new());
    let on_progress = reporter.as_callback();
    let ctx = SyncContext {
        db: runtime.db.as_ref(),
        store: Arc::clone(&runtime.store),
        downloader: runtime.downloader.clone(),
        options: config.sync_options(true),
    };

    let mut reports = Vec::with_capacity(categories.len());
    for category in categories {
        let Some(entry) = runtime.registry.get(category) else {
            continue;
        };
        let hint = match runtime.engine.find(category).await? {
            Some(task) => resume_hint(&task)?,
            None => None,
        };
        reports.push(sync_category(&ctx, entry, hint.as_ref(), Some(&on_progress)).await?);
    }
    reporter.finish();

    for report in &reports {
        print_report(report);
    }
    Ok(())
}

fn print_report(report: &SyncReport) {
    let mark = if report.is_complete() {
        style("✓").green().bold()
    } else {
        style("⚠").yellow().bold()
    };
    println!(
        "{mark} {} {} dirs, {} nodes would be written",
        style(&report.category).cyan(),
        report.dirs_listed,
        report.nodes_seen
    );
}

fn print_stats(stats: &WorkerStats) {
    println!();
    println!(
        "{} {} complete, {} incomplete, {} failed, {} timed out",
        style("Done:").bold(),
        style(stats.complete).green(),
        style(stats.incomplete).yellow(),
        style(stats.failed).red(),
        style(stats.timed_out).red()
    );
}
