use std::sync::Arc;

use binmirror::task::WorkerPool;
use console::style;

use crate::commands::shared::Runtime;
use crate::config::Config;
use crate::progress::ProgressReporter;
use crate::shutdown::shutdown_signal;

/// Run a long-lived worker pool until Ctrl+C.
pub(crate) async fn handle_worker(
    concurrency: Option<usize>,
    config: &Config,
    database_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = Runtime::open(config, database_url).await?;
    let worker_config = config.worker_config(false, concurrency);

    tracing::info!(
        categories = runtime.registry.len(),
        concurrency = worker_config.concurrency,
        run_timeout_hours = worker_config.run_timeout.num_hours(),
        "Starting worker"
    );

    let reporter = Arc::new(ProgressReporter::new());
    let pool = WorkerPool::new(
        runtime.engine.clone(),
        Arc::clone(&runtime.registry),
        Arc::clone(&runtime.db),
        Arc::clone(&runtime.store),
        runtime.downloader.clone(),
        worker_config,
    )
    .with_progress(reporter.as_callback());

    let stats = pool.run(shutdown_signal()).await?;
    reporter.finish();

    println!(
        "{} worker stopped after {} run(s): {} complete, {} incomplete, {} failed, {} timed out",
        style("✓").green().bold(),
        stats.total(),
        stats.complete,
        stats.incomplete,
        stats.failed,
        stats.timed_out
    );
    Ok(())
}
