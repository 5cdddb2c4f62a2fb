use binmirror::sync::SyncProgress;

/// Logging reporter using tracing for structured output.
pub struct LoggingReporter;

impl LoggingReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, event: SyncProgress) {
        match event {
            SyncProgress::RunStarted {
                category,
                adapter,
                incremental,
            } => {
                tracing::info!(category = %category, adapter = %adapter, incremental, "Sync started");
            }

            SyncProgress::DirListed {
                category,
                dir,
                items,
            } => {
                tracing::debug!(category = %category, dir = %dir, items, "Listed directory");
            }

            SyncProgress::DirUnavailable { category, dir } => {
                tracing::warn!(category = %category, dir = %dir, "Directory unavailable");
            }

            SyncProgress::Halted { category, reason } => {
                tracing::warn!(category = %category, reason = %reason, "Sync halted");
            }

            SyncProgress::Truncated { category, max_dirs } => {
                tracing::warn!(category = %category, max_dirs, "Directory bound reached");
            }

            SyncProgress::CycleDetected { category, dir } => {
                tracing::warn!(category = %category, dir = %dir, "Directory repeats an ancestor, not descending");
            }

            SyncProgress::ItemRejected {
                category,
                path,
                reason,
            } => {
                tracing::warn!(category = %category, path = %path, reason = %reason, "Listing item rejected");
            }

            SyncProgress::Downloaded {
                category,
                path,
                bytes,
            } => {
                tracing::info!(category = %category, path = %path, bytes, "Downloaded");
            }

            SyncProgress::ExpectedMissing {
                category,
                path,
                status,
            } => {
                tracing::debug!(category = %category, path = %path, status, "Expected missing upstream");
            }

            SyncProgress::DownloadFailed {
                category,
                path,
                error,
            } => {
                tracing::warn!(category = %category, path = %path, error = %error, "Download failed");
            }

            SyncProgress::RetryBackoff {
                target,
                retry_after_ms,
                attempt,
            } => {
                tracing::debug!(target_name = %target, retry_after_ms, attempt, "Retrying after backoff");
            }

            SyncProgress::RunFinished {
                category,
                summary,
                complete,
            } => {
                if complete {
                    tracing::info!(category = %category, "{summary}");
                } else {
                    tracing::warn!(category = %category, "Incomplete: {summary}");
                }
            }

            _ => {}
        }
    }
}
