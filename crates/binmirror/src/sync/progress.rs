//! Progress reporting types for sync runs.
//!
//! The library never prints; callers pass a [`ProgressCallback`] and decide
//! how to render events (the CLI turns them into tracing logs).

/// Progress events emitted during a category run.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SyncProgress {
    /// A run is starting.
    RunStarted {
        category: String,
        /// Adapter kind serving the category.
        adapter: String,
        /// Whether a resume hint was passed to the adapter.
        incremental: bool,
    },

    /// A directory was listed.
    DirListed {
        category: String,
        dir: String,
        /// Items kept after ignore filtering.
        items: usize,
    },

    /// A directory listing failed; its subtree is skipped this run.
    DirUnavailable { category: String, dir: String },

    /// The adapter stopped the run.
    Halted { category: String, reason: String },

    /// The walk reached its directory bound.
    Truncated { category: String, max_dirs: usize },

    /// A directory repeated an ancestor's listing and was not descended.
    CycleDetected { category: String, dir: String },

    /// A listed item had a name that cannot be stored and was skipped.
    ItemRejected {
        category: String,
        path: String,
        reason: String,
    },

    /// A file was fetched and stored.
    Downloaded {
        category: String,
        path: String,
        bytes: u64,
    },

    /// A file answered with one of its ignored statuses.
    ExpectedMissing {
        category: String,
        path: String,
        status: u16,
    },

    /// A file could not be fetched or stored.
    DownloadFailed {
        category: String,
        path: String,
        error: String,
    },

    /// A transient failure is being retried.
    RetryBackoff {
        target: String,
        retry_after_ms: u64,
        attempt: u32,
    },

    /// A run finished (possibly with gaps).
    RunFinished {
        category: String,
        summary: String,
        complete: bool,
    },
}

/// Callback type for progress reporting.
pub type ProgressCallback = Box<dyn Fn(SyncProgress) + Send + Sync>;

/// Emit a progress event if a callback is provided.
#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: SyncProgress) {
    if let Some(cb) = on_progress {
        cb(event);
    }
}
