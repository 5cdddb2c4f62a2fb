//! Progress reporting for category syncs.
//!
//! - Interactive mode (TTY): one indicatif spinner per running category
//! - Logging mode (non-TTY): structured logging through tracing

mod interactive;
mod logging;

use std::sync::Arc;

use binmirror::sync::{ProgressCallback, SyncProgress};
use console::Term;

pub use interactive::InteractiveReporter;
pub use logging::LoggingReporter;

/// Progress reporter that handles both interactive and logging modes.
pub enum ProgressReporter {
    Interactive(InteractiveReporter),
    Logging(LoggingReporter),
}

impl ProgressReporter {
    /// Create a new progress reporter, auto-detecting TTY mode.
    pub fn new() -> Self {
        if Term::stdout().is_term() {
            Self::Interactive(InteractiveReporter::new())
        } else {
            Self::Logging(LoggingReporter::new())
        }
    }

    pub fn handle(&self, event: SyncProgress) {
        match self {
            Self::Interactive(r) => r.handle(event),
            Self::Logging(r) => r.handle(event),
        }
    }

    /// Convert to a [`ProgressCallback`] for the library.
    pub fn as_callback(self: &Arc<Self>) -> ProgressCallback {
        let reporter = Arc::clone(self);
        Box::new(move |event| reporter.handle(event))
    }

    /// Finish all spinners (interactive mode only).
    pub fn finish(&self) {
        if let Self::Interactive(r) = self {
            r.finish();
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}
