use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use binmirror::sync::SyncProgress;
use console::style;
use indicatif::{HumanBytes, MultiProgress, ProgressBar, ProgressStyle};

/// Counters behind one category spinner.
struct CategoryState {
    bar: ProgressBar,
    dirs: usize,
    files: usize,
    bytes: u64,
    problems: usize,
}

impl CategoryState {
    fn refresh(&self, current: &str) {
        let mut msg = format!(
            "{} dirs, {} files ({})",
            self.dirs,
            self.files,
            HumanBytes(self.bytes)
        );
        if self.problems > 0 {
            msg.push_str(&format!(", {} problems", self.problems));
        }
        if !current.is_empty() {
            msg.push_str(&format!("  {}", style(current).dim()));
        }
        self.bar.set_message(msg);
    }
}

/// Interactive progress reporter using indicatif.
pub struct InteractiveReporter {
    multi: MultiProgress,
    state: Mutex<HashMap<String, CategoryState>>,
}

impl InteractiveReporter {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            state: Mutex::new(HashMap::new()),
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {prefix:.bold.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }

    fn warn(&self, category: &str, message: &str) {
        let _ = self.multi.println(format!(
            "{} {} {}",
            style("⚠").yellow().bold(),
            style(category).cyan(),
            message
        ));
    }

    pub fn handle(&self, event: SyncProgress) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        match event {
            SyncProgress::RunStarted {
                category,
                adapter,
                incremental,
            } => {
                let bar = self.multi.add(ProgressBar::new_spinner());
                bar.set_style(Self::spinner_style());
                bar.enable_steady_tick(Duration::from_millis(100));
                bar.set_prefix(format!("{category:16}"));
                let mode = if incremental { "incremental" } else { "full" };
                bar.set_message(format!("{adapter} ({mode})"));
                state.insert(
                    category,
                    CategoryState {
                        bar,
                        dirs: 0,
                        files: 0,
                        bytes: 0,
                        problems: 0,
                    },
                );
            }

            SyncProgress::DirListed { category, dir, .. } => {
                if let Some(s) = state.get_mut(&category) {
                    s.dirs += 1;
                    s.refresh(&dir);
                }
            }

            SyncProgress::Downloaded {
                category,
                path,
                bytes,
            } => {
                if let Some(s) = state.get_mut(&category) {
                    s.files += 1;
                    s.bytes += bytes;
                    s.refresh(&path);
                }
            }

            SyncProgress::DirUnavailable { category, dir } => {
                if let Some(s) = state.get_mut(&category) {
                    s.problems += 1;
                    s.refresh(&dir);
                }
                self.warn(&category, &format!("directory unavailable: {dir}"));
            }

            SyncProgress::DownloadFailed {
                category,
                path,
                error,
            } => {
                if let Some(s) = state.get_mut(&category) {
                    s.problems += 1;
                    s.refresh(&path);
                }
                self.warn(&category, &format!("download failed: {path}: {error}"));
            }

            SyncProgress::Halted { category, reason } => {
                self.warn(&category, &format!("halted: {reason}"));
            }

            SyncProgress::Truncated { category, max_dirs } => {
                self.warn(&category, &format!("stopped after {max_dirs} directories"));
            }

            SyncProgress::CycleDetected { category, dir } => {
                self.warn(&category, &format!("directory loop at {dir}, not descending"));
            }

            SyncProgress::ItemRejected {
                category,
                path,
                reason,
            } => {
                if let Some(s) = state.get_mut(&category) {
                    s.problems += 1;
                }
                self.warn(&category, &format!("skipped {path}: {reason}"));
            }

            SyncProgress::RunFinished {
                category,
                summary,
                complete,
            } => {
                if let Some(s) = state.remove(&category) {
                    let mark = if complete {
                        style("✓").green().bold()
                    } else {
                        style("⚠").yellow().bold()
                    };
                    s.bar.set_style(
                        ProgressStyle::default_spinner()
                            .template("{prefix:.bold.cyan} {msg}")
                            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                    );
                    s.bar.finish_with_message(format!("{mark} {summary}"));
                }
            }

            _ => {}
        }
    }

    pub fn finish(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        for (_, s) in state.drain() {
            s.bar.finish_and_clear();
        }
    }
}
