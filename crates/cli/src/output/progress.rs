//! Progress indication
//!
//! A spinner for batch operations whose size is not known in bytes, and one
//! byte bar per transfer job. Both are suppressed in quiet or JSON mode.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressStyle};
use relo_core::{JobId, JobStatus, TransferProgress};

use super::OutputConfig;

fn hidden(config: &OutputConfig) -> bool {
    config.quiet || config.json || config.no_progress
}

/// Spinner wrapper
#[derive(Debug)]
pub struct ProgressBar {
    bar: Option<indicatif::ProgressBar>,
}

impl ProgressBar {
    /// Create a spinner for indeterminate progress
    pub fn spinner(config: &OutputConfig, message: &str) -> Self {
        if hidden(config) {
            return Self { bar: None };
        }
        let bar = indicatif::ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg}") {
            bar.set_style(style);
        }
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar: Some(bar) }
    }

    /// Finish and clear the spinner
    pub fn finish_and_clear(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }

    /// Check if the spinner is visible
    pub fn is_visible(&self) -> bool {
        self.bar.is_some()
    }
}

/// One byte bar per transfer job, driven by tracker progress events
pub struct TransferBars {
    multi: Option<MultiProgress>,
    labels: Mutex<HashMap<JobId, String>>,
    bars: Mutex<HashMap<JobId, indicatif::ProgressBar>>,
}

impl TransferBars {
    pub fn new(config: &OutputConfig) -> Self {
        Self {
            multi: (!hidden(config)).then(MultiProgress::new),
            labels: Mutex::new(HashMap::new()),
            bars: Mutex::new(HashMap::new()),
        }
    }

    /// Name shown next to the bar of `id`
    pub fn label(&self, id: JobId, label: impl Into<String>) {
        self.labels
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(id, label.into());
    }

    pub fn is_visible(&self) -> bool {
        self.multi.is_some()
    }

    /// Apply one progress event
    pub fn update(&self, progress: &TransferProgress) {
        let Some(multi) = &self.multi else {
            return;
        };
        let mut bars = self.bars.lock().unwrap_or_else(|p| p.into_inner());
        let bar = bars.entry(progress.job_id).or_insert_with(|| {
            let bar = multi.add(indicatif::ProgressBar::new(progress.total_bytes));
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner:.green} {prefix:20!} [{bar:30.cyan/blue}] {bytes}/{total_bytes} {msg}",
            ) {
                bar.set_style(style.progress_chars("#>-"));
            }
            let label = self
                .labels
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .get(&progress.job_id)
                .cloned()
                .unwrap_or_else(|| format!("job {}", progress.job_id));
            bar.set_prefix(label);
            bar
        });

        bar.set_length(progress.total_bytes);
        bar.set_position(progress.bytes_transferred);
        match progress.status {
            JobStatus::Pending => bar.set_message("queued"),
            JobStatus::Active => bar.set_message("running"),
            JobStatus::Completed => bar.finish_with_message(format!(
                "done {}/s",
                humansize::format_size(progress.speed as u64, humansize::BINARY)
            )),
            JobStatus::Error => bar.abandon_with_message(
                progress
                    .error
                    .clone()
                    .unwrap_or_else(|| "failed".to_string()),
            ),
        }
    }
}
