//! Output formatting utilities
//!
//! This module provides formatters for CLI output in both human-readable
//! and JSON formats. It also handles progress bars and colored output.

mod formatter;
mod progress;

pub use formatter::Formatter;
pub use progress::{ProgressBar, TransferBars};

use relo_core::config::Defaults;

/// Output configuration derived from CLI flags
#[derive(Debug, Clone, Default)]
pub struct OutputConfig {
    /// Use JSON output format
    pub json: bool,
    /// Disable colored output
    pub no_color: bool,
    /// Disable progress bar
    pub no_progress: bool,
    /// Suppress non-error output
    pub quiet: bool,
}

impl OutputConfig {
    /// Fold the `[defaults]` table of the config file into the flags
    ///
    /// Flags only ever switch things off or to JSON, so a flag given on the
    /// command line always wins over the file.
    pub fn with_defaults(mut self, defaults: &Defaults) -> Self {
        self.json |= defaults.output.eq_ignore_ascii_case("json");
        self.no_color |= defaults.color.eq_ignore_ascii_case("never");
        self.no_progress |= !defaults.progress;
        if defaults.color.eq_ignore_ascii_case("always") && !self.no_color {
            console::set_colors_enabled(true);
            console::set_colors_enabled_stderr(true);
        }
        self
    }
}
