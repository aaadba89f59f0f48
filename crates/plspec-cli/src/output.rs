//! Output formatting and progress reporting

use console::{style, Style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use plspec::{CoverageError, CoverageSummary, EngineObserver, ObjectId};
use std::cell::RefCell;
use std::path::PathBuf;

/// Progress reporter for a coverage run
///
/// Messages go to stderr so the test command keeps stdout to itself.
#[derive(Debug)]
pub struct ProgressReporter {
    term: Term,
    progress_bar: RefCell<Option<ProgressBar>>,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
    /// Verbose mode: one line per object
    pub verbose: bool,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl ProgressReporter {
    /// Create a new progress reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            progress_bar: RefCell::new(None),
            use_color,
            quiet,
            verbose: false,
        }
    }

    /// Report every object, not only totals
    #[must_use]
    pub const fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Start a progress bar
    pub fn start_progress(&self, total: u64, message: &str) {
        if self.quiet || !self.term.is_term() {
            return;
        }

        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb.set_message(message.to_string());
        *self.progress_bar.borrow_mut() = Some(pb);
    }

    /// Increment progress
    pub fn increment(&self, delta: u64) {
        if let Some(ref pb) = *self.progress_bar.borrow() {
            pb.inc(delta);
        }
    }

    /// Finish and remove the progress bar
    pub fn finish(&self) {
        if let Some(pb) = self.progress_bar.borrow_mut().take() {
            pb.finish_and_clear();
        }
    }

    fn write_line(&self, line: &str) {
        match *self.progress_bar.borrow() {
            Some(ref pb) => pb.println(line),
            None => {
                let _ = self.term.write_line(line);
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if self.quiet {
            return;
        }

        let prefix = if self.use_color {
            style("✓").green().bold().to_string()
        } else {
            "PASS".to_string()
        };

        self.write_line(&format!("{prefix} {message}"));
    }

    /// Print a failure message
    pub fn failure(&self, message: &str) {
        // Always print failures, even in quiet mode
        let prefix = if self.use_color {
            style("✗").red().bold().to_string()
        } else {
            "FAIL".to_string()
        };

        self.write_line(&format!("{prefix} {message}"));
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.quiet {
            return;
        }

        let prefix = if self.use_color {
            style("⚠").yellow().bold().to_string()
        } else {
            "WARN".to_string()
        };

        self.write_line(&format!("{prefix} {message}"));
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.quiet {
            return;
        }

        let prefix = if self.use_color {
            style("ℹ").blue().bold().to_string()
        } else {
            "INFO".to_string()
        };

        self.write_line(&format!("{prefix} {message}"));
    }

    /// Print the coverage totals
    pub fn coverage_summary(&self, summary: &CoverageSummary) {
        if self.quiet {
            return;
        }

        let percent = format!("{:.2}%", summary.coverage_percent);
        let percent = if self.use_color {
            let style = if summary.covered_lines == summary.executable_lines {
                Style::new().green().bold()
            } else {
                Style::new().yellow().bold()
            };
            style.apply_to(percent).to_string()
        } else {
            percent
        };

        self.write_line("");
        self.write_line(&format!(
            "Coverage {percent}: {} of {} executable lines in {} objects",
            summary.covered_lines, summary.executable_lines, summary.objects
        ));
    }
}

impl EngineObserver for ProgressReporter {
    fn on_resolved(&self, objects: &[ObjectId]) {
        if objects.is_empty() {
            self.warning("No objects matched the coverage filter");
            return;
        }
        self.info(&format!("Instrumenting {} objects", objects.len()));
        self.start_progress(objects.len() as u64, "instrumenting");
    }

    fn on_instrumented(&self, id: &ObjectId) {
        self.increment(1);
        if self.verbose {
            self.success(&format!("instrumented {id}"));
        }
    }

    fn on_instrumentation_failed(&self, error: &CoverageError) {
        self.increment(1);
        self.warning(&error.to_string());
    }

    fn on_reports_written(&self, files: &[PathBuf]) {
        if self.verbose {
            for file in files {
                self.info(&format!("wrote {}", file.display()));
            }
        }
    }

    fn on_restored(&self, restored: usize, failures: &[CoverageError]) {
        self.finish();
        for failure in failures {
            self.failure(&failure.to_string());
        }
        if failures.is_empty() {
            self.success(&format!("Restored {restored} objects"));
        }
    }
}
