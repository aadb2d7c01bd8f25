use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;

/// User-facing progress of a workflow. Passed into the components that need
/// it so they can run without a terminal.
pub trait Reporter {
    /// A long-running step begins.
    fn begin(&self, message: &str);
    /// The current step finished successfully.
    fn succeed(&self, message: &str);
    /// The current step failed.
    fn fail(&self, message: &str);
    fn warn(&self, message: &str);
    /// Per-package progress over `total` items.
    fn start_progress(&self, total: usize);
    fn tick(&self, item: &str);
    fn finish_progress(&self);
}

/// Spinner and progress bar on stderr, colored status lines on stdout.
#[derive(Default)]
pub struct ConsoleReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn replace_bar(&self, next: Option<ProgressBar>) {
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(previous) = slot.take() {
                previous.finish_and_clear();
            }
            *slot = next;
        }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(slot) = self.bar.lock() {
            if let Some(bar) = slot.as_ref() {
                f(bar);
            }
        }
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("  [{bar:40}] {pos}/{len} {msg}")
            .map(|style| style.progress_chars("=>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("  {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }
}

impl Reporter for ConsoleReporter {
    fn begin(&self, message: &str) {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(Self::spinner_style());
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));
        self.replace_bar(Some(spinner));
    }

    fn succeed(&self, message: &str) {
        self.replace_bar(None);
        println!("{}", format!("✓ {message}").green());
    }

    fn fail(&self, message: &str) {
        self.replace_bar(None);
        println!("{}", format!("✗ {message}").red());
    }

    fn warn(&self, message: &str) {
        let line = format!("⚠ {message}").yellow();
        let mut printed = false;
        self.with_bar(|bar| {
            bar.println(line.to_string());
            printed = true;
        });
        if !printed {
            println!("{line}");
        }
    }

    fn start_progress(&self, total: usize) {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(Self::bar_style());
        self.replace_bar(Some(bar));
    }

    fn tick(&self, item: &str) {
        self.with_bar(|bar| {
            bar.set_message(format!("Checking {item}"));
            bar.inc(1);
        });
    }

    fn finish_progress(&self) {
        self.replace_bar(None);
    }
}
