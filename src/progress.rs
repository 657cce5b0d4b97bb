//! Progress bar for batch planning

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use reconcile::{BatchObserver, Result, UpdateOperation};

/// indicatif-backed [`BatchObserver`]; hidden for single documents or when quiet
pub struct PlanProgress {
    bar: ProgressBar,
}

impl PlanProgress {
    pub fn new(total: usize, visible: bool) -> Self {
        let bar = if visible && total > 1 {
            ProgressBar::new(total as u64)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) =
            ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("=>-"));
        }
        Self { bar }
    }
}

impl BatchObserver for PlanProgress {
    fn on_start(&self, total: usize) {
        self.bar.set_length(total as u64);
    }

    fn on_planned(&self, label: &str, result: &Result<UpdateOperation>) {
        if result.is_err() {
            self.bar
                .suspend(|| log::info!("{} {} rejected", "✗".red(), label));
        }
        self.bar.set_message(label.to_string());
        self.bar.inc(1);
    }

    fn on_finish(&self) {
        self.bar.finish_and_clear();
    }
}
