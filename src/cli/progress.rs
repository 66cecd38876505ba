//! Spinner and summary reporting for CLI runs.

use std::path::Path;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

use crate::diagnostics::BANNER;
use crate::format::{format_bytes, format_duration, plural};
use crate::{Diagnostics, HarvestProgress, HarvestReport};

const SEPARATOR: &str = "────────────────────────────────────────────────────────────";

/// Shows the current course and folder on a spinner line.
pub struct SpinnerProgress {
    bar: ProgressBar,
}

impl SpinnerProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} [{elapsed}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl HarvestProgress for SpinnerProgress {
    fn on_course_start(&self, name: &str, index: usize, total: usize) {
        self.bar.println(format!("[{}/{total}] {name}", index + 1));
        self.bar.set_message(name.to_string());
    }

    fn on_folder_start(&self, course: &str, folder: &str) {
        self.bar.set_message(format!("{course} / {folder}"));
    }

    fn on_file_relocated(&self, name: &str, destination: &Path) {
        self.bar
            .println(format!("  {name} -> {}", destination.display()));
    }

    fn on_deferred(&self, url: &str, destination: &Path) {
        self.bar.println(format!(
            "  {} will be visited later ({url})",
            destination.display()
        ));
    }

    fn on_replay_start(&self, count: usize) {
        self.bar
            .println(format!("Visiting {}", plural(count, "nested folder")));
    }
}

/// Prints a summary of the run.
pub fn print_summary(report: &HarvestReport) {
    let stats = &report.stats;

    println!("\n{SEPARATOR}");
    println!(
        "Harvest Summary (started {})",
        report.started.format("%Y-%m-%d %H:%M")
    );
    println!("{SEPARATOR}");
    println!("  Saved to:          {}", report.run_dir.display());
    println!("  Courses:           {}", stats.courses);
    println!("  Folders visited:   {}", stats.folders_visited);
    if stats.deferred_replayed > 0 {
        println!("  Nested folders:    {}", stats.deferred_replayed);
    }
    if stats.folders_unreachable > 0 {
        println!("  Unreachable:       {}", stats.folders_unreachable);
    }
    println!("  Files saved:       {}", stats.files_relocated);
    println!("  Total size:        {}", format_bytes(stats.bytes_relocated));
    if stats.files_failed > 0 {
        println!("  Files not moved:   {}", stats.files_failed);
    }
    if stats.strays_removed > 0 {
        println!("  Strays removed:    {}", stats.strays_removed);
    }
    println!("  Total time:        {}", format_duration(stats.elapsed));
    println!("{SEPARATOR}");
}

/// Prints the diagnostics banner followed by each note, or `None`.
pub fn print_diagnostics(diagnostics: &Diagnostics) {
    println!();
    let banner = console::style(BANNER).bold();
    if diagnostics.is_empty() {
        println!("{}", banner.green());
        println!("None");
        return;
    }
    println!("{}", banner.red());
    for note in diagnostics.iter() {
        println!("{note}");
    }
}
