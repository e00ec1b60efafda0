//! Progress reporting for the anonymization run
//!
//! Provides the spinner shown while blocks stream through the pipeline,
//! plus the startup banner and the final summary.

use crate::pipeline::PipelineStats;
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner-based progress display
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        // the classic | / - \ collector spinner; trailing space clears
        // the glyph once the run finishes
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg} ({elapsed})")
                .expect("Invalid progress template")
                .tick_chars(r"|/-\ "),
        );

        bar.enable_steady_tick(Duration::from_millis(120));

        Self { bar }
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Finish and clear the progress display
    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, digit) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(digit);
    }
    out
}

/// Print a header at the start of the run
pub fn print_header(input: &str, workers: usize, output: &str) {
    println!();
    println!(
        "{} {}",
        style("nfanon").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Input:").bold(), input);
    println!("  {} {}", style("Workers:").bold(), workers);
    println!("  {} {}", style("Output:").bold(), output);
    println!();
}

/// Print a summary of the completed run
pub fn print_summary(stats: &PipelineStats) {
    let duration_secs = stats.duration.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        stats.records_anonymized as f64 / duration_secs
    } else {
        0.0
    };

    println!();
    println!("{}", style("Anonymization Complete").green().bold());
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Files:").bold(), format_number(stats.files));
    println!(
        "  {} {} ({} flow data)",
        style("Blocks:").bold(),
        format_number(stats.blocks),
        format_number(stats.flow_blocks)
    );
    println!(
        "  {} {}",
        style("Records:").bold(),
        format_number(stats.records_anonymized)
    );
    println!(
        "  {} {}",
        style("Data:").bold(),
        format_size(stats.bytes, BINARY)
    );
    println!(
        "  {} {:.1}s ({:.0} records/sec)",
        style("Duration:").bold(),
        duration_secs,
        rate
    );
    if stats.records_unknown > 0 {
        println!(
            "  {} {}",
            style("Unknown records:").yellow().bold(),
            format_number(stats.records_unknown)
        );
    }
    println!();
}
