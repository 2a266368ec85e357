//! Pure formatting functions for UI output.
//!
//! `format_*` functions build strings and are unit tested; `display_*`
//! functions print them.

use crate::analyzer::update_set::{FailedImage, SkippedImage};
use crate::cli::RunSummary;
use crate::domain::UpdateCandidate;
use crate::workflow::WorkflowFailure;
use console::style;

/// Format and print an error message in red.
pub fn display_error(message: &str) {
    eprintln!("{} {}", style("ERROR:").red().bold(), message);
}

/// Format and print a success message with green checkmark.
pub fn display_success(message: &str) {
    println!("{} {}", style("✓").green(), message);
}

/// Format and print a status message with yellow arrow.
pub fn display_status(message: &str) {
    println!("{} {}", style("→").yellow(), message);
}

pub fn display_warning(message: &str) {
    eprintln!("{} {}", style("⚠ WARNING:").yellow(), message);
}

/// One line per update: `service: old → new (file)`
pub fn format_update(update: &UpdateCandidate) -> String {
    format!(
        "{}: {} → {} ({})",
        update.service_name,
        update.old_image,
        update.new_image,
        update.file_name()
    )
}

pub fn format_skip(skipped: &SkippedImage) -> String {
    format!("{}: {}", skipped.service_name, skipped.reason)
}

pub fn format_check_failure(failed: &FailedImage) -> String {
    format!(
        "{} in {}: {}",
        failed.service_name,
        failed.file_path.display(),
        failed.error
    )
}

pub fn format_workflow_failure(failure: &WorkflowFailure) -> String {
    format!(
        "{} ({}): {}",
        failure.service_name, failure.stage, failure.error
    )
}

/// Display the updates found in text form.
pub fn display_updates(updates: &[UpdateCandidate]) {
    if updates.is_empty() {
        display_success("All images are up to date");
        return;
    }

    println!(
        "\n{}",
        style(format!("Found {} update(s):", updates.len())).bold()
    );
    for update in updates {
        println!("  {}", format_update(update));
    }
}

/// Skipped images are only interesting with `--verbose`.
pub fn display_skipped(skipped: &[SkippedImage]) {
    if skipped.is_empty() {
        return;
    }
    println!("\n{}", style("Skipped:").dim());
    for item in skipped {
        println!("  {}", style(format_skip(item)).dim());
    }
}

pub fn format_summary(summary: &RunSummary) -> String {
    let mut parts = vec![
        format!("{} found", summary.found),
        format!("{} opened", summary.opened),
        format!("{} failed", summary.failed.len()),
        format!("{} skipped", summary.skipped),
    ];
    if summary.not_attempted > 0 {
        parts.push(format!("{} not attempted", summary.not_attempted));
    }
    if summary.check_errors > 0 {
        parts.push(format!("{} could not be checked", summary.check_errors));
    }
    parts.join(", ")
}

/// Display the end-of-run summary.
pub fn display_summary(summary: &RunSummary) {
    for failure in &summary.failed {
        display_error(&format!(
            "Merge request not created for {}",
            failure
        ));
    }

    let line = format!("Summary: {}", format_summary(summary));
    if summary.cancelled {
        display_warning(&format!("{} (cancelled)", line));
    } else if summary.failed.is_empty() {
        display_success(&line);
    } else {
        display_status(&line);
    }
}
