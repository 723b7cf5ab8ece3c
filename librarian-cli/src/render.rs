//! Terminal rendering
//!
//! Colored output for job state, progress and log lines.

use colored::*;
use librarian_core::domain::job::{JobRecord, JobStatus};
use librarian_core::domain::log::LogEvent;
use librarian_core::domain::module::ModuleId;

/// Colorize job status for display
pub fn colorize_status(status: JobStatus) -> ColoredString {
    let status_str = status.to_string();
    match status {
        JobStatus::NotStarted => status_str.dimmed(),
        JobStatus::Running => status_str.cyan(),
        JobStatus::Finished => status_str.green(),
        JobStatus::Error => status_str.red(),
        JobStatus::UserCanceled => status_str.yellow(),
    }
}

/// Progress as `checked/total files (pct%)`, if the backend reported a total
pub fn format_progress(record: &JobRecord) -> Option<String> {
    let ratio = record.progress()?;
    Some(format!(
        "{}/{} files ({:.0}%)",
        record.files_checked,
        record.total_files,
        ratio * 100.0
    ))
}

/// Print a line of job output
///
/// Blank padding around a message is dropped; a message made only of
/// newlines prints nothing.
pub fn print_log(event: &LogEvent, show_module: bool) {
    let message = event.message.trim_matches('\n');
    if message.is_empty() {
        return;
    }

    let time = event.timestamp.format("%H:%M:%S").to_string();
    for line in message.lines() {
        if show_module {
            println!("{} {} {}", time.dimmed(), event.module.as_str().cyan(), line);
        } else {
            println!("{} {}", time.dimmed(), line);
        }
    }
}

/// Print a state transition
pub fn print_transition(module: ModuleId, record: &JobRecord) {
    println!(
        "{} {} is {}",
        "▸".cyan(),
        module.to_string().bold(),
        colorize_status(record.status)
    );
}

/// Print a progress update
pub fn print_progress(module: ModuleId, record: &JobRecord) {
    if let Some(progress) = format_progress(record) {
        println!("  {} {}", module.as_str().dimmed(), progress.dimmed());
    }
}

/// Print the final summary of a followed job
pub fn print_summary(module: ModuleId, record: &JobRecord) {
    println!();
    println!("{}", format!("{} summary:", module).bold());
    println!("  Status:   {}", colorize_status(record.status));
    if !record.target_path.is_empty() {
        println!("  Target:   {}", record.target_path);
    }
    if let Some(progress) = format_progress(record) {
        println!("  Progress: {}", progress);
    }
}
