use std::io::Write;

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

fn line(style: Style, label: &str, message: &str) {
    let _ = writeln!(std::io::stderr(), "{:>12} {message}", style.apply_to(label));
}

/// Print a status line: `  Registered app rocket`
///
/// The label is right-aligned to 12 columns in bold green.
pub fn status(label: &str, message: &str) {
    line(Style::new().green().bold(), label, message);
}

/// Like [`status`] but bold cyan, for informational messages.
pub fn status_info(label: &str, message: &str) {
    line(Style::new().cyan().bold(), label, message);
}

/// Bold yellow label.
pub fn status_warn(label: &str, message: &str) {
    line(Style::new().yellow().bold(), label, message);
}

/// Bold red label, used before remediation hints.
pub fn status_error(label: &str, message: &str) {
    line(Style::new().red().bold(), label, message);
}

/// Create an animated spinner for indeterminate progress.
///
/// Finish it with [`ProgressBar::finish_and_clear`].
pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(80));
    pb
}
