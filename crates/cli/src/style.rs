//! Shared styling utilities for CLI output.

use console::Style;

/// Create a success-styled string (green with checkmark).
pub fn success(msg: &str) -> String {
    let style = Style::new().green();
    format!("{} {}", style.apply_to("✓"), msg)
}

/// Create an error-styled string (red with cross).
pub fn error(msg: &str) -> String {
    let style = Style::new().red();
    format!("{} {}", style.apply_to("✗"), msg)
}

/// Create a warning-styled string (yellow).
pub fn warn(msg: &str) -> String {
    let style = Style::new().yellow();
    format!("{} {}", style.apply_to("⚠"), msg)
}

/// Create a header-styled string (bold).
pub fn header(msg: &str) -> String {
    let style = Style::new().bold();
    style.apply_to(msg).to_string()
}

/// Create a dim-styled string.
pub fn dim(msg: &str) -> String {
    let style = Style::new().dim();
    style.apply_to(msg).to_string()
}

/// Colored label for a record outcome.
pub fn outcome(label: &str) -> String {
    let style = match label {
        "sent" => Style::new().green(),
        "failure" => Style::new().yellow(),
        "error" => Style::new().red(),
        _ => Style::new().magenta(),
    };
    style.apply_to(label).to_string()
}

/// `set` / `NOT SET` marker for secrets.
pub fn secret_state(present: bool) -> String {
    if present {
        Style::new().green().apply_to("set").to_string()
    } else {
        Style::new().red().apply_to("NOT SET").to_string()
    }
}
