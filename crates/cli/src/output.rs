//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use flow_lib::health::HealthLevel;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table from a list of rows, or a note when there is none
pub fn print_table<T: Tabled>(title: &str, rows: &[T]) {
    println!("{}", title.bold());
    if rows.is_empty() {
        println!("{}", "No items found".yellow());
        return;
    }
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Score with one decimal, colored by health level
pub fn color_score(score: f64) -> String {
    let formatted = format!("{:.1}", score);
    match HealthLevel::from_score(score) {
        HealthLevel::Critical => formatted.red().bold().to_string(),
        HealthLevel::Warning => formatted.yellow().to_string(),
        HealthLevel::Minor => formatted.blue().to_string(),
        HealthLevel::Healthy => formatted.green().to_string(),
    }
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "firing" | "critical" => status.red().to_string(),
        "pending" | "warning" => status.yellow().to_string(),
        "silenced" | "minor" => status.blue().to_string(),
        "recording" | "healthy" => status.green().to_string(),
        "inactive" => status.dimmed().to_string(),
        _ => status.to_string(),
    }
}

/// Placeholder for absent optional values
pub fn or_dash(value: Option<&str>) -> String {
    value.unwrap_or("-").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_or_dash() {
        assert_eq!(or_dash(None), "-");
        assert_eq!(or_dash(Some("ns1")), "ns1");
    }

    #[test]
    fn test_color_score_keeps_value() {
        colored::control::set_override(false);
        assert_eq!(color_score(4.24), "4.2");
        assert_eq!(color_score(10.0), "10.0");
        assert_eq!(color_status("firing"), "firing");
    }
}
