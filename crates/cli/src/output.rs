//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a rounded table, or a notice when there is nothing to show
pub fn print_table<T: Tabled>(items: &[T]) {
    if items.is_empty() {
        println!("{}", "No items found".yellow());
        return;
    }
    let table = Table::new(items).with(Style::rounded()).to_string();
    println!("{}", table);
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

pub fn format_percent(value: f64) -> String {
    format!("{:.2}%", value)
}

pub fn format_ms(value: f64) -> String {
    format!("{:.2}ms", value)
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" | "ready" | "stable" | "improving" => status.green().to_string(),
        "degraded" | "not ready" => status.yellow().to_string(),
        "unhealthy" | "degrading" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Color a risk level the way the score bands read
pub fn color_risk_level(level: &str) -> String {
    match level {
        "excellent" => level.green().bold().to_string(),
        "good" => level.green().to_string(),
        "medium" => level.yellow().to_string(),
        "severe" => level.red().bold().to_string(),
        _ => level.to_string(),
    }
}

/// Color a 0-100 score
pub fn color_score(score: f64) -> String {
    let formatted = format!("{:.1}", score);
    if score >= 90.0 {
        formatted.green().to_string()
    } else if score >= 70.0 {
        formatted.cyan().to_string()
    } else if score >= 50.0 {
        formatted.yellow().to_string()
    } else {
        formatted.red().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_helpers() {
        assert_eq!(format_percent(2.5), "2.50%");
        assert_eq!(format_ms(0.1234), "0.12ms");
    }

    #[test]
    fn test_colors_keep_text() {
        colored::control::set_override(false);
        assert_eq!(color_risk_level("severe"), "severe");
        assert_eq!(color_score(35.71), "35.7");
        assert_eq!(color_status("degraded"), "degraded");
    }
}
