//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use anyhow::Result;
use chrono::{DateTime, Local, Utc};

use blinky_core::Section;

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print a single section with its links
    pub fn print_section(&self, section: &Section) -> Result<()> {
        match self.format {
            OutputFormat::Human => {
                println!("ID:      {}", section.id().unwrap_or("-"));
                println!("Title:   {}", section.title);
                println!("Updated: {}", format_timestamp(section.last_updated));

                if !section.links.is_empty() {
                    println!();
                    println!("── Links ({}) ──", section.links.len());
                    for (index, link) in section.links.iter().enumerate() {
                        println!(
                            "[{}] {} ({}) {}",
                            index,
                            truncate(&link.name, 30),
                            link.domain,
                            truncate(&link.url, 50)
                        );
                    }
                }
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(section)?);
            }
            OutputFormat::Quiet => {
                println!("{}", section.id().unwrap_or_default());
            }
        }
        Ok(())
    }

    /// Print a list of sections
    pub fn print_sections(&self, sections: &[Section]) -> Result<()> {
        match self.format {
            OutputFormat::Human => {
                if sections.is_empty() {
                    println!("No sections found.");
                    return Ok(());
                }
                for section in sections {
                    println!(
                        "{} | {} | {} link(s) | {}",
                        truncate(section.id().unwrap_or("-"), 24),
                        truncate(&section.title, 30),
                        section.links.len(),
                        format_timestamp(section.last_updated)
                    );
                }
                println!("\n{} section(s)", sections.len());
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(sections)?);
            }
            OutputFormat::Quiet => {
                for section in sections {
                    println!("{}", section.id().unwrap_or_default());
                }
            }
        }
        Ok(())
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }
}

/// Render epoch milliseconds in local time
pub fn format_timestamp(millis: Option<i64>) -> String {
    millis
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "never".to_string())
}

/// Truncate a string to max length, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
