//! Rich CLI output: colored status lines, a progress spinner, graph
//! rendering, and the narrowing summary table.

use std::io::Write;
use std::time::Duration;

use colored::Colorize;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color, ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;

use crate::error::Error;

/// Create and return a spinner shown while the analysis runs.
///
/// In test mode, returns a hidden progress bar to avoid polluting test
/// output.
#[must_use]
pub fn create_spinner(message: &'static str) -> ProgressBar {
    if cfg!(test) {
        return ProgressBar::hidden();
    }

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Print a fatal error to stderr.
pub fn print_error(err: &Error) {
    eprintln!("{} {err}", "[error]".red().bold());
}

/// Print the outcome of one reachability analysis.
///
/// # Errors
///
/// Returns an error if writing to the output fails.
pub fn print_detection(
    writer: &mut impl Write,
    detected: bool,
    targets: &[String],
) -> std::io::Result<()> {
    let list = targets.join(", ");
    if detected {
        writeln!(
            writer,
            "{} {}",
            "[REACHABLE]".red().bold(),
            format!("a call chain from the entry reaches: {list}").bold()
        )?;
    } else {
        writeln!(
            writer,
            "{} {}",
            "[NOT REACHED]".green().bold(),
            format!("no call chain from the entry reaches: {list}").dimmed()
        )?;
    }
    Ok(())
}

/// Print the expanded call graph as pretty JSON.
///
/// # Errors
///
/// Returns an error if writing or serialization fails.
pub fn print_graph(writer: &mut impl Write, expanded: &Value) -> std::io::Result<()> {
    let rendered = serde_json::to_string_pretty(expanded).unwrap_or_else(|_| "{}".to_owned());
    writeln!(writer, "{rendered}")
}

/// Print every call chain leading to a target, one per line.
///
/// # Errors
///
/// Returns an error if writing to the output fails.
pub fn print_paths(writer: &mut impl Write, paths: &[Vec<String>]) -> std::io::Result<()> {
    for path in paths {
        writeln!(writer, "{}", path.join(" -> "))?;
    }
    Ok(())
}

/// Build the per-vulnerability summary table for a narrowed SBOM.
#[must_use]
pub fn narrow_summary_table(narrowed: &Value) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Vulnerability", "Outcome"]);

    if let Some(vulns) = narrowed.get("vulnerabilities").and_then(Value::as_array) {
        for vuln in vulns {
            let id = vuln.get("id").and_then(Value::as_str).unwrap_or("?");
            let narrowed_down = vuln
                .get("analysis")
                .and_then(|a| a.get("state"))
                .and_then(Value::as_str)
                == Some("not_affected");
            table.add_row(vec![Cell::new(id), outcome_cell(narrowed_down)]);
        }
    } else if let Some(components) = narrowed.as_array() {
        for component in components {
            let Some(vulns) = component.get("vulnerabilities").and_then(Value::as_array) else {
                continue;
            };
            for vuln in vulns {
                let id = vuln.get("cve").and_then(Value::as_str).unwrap_or("?");
                let score = vuln.get("cvssScore").and_then(Value::as_f64).unwrap_or(0.0);
                table.add_row(vec![
                    Cell::new(id),
                    Cell::new(format!("cvssScore {score:.1}")),
                ]);
            }
        }
    }
    table
}

fn outcome_cell(narrowed_down: bool) -> Cell {
    if narrowed_down {
        Cell::new("not_affected (code_not_reachable)").fg(Color::Green)
    } else {
        Cell::new("kept").fg(Color::Red)
    }
}
