//! Output formatting module for the Fleetshell CLI
//!
//! Provides colored human output and line-delimited JSON output.

use colored::Colorize;
use fleetshell::fleet::{CommandResult, FleetResult};
use fleetshell::metrics::MetricsSnapshot;
use std::io::{self, Write};
use std::time::{Duration, Instant};

/// Outcome of one host in a listing or fleet run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostStatus {
    /// Command succeeded
    Ok,
    /// Command ran but failed
    Failed,
    /// Host could not be reached
    Unreachable,
}

impl HostStatus {
    /// Status of a fleet result entry
    pub fn of(result: &CommandResult) -> Self {
        if result.is_ok() {
            HostStatus::Ok
        } else if result.unreachable {
            HostStatus::Unreachable
        } else {
            HostStatus::Failed
        }
    }

    /// Get the colored string representation
    pub fn colored_string(&self) -> String {
        match self {
            HostStatus::Ok => "ok".green().to_string(),
            HostStatus::Failed => "failed".red().bold().to_string(),
            HostStatus::Unreachable => "unreachable".red().bold().to_string(),
        }
    }

    /// Get the plain string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            HostStatus::Ok => "ok",
            HostStatus::Failed => "failed",
            HostStatus::Unreachable => "unreachable",
        }
    }
}

/// Output formatter for different output modes
pub struct OutputFormatter {
    /// Use colored output
    use_color: bool,
    /// JSON output mode
    json_mode: bool,
    /// Verbosity level
    verbosity: u8,
    /// Start time for duration calculations
    start_time: Instant,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(use_color: bool, json_mode: bool, verbosity: u8) -> Self {
        // Respect NO_COLOR environment variable
        let use_color = use_color && std::env::var("NO_COLOR").is_err();

        Self {
            use_color,
            json_mode,
            verbosity,
            start_time: Instant::now(),
        }
    }

    /// Whether JSON output was requested
    pub fn is_json(&self) -> bool {
        self.json_mode
    }

    /// Print a banner/header
    pub fn banner(&self, title: &str) {
        if self.json_mode {
            return;
        }

        let line = "=".repeat(title.len() + 4);
        if self.use_color {
            println!("\n{}", line.bright_blue());
            println!("{}", format!("  {}  ", title).bright_blue().bold());
            println!("{}\n", line.bright_blue());
        } else {
            println!("\n{}", line);
            println!("  {}  ", title);
            println!("{}\n", line);
        }
    }

    /// Print a value as one JSON line
    pub fn json<T: serde::Serialize>(&self, value: &T) {
        match serde_json::to_string(value) {
            Ok(json) => println!("{}", json),
            Err(e) => self.error(&format!("failed to encode output: {}", e)),
        }
    }

    /// Print every host of a fleet run, sorted by address, followed by a recap
    pub fn fleet_result(&self, results: &FleetResult) {
        if self.json_mode {
            self.json(results);
            return;
        }

        let mut entries: Vec<&CommandResult> = results.iter().collect();
        entries.sort_by(|a, b| a.host.cmp(&b.host));

        for result in &entries {
            let status = HostStatus::of(result);
            if self.use_color {
                println!(
                    "{} | {}",
                    result.host.bright_white().bold(),
                    status.colored_string()
                );
            } else {
                println!("{} | {}", result.host, status.as_str());
            }

            for line in result.text().lines() {
                println!("    {}", line);
            }
        }

        self.recap(results);
    }

    fn recap(&self, results: &FleetResult) {
        let failed = results.failed_count();
        let ok = results.len() - failed;
        let duration = format_duration(self.start_time.elapsed());

        let line = format!(
            "{} hosts, {} ok, {} failed in {}",
            results.len(),
            ok,
            failed,
            duration
        );
        if !self.use_color {
            println!("\n{}", line);
        } else if failed > 0 {
            println!("\n{}", line.red().bold());
        } else {
            println!("\n{}", line.green().bold());
        }
    }

    /// Print one metrics snapshot for a host
    pub fn snapshot(&self, address: &str, snapshot: &MetricsSnapshot) {
        if self.json_mode {
            self.json(&serde_json::json!({ "host": address, "metrics": snapshot }));
            return;
        }

        if self.use_color {
            println!("{}", address.bright_white().bold());
        } else {
            println!("{}", address);
        }

        for (key, reading) in snapshot.iter() {
            let label = format!("{:<8}", key.as_str());
            match (self.use_color, reading.is_error()) {
                (true, true) => println!("  {} {}", label.cyan(), reading.text().red()),
                (true, false) => println!("  {} {}", label.cyan(), reading.text()),
                (false, _) => println!("  {} {}", label, reading.text()),
            }
        }
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        if self.json_mode {
            let err = serde_json::json!({
                "type": "error",
                "message": message
            });
            eprintln!("{}", err);
            return;
        }

        if self.use_color {
            eprintln!("{} {}", "ERROR:".red().bold(), message);
        } else {
            eprintln!("ERROR: {}", message);
        }
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.json_mode {
            let warn = serde_json::json!({
                "type": "warning",
                "message": message
            });
            eprintln!("{}", warn);
            return;
        }

        if self.use_color {
            eprintln!("{} {}", "WARNING:".yellow().bold(), message);
        } else {
            eprintln!("WARNING: {}", message);
        }
    }

    /// Print an info message (respects verbosity)
    pub fn info(&self, message: &str) {
        if self.verbosity < 1 {
            return;
        }

        if self.json_mode {
            let info = serde_json::json!({
                "type": "info",
                "message": message
            });
            println!("{}", info);
            return;
        }

        if self.use_color {
            println!("{} {}", "INFO:".blue(), message);
        } else {
            println!("INFO: {}", message);
        }
    }

    /// Print a plain line (always shows)
    pub fn plain(&self, message: &str) {
        if self.json_mode {
            let line = serde_json::json!({
                "type": "message",
                "message": message
            });
            println!("{}", line);
            return;
        }

        println!("{}", message);
    }

    /// Print a table
    pub fn table(&self, headers: &[&str], rows: &[Vec<String>]) {
        if self.json_mode {
            let table = serde_json::json!({
                "type": "table",
                "headers": headers,
                "rows": rows
            });
            println!("{}", table);
            return;
        }

        // Calculate column widths
        let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
        for row in rows {
            for (i, cell) in row.iter().enumerate() {
                if i < widths.len() {
                    widths[i] = widths[i].max(cell.len());
                }
            }
        }

        let header_line = render_row(headers, &widths);
        let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        if self.use_color {
            println!("{}", header_line.bright_white().bold());
            println!("{}", sep.join("-+-").bright_black());
        } else {
            println!("{}", header_line);
            println!("{}", sep.join("-+-"));
        }

        for row in rows {
            let cells: Vec<&str> = row.iter().map(String::as_str).collect();
            println!("{}", render_row(&cells, &widths));
        }
    }

    /// Flush stdout
    pub fn flush(&self) {
        let _ = io::stdout().flush();
    }
}

fn render_row(cells: &[&str], widths: &[usize]) -> String {
    cells
        .iter()
        .enumerate()
        .map(|(i, cell)| format!("{:width$}", cell, width = widths.get(i).copied().unwrap_or(0)))
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Format a duration as a human-readable string
fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs > 0 {
        format!("{}.{:03}s", secs, millis)
    } else {
        format!("{}ms", millis)
    }
}
