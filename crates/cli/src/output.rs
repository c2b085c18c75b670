// Output formatting for CLI

use serde::Serialize;
use stampede_core::{CallOutcome, ReportFormat};

/// Serializable view of one sample call
#[derive(Debug, Serialize)]
pub struct SampleRow {
    pub call: usize,
    pub label: String,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub latency_ms: f64,
}

impl SampleRow {
    pub fn new(call: usize, outcome: &CallOutcome) -> Self {
        Self {
            call,
            label: outcome.label().to_string(),
            status: outcome.result.status,
            error: outcome.result.error.clone(),
            latency_ms: outcome.latency.as_nanos() as f64 / 1_000_000.0,
        }
    }
}

/// Print sample outcomes in the requested format
pub fn print_sample(outcomes: &[CallOutcome], format: ReportFormat) -> anyhow::Result<()> {
    let rows: Vec<SampleRow> = outcomes
        .iter()
        .enumerate()
        .map(|(i, outcome)| SampleRow::new(i + 1, outcome))
        .collect();

    match format {
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&rows)?),
        ReportFormat::Yaml => print!("{}", serde_yaml::to_string(&rows)?),
        ReportFormat::Text => {
            let columns = [("CALL", 6), ("LABEL", 20), ("STATUS", 8), ("LATENCY", 12), ("ERROR", 40)];
            print_table_header(&columns);
            for row in &rows {
                let call = row.call.to_string();
                let status = row.status.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string());
                let latency = format!("{:.2}ms", row.latency_ms);
                let error = row.error.as_deref().unwrap_or("-");
                print_table_row(&[
                    (call.as_str(), 6),
                    (row.label.as_str(), 20),
                    (status.as_str(), 8),
                    (latency.as_str(), 12),
                    (error, 40),
                ]);
            }
        }
    }
    Ok(())
}

/// Print configuration problems, one per line
pub fn print_config_errors(problems: &[String]) {
    for problem in problems {
        eprintln!("[config error] {}", problem);
    }
}

/// Print a table header
fn print_table_header(columns: &[(&str, usize)]) {
    let header: String = columns
        .iter()
        .map(|(name, width)| format!("{:<width$}", name, width = width))
        .collect::<Vec<_>>()
        .join("  ");
    println!("{}", header);
}

/// Print a table row, truncating values that do not fit
fn print_table_row(values: &[(&str, usize)]) {
    let row: String = values
        .iter()
        .map(|(val, width)| format!("{:<width$}", truncate(val, *width), width = width))
        .collect::<Vec<_>>()
        .join("  ");
    println!("{}", row);
}

fn truncate(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_string();
    }
    let kept: String = value.chars().take(width.saturating_sub(3)).collect();
    format!("{}...", kept)
}
