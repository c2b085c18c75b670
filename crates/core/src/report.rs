//! Run report assembly and output
//!
//! A [`RunReport`] is built exactly once, after the pool is torn down and
//! the aggregator has finalized every record.

use std::fmt::Write as _;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::RunConfig;
use crate::error::{Result, RunnerError};
use crate::metrics::MetricsMap;
use crate::rampup::RampUpSummary;

/// Immutable summary of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    /// Start of the steady-state phase
    pub started_at: DateTime<Utc>,
    /// End of the steady-state phase
    pub finished_at: DateTime<Utc>,
    pub config: RunConfig,
    /// Pool size at shutdown
    pub attackers: usize,
    pub ramp_up: Option<RampUpSummary>,
    /// Steady-state metrics per label
    pub metrics: MetricsMap,
}

impl RunReport {
    /// Calls over all labels
    pub fn total_requests(&self) -> u64 {
        self.metrics.values().map(|m| m.requests).sum()
    }

    /// Errors over all labels
    pub fn total_errors(&self) -> u64 {
        self.metrics.values().map(|m| m.errors).sum()
    }

    /// Length of the steady-state phase
    pub fn elapsed(&self) -> Duration {
        (self.finished_at - self.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Calls per second over the steady-state phase
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.total_requests() as f64 / elapsed
    }
}

/// Report document format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportFormat {
    /// Indented JSON
    #[default]
    Json,
    Yaml,
    /// Human-readable table
    Text,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "json" => Ok(ReportFormat::Json),
            "yaml" => Ok(ReportFormat::Yaml),
            "text" => Ok(ReportFormat::Text),
            other => Err(format!("unknown report format '{}'", other)),
        }
    }
}

/// Render the report as a document
pub fn render(report: &RunReport, format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Json => serde_json::to_string_pretty(report)
            .map_err(|e| RunnerError::Serialize(e.to_string())),
        ReportFormat::Yaml => {
            serde_yaml::to_string(report).map_err(|e| RunnerError::Serialize(e.to_string()))
        }
        ReportFormat::Text => Ok(render_text(report)),
    }
}

/// Write the report to `destination`, or stdout when there is none
///
/// Failing to create the destination is an error; the caller decides
/// whether that ends the process.
pub fn write_report(
    report: &RunReport,
    destination: Option<&Path>,
    format: ReportFormat,
) -> Result<()> {
    let mut document = render(report, format)?;
    document.push('\n');

    match destination {
        Some(path) => {
            let output_error = |source| RunnerError::Output {
                path: path.to_path_buf(),
                source,
            };
            let mut file = File::create(path).map_err(output_error)?;
            file.write_all(document.as_bytes()).map_err(output_error)?;
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(document.as_bytes())
                .and_then(|_| stdout.flush())
                .map_err(|source| RunnerError::Output {
                    path: PathBuf::from("<stdout>"),
                    source,
                })?;
        }
    }
    Ok(())
}

fn render_text(report: &RunReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Run {}", report.run_id);
    let _ = writeln!(
        out,
        "  Target:      {} calls/sec for {:?} (ramp-up {:?}, {})",
        report.config.rate,
        report.config.duration,
        report.config.ramp_up,
        report.config.ramp_up_strategy
    );
    let _ = writeln!(out, "  Attackers:   {}", report.attackers);
    let _ = writeln!(out, "  Duration:    {:.2}s", report.elapsed().as_secs_f64());
    let _ = writeln!(out, "  Requests:    {}", report.total_requests());
    let _ = writeln!(out, "  Errors:      {}", report.total_errors());
    let _ = writeln!(out, "  Throughput:  {:.1} calls/sec", report.throughput());

    if report.metrics.is_empty() {
        let _ = writeln!(out, "\n  (no calls recorded)");
        return out;
    }

    let _ = writeln!(
        out,
        "\n  {:<24} {:>8} {:>7} {:>9} {:>9} {:>9} {:>9} {:>9}",
        "label", "requests", "errors", "rate", "mean_ms", "p50_ms", "p95_ms", "p99_ms"
    );
    for (label, m) in &report.metrics {
        let _ = writeln!(
            out,
            "  {:<24} {:>8} {:>7} {:>9.1} {:>9.2} {:>9.2} {:>9.2} {:>9.2}",
            label,
            m.requests,
            m.errors,
            m.rate,
            millis(m.latencies.mean),
            millis(m.latencies.p50),
            millis(m.latencies.p95),
            millis(m.latencies.p99),
        );
    }
    out
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attack::{AggregationTarget, CallOutcome, CallResult};
    use crate::metrics::Metrics;

    fn report() -> RunReport {
        let started_at = Utc::now();
        let mut metrics = Metrics::new();
        for ms in [10, 20, 30] {
            metrics.add(&CallOutcome::new(
                CallResult::success("get").with_status(200),
                started_at,
                Duration::from_millis(ms),
                AggregationTarget::Cumulative,
            ));
        }
        metrics.add(&CallOutcome::new(
            CallResult::failure("get", "reset by peer"),
            started_at,
            Duration::from_millis(5),
            AggregationTarget::Cumulative,
        ));
        metrics.finalize();

        RunReport {
            run_id: Uuid::now_v7(),
            started_at,
            finished_at: started_at + chrono::Duration::seconds(2),
            config: RunConfig::new(2, Duration::from_secs(2)),
            attackers: 1,
            ramp_up: None,
            metrics: MetricsMap::from([("get".to_string(), metrics)]),
        }
    }

    #[test]
    fn test_totals() {
        let report = report();
        assert_eq!(report.total_requests(), 4);
        assert_eq!(report.total_errors(), 1);
        assert_eq!(report.elapsed(), Duration::from_secs(2));
        assert_eq!(report.throughput(), 2.0);
    }

    #[test]
    fn test_json_is_indented_and_keyed() {
        let json = render(&report(), ReportFormat::Json).unwrap();
        assert!(json.contains("\n  \"run_id\""));

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["metrics"]["get"]["requests"], 4);
        assert_eq!(value["config"]["rate"], 2);
    }

    #[test]
    fn test_yaml_and_text() {
        let yaml = render(&report(), ReportFormat::Yaml).unwrap();
        assert!(yaml.contains("metrics:"));

        let text = render(&report(), ReportFormat::Text).unwrap();
        assert!(text.contains("Requests:    4"));
        assert!(text.contains("get"));
    }

    #[test]
    fn test_write_report_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");

        write_report(&report(), Some(&path), ReportFormat::Json).unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["attackers"], 1);
    }

    #[test]
    fn test_uncreatable_destination_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("report.json");

        let err = write_report(&report(), Some(&path), ReportFormat::Json).unwrap_err();
        assert!(matches!(err, RunnerError::Output { .. }));
    }

    #[test]
    fn test_parse_format() {
        assert_eq!("yaml".parse::<ReportFormat>(), Ok(ReportFormat::Yaml));
        assert!("xml".parse::<ReportFormat>().is_err());
    }
}
