// Stampede CLI
//
// Design Decision: Use clap derive for ergonomic argument parsing.
// Design Decision: Every flag has a STAMPEDE_* env fallback; a JSON config file is the base layer.
// Design Decision: Logs go to stderr, the report to stdout or --output.

mod attacks;
mod output;
mod telemetry;

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use stampede_core::{write_report, RampUpStrategy, ReportFormat, RunConfig, Runner, RunnerError};
use tracing::info;

use crate::attacks::AttackKind;
use crate::telemetry::TelemetryConfig;

#[derive(Parser, Debug)]
#[command(name = "stampede")]
#[command(about = "Stampede - drive a service at a target call rate and report latencies")]
#[command(version)]
pub struct Cli {
    /// Attack to run
    #[arg(value_enum)]
    pub attack: AttackKind,

    /// Target rate in calls per second
    #[arg(long, short, env = "STAMPEDE_RATE")]
    pub rate: Option<u32>,

    /// Total attack duration in seconds, ramp-up included
    #[arg(long, short, env = "STAMPEDE_DURATION")]
    pub duration: Option<u64>,

    /// Ramp-up duration in seconds (0 disables ramp-up)
    #[arg(long, env = "STAMPEDE_RAMP_UP")]
    pub ramp_up: Option<u64>,

    /// Maximum number of concurrent attackers
    #[arg(long, env = "STAMPEDE_MAX_ATTACKERS")]
    pub max_attackers: Option<usize>,

    /// Ramp-up strategy: linear or spawn-as-needed
    #[arg(long, env = "STAMPEDE_STRATEGY")]
    pub strategy: Option<RampUpStrategy>,

    /// Per-call timeout in milliseconds (0 disables it)
    #[arg(long, short, env = "STAMPEDE_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Log attacker lifecycle and ramp-up decisions
    #[arg(long, short, env = "STAMPEDE_VERBOSE")]
    pub verbose: bool,

    /// Write the report to this file instead of stdout
    #[arg(long, short, env = "STAMPEDE_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Report format: json, yaml or text
    #[arg(long, short, default_value = "json", env = "STAMPEDE_FORMAT")]
    pub format: ReportFormat,

    /// Attack parameter as key=value (repeatable)
    #[arg(long = "meta", short = 'm', value_parser = parse_key_value)]
    pub meta: Vec<(String, String)>,

    /// Load the run configuration from a JSON file; flags override it
    #[arg(long, short, env = "STAMPEDE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Perform N (at least 1) calls on a single attacker, print them and exit
    #[arg(long, short, env = "STAMPEDE_SAMPLE")]
    pub sample: Option<NonZeroUsize>,
}

impl Cli {
    /// Layer the flags over the config file (or the defaults)
    pub fn run_config(&self) -> anyhow::Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::from_json_file(path)?,
            None => RunConfig::default(),
        };

        if let Some(rate) = self.rate {
            config.rate = rate;
        }
        if let Some(seconds) = self.duration {
            config.duration = Duration::from_secs(seconds);
        }
        if let Some(seconds) = self.ramp_up {
            config.ramp_up = Duration::from_secs(seconds);
        }
        if let Some(max) = self.max_attackers {
            config.max_attackers = max;
        }
        if let Some(strategy) = self.strategy {
            config.ramp_up_strategy = strategy;
        }
        match self.timeout {
            Some(0) => config.call_timeout = None,
            Some(ms) => config.call_timeout = Some(Duration::from_millis(ms)),
            None => {}
        }
        if self.verbose {
            config.verbose = true;
        }
        if let Some(output) = &self.output {
            config.output = Some(output.clone());
        }
        for (key, value) in &self.meta {
            config.metadata.insert(key.clone(), value.clone());
        }

        Ok(config)
    }
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got '{}'", raw)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.run_config().context("failed to build run configuration")?;

    let telemetry = TelemetryConfig::from_env().with_verbose(config.verbose);
    telemetry::init_tracing(&telemetry);

    let format = cli.format;
    let runner = Runner::with_shared_factory(cli.attack.factory(), config);

    if let Some(count) = cli.sample {
        info!(attack = ?cli.attack, count = count.get(), "Sampling attack");
        let outcomes = runner.sample(count.get()).await.context("sample failed")?;
        output::print_sample(&outcomes, format)?;
        return Ok(());
    }

    let report = match runner.run().await {
        Ok(report) => report,
        Err(RunnerError::InvalidConfig(problems)) => {
            output::print_config_errors(&problems);
            std::process::exit(2);
        }
        Err(e) => return Err(e).context("run failed"),
    };

    write_report(&report, runner.config().output.as_deref(), format)
        .context("failed to write report")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["stampede"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = parse(&[
            "http",
            "--rate",
            "200",
            "--duration",
            "30",
            "--ramp-up",
            "5",
            "--max-attackers",
            "40",
            "--strategy",
            "exp2",
            "--timeout",
            "250",
            "-m",
            "url=http://localhost:8080/health",
            "-m",
            "method=POST",
        ]);
        assert_eq!(cli.attack, AttackKind::Http);

        let config = cli.run_config().unwrap();
        assert_eq!(config.rate, 200);
        assert_eq!(config.duration, Duration::from_secs(30));
        assert_eq!(config.ramp_up, Duration::from_secs(5));
        assert_eq!(config.max_attackers, 40);
        assert_eq!(config.ramp_up_strategy, RampUpStrategy::SpawnAsNeeded);
        assert_eq!(config.call_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.metadata("url"), Some("http://localhost:8080/health"));
        assert_eq!(config.metadata("method"), Some("POST"));
    }

    #[test]
    fn test_zero_timeout_disables_it() {
        let config = parse(&["sleep", "--timeout", "0"]).run_config().unwrap();
        assert_eq!(config.call_timeout, None);
    }

    #[test]
    fn test_config_file_is_the_base_layer() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"rate": 75, "max_attackers": 12, "metadata": {{"latency_ms": "5"}}}}"#)
            .unwrap();
        let path = file.path().to_str().unwrap();

        let config = parse(&["sleep", "--config", path, "--max-attackers", "3"])
            .run_config()
            .unwrap();
        assert_eq!(config.rate, 75);
        assert_eq!(config.max_attackers, 3);
        assert_eq!(config.metadata("latency_ms"), Some("5"));
    }

    #[test]
    fn test_bad_arguments_are_rejected() {
        assert!(Cli::try_parse_from(["stampede", "ftp"]).is_err());
        assert!(Cli::try_parse_from(["stampede", "http", "-m", "novalue"]).is_err());
        assert!(Cli::try_parse_from(["stampede", "http", "--strategy", "cubic"]).is_err());
        assert!(Cli::try_parse_from(["stampede", "http", "--format", "xml"]).is_err());
    }

    #[test]
    fn test_report_format() {
        assert_eq!(parse(&["sleep"]).format, ReportFormat::Json);
        assert_eq!(parse(&["sleep", "-f", "text"]).format, ReportFormat::Text);
        assert_eq!(parse(&["sleep", "--format", "yaml"]).format, ReportFormat::Yaml);
    }

    #[test]
    fn test_sample_count_must_be_positive() {
        assert!(Cli::try_parse_from(["stampede", "sleep", "--sample", "0"]).is_err());
        assert!(Cli::try_parse_from(["stampede", "sleep", "--sample", "-1"]).is_err());

        let cli = parse(&["sleep", "--sample", "3"]);
        assert_eq!(cli.sample.map(NonZeroUsize::get), Some(3));
    }

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("body=a=b"),
            Ok(("body".to_string(), "a=b".to_string()))
        );
        assert!(parse_key_value("=x").is_err());
    }
}
