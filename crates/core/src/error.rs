// Error types for the load runner

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for runner operations
pub type Result<T> = std::result::Result<T, RunnerError>;

/// Errors that abort a run
///
/// Call failures are never represented here: they are recorded in the
/// metrics as data points.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Configuration did not pass validation
    #[error("invalid configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),

    /// The attack could not be set up (sample mode only)
    #[error("attack setup failed: {0}")]
    Setup(String),

    /// The report destination could not be created or written
    #[error("unable to write report to {}: {source}", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The report could not be serialized
    #[error("unable to serialize report: {0}")]
    Serialize(String),

    /// The metrics consumer task ended abnormally
    #[error("metrics aggregator failed: {0}")]
    Aggregator(String),

    /// A config file could not be read or parsed
    #[error("unable to load config from {}: {reason}", path.display())]
    ConfigFile { path: PathBuf, reason: String },
}

impl RunnerError {
    /// Validation problems, if this is a configuration error
    pub fn problems(&self) -> &[String] {
        match self {
            RunnerError::InvalidConfig(problems) => problems,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_message_lists_problems() {
        let err = RunnerError::InvalidConfig(vec!["rate must be > 0".into(), "bad".into()]);
        assert_eq!(
            err.to_string(),
            "invalid configuration: rate must be > 0; bad"
        );
        assert_eq!(err.problems().len(), 2);
    }

    #[test]
    fn test_problems_empty_for_other_errors() {
        let err = RunnerError::Aggregator("join error".into());
        assert!(err.problems().is_empty());
    }
}
