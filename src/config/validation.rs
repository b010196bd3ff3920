//! Configuration errors, run-length parsing and store URL expansion.

use std::time::Duration;

use regex::Regex;
use thiserror::Error;

/// `${NAME}` or `${NAME:-fallback}`.
const ENV_REFERENCE: &str = r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}";

/// Words accepted by [`parse_run_duration`] for a run without an end.
const UNBOUNDED: [&str; 3] = ["0", "unbounded", "forever"];

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse YAML configuration.
    #[error("failed to parse YAML config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// A `${NAME}` reference without fallback names an unset or empty variable.
    #[error("environment variable '{0}' is unset or empty and has no default")]
    UnsetVariable(String),

    /// Configuration validation failed.
    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Parse a run length for the command line.
///
/// Takes humantime durations (`90s`, `1h30m`) as well as `0`, `unbounded`
/// and `forever`, which all yield [`Duration::ZERO`]: the pipeline then runs
/// until stopped.
///
/// # Examples
///
/// ```
/// use sensorgen::config::parse_run_duration;
///
/// assert_eq!(parse_run_duration("1h30m").unwrap().as_secs(), 5400);
/// assert!(parse_run_duration("unbounded").unwrap().is_zero());
/// assert!(parse_run_duration("ten minutes").is_err());
/// ```
pub fn parse_run_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("run duration is empty".to_string());
    }
    if UNBOUNDED.iter().any(|word| s.eq_ignore_ascii_case(word)) {
        return Ok(Duration::ZERO);
    }
    humantime::parse_duration(s).map_err(|e| {
        format!("invalid run duration '{s}': {e} (use e.g. 10m, 2h or 'unbounded')")
    })
}

/// Substitute `${NAME}` and `${NAME:-fallback}` references from the environment.
///
/// The fallback applies when the variable is unset or empty. Without a
/// fallback such a reference is an error, so a store URL never silently loses
/// a path segment.
pub fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let reference = Regex::new(ENV_REFERENCE).map_err(|e| {
        ConfigError::ValidationError(format!("environment reference pattern: {e}"))
    })?;

    let mut expanded = String::with_capacity(input.len());
    let mut copied_to = 0;
    for caps in reference.captures_iter(input) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        expanded.push_str(&input[copied_to..whole.start()]);

        let value = std::env::var(name.as_str())
            .ok()
            .filter(|value| !value.is_empty());
        match (value, caps.get(2)) {
            (Some(value), _) => expanded.push_str(&value),
            (None, Some(fallback)) => expanded.push_str(fallback.as_str()),
            (None, None) => return Err(ConfigError::UnsetVariable(name.as_str().to_string())),
        }
        copied_to = whole.end();
    }
    expanded.push_str(&input[copied_to..]);
    Ok(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_duration() {
        assert_eq!(parse_run_duration("5s").unwrap(), Duration::from_secs(5));
        assert_eq!(parse_run_duration(" 10m ").unwrap(), Duration::from_secs(600));
        assert_eq!(parse_run_duration("1d").unwrap(), Duration::from_secs(86400));
        for unbounded in ["0", "0s", "unbounded", "Forever"] {
            assert_eq!(parse_run_duration(unbounded).unwrap(), Duration::ZERO, "{unbounded}");
        }
    }

    #[test]
    fn test_parse_run_duration_invalid() {
        assert!(parse_run_duration("").is_err());
        assert!(parse_run_duration("30").is_err());
        let err = parse_run_duration("ten seconds").unwrap_err();
        assert!(err.contains("'ten seconds'"), "{err}");
    }

    #[test]
    fn test_plain_url_is_unchanged() {
        assert_eq!(
            expand_env_vars("sqlite:data/climate.db").unwrap(),
            "sqlite:data/climate.db"
        );
    }

    #[test]
    fn test_fallback_for_unset_or_empty_variable() {
        assert_eq!(
            expand_env_vars("sqlite:${SENSORGEN_TEST_MISSING_DIR:-data}/acc.db").unwrap(),
            "sqlite:data/acc.db"
        );
        assert_eq!(
            expand_env_vars("sqlite:${SENSORGEN_TEST_MISSING_DIR:-}acc.db").unwrap(),
            "sqlite:acc.db"
        );

        // SAFETY: Only this test touches this variable.
        unsafe {
            std::env::set_var("SENSORGEN_TEST_EMPTY_DIR", "");
        }
        let result = expand_env_vars("sqlite:${SENSORGEN_TEST_EMPTY_DIR:-data}/acc.db");
        // SAFETY: Cleanup test variable.
        unsafe {
            std::env::remove_var("SENSORGEN_TEST_EMPTY_DIR");
        }
        assert_eq!(result.unwrap(), "sqlite:data/acc.db");
    }

    #[test]
    fn test_variables_from_env() {
        // SAFETY: Only this test touches these variables.
        unsafe {
            std::env::set_var("SENSORGEN_TEST_DATA_DIR", "/var/lib/sensorgen");
            std::env::set_var("SENSORGEN_TEST_DB_NAME", "climate");
        }
        let result =
            expand_env_vars("sqlite:${SENSORGEN_TEST_DATA_DIR}/${SENSORGEN_TEST_DB_NAME:-x}.db");
        // SAFETY: Cleanup test variables.
        unsafe {
            std::env::remove_var("SENSORGEN_TEST_DATA_DIR");
            std::env::remove_var("SENSORGEN_TEST_DB_NAME");
        }
        assert_eq!(result.unwrap(), "sqlite:/var/lib/sensorgen/climate.db");
    }

    #[test]
    fn test_unset_variable_without_fallback_is_an_error() {
        match expand_env_vars("sqlite:${SENSORGEN_TEST_UNSET_DIR}/climate.db") {
            Err(ConfigError::UnsetVariable(name)) => assert_eq!(name, "SENSORGEN_TEST_UNSET_DIR"),
            other => panic!("expected UnsetVariable, got {other:?}"),
        }
    }
}
