//! Tracing setup for the client.
//!
//! A bare level such as `debug` applies to this crate only; dependencies
//! (hyper, reqwest, tungstenite) stay at `warn` so a verbose run shows the
//! connection lifecycle rather than HTTP internals. Full directives are
//! passed through untouched.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::error::AppError;

/// Target prefix shared by the library and the binary.
const CRATE_TARGET: &str = "quadrant_live";

/// Level applied to every other target when a bare level is given.
const DEPENDENCY_LEVEL: &str = "warn";

/// Install the global subscriber. Call once, after `-v` flags and config
/// have been merged into `level`.
///
/// `prefer_level` decides who wins against `RUST_LOG`: with it set (a CLI
/// flag was given) `level` wins; otherwise `RUST_LOG` wins. The loser is
/// the fallback when the winner does not parse.
pub fn init(level: &str, prefer_level: bool, log_file: Option<&Path>) -> Result<(), AppError> {
    tracing_subscriber::fmt()
        .with_env_filter(build_filter(level, prefer_level)?)
        .with_writer(build_writer(log_file)?)
        .try_init()
        .map_err(|e| AppError::Logger(format!("failed to set subscriber: {e}")))
}

/// Expand a bare level into a crate-scoped directive.
///
/// `error` and `warn` are already as quiet as the dependency floor, so they
/// apply globally.
pub fn directive(level: &str) -> String {
    if level.contains(['=', ',']) {
        return level.to_string();
    }
    match parse_level(level) {
        Ok(filter) if filter <= LevelFilter::WARN => level.to_string(),
        _ => format!("{DEPENDENCY_LEVEL},{CRATE_TARGET}={level}"),
    }
}

fn build_filter(level: &str, prefer_level: bool) -> Result<EnvFilter, AppError> {
    let from_level = || EnvFilter::try_new(directive(level)).map_err(|e| e.to_string());
    let picked = if prefer_level {
        from_level().or_else(|_| EnvFilter::try_from_default_env().map_err(|e| e.to_string()))
    } else {
        EnvFilter::try_from_default_env().or_else(|_| from_level())
    };
    picked.map_err(|e| AppError::Logger(format!("invalid log level '{level}': {e}")))
}

/// Stderr by default; an append-mode file when one is configured.
fn build_writer(log_file: Option<&Path>) -> Result<BoxMakeWriter, AppError> {
    let Some(path) = log_file else {
        return Ok(BoxMakeWriter::new(std::io::stderr));
    };
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| AppError::Logger(format!("cannot open log file {}: {e}", path.display())))?;
    Ok(BoxMakeWriter::new(Mutex::new(file)))
}

/// Check a bare level name.
pub fn parse_level(level: &str) -> Result<LevelFilter, AppError> {
    if level.is_empty() {
        return Err(AppError::Logger("log level must not be empty".into()));
    }
    level
        .parse::<LevelFilter>()
        .map_err(|_| AppError::Logger(format!("unrecognised log level: '{level}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_levels_parse() {
        for l in ["error", "warn", "info", "debug", "trace"] {
            assert!(parse_level(l).is_ok(), "'{l}' should parse");
        }
        assert!(parse_level("verbose").is_err());
        assert!(parse_level("").is_err());
    }

    #[test]
    fn verbose_levels_are_scoped_to_this_crate() {
        assert_eq!(directive("debug"), "warn,quadrant_live=debug");
        assert_eq!(directive("trace"), "warn,quadrant_live=trace");
        assert_eq!(directive("info"), "warn,quadrant_live=info");
    }

    #[test]
    fn quiet_levels_and_directives_pass_through() {
        assert_eq!(directive("warn"), "warn");
        assert_eq!(directive("error"), "error");
        assert_eq!(directive("quadrant_live=trace,hyper=debug"), "quadrant_live=trace,hyper=debug");
    }

    #[test]
    fn directory_as_log_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        match build_writer(Some(dir.path())) {
            Err(AppError::Logger(msg)) => assert!(msg.contains("log file")),
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("a directory should not open as a log file"),
        }
    }

    #[test]
    fn second_init_is_rejected_not_fatal() {
        // Another test may have installed the subscriber first.
        match init("info", false, None) {
            Ok(()) => {}
            Err(AppError::Logger(msg)) => assert!(msg.contains("set subscriber")),
            Err(e) => panic!("unexpected error: {e}"),
        }
        assert!(init("info", false, None).is_err());
    }
}
