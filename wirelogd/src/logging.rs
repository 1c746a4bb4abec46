// Log output setup

//! Log output
//!
//! Lines are rendered as `LEVEL - message` text or as one JSON object per
//! line, and written to stdout, stderr, an appended file or the local syslog.
//! Transition events are logged under [`EVENT_TARGET`] so the JSON format can
//! embed them as structured fields instead of a preformatted string.

use crate::config::ConfigError;
use crate::types::TransitionEvent;
use anyhow::{anyhow, Context, Result};
use env_logger::{Env, Target};
use log::{Level, LevelFilter};
use serde_json::{json, Value};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use syslog::{BasicLogger, Facility, Formatter3164};

/// Log target used for peer transition events
pub const EVENT_TARGET: &str = "wirelogd::event";

/// Rendering of log lines
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// `LEVEL - message`
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(ConfigError::Invalid {
                key: "log-format".to_string(),
                reason: format!("expected text or json, got {:?}", value),
            }),
        }
    }
}

/// Where log lines go
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LogDestination {
    /// Standard output
    Stdout,
    /// Standard error
    #[default]
    Stderr,
    /// Local syslog daemon, `daemon` facility
    Syslog,
    /// File opened in append mode, created if needed
    File(PathBuf),
}

impl FromStr for LogDestination {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "" => Err(ConfigError::Invalid {
                key: "log-destination".to_string(),
                reason: "empty destination".to_string(),
            }),
            name if name.eq_ignore_ascii_case("stdout") => Ok(LogDestination::Stdout),
            name if name.eq_ignore_ascii_case("stderr") => Ok(LogDestination::Stderr),
            name if name.eq_ignore_ascii_case("syslog") => Ok(LogDestination::Syslog),
            path => Ok(LogDestination::File(PathBuf::from(path))),
        }
    }
}

/// Message logged for a transition event
pub fn render_event(event: &TransitionEvent, format: LogFormat) -> String {
    match format {
        LogFormat::Text => event.to_string(),
        LogFormat::Json => serde_json::to_string(event).unwrap_or_else(|_| event.to_string()),
    }
}

/// Full output line for one log record
///
/// In JSON mode a record logged under [`EVENT_TARGET`] whose message is a
/// JSON object is embedded as the `event` field.
pub fn render_line(
    format: LogFormat,
    time: &str,
    level: Level,
    target: &str,
    message: &str,
) -> String {
    match format {
        LogFormat::Text => format!("{} - {}", level, message),
        LogFormat::Json => {
            let event = (target == EVENT_TARGET)
                .then(|| serde_json::from_str::<Value>(message).ok())
                .flatten()
                .filter(Value::is_object);

            let line = match event {
                Some(event) => json!({ "time": time, "level": level.as_str(), "event": event }),
                None => json!({ "time": time, "level": level.as_str(), "msg": message }),
            };
            line.to_string()
        }
    }
}

/// Install the global logger
///
/// `RUST_LOG` still overrides the level for the stream and file outputs.
pub fn init(debug: bool, format: LogFormat, destination: &LogDestination) -> Result<()> {
    let level = if debug { LevelFilter::Debug } else { LevelFilter::Info };

    let target = match destination {
        LogDestination::Syslog => return init_syslog(level),
        LogDestination::Stdout => Target::Stdout,
        LogDestination::Stderr => Target::Stderr,
        LogDestination::File(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {:?}", path))?;
            Target::Pipe(Box::new(file))
        }
    };

    let filter = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(filter))
        .target(target)
        .format(move |buf, record| {
            let time = buf.timestamp().to_string();
            let message = record.args().to_string();
            writeln!(
                buf,
                "{}",
                render_line(format, &time, record.level(), record.target(), &message)
            )
        })
        .try_init()
        .context("Failed to initialize logger")
}

fn init_syslog(level: LevelFilter) -> Result<()> {
    let formatter = Formatter3164 {
        facility: Facility::LOG_DAEMON,
        hostname: None,
        process: "wirelogd".to_string(),
        pid: std::process::id(),
    };
    let logger =
        syslog::unix(formatter).map_err(|e| anyhow!("Failed to connect to syslog: {}", e))?;

    log::set_boxed_logger(Box::new(BasicLogger::new(logger)))
        .context("Failed to initialize logger")?;
    log::set_max_level(level);
    Ok(())
}
