//! Structured logging for the supervisor.
//!
//! Records are written to stderr, one per line. Each record carries a
//! timestamp, a severity and any number of named values:
//!
//! ```ignore
//! log::info!(event = "START", service = self.info())
//! ```
//!
//! Values can be anything serializable by `serde`. A variable can be passed
//! by name alone:
//!
//! ```ignore
//! log::error!(event = "STOP_FAILED", error)
//! ```
//!
//! When stderr is a terminal, records are rendered as text; otherwise they are
//! written as JSON. Both the format and the minimum severity can be overridden
//! with [`configure`].

use std::io::Write;
use std::sync::{PoisonError, RwLock};

use lazy_static::lazy_static;

pub trait Loggable {
    type Serialized;

    fn log(&self) -> Self::Serialized;
}

impl Loggable for std::io::Error {
    type Serialized = LoggableIoError;

    fn log(&self) -> Self::Serialized {
        self.into()
    }
}

/// A serializable snapshot of an [`std::io::Error`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LoggableIoError {
    kind: String,
    message: String,
}

impl LoggableIoError {
    pub fn kind(&self) -> &str {
        &self.kind
    }
}

impl From<&std::io::Error> for LoggableIoError {
    fn from(value: &std::io::Error) -> Self {
        Self {
            kind: format!("{:?}", value.kind()),
            message: value.to_string(),
        }
    }
}

impl From<std::io::Error> for LoggableIoError {
    fn from(value: std::io::Error) -> Self {
        (&value).into()
    }
}

impl std::fmt::Display for LoggableIoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    serde::Serialize,
    serde::Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    fn label(self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO ",
            Self::Warning => "WARN ",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        }
    }
}

#[allow(unused_macros)]
macro_rules! trace {
    ( $($tokens:tt)+ ) => {
        $crate::log::log!($crate::log::Severity::Trace, $($tokens)+)
    };
}

#[allow(unused_macros)]
macro_rules! debug {
    ( $($tokens:tt)+ ) => {
        $crate::log::log!($crate::log::Severity::Debug, $($tokens)+)
    };
}

#[allow(unused_macros)]
macro_rules! info {
    ( $($tokens:tt)+ ) => {
        $crate::log::log!($crate::log::Severity::Info, $($tokens)+)
    };
}

#[allow(unused_macros)]
macro_rules! warning {
    ( $($tokens:tt)+ ) => {
        $crate::log::log!($crate::log::Severity::Warning, $($tokens)+)
    };
}

#[allow(unused_macros)]
macro_rules! error {
    ( $($tokens:tt)+ ) => {
        $crate::log::log!($crate::log::Severity::Error, $($tokens)+)
    };
}

#[allow(unused_macros)]
macro_rules! fatal {
    ( $($tokens:tt)+ ) => {
        $crate::log::log!($crate::log::Severity::Fatal, $($tokens)+)
    };
}

/// Writes a record to stderr, if `severity` passes the configured threshold.
///
/// ```ignore
/// log!(Severity::Debug, name = "value", ...)
/// ```
macro_rules! log {
    ( $severity:expr, $($rest:tt)+ ) => {{
        let severity = $severity;
        if $crate::log::enabled(severity) {
            $crate::log::log_explicitly!(
                std::io::stderr(),
                $crate::log::global_log_format(),
                chrono::offset::Utc::now(),
                severity,
                $($rest)+
            )
        }
    }};
}

/// Writes a record unconditionally. Used directly by the tests.
#[doc(hidden)]
macro_rules! log_explicitly {
    ( $output:expr, $log_format:expr, $timestamp:expr, $severity:expr, $($rest:tt)+ ) => {{
        #[allow(unused_imports)]
        use $crate::log::Loggable;
        let mut record = $crate::log::Record::new($log_format, $timestamp, $severity);
        $crate::log::add_log_pairs!(record, $($rest)+);
        record.write($output);
    }};
}

#[doc(hidden)]
macro_rules! add_log_pairs {
    ( $record:ident, $name:ident = $value:expr, $($rest:tt)* ) => {
        $crate::log::add_log_pairs!($record, $name = $value);
        $crate::log::add_log_pairs!($record, $($rest)*)
    };

    ( $record:ident, $name:ident = $value:expr ) => {
        $record.add(stringify!($name), &$value);
    };

    ( $record:ident, $name:ident, $($rest:tt)* ) => {
        $crate::log::add_log_pairs!($record, $name);
        $crate::log::add_log_pairs!($record, $($rest)*)
    };

    ( $record:ident, $name:ident ) => {
        $crate::log::add_log_pairs!($record, $name = $name);
    };

    ( $record:ident, ) => {};
}

pub(crate) use add_log_pairs;
pub(crate) use log;
pub(crate) use log_explicitly;

#[allow(unused_imports)]
pub(crate) use debug;
#[allow(unused_imports)]
pub(crate) use error;
#[allow(unused_imports)]
pub(crate) use fatal;
#[allow(unused_imports)]
pub(crate) use info;
#[allow(unused_imports)]
pub(crate) use trace;
#[allow(unused_imports)]
pub(crate) use warning;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    Json,
    Text,
}

/// A single record under construction.
pub enum Record {
    Json(serde_json::map::Map<String, serde_json::Value>),
    Text {
        timestamp: chrono::DateTime<chrono::FixedOffset>,
        severity: Severity,
        pairs: Vec<(String, String)>,
    },
}

impl Record {
    pub fn new(
        format: LogFormat,
        timestamp: chrono::DateTime<impl chrono::TimeZone>,
        severity: Severity,
    ) -> Self {
        let timestamp = timestamp.fixed_offset();
        match format {
            LogFormat::Json => {
                let mut object = serde_json::map::Map::new();
                object.insert(
                    "timestamp".to_owned(),
                    serde_json::Value::String(
                        timestamp.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true),
                    ),
                );
                object.insert(
                    "severity".to_owned(),
                    serde_json::to_value(severity).unwrap_or(serde_json::Value::Null),
                );
                Self::Json(object)
            }
            LogFormat::Text => Self::Text {
                timestamp,
                severity,
                pairs: Vec::new(),
            },
        }
    }

    pub fn add(&mut self, name: &str, value: &dyn erased_serde::Serialize) {
        match self {
            Self::Json(object) => {
                let value = serde_json::to_value(value).unwrap_or_else(|error| {
                    serde_json::Value::String(format!("<unserializable: {}>", error))
                });
                object.insert(name.to_owned(), value);
            }
            Self::Text { pairs, .. } => {
                let value = TEXT_SERIALIZER
                    .to_string(value)
                    .unwrap_or_else(|error| format!("<unserializable: {}>", error));
                pairs.push((name.to_owned(), value));
            }
        }
    }

    /// Logging must never take the supervisor down, so write failures are dropped.
    pub fn write(&self, mut writer: impl Write) {
        let line = match self {
            Self::Json(object) => match serde_json::to_string(object) {
                Ok(line) => line,
                Err(_) => return,
            },
            Self::Text {
                timestamp,
                severity,
                pairs,
            } => {
                let mut line = format!(
                    "{} [{}]",
                    timestamp.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                    severity.label()
                );
                for (index, (name, value)) in pairs.iter().enumerate() {
                    let separator = if index == 0 { " " } else { ", " };
                    line.push_str(&format!("{}{} = {}", separator, name, value));
                }
                line
            }
        };
        let _ = writeln!(writer, "{}", line);
    }
}

#[derive(Debug, Clone, Copy)]
struct Settings {
    format: LogFormat,
    threshold: Severity,
}

lazy_static! {
    static ref TEXT_SERIALIZER: ron::Options = ron::Options::default()
        .with_default_extension(ron::extensions::Extensions::IMPLICIT_SOME)
        .with_default_extension(ron::extensions::Extensions::UNWRAP_NEWTYPES)
        .with_default_extension(ron::extensions::Extensions::UNWRAP_VARIANT_NEWTYPES);
    static ref SETTINGS: RwLock<Settings> = RwLock::new(Settings {
        format: detect_log_format(),
        threshold: Severity::Info,
    });
}

fn detect_log_format() -> LogFormat {
    if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
        LogFormat::Text
    } else {
        LogFormat::Json
    }
}

/// Overrides the output format (or re-detects it, given `None`) and sets the
/// minimum severity that gets written.
pub fn configure(format: Option<LogFormat>, threshold: Severity) {
    let mut settings = SETTINGS.write().unwrap_or_else(PoisonError::into_inner);
    *settings = Settings {
        format: format.unwrap_or_else(detect_log_format),
        threshold,
    };
}

fn settings() -> Settings {
    *SETTINGS.read().unwrap_or_else(PoisonError::into_inner)
}

pub fn global_log_format() -> LogFormat {
    settings().format
}

pub fn enabled(severity: Severity) -> bool {
    severity >= settings().threshold
}
