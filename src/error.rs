use std::fmt::Display;
use std::path::PathBuf;

use crate::bootstrap::Format;
use crate::log::LoggableIoError;

pub type SupervisorResult<A> = std::result::Result<A, SupervisorError>;

pub type ConfigResult<A> = std::result::Result<A, ConfigError>;

/// A failure of a single supervision step.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, thiserror::Error)]
#[serde(tag = "code")]
pub enum SupervisorError {
    #[error("service {service:?} could not be started: {inner}")]
    StartProcessError {
        service: String,
        inner: LoggableIoError,
    },
    #[error("service {service:?} was not started because the run was cancelled")]
    StartCancelled { service: String },
    #[error("service {service:?} is already started")]
    AlreadyStarted { service: String },
    #[error("service {service:?} has no process to stop")]
    NotStarted { service: String },
    #[error("service {service:?} (process {process_id}) could not be killed: {inner}")]
    StopProcessError {
        service: String,
        process_id: u32,
        inner: LoggableIoError,
    },
    #[error("service {service:?} (process {process_id}) could not be reaped: {inner}")]
    WaitProcessError {
        service: String,
        process_id: u32,
        inner: LoggableIoError,
    },
    #[error("service {service:?} could not start a thread to watch its process: {inner}")]
    WatcherError {
        service: String,
        inner: LoggableIoError,
    },
    #[error("service {service:?} lost track of process {process_id}")]
    WatcherLost { service: String, process_id: u32 },
    #[error("context cancelled")]
    Cancelled,
    #[error("could not listen for termination signals: {0}")]
    SignalRegistrationError(LoggableIoError),
}

impl SupervisorError {
    /// The service the failure belongs to, if any.
    pub fn service(&self) -> Option<&str> {
        match self {
            Self::StartProcessError { service, .. }
            | Self::StartCancelled { service }
            | Self::AlreadyStarted { service }
            | Self::NotStarted { service }
            | Self::StopProcessError { service, .. }
            | Self::WaitProcessError { service, .. }
            | Self::WatcherError { service, .. }
            | Self::WatcherLost { service, .. } => Some(service),
            Self::Cancelled | Self::SignalRegistrationError(_) => None,
        }
    }
}

/// Every failure of a bulk operation, in the order they happened.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
#[serde(transparent)]
pub struct Errors(Vec<SupervisorError>);

impl Errors {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, error: SupervisorError) {
        self.0.push(error);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SupervisorError> {
        self.0.iter()
    }

    pub fn contains(&self, error: &SupervisorError) -> bool {
        self.0.contains(error)
    }

    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl From<SupervisorError> for Errors {
    fn from(value: SupervisorError) -> Self {
        Self(vec![value])
    }
}

impl FromIterator<SupervisorError> for Errors {
    fn from_iter<I: IntoIterator<Item = SupervisorError>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<SupervisorError> for Errors {
    fn extend<I: IntoIterator<Item = SupervisorError>>(&mut self, iter: I) {
        self.0.extend(iter)
    }
}

impl IntoIterator for Errors {
    type Item = SupervisorError;
    type IntoIter = std::vec::IntoIter<SupervisorError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Errors {
    type Item = &'a SupervisorError;
    type IntoIter = std::slice::Iter<'a, SupervisorError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Display for Errors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut errors = self.0.iter();
        if let Some(first) = errors.next() {
            write!(f, "{}", first)?;
        }
        for error in errors {
            write!(f, "\n{}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for Errors {}

/// A failure to load bootstrap documents. Nothing is applied when one occurs.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, thiserror::Error)]
#[serde(tag = "code")]
pub enum ConfigError {
    #[error("could not read {}: {inner}", .path.display())]
    ReadError {
        path: PathBuf,
        inner: LoggableIoError,
    },
    #[error("malformed {format} document: {message}")]
    ParseError { format: Format, message: String },
    #[error("unsupported version: {version}")]
    UnsupportedVersion { version: String },
    #[error("{}: {inner}", .path.display())]
    InvalidFile {
        path: PathBuf,
        inner: Box<ConfigError>,
    },
}
