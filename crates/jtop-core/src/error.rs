//! Error taxonomy for telemetry acquisition.
//!
//! Only [`ReaderError::Spawn`] is fatal to a dashboard run. Parse failures are
//! absorbed by the reader loop, and [`ReaderError::Terminated`] tells the
//! caller the run is over but the last reading is still available.

use thiserror::Error;

/// Why a single telemetry token was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Numeric part of a value does not parse as an integer or float.
    InvalidNumber,
    /// Value carries a unit suffix the parser does not know.
    UnknownUnit,
    /// A value appeared with no key in front of it.
    MissingKey,
    /// Key contains characters outside `[A-Za-z0-9_.-]`.
    InvalidKey,
    /// A bracketed list contains an empty item.
    EmptyListItem,
}

impl std::fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidNumber => write!(f, "invalid number"),
            Self::UnknownUnit => write!(f, "unknown unit"),
            Self::MissingKey => write!(f, "value without a key"),
            Self::InvalidKey => write!(f, "invalid key"),
            Self::EmptyListItem => write!(f, "empty list item"),
        }
    }
}

/// One producer line could not be turned into a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed token `{token}`: {kind}")]
pub struct ParseError {
    pub token: String,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub(crate) fn new(token: &str, kind: ParseErrorKind) -> Self {
        Self {
            token: token.to_string(),
            kind,
        }
    }
}

/// Lifecycle failures of the [`TelemetryReader`](crate::TelemetryReader).
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("failed to launch telemetry producer `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("telemetry reader is already running")]
    AlreadyRunning,

    #[error("telemetry producer terminated unexpectedly")]
    Terminated,

    #[error("telemetry reader is closed")]
    Closed,
}
