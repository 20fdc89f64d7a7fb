//! Error types surfaced by the controller.
//!
//! An unreachable host is deliberately absent here: every host-touching path
//! treats a collected host as a silent no-op.

use thiserror::Error;

pub type Result<T, E = WatchError> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchError {
    /// The controller was constructed without a live host.
    #[error("a time controller must be bound to a live host")]
    MissingHost,

    /// A user-supplied display pattern could not be compiled.
    #[error("invalid display pattern {pattern:?}: {reason}")]
    InvalidPattern {
        pattern: String,
        #[source]
        reason: PatternError,
    },

    /// A time-zone identifier is not in the IANA database.
    #[error("unknown time zone identifier {0:?}")]
    UnknownTimeZone(String),
}

/// Why a display pattern was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("pattern is empty")]
    Empty,
    #[error("unterminated quoted literal starting at offset {0}")]
    UnterminatedQuote(usize),
    #[error("unsupported pattern letter '{0}'")]
    UnsupportedLetter(char),
}
