//! Errors in the library.
use thiserror::Error;

/// Errors raised by the training infrastructure.
///
/// Functions returning [`anyhow::Result`] wrap these, so callers can
/// recover the variant with `err.downcast_ref::<KestrelError>()`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KestrelError {
    /// A configuration value is out of its valid range.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Fewer transitions are stored than requested.
    #[error("Insufficient data: requested {requested}, stored {stored}")]
    InsufficientData {
        /// Number of requested items.
        requested: usize,

        /// Number of stored items.
        stored: usize,
    },

    /// The shapes of an environment conflict with those an agent was built for.
    #[error("Shape mismatch: expected {expected}, found {found}")]
    ShapeMismatch {
        /// Shape the agent holds.
        expected: String,

        /// Shape that was given.
        found: String,
    },

    /// The agent has not been built against an environment yet.
    #[error("Agent has not been built against an environment")]
    MissingEnvironment,

    /// Key is not found in a record.
    #[error("Record key error: {0}")]
    RecordKeyError(String),

    /// Value of a record has a different type.
    #[error("Record value type error: {0}")]
    RecordValueTypeError(String),
}
