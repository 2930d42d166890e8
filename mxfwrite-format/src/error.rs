//! Error types for the MXF authoring engine.

use crate::descriptor::EssenceType;
use mxfwrite_core::Rational;
use thiserror::Error;

/// Result type for MXF authoring operations.
pub type Result<T> = std::result::Result<T, MxfError>;

/// Errors raised while authoring MXF files.
#[derive(Error, Debug)]
pub enum MxfError {
    /// I/O error during create/write/seek.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid parameter provided by the caller.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Essence type / sample rate pair is not in the capability table.
    #[error("Unsupported sample rate {rate} for essence type {essence_type:?}")]
    UnsupportedSampleRate {
        essence_type: EssenceType,
        rate: Rational,
    },

    /// An operation was called in the wrong writer state.
    #[error("Invalid writer state: {operation} called while {state}")]
    StateMisuse {
        operation: &'static str,
        state: &'static str,
    },

    /// An index table invariant was violated.
    #[error("Index invariant violation: {0}")]
    IndexInvariantViolation(String),

    /// A format limit was exceeded.
    #[error("Format limit exceeded: {0}")]
    FormatLimit(String),

    /// Core timing/timecode error.
    #[error("Core error: {0}")]
    Core(#[from] mxfwrite_core::CoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MxfError::StateMisuse {
            operation: "write_samples",
            state: "new",
        };
        assert!(err.to_string().contains("write_samples"));

        let err = MxfError::UnsupportedSampleRate {
            essence_type: EssenceType::IecDv25,
            rate: Rational::new(24, 1),
        };
        assert!(err.to_string().contains("24"));
    }
}
