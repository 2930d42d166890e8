//! Error types for the core timing and identifier utilities.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by the core types.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A timecode component is out of range for its timecode base.
    #[error("Invalid timecode {component}: {value} (maximum {max})")]
    InvalidTimecodeComponent {
        component: &'static str,
        value: u32,
        max: u32,
    },

    /// Drop-frame requested for a timecode base that does not support it.
    #[error("Drop frame is not supported for timecode base {0}")]
    InvalidDropFrameBase(u16),

    /// A buffer passed to an encode/decode function is too small.
    #[error("Buffer too small: need {needed} bytes, have {available}")]
    BufferTooSmall { needed: usize, available: usize },

    /// Invalid parameter provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::InvalidTimecodeComponent {
            component: "minutes",
            value: 61,
            max: 59,
        };
        assert!(err.to_string().contains("minutes"));
        assert!(err.to_string().contains("61"));

        let err = CoreError::BufferTooSmall {
            needed: 4,
            available: 2,
        };
        assert!(err.to_string().contains("4"));
    }
}
