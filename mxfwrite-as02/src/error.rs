//! Error types for AS-02 bundle writing.

use thiserror::Error;

/// Result type for AS-02 operations.
pub type Result<T> = std::result::Result<T, As02Error>;

/// Errors raised while writing an AS-02 bundle.
#[derive(Error, Debug)]
pub enum As02Error {
    /// I/O error on bundle files or directories.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from the MXF authoring engine.
    #[error("MXF error: {0}")]
    Mxf(#[from] mxfwrite_format::MxfError),

    /// XML serialization failed.
    #[error("XML error: {0}")]
    Xml(String),

    /// Invalid parameter provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A format limit was exceeded.
    #[error("Format limit exceeded: {0}")]
    FormatLimit(String),
}
