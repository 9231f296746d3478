//! Error types for MLC tracking operations
//!
//! This module defines all error types that can occur while turning frames
//! into tracking messages, sending them, and reassembling them on the
//! receiving side.

use thiserror::Error;

/// MLC tracking error types
///
/// All operations in this library return `Result<T, TrackingError>` to provide
/// explicit error handling.
#[derive(Error, Debug)]
pub enum TrackingError {
    /// Could not establish the outbound connection
    ///
    /// This error occurs when:
    /// - The tracking consumer is not listening at the configured address
    /// - The address does not resolve
    /// - The connect timeout elapsed
    ///
    /// A session never processes frames without a live connection, so this
    /// error is always fatal for the session.
    ///
    /// # Example
    /// ```no_run
    /// # use mlc_tracking_rust::error::TrackingError;
    /// # use std::io;
    /// let err = TrackingError::Connect {
    ///     addr: "localhost:31000".to_string(),
    ///     source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
    /// };
    /// ```
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        /// Address that was dialled
        addr: String,
        /// Underlying socket error
        #[source]
        source: std::io::Error,
    },

    /// A required geometry field is absent from the frame or session
    ///
    /// No partial message is ever built when this happens.
    ///
    /// # Example
    /// ```no_run
    /// # use mlc_tracking_rust::error::TrackingError;
    /// let err = TrackingError::MissingField("field_of_view_mm");
    /// ```
    #[error("Missing metadata field: {0}")]
    MissingField(&'static str),

    /// Invalid message or buffer size
    ///
    /// This error occurs when:
    /// - A decode buffer is shorter than the fixed prefix plus payload
    /// - The declared payload size does not match the pixel count
    /// - Width or height does not fit the 32-bit wire field
    #[error("Invalid message size: expected {expected}, got {actual}")]
    InvalidSize {
        /// Expected size
        expected: usize,
        /// Actual size
        actual: usize,
    },

    /// Element count does not match the declared shape
    ///
    /// Reshapes never truncate or pad.
    #[error("Shape mismatch: cannot view {actual} elements as {expected:?}")]
    ShapeMismatch {
        /// Declared target shape
        expected: Vec<usize>,
        /// Number of elements actually present
        actual: usize,
    },

    /// The inference engine failed on a frame
    #[error("Inference failed: {0}")]
    Inference(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// I/O error occurred during network communication
    ///
    /// This error wraps standard library I/O errors and occurs when:
    /// - The connection was lost during a send (broken pipe)
    /// - A write timeout elapsed
    /// - The socket was shut down through a close handle
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TrackingError {
    /// Short name of the error category, used in operator logs
    ///
    /// # Examples
    ///
    /// ```
    /// use mlc_tracking_rust::error::TrackingError;
    ///
    /// let err = TrackingError::MissingField("position");
    /// assert_eq!(err.category(), "metadata");
    /// ```
    pub fn category(&self) -> &'static str {
        match self {
            TrackingError::Connect { .. } => "connection",
            TrackingError::MissingField(_) => "metadata",
            TrackingError::InvalidSize { .. } | TrackingError::ShapeMismatch { .. } => "shape",
            TrackingError::Inference(_) => "inference",
            TrackingError::InvalidConfig(_) | TrackingError::ConfigParse(_) => "config",
            TrackingError::Io(_) => "io",
        }
    }

    /// Render the `source()` chain below this error, outermost first
    ///
    /// Empty when the error has no underlying cause.
    pub fn source_chain(&self) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current = std::error::Error::source(self);
        while let Some(err) = current {
            chain.push(err.to_string());
            current = err.source();
        }
        chain
    }
}

/// Result type alias for MLC tracking operations
pub type Result<T> = std::result::Result<T, TrackingError>;
