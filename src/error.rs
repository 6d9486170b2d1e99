//! Error types for the face tracking library.
//!
//! Numerical rejections (a Kalman update that did not converge, too little
//! skin mass in a colour update) are not errors; they live next to the code
//! that produces them as [`crate::kalman::Rejected`] and
//! [`crate::face::UpdateRejected`].

use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding failed
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Invalid input parameters provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Histogram channel ranges or resolution are unusable
    #[error("Invalid histogram range: {0}")]
    InvalidRange(String),

    /// Candidate script could not be read or parsed
    #[error("Candidate script error: {0}")]
    CandidateScript(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Convenience type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;
