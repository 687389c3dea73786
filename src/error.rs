//! Error types for the adsieve library.
//!
//! All fallible operations return [`AdsieveError`] through the [`Result`] alias.
//! Errors fall into three groups:
//!
//! - input errors: unreadable or malformed datasets, empty corpora, unknown labels
//! - consistency errors: corrupt artifact bundles detected at load time
//! - precondition errors: degenerate data such as a class too small to stratify
//!
//! # Examples
//!
//! ```
//! use adsieve::error::{AdsieveError, Result};
//!
//! fn example_operation() -> Result<()> {
//!     Err(AdsieveError::invalid_argument("Invalid input"))
//! }
//!
//! match example_operation() {
//!     Ok(_) => println!("Success"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::io;

use thiserror::Error;

/// The main error type for adsieve operations.
#[derive(Error, Debug)]
pub enum AdsieveError {
    /// I/O errors (dataset and artifact files)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// CSV decoding errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Dataset-level errors (missing columns, unknown labels, ...)
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// A vectorizer was fitted on zero documents
    #[error("Empty corpus: cannot fit a vectorizer on zero documents")]
    EmptyCorpus,

    /// A corpus produced no n-gram at all
    #[error("Empty vocabulary: the corpus of {documents} documents produced no n-gram")]
    EmptyVocabulary { documents: usize },

    /// Artifact bundle is inconsistent or damaged
    #[error("Corrupt artifact: {0}")]
    CorruptArtifact(String),

    /// Feature vector or model dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Precondition violated by the input data (e.g. a class too small to stratify)
    #[error("Precondition violated: {0}")]
    Precondition(String),

    /// Training failed
    #[error("Training error: {0}")]
    Training(String),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),

    /// Generic anyhow error
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with AdsieveError.
pub type Result<T> = std::result::Result<T, AdsieveError>;

impl AdsieveError {
    /// Create a new dataset error.
    pub fn dataset<S: Into<String>>(msg: S) -> Self {
        AdsieveError::Dataset(msg.into())
    }

    /// Create a new corrupt artifact error.
    pub fn corrupt<S: Into<String>>(msg: S) -> Self {
        AdsieveError::CorruptArtifact(msg.into())
    }

    /// Create a new precondition error.
    pub fn precondition<S: Into<String>>(msg: S) -> Self {
        AdsieveError::Precondition(msg.into())
    }

    /// Create a new training error.
    pub fn training<S: Into<String>>(msg: S) -> Self {
        AdsieveError::Training(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        AdsieveError::Other(msg.into())
    }

    /// Create a new invalid config error.
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        AdsieveError::Other(format!("Invalid configuration: {}", msg.into()))
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        AdsieveError::Other(format!("Invalid argument: {}", msg.into()))
    }
}
