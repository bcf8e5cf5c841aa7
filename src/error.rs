//! Error types for the assistant.

use thiserror::Error;

/// Result type alias using the bot error type.
pub type Result<T> = std::result::Result<T, BotError>;

/// Unified error type for the assistant.
///
/// "Zero rows matched" is deliberately not an error: queries return an
/// empty `Vec` and handlers reply with the dataset-specific not-found
/// message instead of the generic apology.
#[derive(Error, Debug)]
pub enum BotError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Dataset file unavailable or unreadable
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV-level parse failure (bad quoting, invalid UTF-8, ...)
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A data line whose field count differs from the header
    #[error("Malformed row in {path} at line {line}: expected {expected} fields, got {got}")]
    Format {
        path: String,
        line: u64,
        expected: usize,
        got: usize,
    },

    /// Tile fetch / gateway HTTP failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Map compositing or encoding failure
    #[error("Render error: {0}")]
    Render(String),

    /// Chat gateway rejected a send
    #[error("Message send failed: {0}")]
    SendFailed(String),
}

impl From<image::ImageError> for BotError {
    fn from(e: image::ImageError) -> Self {
        Self::Render(e.to_string())
    }
}
