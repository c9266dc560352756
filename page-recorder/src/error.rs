//! Application-wide error types.

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
///
/// `Config`, `Display`, `Page` and `Encoder` are the fatal startup kinds and
/// carry their own process exit codes. `Interrupted` is a termination signal
/// that arrived before the session was running. Everything raised after the session is
/// running is absorbed by the orchestrator and only logged.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Display error: {0}")]
    Display(String),

    #[error("Page error: {0}")]
    Page(String),

    #[error("Encoder error: {0}")]
    Encoder(String),

    #[error("Upload error: {0}")]
    Upload(String),

    #[error("Interrupted: {0}")]
    Interrupted(String),

    #[error("Invalid state transition: cannot transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn display(msg: impl Into<String>) -> Self {
        Self::Display(msg.into())
    }

    pub fn page(msg: impl Into<String>) -> Self {
        Self::Page(msg.into())
    }

    pub fn encoder(msg: impl Into<String>) -> Self {
        Self::Encoder(msg.into())
    }

    pub fn upload(msg: impl Into<String>) -> Self {
        Self::Upload(msg.into())
    }

    pub fn interrupted(msg: impl Into<String>) -> Self {
        Self::Interrupted(msg.into())
    }

    /// Process exit code reported when this error aborts the recorder.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) | Self::Serialization(_) => 2,
            Self::Display(_) => 3,
            Self::Page(_) => 4,
            Self::Encoder(_) => 5,
            Self::Interrupted(_) => 130,
            _ => 1,
        }
    }
}
