//! Error types for the outage prober
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for prober operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the outage prober
#[derive(Error, Debug)]
pub enum Error {
    /// Serializing or writing an echo request failed
    #[error("Send error: {0}")]
    Send(String),

    /// Reading from the shared socket failed
    #[error("Receive error: {0}")]
    Receive(String),

    /// An inbound packet could not be parsed as ICMP
    #[error("Parse error: {0}")]
    Parse(String),

    /// The event sink could not persist a record
    ///
    /// Always fatal: the orchestrator stops every task when it sees one.
    #[error("Event sink error: {0}")]
    Sink(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Raw I/O errors (socket setup, file creation)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A monitoring task panicked or was aborted
    #[error("Task error: {0}")]
    Task(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a send error
    pub fn send(msg: impl Into<String>) -> Self {
        Self::Send(msg.into())
    }

    /// Create a receive error
    pub fn receive(msg: impl Into<String>) -> Self {
        Self::Receive(msg.into())
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create an event sink error
    pub fn sink(msg: impl Into<String>) -> Self {
        Self::Sink(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a task error
    pub fn task(msg: impl Into<String>) -> Self {
        Self::Task(msg.into())
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
