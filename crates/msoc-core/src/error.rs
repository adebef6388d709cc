//! Error types for MicroSociety

use thiserror::Error;

/// Main error type for the world simulation
#[derive(Error, Debug)]
pub enum SocietyError {
    #[error("Invalid action: {0}")]
    InvalidAction(String),

    #[error("Position out of bounds: ({x}, {y})")]
    OutOfBounds { x: i32, y: i32 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for world operations
pub type Result<T> = std::result::Result<T, SocietyError>;
