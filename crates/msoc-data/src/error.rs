//! Error types for data collection and loading

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Empty dataset: {0}")]
    Empty(String),
}

pub type Result<T> = std::result::Result<T, DataError>;
