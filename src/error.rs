use bincode::Error as BincodeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Binary serialization error: {0}")]
    Bincode(#[from] BincodeError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate data: {0}")]
    Duplicate(String),

    #[error("No matching records found")]
    NoMatch,

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Payload exceeds the binary size representation")]
    Oversized,

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Analysis failed: {0}")]
    Analysis(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
