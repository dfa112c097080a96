use bincode::Error as BincodeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScribeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Bincode serialization error: {0}")]
    Bincode(#[from] BincodeError),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid id '{0}': expected a 24 character hex object id")]
    InvalidId(String),

    #[error("Duplicate key '{id}' in collection '{collection}'")]
    DuplicateKey { collection: String, id: String },

    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, ScribeError>;
