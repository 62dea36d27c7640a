use thiserror::Error;

/// Errors for core type construction and validation.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An identifier failed validation.
    #[error("Invalid identifier: {0}")]
    InvalidId(String),
}

/// A specialized Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
