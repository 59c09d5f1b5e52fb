//! Request validation errors.

use thiserror::Error;

pub type RequestResult<T> = Result<T, RequestError>;

/// A job request was rejected before a job was created.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error("Invalid request: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

impl RequestError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}
