//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Processing failed: {0}")]
    ProcessingFailed(String),

    #[error("AI segmentation failed: {0}")]
    AiFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid request: {0}")]
    Request(#[from] sgen_models::RequestError),

    #[error("Media error: {0}")]
    Media(#[from] sgen_media::MediaError),

    #[error("TTS error: {0}")]
    Tts(#[from] sgen_tts::TtsError),

    #[error("Store error: {0}")]
    Store(#[from] sgen_store::StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] sgen_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn job_not_found(id: impl Into<String>) -> Self {
        Self::JobNotFound(id.into())
    }

    pub fn processing_failed(msg: impl Into<String>) -> Self {
        Self::ProcessingFailed(msg.into())
    }

    pub fn ai_failed(msg: impl Into<String>) -> Self {
        Self::AiFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Check if error is retryable.
    ///
    /// Only AI segmentation is ever retried; the rest fail the job.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::AiFailed(_) => true,
            WorkerError::Tts(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Message recorded on the failed job.
    ///
    /// Encoder failures include the captured stderr tail.
    pub fn job_message(&self) -> String {
        match self {
            WorkerError::Media(e) => e.detailed_message(),
            other => other.to_string(),
        }
    }
}
