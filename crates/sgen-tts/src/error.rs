//! Speech synthesis error types.

use thiserror::Error;

/// Result type for speech synthesis.
pub type TtsResult<T> = Result<T, TtsError>;

/// Errors from speech synthesis providers.
#[derive(Debug, Error)]
pub enum TtsError {
    #[error("Unknown TTS provider: {0}")]
    UnknownProvider(String),

    #[error("Missing credentials for {0}")]
    MissingCredentials(&'static str),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{provider} returned {status}: {body}")]
    Api {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("Invalid audio from {provider}: {message}")]
    InvalidAudio {
        provider: &'static str,
        message: String,
    },

    #[error("Failed to parse voice list: {0}")]
    VoiceList(String),

    #[error("Media error: {0}")]
    Media(#[from] sgen_media::MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TtsError {
    pub fn invalid_audio(provider: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidAudio {
            provider,
            message: message.into(),
        }
    }

    /// Whether a later attempt could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Media(sgen_media::MediaError::Timeout(_)) => true,
            _ => false,
        }
    }
}
