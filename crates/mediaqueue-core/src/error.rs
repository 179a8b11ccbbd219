//! Error types for Mediaqueue

use thiserror::Error;

use crate::providers::Provider;

/// Result type alias using Mediaqueue's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Mediaqueue error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Job errors (E001-E099)
    #[error("Invalid job type or payload: {0}")]
    InvalidPayload(String),

    #[error("Job queue has been shut down")]
    QueueShutdown,

    // Credential errors (E100-E199)
    #[error("{0} API key is missing.")]
    MissingCredential(Provider),

    // Network errors (E200-E299)
    #[error("Network error: {0}. Check your internet connection.")]
    NetworkError(#[from] reqwest::Error),

    // Provider errors (E300-E399)
    #[error("{provider} error {status}: {message}")]
    ProviderHttp {
        provider: Provider,
        status: u16,
        message: String,
    },

    #[error("{0}")]
    GenerationFailed(String),

    #[error("{0}")]
    Unsupported(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    // Media errors (E400-E499)
    #[error("Invalid media: {0}")]
    InvalidMedia(String),

    #[error("Failed to read image '{0}'")]
    ImageReadError(String),

    #[error("Archive error: {0}")]
    ArchiveError(String),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Generic errors
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidPayload(_) => "E002",
            Self::QueueShutdown => "E003",
            Self::MissingCredential(_) => "E100",
            Self::NetworkError(_) => "E200",
            Self::ProviderHttp { .. } => "E300",
            Self::GenerationFailed(_) => "E301",
            Self::Unsupported(_) => "E302",
            Self::Timeout(_) => "E303",
            Self::InvalidMedia(_) => "E400",
            Self::ImageReadError(_) => "E401",
            Self::ArchiveError(_) => "E402",
            Self::ConfigError(_) => "E600",
            Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::MissingCredential(provider) => {
                Some(format!("export {}=<key>", provider.env_var()))
            }
            Self::NetworkError(_) => Some("Check internet connection".to_string()),
            Self::ConfigError(_) => Some("mediaqueue config list".to_string()),
            Self::ProviderHttp { status: 401 | 403, provider, .. } => {
                Some(format!("Check the value of {}", provider.env_var()))
            }
            _ => None,
        }
    }

    /// Errors that must never be retried, whatever their message says.
    pub fn is_always_fatal(&self) -> bool {
        matches!(
            self,
            Self::MissingCredential(_)
                | Self::InvalidPayload(_)
                | Self::Unsupported(_)
                | Self::ImageReadError(_)
                | Self::QueueShutdown
        )
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Self::ArchiveError(err.to_string())
    }
}
