use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures surfaced to callers of the quote fetcher.
///
/// Minute-window blocking is absorbed by the quota tracker and never shows
/// up here. None of these are fatal; the caller decides whether to skip the
/// asset or substitute its own value.
#[derive(Error, Debug)]
pub enum QuoteError {
    /// Daily capacity is gone. Nothing more will be admitted until tomorrow.
    #[error("Quota exhausted: {used}/{cap} requests used today")]
    QuotaExhausted { used: u32, cap: u32 },

    /// The provider answered with a structured error body.
    #[error("Provider error: {message}")]
    Provider { code: Option<i64>, message: String },

    /// The provider answered, but not with a quote we can read.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// No response was received (timeout, connection failure).
    #[error("Transport failure: {0}")]
    Transport(#[from] reqwest::Error),
}

impl QuoteError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::QuotaExhausted { .. } => "quota_exhausted",
            Self::Provider { code: Some(429), .. } => "rate_limited",
            Self::Provider { .. } => "provider_error",
            Self::MalformedResponse(_) => "malformed_response",
            Self::Transport(_) => "transport_failure",
        }
    }

    /// Whether trying again later could succeed. Nothing is retried internally.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::QuotaExhausted { .. } | Self::MalformedResponse(_) => false,
            Self::Provider { code, .. } => matches!(code, Some(429) | Some(500..=599)),
            Self::Transport(_) => true,
        }
    }

    pub fn to_info(&self) -> ErrorInfo {
        ErrorInfo {
            code: self.code().to_string(),
            message: self.to_string(),
            retriable: self.is_retriable(),
        }
    }
}

/// Serializable error shape used in command output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    pub retriable: bool,
}

impl From<&QuoteError> for ErrorInfo {
    fn from(e: &QuoteError) -> Self {
        e.to_info()
    }
}
