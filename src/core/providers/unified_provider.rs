//! Classified provider errors
//!
//! Provider adapters report every failure as a [`ProviderError`]. The router
//! never looks at vendor payloads; it only needs the [`ErrorKind`] each
//! variant maps to, plus two refinements that drive special handling:
//! context-window overflows (redirected to context-window fallbacks) and
//! malformed responses (never retried).
//!
//! | Variant | Kind |
//! |------|------|
//! | Authentication | Authentication |
//! | RateLimit | RateLimit |
//! | InvalidRequest | BadRequest |
//! | ContextLengthExceeded | BadRequest |
//! | ContentFiltered | ContentPolicyViolation |
//! | Timeout | Timeout |
//! | ServiceUnavailable | InternalServerError |
//! | Network | InternalServerError |
//! | MalformedResponse | InternalServerError |
//! | ApiError | by HTTP status |
//! | Other | Other |

use crate::core::router::error::ErrorKind;

/// Classified failure returned by a provider adapter
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("Authentication failed for {provider}: {message}")]
    Authentication { provider: String, message: String },

    #[error("Rate limit exceeded for {provider}: {message}")]
    RateLimit {
        provider: String,
        message: String,
        /// Seconds the provider asked us to wait, when it said so
        retry_after: Option<u64>,
    },

    #[error("Invalid request for {provider}: {message}")]
    InvalidRequest { provider: String, message: String },

    #[error("Context length exceeded for {provider}: max {max} tokens, got {actual} tokens")]
    ContextLengthExceeded {
        provider: String,
        max: usize,
        actual: usize,
    },

    #[error("Content filtered by {provider} safety systems: {reason}")]
    ContentFiltered { provider: String, reason: String },

    #[error("Timeout for {provider}: {message}")]
    Timeout { provider: String, message: String },

    #[error("Provider {provider} is unavailable: {message}")]
    ServiceUnavailable { provider: String, message: String },

    #[error("Network error for {provider}: {message}")]
    Network { provider: String, message: String },

    /// The call completed but its payload could not be parsed
    #[error("Failed to parse {provider} response: {message}")]
    MalformedResponse { provider: String, message: String },

    #[error("API error for {provider} (status {status}): {message}")]
    ApiError {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("{provider} error: {message}")]
    Other { provider: String, message: String },
}

impl ProviderError {
    pub fn authentication(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Authentication {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn rate_limit(provider: impl Into<String>, retry_after: Option<u64>) -> Self {
        Self::RateLimit {
            provider: provider.into(),
            message: match retry_after {
                Some(seconds) => format!("Rate limit exceeded. Retry after {} seconds", seconds),
                None => "Rate limit exceeded".to_string(),
            },
            retry_after,
        }
    }

    pub fn invalid_request(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn context_length_exceeded(provider: impl Into<String>, max: usize, actual: usize) -> Self {
        Self::ContextLengthExceeded {
            provider: provider.into(),
            max,
            actual,
        }
    }

    pub fn content_filtered(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ContentFiltered {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    pub fn timeout(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Timeout {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn service_unavailable(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ServiceUnavailable {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn network(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn malformed_response(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn api_error(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            provider: provider.into(),
            status,
            message: message.into(),
        }
    }

    pub fn other(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Other {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Error kind used for retry, cooldown and fallback decisions
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::RateLimit { .. } => ErrorKind::RateLimit,
            Self::InvalidRequest { .. } | Self::ContextLengthExceeded { .. } => {
                ErrorKind::BadRequest
            }
            Self::ContentFiltered { .. } => ErrorKind::ContentPolicyViolation,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::ServiceUnavailable { .. }
            | Self::Network { .. }
            | Self::MalformedResponse { .. } => ErrorKind::InternalServerError,
            Self::ApiError { status, .. } => ErrorKind::from_status(*status),
            Self::Other { .. } => ErrorKind::Other,
        }
    }

    /// Whether the input did not fit the model's context window
    pub fn is_context_window_exceeded(&self) -> bool {
        matches!(self, Self::ContextLengthExceeded { .. })
    }

    /// Whether the adapter could not parse the provider's response
    pub fn is_malformed_response(&self) -> bool {
        matches!(self, Self::MalformedResponse { .. })
    }

    /// Provider-suggested delay before retrying, if any
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}
