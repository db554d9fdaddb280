use thiserror::Error;

/// Typed error hierarchy for wa-relay.
///
/// Use at module boundaries (entity creation, provider calls, storage, auth).
/// Internal/leaf functions can continue using `anyhow::Result`; the `Internal`
/// variant allows seamless conversion via the `?` operator.
#[derive(Debug, Error)]
pub enum RelayError {
    /// A message was constructed without a tenant or external id. Never retried.
    #[error("Invalid domain state: {0}")]
    InvalidDomainState(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Provider error: {message}")]
    Provider {
        message: String,
        code: Option<i64>,
        retryable: bool,
    },

    #[error("Storage error: {0}")]
    Storage(#[source] anyhow::Error),

    /// The provider accepted the message but it could not be recorded locally.
    #[error("Message {provider_message_id} was sent but not recorded: {reason}")]
    SentNotRecorded {
        provider_message_id: String,
        reason: String,
    },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Convenience alias for results using `RelayError`.
pub type RelayResult<T> = std::result::Result<T, RelayError>;

impl RelayError {
    /// Whether this error is transient and the operation may be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider { retryable, .. } => *retryable,
            Self::Storage(_) | Self::Internal(_) => true,
            Self::InvalidDomainState(_)
            | Self::Validation(_)
            | Self::Config(_)
            | Self::Auth(_)
            | Self::SentNotRecorded { .. } => false,
        }
    }

    pub fn storage(err: impl Into<anyhow::Error>) -> Self {
        Self::Storage(err.into())
    }
}
