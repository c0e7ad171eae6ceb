use thiserror::Error;

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file: {0}")]
    ReadFile(#[source] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),
}

/// Coarse classification of an [`Error`].
///
/// The retry executor and the watch loop decide what to do with a failure
/// from its kind alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Unavailable,
    ResourceExhausted,
    NotFound,
    DeadlineExceeded,
    Aborted,
    InvalidArgument,
    Internal,
    Config,
}

#[derive(Error, Debug)]
pub enum Error {
    /// The registry could not be reached, or the transport broke mid-call.
    #[error("registry unavailable: {0}")]
    Unavailable(String),

    /// Another caller is already dialing the registry.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// Transient conflict on the registry side; safe to retry.
    #[error("aborted: {0}")]
    Aborted(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("internal registry error: {0}")]
    Internal(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Unavailable(_) => ErrorKind::Unavailable,
            Self::ResourceExhausted(_) => ErrorKind::ResourceExhausted,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
            Self::Aborted(_) => ErrorKind::Aborted,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Internal(_) => ErrorKind::Internal,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Whether another attempt may succeed without caller intervention.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Unavailable | ErrorKind::ResourceExhausted | ErrorKind::Aborted
        )
    }

    /// Whether the cached registry connection must be discarded.
    #[must_use]
    pub const fn should_poison(&self) -> bool {
        matches!(self.kind(), ErrorKind::Unavailable)
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.kind(), ErrorKind::NotFound)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
