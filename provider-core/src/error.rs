use std::fmt;
use thiserror::Error;

/// Coarse classification of a failure, independent of where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Forbidden,
    Unavailable,
    Invalid,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::Forbidden => "forbidden",
            Self::Unavailable => "unavailable",
            Self::Invalid => "invalid",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Marker for calls aborted by their caller rather than failed by the server.
#[derive(Debug, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Conflict: {0}")]
    Conflict(anyhow::Error),

    #[error("Forbidden: {0}")]
    Forbidden(anyhow::Error),

    #[error("Unavailable: {0}")]
    Unavailable(anyhow::Error),

    #[error("Invalid: {0}")]
    Invalid(anyhow::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ProviderError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(anyhow::anyhow!(msg.into()))
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(anyhow::anyhow!(msg.into()))
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(anyhow::anyhow!(msg.into()))
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(anyhow::anyhow!(msg.into()))
    }

    /// Reported as unavailable, but never retried.
    pub fn cancelled() -> Self {
        Self::Unavailable(anyhow::Error::new(Cancelled))
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(anyhow::anyhow!(msg.into()))
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(anyhow::anyhow!(msg.into()))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::Unavailable(_) => ErrorKind::Unavailable,
            Self::Invalid(_) => ErrorKind::Invalid,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Unavailable(e) if e.is::<Cancelled>())
    }

    /// Prefix the message with extra context while keeping the kind.
    pub fn context(self, context: impl fmt::Display) -> Self {
        let wrap = |err: anyhow::Error| anyhow::anyhow!("{}: {:#}", context, err);
        match self {
            Self::NotFound(e) => Self::NotFound(wrap(e)),
            Self::Conflict(e) => Self::Conflict(wrap(e)),
            Self::Forbidden(e) => Self::Forbidden(wrap(e)),
            Self::Unavailable(e) => Self::Unavailable(wrap(e)),
            Self::Invalid(e) => Self::Invalid(wrap(e)),
            Self::Internal(e) => Self::Internal(wrap(e)),
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::Invalid(anyhow::Error::new(err))
    }
}

impl From<config::ConfigError> for ProviderError {
    fn from(err: config::ConfigError) -> Self {
        ProviderError::Invalid(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for ProviderError {
    fn from(err: std::io::Error) -> Self {
        ProviderError::Internal(anyhow::Error::new(err))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        // reqwest errors may embed the request URL, which never carries a token.
        if err.is_decode() {
            ProviderError::Invalid(anyhow::Error::new(err))
        } else if err.is_builder() {
            ProviderError::Internal(anyhow::Error::new(err))
        } else {
            ProviderError::Unavailable(anyhow::Error::new(err))
        }
    }
}

pub type Result<T, E = ProviderError> = std::result::Result<T, E>;

/// Lifecycle step a dispatched call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
    Import,
    Plan,
    Upgrade,
    ReadData,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Import => "import",
            Self::Plan => "plan",
            Self::Upgrade => "upgrade",
            Self::ReadData => "read-data",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error surfaced to the host: the failing operation, the object it targeted,
/// and the classified cause.
#[derive(Debug, Error)]
#[error("{operation} {resource_type} (id: {id:?}): {source}")]
pub struct OperationError {
    pub resource_type: String,
    pub operation: Operation,
    pub id: String,
    #[source]
    pub source: ProviderError,
    /// State the host should persist despite the failure, when the handler
    /// recorded an identifier before failing part-way.
    pub partial: Option<Box<crate::state::ResourceState>>,
}

impl OperationError {
    pub fn new(
        resource_type: impl Into<String>,
        operation: Operation,
        id: impl Into<String>,
        source: ProviderError,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            operation,
            id: id.into(),
            source,
            partial: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}
