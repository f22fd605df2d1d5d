//! Domain error types.
//!
//! Lower layers return their own typed errors; they are converted here once,
//! and storage details are logged rather than returned.

use conduit_pipeline::PipelineError;
use conduit_registry::RegistryError;
use conduit_store::StoreError;
use conduit_types::ResourceError;
use thiserror::Error;
use tracing::error;

/// Transport-independent status of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    FailedPrecondition,
    Unauthenticated,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::FailedPrecondition => "FAILED_PRECONDITION",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Internal => "INTERNAL",
        }
    }

    /// Matching HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidArgument => 400,
            Self::Unauthenticated => 401,
            Self::NotFound => 404,
            Self::AlreadyExists => 409,
            Self::FailedPrecondition => 412,
            Self::Internal => 500,
        }
    }
}

/// Domain-level errors.
#[derive(Debug, Error)]
pub enum DomainError {
    /// A resource name could not be parsed.
    #[error("malformed resource name '{0}'")]
    MalformedName(String),

    /// A permalink could not be parsed.
    #[error("malformed resource permalink '{0}'")]
    MalformedPermalink(String),

    /// The request carries no usable identity.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Identity, definition, or connector lookup miss.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request input.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A connector with the same id already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// The connector is not in a state that allows the operation.
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// Dispatch to a definition no family claims.
    #[error("Unknown connector definition: {0}")]
    UnknownConnectorDefinition(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MalformedName(_) | Self::MalformedPermalink(_) | Self::InvalidArgument(_) => {
                ErrorCode::InvalidArgument
            }
            Self::Unauthenticated(_) => ErrorCode::Unauthenticated,
            Self::NotFound(_) | Self::UnknownConnectorDefinition(_) => ErrorCode::NotFound,
            Self::AlreadyExists(_) => ErrorCode::AlreadyExists,
            Self::FailedPrecondition(_) => ErrorCode::FailedPrecondition,
            Self::Config(_) | Self::Internal(_) => ErrorCode::Internal,
        }
    }
}

impl From<ResourceError> for DomainError {
    fn from(err: ResourceError) -> Self {
        match err {
            ResourceError::MalformedName(name) => Self::MalformedName(name),
            ResourceError::MalformedPermalink(permalink) => Self::MalformedPermalink(permalink),
        }
    }
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::InvalidPageToken(reason) => {
                Self::InvalidArgument(format!("invalid page token: {reason}"))
            }
            other => {
                error!(error = %other, "Store operation failed");
                Self::Internal("storage operation failed".to_string())
            }
        }
    }
}

impl From<RegistryError> for DomainError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownDefinition(uid) => Self::UnknownConnectorDefinition(uid),
            RegistryError::InvalidConfiguration { .. } => Self::InvalidArgument(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<PipelineError> for DomainError {
    fn from(err: PipelineError) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, DomainError>;
