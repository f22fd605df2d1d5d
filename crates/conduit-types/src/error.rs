//! Error types for resource-name parsing.

use thiserror::Error;

/// Result type alias for resource operations.
pub type Result<T> = std::result::Result<T, ResourceError>;

/// Errors raised while parsing resource identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    /// A resource name (`collection/id`) could not be parsed.
    #[error("malformed resource name '{0}'")]
    MalformedName(String),

    /// A permalink (`kind/uid`) could not be parsed.
    #[error("malformed resource permalink '{0}'")]
    MalformedPermalink(String),
}
