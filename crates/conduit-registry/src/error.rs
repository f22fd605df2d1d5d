//! Registry error types.

use conduit_types::ConnectorType;
use thiserror::Error;
use uuid::Uuid;

use crate::family::FamilyKind;

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors raised by the registry and connector families.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No family claims the definition.
    #[error("unknown connector definition '{0}'")]
    UnknownDefinition(String),

    /// Two families (or one family twice) declare the same definition UID.
    #[error("connector definition uid {uid} is declared by both {first} and {second}")]
    DuplicateUid {
        uid: Uuid,
        first: FamilyKind,
        second: FamilyKind,
    },

    /// A definition id is declared twice for one connector type.
    #[error("connector definition id '{id}' is declared twice for {connector_type}")]
    DuplicateId {
        id: String,
        connector_type: ConnectorType,
    },

    /// A catalog file could not be read.
    #[error("failed to read catalog '{path}': {source}")]
    ReadCatalog {
        path: String,
        source: std::io::Error,
    },

    /// A catalog file could not be parsed or is inconsistent.
    #[error("invalid catalog '{path}': {message}")]
    InvalidCatalog { path: String, message: String },

    /// A configuration document was rejected by a family.
    #[error("invalid configuration for '{definition}': {message}")]
    InvalidConfiguration { definition: String, message: String },
}
