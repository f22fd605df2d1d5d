//! Connector family and live connection traits.

use async_trait::async_trait;
use conduit_types::{ConnectorDefinition, ConnectorState, ConnectorType};
use uuid::Uuid;

use crate::Result;

/// The four connector families, in registry iteration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FamilyKind {
    Destination,
    Source,
    Blockchain,
    Ai,
}

impl FamilyKind {
    /// Fixed iteration order used when building the registry and dispatching.
    pub const ORDER: [FamilyKind; 4] = [
        FamilyKind::Destination,
        FamilyKind::Source,
        FamilyKind::Blockchain,
        FamilyKind::Ai,
    ];

    /// Position in [`ORDER`](Self::ORDER).
    pub fn rank(&self) -> usize {
        match self {
            FamilyKind::Destination => 0,
            FamilyKind::Source => 1,
            FamilyKind::Blockchain => 2,
            FamilyKind::Ai => 3,
        }
    }

    /// Connector type of every definition in this family.
    pub fn connector_type(&self) -> ConnectorType {
        match self {
            FamilyKind::Destination => ConnectorType::Destination,
            FamilyKind::Source => ConnectorType::Source,
            FamilyKind::Blockchain => ConnectorType::Blockchain,
            FamilyKind::Ai => ConnectorType::Ai,
        }
    }

    /// Catalog file name for this family.
    pub fn catalog_file(&self) -> &'static str {
        match self {
            FamilyKind::Destination => "destination.toml",
            FamilyKind::Source => "source.toml",
            FamilyKind::Blockchain => "blockchain.toml",
            FamilyKind::Ai => "ai.toml",
        }
    }
}

impl std::fmt::Display for FamilyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FamilyKind::Destination => "destination",
            FamilyKind::Source => "source",
            FamilyKind::Blockchain => "blockchain",
            FamilyKind::Ai => "ai",
        };
        f.write_str(s)
    }
}

/// A live connection created from a definition and a configuration document.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Definition this connection was created from.
    fn definition_uid(&self) -> Uuid;

    /// Check connectivity and report the resulting state.
    ///
    /// A reachable-but-misconfigured target yields `Ok(ConnectorState::Error)`;
    /// `Err` is reserved for failures of the check itself.
    async fn test(&self) -> Result<ConnectorState>;
}

/// An independently implemented group of connector definitions.
///
/// Families are read-only after construction and shared across tasks.
pub trait ConnectorFamily: Send + Sync {
    /// Which family this is.
    fn kind(&self) -> FamilyKind;

    /// Definition UIDs exposed by this family, in declaration order.
    fn list_definition_uids(&self) -> Vec<Uuid>;

    /// Look up a definition by UID.
    fn definition_by_uid(&self, uid: Uuid) -> Option<&ConnectorDefinition>;

    /// Look up a definition by its human-readable id.
    fn definition_by_id(&self, id: &str) -> Option<&ConnectorDefinition>;

    /// Whether this family owns the UID.
    fn has_uid(&self, uid: Uuid) -> bool {
        self.definition_by_uid(uid).is_some()
    }

    /// Whether the field at the dotted `path` of a configuration for
    /// definition `definition_id` holds a credential.
    fn is_credential_field(&self, definition_id: &str, path: &str) -> bool;

    /// Create a live connection. The configuration is passed through unmodified.
    fn create_connection(
        &self,
        uid: Uuid,
        configuration: &serde_json::Value,
    ) -> Result<Box<dyn Connection>>;
}
