//! Connector definitions and tenant-owned connectors.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current time truncated to microseconds.
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

// ─────────────────────────────────────────────────────────────────────────────
// Enums
// ─────────────────────────────────────────────────────────────────────────────

/// Kind of connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectorType {
    Source,
    Destination,
    Blockchain,
    Ai,
}

impl ConnectorType {
    /// All connector types.
    pub const ALL: [ConnectorType; 4] = [
        ConnectorType::Source,
        ConnectorType::Destination,
        ConnectorType::Blockchain,
        ConnectorType::Ai,
    ];

    /// Database / wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectorType::Source => "SOURCE",
            ConnectorType::Destination => "DESTINATION",
            ConnectorType::Blockchain => "BLOCKCHAIN",
            ConnectorType::Ai => "AI",
        }
    }

    /// Parse from a string (case-insensitive, accepts a `CONNECTOR_TYPE_` prefix).
    pub fn parse(s: &str) -> Option<Self> {
        let upper = s.trim().to_ascii_uppercase();
        let bare = upper.strip_prefix("CONNECTOR_TYPE_").unwrap_or(&upper);
        match bare {
            "SOURCE" => Some(ConnectorType::Source),
            "DESTINATION" => Some(ConnectorType::Destination),
            "BLOCKCHAIN" => Some(ConnectorType::Blockchain),
            "AI" => Some(ConnectorType::Ai),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConnectorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection state of a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectorState {
    #[default]
    Unspecified,
    Disconnected,
    Connected,
    Error,
}

impl ConnectorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectorState::Unspecified => "UNSPECIFIED",
            ConnectorState::Disconnected => "DISCONNECTED",
            ConnectorState::Connected => "CONNECTED",
            ConnectorState::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UNSPECIFIED" => Some(ConnectorState::Unspecified),
            "DISCONNECTED" => Some(ConnectorState::Disconnected),
            "CONNECTED" => Some(ConnectorState::Connected),
            "ERROR" => Some(ConnectorState::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConnectorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How much of a record to return.
///
/// `Basic` omits the large document fields (`spec` for definitions,
/// `configuration` for connectors).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum View {
    #[default]
    Basic,
    Full,
}

impl View {
    pub fn is_basic(&self) -> bool {
        matches!(self, View::Basic)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connector Definition
// ─────────────────────────────────────────────────────────────────────────────

/// A catalog entry describing one installable connector kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorDefinition {
    /// Stable identifier, never reused.
    pub uid: Uuid,
    /// Human-readable slug, unique per connector type.
    pub id: String,
    pub title: String,
    pub connector_type: ConnectorType,
    pub docker_repository: String,
    pub docker_image_tag: String,
    #[serde(default)]
    pub documentation_url: String,
    /// Connection specification document; `None` in the basic view.
    #[serde(default)]
    pub spec: Option<serde_json::Value>,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

impl ConnectorDefinition {
    /// Resource name, e.g. `connector-definitions/destination-http`.
    pub fn name(&self) -> String {
        format!("connector-definitions/{}", self.id)
    }

    /// Permalink, e.g. `connector-definitions/<uid>`.
    pub fn permalink(&self) -> String {
        format!("connector-definitions/{}", self.uid)
    }

    /// Container image reference (`repository:tag`).
    pub fn image(&self) -> String {
        format!("{}:{}", self.docker_repository, self.docker_image_tag)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connector
// ─────────────────────────────────────────────────────────────────────────────

/// A tenant-owned, configured instance of a connector definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connector {
    pub uid: Uuid,
    /// Unique per owner and connector type.
    pub id: String,
    /// Owner resource permalink, e.g. `users/<uid>`.
    pub owner: String,
    pub connector_definition_uid: Uuid,
    pub connector_type: ConnectorType,
    #[serde(default)]
    pub description: String,
    /// Configuration document; `None` in the basic view.
    #[serde(default)]
    pub configuration: Option<serde_json::Value>,
    pub state: ConnectorState,
    #[serde(default)]
    pub tombstone: bool,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

impl Connector {
    /// Create a new connector for a definition.
    pub fn new(
        id: impl Into<String>,
        owner: impl Into<String>,
        definition: &ConnectorDefinition,
        configuration: serde_json::Value,
    ) -> Self {
        let now = timestamp_now();
        Self {
            uid: Uuid::new_v4(),
            id: id.into(),
            owner: owner.into(),
            connector_definition_uid: definition.uid,
            connector_type: definition.connector_type,
            description: String::new(),
            configuration: Some(configuration),
            state: ConnectorState::Disconnected,
            tombstone: false,
            create_time: now,
            update_time: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Resource name, e.g. `connectors/my-dest`.
    pub fn name(&self) -> String {
        format!("connectors/{}", self.id)
    }

    /// Permalink, e.g. `connectors/<uid>`.
    pub fn permalink(&self) -> String {
        format!("connectors/{}", self.uid)
    }
}

/// Partial update of a connector; only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectorUpdate {
    pub description: Option<String>,
    pub configuration: Option<serde_json::Value>,
    pub state: Option<ConnectorState>,
    pub tombstone: Option<bool>,
}

impl ConnectorUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn configuration(mut self, configuration: serde_json::Value) -> Self {
        self.configuration = Some(configuration);
        self
    }

    pub fn state(mut self, state: ConnectorState) -> Self {
        self.state = Some(state);
        self
    }

    /// Whether the update carries no fields.
    pub fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.configuration.is_none()
            && self.state.is_none()
            && self.tombstone.is_none()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Owner
// ─────────────────────────────────────────────────────────────────────────────

/// A resolved tenant identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub uid: Uuid,
    pub id: String,
}

impl Owner {
    /// Owner permalink used to scope stored connectors, e.g. `users/<uid>`.
    pub fn permalink(&self) -> String {
        format!("users/{}", self.uid)
    }
}
