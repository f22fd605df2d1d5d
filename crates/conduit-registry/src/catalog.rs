//! Connector families declared in TOML catalog files.
//!
//! A catalog directory holds one file per family:
//!
//! ```text
//! <catalog_dir>/
//!   destination.toml
//!   source.toml
//!   blockchain.toml
//!   ai.toml
//! ```
//!
//! Each file lists definitions:
//!
//! ```toml
//! [[definitions]]
//! uid = "2b7e4f4e-0b7a-4d0c-9a51-6c3b9d9f1c01"
//! id = "destination-postgres"
//! title = "Postgres"
//! docker_repository = "conduit/destination-postgres"
//! docker_image_tag = "0.3.0"
//!
//! [definitions.spec.connection_specification]
//! required = ["host", "password"]
//!
//! [definitions.spec.connection_specification.properties.password]
//! type = "string"
//! credential_field = true
//! ```
//!
//! Credential fields are the `connection_specification` properties marked
//! `credential_field = true` (or `airbyte_secret = true`), addressed by dotted
//! path through nested `properties`, plus any listed in `credential_fields`.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conduit_types::{ConnectorDefinition, ConnectorState, timestamp_now};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::RegistryError;
use crate::family::{Connection, ConnectorFamily, FamilyKind};
use crate::Result;

/// A definition entry as written in a catalog file.
#[derive(Debug, Clone, Deserialize)]
struct CatalogEntry {
    uid: Uuid,
    id: String,
    #[serde(default)]
    title: String,
    docker_repository: String,
    docker_image_tag: String,
    #[serde(default)]
    documentation_url: String,
    #[serde(default)]
    spec: Option<Value>,
    #[serde(default)]
    credential_fields: Vec<String>,
    #[serde(default)]
    create_time: Option<DateTime<Utc>>,
}

/// Serialization wrapper for a catalog TOML file.
#[derive(Debug, Clone, Deserialize, Default)]
struct CatalogFile {
    #[serde(default)]
    definitions: Vec<CatalogEntry>,
}

/// A connector family backed by a catalog file.
pub struct CatalogFamily {
    kind: FamilyKind,
    definitions: Vec<ConnectorDefinition>,
    by_uid: HashMap<Uuid, usize>,
    by_id: HashMap<String, usize>,
    /// Definition id → credential field paths.
    credentials: HashMap<String, BTreeSet<String>>,
}

impl CatalogFamily {
    /// A family with no definitions.
    pub fn empty(kind: FamilyKind) -> Self {
        Self {
            kind,
            definitions: Vec::new(),
            by_uid: HashMap::new(),
            by_id: HashMap::new(),
            credentials: HashMap::new(),
        }
    }

    /// Load a family from a catalog file. A missing file yields an empty family.
    pub fn load(kind: FamilyKind, path: &Path) -> Result<Self> {
        if !path.is_file() {
            tracing::debug!(family = %kind, path = %path.display(), "No catalog file, family is empty");
            return Ok(Self::empty(kind));
        }
        let content = std::fs::read_to_string(path).map_err(|e| RegistryError::ReadCatalog {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::parse(kind, &content, &path.display().to_string())
    }

    /// Parse a family from catalog TOML text.
    pub fn from_toml(kind: FamilyKind, content: &str) -> Result<Self> {
        Self::parse(kind, content, kind.catalog_file())
    }

    fn parse(kind: FamilyKind, content: &str, origin: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(content).map_err(|e| RegistryError::InvalidCatalog {
            path: origin.to_string(),
            message: e.to_string(),
        })?;

        let loaded_at = timestamp_now();
        let mut family = Self::empty(kind);
        for entry in file.definitions {
            if family.by_uid.contains_key(&entry.uid) {
                return Err(RegistryError::DuplicateUid {
                    uid: entry.uid,
                    first: kind,
                    second: kind,
                });
            }
            if family.by_id.contains_key(&entry.id) {
                return Err(RegistryError::DuplicateId {
                    id: entry.id,
                    connector_type: kind.connector_type(),
                });
            }

            let mut fields: BTreeSet<String> = entry.credential_fields.into_iter().collect();
            if let Some(spec) = &entry.spec {
                collect_credential_fields(spec, &mut fields);
            }

            let create_time = entry.create_time.unwrap_or(loaded_at);
            let definition = ConnectorDefinition {
                uid: entry.uid,
                id: entry.id.clone(),
                title: entry.title,
                connector_type: kind.connector_type(),
                docker_repository: entry.docker_repository,
                docker_image_tag: entry.docker_image_tag,
                documentation_url: entry.documentation_url,
                spec: entry.spec,
                create_time,
                update_time: create_time,
            };

            let idx = family.definitions.len();
            family.by_uid.insert(definition.uid, idx);
            family.by_id.insert(definition.id.clone(), idx);
            family.credentials.insert(entry.id, fields);
            family.definitions.push(definition);
        }

        tracing::debug!(family = %kind, count = family.definitions.len(), "Loaded catalog family");
        Ok(family)
    }

    /// All definitions in declaration order.
    pub fn definitions(&self) -> &[ConnectorDefinition] {
        &self.definitions
    }

    /// Credential paths of a definition.
    pub fn credential_fields(&self, definition_id: &str) -> Option<&BTreeSet<String>> {
        self.credentials.get(definition_id)
    }
}

impl ConnectorFamily for CatalogFamily {
    fn kind(&self) -> FamilyKind {
        self.kind
    }

    fn list_definition_uids(&self) -> Vec<Uuid> {
        self.definitions.iter().map(|d| d.uid).collect()
    }

    fn definition_by_uid(&self, uid: Uuid) -> Option<&ConnectorDefinition> {
        self.by_uid.get(&uid).map(|&i| &self.definitions[i])
    }

    fn definition_by_id(&self, id: &str) -> Option<&ConnectorDefinition> {
        self.by_id.get(id).map(|&i| &self.definitions[i])
    }

    fn is_credential_field(&self, definition_id: &str, path: &str) -> bool {
        self.credentials
            .get(definition_id)
            .is_some_and(|fields| fields.contains(path))
    }

    fn create_connection(&self, uid: Uuid, configuration: &Value) -> Result<Box<dyn Connection>> {
        let definition = self
            .definition_by_uid(uid)
            .ok_or_else(|| RegistryError::UnknownDefinition(uid.to_string()))?;
        Ok(Box::new(CatalogConnection::new(definition, configuration.clone())))
    }
}

/// Walk `spec.connection_specification` collecting credential property paths.
fn collect_credential_fields(spec: &Value, out: &mut BTreeSet<String>) {
    if let Some(conn_spec) = spec.get("connection_specification") {
        collect_properties(conn_spec, "", out);
    }
}

fn collect_properties(schema: &Value, prefix: &str, out: &mut BTreeSet<String>) {
    let Some(props) = schema.get("properties").and_then(Value::as_object) else {
        return;
    };
    for (name, prop) in props {
        let path = format!("{prefix}{name}");
        let flagged = ["credential_field", "airbyte_secret"]
            .iter()
            .any(|flag| prop.get(flag).and_then(Value::as_bool) == Some(true));
        if flagged {
            out.insert(path.clone());
        }
        collect_properties(prop, &format!("{path}."), out);
    }
}

/// A connection created from a catalog definition.
///
/// Catalog connectors run as external containers; the local check verifies
/// that every top-level `required` property of the connection specification
/// is present in the configuration.
pub struct CatalogConnection {
    definition_uid: Uuid,
    definition_id: String,
    required: Vec<String>,
    configuration: Value,
}

impl CatalogConnection {
    pub fn new(definition: &ConnectorDefinition, configuration: Value) -> Self {
        let required = definition
            .spec
            .as_ref()
            .and_then(|s| s.pointer("/connection_specification/required"))
            .and_then(Value::as_array)
            .map(|fields| {
                fields
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Self {
            definition_uid: definition.uid,
            definition_id: definition.id.clone(),
            required,
            configuration,
        }
    }

    /// Required properties absent from the configuration.
    pub fn missing_fields(&self) -> Vec<&str> {
        let object = self.configuration.as_object();
        self.required
            .iter()
            .filter(|f| object.is_none_or(|o| !o.contains_key(f.as_str())))
            .map(String::as_str)
            .collect()
    }
}

#[async_trait]
impl Connection for CatalogConnection {
    fn definition_uid(&self) -> Uuid {
        self.definition_uid
    }

    async fn test(&self) -> Result<ConnectorState> {
        if !self.configuration.is_object() {
            tracing::debug!(definition = %self.definition_id, "Configuration is not an object");
            return Ok(ConnectorState::Error);
        }
        let missing = self.missing_fields();
        if !missing.is_empty() {
            tracing::debug!(
                definition = %self.definition_id,
                missing = ?missing,
                "Connection check failed: required fields missing"
            );
            return Ok(ConnectorState::Error);
        }
        Ok(ConnectorState::Connected)
    }
}

/// Load all four families from a catalog directory, in registry order.
pub fn load_catalog_dir(dir: &Path) -> Result<Vec<Arc<dyn ConnectorFamily>>> {
    FamilyKind::ORDER
        .iter()
        .map(|&kind| {
            let family = CatalogFamily::load(kind, &dir.join(kind.catalog_file()))?;
            Ok(Arc::new(family) as Arc<dyn ConnectorFamily>)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    const POSTGRES: &str = r#"
[[definitions]]
uid = "2b7e4f4e-0b7a-4d0c-9a51-6c3b9d9f1c01"
id = "destination-postgres"
title = "Postgres"
docker_repository = "conduit/destination-postgres"
docker_image_tag = "0.3.0"

[definitions.spec.connection_specification]
required = ["host", "password"]

[definitions.spec.connection_specification.properties.host]
type = "string"

[definitions.spec.connection_specification.properties.password]
type = "string"
airbyte_secret = true

[definitions.spec.connection_specification.properties.tunnel.properties.private_key]
type = "string"
credential_field = true
"#;

    fn uid() -> Uuid {
        Uuid::parse_str("2b7e4f4e-0b7a-4d0c-9a51-6c3b9d9f1c01").unwrap()
    }

    #[test]
    fn test_parse_definitions() {
        let family = CatalogFamily::from_toml(FamilyKind::Destination, POSTGRES).unwrap();
        assert_eq!(family.list_definition_uids(), vec![uid()]);
        let def = family.definition_by_id("destination-postgres").unwrap();
        assert_eq!(def.connector_type, conduit_types::ConnectorType::Destination);
        assert_eq!(def.image(), "conduit/destination-postgres:0.3.0");
        assert!(family.has_uid(uid()));
    }

    #[test]
    fn test_credential_fields_from_schema() {
        let family = CatalogFamily::from_toml(FamilyKind::Destination, POSTGRES).unwrap();
        assert!(family.is_credential_field("destination-postgres", "password"));
        assert!(family.is_credential_field("destination-postgres", "tunnel.private_key"));
        assert!(!family.is_credential_field("destination-postgres", "host"));
        assert!(!family.is_credential_field("destination-other", "password"));
    }

    #[test]
    fn test_explicit_credential_fields() {
        let toml = r#"
[[definitions]]
uid = "5c1f7a0e-3f0b-4a57-8d54-2a3c0e7b6d11"
id = "ai-openai"
docker_repository = "conduit/ai-openai"
docker_image_tag = "latest"
credential_fields = ["api_key"]
"#;
        let family = CatalogFamily::from_toml(FamilyKind::Ai, toml).unwrap();
        assert!(family.is_credential_field("ai-openai", "api_key"));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let toml = r#"
[[definitions]]
uid = "5c1f7a0e-3f0b-4a57-8d54-2a3c0e7b6d11"
id = "source-http"
docker_repository = "r"
docker_image_tag = "t"

[[definitions]]
uid = "6d2f7a0e-3f0b-4a57-8d54-2a3c0e7b6d12"
id = "source-http"
docker_repository = "r"
docker_image_tag = "t"
"#;
        let err = CatalogFamily::from_toml(FamilyKind::Source, toml).err().unwrap();
        assert!(matches!(err, RegistryError::DuplicateId { .. }));
    }

    #[test]
    fn test_invalid_toml() {
        let err = CatalogFamily::from_toml(FamilyKind::Source, "[[definitions]\n")
            .err()
            .unwrap();
        assert!(matches!(err, RegistryError::InvalidCatalog { .. }));
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let family = CatalogFamily::load(FamilyKind::Ai, &tmp.path().join("ai.toml")).unwrap();
        assert!(family.list_definition_uids().is_empty());
    }

    #[test]
    fn test_load_catalog_dir_order() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("destination.toml"), POSTGRES).unwrap();
        let families = load_catalog_dir(tmp.path()).unwrap();
        let kinds: Vec<_> = families.iter().map(|f| f.kind()).collect();
        assert_eq!(kinds, FamilyKind::ORDER.to_vec());
        assert_eq!(families[0].list_definition_uids().len(), 1);
    }

    #[tokio::test]
    async fn test_connection_check_required_fields() {
        let family = CatalogFamily::from_toml(FamilyKind::Destination, POSTGRES).unwrap();

        let ok = family
            .create_connection(uid(), &json!({"host": "h", "password": "p"}))
            .unwrap();
        assert_eq!(ok.test().await.unwrap(), ConnectorState::Connected);

        let missing = family.create_connection(uid(), &json!({"host": "h"})).unwrap();
        assert_eq!(missing.test().await.unwrap(), ConnectorState::Error);

        let not_object = family.create_connection(uid(), &json!("h")).unwrap();
        assert_eq!(not_object.test().await.unwrap(), ConnectorState::Error);
    }

    #[test]
    fn test_create_connection_unknown_uid() {
        let family = CatalogFamily::from_toml(FamilyKind::Destination, POSTGRES).unwrap();
        let err = family
            .create_connection(Uuid::new_v4(), &json!({}))
            .err()
            .unwrap();
        assert!(matches!(err, RegistryError::UnknownDefinition(_)));
    }
}
