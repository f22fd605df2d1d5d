//! Connector definition service.

use std::sync::Arc;

use conduit_registry::ConnectorRegistry;
use conduit_store::{ListResult, Repository};
use conduit_types::{
    ConnectorDefinition, ConnectorType, View, extract_resource_id, extract_uid_from_permalink,
    split_collection_and_id,
};
use tracing::{debug, info};
use uuid::Uuid;

use super::blocking;
use crate::error::{DomainError, Result};

pub(crate) const DEFINITION_COLLECTION: &str = "connector-definitions";

/// Read access to the definition catalog, plus seeding it from the registry.
#[derive(Clone)]
pub struct DefinitionService {
    repository: Arc<dyn Repository>,
    registry: Arc<ConnectorRegistry>,
}

impl DefinitionService {
    pub fn new(repository: Arc<dyn Repository>, registry: Arc<ConnectorRegistry>) -> Self {
        Self {
            repository,
            registry,
        }
    }

    /// Upsert every registry definition into the store.
    ///
    /// Rows that already exist keep their `create_time`.
    pub async fn seed(&self) -> Result<usize> {
        let definitions: Vec<ConnectorDefinition> = self.registry.definitions().cloned().collect();
        let count = definitions.len();
        blocking(&self.repository, move |repo| {
            for definition in &definitions {
                repo.upsert_definition(definition)?;
            }
            Ok(())
        })
        .await?;
        info!(count, "Seeded connector definitions");
        Ok(count)
    }

    /// List definitions of one type.
    pub async fn list(
        &self,
        connector_type: ConnectorType,
        page_size: u32,
        page_token: &str,
        view: View,
    ) -> Result<ListResult<ConnectorDefinition>> {
        let page_token = page_token.to_string();
        debug!(%connector_type, page_size, "Listing connector definitions");
        blocking(&self.repository, move |repo| {
            repo.list_definitions(connector_type, page_size, &page_token, view)
        })
        .await
    }

    /// Get a definition by name, `connector-definitions/<id>`.
    pub async fn get(
        &self,
        connector_type: ConnectorType,
        name: &str,
        view: View,
    ) -> Result<ConnectorDefinition> {
        let id = definition_id_from_name(name)?;
        blocking(&self.repository, move |repo| {
            repo.get_definition_by_id(&id, connector_type, view)
        })
        .await
    }

    /// Get a definition by permalink, `connector-definitions/<uid>`.
    ///
    /// Not scoped by type: a UID is unique across all types.
    pub async fn lookup(&self, permalink: &str, view: View) -> Result<ConnectorDefinition> {
        let uid = extract_uid_from_permalink(permalink)?;
        let uid = Uuid::parse_str(uid)
            .map_err(|_| DomainError::MalformedPermalink(permalink.to_string()))?;
        blocking(&self.repository, move |repo| {
            repo.get_definition_by_uid(uid, view)
        })
        .await
    }
}

/// Extract the id from `connector-definitions/<id>`.
pub(crate) fn definition_id_from_name(name: &str) -> Result<String> {
    if split_collection_and_id(name)? != DEFINITION_COLLECTION {
        return Err(DomainError::InvalidArgument(format!(
            "'{name}' is not a connector definition name"
        )));
    }
    Ok(extract_resource_id(name)?.to_string())
}
