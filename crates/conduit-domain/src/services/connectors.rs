//! Connector service.
//!
//! Owner-scoped operations on connectors of one type. Configuration leaves
//! this service masked; updates treat the mask sentinel as "keep the stored
//! secret".

use std::sync::Arc;

use chrono::Utc;
use conduit_pipeline::{ConnectorTarget, Dispatcher, WorkflowRun};
use conduit_registry::{ConnectorRegistry, merge_patch};
use conduit_store::{ListResult, Repository, StoreError};
use conduit_types::{
    Connector, ConnectorDefinition, ConnectorState, ConnectorType, ConnectorUpdate, Owner, View,
    extract_resource_id, extract_uid_from_permalink, split_collection_and_id,
};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use super::batch::{ModelTask, RecordBatch};
use super::blocking;
use super::definitions::definition_id_from_name;
use crate::error::{DomainError, Result};

const CONNECTOR_COLLECTION: &str = "connectors";

/// Input of [`ConnectorService::create`].
#[derive(Debug, Clone, PartialEq)]
pub struct CreateConnector {
    pub id: String,
    /// `connector-definitions/<id>`.
    pub connector_definition: String,
    pub description: String,
    pub configuration: Value,
}

/// Input of [`ConnectorService::update`]; `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateConnector {
    pub description: Option<String>,
    /// Merge patch over the stored configuration. Credential fields equal
    /// to the mask sentinel are dropped from the patch first.
    pub configuration: Option<Value>,
}

/// Connector operations.
#[derive(Clone)]
pub struct ConnectorService {
    repository: Arc<dyn Repository>,
    registry: Arc<ConnectorRegistry>,
    dispatcher: Dispatcher,
}

impl ConnectorService {
    pub fn new(
        repository: Arc<dyn Repository>,
        registry: Arc<ConnectorRegistry>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            repository,
            registry,
            dispatcher,
        }
    }

    /// Create a connector; it starts `DISCONNECTED`.
    pub async fn create(
        &self,
        owner: &Owner,
        connector_type: ConnectorType,
        request: CreateConnector,
    ) -> Result<Connector> {
        validate_connector_id(&request.id)?;
        if !request.configuration.is_object() {
            return Err(DomainError::InvalidArgument(
                "configuration must be an object".to_string(),
            ));
        }
        let definition_id = definition_id_from_name(&request.connector_definition)?;
        let definition = self
            .registry
            .definition_by_id(&definition_id, connector_type)
            .ok_or_else(|| {
                DomainError::NotFound(format!(
                    "{} connector definition '{definition_id}'",
                    connector_type
                ))
            })?
            .clone();

        let owner_permalink = owner.permalink();
        let connector = Connector::new(
            request.id.clone(),
            owner_permalink.clone(),
            &definition,
            request.configuration,
        )
        .with_description(request.description);

        let existing = self
            .find(&request.id, &owner_permalink, connector_type)
            .await?;
        if existing.is_some() {
            return Err(DomainError::AlreadyExists(format!(
                "connectors/{}",
                request.id
            )));
        }

        let row = connector.clone();
        blocking(&self.repository, move |repo| repo.create_connector(&row)).await?;

        let connector = self.masked(connector)?;
        info!(
            owner = %owner_permalink,
            connector_id = %connector.id,
            connector_type = %connector_type,
            definition = %definition.id,
            configuration = %connector.configuration.clone().unwrap_or_default(),
            "Created connector"
        );
        Ok(connector)
    }

    /// List an owner's connectors of one type.
    pub async fn list(
        &self,
        owner: &Owner,
        connector_type: ConnectorType,
        page_size: u32,
        page_token: &str,
        view: View,
    ) -> Result<ListResult<Connector>> {
        let owner_permalink = owner.permalink();
        let page_token = page_token.to_string();
        let mut page = blocking(&self.repository, move |repo| {
            repo.list_connectors(&owner_permalink, connector_type, page_size, &page_token, view)
        })
        .await?;
        page.items = page
            .items
            .into_iter()
            .map(|c| self.masked(c))
            .collect::<Result<_>>()?;
        Ok(page)
    }

    /// Get by name, `connectors/<id>`.
    pub async fn get(
        &self,
        owner: &Owner,
        connector_type: ConnectorType,
        name: &str,
        view: View,
    ) -> Result<Connector> {
        let id = connector_id_from_name(name)?;
        let connector = self.load(&id, owner, connector_type, view).await?;
        self.masked(connector)
    }

    /// Get by permalink, `connectors/<uid>`.
    pub async fn lookup(
        &self,
        owner: &Owner,
        connector_type: ConnectorType,
        permalink: &str,
        view: View,
    ) -> Result<Connector> {
        let uid = extract_uid_from_permalink(permalink)?;
        let uid = Uuid::parse_str(uid)
            .map_err(|_| DomainError::MalformedPermalink(permalink.to_string()))?;
        let owner_permalink = owner.permalink();
        let connector = blocking(&self.repository, move |repo| {
            repo.get_connector_by_uid(uid, &owner_permalink, connector_type, view)
        })
        .await?;
        self.masked(connector)
    }

    /// Update description and/or configuration.
    pub async fn update(
        &self,
        owner: &Owner,
        connector_type: ConnectorType,
        name: &str,
        request: UpdateConnector,
    ) -> Result<Connector> {
        let id = connector_id_from_name(name)?;
        let existing = self.load(&id, owner, connector_type, View::Full).await?;

        let mut update = ConnectorUpdate::new();
        if let Some(description) = request.description {
            update = update.description(description);
        }
        if let Some(mut patch) = request.configuration {
            if !patch.is_object() {
                return Err(DomainError::InvalidArgument(
                    "configuration must be an object".to_string(),
                ));
            }
            self.registry
                .strip_masked(existing.connector_definition_uid, &mut patch)?;
            let mut configuration = existing
                .configuration
                .clone()
                .unwrap_or_else(|| Value::Object(Default::default()));
            merge_patch(&mut configuration, patch);
            update = update.configuration(configuration);
        }
        if update.is_empty() {
            return Err(DomainError::InvalidArgument(
                "update carries no fields".to_string(),
            ));
        }

        let owner_permalink = owner.permalink();
        let row_id = id.clone();
        blocking(&self.repository, move |repo| {
            repo.update_connector(&row_id, &owner_permalink, connector_type, &update)
        })
        .await?;
        debug!(owner = %owner.permalink(), connector_id = %id, "Updated connector");

        let connector = self.load(&id, owner, connector_type, View::Full).await?;
        self.masked(connector)
    }

    /// Change a connector's id.
    pub async fn rename(
        &self,
        owner: &Owner,
        connector_type: ConnectorType,
        name: &str,
        new_id: &str,
    ) -> Result<Connector> {
        let id = connector_id_from_name(name)?;
        validate_connector_id(new_id)?;
        self.load(&id, owner, connector_type, View::Basic).await?;

        let owner_permalink = owner.permalink();
        if id != new_id
            && self
                .find(new_id, &owner_permalink, connector_type)
                .await?
                .is_some()
        {
            return Err(DomainError::AlreadyExists(format!("connectors/{new_id}")));
        }

        let (old, new) = (id.clone(), new_id.to_string());
        blocking(&self.repository, move |repo| {
            repo.rename_connector(&old, &owner_permalink, connector_type, &new)
        })
        .await?;
        info!(owner = %owner.permalink(), from = %id, to = %new_id, "Renamed connector");

        let connector = self.load(new_id, owner, connector_type, View::Full).await?;
        self.masked(connector)
    }

    /// Delete a connector and submit teardown of its external resources.
    pub async fn delete(
        &self,
        owner: &Owner,
        connector_type: ConnectorType,
        name: &str,
    ) -> Result<WorkflowRun> {
        let id = connector_id_from_name(name)?;
        let owner_permalink = owner.permalink();
        let connector = self.load(&id, owner, connector_type, View::Basic).await?;

        let row_id = id.clone();
        blocking(&self.repository, move |repo| {
            repo.delete_connector(&row_id, &owner_permalink, connector_type)
        })
        .await?;
        info!(owner = %owner.permalink(), connector_id = %id, "Deleted connector");

        Ok(self.dispatcher.delete(&connector.permalink()).await?)
    }

    /// Submit a Check workflow; its handler records the resulting state.
    pub async fn connect(
        &self,
        owner: &Owner,
        connector_type: ConnectorType,
        name: &str,
    ) -> Result<(Connector, WorkflowRun)> {
        let id = connector_id_from_name(name)?;
        let connector = self.load(&id, owner, connector_type, View::Full).await?;
        let definition = self.definition(&connector)?;
        let run = self
            .dispatcher
            .check(&target(owner, &connector, &definition))
            .await?;
        Ok((self.masked(connector)?, run))
    }

    /// Set the state to `DISCONNECTED`.
    pub async fn disconnect(
        &self,
        owner: &Owner,
        connector_type: ConnectorType,
        name: &str,
    ) -> Result<Connector> {
        self.set_state(owner, connector_type, name, ConnectorState::Disconnected)
            .await
    }

    /// Run the connection pre-check now and return the state it reports.
    ///
    /// The stored state is not changed.
    pub async fn test(
        &self,
        owner: &Owner,
        connector_type: ConnectorType,
        name: &str,
    ) -> Result<ConnectorState> {
        let id = connector_id_from_name(name)?;
        let connector = self.load(&id, owner, connector_type, View::Full).await?;
        let configuration = connector.configuration.clone().unwrap_or_default();
        let connection = self
            .registry
            .dispatch(connector.connector_definition_uid, &configuration)?;
        let state = connection.test().await?;
        debug!(connector_id = %id, state = %state, "Tested connector");
        Ok(state)
    }

    /// Submit a record batch to a connected destination.
    pub async fn write(
        &self,
        owner: &Owner,
        name: &str,
        task: ModelTask,
        data: &Value,
    ) -> Result<WorkflowRun> {
        let id = connector_id_from_name(name)?;
        let connector = self
            .load(&id, owner, ConnectorType::Destination, View::Full)
            .await?;
        if connector.state != ConnectorState::Connected {
            return Err(DomainError::FailedPrecondition(format!(
                "connectors/{id} is {}, not CONNECTED",
                connector.state
            )));
        }
        let batch = RecordBatch::from_payload(task, data)?;
        let definition = self.definition(&connector)?;

        let catalog = serde_json::to_string(&batch.configured_catalog())
            .map_err(|e| DomainError::Internal(e.to_string()))?;
        let messages = batch.messages(Utc::now().timestamp_millis())?;
        debug!(connector_id = %id, records = batch.len(), task = %task, "Submitting write");

        Ok(self
            .dispatcher
            .write(&target(owner, &connector, &definition), catalog, messages)
            .await?)
    }

    async fn set_state(
        &self,
        owner: &Owner,
        connector_type: ConnectorType,
        name: &str,
        state: ConnectorState,
    ) -> Result<Connector> {
        let id = connector_id_from_name(name)?;
        self.load(&id, owner, connector_type, View::Basic).await?;
        let owner_permalink = owner.permalink();
        let row_id = id.clone();
        blocking(&self.repository, move |repo| {
            repo.update_connector(
                &row_id,
                &owner_permalink,
                connector_type,
                &ConnectorUpdate::new().state(state),
            )
        })
        .await?;
        let connector = self.load(&id, owner, connector_type, View::Full).await?;
        self.masked(connector)
    }

    async fn load(
        &self,
        id: &str,
        owner: &Owner,
        connector_type: ConnectorType,
        view: View,
    ) -> Result<Connector> {
        let id = id.to_string();
        let owner_permalink = owner.permalink();
        blocking(&self.repository, move |repo| {
            repo.get_connector_by_id(&id, &owner_permalink, connector_type, view)
        })
        .await
    }

    async fn find(
        &self,
        id: &str,
        owner_permalink: &str,
        connector_type: ConnectorType,
    ) -> Result<Option<Connector>> {
        let id = id.to_string();
        let owner_permalink = owner_permalink.to_string();
        blocking(&self.repository, move |repo| {
            match repo.get_connector_by_id(&id, &owner_permalink, connector_type, View::Basic) {
                Ok(c) => Ok(Some(c)),
                Err(StoreError::NotFound(_)) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
    }

    fn definition(&self, connector: &Connector) -> Result<ConnectorDefinition> {
        Ok(self
            .registry
            .definition_by_uid(connector.connector_definition_uid)?
            .clone())
    }

    fn masked(&self, mut connector: Connector) -> Result<Connector> {
        if let Some(configuration) = connector.configuration.as_mut() {
            self.registry
                .mask(connector.connector_definition_uid, configuration)?;
        }
        Ok(connector)
    }
}

fn target(owner: &Owner, connector: &Connector, definition: &ConnectorDefinition) -> ConnectorTarget {
    ConnectorTarget {
        owner_permalink: owner.permalink(),
        connector_permalink: connector.permalink(),
        image_name: definition.image(),
    }
}

/// Extract the id from `connectors/<id>`.
fn connector_id_from_name(name: &str) -> Result<String> {
    if split_collection_and_id(name)? != CONNECTOR_COLLECTION {
        return Err(DomainError::InvalidArgument(format!(
            "'{name}' is not a connector name"
        )));
    }
    Ok(extract_resource_id(name)?.to_string())
}

/// Ids are lowercase RFC-1034 labels: `^[a-z]([a-z0-9-]{0,61}[a-z0-9])?$`.
pub fn validate_connector_id(id: &str) -> Result<()> {
    let bytes = id.as_bytes();
    let valid = matches!(bytes.first(), Some(b'a'..=b'z'))
        && bytes.len() <= 63
        && bytes
            .iter()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
        && bytes.last() != Some(&b'-');
    if valid {
        Ok(())
    } else {
        Err(DomainError::InvalidArgument(format!(
            "connector id '{id}' must match ^[a-z]([a-z0-9-]{{0,61}}[a-z0-9])?$"
        )))
    }
}
