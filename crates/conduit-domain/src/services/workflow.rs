//! Bodies of the connector workflows run by the embedded engine.

use std::sync::Arc;

use async_trait::async_trait;
use conduit_pipeline::{
    CheckWorkflowParam, DeleteWorkflowParam, PipelineError, WorkflowHandler, WriteWorkflowParam,
};
use conduit_registry::ConnectorRegistry;
use conduit_store::Repository;
use conduit_types::{ConnectorState, ConnectorUpdate, View, extract_uid_from_permalink};
use serde_json::{Value, json};
use tracing::{info, warn};
use uuid::Uuid;

use super::blocking;
use crate::error::DomainError;

/// Resolves connectors through the repository and registry.
///
/// Check dispatches a live connection, runs its pre-check, and records
/// `CONNECTED` or `ERROR`. Write and Delete only log; running connector
/// containers happens outside this process.
#[derive(Clone)]
pub struct RegistryWorkflowHandler {
    repository: Arc<dyn Repository>,
    registry: Arc<ConnectorRegistry>,
}

impl RegistryWorkflowHandler {
    pub fn new(repository: Arc<dyn Repository>, registry: Arc<ConnectorRegistry>) -> Self {
        Self {
            repository,
            registry,
        }
    }

    async fn check_connector(&self, param: &CheckWorkflowParam) -> crate::Result<ConnectorState> {
        let uid = extract_uid_from_permalink(&param.connector_permalink)?;
        let uid = Uuid::parse_str(uid)
            .map_err(|_| DomainError::MalformedPermalink(param.connector_permalink.clone()))?;
        let owner = param.owner_permalink.clone();
        let connector = blocking(&self.repository, move |repo| {
            repo.lookup_connector(uid, &owner, View::Full)
        })
        .await?;

        let configuration = connector.configuration.clone().unwrap_or_default();
        let state = match self
            .registry
            .dispatch(connector.connector_definition_uid, &configuration)
        {
            Ok(connection) => connection.test().await.unwrap_or_else(|e| {
                warn!(connector = %param.connector_permalink, error = %e, "Connection check failed");
                ConnectorState::Error
            }),
            Err(e) => {
                warn!(connector = %param.connector_permalink, error = %e, "Connection dispatch failed");
                ConnectorState::Error
            }
        };

        let owner = param.owner_permalink.clone();
        blocking(&self.repository, move |repo| {
            repo.update_connector(
                &connector.id,
                &owner,
                connector.connector_type,
                &ConnectorUpdate::new().state(state),
            )
        })
        .await?;
        Ok(state)
    }
}

fn failed(err: DomainError) -> PipelineError {
    PipelineError::ExecutionFailed(err.to_string())
}

#[async_trait]
impl WorkflowHandler for RegistryWorkflowHandler {
    async fn check(&self, param: CheckWorkflowParam) -> conduit_pipeline::Result<Value> {
        let state = self.check_connector(&param).await.map_err(failed)?;
        info!(
            connector = %param.connector_permalink,
            container = %param.container_name,
            state = %state,
            "Check finished"
        );
        Ok(json!({ "state": state.as_str() }))
    }

    async fn write(&self, param: WriteWorkflowParam) -> conduit_pipeline::Result<Value> {
        let records = param.messages.lines().filter(|l| !l.trim().is_empty()).count();
        info!(
            connector = %param.connector_permalink,
            container = %param.container_name,
            image = %param.image_name,
            records,
            "Write accepted"
        );
        Ok(json!({ "records": records }))
    }

    async fn delete(&self, param: DeleteWorkflowParam) -> conduit_pipeline::Result<Value> {
        info!(container = %param.container_name, "Delete accepted");
        Ok(Value::Null)
    }
}
