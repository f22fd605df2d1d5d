//! Domain services.
//!
//! Services take an already-resolved [`Owner`](conduit_types::Owner); identity
//! resolution happens once per request through [`IdentityResolver`].

pub mod batch;
pub mod connectors;
pub mod definitions;
pub mod workflow;

use std::sync::Arc;

use conduit_pipeline::Dispatcher;
use conduit_registry::ConnectorRegistry;
use conduit_store::Repository;
use tracing::info;

use crate::error::{DomainError, Result};
use crate::identity::IdentityResolver;

/// Domain services facade.
///
/// The entry point for transports (the CLI today). Every service shares one
/// repository handle, one immutable registry, and one dispatcher.
#[derive(Clone)]
pub struct DomainServices {
    identity: IdentityResolver,
    definitions: definitions::DefinitionService,
    connectors: connectors::ConnectorService,
}

impl DomainServices {
    pub fn new(
        repository: Arc<dyn Repository>,
        registry: Arc<ConnectorRegistry>,
        dispatcher: Dispatcher,
        identity: IdentityResolver,
    ) -> Self {
        info!(definitions = registry.len(), "Initializing domain services");

        let definitions = definitions::DefinitionService::new(repository.clone(), registry.clone());
        let connectors = connectors::ConnectorService::new(repository, registry, dispatcher);

        Self {
            identity,
            definitions,
            connectors,
        }
    }

    pub fn identity(&self) -> &IdentityResolver {
        &self.identity
    }

    pub fn definitions(&self) -> &definitions::DefinitionService {
        &self.definitions
    }

    pub fn connectors(&self) -> &connectors::ConnectorService {
        &self.connectors
    }
}

/// Run a repository call on the blocking pool.
pub(crate) async fn blocking<T, F>(repository: &Arc<dyn Repository>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn Repository) -> conduit_store::Result<T> + Send + 'static,
{
    let repository = repository.clone();
    tokio::task::spawn_blocking(move || f(repository.as_ref()))
        .await
        .map_err(|e| DomainError::Internal(format!("repository task failed: {e}")))?
        .map_err(DomainError::from)
}
