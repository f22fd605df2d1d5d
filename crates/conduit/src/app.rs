//! Process wiring: store, registry, workflow engine, and domain services.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use conduit_config::{ConduitConfig, PipelineSection};
use conduit_domain::{DomainServices, IdentityResolver, RegistryWorkflowHandler};
use conduit_pipeline::{
    DisabledWorkflowClient, Dispatcher, ExecutionResult, PipelineConfig, PipelineEngine,
    WorkflowClient, WorkflowRun,
};
use conduit_registry::{ConnectorRegistry, load_catalog_dir};
use conduit_store::{Repository, SqliteRepository};
use conduit_types::{Owner, RequestMetadata};
use tracing::{debug, info};

/// Everything a command needs, built once per invocation.
pub struct App {
    services: DomainServices,
    engine: Option<Arc<PipelineEngine>>,
    pipeline: PipelineSection,
}

impl App {
    pub async fn open(config: &ConduitConfig) -> Result<Self> {
        let data_dir = conduit_config::data_dir();
        let db_path = config.database_path(&data_dir);
        let repository: Arc<dyn Repository> = Arc::new(
            SqliteRepository::open(&db_path)
                .with_context(|| format!("opening store at {}", db_path.display()))?,
        );

        let catalog_dir = config.catalog_dir(&data_dir);
        let families = load_catalog_dir(&catalog_dir)
            .with_context(|| format!("loading catalog from {}", catalog_dir.display()))?;
        let registry = Arc::new(ConnectorRegistry::build(families)?);
        debug!(definitions = registry.len(), catalog = %catalog_dir.display(), "Registry built");

        let identity = IdentityResolver::from_config(&config.identity_or_default())?;

        let pipeline = config.pipeline_or_default();
        let (client, engine): (Arc<dyn WorkflowClient>, Option<Arc<PipelineEngine>>) =
            if pipeline.enabled {
                let engine = Arc::new(
                    PipelineEngine::new(
                        &config.pipeline_database_path(&data_dir),
                        PipelineConfig::from(&pipeline),
                    )
                    .await?,
                );
                let handler = RegistryWorkflowHandler::new(repository.clone(), registry.clone());
                engine
                    .register_connector_workflows(Arc::new(handler))
                    .await?;
                (engine.clone(), Some(engine))
            } else {
                info!("Workflow engine disabled; submissions will be rejected");
                (Arc::new(DisabledWorkflowClient), None)
            };

        let dispatcher = Dispatcher::new(client, pipeline.task_queue.clone());
        let services = DomainServices::new(repository, registry, dispatcher, identity);
        services.definitions().seed().await?;

        Ok(Self {
            services,
            engine,
            pipeline,
        })
    }

    pub fn services(&self) -> &DomainServices {
        &self.services
    }

    pub async fn owner(&self, metadata: &RequestMetadata) -> Result<Owner> {
        Ok(self.services.identity().resolve(metadata).await?)
    }

    /// Wait for a submitted run when the engine runs in this process.
    pub async fn wait(&self, run: &WorkflowRun) -> Result<Option<ExecutionResult>> {
        let Some(engine) = &self.engine else {
            return Ok(None);
        };
        let timeout = Duration::from_secs(self.pipeline.pipeline_timeout_secs);
        Ok(Some(engine.wait_for_run(&run.workflow_id, timeout).await?))
    }

    pub async fn shutdown(self) -> Result<()> {
        if let Some(engine) = self.engine {
            engine.shutdown().await?;
        }
        Ok(())
    }
}
