//! Submits connector operations to a [`WorkflowClient`].

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::workflow::{
    CheckWorkflowParam, DeleteWorkflowParam, RetryPolicy, StartWorkflowOptions, WorkflowClient,
    WorkflowKind, WorkflowRun, WriteWorkflowParam, workflow_id,
};

/// Source of submission timestamps.
pub trait Clock: Send + Sync {
    /// Nanoseconds since the Unix epoch.
    fn now_nanos(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_nanos(&self) -> i64 {
        // Out of range only after 2262.
        Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
    }
}

/// What a caller knows about the connector being operated on.
#[derive(Debug, Clone)]
pub struct ConnectorTarget {
    pub owner_permalink: String,
    pub connector_permalink: String,
    pub image_name: String,
}

/// Dispatches Check, Write and Delete workflows.
///
/// Every submission gets a fresh `<permalink>.<nanos>.<kind>` id, a single
/// attempt retry policy, and the configured task queue. The container name
/// for the run is the workflow id.
#[derive(Clone)]
pub struct Dispatcher {
    client: Arc<dyn WorkflowClient>,
    clock: Arc<dyn Clock>,
    task_queue: String,
}

impl Dispatcher {
    pub fn new(client: Arc<dyn WorkflowClient>, task_queue: impl Into<String>) -> Self {
        Self {
            client,
            clock: Arc::new(SystemClock),
            task_queue: task_queue.into(),
        }
    }

    /// Replace the clock (tests pin timestamps with this).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn task_queue(&self) -> &str {
        &self.task_queue
    }

    fn options(&self, connector_permalink: &str, kind: WorkflowKind) -> StartWorkflowOptions {
        StartWorkflowOptions {
            id: workflow_id(connector_permalink, self.clock.now_nanos(), kind),
            task_queue: self.task_queue.clone(),
            retry_policy: RetryPolicy::single_attempt(),
        }
    }

    async fn submit<P: Serialize>(
        &self,
        options: StartWorkflowOptions,
        kind: WorkflowKind,
        param: &P,
    ) -> Result<WorkflowRun> {
        let payload = serde_json::to_value(param)?;
        let workflow_id = options.id.clone();
        match self.client.start_workflow(options, kind, payload).await {
            Ok(run) => {
                info!(
                    "started workflow with WorkflowID {} and RunID {}",
                    run.workflow_id, run.run_id
                );
                Ok(run)
            }
            Err(e) => {
                warn!(workflow_id = %workflow_id, kind = %kind, error = %e, "Workflow submission failed");
                Err(e)
            }
        }
    }

    /// Submit a connectivity check.
    pub async fn check(&self, target: &ConnectorTarget) -> Result<WorkflowRun> {
        let options = self.options(&target.connector_permalink, WorkflowKind::Check);
        let param = CheckWorkflowParam {
            owner_permalink: target.owner_permalink.clone(),
            connector_permalink: target.connector_permalink.clone(),
            image_name: target.image_name.clone(),
            container_name: options.id.clone(),
        };
        self.submit(options, WorkflowKind::Check, &param).await
    }

    /// Submit a record batch to a destination.
    pub async fn write(
        &self,
        target: &ConnectorTarget,
        configured_catalog: String,
        messages: String,
    ) -> Result<WorkflowRun> {
        let options = self.options(&target.connector_permalink, WorkflowKind::Write);
        let param = WriteWorkflowParam {
            owner_permalink: target.owner_permalink.clone(),
            connector_permalink: target.connector_permalink.clone(),
            image_name: target.image_name.clone(),
            container_name: options.id.clone(),
            configured_catalog,
            messages,
        };
        self.submit(options, WorkflowKind::Write, &param).await
    }

    /// Submit teardown of a connector's external resources.
    pub async fn delete(&self, connector_permalink: &str) -> Result<WorkflowRun> {
        let options = self.options(connector_permalink, WorkflowKind::Delete);
        let param = DeleteWorkflowParam {
            container_name: options.id.clone(),
        };
        self.submit(options, WorkflowKind::Delete, &param).await
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("task_queue", &self.task_queue)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{FixedClock, MockWorkflowClient};

    fn target() -> ConnectorTarget {
        ConnectorTarget {
            owner_permalink: "users/0a1b".into(),
            connector_permalink: "connectors/9f9f".into(),
            image_name: "conduit/destination-http:0.1.0".into(),
        }
    }

    #[tokio::test]
    async fn test_check_payload() {
        let client = Arc::new(MockWorkflowClient::new());
        let dispatcher =
            Dispatcher::new(client.clone(), "q").with_clock(Arc::new(FixedClock::new(42)));

        let run = dispatcher.check(&target()).await.unwrap();
        assert_eq!(run.workflow_id, "connectors/9f9f.42.check");

        let sub = client.last().unwrap();
        assert_eq!(sub.kind, WorkflowKind::Check);
        assert_eq!(sub.options.task_queue, "q");
        assert_eq!(sub.options.retry_policy.maximum_attempts, 1);
        let param: CheckWorkflowParam = serde_json::from_value(sub.payload).unwrap();
        assert_eq!(param.container_name, run.workflow_id);
        assert_eq!(param.image_name, "conduit/destination-http:0.1.0");
        assert_eq!(param.owner_permalink, "users/0a1b");
    }

    #[tokio::test]
    async fn test_delete_carries_only_container() {
        let client = Arc::new(MockWorkflowClient::new());
        let dispatcher =
            Dispatcher::new(client.clone(), "q").with_clock(Arc::new(FixedClock::new(7)));
        dispatcher.delete("connectors/9f9f").await.unwrap();

        let sub = client.last().unwrap();
        assert_eq!(
            sub.payload,
            serde_json::json!({"container_name": "connectors/9f9f.7.delete"})
        );
    }

    #[tokio::test]
    async fn test_submission_failure_propagates() {
        let client = Arc::new(MockWorkflowClient::new());
        client.fail_next("engine unavailable");
        let dispatcher = Dispatcher::new(client.clone(), "q");
        let err = dispatcher.check(&target()).await.unwrap_err();
        assert!(err.to_string().contains("engine unavailable"));
        assert!(client.submissions().is_empty());
    }
}
