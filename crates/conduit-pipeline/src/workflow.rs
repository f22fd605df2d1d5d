//! Workflow kinds, parameters, and the durable-execution client seam.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// The three long-running connector operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowKind {
    /// Verify connectivity.
    Check,
    /// Stream a batch of records through a destination.
    Write,
    /// Tear down external resources held for a connector.
    Delete,
}

impl WorkflowKind {
    pub const ALL: [WorkflowKind; 3] = [Self::Check, Self::Write, Self::Delete];

    /// Name the workflow is registered under with the engine.
    pub fn workflow_name(self) -> &'static str {
        match self {
            Self::Check => "CheckWorkflow",
            Self::Write => "WriteWorkflow",
            Self::Delete => "DeleteWorkflow",
        }
    }

    /// Suffix used in workflow identifiers.
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Check => "check",
            Self::Write => "write",
            Self::Delete => "delete",
        }
    }

    /// Inverse of [`WorkflowKind::workflow_name`].
    pub fn from_workflow_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.workflow_name() == name)
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.workflow_name())
    }
}

/// Build a workflow identifier: `<permalink>.<nanos>.<kind>`.
pub fn workflow_id(connector_permalink: &str, submitted_at_nanos: i64, kind: WorkflowKind) -> String {
    format!(
        "{connector_permalink}.{submitted_at_nanos}.{}",
        kind.suffix()
    )
}

/// Payload of a Check workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckWorkflowParam {
    pub owner_permalink: String,
    pub connector_permalink: String,
    /// `repository:tag` of the connector image.
    pub image_name: String,
    pub container_name: String,
}

/// Payload of a Write workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteWorkflowParam {
    pub owner_permalink: String,
    pub connector_permalink: String,
    pub image_name: String,
    pub container_name: String,
    /// Serialized configured catalog (JSON).
    pub configured_catalog: String,
    /// Serialized record batch (JSON lines).
    pub messages: String,
}

/// Payload of a Delete workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteWorkflowParam {
    pub container_name: String,
}

/// Retry policy attached to a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub maximum_attempts: u32,
}

impl RetryPolicy {
    /// One attempt, no engine-side retries.
    pub const fn single_attempt() -> Self {
        Self {
            maximum_attempts: 1,
        }
    }
}

/// Options for one workflow submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartWorkflowOptions {
    pub id: String,
    pub task_queue: String,
    pub retry_policy: RetryPolicy,
}

/// Handle returned for a submitted workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub workflow_id: String,
    pub run_id: String,
}

/// Client of a durable-execution service.
///
/// `start_workflow` returns once the engine has accepted the submission;
/// execution results are observed elsewhere.
#[async_trait]
pub trait WorkflowClient: Send + Sync {
    async fn start_workflow(
        &self,
        options: StartWorkflowOptions,
        kind: WorkflowKind,
        payload: serde_json::Value,
    ) -> Result<WorkflowRun>;
}

/// Client used when the workflow engine is turned off; rejects every submission.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledWorkflowClient;

#[async_trait]
impl WorkflowClient for DisabledWorkflowClient {
    async fn start_workflow(
        &self,
        options: StartWorkflowOptions,
        kind: WorkflowKind,
        _payload: serde_json::Value,
    ) -> Result<WorkflowRun> {
        Err(crate::error::PipelineError::SubmissionFailed(format!(
            "workflow engine is disabled ({kind} {})",
            options.id
        )))
    }
}
