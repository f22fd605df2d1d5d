//! The Cloacina task behind each connector workflow.
//!
//! Every connector workflow is a single task with no dependencies. The task
//! decodes the submitted parameters, calls the matching [`WorkflowHandler`]
//! method, and stores the handler's output in the context.

use std::sync::Arc;

use async_trait::async_trait;
use cloacina_workflow::context::Context;
use cloacina_workflow::error::TaskError;
use cloacina_workflow::namespace::TaskNamespace;
use cloacina_workflow::task::Task;
use serde_json::Value;

use crate::engine::{CTX_PARAMS, CTX_RESULT, WorkflowHandler};
use crate::workflow::{RetryPolicy, WorkflowKind};

/// Task id of the single task in a workflow of `kind`.
pub(crate) fn task_id(kind: WorkflowKind) -> &'static str {
    match kind {
        WorkflowKind::Check => "check_connection",
        WorkflowKind::Write => "write_records",
        WorkflowKind::Delete => "delete_resources",
    }
}

pub(crate) struct ConnectorTask {
    kind: WorkflowKind,
    retry_policy: RetryPolicy,
    handler: Arc<dyn WorkflowHandler>,
}

impl ConnectorTask {
    pub(crate) fn new(
        kind: WorkflowKind,
        retry_policy: RetryPolicy,
        handler: Arc<dyn WorkflowHandler>,
    ) -> Self {
        Self {
            kind,
            retry_policy,
            handler,
        }
    }

    fn failed(&self, message: impl Into<String>) -> TaskError {
        TaskError::ExecutionFailed {
            message: message.into(),
            task_id: task_id(self.kind).to_string(),
            timestamp: chrono::Utc::now(),
        }
    }

    async fn run(&self, params: Value) -> std::result::Result<Value, TaskError> {
        let decode = |e: serde_json::Error| self.failed(format!("bad parameters: {e}"));
        let output = match self.kind {
            WorkflowKind::Check => {
                let param = serde_json::from_value(params).map_err(decode)?;
                self.handler.check(param).await
            }
            WorkflowKind::Write => {
                let param = serde_json::from_value(params).map_err(decode)?;
                self.handler.write(param).await
            }
            WorkflowKind::Delete => {
                let param = serde_json::from_value(params).map_err(decode)?;
                self.handler.delete(param).await
            }
        };
        output.map_err(|e| self.failed(e.to_string()))
    }
}

impl std::fmt::Debug for ConnectorTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorTask")
            .field("kind", &self.kind)
            .field("retry_policy", &self.retry_policy)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Task for ConnectorTask {
    async fn execute(
        &self,
        mut context: Context<Value>,
    ) -> std::result::Result<Context<Value>, TaskError> {
        let params = context
            .get(CTX_PARAMS)
            .cloned()
            .ok_or_else(|| self.failed("missing workflow parameters"))?;
        let output = self.run(params).await?;
        context
            .insert(CTX_RESULT, output)
            .map_err(|e| self.failed(e.to_string()))?;
        Ok(context)
    }

    fn id(&self) -> &str {
        task_id(self.kind)
    }

    fn dependencies(&self) -> &[TaskNamespace] {
        &[]
    }

    fn retry_policy(&self) -> cloacina_workflow::retry::RetryPolicy {
        cloacina_workflow::retry::RetryPolicy {
            max_attempts: i32::try_from(self.retry_policy.maximum_attempts).unwrap_or(i32::MAX),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PipelineError, Result};
    use crate::workflow::{CheckWorkflowParam, DeleteWorkflowParam, WriteWorkflowParam};
    use serde_json::json;

    struct EchoHandler;

    #[async_trait]
    impl WorkflowHandler for EchoHandler {
        async fn check(&self, param: CheckWorkflowParam) -> Result<Value> {
            Ok(json!({ "checked": param.connector_permalink }))
        }
        async fn write(&self, _param: WriteWorkflowParam) -> Result<Value> {
            Err(PipelineError::ExecutionFailed("container exited".into()))
        }
        async fn delete(&self, _param: DeleteWorkflowParam) -> Result<Value> {
            Ok(Value::Null)
        }
    }

    fn task(kind: WorkflowKind) -> ConnectorTask {
        ConnectorTask::new(kind, RetryPolicy::single_attempt(), Arc::new(EchoHandler))
    }

    #[test]
    fn test_single_task_without_dependencies() {
        let t = task(WorkflowKind::Check);
        assert_eq!(t.id(), "check_connection");
        assert!(t.dependencies().is_empty());
        assert_eq!(t.retry_policy().max_attempts, 1);
    }

    #[test]
    fn test_retry_policy_carries_attempts() {
        let t = ConnectorTask::new(
            WorkflowKind::Write,
            RetryPolicy {
                maximum_attempts: 4,
            },
            Arc::new(EchoHandler),
        );
        assert_eq!(t.retry_policy().max_attempts, 4);
    }

    #[tokio::test]
    async fn test_execute_stores_handler_output() {
        let mut ctx = Context::new();
        ctx.insert(
            CTX_PARAMS,
            json!({
                "owner_permalink": "users/u1",
                "connector_permalink": "connectors/c1",
                "image_name": "conduit/destination-http:0.1.0",
                "container_name": "connectors/c1.1.check",
            }),
        )
        .unwrap();
        let ctx = task(WorkflowKind::Check).execute(ctx).await.unwrap();
        assert_eq!(ctx.get(CTX_RESULT), Some(&json!({"checked": "connectors/c1"})));
    }

    #[tokio::test]
    async fn test_execute_rejects_bad_parameters() {
        let mut ctx = Context::new();
        ctx.insert(CTX_PARAMS, json!({"unexpected": true})).unwrap();
        assert!(task(WorkflowKind::Delete).execute(ctx).await.is_err());
        assert!(task(WorkflowKind::Delete).execute(Context::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_execute_propagates_handler_failure() {
        let mut ctx = Context::new();
        ctx.insert(
            CTX_PARAMS,
            json!({
                "owner_permalink": "users/u1",
                "connector_permalink": "connectors/c1",
                "image_name": "i:t",
                "container_name": "connectors/c1.1.write",
                "configured_catalog": "{}",
                "messages": "",
            }),
        )
        .unwrap();
        let err = task(WorkflowKind::Write).execute(ctx).await.unwrap_err();
        assert!(err.to_string().contains("container exited"));
    }
}
