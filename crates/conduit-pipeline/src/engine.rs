//! Embedded durable-execution engine around Cloacina's `DefaultRunner`.
//!
//! `PipelineEngine` registers the three connector workflows, accepts
//! submissions through [`WorkflowClient`], and runs each submission in the
//! background. Task bodies are delegated to a [`WorkflowHandler`].

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use cloacina::prelude::*;
use conduit_config::PipelineSection;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::task::{ConnectorTask, task_id};
use crate::workflow::{
    CheckWorkflowParam, DeleteWorkflowParam, RetryPolicy, StartWorkflowOptions, WorkflowClient,
    WorkflowKind, WorkflowRun, WriteWorkflowParam,
};

/// Context key holding the submitted payload.
pub const CTX_PARAMS: &str = "params";
/// Context key the task writes the handler output to.
pub const CTX_RESULT: &str = "result";

const RUN_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(50);

/// Finished runs nobody waited for are dropped once this many are tracked.
const MAX_TRACKED_RUNS: usize = 1024;

/// Configuration for the pipeline engine.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Queue this engine serves; submissions for other queues are refused.
    pub task_queue: String,

    /// Maximum concurrent tasks.
    pub max_concurrent_tasks: usize,

    /// Task execution timeout in seconds.
    pub task_timeout_secs: u64,

    /// Workflow execution timeout in seconds.
    pub pipeline_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig::from(&PipelineSection::default())
    }
}

impl From<&PipelineSection> for PipelineConfig {
    fn from(section: &PipelineSection) -> Self {
        Self {
            task_queue: section.task_queue.clone(),
            max_concurrent_tasks: section.max_concurrent_tasks,
            task_timeout_secs: section.task_timeout_secs,
            pipeline_timeout_secs: section.pipeline_timeout_secs,
        }
    }
}

/// Result of a workflow execution.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Run id handed out at submission.
    pub run_id: String,
    /// Final status.
    pub status: ExecutionStatus,
    /// Output context (if completed successfully).
    pub output: Option<serde_json::Value>,
}

/// Status of an execution.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionStatus {
    Completed,
    Failed(String),
    Running,
}

/// Bodies of the connector workflows.
#[async_trait]
pub trait WorkflowHandler: Send + Sync {
    async fn check(&self, param: CheckWorkflowParam) -> Result<serde_json::Value>;
    async fn write(&self, param: WriteWorkflowParam) -> Result<serde_json::Value>;
    async fn delete(&self, param: DeleteWorkflowParam) -> Result<serde_json::Value>;
}

/// The embedded engine.
pub struct PipelineEngine {
    runner: Arc<DefaultRunner>,
    task_queue: String,
    /// Policy every registered task is built with.
    retry_policy: RetryPolicy,
    /// Names of registered workflows.
    workflows: RwLock<HashSet<String>>,
    /// Submitted runs by workflow id.
    runs: Arc<RwLock<HashMap<String, ExecutionResult>>>,
}

impl PipelineEngine {
    /// Initialize the engine with a SQLite database.
    pub async fn new(db_path: &Path, config: PipelineConfig) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PipelineError::InitFailed(format!("{}: {e}", parent.display())))?;
        }
        let db_url = format!("sqlite://{}", db_path.display());

        let mut runner_config = DefaultRunnerConfig::default();
        runner_config.max_concurrent_tasks = config.max_concurrent_tasks;
        runner_config.task_timeout = std::time::Duration::from_secs(config.task_timeout_secs);
        runner_config.pipeline_timeout =
            Some(std::time::Duration::from_secs(config.pipeline_timeout_secs));
        runner_config.enable_cron_scheduling = false;
        runner_config.enable_trigger_scheduling = false;

        let runner = DefaultRunner::with_config(&db_url, runner_config)
            .await
            .map_err(|e| PipelineError::InitFailed(e.to_string()))?;

        info!("Pipeline engine initialized with database: {}", db_url);

        Ok(Self {
            runner: Arc::new(runner),
            task_queue: config.task_queue,
            retry_policy: RetryPolicy::single_attempt(),
            workflows: RwLock::new(HashSet::new()),
            runs: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Register Check, Write and Delete, each a single task calling `handler`.
    pub async fn register_connector_workflows(
        &self,
        handler: Arc<dyn WorkflowHandler>,
    ) -> Result<()> {
        for kind in WorkflowKind::ALL {
            let name = kind.workflow_name();
            let task = Arc::new(ConnectorTask::new(kind, self.retry_policy, handler.clone()));

            // The executor resolves tasks by namespace at run time.
            let namespace =
                cloacina_workflow::TaskNamespace::new("public", "embedded", name, task_id(kind));
            let task_clone = task.clone();
            cloacina::register_task_constructor(namespace, move || task_clone.clone());

            let workflow = Workflow::builder(name)
                .description(description(kind))
                .add_task(task)
                .map_err(|e| PipelineError::InvalidWorkflow(e.to_string()))?
                .build()
                .map_err(|e| PipelineError::InvalidWorkflow(e.to_string()))?;
            cloacina::register_workflow_constructor(name.to_string(), move || workflow.clone());

            self.workflows.write().await.insert(name.to_string());
            info!("Workflow registered: {}", name);
        }
        Ok(())
    }

    /// State of a submitted run, if the id is still tracked.
    pub async fn run_status(&self, workflow_id: &str) -> Option<ExecutionResult> {
        self.runs.read().await.get(workflow_id).cloned()
    }

    /// Wait until a submitted run leaves `Running`, or `timeout` passes.
    ///
    /// A finished run is handed back once and then forgotten.
    pub async fn wait_for_run(
        &self,
        workflow_id: &str,
        timeout: std::time::Duration,
    ) -> Result<ExecutionResult> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let mut runs = self.runs.write().await;
                let running = match runs.get(workflow_id) {
                    None => return Err(PipelineError::WorkflowNotFound(workflow_id.to_string())),
                    Some(result) => result.status == ExecutionStatus::Running,
                };
                if !running {
                    if let Some(result) = runs.remove(workflow_id) {
                        return Ok(result);
                    }
                }
                if tokio::time::Instant::now() >= deadline {
                    return Err(PipelineError::ExecutionFailed(format!(
                        "timed out waiting for {workflow_id}"
                    )));
                }
            }
            tokio::time::sleep(RUN_POLL_INTERVAL).await;
        }
    }

    /// Gracefully shut down the engine.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Pipeline engine shutting down...");

        self.runner
            .shutdown()
            .await
            .map_err(|e| PipelineError::ShutdownFailed(e.to_string()))?;

        info!("Pipeline engine shutdown complete");
        Ok(())
    }

    async fn ensure_registered(&self, workflow_name: &str) -> Result<()> {
        if self.workflows.read().await.contains(workflow_name) {
            Ok(())
        } else {
            Err(PipelineError::WorkflowNotFound(workflow_name.to_string()))
        }
    }

    fn check_options(&self, options: &StartWorkflowOptions) -> Result<()> {
        if options.task_queue != self.task_queue {
            return Err(PipelineError::SubmissionFailed(format!(
                "task queue {} is not served here (expected {})",
                options.task_queue, self.task_queue
            )));
        }
        if options.retry_policy != self.retry_policy {
            return Err(PipelineError::SubmissionFailed(format!(
                "unsupported retry policy: {} attempts (expected {})",
                options.retry_policy.maximum_attempts, self.retry_policy.maximum_attempts
            )));
        }
        Ok(())
    }
}

/// Drop finished runs once the map reaches `limit`.
fn prune_finished(runs: &mut HashMap<String, ExecutionResult>, limit: usize) {
    if runs.len() >= limit {
        let before = runs.len();
        runs.retain(|_, run| run.status == ExecutionStatus::Running);
        debug!(dropped = before - runs.len(), "Pruned finished workflow runs");
    }
}

#[async_trait]
impl WorkflowClient for PipelineEngine {
    async fn start_workflow(
        &self,
        options: StartWorkflowOptions,
        kind: WorkflowKind,
        payload: serde_json::Value,
    ) -> Result<WorkflowRun> {
        let name = kind.workflow_name();
        self.ensure_registered(name).await?;
        self.check_options(&options)?;

        let run_id = Uuid::new_v4().to_string();
        let mut context = Context::new();
        context
            .insert(CTX_PARAMS, payload)
            .map_err(|e| PipelineError::SubmissionFailed(e.to_string()))?;

        {
            let mut runs = self.runs.write().await;
            if runs.contains_key(&options.id) {
                return Err(PipelineError::SubmissionFailed(format!(
                    "workflow already started: {}",
                    options.id
                )));
            }
            prune_finished(&mut runs, MAX_TRACKED_RUNS);
            runs.insert(
                options.id.clone(),
                ExecutionResult {
                    run_id: run_id.clone(),
                    status: ExecutionStatus::Running,
                    output: None,
                },
            );
        }

        let runner = self.runner.clone();
        let runs = self.runs.clone();
        let workflow_id = options.id.clone();
        let background_run_id = run_id.clone();
        tokio::spawn(async move {
            let result = match run_to_completion(&runner, name, context, background_run_id.clone())
                .await
            {
                Ok(result) => result,
                Err(e) => {
                    error!(workflow_id = %workflow_id, error = %e, "Workflow run failed");
                    ExecutionResult {
                        run_id: background_run_id,
                        status: ExecutionStatus::Failed(e.to_string()),
                        output: None,
                    }
                }
            };
            debug!(workflow_id = %workflow_id, status = ?result.status, "Workflow run finished");
            runs.write().await.insert(workflow_id, result);
        });

        Ok(WorkflowRun {
            workflow_id: options.id,
            run_id,
        })
    }
}

async fn run_to_completion(
    runner: &DefaultRunner,
    workflow_name: &str,
    context: Context<serde_json::Value>,
    run_id: String,
) -> Result<ExecutionResult> {
    let result = runner
        .execute(workflow_name, context)
        .await
        .map_err(|e| PipelineError::ExecutionFailed(e.to_string()))?;

    let status = match result.status {
        PipelineStatus::Completed => ExecutionStatus::Completed,
        PipelineStatus::Failed => ExecutionStatus::Failed(result.error_message.unwrap_or_default()),
        PipelineStatus::Running => ExecutionStatus::Running,
        PipelineStatus::Cancelled => ExecutionStatus::Failed("Cancelled".to_string()),
        _ => ExecutionStatus::Failed("Unknown status".to_string()),
    };

    let context_data = result.final_context.into_data();
    let output = match serde_json::to_value(&context_data) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!("Failed to serialize execution output: {e}");
            None
        }
    };

    Ok(ExecutionResult {
        run_id,
        status,
        output,
    })
}

fn description(kind: WorkflowKind) -> &'static str {
    match kind {
        WorkflowKind::Check => "Check connectivity of a connector",
        WorkflowKind::Write => "Write a record batch through a destination connector",
        WorkflowKind::Delete => "Remove resources held for a deleted connector",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct NoopHandler;

    #[async_trait]
    impl WorkflowHandler for NoopHandler {
        async fn check(&self, _param: CheckWorkflowParam) -> Result<serde_json::Value> {
            Ok(serde_json::json!("CONNECTED"))
        }
        async fn write(&self, _param: WriteWorkflowParam) -> Result<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }
        async fn delete(&self, _param: DeleteWorkflowParam) -> Result<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }
    }

    async fn test_engine(dir: &Path) -> PipelineEngine {
        PipelineEngine::new(&dir.join("pipeline.db"), PipelineConfig::default())
            .await
            .unwrap()
    }

    async fn registered_engine(dir: &Path) -> PipelineEngine {
        let engine = test_engine(dir).await;
        engine
            .register_connector_workflows(Arc::new(NoopHandler))
            .await
            .unwrap();
        engine
    }

    fn options(id: &str) -> StartWorkflowOptions {
        StartWorkflowOptions {
            id: id.to_string(),
            task_queue: "connector-backend".to_string(),
            retry_policy: RetryPolicy::single_attempt(),
        }
    }

    fn finished(run_id: &str) -> ExecutionResult {
        ExecutionResult {
            run_id: run_id.to_string(),
            status: ExecutionStatus::Completed,
            output: None,
        }
    }

    #[test]
    fn test_config_from_section() {
        let section = PipelineSection {
            task_queue: "q".to_string(),
            max_concurrent_tasks: 8,
            task_timeout_secs: 30,
            ..Default::default()
        };
        let config = PipelineConfig::from(&section);
        assert_eq!(config.task_queue, "q");
        assert_eq!(config.max_concurrent_tasks, 8);
        assert_eq!(config.task_timeout_secs, 30);
        assert_eq!(config.pipeline_timeout_secs, 600);
    }

    #[tokio::test]
    async fn test_register_connector_workflows() {
        let dir = TempDir::new().unwrap();
        let engine = test_engine(dir.path()).await;
        for kind in WorkflowKind::ALL {
            assert!(engine.ensure_registered(kind.workflow_name()).await.is_err());
        }

        engine
            .register_connector_workflows(Arc::new(NoopHandler))
            .await
            .unwrap();

        for kind in WorkflowKind::ALL {
            engine.ensure_registered(kind.workflow_name()).await.unwrap();
        }
        engine.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_unregistered_workflow() {
        let dir = TempDir::new().unwrap();
        let engine = test_engine(dir.path()).await;
        let err = engine
            .start_workflow(options("connectors/x.1.check"), WorkflowKind::Check, serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::WorkflowNotFound(name) if name == "CheckWorkflow"));
        engine.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_workflow_id_rejected() {
        let dir = TempDir::new().unwrap();
        let engine = registered_engine(dir.path()).await;

        let payload = serde_json::json!({"container_name": "connectors/x.1.delete"});
        let run = engine
            .start_workflow(options("connectors/x.1.delete"), WorkflowKind::Delete, payload.clone())
            .await
            .unwrap();
        assert_eq!(run.workflow_id, "connectors/x.1.delete");
        assert!(engine.run_status(&run.workflow_id).await.is_some());

        let err = engine
            .start_workflow(options("connectors/x.1.delete"), WorkflowKind::Delete, payload)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::SubmissionFailed(_)));
        engine.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_other_retry_policy_rejected() {
        let dir = TempDir::new().unwrap();
        let engine = registered_engine(dir.path()).await;

        let mut opts = options("connectors/x.1.check");
        opts.retry_policy = RetryPolicy {
            maximum_attempts: 3,
        };
        let err = engine
            .start_workflow(opts, WorkflowKind::Check, serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::SubmissionFailed(msg) if msg.contains("retry policy")));
        assert!(engine.run_status("connectors/x.1.check").await.is_none());
        engine.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_other_task_queue_rejected() {
        let dir = TempDir::new().unwrap();
        let engine = registered_engine(dir.path()).await;

        let mut opts = options("connectors/x.1.check");
        opts.task_queue = "elsewhere".to_string();
        let err = engine
            .start_workflow(opts, WorkflowKind::Check, serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::SubmissionFailed(msg) if msg.contains("elsewhere")));
        engine.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_for_unknown_run() {
        let dir = TempDir::new().unwrap();
        let engine = test_engine(dir.path()).await;
        let err = engine
            .wait_for_run("connectors/x.1.check", std::time::Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::WorkflowNotFound(_)));
        engine.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_finished_run_forgotten_after_wait() {
        let dir = TempDir::new().unwrap();
        let engine = test_engine(dir.path()).await;
        engine
            .runs
            .write()
            .await
            .insert("connectors/x.1.check".to_string(), finished("r1"));

        let result = engine
            .wait_for_run("connectors/x.1.check", std::time::Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(result.run_id, "r1");
        assert_eq!(result.status, ExecutionStatus::Completed);
        assert!(engine.run_status("connectors/x.1.check").await.is_none());
        engine.shutdown().await.unwrap();
    }

    #[test]
    fn test_prune_keeps_running_runs() {
        let mut runs = HashMap::new();
        runs.insert("a".to_string(), finished("1"));
        runs.insert(
            "b".to_string(),
            ExecutionResult {
                run_id: "2".to_string(),
                status: ExecutionStatus::Running,
                output: None,
            },
        );

        prune_finished(&mut runs, 3);
        assert_eq!(runs.len(), 2);

        prune_finished(&mut runs, 2);
        assert_eq!(runs.len(), 1);
        assert!(runs.contains_key("b"));
    }
}
