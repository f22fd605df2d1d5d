//! Error types for workflow dispatch.

use thiserror::Error;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur while submitting or running connector workflows.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Failed to initialize the pipeline engine.
    #[error("Engine initialization failed: {0}")]
    InitFailed(String),

    /// Workflow not registered with the engine.
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    /// The engine refused or could not accept a submission.
    #[error("Workflow submission failed: {0}")]
    SubmissionFailed(String),

    /// Workflow execution failed.
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// Invalid workflow definition.
    #[error("Invalid workflow: {0}")]
    InvalidWorkflow(String),

    /// Workflow parameters could not be encoded or decoded.
    #[error("Invalid workflow parameters: {0}")]
    Params(#[from] serde_json::Error),

    /// Cloacina runtime error.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Shutdown error.
    #[error("Shutdown error: {0}")]
    ShutdownFailed(String),
}

impl From<cloacina::PipelineError> for PipelineError {
    fn from(err: cloacina::PipelineError) -> Self {
        PipelineError::Runtime(err.to_string())
    }
}
