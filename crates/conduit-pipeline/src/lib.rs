//! Workflow dispatch for connector operations, powered by Cloacina.
//!
//! Long-running connector operations (check, write, delete) are handed to a
//! durable-execution service through the [`WorkflowClient`] seam. The
//! [`Dispatcher`] assigns identifiers, payloads and the single-attempt retry
//! policy; [`PipelineEngine`] is the embedded Cloacina-backed client.
//!
//! ```text
//! ┌────────────┐  start_workflow   ┌──────────────────────────────┐
//! │ Dispatcher │ ────────────────▶ │ WorkflowClient               │
//! └────────────┘                   │  PipelineEngine (Cloacina)   │
//!                                  │  MockWorkflowClient (tests)  │
//!                                  └──────────────┬───────────────┘
//!                                                 │ task bodies
//!                                                 ▼
//!                                        WorkflowHandler
//! ```

pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod mock;
mod task;
pub mod workflow;

pub use dispatcher::{Clock, ConnectorTarget, Dispatcher, SystemClock};
pub use engine::{
    ExecutionResult, ExecutionStatus, PipelineConfig, PipelineEngine, WorkflowHandler,
};
pub use error::{PipelineError, Result};
pub use mock::{FixedClock, MockWorkflowClient, Submission};
pub use workflow::{
    CheckWorkflowParam, DeleteWorkflowParam, DisabledWorkflowClient, RetryPolicy,
    StartWorkflowOptions, WorkflowClient, WorkflowKind, WorkflowRun, WriteWorkflowParam,
    workflow_id,
};
