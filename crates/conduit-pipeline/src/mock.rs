//! In-memory workflow client for tests.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::dispatcher::Clock;
use crate::error::{PipelineError, Result};
use crate::workflow::{StartWorkflowOptions, WorkflowClient, WorkflowKind, WorkflowRun};

/// A submission recorded by [`MockWorkflowClient`].
#[derive(Debug, Clone)]
pub struct Submission {
    pub options: StartWorkflowOptions,
    pub kind: WorkflowKind,
    pub payload: serde_json::Value,
}

/// Records submissions instead of running them.
#[derive(Debug, Default)]
pub struct MockWorkflowClient {
    submissions: Mutex<Vec<Submission>>,
    fail_next: Mutex<Option<String>>,
}

impl MockWorkflowClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next submission fail with `message`.
    pub fn fail_next(&self, message: impl Into<String>) {
        *self.fail_next.lock() = Some(message.into());
    }

    /// All accepted submissions, oldest first.
    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().clone()
    }

    /// The most recent accepted submission.
    pub fn last(&self) -> Option<Submission> {
        self.submissions.lock().last().cloned()
    }

    /// Accepted submissions of one kind.
    pub fn of_kind(&self, kind: WorkflowKind) -> Vec<Submission> {
        self.submissions
            .lock()
            .iter()
            .filter(|s| s.kind == kind)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl WorkflowClient for MockWorkflowClient {
    async fn start_workflow(
        &self,
        options: StartWorkflowOptions,
        kind: WorkflowKind,
        payload: serde_json::Value,
    ) -> Result<WorkflowRun> {
        if let Some(message) = self.fail_next.lock().take() {
            return Err(PipelineError::SubmissionFailed(message));
        }
        let mut submissions = self.submissions.lock();
        let run = WorkflowRun {
            workflow_id: options.id.clone(),
            run_id: format!("run-{}", submissions.len() + 1),
        };
        submissions.push(Submission {
            options,
            kind,
            payload,
        });
        Ok(run)
    }
}

/// A clock that returns a set value, advanced manually.
#[derive(Debug)]
pub struct FixedClock {
    nanos: AtomicI64,
}

impl FixedClock {
    pub fn new(nanos: i64) -> Self {
        Self {
            nanos: AtomicI64::new(nanos),
        }
    }

    pub fn set(&self, nanos: i64) {
        self.nanos.store(nanos, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_nanos(&self) -> i64 {
        self.nanos.load(Ordering::SeqCst)
    }
}
