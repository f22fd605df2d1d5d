//! Record batches for destination writes.
//!
//! A write request carries model outputs under a task-specific root field.
//! The batch is turned into a configured catalog with one stream and a
//! JSON-lines sequence of record messages for that stream.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{DomainError, Result};

/// Model task that produced a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModelTask {
    #[default]
    Unspecified,
    Classification,
    Detection,
    Keypoint,
}

impl ModelTask {
    /// Field of the request payload holding the batch.
    pub fn root_field(&self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified_outputs",
            Self::Classification => "classification_outputs",
            Self::Detection => "detection_outputs",
            Self::Keypoint => "keypoint_outputs",
        }
    }

    /// Name of the stream records are written to.
    pub fn stream_name(&self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::Classification => "classification",
            Self::Detection => "detection",
            Self::Keypoint => "keypoint",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_uppercase();
        let s = s.strip_prefix("TASK_").unwrap_or(&s);
        match s {
            "UNSPECIFIED" => Some(Self::Unspecified),
            "CLASSIFICATION" => Some(Self::Classification),
            "DETECTION" => Some(Self::Detection),
            "KEYPOINT" => Some(Self::Keypoint),
            _ => None,
        }
    }
}

impl fmt::Display for ModelTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.stream_name())
    }
}

/// A validated batch ready for submission.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordBatch {
    pub task: ModelTask,
    pub records: Vec<Value>,
}

impl RecordBatch {
    /// Pick and validate the batch for `task` out of a request payload.
    pub fn from_payload(task: ModelTask, data: &Value) -> Result<Self> {
        let field = task.root_field();
        let batch = data.get(field).ok_or_else(|| {
            DomainError::InvalidArgument(format!("task input array '{field}' is not found in the payload"))
        })?;
        let Value::Array(records) = batch else {
            return Err(DomainError::InvalidArgument(format!(
                "'{field}' must be an array"
            )));
        };
        if let Some(i) = records.iter().position(|r| !r.is_object()) {
            return Err(DomainError::InvalidArgument(format!(
                "'{field}[{i}]' must be an object"
            )));
        }
        Ok(Self {
            task,
            records: records.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Configured catalog with the single stream for this task.
    pub fn configured_catalog(&self) -> Value {
        json!({
            "streams": [{
                "stream": {
                    "name": self.task.stream_name(),
                    "json_schema": {"type": "object"},
                    "supported_sync_modes": ["full_refresh"],
                },
                "sync_mode": "full_refresh",
                "destination_sync_mode": "append",
            }]
        })
    }

    /// One RECORD message per line.
    pub fn messages(&self, emitted_at_millis: i64) -> Result<String> {
        let mut out = String::new();
        for record in &self.records {
            let message = json!({
                "type": "RECORD",
                "record": {
                    "stream": self.task.stream_name(),
                    "data": record,
                    "emitted_at": emitted_at_millis,
                },
            });
            let line = serde_json::to_string(&message)
                .map_err(|e| DomainError::Internal(e.to_string()))?;
            out.push_str(&line);
            out.push('\n');
        }
        Ok(out)
    }
}
