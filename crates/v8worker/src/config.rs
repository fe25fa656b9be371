//! Worker configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::WorkerError;

/// Where `$print` output goes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrintTarget {
    /// Host standard output, flushed after every line.
    #[default]
    Stdout,
    /// The `tracing` pipeline at info level.
    Log,
}

/// Configuration for a single worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Worker name, used for the owner thread and in logs.
    pub name: String,
    /// Maximum V8 heap size in bytes.
    pub max_heap_size: Option<usize>,
    /// Initial V8 heap size in bytes. Requires `max_heap_size`.
    pub initial_heap_size: Option<usize>,
    /// Per-command execution deadline in milliseconds.
    pub execution_timeout_ms: Option<u64>,
    /// Frames captured for uncaught exceptions.
    pub stack_trace_limit: i32,
    /// `$print` destination.
    pub print: PrintTarget,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: "worker".to_string(),
            max_heap_size: None,
            initial_heap_size: None,
            execution_timeout_ms: None,
            stack_trace_limit: 10,
            print: PrintTarget::Stdout,
        }
    }
}

impl WorkerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_heap_limits(mut self, initial: Option<usize>, max: usize) -> Self {
        self.initial_heap_size = initial;
        self.max_heap_size = Some(max);
        self
    }

    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn with_print(mut self, print: PrintTarget) -> Self {
        self.print = print;
        self
    }

    /// The execution deadline, if one is configured.
    pub fn execution_timeout(&self) -> Option<Duration> {
        self.execution_timeout_ms.map(Duration::from_millis)
    }

    /// Reject inconsistent settings before any engine state is created.
    pub fn validate(&self) -> Result<(), WorkerError> {
        if self.name.is_empty() {
            return Err(WorkerError::InvalidConfig("name must not be empty".into()));
        }

        match (self.initial_heap_size, self.max_heap_size) {
            (Some(_), None) => {
                return Err(WorkerError::InvalidConfig(
                    "initial_heap_size requires max_heap_size to be set as well".into(),
                ));
            }
            (Some(initial), Some(max)) if initial > max => {
                return Err(WorkerError::InvalidConfig(format!(
                    "initial_heap_size ({}) cannot exceed max_heap_size ({})",
                    initial, max
                )));
            }
            _ => {}
        }

        if self.execution_timeout_ms == Some(0) {
            return Err(WorkerError::InvalidConfig(
                "execution_timeout_ms must be greater than zero".into(),
            ));
        }

        if self.stack_trace_limit < 0 {
            return Err(WorkerError::InvalidConfig(
                "stack_trace_limit must not be negative".into(),
            ));
        }

        Ok(())
    }
}
