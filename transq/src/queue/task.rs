//! Task records and their externally visible projection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::parser::ProgressSnapshot;
use crate::process::ProcessSupervisor;

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting in the queue for a concurrency slot.
    Pending,
    /// The external process is running.
    Running,
    /// The external process is suspended; the task keeps its slot.
    Paused,
    /// The process exited with code 0.
    Completed,
    /// The process failed to launch, errored, or exited nonzero.
    Failed,
    /// The task was cancelled by the caller.
    Cancelled,
}

impl TaskStatus {
    /// Whether this status admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One submitted unit of work, tracked through its full lifecycle.
///
/// The record exclusively owns the live process supervisor while the task
/// is running or paused; the supervisor is never exposed to callers. All
/// external observation goes through [`TaskView`].
pub struct Task {
    /// Unique task ID, generated at submission, never reused.
    pub id: String,
    /// Argument vector passed to the transcoder binary. Opaque, immutable.
    pub command: Vec<String>,
    /// Priority (higher runs first). Immutable.
    pub priority: i32,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Percent of the job covered, in [0, 100].
    pub progress: f64,
    /// Last parsed progress snapshot, once one exists.
    pub progress_info: Option<ProgressSnapshot>,
    /// Failure reason, when there is one.
    pub error: Option<String>,
    /// When the task was submitted.
    pub created_at: DateTime<Utc>,
    /// When the task was admitted to running.
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
    /// Live process supervisor while running or paused.
    pub(crate) supervisor: Option<ProcessSupervisor>,
}

impl Task {
    /// Create a new pending task.
    pub fn new(command: Vec<String>, priority: i32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            command,
            priority,
            status: TaskStatus::Pending,
            progress: 0.0,
            progress_info: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            supervisor: None,
        }
    }

    /// The sanitized projection of this task.
    pub fn view(&self) -> TaskView {
        TaskView {
            id: self.id.clone(),
            command: self.command.clone(),
            priority: self.priority,
            status: self.status,
            progress: self.progress,
            progress_info: self.progress_info.clone(),
            error: self.error.clone(),
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }
}

/// The externally observable projection of a [`Task`].
///
/// Carries every task field except the live process supervisor, so it can
/// be serialized and pushed over any transport without leaking handles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskView {
    pub id: String,
    pub command: Vec<String>,
    pub priority: i32,
    pub status: TaskStatus,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_info: Option<ProgressSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Aggregate queue counters, computed on demand from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Number of tasks waiting in the queue.
    pub queued: usize,
    /// Number of tasks holding a concurrency slot (running or paused).
    pub running: usize,
    /// Number of retained completed tasks.
    pub completed: usize,
    /// Current concurrency limit.
    pub concurrency_limit: usize,
}
