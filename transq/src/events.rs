//! Task lifecycle events.
//!
//! Events are broadcast to every subscriber when a task changes state or
//! produces output, so external observers (an IPC bridge, a CLI, tests)
//! can follow the queue without polling. Payloads carry sanitized task
//! views only; live process handles never cross this boundary.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::parser::ProgressSnapshot;
use crate::queue::task::TaskView;

/// Default channel capacity for task events.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Events broadcast as tasks move through their lifecycle.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum TaskEvent {
    /// A task was submitted and entered the queue.
    TaskAdded(TaskView),
    /// A task was admitted and its process started.
    TaskStarted(TaskView),
    /// A progress line was parsed for a running task.
    TaskProgress {
        id: String,
        percent: f64,
        snapshot: ProgressSnapshot,
    },
    /// One raw line of process output.
    TaskOutput { id: String, chunk: String },
    /// A task's process exited with code 0.
    TaskCompleted(TaskView),
    /// A task failed to launch, errored, or exited nonzero.
    TaskFailed(TaskView),
    /// A task was cancelled.
    TaskCancelled(TaskView),
}

impl TaskEvent {
    /// The ID of the task this event concerns.
    pub fn task_id(&self) -> &str {
        match self {
            Self::TaskAdded(view)
            | Self::TaskStarted(view)
            | Self::TaskCompleted(view)
            | Self::TaskFailed(view)
            | Self::TaskCancelled(view) => &view.id,
            Self::TaskProgress { id, .. } | Self::TaskOutput { id, .. } => id,
        }
    }

    /// The terminal task view carried by this event, if it is a terminal one.
    pub fn terminal_view(&self) -> Option<&TaskView> {
        match self {
            Self::TaskCompleted(view) | Self::TaskFailed(view) | Self::TaskCancelled(view) => {
                Some(view)
            }
            _ => None,
        }
    }

    /// Get a description of the event for logging.
    pub fn description(&self) -> String {
        match self {
            Self::TaskAdded(view) => format!("Task added: {}", view.id),
            Self::TaskStarted(view) => format!("Task started: {}", view.id),
            Self::TaskProgress { id, percent, .. } => {
                format!("Task progress: {} ({:.1}%)", id, percent)
            }
            Self::TaskOutput { id, .. } => format!("Task output: {}", id),
            Self::TaskCompleted(view) => format!("Task completed: {}", view.id),
            Self::TaskFailed(view) => format!("Task failed: {}", view.id),
            Self::TaskCancelled(view) => format!("Task cancelled: {}", view.id),
        }
    }
}

/// Broadcaster for task events.
///
/// Uses tokio's broadcast channel to distribute events to multiple
/// subscribers; publishing with no subscribers is a no-op.
#[derive(Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<TaskEvent>,
}

impl EventBroadcaster {
    /// Create a new broadcaster with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new broadcaster with specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to task events.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.sender.subscribe()
    }

    /// Publish a task event.
    ///
    /// Returns the number of receivers that received the event.
    pub fn publish(&self, event: TaskEvent) -> usize {
        tracing::trace!("Publishing event: {}", event.description());
        self.sender.send(event).unwrap_or(0)
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::task::Task;

    fn view() -> TaskView {
        Task::new(vec!["-i".to_string(), "in.mp4".to_string()], 0).view()
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let broadcaster = EventBroadcaster::new();
        let mut receiver = broadcaster.subscribe();

        let event = TaskEvent::TaskAdded(view());
        let id = event.task_id().to_string();
        assert_eq!(broadcaster.publish(event), 1);

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.task_id(), id);
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let broadcaster = EventBroadcaster::new();
        let mut rx1 = broadcaster.subscribe();
        let mut rx2 = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 2);

        assert_eq!(broadcaster.publish(TaskEvent::TaskAdded(view())), 2);
        assert!(rx1.recv().await.is_ok());
        assert!(rx2.recv().await.is_ok());
    }

    #[test]
    fn test_publish_without_subscribers() {
        let broadcaster = EventBroadcaster::new();
        assert_eq!(broadcaster.publish(TaskEvent::TaskAdded(view())), 0);
    }

    #[test]
    fn test_terminal_view() {
        let v = view();
        assert!(TaskEvent::TaskCompleted(v.clone()).terminal_view().is_some());
        assert!(TaskEvent::TaskFailed(v.clone()).terminal_view().is_some());
        assert!(TaskEvent::TaskCancelled(v.clone()).terminal_view().is_some());
        assert!(TaskEvent::TaskAdded(v.clone()).terminal_view().is_none());
        assert!(TaskEvent::TaskStarted(v).terminal_view().is_none());
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let json = serde_json::to_value(TaskEvent::TaskAdded(view())).unwrap();
        assert_eq!(json["event"], "taskAdded");

        let json = serde_json::to_value(TaskEvent::TaskOutput {
            id: "t1".to_string(),
            chunk: "frame=1".to_string(),
        })
        .unwrap();
        assert_eq!(json["event"], "taskOutput");
        assert_eq!(json["chunk"], "frame=1");
    }
}
