//! Task queue management.
//!
//! The manager is the single orchestrator: it owns the priority queue, the
//! concurrency gate and the three-bucket registry, drives admissions, and
//! publishes lifecycle events. Every registry mutation (submission,
//! admission, cancellation, pause/resume, terminal transition, retention
//! eviction) happens under one registry lock, so supervisor callbacks that
//! re-enter this path can never observe a partially admitted task, and a
//! cancel racing a natural exit is applied exactly once.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::config::QueueConfig;
use crate::events::{EventBroadcaster, TaskEvent};
use crate::parser::ProgressParser;
use crate::process::{ProcessEvent, ProcessSupervisor};
use crate::queue::registry::Registry;
use crate::queue::task::{QueueStats, Task, TaskStatus, TaskView};

/// The task queue manager.
///
/// Cheap to clone; every clone shares the same registry and event stream.
#[derive(Clone)]
pub struct TaskQueueManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    binary_path: String,
    channel_capacity: usize,
    registry: Mutex<Registry>,
    events: EventBroadcaster,
}

impl TaskQueueManager {
    /// Create a new manager from a configuration.
    pub fn new(config: QueueConfig) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                binary_path: config.binary_path,
                channel_capacity: config.channel_capacity,
                registry: Mutex::new(Registry::new(
                    config.concurrency_limit,
                    config.completed_retention,
                )),
                events: EventBroadcaster::new(),
            }),
        }
    }

    /// Subscribe to task lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.inner.events.subscribe()
    }

    /// Submit a new task.
    ///
    /// The task enters the queue ordered by priority descending (FIFO among
    /// equal priorities) and may start immediately if a concurrency slot is
    /// free. Returns the task ID. Never blocks.
    pub fn submit(&self, command: Vec<String>, priority: i32) -> String {
        let task = Task::new(command, priority);
        let id = task.id.clone();
        let view = task.view();

        self.inner.registry.lock().insert_queued(task);
        info!(task_id = %id, priority, "Task submitted");
        self.inner.events.publish(TaskEvent::TaskAdded(view));

        self.drive_queue();
        id
    }

    /// Cancel a task.
    ///
    /// Queued tasks are withdrawn; running or paused tasks have their
    /// process forcefully terminated and carry a "Cancelled by user" error
    /// text. Returns false for unknown or already-terminal tasks, with no
    /// side effects.
    pub fn cancel(&self, task_id: &str) -> bool {
        let (event, supervisor) = {
            let mut reg = self.inner.registry.lock();
            let Some(task) = reg.task_mut(task_id) else {
                return false;
            };

            match task.status {
                TaskStatus::Pending => {
                    task.status = TaskStatus::Cancelled;
                    task.completed_at = Some(Utc::now());
                    let view = task.view();
                    reg.remove_queued(task_id);
                    reg.push_completed(task_id);
                    (TaskEvent::TaskCancelled(view), None)
                }
                TaskStatus::Running | TaskStatus::Paused => {
                    let supervisor = task.supervisor.take();
                    task.status = TaskStatus::Cancelled;
                    task.error = Some("Cancelled by user".to_string());
                    task.completed_at = Some(Utc::now());
                    let view = task.view();
                    reg.retire_running(task_id);
                    (TaskEvent::TaskCancelled(view), supervisor)
                }
                _ => return false,
            }
        };

        if let Some(supervisor) = supervisor {
            supervisor.terminate();
        }

        info!(task_id, "Task cancelled");
        self.inner.events.publish(event);
        self.drive_queue();
        true
    }

    /// Suspend a running task's process.
    ///
    /// Succeeds only on running tasks. The task keeps its concurrency slot
    /// while paused.
    pub fn pause(&self, task_id: &str) -> bool {
        let mut reg = self.inner.registry.lock();
        let Some(task) = reg.task_mut(task_id) else {
            return false;
        };
        if task.status != TaskStatus::Running {
            return false;
        }
        let Some(supervisor) = task.supervisor.as_ref() else {
            return false;
        };
        if !supervisor.is_controllable() {
            return false;
        }
        if let Err(e) = supervisor.suspend() {
            warn!(task_id, "Failed to suspend process: {}", e);
            return false;
        }

        task.status = TaskStatus::Paused;
        debug!(task_id, "Task paused");
        true
    }

    /// Resume a paused task's process. Succeeds only on paused tasks.
    pub fn resume(&self, task_id: &str) -> bool {
        let mut reg = self.inner.registry.lock();
        let Some(task) = reg.task_mut(task_id) else {
            return false;
        };
        if task.status != TaskStatus::Paused {
            return false;
        }
        let Some(supervisor) = task.supervisor.as_ref() else {
            return false;
        };
        if let Err(e) = supervisor.resume() {
            warn!(task_id, "Failed to resume process: {}", e);
            return false;
        }

        task.status = TaskStatus::Running;
        debug!(task_id, "Task resumed");
        true
    }

    /// Set the concurrency limit (clamped to a minimum of 1) and re-drive
    /// the queue. Lowering the limit never preempts running tasks.
    pub fn set_concurrency_limit(&self, limit: usize) {
        let effective = {
            let mut reg = self.inner.registry.lock();
            reg.set_concurrency_limit(limit);
            reg.concurrency_limit()
        };
        info!(limit = effective, "Concurrency limit updated");
        self.drive_queue();
    }

    /// Set the completed-task retention limit (clamped to a minimum of
    /// [`crate::config::MIN_COMPLETED_RETENTION`]), evicting the oldest
    /// completed tasks beyond it.
    pub fn set_completed_retention(&self, retention: usize) {
        let mut reg = self.inner.registry.lock();
        reg.set_completed_retention(retention);
        info!(retention = reg.completed_retention(), "Completed retention updated");
    }

    /// Drop every completed task.
    pub fn clear_completed(&self) {
        self.inner.registry.lock().clear_completed();
        info!("Completed tasks cleared");
    }

    /// Cancel every queued and running task.
    pub fn shutdown(&self) {
        let ids = self.inner.registry.lock().active_ids();
        for id in ids {
            self.cancel(&id);
        }
    }

    /// Get one task.
    pub fn get(&self, task_id: &str) -> Option<TaskView> {
        self.inner.registry.lock().task(task_id).map(Task::view)
    }

    /// Get every task: queued, then running, then completed.
    pub fn get_all(&self) -> Vec<TaskView> {
        self.inner.registry.lock().all_views()
    }

    /// Get queued tasks in admission order.
    pub fn get_queued(&self) -> Vec<TaskView> {
        self.inner.registry.lock().queued_views()
    }

    /// Get tasks holding a concurrency slot (running or paused).
    pub fn get_running(&self) -> Vec<TaskView> {
        self.inner.registry.lock().running_views()
    }

    /// Get retained completed tasks, oldest first.
    pub fn get_completed(&self) -> Vec<TaskView> {
        self.inner.registry.lock().completed_views()
    }

    /// Get aggregate queue counters.
    pub fn stats(&self) -> QueueStats {
        self.inner.registry.lock().stats()
    }

    /// Admit queued tasks while slots are free.
    ///
    /// Invoked after submission, after every terminal transition, and after
    /// a concurrency-limit increase. Each admission is one critical section
    /// under the registry lock: pop the head, mark it running, spawn its
    /// supervisor and attach the handle. A launch failure becomes a failed
    /// terminal transition in the same critical section.
    fn drive_queue(&self) {
        loop {
            let (event, pump) = {
                let mut reg = self.inner.registry.lock();
                let (id, command) = match reg.admit_next() {
                    Some(task) => (task.id.clone(), task.command.clone()),
                    None => break,
                };

                let (event_tx, event_rx) = mpsc::channel(self.inner.channel_capacity);
                match ProcessSupervisor::spawn(&self.inner.binary_path, &command, event_tx) {
                    Ok(supervisor) => {
                        let task = reg.task_mut(&id).expect("admitted id has a task record");
                        task.supervisor = Some(supervisor);
                        let view = task.view();
                        (TaskEvent::TaskStarted(view), Some((id, event_rx)))
                    }
                    Err(e) => {
                        warn!(task_id = %id, "Failed to launch process: {}", e);
                        let task = reg.task_mut(&id).expect("admitted id has a task record");
                        task.status = TaskStatus::Failed;
                        task.error = Some(e.to_string());
                        task.completed_at = Some(Utc::now());
                        let view = task.view();
                        reg.retire_running(&id);
                        (TaskEvent::TaskFailed(view), None)
                    }
                }
            };

            if let TaskEvent::TaskStarted(view) = &event {
                info!(task_id = %view.id, "Task started");
            }
            if let Some((id, event_rx)) = pump {
                self.spawn_output_pump(id, event_rx);
            }
            self.inner.events.publish(event);
        }
    }

    /// Consume one task's supervisor events: feed output through the task's
    /// parser and re-enter the serialized mutation path for the terminal
    /// transition.
    fn spawn_output_pump(&self, task_id: String, mut event_rx: mpsc::Receiver<ProcessEvent>) {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut parser = ProgressParser::new();
            while let Some(event) = event_rx.recv().await {
                match event {
                    ProcessEvent::Output { chunk, .. } => {
                        manager.handle_output(&task_id, &mut parser, chunk);
                    }
                    ProcessEvent::Error { message } => {
                        manager.record_error_line(&task_id, message);
                    }
                    ProcessEvent::Exited { code } => {
                        manager.handle_exit(&task_id, code);
                        break;
                    }
                }
            }
        });
    }

    /// Process one line of task output.
    fn handle_output(&self, task_id: &str, parser: &mut ProgressParser, chunk: String) {
        self.inner.events.publish(TaskEvent::TaskOutput {
            id: task_id.to_string(),
            chunk: chunk.clone(),
        });

        parser.parse_duration(&chunk);

        if let Some(snapshot) = parser.parse_progress(&chunk) {
            let event = {
                let mut reg = self.inner.registry.lock();
                if !reg.is_running(task_id) {
                    return;
                }
                let Some(task) = reg.task_mut(task_id) else {
                    return;
                };
                task.progress = snapshot.percent;
                task.progress_info = Some(snapshot.clone());
                TaskEvent::TaskProgress {
                    id: task_id.to_string(),
                    percent: snapshot.percent,
                    snapshot,
                }
            };
            self.inner.events.publish(event);
        } else if let Some(line) = ProgressParser::parse_error(&chunk) {
            self.record_error_line(task_id, line);
        }
    }

    /// Remember an error line for a live task; surfaced if the task fails.
    fn record_error_line(&self, task_id: &str, line: String) {
        let mut reg = self.inner.registry.lock();
        if !reg.is_running(task_id) {
            return;
        }
        if let Some(task) = reg.task_mut(task_id) {
            task.error = Some(line);
        }
    }

    /// Apply a process exit to its task.
    ///
    /// Idempotent against cancellation races: a task that already left the
    /// running bucket is not transitioned again.
    fn handle_exit(&self, task_id: &str, code: Option<i32>) {
        let event = {
            let mut reg = self.inner.registry.lock();
            if !reg.is_running(task_id) {
                debug!(task_id, "Exit notice for task no longer running");
                return;
            }
            let task = reg.task_mut(task_id).expect("running id has a task record");
            task.supervisor = None;
            task.completed_at = Some(Utc::now());

            let event = match code {
                Some(0) => {
                    task.status = TaskStatus::Completed;
                    task.progress = 100.0;
                    task.error = None;
                    TaskEvent::TaskCompleted(task.view())
                }
                Some(n) => {
                    task.status = TaskStatus::Failed;
                    // Prefer an error line captured from the process output.
                    if task.error.is_none() {
                        task.error = Some(format!("process exited with code {}", n));
                    }
                    TaskEvent::TaskFailed(task.view())
                }
                None => {
                    task.status = TaskStatus::Failed;
                    if task.error.is_none() {
                        task.error = Some("process terminated by signal".to_string());
                    }
                    TaskEvent::TaskFailed(task.view())
                }
            };
            reg.retire_running(task_id);
            event
        };

        match &event {
            TaskEvent::TaskCompleted(view) => info!(task_id = %view.id, "Task completed"),
            TaskEvent::TaskFailed(view) => {
                warn!(task_id = %view.id, error = ?view.error, "Task failed")
            }
            _ => {}
        }
        self.inner.events.publish(event);
        self.drive_queue();
    }
}
