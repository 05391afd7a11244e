//! Queue configuration.

use serde::{Deserialize, Serialize};

/// Default maximum number of concurrently running tasks.
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 2;

/// Default number of completed tasks kept for inspection.
pub const DEFAULT_COMPLETED_RETENTION: usize = 100;

/// Lower bound for the completed-task retention limit.
pub const MIN_COMPLETED_RETENTION: usize = 10;

/// Default capacity of a supervisor's process-event channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Configuration for the task queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Path to the transcoder binary (e.g. "ffmpeg").
    pub binary_path: String,
    /// Maximum number of concurrently running tasks (minimum 1).
    pub concurrency_limit: usize,
    /// Number of completed tasks retained before the oldest are evicted.
    pub completed_retention: usize,
    /// Capacity of each supervisor's process-event channel.
    pub channel_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            binary_path: "ffmpeg".to_string(),
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            completed_retention: DEFAULT_COMPLETED_RETENTION,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl QueueConfig {
    /// Set the transcoder binary path.
    pub fn with_binary_path(mut self, path: impl Into<String>) -> Self {
        self.binary_path = path.into();
        self
    }

    /// Set the concurrency limit.
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = limit;
        self
    }

    /// Set the completed-task retention limit.
    pub fn with_completed_retention(mut self, retention: usize) -> Self {
        self.completed_retention = retention;
        self
    }

    /// Clamp the concurrency limit to its lower bound.
    pub fn clamped_concurrency(limit: usize) -> usize {
        limit.max(1)
    }

    /// Clamp the retention limit to its lower bound.
    pub fn clamped_retention(retention: usize) -> usize {
        retention.max(MIN_COMPLETED_RETENTION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = QueueConfig::default();
        assert_eq!(config.binary_path, "ffmpeg");
        assert_eq!(config.concurrency_limit, DEFAULT_CONCURRENCY_LIMIT);
        assert_eq!(config.completed_retention, DEFAULT_COMPLETED_RETENTION);
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
    }

    #[test]
    fn test_builder() {
        let config = QueueConfig::default()
            .with_binary_path("/usr/local/bin/ffmpeg")
            .with_concurrency_limit(4)
            .with_completed_retention(50);
        assert_eq!(config.binary_path, "/usr/local/bin/ffmpeg");
        assert_eq!(config.concurrency_limit, 4);
        assert_eq!(config.completed_retention, 50);
    }

    #[test]
    fn test_clamping() {
        assert_eq!(QueueConfig::clamped_concurrency(0), 1);
        assert_eq!(QueueConfig::clamped_concurrency(8), 8);
        assert_eq!(QueueConfig::clamped_retention(3), MIN_COMPLETED_RETENTION);
        assert_eq!(QueueConfig::clamped_retention(500), 500);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: QueueConfig = serde_json::from_str(r#"{"concurrency_limit": 4}"#).unwrap();
        assert_eq!(config.concurrency_limit, 4);
        assert_eq!(config.binary_path, "ffmpeg");
    }
}
