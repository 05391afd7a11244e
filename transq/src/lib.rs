//! transq library crate.
//!
//! A managed queue for long-running transcoder processes: submitted jobs
//! wait in a priority queue, run under a bounded pool of supervised OS
//! processes, stream structured progress parsed from their output, and can
//! be paused, resumed and cancelled in flight.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod parser;
pub mod process;
pub mod queue;

pub use config::QueueConfig;
pub use error::{Error, Result};
pub use events::{EventBroadcaster, TaskEvent};
pub use parser::{InputInfo, ProgressParser, ProgressSnapshot};
pub use process::{ProcessSupervisor, detect_version};
pub use queue::{QueueStats, TaskQueueManager, TaskStatus, TaskView};
