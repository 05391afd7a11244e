//! External process supervision.

mod supervisor;

pub use supervisor::{OutputStream, ProcessEvent, ProcessSupervisor, detect_version};
