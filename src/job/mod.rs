//! Job lifecycle — record, state machine, events, and manager.

pub mod events;
pub mod manager;
pub mod model;

pub use events::{JobEvent, JobEventType};
pub use manager::JobManager;
pub use model::{Job, JobFailure, JobMode, JobStatus, TaskInfo, TaskStatus};
