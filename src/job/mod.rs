//! Job list and the dispatcher that runs one job at a time.

pub mod config;
pub mod engine;
pub mod runtime;
pub mod state;

pub use config::{ArchiveType, JobConfig, ScheduleInfo, ScheduleRule};
pub use engine::{JobListLock, JobRecord, VolumeWaitOutcome};
pub use runtime::{Averager, RunningInfo};
pub use state::{JobState, RunState};
