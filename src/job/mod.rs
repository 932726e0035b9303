//! Job orchestration.
//!
//! Jobs are long-lived loops that sleep until woken up, either by the control
//! socket or by an interval ticker, and then run one invocation.

mod context;
mod job;
mod manager;
mod push;
mod session_cell;
pub mod wakeup;

#[cfg(test)]
pub(crate) mod test_support;

pub use context::JobContext;
pub use job::{Job, JobError, JobKind, WakeupSchedule};
pub use manager::{JobManager, JobManagerHandle, JobStatus, RunningJobs, DEFAULT_SHUTDOWN_GRACE};
pub use push::{InvocationError, PushJob, PushJobParts};
pub use session_cell::SessionCell;
pub use wakeup::{Wait, WakeupError, WakeupHandle, WakeupListener, WakeupOutcome};
