use super::context::JobContext;
use super::wakeup::WakeupListener;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// What triggers a job besides manual wakeups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeupSchedule {
    /// Only woken up through the control socket.
    Manual,
    /// Additionally woken up at fixed intervals.
    Interval(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Push,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Push => write!(f, "push"),
        }
    }
}

/// Errors from registering or addressing jobs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("job not found: {0}")]
    NotFound(String),
    #[error("duplicate job name: {0}")]
    DuplicateName(String),
    #[error("invalid job name: {0:?}")]
    InvalidName(String),
    #[error("job {0} is not running")]
    Stopped(String),
}

/// A named, independently scheduled unit of work driven by wakeups.
#[async_trait]
pub trait Job: Send + Sync {
    /// Unique, immutable identifier for this job.
    fn name(&self) -> &str;

    fn kind(&self) -> JobKind;

    /// Report of the job's current session, `None` until one has started.
    ///
    /// Must be cheap to call concurrently with `run`.
    fn status(&self) -> Option<JsonValue>;

    /// The job loop. Called exactly once; returns only after `ctx` is cancelled.
    async fn run(&self, ctx: JobContext, wakeups: WakeupListener);
}
