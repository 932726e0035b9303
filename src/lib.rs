//! snaprelay: push replication job orchestrator.
//!
//! Runs named push jobs that replicate local datasets to a remote receiver
//! and prune both sides afterwards, and exposes a control socket to wake jobs
//! up and inspect their status.

pub mod config;
pub mod control;
pub mod daemon;
pub mod endpoint;
pub mod job;
pub mod metrics;
pub mod pruner;
pub mod replication;
pub mod transport;

pub use config::{AppConfig, CliConfig, JobConfig};
pub use control::{run_wakeup, ControlClient, ControlError};
pub use daemon::{run_daemon, JobBuilder};
pub use job::{Job, JobContext, JobError, JobManager, JobManagerHandle, PushJob, PushJobParts};
