//! Replication session interface.
//!
//! The session owns snapshot enumeration, diffing and transfer. A job creates
//! one session per invocation and exposes its report through `Job::status`.

use crate::endpoint::Endpoint;
use crate::job::JobContext;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Creates a fresh session for every invocation.
pub trait ReplicationFactory: Send + Sync {
    fn new_session(&self) -> Arc<dyn ReplicationSession>;
}

#[async_trait]
pub trait ReplicationSession: Send + Sync {
    /// Drive replication from `sender` to `receiver` to completion.
    ///
    /// Any retry or backoff policy lives here, not in the job.
    async fn drive(
        &self,
        ctx: &JobContext,
        sender: Arc<dyn Endpoint>,
        receiver: Arc<dyn Endpoint>,
    ) -> anyhow::Result<()>;

    /// Serializable snapshot of the session's progress. May be called from
    /// any thread while `drive` is running.
    fn report(&self) -> JsonValue;
}
