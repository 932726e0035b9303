//! Transport to the receiving side.
//!
//! Connection establishment and wire encoding belong to the transport
//! implementation; jobs only open one connection per invocation and release it.

use crate::job::JobContext;
use async_trait::async_trait;
use std::sync::Arc;

/// Opens connections to the remote side of a job.
#[async_trait]
pub trait Connecter: Send + Sync {
    /// Establish a fresh connection. Should respect `ctx` cancellation.
    async fn connect(&self, ctx: &JobContext) -> anyhow::Result<Arc<dyn Connection>>;
}

/// An open connection, exclusively owned by one invocation.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Release the connection. Called exactly once, on every exit path of the
    /// invocation that opened it.
    async fn close(&self, ctx: &JobContext);
}
