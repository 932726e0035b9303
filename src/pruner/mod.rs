//! Retention pruning interface.
//!
//! A factory is built once per job from its pruning policy; it hands out one
//! pruner per side per invocation.

use crate::endpoint::Endpoint;
use crate::job::JobContext;
use async_trait::async_trait;
use std::sync::Arc;

pub trait PrunerFactory: Send + Sync {
    /// Pruner deleting over-retention snapshots on the local side.
    ///
    /// `ctx` is captured by the pruner; its span already carries `prune_side`.
    fn build_sender_pruner(
        &self,
        ctx: &JobContext,
        target: Arc<dyn Endpoint>,
        reference: Arc<dyn Endpoint>,
    ) -> Box<dyn Pruner>;

    /// Pruner for the remote side. `reference` is always the sender, which
    /// tells the pruner what is still held locally.
    fn build_receiver_pruner(
        &self,
        ctx: &JobContext,
        target: Arc<dyn Endpoint>,
        reference: Arc<dyn Endpoint>,
    ) -> Box<dyn Pruner>;
}

#[async_trait]
pub trait Pruner: Send + Sync {
    /// Run to completion or report why not.
    async fn prune(&self) -> anyhow::Result<()>;
}
