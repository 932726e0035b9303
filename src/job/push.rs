//! Push job: replicate local datasets to a remote receiver, then prune both sides.

use super::context::JobContext;
use super::job::{Job, JobError, JobKind};
use super::session_cell::SessionCell;
use super::wakeup::{Wait, WakeupListener};
use crate::endpoint::{Endpoint, EndpointFactory, FsFilter, Side};
use crate::metrics;
use crate::pruner::PrunerFactory;
use crate::replication::{ReplicationFactory, ReplicationSession};
use crate::transport::{Connecter, Connection};
use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value as JsonValue;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, info_span, Instrument};

/// Collaborators a push job is built from.
pub struct PushJobParts {
    pub connecter: Arc<dyn Connecter>,
    pub fs_filter: Arc<dyn FsFilter>,
    pub endpoints: Arc<dyn EndpointFactory>,
    pub replication: Arc<dyn ReplicationFactory>,
    pub pruner_factory: Arc<dyn PrunerFactory>,
}

/// Why an invocation stopped before pruning.
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("cannot connect to receiver: {0:#}")]
    Connect(anyhow::Error),
    #[error("replication failed: {0:#}")]
    Replication(anyhow::Error),
    #[error("invocation panicked: {0}")]
    Panicked(String),
}

impl InvocationError {
    fn stage(&self) -> &'static str {
        match self {
            InvocationError::Connect(_) => "connect",
            InvocationError::Replication(_) => "replication",
            InvocationError::Panicked(_) => "panic",
        }
    }
}

/// How one invocation ended. Only used for logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InvocationOutcome {
    Completed,
    PruneFailed,
    Failed,
    Panicked,
}

impl InvocationOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            InvocationOutcome::Completed => "completed",
            InvocationOutcome::PruneFailed => "prune_failed",
            InvocationOutcome::Failed => "failed",
            InvocationOutcome::Panicked => "panicked",
        }
    }
}

enum LoopState {
    Idle,
    Running,
}

pub struct PushJob {
    name: String,
    connecter: Arc<dyn Connecter>,
    fs_filter: Arc<dyn FsFilter>,
    endpoints: Arc<dyn EndpointFactory>,
    replication: Arc<dyn ReplicationFactory>,
    pruner_factory: Arc<dyn PrunerFactory>,

    session: SessionCell<dyn ReplicationSession>,
    invocation_count: AtomicU64,
}

impl PushJob {
    pub fn new(name: impl Into<String>, parts: PushJobParts) -> Result<Self, JobError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(JobError::InvalidName(name));
        }
        Ok(Self {
            name,
            connecter: parts.connecter,
            fs_filter: parts.fs_filter,
            endpoints: parts.endpoints,
            replication: parts.replication,
            pruner_factory: parts.pruner_factory,
            session: SessionCell::new(),
            invocation_count: AtomicU64::new(0),
        })
    }

    /// Number of invocations started so far.
    pub fn invocation_count(&self) -> u64 {
        self.invocation_count.load(Ordering::SeqCst)
    }

    async fn invoke(&self, ctx: &JobContext) {
        let start_time = Instant::now();
        metrics::set_job_running(&self.name, true);

        let outcome = match AssertUnwindSafe(self.connect_and_replicate(ctx))
            .catch_unwind()
            .await
        {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                error!(stage = e.stage(), "{}", e);
                InvocationOutcome::Failed
            }
            Err(panic) => {
                let e = InvocationError::Panicked(panic_message(panic.as_ref()));
                error!(stage = e.stage(), "{}", e);
                InvocationOutcome::Panicked
            }
        };

        let elapsed = start_time.elapsed();
        metrics::record_invocation(&self.name, outcome.as_str(), elapsed);
        metrics::set_job_running(&self.name, false);
        info!(outcome = outcome.as_str(), "invocation finished in {:?}", elapsed);
    }

    /// Owns the connection for the whole invocation and releases it on every
    /// exit path, unwinding included.
    async fn connect_and_replicate(
        &self,
        ctx: &JobContext,
    ) -> Result<InvocationOutcome, InvocationError> {
        let connection = self
            .connecter
            .connect(ctx)
            .await
            .map_err(InvocationError::Connect)?;

        let result = AssertUnwindSafe(self.replicate_and_prune(ctx, Arc::clone(&connection)))
            .catch_unwind()
            .await;

        connection.close(ctx).await;
        debug!("connection released");

        match result {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    async fn replicate_and_prune(
        &self,
        ctx: &JobContext,
        connection: Arc<dyn Connection>,
    ) -> Result<InvocationOutcome, InvocationError> {
        let sender = self.endpoints.sender(Arc::clone(&self.fs_filter));
        let receiver = self.endpoints.receiver(connection);

        let session = self.replication.new_session();
        self.session.install(Arc::clone(&session));

        info!("start replication");
        session
            .drive(ctx, Arc::clone(&sender), Arc::clone(&receiver))
            .await
            .map_err(InvocationError::Replication)?;

        // Sender first: local space is freed before touching the remote side.
        // A failure on one side does not stop the other.
        let sender_ok = self.prune(ctx, Side::Sender, &sender, &receiver).await;
        let receiver_ok = self.prune(ctx, Side::Receiver, &sender, &receiver).await;

        if sender_ok && receiver_ok {
            Ok(InvocationOutcome::Completed)
        } else {
            Ok(InvocationOutcome::PruneFailed)
        }
    }

    async fn prune(
        &self,
        ctx: &JobContext,
        side: Side,
        sender: &Arc<dyn Endpoint>,
        receiver: &Arc<dyn Endpoint>,
    ) -> bool {
        let prune_ctx =
            ctx.with_span(info_span!(parent: ctx.span(), "prune", prune_side = side.as_str()));

        async {
            info!("start pruning {}", side);
            let pruner = match side {
                Side::Sender => self.pruner_factory.build_sender_pruner(
                    &prune_ctx,
                    Arc::clone(sender),
                    Arc::clone(sender),
                ),
                Side::Receiver => self.pruner_factory.build_receiver_pruner(
                    &prune_ctx,
                    Arc::clone(receiver),
                    Arc::clone(sender),
                ),
            };

            match pruner.prune().await {
                Ok(()) => {
                    info!("pruning {} done", side);
                    true
                }
                Err(e) => {
                    error!("pruning {} failed: {:#}", side, e);
                    metrics::record_prune_failure(&self.name, side);
                    false
                }
            }
        }
        .instrument(prune_ctx.span().clone())
        .await
    }
}

#[async_trait]
impl Job for PushJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> JobKind {
        JobKind::Push
    }

    fn status(&self) -> Option<JsonValue> {
        // Report outside the cell's lock.
        let session = self.session.current()?;
        Some(session.report())
    }

    async fn run(&self, ctx: JobContext, mut wakeups: WakeupListener) {
        let span = ctx.span().clone();

        async {
            info!("job starting");
            let mut state = LoopState::Idle;

            loop {
                match state {
                    LoopState::Idle => {
                        debug!("waiting for wakeup");
                        match wakeups.wait().await {
                            Wait::Wakeup => state = LoopState::Running,
                            Wait::Cancelled => {
                                info!("context cancelled");
                                break;
                            }
                        }
                    }
                    LoopState::Running => {
                        let invocation = self.invocation_count.fetch_add(1, Ordering::SeqCst) + 1;
                        let invocation_ctx = ctx.with_span(info_span!(
                            parent: ctx.span(),
                            "invocation",
                            invocation
                        ));
                        self.invoke(&invocation_ctx)
                            .instrument(invocation_ctx.span().clone())
                            .await;
                        state = LoopState::Idle;
                    }
                }
            }

            info!("job exiting");
        }
        .instrument(span)
        .await
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
