//! Daemon wiring: configured jobs, job manager and control server.

use crate::config::{AppConfig, JobConfig};
use crate::control::{bind_control_socket, serve_control};
use crate::job::{Job, JobKind, JobManager, PushJob, PushJobParts, DEFAULT_SHUTDOWN_GRACE};
use crate::metrics;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Turns the opaque sections of a job's configuration (`connect`,
/// `filesystems`, `pruning`) into the collaborators the job runs with.
///
/// Errors are configuration errors and abort daemon startup.
pub trait JobBuilder: Send + Sync {
    fn build_push(&self, config: &JobConfig) -> Result<PushJobParts>;
}

pub fn build_job(builder: &dyn JobBuilder, config: &JobConfig) -> Result<Arc<dyn Job>> {
    match config.kind {
        JobKind::Push => {
            let parts = builder
                .build_push(config)
                .with_context(|| format!("Cannot build job {}", config.name))?;
            Ok(Arc::new(PushJob::new(config.name.clone(), parts)?))
        }
    }
}

/// Run the daemon until `shutdown` is cancelled.
///
/// All jobs are built and the control socket is bound before any job starts,
/// so configuration problems surface without side effects on the jobs.
pub async fn run_daemon(
    config: AppConfig,
    builder: &dyn JobBuilder,
    shutdown: CancellationToken,
) -> Result<()> {
    metrics::init_metrics();

    let mut manager = JobManager::new(shutdown.clone());
    for job_config in &config.jobs {
        let job = build_job(builder, job_config)?;
        manager.register_job(job, job_config.schedule)?;
    }

    let listener = bind_control_socket(&config.control_sockpath).await?;
    info!("Daemon starting {} jobs", manager.job_count());
    let (running, handle) = manager.start();

    let result = serve_control(
        listener,
        config.control_sockpath.clone(),
        handle,
        shutdown.clone(),
    )
    .await;
    if let Err(e) = &result {
        error!("{:#}", e);
        shutdown.cancel();
    }

    info!("Shutting down, waiting for running jobs...");
    running.wait(DEFAULT_SHUTDOWN_GRACE).await;
    result
}

/// Cancel `token` on Ctrl+C or SIGTERM.
pub fn shutdown_on_signal(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = wait_for_signal() => {}
        }
        info!("Received shutdown signal");
        token.cancel();
    })
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            error!("Cannot install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
