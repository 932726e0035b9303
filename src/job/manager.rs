use super::context::JobContext;
use super::job::{Job, JobError, JobKind, WakeupSchedule};
use super::wakeup::{self, WakeupError, WakeupHandle, WakeupOutcome};
use crate::metrics;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

/// Default time to wait for job loops after shutdown has been requested.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Serializable status of one job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobStatus {
    #[serde(rename = "type")]
    pub kind: JobKind,
    pub replication: Option<JsonValue>,
}

struct Registration {
    job: Arc<dyn Job>,
    schedule: WakeupSchedule,
}

/// Collects jobs before the daemon starts them.
pub struct JobManager {
    registered: BTreeMap<String, Registration>,
    shutdown_token: CancellationToken,
}

impl JobManager {
    pub fn new(shutdown_token: CancellationToken) -> Self {
        Self {
            registered: BTreeMap::new(),
            shutdown_token,
        }
    }

    /// Register a job. Names must be unique.
    pub fn register_job(
        &mut self,
        job: Arc<dyn Job>,
        schedule: WakeupSchedule,
    ) -> Result<(), JobError> {
        let name = job.name().to_string();
        if name.trim().is_empty() {
            return Err(JobError::InvalidName(name));
        }
        if self.registered.contains_key(&name) {
            return Err(JobError::DuplicateName(name));
        }
        info!("Registering {} job: {} ({:?})", job.kind(), name, schedule);
        self.registered.insert(name, Registration { job, schedule });
        Ok(())
    }

    pub fn job_count(&self) -> usize {
        self.registered.len()
    }

    /// Spawn one loop per job (plus a ticker for interval schedules).
    pub fn start(self) -> (RunningJobs, JobManagerHandle) {
        info!("Starting job manager with {} registered jobs", self.registered.len());

        let mut tasks = Vec::new();
        let mut jobs = BTreeMap::new();

        for (name, registration) in self.registered {
            let token = self.shutdown_token.child_token();
            let (wakeup, listener) = wakeup::signal(token.clone());
            let ctx = JobContext::new(token.clone(), info_span!("job", job = %name));

            let job = Arc::clone(&registration.job);
            tasks.push((
                name.clone(),
                tokio::spawn(async move { job.run(ctx, listener).await }),
            ));

            if let WakeupSchedule::Interval(period) = registration.schedule {
                tasks.push((
                    format!("{} ticker", name),
                    spawn_ticker(name.clone(), period, wakeup.clone(), token),
                ));
            }

            jobs.insert(
                name,
                RunningJob {
                    job: registration.job,
                    wakeup,
                },
            );
        }

        (
            RunningJobs { tasks },
            JobManagerHandle {
                jobs: Arc::new(jobs),
            },
        )
    }
}

/// Timer-driven wakeups. The first tick fires after one full period.
fn spawn_ticker(
    name: String,
    period: Duration,
    wakeup: WakeupHandle,
    token: CancellationToken,
) -> JoinHandle<()> {
    let span = info_span!("ticker", job = %name);
    tokio::spawn(
        async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        match wakeup.wakeup() {
                            Ok(outcome) => {
                                debug!("interval wakeup {}", outcome.as_str());
                                metrics::record_wakeup(&name, outcome.as_str());
                            }
                            Err(e) => {
                                debug!("stopping ticker: {}", e);
                                break;
                            }
                        }
                    }
                }
            }
        }
        .instrument(span),
    )
}

struct RunningJob {
    job: Arc<dyn Job>,
    wakeup: WakeupHandle,
}

/// Handle used by the control server to address running jobs.
///
/// The job set is fixed once started, so lookups need no lock.
#[derive(Clone)]
pub struct JobManagerHandle {
    jobs: Arc<BTreeMap<String, RunningJob>>,
}

impl JobManagerHandle {
    /// Request an immediate invocation of `name`.
    ///
    /// Wakeups requested while the job is busy coalesce into one pending
    /// wakeup and still succeed.
    pub fn wakeup(&self, name: &str) -> Result<WakeupOutcome, JobError> {
        let running = self
            .jobs
            .get(name)
            .ok_or_else(|| JobError::NotFound(name.to_string()))?;

        match running.wakeup.wakeup() {
            Ok(outcome) => {
                info!(job = name, "wakeup {}", outcome.as_str());
                metrics::record_wakeup(name, outcome.as_str());
                Ok(outcome)
            }
            Err(WakeupError::Cancelled) | Err(WakeupError::Closed) => {
                warn!(job = name, "wakeup for stopped job");
                Err(JobError::Stopped(name.to_string()))
            }
        }
    }

    /// Status of every job, ordered by name.
    pub fn status(&self) -> BTreeMap<String, JobStatus> {
        self.jobs
            .iter()
            .map(|(name, running)| (name.clone(), status_of(running.job.as_ref())))
            .collect()
    }
}

fn status_of(job: &dyn Job) -> JobStatus {
    JobStatus {
        kind: job.kind(),
        replication: job.status(),
    }
}

/// Tasks spawned by [`JobManager::start`].
pub struct RunningJobs {
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl RunningJobs {
    /// Wait for every job loop to return. Meant to be called after the
    /// shutdown token was cancelled; gives up on stragglers after `grace`.
    pub async fn wait(self, grace: Duration) {
        let deadline = tokio::time::Instant::now() + grace;
        for (name, handle) in self.tasks {
            match tokio::time::timeout_at(deadline, handle).await {
                Ok(Ok(())) => debug!("{} stopped", name),
                Ok(Err(e)) => warn!("{} terminated abnormally: {}", name, e),
                Err(_) => warn!("{} still running after shutdown grace period", name),
            }
        }
        info!("All jobs stopped");
    }
}
