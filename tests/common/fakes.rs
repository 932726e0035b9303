//! Recording collaborators for end-to-end tests.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use snaprelay::config::JobConfig;
use snaprelay::endpoint::{Endpoint, EndpointFactory, FsFilter, Side};
use snaprelay::pruner::{Pruner, PrunerFactory};
use snaprelay::replication::{ReplicationFactory, ReplicationSession};
use snaprelay::transport::{Connecter, Connection};
use snaprelay::{JobContext, JobBuilder, PushJobParts};
use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<String>>,
}

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.snapshot().iter().filter(|e| e.as_str() == event).count()
    }
}

/// Shared state of one job's fakes.
#[derive(Default)]
pub struct JobFakes {
    pub events: EventLog,
    pub sessions: AtomicUsize,
    /// How long every replication drive takes.
    pub drive_delay: Mutex<Duration>,
}

impl JobFakes {
    pub fn set_drive_delay(&self, delay: Duration) {
        *self.drive_delay.lock().unwrap() = delay;
    }
}

struct RecordingConnection(Arc<JobFakes>);

#[async_trait]
impl Connection for RecordingConnection {
    async fn close(&self, _ctx: &JobContext) {
        self.0.events.push("close");
    }
}

struct RecordingConnecter(Arc<JobFakes>);

#[async_trait]
impl Connecter for RecordingConnecter {
    async fn connect(&self, _ctx: &JobContext) -> Result<Arc<dyn Connection>> {
        self.0.events.push("connect");
        Ok(Arc::new(RecordingConnection(Arc::clone(&self.0))))
    }
}

/// Filter built from the job's `filesystems` section: `"<prefix><" = true`.
struct PrefixFilter {
    prefixes: Vec<String>,
}

impl FsFilter for PrefixFilter {
    fn matches(&self, dataset: &str) -> bool {
        self.prefixes.iter().any(|p| dataset.starts_with(p.as_str()))
    }
}

struct SideEndpoint(Side);

impl Endpoint for SideEndpoint {
    fn side(&self) -> Side {
        self.0
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct SideEndpoints;

impl EndpointFactory for SideEndpoints {
    fn sender(&self, filter: Arc<dyn FsFilter>) -> Arc<dyn Endpoint> {
        assert!(filter.matches("tank/data"));
        Arc::new(SideEndpoint(Side::Sender))
    }

    fn receiver(&self, _connection: Arc<dyn Connection>) -> Arc<dyn Endpoint> {
        Arc::new(SideEndpoint(Side::Receiver))
    }
}

struct RecordingSession {
    id: usize,
    fakes: Arc<JobFakes>,
    done: Mutex<bool>,
}

#[async_trait]
impl ReplicationSession for RecordingSession {
    async fn drive(
        &self,
        _ctx: &JobContext,
        _sender: Arc<dyn Endpoint>,
        _receiver: Arc<dyn Endpoint>,
    ) -> Result<()> {
        self.fakes.events.push("drive");
        let delay = *self.fakes.drive_delay.lock().unwrap();
        tokio::time::sleep(delay).await;
        *self.done.lock().unwrap() = true;
        Ok(())
    }

    fn report(&self) -> JsonValue {
        let state = if *self.done.lock().unwrap() {
            "done"
        } else {
            "replicating"
        };
        json!({ "session": self.id, "state": state })
    }
}

struct RecordingReplication(Arc<JobFakes>);

impl ReplicationFactory for RecordingReplication {
    fn new_session(&self) -> Arc<dyn ReplicationSession> {
        let id = self.0.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        Arc::new(RecordingSession {
            id,
            fakes: Arc::clone(&self.0),
            done: Mutex::new(false),
        })
    }
}

struct RecordingPruner {
    side: Side,
    fakes: Arc<JobFakes>,
}

#[async_trait]
impl Pruner for RecordingPruner {
    async fn prune(&self) -> Result<()> {
        self.fakes.events.push(format!("prune:{}", self.side));
        Ok(())
    }
}

struct RecordingPruners(Arc<JobFakes>);

impl PrunerFactory for RecordingPruners {
    fn build_sender_pruner(
        &self,
        _ctx: &JobContext,
        _target: Arc<dyn Endpoint>,
        _reference: Arc<dyn Endpoint>,
    ) -> Box<dyn Pruner> {
        Box::new(RecordingPruner {
            side: Side::Sender,
            fakes: Arc::clone(&self.0),
        })
    }

    fn build_receiver_pruner(
        &self,
        _ctx: &JobContext,
        _target: Arc<dyn Endpoint>,
        reference: Arc<dyn Endpoint>,
    ) -> Box<dyn Pruner> {
        assert_eq!(reference.side(), Side::Sender);
        Box::new(RecordingPruner {
            side: Side::Receiver,
            fakes: Arc::clone(&self.0),
        })
    }
}

/// Builds every configured job from recording fakes, one set per job name.
#[derive(Default)]
pub struct FakeBuilder {
    jobs: Mutex<HashMap<String, Arc<JobFakes>>>,
}

impl FakeBuilder {
    pub fn fakes(&self, job: &str) -> Arc<JobFakes> {
        let mut jobs = self.jobs.lock().unwrap();
        Arc::clone(jobs.entry(job.to_string()).or_default())
    }
}

impl JobBuilder for FakeBuilder {
    fn build_push(&self, config: &JobConfig) -> Result<PushJobParts> {
        let prefixes = config
            .filesystems
            .iter()
            .filter(|(_, included)| included.as_bool() == Some(true))
            .map(|(rule, _)| rule.trim_end_matches('<').to_string())
            .collect::<Vec<_>>();
        if prefixes.is_empty() {
            anyhow::bail!("job {} includes no filesystems", config.name);
        }

        let fakes = self.fakes(&config.name);
        Ok(PushJobParts {
            connecter: Arc::new(RecordingConnecter(Arc::clone(&fakes))),
            fs_filter: Arc::new(PrefixFilter { prefixes }),
            endpoints: Arc::new(SideEndpoints),
            replication: Arc::new(RecordingReplication(Arc::clone(&fakes))),
            pruner_factory: Arc::new(RecordingPruners(fakes)),
        })
    }
}
