//! Fake collaborators for job tests.

use crate::endpoint::{Endpoint, EndpointFactory, FsFilter, Side};
use crate::job::JobContext;
use crate::job::push::PushJobParts;
use crate::pruner::{Pruner, PrunerFactory};
use crate::replication::{ReplicationFactory, ReplicationSession};
use crate::transport::{Connecter, Connection};
use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Ordered record of what the collaborators were asked to do.
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
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.as_str() == event)
            .count()
    }
}

/// Lets a test hold a session inside `drive` until released.
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

pub struct FakeConnection {
    events: Arc<EventLog>,
}

#[async_trait]
impl Connection for FakeConnection {
    async fn close(&self, _ctx: &JobContext) {
        self.events.push("close");
    }
}

#[derive(Default)]
pub struct FakeConnecter {
    pub events: Arc<EventLog>,
    pub fail: AtomicBool,
}

#[async_trait]
impl Connecter for FakeConnecter {
    async fn connect(&self, _ctx: &JobContext) -> anyhow::Result<Arc<dyn Connection>> {
        if self.fail.load(Ordering::SeqCst) {
            self.events.push("connect-failed");
            anyhow::bail!("connection refused");
        }
        self.events.push("connect");
        Ok(Arc::new(FakeConnection {
            events: Arc::clone(&self.events),
        }))
    }
}

pub struct AcceptAll;

impl FsFilter for AcceptAll {
    fn matches(&self, _dataset: &str) -> bool {
        true
    }
}

pub struct FakeEndpoint {
    side: Side,
}

impl Endpoint for FakeEndpoint {
    fn side(&self) -> Side {
        self.side
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct FakeEndpoints;

impl EndpointFactory for FakeEndpoints {
    fn sender(&self, _filter: Arc<dyn FsFilter>) -> Arc<dyn Endpoint> {
        Arc::new(FakeEndpoint { side: Side::Sender })
    }

    fn receiver(&self, _connection: Arc<dyn Connection>) -> Arc<dyn Endpoint> {
        Arc::new(FakeEndpoint {
            side: Side::Receiver,
        })
    }
}

pub struct FakeSession {
    id: usize,
    events: Arc<EventLog>,
    fail: bool,
    panic: bool,
    gate: Option<Arc<Gate>>,
    state: Mutex<&'static str>,
}

#[async_trait]
impl ReplicationSession for FakeSession {
    async fn drive(
        &self,
        _ctx: &JobContext,
        sender: Arc<dyn Endpoint>,
        receiver: Arc<dyn Endpoint>,
    ) -> anyhow::Result<()> {
        assert_eq!(sender.side(), Side::Sender);
        assert_eq!(receiver.side(), Side::Receiver);
        self.events.push("drive");
        *self.state.lock().unwrap() = "replicating";
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        if self.panic {
            panic!("session {} blew up", self.id);
        }
        if self.fail {
            *self.state.lock().unwrap() = "failed";
            anyhow::bail!("receiver rejected stream");
        }
        *self.state.lock().unwrap() = "done";
        Ok(())
    }

    fn report(&self) -> JsonValue {
        json!({ "session": self.id, "state": *self.state.lock().unwrap() })
    }
}

#[derive(Default)]
pub struct FakeReplication {
    pub events: Arc<EventLog>,
    pub created: AtomicUsize,
    pub fail: AtomicBool,
    pub panic: AtomicBool,
    pub gate: Mutex<Option<Arc<Gate>>>,
}

impl FakeReplication {
    pub fn hold_sessions(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }
}

impl ReplicationFactory for FakeReplication {
    fn new_session(&self) -> Arc<dyn ReplicationSession> {
        let id = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        Arc::new(FakeSession {
            id,
            events: Arc::clone(&self.events),
            fail: self.fail.load(Ordering::SeqCst),
            panic: self.panic.load(Ordering::SeqCst),
            gate: self.gate.lock().unwrap().clone(),
            state: Mutex::new("planning"),
        })
    }
}

pub struct FakePruner {
    side: Side,
    fail: bool,
    events: Arc<EventLog>,
}

#[async_trait]
impl Pruner for FakePruner {
    async fn prune(&self) -> anyhow::Result<()> {
        self.events.push(format!("prune:{}", self.side));
        if self.fail {
            anyhow::bail!("cannot destroy snapshot on {}", self.side);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakePrunerFactory {
    pub events: Arc<EventLog>,
    pub built: AtomicUsize,
    pub fail_sender: AtomicBool,
    pub fail_receiver: AtomicBool,
}

impl PrunerFactory for FakePrunerFactory {
    fn build_sender_pruner(
        &self,
        _ctx: &JobContext,
        target: Arc<dyn Endpoint>,
        reference: Arc<dyn Endpoint>,
    ) -> Box<dyn Pruner> {
        assert_eq!(target.side(), Side::Sender);
        assert_eq!(reference.side(), Side::Sender);
        self.built.fetch_add(1, Ordering::SeqCst);
        Box::new(FakePruner {
            side: Side::Sender,
            fail: self.fail_sender.load(Ordering::SeqCst),
            events: Arc::clone(&self.events),
        })
    }

    fn build_receiver_pruner(
        &self,
        _ctx: &JobContext,
        target: Arc<dyn Endpoint>,
        reference: Arc<dyn Endpoint>,
    ) -> Box<dyn Pruner> {
        assert_eq!(target.side(), Side::Receiver);
        assert_eq!(reference.side(), Side::Sender);
        self.built.fetch_add(1, Ordering::SeqCst);
        Box::new(FakePruner {
            side: Side::Receiver,
            fail: self.fail_receiver.load(Ordering::SeqCst),
            events: Arc::clone(&self.events),
        })
    }
}

/// All fakes of one job, sharing a single event log.
pub struct Fakes {
    pub events: Arc<EventLog>,
    pub connecter: Arc<FakeConnecter>,
    pub replication: Arc<FakeReplication>,
    pub pruners: Arc<FakePrunerFactory>,
}

impl Fakes {
    pub fn new() -> Self {
        let events = Arc::new(EventLog::default());
        Self {
            connecter: Arc::new(FakeConnecter {
                events: Arc::clone(&events),
                ..Default::default()
            }),
            replication: Arc::new(FakeReplication {
                events: Arc::clone(&events),
                ..Default::default()
            }),
            pruners: Arc::new(FakePrunerFactory {
                events: Arc::clone(&events),
                ..Default::default()
            }),
            events,
        }
    }

    pub fn parts(&self) -> PushJobParts {
        PushJobParts {
            connecter: self.connecter.clone(),
            fs_filter: Arc::new(AcceptAll),
            endpoints: Arc::new(FakeEndpoints),
            replication: self.replication.clone(),
            pruner_factory: self.pruners.clone(),
        }
    }
}

/// Poll `condition` until it holds or a generous deadline passes.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
