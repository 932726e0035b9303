//! Test daemon lifecycle management

use super::fakes::{FakeBuilder, JobFakes};
use snaprelay::config::{CliConfig, FileConfig};
use snaprelay::{run_daemon, AppConfig, ControlClient};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Daemon running on a temporary control socket.
///
/// Dropping it cancels the daemon.
pub struct TestDaemon {
    pub sockpath: PathBuf,
    pub client: ControlClient,
    builder: Arc<FakeBuilder>,
    token: CancellationToken,
    task: Option<JoinHandle<anyhow::Result<()>>>,
    _dir: TempDir,
}

impl TestDaemon {
    /// Spawns a daemon for the `[[jobs]]` in `jobs_toml` and waits until its
    /// control socket accepts requests.
    pub async fn spawn(jobs_toml: &str) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let sockpath = dir.path().join("control.sock");

        let file = FileConfig::parse(jobs_toml).expect("Invalid test config");
        let config = AppConfig::resolve(
            &CliConfig {
                sockpath: Some(sockpath.clone()),
            },
            Some(file),
        )
        .expect("Test config does not resolve");

        let builder = Arc::new(FakeBuilder::default());
        let token = CancellationToken::new();
        let task = {
            let builder = Arc::clone(&builder);
            let token = token.clone();
            tokio::spawn(async move { run_daemon(config, builder.as_ref(), token).await })
        };

        let client = ControlClient::new(&sockpath);
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while client.version().await.is_err() {
            assert!(
                tokio::time::Instant::now() < deadline,
                "daemon did not come up"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        Self {
            sockpath,
            client,
            builder,
            token,
            task: Some(task),
            _dir: dir,
        }
    }

    pub fn fakes(&self, job: &str) -> Arc<JobFakes> {
        self.builder.fakes(job)
    }

    /// Cancel the daemon and wait for it to return.
    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        self.token.cancel();
        let task = self.task.take().expect("daemon already shut down");
        tokio::time::timeout(Duration::from_secs(10), task)
            .await
            .expect("daemon did not stop in time")
            .expect("daemon task panicked")
    }
}

impl Drop for TestDaemon {
    fn drop(&mut self) {
        self.token.cancel();
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
