//! Single-slot, coalescing wakeup signal.
//!
//! A [`WakeupHandle`] can be cloned and handed to any number of signalling
//! tasks (control server, interval ticker). The matching [`WakeupListener`] is
//! owned by the job loop. At most one wakeup is ever pending: signalling while
//! one is already queued is a no-op.

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

/// Result of a successful [`WakeupHandle::wakeup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeupOutcome {
    /// The slot was empty, the job will observe this wakeup.
    Queued,
    /// A wakeup was already pending; this one merged into it.
    Coalesced,
}

impl WakeupOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WakeupOutcome::Queued => "queued",
            WakeupOutcome::Coalesced => "coalesced",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WakeupError {
    /// The context the signal was derived from has been cancelled.
    #[error("job context cancelled")]
    Cancelled,
    /// The job loop has exited and dropped its listener.
    #[error("job loop is not running")]
    Closed,
}

/// What [`WakeupListener::wait`] observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    Wakeup,
    Cancelled,
}

/// Create a wakeup signal scoped to `token`.
pub fn signal(token: CancellationToken) -> (WakeupHandle, WakeupListener) {
    let (tx, rx) = mpsc::channel(1);
    (
        WakeupHandle {
            tx,
            token: token.clone(),
        },
        WakeupListener { rx, token },
    )
}

/// Sending half. Never blocks.
#[derive(Clone, Debug)]
pub struct WakeupHandle {
    tx: mpsc::Sender<()>,
    token: CancellationToken,
}

impl WakeupHandle {
    pub fn wakeup(&self) -> Result<WakeupOutcome, WakeupError> {
        if self.token.is_cancelled() {
            return Err(WakeupError::Cancelled);
        }
        match self.tx.try_send(()) {
            Ok(()) => Ok(WakeupOutcome::Queued),
            Err(TrySendError::Full(())) => Ok(WakeupOutcome::Coalesced),
            Err(TrySendError::Closed(())) => Err(WakeupError::Closed),
        }
    }
}

/// Receiving half, owned by the job loop.
#[derive(Debug)]
pub struct WakeupListener {
    rx: mpsc::Receiver<()>,
    token: CancellationToken,
}

impl WakeupListener {
    /// Block until either a wakeup is pending or the scope is cancelled.
    ///
    /// Cancellation wins over a pending wakeup, so a loop that is cancelled
    /// while idle never starts another invocation.
    pub async fn wait(&mut self) -> Wait {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Wait::Cancelled,
            received = self.rx.recv() => match received {
                Some(()) => Wait::Wakeup,
                // All handles dropped: nothing can wake us again, only
                // cancellation can end the wait.
                None => {
                    self.token.cancelled().await;
                    Wait::Cancelled
                }
            },
        }
    }
}
