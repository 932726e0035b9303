//! Common test infrastructure
//!
//! Spawns a daemon on a temporary control socket whose jobs run against
//! recording fakes instead of real datasets.

mod daemon;
mod fakes;

pub use daemon::{wait_until, TestDaemon};
#[allow(unused_imports)]
pub use fakes::{EventLog, FakeBuilder, JobFakes};

pub const TANK_BACKUP: &str = "tank-backup";
pub const POOL_OFFSITE: &str = "pool-offsite";
