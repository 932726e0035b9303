//! Replication endpoints and the dataset filter that scopes the sending side.

use crate::transport::Connection;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Decides which local datasets participate in a job.
pub trait FsFilter: Send + Sync {
    fn matches(&self, dataset: &str) -> bool;
}

/// Which end of a replication an endpoint (or a pruner) acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Sender,
    Receiver,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Sender => "sender",
            Side::Receiver => "receiver",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One end of a replication, as seen by the replication engine and the pruner.
///
/// The job never inspects endpoints; it only builds them and hands them on.
/// Collaborators recover their concrete types through [`Endpoint::as_any`].
pub trait Endpoint: Send + Sync {
    fn side(&self) -> Side;

    fn as_any(&self) -> &dyn Any;
}

/// Builds the two endpoints of an invocation.
pub trait EndpointFactory: Send + Sync {
    /// Local endpoint exposing the datasets accepted by `filter`.
    fn sender(&self, filter: Arc<dyn FsFilter>) -> Arc<dyn Endpoint>;

    /// Remote endpoint reached through `connection`.
    fn receiver(&self, connection: Arc<dyn Connection>) -> Arc<dyn Endpoint>;
}
