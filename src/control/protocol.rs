//! Wire types of the control API.
//!
//! The control API is JSON over HTTP/1.1 on a Unix socket. Field names of the
//! wakeup request are capitalized for compatibility with existing clients.

use crate::job::JobStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const ENDPOINT_WAKEUP: &str = "/job/wakeup";
pub const ENDPOINT_STATUS: &str = "/status";
pub const ENDPOINT_VERSION: &str = "/version";
pub const ENDPOINT_METRICS: &str = "/metrics";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WakeupRequest {
    #[serde(rename = "Name")]
    pub name: String,
}

/// Empty success body, serialized as `{}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WakeupResponse {}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusResponse {
    pub jobs: BTreeMap<String, JobStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionResponse {
    pub version: String,
}

impl VersionResponse {
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: String,
}
