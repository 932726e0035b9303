//! Control API: the daemon's Unix socket server and the matching client.

mod client;
pub mod protocol;
mod server;

pub use client::{run_wakeup, wakeup_target, ControlClient, ControlError};
pub use protocol::{StatusResponse, VersionResponse, WakeupRequest};
pub use server::{bind_control_socket, control_router, serve_control};
