use super::protocol::{
    ErrorResponse, StatusResponse, VersionResponse, WakeupRequest, WakeupResponse,
    ENDPOINT_METRICS, ENDPOINT_STATUS, ENDPOINT_VERSION, ENDPOINT_WAKEUP,
};
use crate::job::{JobError, JobManagerHandle};
use crate::metrics::metrics_handler;
use anyhow::{bail, Context, Result};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Clone)]
struct ControlState {
    jobs: JobManagerHandle,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

impl IntoResponse for JobError {
    fn into_response(self) -> Response {
        let status = match self {
            JobError::NotFound(_) => StatusCode::NOT_FOUND,
            JobError::Stopped(_) => StatusCode::SERVICE_UNAVAILABLE,
            JobError::DuplicateName(_) | JobError::InvalidName(_) => StatusCode::BAD_REQUEST,
        };
        error_response(status, self.to_string())
    }
}

async fn wakeup_job(
    State(state): State<ControlState>,
    body: Result<Json<WakeupRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            debug!("rejected wakeup request: {}", rejection.body_text());
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };

    if request.name.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "job name must not be empty");
    }

    match state.jobs.wakeup(&request.name) {
        Ok(_) => Json(WakeupResponse {}).into_response(),
        Err(e) => {
            warn!("wakeup {:?} failed: {}", request.name, e);
            e.into_response()
        }
    }
}

async fn get_status(State(state): State<ControlState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        jobs: state.jobs.status(),
    })
}

async fn get_version() -> Json<VersionResponse> {
    Json(VersionResponse::current())
}

pub fn control_router(jobs: JobManagerHandle) -> Router {
    Router::new()
        .route(ENDPOINT_WAKEUP, post(wakeup_job))
        .route(ENDPOINT_STATUS, get(get_status))
        .route(ENDPOINT_VERSION, get(get_version))
        .route(ENDPOINT_METRICS, get(metrics_handler))
        .with_state(ControlState { jobs })
}

/// Bind the control socket at `path`.
///
/// Creates the parent directory and removes a stale socket file left behind
/// by a previous daemon. Refuses to take over a socket another process still
/// accepts connections on, and never removes anything that is not a socket.
pub async fn bind_control_socket(path: &Path) -> Result<UnixListener> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create control socket directory {:?}", parent))?;
    }

    match tokio::fs::symlink_metadata(path).await {
        Ok(metadata) => {
            if !metadata.file_type().is_socket() {
                bail!("Control socket path {:?} exists and is not a socket", path);
            }
            if UnixStream::connect(path).await.is_ok() {
                bail!("Control socket {:?} is in use by another daemon", path);
            }
            info!(path = %path.display(), "Removing stale control socket");
            tokio::fs::remove_file(path)
                .await
                .with_context(|| format!("Failed to remove stale control socket {:?}", path))?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(e).with_context(|| format!("Cannot inspect control socket path {:?}", path))
        }
    }

    UnixListener::bind(path).with_context(|| format!("Failed to bind control socket {:?}", path))
}

/// Serve the control API until `shutdown` is cancelled.
pub async fn serve_control(
    listener: UnixListener,
    path: PathBuf,
    jobs: JobManagerHandle,
    shutdown: CancellationToken,
) -> Result<()> {
    info!(path = %path.display(), "Control server listening");

    axum::serve(listener, control_router(jobs))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("Control server failed")?;

    if let Err(e) = std::fs::remove_file(&path) {
        debug!("Failed to remove control socket {:?}: {}", path, e);
    }
    info!("Control server stopped");
    Ok(())
}
