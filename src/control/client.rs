use super::protocol::{
    ErrorResponse, StatusResponse, VersionResponse, WakeupRequest, WakeupResponse,
    ENDPOINT_METRICS, ENDPOINT_STATUS, ENDPOINT_VERSION, ENDPOINT_WAKEUP,
};
use axum::body::{Body, Bytes};
use axum::http::{header, Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::net::UnixStream;
use tracing::debug;

const MAX_RESPONSE_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("usage: {0}")]
    Usage(String),
    #[error("cannot connect to control socket {path:?}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid request: {0}")]
    Request(#[from] axum::http::Error),
    #[error("control connection failed: {0}")]
    Http(#[from] hyper::Error),
    #[error("cannot read response: {0}")]
    Body(#[from] axum::Error),
    #[error("daemon returned {status}: {message}")]
    Server { status: StatusCode, message: String },
    #[error("cannot decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ControlError {
    pub fn is_usage(&self) -> bool {
        matches!(self, ControlError::Usage(_))
    }
}

/// Client for the daemon's control socket. Opens one connection per request.
#[derive(Debug, Clone)]
pub struct ControlClient {
    sockpath: PathBuf,
}

impl ControlClient {
    pub fn new(sockpath: impl Into<PathBuf>) -> Self {
        Self {
            sockpath: sockpath.into(),
        }
    }

    pub fn sockpath(&self) -> &Path {
        &self.sockpath
    }

    pub async fn wakeup(&self, job: &str) -> Result<(), ControlError> {
        let body = serde_json::to_vec(&WakeupRequest {
            name: job.to_string(),
        })?;
        let _: WakeupResponse = self.request(Method::POST, ENDPOINT_WAKEUP, Some(body)).await?;
        Ok(())
    }

    pub async fn status(&self) -> Result<StatusResponse, ControlError> {
        self.request(Method::GET, ENDPOINT_STATUS, None).await
    }

    pub async fn version(&self) -> Result<VersionResponse, ControlError> {
        self.request(Method::GET, ENDPOINT_VERSION, None).await
    }

    /// Prometheus text exposition of the daemon's metrics.
    pub async fn metrics(&self) -> Result<String, ControlError> {
        let bytes = self.send(Method::GET, ENDPOINT_METRICS, None).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Vec<u8>>,
    ) -> Result<T, ControlError> {
        let bytes = self.send(method, endpoint, body).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// One request/response exchange on a fresh connection. Non-2xx
    /// responses become [`ControlError::Server`].
    async fn send(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Bytes, ControlError> {
        let stream = UnixStream::connect(&self.sockpath)
            .await
            .map_err(|source| ControlError::Connect {
                path: self.sockpath.clone(),
                source,
            })?;

        let (mut sender, conn) =
            hyper::client::conn::http1::handshake::<_, Body>(TokioIo::new(stream)).await?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!("control connection closed with error: {}", e);
            }
        });

        let request = Request::builder()
            .method(method)
            .uri(endpoint)
            .header(header::HOST, "localhost")
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.map(Body::from).unwrap_or_else(Body::empty))?;

        let response = sender.send_request(request).await?;
        let status = response.status();
        let bytes = axum::body::to_bytes(Body::new(response.into_body()), MAX_RESPONSE_BYTES).await?;

        if !status.is_success() {
            let message = match serde_json::from_slice::<ErrorResponse>(&bytes) {
                Ok(error) => error.error,
                Err(_) => String::from_utf8_lossy(&bytes).trim().to_string(),
            };
            return Err(ControlError::Server { status, message });
        }

        Ok(bytes)
    }
}

/// Validate the arguments of the `wakeup` command: exactly one non-empty job name.
pub fn wakeup_target(args: &[String]) -> Result<&str, ControlError> {
    match args {
        [name] if !name.trim().is_empty() => Ok(name.as_str()),
        [_] => Err(ControlError::Usage("job name must not be empty".to_string())),
        _ => Err(ControlError::Usage(format!(
            "wakeup expects exactly one argument (the job name), got {}",
            args.len()
        ))),
    }
}

/// The `wakeup` command. Usage errors are reported before the socket is touched.
pub async fn run_wakeup(sockpath: &Path, args: &[String]) -> Result<(), ControlError> {
    let name = wakeup_target(args)?;
    ControlClient::new(sockpath).wakeup(name).await
}
