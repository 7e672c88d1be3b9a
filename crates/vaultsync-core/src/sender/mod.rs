//! Delivery of archives to package manager endpoints
//!
//! Each target is contacted independently. Every attempt ends in a
//! [`PushResult`]; failures are values, never panics or early returns that
//! would skip the remaining targets.

pub mod response;
pub mod target;

use std::future::Future;
use std::path::Path;
use std::time::{Duration, Instant};

use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::error::PushError;

pub use response::{CrxResponse, ERROR_MARKER, parse_response};
pub use target::Target;

const USER_AGENT: &str = concat!("vaultsync/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of pushing one archive to one target.
#[derive(Debug, Clone)]
pub struct PushResult {
    /// Target URL without credentials.
    pub target: String,
    pub elapsed: Duration,
    /// Install log returned by the remote, when one was received.
    pub log: Option<String>,
    pub outcome: Result<(), PushError>,
}

impl PushResult {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Something that can push an archive to a target.
pub trait Deliver: Send + Sync + 'static {
    fn deliver(&self, archive: &Path, target: &Target) -> impl Future<Output = PushResult> + Send;
}

/// HTTP sender for the package manager service.
#[derive(Debug, Clone)]
pub struct Sender {
    client: Client,
    check_if_up: bool,
}

impl Sender {
    /// With `check_if_up`, each target is probed before the upload.
    pub fn new(check_if_up: bool) -> reqwest::Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            check_if_up,
        })
    }

    /// Whether `target` answers its root URL with `200 OK`.
    pub async fn is_ready(&self, target: &Target) -> bool {
        let mut request = self.client.get(target.base_url()).timeout(PROBE_TIMEOUT);
        if let Some((user, pass)) = target.credentials() {
            request = request.basic_auth(user, pass);
        }

        match request.send().await {
            Ok(response) => response.status() == StatusCode::OK,
            Err(e) => {
                debug!("Probe of {} failed: {}", target, e);
                false
            }
        }
    }

    pub async fn send(&self, archive: &Path, target: &Target) -> PushResult {
        let started = Instant::now();

        let (log, outcome) = if self.check_if_up && !self.is_ready(target).await {
            (None, Err(PushError::NotReady))
        } else {
            match self.post(archive, target).await {
                Ok(response) => {
                    let outcome = response.outcome();
                    (Some(response.log), outcome)
                }
                Err(e) => (None, Err(e)),
            }
        };

        PushResult {
            target: target.to_string(),
            elapsed: started.elapsed(),
            log,
            outcome,
        }
    }

    async fn post(&self, archive: &Path, target: &Target) -> Result<CrxResponse, PushError> {
        let bytes = tokio::fs::read(archive)
            .await
            .map_err(|e| PushError::Archive(format!("{}: {}", archive.display(), e)))?;

        let file_name = archive
            .file_name()
            .map_or_else(|| "package.zip".to_string(), |n| n.to_string_lossy().into_owned());
        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/zip")
            .map_err(|e| PushError::Other(e.to_string()))?;
        let form = Form::new()
            .part("file", part)
            .text("force", "true")
            .text("install", "true");

        let mut request = self.client.post(target.endpoint()).multipart(form);
        if let Some((user, pass)) = target.credentials() {
            request = request.basic_auth(user, pass);
        }

        debug!("Posting to {}", target);
        let response = request
            .send()
            .await
            .map_err(|e| PushError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PushError::Rejected {
                status: status.to_string(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| PushError::Unreachable(e.to_string()))?;
        parse_response(&body)
    }
}

impl Deliver for Sender {
    fn deliver(&self, archive: &Path, target: &Target) -> impl Future<Output = PushResult> + Send {
        self.send(archive, target)
    }
}
