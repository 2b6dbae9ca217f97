use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{UpdateError, UpdateInfo, UpdateResult};
use crate::host::{commands, invoke, HostGateway};

const USER_AGENT: &str = concat!("review-popup/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_RELEASE_TIMEOUT: Duration = Duration::from_secs(15);

/// Latest published release, shaped like a GitHub `releases/latest` reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ReleaseDescriptor {
    pub tag_name: String,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub body: Option<String>,
}

#[async_trait]
pub trait ReleaseSource: Send + Sync {
    async fn latest_release(&self) -> UpdateResult<ReleaseDescriptor>;
}

/// Asks the host's updater which release is current.
pub struct HostReleaseSource {
    host: Arc<dyn HostGateway>,
}

impl HostReleaseSource {
    pub fn new(host: Arc<dyn HostGateway>) -> Self {
        Self { host }
    }
}

#[async_trait]
impl ReleaseSource for HostReleaseSource {
    async fn latest_release(&self) -> UpdateResult<ReleaseDescriptor> {
        let info: UpdateInfo =
            invoke(self.host.as_ref(), commands::CHECK_FOR_UPDATES, Value::Null).await?;
        Ok(ReleaseDescriptor {
            tag_name: info.latest_version,
            html_url: info.download_url,
            body: Some(info.release_notes).filter(|notes| !notes.is_empty()),
        })
    }
}

/// Fetches the release descriptor over HTTP on a blocking thread.
pub struct HttpReleaseSource {
    url: String,
    timeout: Duration,
}

impl HttpReleaseSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: DEFAULT_RELEASE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl ReleaseSource for HttpReleaseSource {
    async fn latest_release(&self) -> UpdateResult<ReleaseDescriptor> {
        let url = self.url.clone();
        let timeout = self.timeout;
        tokio::task::spawn_blocking(move || fetch_release(&url, timeout))
            .await
            .map_err(|err| UpdateError::Release(format!("release fetch task failed: {err}")))?
    }
}

fn fetch_release(url: &str, timeout: Duration) -> UpdateResult<ReleaseDescriptor> {
    tracing::debug!(url, "fetching latest release");
    let response = ureq::get(url)
        .timeout(timeout)
        .set("Accept", "application/vnd.github+json")
        .set("User-Agent", USER_AGENT)
        .call()
        .map_err(|err| match err {
            ureq::Error::Status(code, _) => {
                UpdateError::Release(format!("release endpoint answered {code}"))
            }
            ureq::Error::Transport(transport) => UpdateError::Release(transport.to_string()),
        })?;

    response
        .into_json()
        .map_err(|err| UpdateError::Release(format!("invalid release payload: {err}")))
}
