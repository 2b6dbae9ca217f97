//! Drives version checks and the host-side download/install.
//!
//! A check compares the running version against the configured release
//! source and caches the answer. The startup check reuses a fresh cache and
//! only prompts for a version the user has not dismissed and has not already
//! been prompted about in this process. Checks are serialized: a caller
//! that overlaps a running check waits for it and shares its answer.
//! `perform_update` is guarded so overlapping calls collapse into one
//! download.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::release::ReleaseSource;
use super::state::{CachedCheck, UpdateStore};
use super::version::{compare_versions, extract_version, version_from_app_info};
use super::{UpdateError, UpdateInfo, UpdateProgress, UpdateResult, UpdateStatus, VersionInfo};
use crate::host::commands::{self, events};
use crate::host::{invoke, invoke_unit, EventChannel, HostGateway, Subscription};
use crate::timer::SharedClock;

pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60 * 60);
const NO_RELEASE_NOTES: &str = "No release notes";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOutcome {
    Completed,
    /// Another `perform_update` was already in flight.
    AlreadyRunning,
}

#[derive(Debug, Default)]
struct PipelineState {
    info: Option<VersionInfo>,
    last_check: Option<DateTime<Utc>>,
    prompt_visible: bool,
    prompted: HashSet<String>,
    status: UpdateStatus,
    progress: Option<UpdateProgress>,
}

type SharedState = Arc<Mutex<PipelineState>>;

fn lock(state: &SharedState) -> std::sync::MutexGuard<'_, PipelineState> {
    state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Clears a busy flag however the guarded call exits.
struct BusyGuard<'a>(&'a AtomicBool);

impl BusyGuard<'_> {
    fn acquire(flag: &AtomicBool) -> Option<BusyGuard<'_>> {
        (!flag.swap(true, Ordering::SeqCst)).then(|| BusyGuard(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct UpdatePipeline {
    host: Arc<dyn HostGateway>,
    events: Arc<dyn EventChannel>,
    source: Arc<dyn ReleaseSource>,
    store: UpdateStore,
    clock: SharedClock,
    check_interval: Duration,
    download_page: Option<String>,
    check_lock: tokio::sync::Mutex<()>,
    completed_checks: AtomicU64,
    updating: AtomicBool,
    state: SharedState,
}

impl UpdatePipeline {
    pub fn new(
        host: Arc<dyn HostGateway>,
        events: Arc<dyn EventChannel>,
        source: Arc<dyn ReleaseSource>,
        store: UpdateStore,
        clock: SharedClock,
    ) -> Self {
        Self {
            host,
            events,
            source,
            store,
            clock,
            check_interval: DEFAULT_CHECK_INTERVAL,
            download_page: None,
            check_lock: tokio::sync::Mutex::new(()),
            completed_checks: AtomicU64::new(0),
            updating: AtomicBool::new(false),
            state: SharedState::default(),
        }
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Page opened when the last check carried no release link.
    pub fn with_download_page(mut self, url: Option<String>) -> Self {
        self.download_page = url;
        self
    }

    pub fn status(&self) -> UpdateStatus {
        lock(&self.state).status
    }

    pub fn progress(&self) -> Option<UpdateProgress> {
        lock(&self.state).progress.clone()
    }

    pub fn is_prompt_visible(&self) -> bool {
        lock(&self.state).prompt_visible
    }

    pub fn is_checking(&self) -> bool {
        self.check_lock.try_lock().is_err()
    }

    pub fn is_updating(&self) -> bool {
        self.updating.load(Ordering::SeqCst)
    }

    pub fn hide_prompt(&self) {
        lock(&self.state).prompt_visible = false;
    }

    /// Running version as reported by the host, or this crate's version.
    pub async fn current_version(&self) -> String {
        match invoke::<String>(self.host.as_ref(), commands::GET_APP_INFO, Value::Null).await {
            Ok(info) => version_from_app_info(&info).unwrap_or_else(|| {
                tracing::debug!(%info, "app info carries no version; using built-in version");
                env!("CARGO_PKG_VERSION").to_string()
            }),
            Err(err) => {
                tracing::warn!(error = %err, "failed to read app info; using built-in version");
                env!("CARGO_PKG_VERSION").to_string()
            }
        }
    }

    /// Last known version info, or an up-to-date one for the running
    /// version when nothing was checked yet. The placeholder is not cached.
    pub async fn version_info(&self) -> VersionInfo {
        if let Some(info) = lock(&self.state).info.clone() {
            return info;
        }
        VersionInfo::up_to_date(self.current_version().await)
    }

    pub async fn check_latest(&self) -> UpdateResult<VersionInfo> {
        let seen = self.completed_checks.load(Ordering::SeqCst);
        let _checking = self.check_lock.lock().await;
        if self.completed_checks.load(Ordering::SeqCst) != seen {
            if let Some(info) = lock(&self.state).info.clone() {
                tracing::debug!(latest = %info.latest, "sharing result of overlapping check");
                return Ok(info);
            }
        }

        let current = self.current_version().await;
        let release = self.source.latest_release().await?;
        let latest = extract_version(&release.tag_name)
            .ok_or_else(|| UpdateError::InvalidVersion(release.tag_name.clone()))?;
        let has_update = compare_versions(&latest, &current).is_gt();
        let info = VersionInfo {
            current,
            latest,
            has_update,
            release_url: release.html_url,
            release_notes: release
                .body
                .filter(|notes| !notes.trim().is_empty())
                .unwrap_or_else(|| NO_RELEASE_NOTES.to_string()),
        };

        let now = self.clock.now();
        {
            let mut state = lock(&self.state);
            state.info = Some(info.clone());
            state.last_check = Some(now);
        }
        self.completed_checks.fetch_add(1, Ordering::SeqCst);
        let cached = CachedCheck {
            last_check: now,
            info: info.clone(),
        };
        if let Err(err) = self.store.store_check(&cached) {
            tracing::warn!(error = %err, "failed to persist version check");
        }

        tracing::info!(
            current = %info.current,
            latest = %info.latest,
            has_update = info.has_update,
            "version check finished"
        );
        Ok(info)
    }

    /// Returns whether the update prompt was raised.
    pub async fn auto_check_on_startup(&self) -> bool {
        let current = self.current_version().await;
        let info = match self.fresh_cached_info(&current) {
            Some(info) => {
                tracing::debug!(latest = %info.latest, "using cached version check");
                info
            }
            None => match self.check_latest().await {
                Ok(info) => info,
                Err(err) => {
                    tracing::warn!(error = %err, "startup version check failed");
                    return false;
                }
            },
        };

        if !info.has_update {
            return false;
        }

        match self.store.is_dismissed(&info.latest) {
            Ok(true) => {
                tracing::debug!(latest = %info.latest, "update dismissed earlier; not prompting");
                return false;
            }
            Ok(false) => {}
            Err(err) => tracing::warn!(error = %err, "failed to read dismissed versions"),
        }

        let mut state = lock(&self.state);
        if !state.prompted.insert(info.latest.clone()) {
            return false;
        }
        state.prompt_visible = true;
        tracing::info!(latest = %info.latest, "update available");
        true
    }

    // In-memory check first, then the persisted one. Either only counts when
    // younger than the interval and taken against the running version.
    fn fresh_cached_info(&self, current: &str) -> Option<VersionInfo> {
        let max_age = chrono::Duration::from_std(self.check_interval).ok()?;
        let now = self.clock.now();

        let in_memory = {
            let state = lock(&self.state);
            state.last_check.zip(state.info.clone())
        };
        let (last_check, info) = match in_memory {
            Some(found) => found,
            None => {
                let cached = self
                    .store
                    .cached_check()
                    .map_err(|err| {
                        tracing::warn!(error = %err, "ignoring unreadable version cache")
                    })
                    .ok()
                    .flatten()?;
                (cached.last_check, cached.info)
            }
        };

        let fresh = now.signed_duration_since(last_check) < max_age && info.current == current;
        if !fresh {
            return None;
        }
        let mut state = lock(&self.state);
        state.info = Some(info.clone());
        state.last_check = Some(last_check);
        Some(info)
    }

    /// Never prompt for the current latest version again.
    pub fn dismiss(&self) -> UpdateResult<()> {
        let latest = lock(&self.state)
            .info
            .as_ref()
            .map(|info| info.latest.clone());
        if let Some(latest) = latest {
            self.store.dismiss(&latest)?;
            tracing::info!(%latest, "update dismissed");
        }
        self.hide_prompt();
        Ok(())
    }

    /// User-initiated check. Forgets every dismissal and prompts whenever
    /// an update exists.
    pub async fn manual_check(&self) -> UpdateResult<VersionInfo> {
        self.store.clear_dismissed()?;
        let info = self.check_latest().await?;
        if info.has_update {
            let mut state = lock(&self.state);
            state.prompted.insert(info.latest.clone());
            state.prompt_visible = true;
        }
        Ok(info)
    }

    pub async fn perform_update(&self) -> UpdateResult<UpdateOutcome> {
        let Some(_updating) = BusyGuard::acquire(&self.updating) else {
            tracing::info!("update already in progress");
            return Ok(UpdateOutcome::AlreadyRunning);
        };

        match self.download_and_install().await {
            Ok(()) => {
                self.set_status(UpdateStatus::Completed);
                tracing::info!("update installed");
                Ok(UpdateOutcome::Completed)
            }
            Err(err) => {
                self.set_status(UpdateStatus::Error);
                tracing::warn!(error = %err, "update failed");
                Err(err)
            }
        }
    }

    async fn download_and_install(&self) -> UpdateResult<()> {
        {
            let mut state = lock(&self.state);
            state.status = UpdateStatus::Checking;
            state.progress = None;
        }

        let host_check =
            invoke::<UpdateInfo>(self.host.as_ref(), commands::CHECK_FOR_UPDATES, Value::Null)
                .await;
        let available = match host_check {
            Ok(info) => info.available,
            Err(err) => {
                tracing::warn!(error = %err, "host update check failed; comparing releases");
                self.check_latest().await?.has_update
            }
        };
        if !available {
            return Err(UpdateError::NoUpdateAvailable);
        }

        let subscriptions = self.watch_install().await?;
        self.set_status(UpdateStatus::Downloading);
        let installed = invoke_unit(
            self.host.as_ref(),
            commands::DOWNLOAD_AND_INSTALL_UPDATE,
            Value::Null,
        )
        .await;
        drop(subscriptions);

        installed.map_err(UpdateError::from)
    }

    async fn watch_install(&self) -> UpdateResult<Vec<Subscription>> {
        let state = self.state.clone();
        let progress = self
            .events
            .listen(
                events::UPDATE_DOWNLOAD_PROGRESS,
                Arc::new(move |payload: Value| {
                    match serde_json::from_value::<UpdateProgress>(payload) {
                        Ok(progress) => {
                            let mut state = lock(&state);
                            state.progress = Some(progress);
                            state.status = UpdateStatus::Downloading;
                        }
                        Err(err) => {
                            tracing::debug!(error = %err, "ignoring malformed progress event")
                        }
                    }
                }),
            )
            .await?;

        let state = self.state.clone();
        let started = self
            .events
            .listen(
                events::UPDATE_INSTALL_STARTED,
                Arc::new(move |_payload: Value| {
                    lock(&state).status = UpdateStatus::Installing;
                }),
            )
            .await?;

        let state = self.state.clone();
        let finished = self
            .events
            .listen(
                events::UPDATE_INSTALL_FINISHED,
                Arc::new(move |_payload: Value| {
                    lock(&state).status = UpdateStatus::Completed;
                }),
            )
            .await?;

        Ok(vec![progress, started, finished])
    }

    pub async fn restart(&self) -> UpdateResult<()> {
        invoke_unit(self.host.as_ref(), commands::RESTART_PROCESS, Value::Null)
            .await
            .map_err(|err| {
                tracing::error!(error = %err, "restart request failed");
                UpdateError::from(err)
            })
    }

    /// Open the last checked release in the user's browser, or the
    /// configured download page when the check carried no link. Returns the
    /// URL handed to the host.
    pub async fn open_release_page(&self) -> UpdateResult<String> {
        let release_url = lock(&self.state)
            .info
            .as_ref()
            .map(|info| info.release_url.clone())
            .filter(|url| !url.trim().is_empty());
        let url = release_url
            .or_else(|| self.download_page.clone())
            .ok_or(UpdateError::NoReleasePage)?;

        invoke_unit(
            self.host.as_ref(),
            commands::OPEN_EXTERNAL_URL,
            serde_json::json!({ "url": url }),
        )
        .await
        .map_err(|err| {
            tracing::warn!(error = %err, %url, "failed to open release page");
            UpdateError::from(err)
        })?;
        Ok(url)
    }

    fn set_status(&self, status: UpdateStatus) {
        lock(&self.state).status = status;
    }
}
