//! Wires the components together over one host connection.
//!
//! Everything shared (gateway, event channel, store, clock, notifier,
//! config) is built once into an [`AppContext`] and handed to each
//! component. There are no globals; a second `App` over another context is
//! fully independent.

pub mod actions;

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::dispatch::RequestDispatcher;
use crate::error::AppResult;
use crate::host::{EventChannel, HostGateway, Subscription};
use crate::notification::{DesktopNotifier, Notifier};
use crate::request::ReviewRequest;
use crate::settings::{SettingsListeners, SettingsSnapshot, SettingsSynchronizer};
use crate::state::PopupController;
use crate::storage::KeyValueStore;
use crate::timer::{SharedClock, SystemClock};
use crate::update::state::UpdateStore;
use crate::update::{HostReleaseSource, HttpReleaseSource, ReleaseSource, UpdatePipeline};

#[derive(Clone)]
pub struct AppContext {
    pub host: Arc<dyn HostGateway>,
    pub events: Arc<dyn EventChannel>,
    pub store: Arc<dyn KeyValueStore>,
    pub clock: SharedClock,
    pub notifier: Arc<dyn Notifier>,
    pub config: AppConfig,
}

impl AppContext {
    pub fn new(
        host: Arc<dyn HostGateway>,
        events: Arc<dyn EventChannel>,
        store: Arc<dyn KeyValueStore>,
        config: AppConfig,
    ) -> Self {
        Self {
            host,
            events,
            store,
            clock: Arc::new(SystemClock),
            notifier: Arc::new(DesktopNotifier),
            config,
        }
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    fn release_source(&self) -> Arc<dyn ReleaseSource> {
        match &self.config.release_url {
            Some(url) => {
                tracing::debug!(%url, "version checks use release endpoint");
                Arc::new(HttpReleaseSource::new(url.clone()))
            }
            None => Arc::new(HostReleaseSource::new(self.host.clone())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupReport {
    /// A request file was named at launch and delivered.
    pub cold_start: bool,
    pub request: Option<ReviewRequest>,
    pub settings: SettingsSnapshot,
}

/// Live listeners of a started app. Dropping it detaches them.
pub struct Session {
    report: StartupReport,
    update_check: Option<JoinHandle<bool>>,
    _requests: Option<Subscription>,
    _settings: SettingsListeners,
}

impl Session {
    pub fn report(&self) -> &StartupReport {
        &self.report
    }

    pub fn is_listening_for_requests(&self) -> bool {
        self._requests.is_some()
    }

    /// Wait for the startup update check. `false` when it raised no prompt,
    /// did not finish, or was already awaited.
    pub async fn update_check(&mut self) -> bool {
        let Some(handle) = self.update_check.take() else {
            return false;
        };
        handle.await.unwrap_or_else(|err| {
            tracing::warn!(error = %err, "startup update check did not finish");
            false
        })
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(handle) = self.update_check.take() {
            handle.abort();
        }
    }
}

pub struct App {
    context: AppContext,
    popup: Arc<PopupController>,
    dispatcher: Arc<RequestDispatcher>,
    settings: Arc<SettingsSynchronizer>,
    updates: Arc<UpdatePipeline>,
}

impl App {
    pub fn new(context: AppContext) -> Self {
        let popup = Arc::new(PopupController::new(
            context.host.clone(),
            context.config.settle_delay(),
        ));
        let dispatcher = Arc::new(RequestDispatcher::new(
            context.host.clone(),
            context.events.clone(),
            popup.clone(),
        ));
        let settings = Arc::new(SettingsSynchronizer::new(
            context.host.clone(),
            context.notifier.clone(),
        ));
        let updates = Arc::new(
            UpdatePipeline::new(
                context.host.clone(),
                context.events.clone(),
                context.release_source(),
                UpdateStore::new(context.store.clone()),
                context.clock.clone(),
            )
            .with_check_interval(context.config.update_check_interval())
            .with_download_page(context.config.download_page.clone()),
        );

        Self {
            context,
            popup,
            dispatcher,
            settings,
            updates,
        }
    }

    /// Load settings, pick up a launch request or start listening for
    /// pushed ones, attach window listeners, then check for updates in the
    /// background.
    pub async fn start(&self) -> AppResult<Session> {
        tracing::info!("starting review popup");
        let settings = self.settings.load_all().await;

        let initial = self.dispatcher.resolve_initial_request().await;
        let requests = if initial.is_pending {
            if let Err(err) = self.settings.sync_window_state_from_backend().await {
                tracing::warn!(error = %err, "window state sync failed");
            }
            None
        } else {
            Some(self.dispatcher.subscribe_to_requests().await?)
        };

        let listeners = self.settings.attach(self.context.events.as_ref()).await?;

        let updates = self.updates.clone();
        let update_check = tokio::spawn(async move { updates.auto_check_on_startup().await });

        tracing::info!(cold_start = initial.is_pending, "startup complete");
        Ok(Session {
            report: StartupReport {
                cold_start: initial.is_pending,
                request: initial.request,
                settings,
            },
            update_check: Some(update_check),
            _requests: requests,
            _settings: listeners,
        })
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub fn popup(&self) -> &Arc<PopupController> {
        &self.popup
    }

    pub fn dispatcher(&self) -> &Arc<RequestDispatcher> {
        &self.dispatcher
    }

    pub fn settings(&self) -> &Arc<SettingsSynchronizer> {
        &self.settings
    }

    pub fn updates(&self) -> &Arc<UpdatePipeline> {
        &self.updates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::commands::{self, events};
    use crate::host::loopback::ScriptedHost;
    use crate::host::EventBus;
    use crate::notification::ToastLog;
    use crate::state::PopupPhase;
    use crate::storage::MemoryStore;
    use serde_json::json;
    use std::time::Duration;

    fn app(host: &Arc<ScriptedHost>, bus: &Arc<EventBus>) -> App {
        let context = AppContext::new(
            host.clone(),
            bus.clone(),
            Arc::new(MemoryStore::new()),
            AppConfig::default(),
        )
        .with_notifier(Arc::new(ToastLog::new()));
        App::new(context)
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_session_listens_for_requests() {
        let host = Arc::new(ScriptedHost::new());
        let bus = Arc::new(EventBus::new());
        let app = app(&host, &bus);

        let session = app.start().await.expect("start should work");

        assert!(!session.report().cold_start);
        assert!(session.is_listening_for_requests());
        assert_eq!(bus.listener_count(events::REQUEST_ARRIVED), 1);
        assert_eq!(bus.listener_count(events::WINDOW_RESIZED), 1);
        assert_eq!(host.count(commands::SYNC_WINDOW_STATE), 1);

        drop(session);
        assert_eq!(bus.listener_count(events::REQUEST_ARRIVED), 0);
        assert_eq!(bus.listener_count(events::WINDOW_FOCUS_CHANGED), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cold_start_shows_launch_request_and_syncs_window() {
        let host = Arc::new(ScriptedHost::new());
        host.respond(
            commands::GET_CLI_LAUNCH_ARGS,
            json!({ "request_file_path": "/tmp/r.json" }),
        );
        host.respond(
            commands::READ_REQUEST_FILE,
            json!({ "id": "r7", "message": "Ship it?" }),
        );
        host.respond(commands::GET_ALWAYS_ON_TOP, json!(true));
        let bus = Arc::new(EventBus::new());
        let app = app(&host, &bus);

        let mut session = app.start().await.expect("start should work");

        assert!(session.report().cold_start);
        assert_eq!(
            session.report().request.as_ref().map(|r| r.id.as_str()),
            Some("r7")
        );
        assert!(!session.is_listening_for_requests());
        assert_eq!(app.popup().phase(), PopupPhase::Showing);
        assert_eq!(host.count(commands::SYNC_WINDOW_STATE), 2);
        assert!(!session.update_check().await);
    }

    #[tokio::test(start_paused = true)]
    async fn settle_delay_comes_from_config() {
        let host = Arc::new(ScriptedHost::new());
        let bus = Arc::new(EventBus::new());
        let context = AppContext::new(
            host.clone(),
            bus.clone(),
            Arc::new(MemoryStore::new()),
            AppConfig {
                settle_delay_ms: 50,
                ..AppConfig::default()
            },
        );
        let app = App::new(context);
        let popup = app.popup().clone();

        let show = tokio::spawn(async move { popup.show(ReviewRequest::new("r1", "hi")).await });
        tokio::time::sleep(Duration::from_millis(51)).await;

        assert_eq!(app.popup().phase(), PopupPhase::Showing);
        show.await.expect("show should join");
    }
}
