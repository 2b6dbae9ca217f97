//! Keeps window geometry and user preferences in step with the host.
//!
//! Resize events are debounced so a drag produces one write with the final
//! size. Regaining focus reloads everything, since another session may have
//! changed the shared config in the meantime.

pub mod model;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;

use crate::geometry::{SizeValidation, WindowSettings, WindowSize};
use crate::host::commands::{self, events};
use crate::host::{
    invoke, invoke_unit, EventChannel, HostError, HostGateway, HostResult, Subscription,
};
use crate::notification::{Notifier, ToastLevel};
use crate::timer::Debouncer;

pub use model::{
    AudioSettings, ReplyConfig, ReplyConfigPatch, SettingsSnapshot, DEFAULT_CONTINUE_PROMPT,
};

pub type SettingsResult<T> = std::result::Result<T, SettingsError>;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to {action}: {source}")]
    Host {
        action: &'static str,
        #[source]
        source: HostError,
    },
}

pub struct SettingsSynchronizer {
    host: Arc<dyn HostGateway>,
    notifier: Arc<dyn Notifier>,
    debouncer: Debouncer,
    state: Mutex<SettingsSnapshot>,
    focused: AtomicBool,
}

impl SettingsSynchronizer {
    pub fn new(host: Arc<dyn HostGateway>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            host,
            notifier,
            debouncer: Debouncer::new(),
            state: Mutex::new(SettingsSnapshot::default()),
            focused: AtomicBool::new(false),
        }
    }

    pub fn snapshot(&self) -> SettingsSnapshot {
        self.lock().clone()
    }

    pub fn is_resize_pending(&self) -> bool {
        self.debouncer.is_pending()
    }

    /// Load every setting independently, then have the host re-apply its
    /// window state. A setting the host cannot supply keeps its current
    /// value.
    pub async fn load_all(&self) -> SettingsSnapshot {
        let current = self.snapshot();
        let (constraints, always_on_top, audio_enabled, audio_url, window, reply) = tokio::join!(
            self.load_or(commands::GET_WINDOW_CONSTRAINTS, current.constraints),
            self.load_or(commands::GET_ALWAYS_ON_TOP, current.always_on_top),
            self.load_or(commands::GET_AUDIO_NOTIFICATION_ENABLED, current.audio.enabled),
            self.load_or(commands::GET_AUDIO_URL, current.audio.url.clone()),
            self.load_or(commands::GET_WINDOW_SETTINGS, current.window),
            self.load_or(commands::GET_REPLY_CONFIG, current.reply.clone()),
        );

        let snapshot = SettingsSnapshot {
            constraints,
            always_on_top,
            audio: AudioSettings {
                enabled: audio_enabled,
                url: audio_url,
            },
            window,
            reply,
        };
        tracing::debug!(
            always_on_top = snapshot.always_on_top,
            fixed = snapshot.window.fixed,
            width = snapshot.window.width,
            height = snapshot.window.height,
            "settings loaded"
        );
        *self.lock() = snapshot.clone();

        if let Err(err) =
            invoke_unit(self.host.as_ref(), commands::SYNC_WINDOW_STATE, Value::Null).await
        {
            tracing::warn!(error = %err, "host did not re-apply window state");
        }
        snapshot
    }

    async fn load_or<T: DeserializeOwned>(&self, command: &'static str, fallback: T) -> T {
        match invoke(self.host.as_ref(), command, Value::Null).await {
            Ok(value) => value,
            Err(err @ HostError::Decode { .. }) => {
                tracing::debug!(command, error = %err, "setting not provided; keeping current");
                fallback
            }
            Err(err) => {
                tracing::warn!(command, error = %err, "failed to load setting; keeping current");
                fallback
            }
        }
    }

    /// Clamp and persist a free-mode window size. Returns `None` when
    /// nothing was written: fixed mode, or a window that is minimized or
    /// too small to measure.
    pub async fn persist_window_size(
        &self,
        width: u32,
        height: u32,
    ) -> SettingsResult<Option<SizeValidation>> {
        let (fixed, constraints) = {
            let state = self.lock();
            (state.window.fixed, state.constraints)
        };
        if fixed {
            tracing::debug!("window is in fixed mode; size not persisted");
            return Ok(None);
        }

        let validation = constraints.clamp(WindowSize::new(width, height));
        if validation.adjusted {
            tracing::info!(
                requested = ?validation.requested,
                adjusted = ?validation.size,
                "window size clamped into constraints"
            );
        }

        let size = validation.size;
        let args = json!({ "width": size.width, "height": size.height, "fixed": false });
        match invoke_unit(self.host.as_ref(), commands::SET_WINDOW_SETTINGS, args).await {
            Ok(()) => {}
            Err(err) if err.is_transient_window_condition() => {
                tracing::debug!(error = %err, "skipping window size persist");
                return Ok(None);
            }
            Err(source) => {
                return Err(SettingsError::Host {
                    action: "persist window size",
                    source,
                })
            }
        }

        {
            let mut state = self.lock();
            state.window.width = size.width;
            state.window.height = size.height;
        }
        tracing::debug!(width = size.width, height = size.height, "window size persisted");
        Ok(Some(validation))
    }

    /// Restart the quiet period. When it elapses the current size is read
    /// back from the host and persisted.
    pub fn on_resized(self: &Arc<Self>) {
        let quiet = Duration::from_millis(self.lock().constraints.resize_throttle_ms);
        let settings = Arc::downgrade(self);
        self.debouncer.schedule(quiet, async move {
            if let Some(settings) = settings.upgrade() {
                settings.persist_current_size().await;
            }
        });
    }

    async fn persist_current_size(&self) -> Option<SizeValidation> {
        if self.lock().window.fixed {
            return None;
        }

        let size: WindowSize = match invoke(
            self.host.as_ref(),
            commands::GET_CURRENT_WINDOW_SIZE,
            Value::Null,
        )
        .await
        {
            Ok(size) => size,
            Err(err) if err.is_transient_window_condition() => {
                tracing::debug!(error = %err, "skipping window size persist");
                return None;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to read current window size");
                return None;
            }
        };

        match self.persist_window_size(size.width, size.height).await {
            Ok(validation) => validation,
            Err(err) => {
                tracing::warn!(error = %err, "window size not saved");
                None
            }
        }
    }

    /// Reload on the unfocused -> focused edge only. Returns whether a
    /// reload ran.
    pub async fn on_focus_changed(&self, focused: bool) -> bool {
        let was_focused = self.focused.swap(focused, Ordering::SeqCst);
        if !focused || was_focused {
            return false;
        }

        let reloaded = invoke_unit(self.host.as_ref(), commands::RELOAD_CONFIG, Value::Null).await;
        if let Err(err) = reloaded {
            tracing::warn!(error = %err, "host config reload failed; reloading what it has");
        }
        self.load_all().await;
        true
    }

    pub async fn attach(
        self: &Arc<Self>,
        channel: &dyn EventChannel,
    ) -> HostResult<SettingsListeners> {
        let settings = Arc::downgrade(self);
        let focus = channel
            .listen(
                events::WINDOW_FOCUS_CHANGED,
                Arc::new(move |payload: Value| {
                    let Some(focused) = focus_from_payload(&payload) else {
                        tracing::warn!(%payload, "unexpected focus event payload");
                        return;
                    };
                    let Some(settings) = settings.upgrade() else {
                        return;
                    };
                    tokio::spawn(async move {
                        settings.on_focus_changed(focused).await;
                    });
                }),
            )
            .await?;

        let settings = Arc::downgrade(self);
        let resize = channel
            .listen(
                events::WINDOW_RESIZED,
                Arc::new(move |_payload: Value| {
                    if let Some(settings) = settings.upgrade() {
                        settings.on_resized();
                    }
                }),
            )
            .await?;

        tracing::debug!("settings listeners attached");
        Ok(SettingsListeners {
            settings: Arc::downgrade(self),
            _subscriptions: vec![focus, resize],
        })
    }

    pub async fn toggle_always_on_top(&self) -> SettingsResult<bool> {
        let enabled = !self.lock().always_on_top;
        self.run_action(
            "update always-on-top",
            commands::SET_ALWAYS_ON_TOP,
            json!({ "enabled": enabled }),
        )
        .await?;
        self.lock().always_on_top = enabled;
        Ok(enabled)
    }

    pub async fn toggle_audio_notification(&self) -> SettingsResult<bool> {
        let enabled = !self.lock().audio.enabled;
        self.run_action(
            "update audio notification",
            commands::SET_AUDIO_NOTIFICATION_ENABLED,
            json!({ "enabled": enabled }),
        )
        .await?;
        self.lock().audio.enabled = enabled;
        Ok(enabled)
    }

    pub async fn set_audio_url(&self, url: impl Into<String>) -> SettingsResult<()> {
        let url = url.into();
        self.run_action("update sound url", commands::SET_AUDIO_URL, json!({ "url": url }))
            .await?;
        self.lock().audio.url = url;
        Ok(())
    }

    pub async fn test_audio_sound(&self) -> SettingsResult<()> {
        self.run_action("play test sound", commands::TEST_AUDIO_SOUND, Value::Null)
            .await?;
        self.notifier.notify(ToastLevel::Success, "Test sound played");
        Ok(())
    }

    pub async fn stop_audio_sound(&self) -> SettingsResult<()> {
        self.run_action("stop sound", commands::STOP_AUDIO_SOUND, Value::Null)
            .await
    }

    pub async fn update_window_size(&self, settings: WindowSettings) -> SettingsResult<()> {
        let args = json!({
            "width": settings.width,
            "height": settings.height,
            "fixed": settings.fixed,
        });
        self.run_action("update window size", commands::UPDATE_WINDOW_SIZE, args)
            .await?;

        self.lock().window = settings;
        if settings.fixed && self.debouncer.cancel() {
            tracing::debug!("pending resize persist dropped for fixed mode");
        }

        let mode = if settings.fixed { "fixed" } else { "free-resize" };
        self.notifier.notify(
            ToastLevel::Success,
            &format!("Window set to {mode} {}x{}", settings.width, settings.height),
        );
        Ok(())
    }

    pub async fn update_reply_config(
        &self,
        patch: ReplyConfigPatch,
    ) -> SettingsResult<ReplyConfig> {
        self.run_action(
            "update reply settings",
            commands::SET_REPLY_CONFIG,
            json!({ "config": patch }),
        )
        .await?;

        let reply = {
            let mut state = self.lock();
            state.reply.apply(&patch);
            state.reply.clone()
        };
        self.notifier.notify(ToastLevel::Success, "Reply settings updated");
        Ok(reply)
    }

    /// Re-read always-on-top and ask the host to re-apply its window state.
    /// Used when a launch request opens the popup.
    pub async fn sync_window_state_from_backend(&self) -> SettingsResult<bool> {
        let always_on_top: bool =
            invoke(self.host.as_ref(), commands::GET_ALWAYS_ON_TOP, Value::Null)
                .await
                .map_err(|source| SettingsError::Host {
                    action: "read always-on-top",
                    source,
                })?;
        self.lock().always_on_top = always_on_top;

        invoke_unit(self.host.as_ref(), commands::SYNC_WINDOW_STATE, Value::Null)
            .await
            .map_err(|source| SettingsError::Host {
                action: "sync window state",
                source,
            })?;
        tracing::debug!(always_on_top, "window state synced from host");
        Ok(always_on_top)
    }

    async fn run_action(
        &self,
        action: &'static str,
        command: &str,
        args: Value,
    ) -> SettingsResult<()> {
        invoke_unit(self.host.as_ref(), command, args)
            .await
            .map_err(|source| {
                tracing::warn!(action, error = %source, "settings action failed");
                let err = SettingsError::Host { action, source };
                self.notifier.notify(ToastLevel::Error, &err.to_string());
                err
            })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SettingsSnapshot> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn focus_from_payload(payload: &Value) -> Option<bool> {
    match payload {
        Value::Bool(focused) => Some(*focused),
        Value::Object(fields) => fields.get("focused").and_then(Value::as_bool),
        _ => None,
    }
}

/// Focus and resize listeners. Dropping this unsubscribes both and drops
/// any resize persist still waiting out its quiet period.
pub struct SettingsListeners {
    settings: Weak<SettingsSynchronizer>,
    _subscriptions: Vec<Subscription>,
}

impl Drop for SettingsListeners {
    fn drop(&mut self) {
        if let Some(settings) = self.settings.upgrade() {
            settings.debouncer.cancel();
        }
    }
}
