//! User actions from the presentation side.
//!
//! The stdio link queues `action` messages; [`serve`] parses each into an
//! [`Action`], runs it against the [`App`] components on its own task and
//! answers with an `action_result` when the sender gave an id. Popup state
//! changes are mirrored back as `popup-state-changed` events.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use super::App;
use crate::error::{AppError, AppResult};
use crate::geometry::WindowSettings;
use crate::host::commands::events;
use crate::host::stdio::{ActionRequest, StdioHost};
use crate::request::{ImageAttachment, ReviewResponse};
use crate::settings::ReplyConfigPatch;
use crate::state::{PopupState, SendOutcome};

/// What the user entered. Metadata is stamped from the request on screen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Answer {
    pub user_input: Option<String>,
    pub selected_options: Vec<String>,
    pub images: Vec<ImageAttachment>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", content = "payload", rename_all = "snake_case")]
pub enum Action {
    Submit(Answer),
    Cancel,
    Hide,
    RequestExit,
    ToggleTheme,
    SetTheme { theme: String },
    ToggleAlwaysOnTop,
    ToggleAudioNotification,
    SetAudioUrl { url: String },
    TestAudioSound,
    StopAudioSound,
    UpdateWindowSize(WindowSettings),
    UpdateReplyConfig(ReplyConfigPatch),
    ReloadSettings,
    CheckForUpdates,
    DismissUpdate,
    HideUpdatePrompt,
    PerformUpdate,
    Restart,
    OpenReleasePage,
    VersionInfo,
}

impl Action {
    pub fn parse(name: &str, payload: Value) -> AppResult<Self> {
        let message = if payload.is_null() {
            json!({ "action": name })
        } else {
            json!({ "action": name, "payload": payload })
        };
        serde_json::from_value(message).map_err(|source| AppError::InvalidAction {
            action: name.to_string(),
            source,
        })
    }
}

impl App {
    /// Run one user action. The returned value is what the presentation
    /// side gets back in its `action_result`.
    pub async fn handle_action(&self, action: Action) -> AppResult<Value> {
        let value = match action {
            Action::Submit(answer) => {
                let Some(request) = self.popup.state().request else {
                    tracing::debug!("no request on screen; ignoring submit");
                    return Ok(json!(SendOutcome::Ignored));
                };
                let mut response = ReviewResponse::answer(&request)
                    .with_input(answer.user_input.unwrap_or_default())
                    .with_selected(answer.selected_options);
                for image in answer.images {
                    response = response.with_image(image);
                }
                json!(self.popup.submit(response).await?)
            }
            Action::Cancel => json!(self.popup.cancel().await?),
            Action::Hide => {
                self.popup.hide();
                Value::Null
            }
            Action::RequestExit => {
                self.popup.request_exit().await?;
                Value::Null
            }
            Action::ToggleTheme => json!(self.popup.toggle_theme()),
            Action::SetTheme { theme } => {
                self.popup.set_theme(theme);
                Value::Null
            }
            Action::ToggleAlwaysOnTop => json!(self.settings.toggle_always_on_top().await?),
            Action::ToggleAudioNotification => {
                json!(self.settings.toggle_audio_notification().await?)
            }
            Action::SetAudioUrl { url } => {
                self.settings.set_audio_url(url).await?;
                Value::Null
            }
            Action::TestAudioSound => {
                self.settings.test_audio_sound().await?;
                Value::Null
            }
            Action::StopAudioSound => {
                self.settings.stop_audio_sound().await?;
                Value::Null
            }
            Action::UpdateWindowSize(window) => {
                self.settings.update_window_size(window).await?;
                Value::Null
            }
            Action::UpdateReplyConfig(patch) => {
                json!(self.settings.update_reply_config(patch).await?)
            }
            Action::ReloadSettings => json!(self.settings.load_all().await),
            Action::CheckForUpdates => json!(self.updates.manual_check().await?),
            Action::DismissUpdate => {
                self.updates.dismiss()?;
                Value::Null
            }
            Action::HideUpdatePrompt => {
                self.updates.hide_prompt();
                Value::Null
            }
            Action::PerformUpdate => json!(self.updates.perform_update().await?),
            Action::Restart => {
                self.updates.restart().await?;
                Value::Null
            }
            Action::OpenReleasePage => json!(self.updates.open_release_page().await?),
            Action::VersionInfo => json!(self.updates.version_info().await),
        };
        Ok(value)
    }
}

/// Serve actions from `link` and mirror popup state to it until the link
/// closes.
pub async fn serve(app: Arc<App>, link: Arc<StdioHost>) {
    let mut states = app.popup().subscribe();
    let mut actions = link.take_actions();
    if actions.is_none() {
        tracing::warn!("action queue already taken; mirroring state only");
    }

    let initial = states.borrow_and_update().clone();
    publish_state(&link, &initial).await;

    loop {
        tokio::select! {
            () = link.closed() => break,
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow_and_update().clone();
                publish_state(&link, &state).await;
            }
            Some(request) = next_action(&mut actions) => {
                let app = app.clone();
                let link = link.clone();
                tokio::spawn(async move { run_action(&app, &link, request).await });
            }
        }
    }
    tracing::debug!("presentation link closed");
}

async fn next_action(
    actions: &mut Option<mpsc::UnboundedReceiver<ActionRequest>>,
) -> Option<ActionRequest> {
    match actions {
        Some(queue) => queue.recv().await,
        None => std::future::pending().await,
    }
}

async fn run_action(app: &App, link: &StdioHost, request: ActionRequest) {
    let ActionRequest {
        id,
        action,
        payload,
    } = request;

    let result = match Action::parse(&action, payload) {
        Ok(parsed) => app.handle_action(parsed).await,
        Err(err) => Err(err),
    };
    let result = result.map_err(|err| {
        tracing::warn!(%action, error = %err, "action failed");
        err.to_string()
    });

    let Some(id) = id else {
        return;
    };
    if let Err(err) = link.reply_action(id, result).await {
        tracing::warn!(%action, error = %err, "failed to answer action");
    }
}

async fn publish_state(link: &StdioHost, state: &PopupState) {
    let payload = match serde_json::to_value(state) {
        Ok(payload) => payload,
        Err(err) => {
            tracing::warn!(error = %err, "failed to encode popup state");
            return;
        }
    };
    if let Err(err) = link.emit(events::POPUP_STATE_CHANGED, &payload).await {
        tracing::debug!(error = %err, "popup state not mirrored");
    }
}
