//! Popup lifecycle driven against the host.
//!
//! `show` enters `Loading`, waits the settle delay so the previous view can
//! finish its exit transition, then enters `Showing`. `submit` and `cancel`
//! share one exit path: send the response, then ask the host to exit. Once a
//! response is delivered the controller is closed until `hide` resets it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use super::error::{PopupError, PopupResult};
use super::machine::StateMachine;
use super::model::{PopupPhase, PopupState, DEFAULT_THEME, THEME_CYCLE};
use super::{PhaseTransition, PopupEvent};
use crate::host::{commands, invoke_unit, HostError, HostGateway};
use crate::request::{ReviewRequest, ReviewResponse, CANCELLED_SENTINEL};

pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowOutcome {
    Shown,
    /// Same request id is already on screen.
    AlreadyShowing,
    /// A later `show` or `hide` replaced this request during the settle delay.
    Superseded,
    /// A response is in flight.
    Busy,
    /// A response was already delivered in this session.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SendOutcome {
    Sent,
    Ignored,
}

#[derive(Serialize)]
#[serde(untagged)]
enum ResponsePayload<'a> {
    Answer(&'a ReviewResponse),
    Cancelled(&'static str),
}

#[derive(Serialize)]
struct SendResponseArgs<'a> {
    response: ResponsePayload<'a>,
}

#[derive(Debug)]
struct PopupInner {
    machine: StateMachine,
    request: Option<ReviewRequest>,
    theme: String,
    generation: u64,
    closed: bool,
}

impl PopupInner {
    fn snapshot(&self) -> PopupState {
        PopupState {
            phase: self.machine.phase(),
            current_theme: self.theme.clone(),
            request: self.request.clone(),
        }
    }
}

pub struct PopupController {
    host: Arc<dyn HostGateway>,
    settle_delay: Duration,
    inner: Mutex<PopupInner>,
    state_tx: watch::Sender<PopupState>,
}

impl PopupController {
    pub fn new(host: Arc<dyn HostGateway>, settle_delay: Duration) -> Self {
        let (state_tx, _) = watch::channel(PopupState::default());
        Self {
            host,
            settle_delay,
            inner: Mutex::new(PopupInner {
                machine: StateMachine::new(),
                request: None,
                theme: DEFAULT_THEME.to_string(),
                generation: 0,
                closed: false,
            }),
            state_tx,
        }
    }

    pub fn state(&self) -> PopupState {
        self.lock().snapshot()
    }

    pub fn phase(&self) -> PopupPhase {
        self.lock().machine.phase()
    }

    pub fn subscribe(&self) -> watch::Receiver<PopupState> {
        self.state_tx.subscribe()
    }

    pub fn transitions(&self) -> Vec<PhaseTransition> {
        self.lock().machine.history().to_vec()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub async fn show(&self, request: ReviewRequest) -> ShowOutcome {
        let request_id = request.id.clone();
        let generation = {
            let mut inner = self.lock();
            if inner.closed {
                tracing::debug!(%request_id, "popup closed; ignoring show");
                return ShowOutcome::Closed;
            }
            let same_request = inner
                .request
                .as_ref()
                .is_some_and(|current| current.id == request.id);
            if same_request && inner.machine.phase().holds_request() {
                tracing::debug!(%request_id, "request already on screen");
                return ShowOutcome::AlreadyShowing;
            }
            if !inner.machine.can_transition(PopupEvent::Show) {
                let phase = inner.machine.phase();
                tracing::debug!(%request_id, ?phase, "popup busy; ignoring show");
                return ShowOutcome::Busy;
            }

            let _ = inner.machine.transition(PopupEvent::Show);
            inner.request = Some(request);
            inner.generation += 1;
            self.publish(&inner);
            inner.generation
        };

        tokio::time::sleep(self.settle_delay).await;

        let mut inner = self.lock();
        if inner.generation != generation || inner.machine.phase() != PopupPhase::Loading {
            tracing::debug!(%request_id, "show superseded during settle delay");
            return ShowOutcome::Superseded;
        }
        let _ = inner.machine.transition(PopupEvent::Settle);
        self.publish(&inner);
        tracing::info!(%request_id, "popup showing");
        ShowOutcome::Shown
    }

    pub async fn submit(&self, response: ReviewResponse) -> PopupResult<SendOutcome> {
        self.deliver(PopupEvent::Submit, ResponsePayload::Answer(&response))
            .await
    }

    pub async fn cancel(&self) -> PopupResult<SendOutcome> {
        self.deliver(
            PopupEvent::Cancel,
            ResponsePayload::Cancelled(CANCELLED_SENTINEL),
        )
        .await
    }

    /// Reset to `Idle` and reopen the controller for the next request.
    pub fn hide(&self) {
        let mut inner = self.lock();
        let _ = inner.machine.transition(PopupEvent::Hide);
        inner.request = None;
        inner.closed = false;
        inner.generation += 1;
        self.publish(&inner);
    }

    /// Ask the host to terminate this process. Exposed separately so a
    /// failed exit can be retried without re-sending the response.
    pub async fn request_exit(&self) -> PopupResult<()> {
        invoke_unit(self.host.as_ref(), commands::EXIT_PROCESS, Value::Null)
            .await
            .map_err(|err| {
                tracing::error!(error = %err, "host did not accept exit request");
                PopupError::Exit(err)
            })
    }

    pub fn set_theme(&self, theme: impl Into<String>) {
        let mut inner = self.lock();
        inner.theme = theme.into();
        self.publish(&inner);
    }

    pub fn toggle_theme(&self) -> String {
        let mut inner = self.lock();
        let next = THEME_CYCLE
            .iter()
            .position(|theme| *theme == inner.theme)
            .map_or(THEME_CYCLE[0], |index| {
                THEME_CYCLE[(index + 1) % THEME_CYCLE.len()]
            });
        inner.theme = next.to_string();
        self.publish(&inner);
        inner.theme.clone()
    }

    async fn deliver(
        &self,
        event: PopupEvent,
        payload: ResponsePayload<'_>,
    ) -> PopupResult<SendOutcome> {
        let args = serde_json::to_value(SendResponseArgs { response: payload }).map_err(|err| {
            PopupError::Send(HostError::Decode {
                command: commands::SEND_RESPONSE.to_string(),
                message: err.to_string(),
            })
        })?;

        let request_id = {
            let mut inner = self.lock();
            if inner.closed || !inner.machine.can_transition(event) {
                tracing::debug!(
                    phase = ?inner.machine.phase(),
                    closed = inner.closed,
                    event = ?event,
                    "ignoring popup action"
                );
                return Ok(SendOutcome::Ignored);
            }
            let _ = inner.machine.transition(event);
            self.publish(&inner);
            inner
                .request
                .as_ref()
                .map(|request| request.id.clone())
                .unwrap_or_default()
        };

        if let Err(err) = self.host.call(commands::SEND_RESPONSE, args).await {
            tracing::error!(error = %err, %request_id, event = ?event, "failed to send response");
            let mut inner = self.lock();
            if inner.machine.phase() == PopupPhase::Submitting {
                let _ = inner.machine.transition(PopupEvent::SendFailed);
                self.publish(&inner);
            }
            return Err(PopupError::Send(err));
        }

        {
            let mut inner = self.lock();
            inner.closed = true;
            if inner.machine.phase() == PopupPhase::Submitting {
                let _ = inner.machine.transition(PopupEvent::Complete);
            }
            inner.request = None;
            self.publish(&inner);
        }
        tracing::info!(%request_id, event = ?event, "response delivered; requesting exit");

        self.request_exit().await?;
        Ok(SendOutcome::Sent)
    }

    fn publish(&self, inner: &PopupInner) {
        self.state_tx.send_replace(inner.snapshot());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PopupInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
