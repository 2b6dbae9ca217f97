//! Turns the two ways a request can reach this process into one delivery
//! path: a request file named at launch (cold start) or `request-arrived`
//! events while running as a persistent session.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::host::commands::{self, events};
use crate::host::{invoke, invoke_unit, EventChannel, HostGateway, HostResult, Subscription};
use crate::request::{parse_request, ReviewRequest};
use crate::state::{PopupController, ShowOutcome};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LaunchArgs {
    #[serde(default, alias = "requestFilePath", alias = "request_file")]
    pub request_file_path: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryPreference {
    /// Relay requests to the external channel as well.
    pub external_enabled: bool,
    /// Answer only through the external channel; no popup.
    pub suppress_popup: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitialRequest {
    pub is_pending: bool,
    pub request: Option<ReviewRequest>,
}

impl InitialRequest {
    fn none() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub shown: Option<ShowOutcome>,
    pub preference: DeliveryPreference,
}

pub struct RequestDispatcher {
    host: Arc<dyn HostGateway>,
    events: Arc<dyn EventChannel>,
    popup: Arc<PopupController>,
}

impl RequestDispatcher {
    pub fn new(
        host: Arc<dyn HostGateway>,
        events: Arc<dyn EventChannel>,
        popup: Arc<PopupController>,
    ) -> Self {
        Self {
            host,
            events,
            popup,
        }
    }

    /// Cold-start path. Any failure reads as "nothing pending".
    pub async fn resolve_initial_request(&self) -> InitialRequest {
        let args: LaunchArgs =
            match invoke(self.host.as_ref(), commands::GET_CLI_LAUNCH_ARGS, Value::Null).await {
                Ok(args) => args,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to read launch arguments");
                    return InitialRequest::none();
                }
            };

        let Some(path) = args.request_file_path.filter(|path| !path.trim().is_empty()) else {
            tracing::debug!("no request file at launch; running as persistent session");
            return InitialRequest::none();
        };

        let payload = match self
            .host
            .call(commands::READ_REQUEST_FILE, json!({ "path": path }))
            .await
        {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(error = %err, %path, "failed to read request file");
                return InitialRequest::none();
            }
        };

        let request = match parse_request(payload) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!(error = %err, %path, "request file is malformed");
                return InitialRequest::none();
            }
        };

        tracing::info!(request_id = %request.id, "request received at launch");
        self.deliver(request.clone()).await;
        InitialRequest {
            is_pending: true,
            request: Some(request),
        }
    }

    /// Persistent-session path. Each event is delivered on its own task.
    pub async fn subscribe_to_requests(self: &Arc<Self>) -> HostResult<Subscription> {
        let dispatcher = Arc::downgrade(self);
        self.events
            .listen(
                events::REQUEST_ARRIVED,
                Arc::new(move |payload: Value| {
                    let request = match parse_request(payload) {
                        Ok(request) => request,
                        Err(err) => {
                            tracing::warn!(error = %err, "dropping malformed request event");
                            return;
                        }
                    };
                    let Some(dispatcher) = dispatcher.upgrade() else {
                        return;
                    };
                    tracing::info!(request_id = %request.id, "request arrived");
                    tokio::spawn(async move {
                        dispatcher.deliver(request).await;
                    });
                }),
            )
            .await
    }

    pub async fn deliver(&self, request: ReviewRequest) -> Delivery {
        let preference = self.delivery_preference().await;
        let show = async {
            if preference.suppress_popup {
                tracing::info!(request_id = %request.id, "popup suppressed by delivery preference");
                None
            } else {
                Some(self.popup.show(request.clone()).await)
            }
        };
        let (shown, ()) = tokio::join!(show, self.side_effects(&request, preference));

        Delivery { shown, preference }
    }

    async fn delivery_preference(&self) -> DeliveryPreference {
        match invoke(
            self.host.as_ref(),
            commands::GET_DELIVERY_PREFERENCE,
            Value::Null,
        )
        .await
        {
            Ok(preference) => preference,
            Err(err) => {
                tracing::warn!(error = %err, "failed to read delivery preference; showing popup");
                DeliveryPreference::default()
            }
        }
    }

    // Runs whether or not the popup is shown.
    async fn side_effects(&self, request: &ReviewRequest, preference: DeliveryPreference) {
        if let Err(err) = invoke_unit(
            self.host.as_ref(),
            commands::PLAY_NOTIFICATION_SOUND,
            Value::Null,
        )
        .await
        {
            tracing::warn!(error = %err, "failed to play notification sound");
        }

        if !preference.external_enabled || request.message.trim().is_empty() {
            return;
        }
        let args = json!({
            "message": request.message,
            "predefined_options": request.options(),
            "is_markdown": request.is_markdown,
        });
        match invoke_unit(self.host.as_ref(), commands::START_EXTERNAL_RELAY, args).await {
            Ok(()) => tracing::info!(request_id = %request.id, "external relay started"),
            Err(err) => tracing::warn!(error = %err, "failed to start external relay"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::loopback::ScriptedHost;
    use crate::host::EventBus;
    use crate::state::PopupPhase;
    use std::time::Duration;

    struct Fixture {
        host: Arc<ScriptedHost>,
        bus: Arc<EventBus>,
        popup: Arc<PopupController>,
        dispatcher: Arc<RequestDispatcher>,
    }

    fn fixture() -> Fixture {
        let host = Arc::new(ScriptedHost::new());
        let bus = Arc::new(EventBus::new());
        let popup = Arc::new(PopupController::new(
            host.clone(),
            Duration::from_millis(300),
        ));
        let dispatcher = Arc::new(RequestDispatcher::new(
            host.clone(),
            bus.clone(),
            popup.clone(),
        ));
        Fixture {
            host,
            bus,
            popup,
            dispatcher,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn launch_file_is_read_parsed_and_shown() {
        let f = fixture();
        f.host.respond(
            commands::GET_CLI_LAUNCH_ARGS,
            json!({ "request_file_path": "/tmp/req.json" }),
        );
        f.host.respond(
            commands::READ_REQUEST_FILE,
            json!({ "id": "r1", "message": "Pick one", "predefined_options": ["A", "B"] }),
        );

        let initial = f.dispatcher.resolve_initial_request().await;

        assert!(initial.is_pending);
        assert_eq!(initial.request.as_ref().map(|r| r.id.as_str()), Some("r1"));
        assert_eq!(
            f.host.calls_to(commands::READ_REQUEST_FILE)[0].args,
            json!({ "path": "/tmp/req.json" })
        );
        assert_eq!(f.popup.phase(), PopupPhase::Showing);
        assert_eq!(f.host.count(commands::PLAY_NOTIFICATION_SOUND), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_launch_argument_means_persistent_session() {
        let f = fixture();
        f.host.respond(commands::GET_CLI_LAUNCH_ARGS, json!({}));

        let initial = f.dispatcher.resolve_initial_request().await;

        assert_eq!(initial, InitialRequest::default());
        assert_eq!(f.host.count(commands::READ_REQUEST_FILE), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_launch_payload_reports_nothing_pending() {
        let f = fixture();
        f.host.respond(
            commands::GET_CLI_LAUNCH_ARGS,
            json!({ "requestFilePath": "/tmp/req.json" }),
        );
        f.host.respond(commands::READ_REQUEST_FILE, json!({ "unexpected": true }));

        let initial = f.dispatcher.resolve_initial_request().await;

        assert!(!initial.is_pending);
        assert_eq!(f.popup.phase(), PopupPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_launch_file_reports_nothing_pending() {
        let f = fixture();
        f.host.respond(
            commands::GET_CLI_LAUNCH_ARGS,
            json!({ "request_file_path": "/missing" }),
        );
        f.host.fail(commands::READ_REQUEST_FILE, "no such file");

        assert!(!f.dispatcher.resolve_initial_request().await.is_pending);
    }

    #[tokio::test(start_paused = true)]
    async fn suppressed_popup_still_plays_sound_and_relays() {
        let f = fixture();
        f.host.respond(
            commands::GET_DELIVERY_PREFERENCE,
            json!({ "external_enabled": true, "suppress_popup": true }),
        );

        let delivery = f
            .dispatcher
            .deliver(ReviewRequest::new("r1", "Pick one").with_options(["A"]))
            .await;

        assert_eq!(delivery.shown, None);
        assert_eq!(f.popup.phase(), PopupPhase::Idle);
        assert_eq!(f.host.count(commands::PLAY_NOTIFICATION_SOUND), 1);
        let relays = f.host.calls_to(commands::START_EXTERNAL_RELAY);
        assert_eq!(relays.len(), 1);
        assert_eq!(relays[0].args["predefined_options"], json!(["A"]));
    }

    #[tokio::test(start_paused = true)]
    async fn side_effect_failures_do_not_block_popup() {
        let f = fixture();
        f.host.fail(commands::GET_DELIVERY_PREFERENCE, "config missing");
        f.host.fail(commands::PLAY_NOTIFICATION_SOUND, "no audio device");

        let delivery = f.dispatcher.deliver(ReviewRequest::new("r1", "hi")).await;

        assert_eq!(delivery.shown, Some(ShowOutcome::Shown));
        assert_eq!(f.host.count(commands::START_EXTERNAL_RELAY), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn request_events_are_delivered_until_unsubscribed() {
        let f = fixture();
        let subscription = f
            .dispatcher
            .subscribe_to_requests()
            .await
            .expect("subscribe should work");

        f.bus.emit(events::REQUEST_ARRIVED, json!({ "garbage": 1 }));
        f.bus.emit(
            events::REQUEST_ARRIVED,
            json!({ "id": "r1", "message": "Pick one" }),
        );
        tokio::time::sleep(Duration::from_millis(301)).await;

        assert_eq!(f.popup.phase(), PopupPhase::Showing);
        assert_eq!(f.host.count(commands::PLAY_NOTIFICATION_SOUND), 1);

        drop(subscription);
        assert_eq!(f.bus.listener_count(events::REQUEST_ARRIVED), 0);
    }
}
