//! Newline-delimited JSON transport to the host process.
//!
//! Calls are written as `{"type":"call","id":N,"command":..,"args":..}`.
//! The host answers with `{"type":"reply","id":N,"ok":..,"value"|"error":..}`
//! and pushes `{"type":"event","event":..,"payload":..}` at any time.
//! Events are fanned out through the shared [`EventBus`].
//!
//! The presentation side drives the popup with
//! `{"type":"action","id":N,"action":..,"payload":..}`. Actions are queued
//! for whoever took [`StdioHost::take_actions`]; results go back as
//! `{"type":"action_result","id":N,"ok":..,"value"|"error":..}`. Events this
//! process emits use the same `event` shape as inbound ones.
//!
//! Stdout is reserved for the protocol; diagnostics go to stderr.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot, watch};

use super::{EventBus, HostError, HostGateway, HostResult};

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Outbound<'a> {
    Call {
        id: u64,
        command: &'a str,
        args: &'a Value,
    },
    Event {
        event: &'a str,
        payload: &'a Value,
    },
    ActionResult {
        id: u64,
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        value: Option<&'a Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<&'a str>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Inbound {
    Reply {
        id: u64,
        ok: bool,
        #[serde(default)]
        value: Value,
        #[serde(default)]
        error: Option<String>,
    },
    Event {
        event: String,
        #[serde(default)]
        payload: Value,
    },
    Action {
        #[serde(default)]
        id: Option<u64>,
        action: String,
        #[serde(default)]
        payload: Value,
    },
}

/// A user action forwarded from the presentation side. Without an `id` the
/// sender does not expect a result.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    pub id: Option<u64>,
    pub action: String,
    pub payload: Value,
}

type PendingReply = oneshot::Sender<Result<Value, String>>;
type PendingMap = HashMap<u64, PendingReply>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

pub struct StdioHost {
    writer: tokio::sync::Mutex<BoxedWriter>,
    pending: Arc<Mutex<PendingMap>>,
    next_id: AtomicU64,
    closed: watch::Receiver<bool>,
    actions: Mutex<Option<mpsc::UnboundedReceiver<ActionRequest>>>,
}

impl StdioHost {
    /// Connect over the process's own stdin/stdout.
    pub fn stdio(events: Arc<EventBus>) -> Arc<Self> {
        Self::connect(tokio::io::stdin(), tokio::io::stdout(), events)
    }

    pub fn connect<R, W>(reader: R, writer: W, events: Arc<EventBus>) -> Arc<Self>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let pending = Arc::new(Mutex::new(PendingMap::new()));
        let (closed_tx, closed_rx) = watch::channel(false);
        let (actions_tx, actions_rx) = mpsc::unbounded_channel();

        tokio::spawn(read_loop(
            BufReader::new(reader),
            pending.clone(),
            events,
            actions_tx,
            closed_tx,
        ));

        Arc::new(Self {
            writer: tokio::sync::Mutex::new(Box::new(writer)),
            pending,
            next_id: AtomicU64::new(1),
            closed: closed_rx,
            actions: Mutex::new(Some(actions_rx)),
        })
    }

    /// Hand out the queue of inbound actions. Only the first caller gets it.
    pub fn take_actions(&self) -> Option<mpsc::UnboundedReceiver<ActionRequest>> {
        self.actions
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
    }

    /// Push an event to the presentation side.
    pub async fn emit(&self, event: &str, payload: &Value) -> HostResult<()> {
        self.send(&Outbound::Event { event, payload }).await
    }

    pub async fn reply_action(&self, id: u64, result: Result<Value, String>) -> HostResult<()> {
        let message = match &result {
            Ok(value) => Outbound::ActionResult {
                id,
                ok: true,
                value: Some(value),
                error: None,
            },
            Err(error) => Outbound::ActionResult {
                id,
                ok: false,
                value: None,
                error: Some(error.as_str()),
            },
        };
        self.send(&message).await
    }

    async fn send(&self, message: &Outbound<'_>) -> HostResult<()> {
        if self.is_closed() {
            return Err(HostError::Unreachable("host connection closed".to_string()));
        }
        let line = serde_json::to_string(message)
            .map_err(|err| HostError::Unreachable(format!("failed to encode message: {err}")))?;
        self.write_line(&line)
            .await
            .map_err(|err| HostError::Unreachable(format!("failed to write message: {err}")))
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once the host side of the connection has gone away.
    pub async fn closed(&self) {
        let mut closed = self.closed.clone();
        let _ = closed.wait_for(|closed| *closed).await;
    }

    async fn write_line(&self, line: &str) -> std::io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await
    }
}

#[async_trait]
impl HostGateway for StdioHost {
    async fn call(&self, command: &str, args: Value) -> HostResult<Value> {
        if self.is_closed() {
            return Err(HostError::Unreachable("host connection closed".to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let line = serde_json::to_string(&Outbound::Call {
            id,
            command,
            args: &args,
        })
        .map_err(|err| HostError::Decode {
            command: command.to_string(),
            message: err.to_string(),
        })?;

        let (reply_tx, reply_rx) = oneshot::channel();
        lock_pending(&self.pending).insert(id, reply_tx);
        // The reader clears pending calls after flagging closed; re-check so
        // a call registered after that sweep cannot wait forever.
        if self.is_closed() {
            lock_pending(&self.pending).remove(&id);
            return Err(HostError::Unreachable("host connection closed".to_string()));
        }

        tracing::trace!(id, command, "sending host call");
        if let Err(err) = self.write_line(&line).await {
            lock_pending(&self.pending).remove(&id);
            return Err(HostError::Unreachable(format!(
                "failed to write `{command}` call: {err}"
            )));
        }

        match reply_rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(HostError::rejected(command, message)),
            Err(_) => Err(HostError::Unreachable(format!(
                "host closed before replying to `{command}`"
            ))),
        }
    }
}

async fn read_loop<R>(
    mut reader: R,
    pending: Arc<Mutex<PendingMap>>,
    events: Arc<EventBus>,
    actions: mpsc::UnboundedSender<ActionRequest>,
    closed: watch::Sender<bool>,
) where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => {
                tracing::info!("host closed the connection");
                break;
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(error = %err, "failed to read from host; closing connection");
                break;
            }
        }

        let trimmed = line.trim_ascii();
        if trimmed.is_empty() {
            continue;
        }

        match serde_json::from_slice::<Inbound>(trimmed) {
            Ok(Inbound::Reply {
                id,
                ok,
                value,
                error,
            }) => {
                let Some(reply_tx) = lock_pending(&pending).remove(&id) else {
                    tracing::warn!(id, "reply for unknown host call");
                    continue;
                };
                let result = if ok {
                    Ok(value)
                } else {
                    Err(error.unwrap_or_else(|| "host reported an error".to_string()))
                };
                let _ = reply_tx.send(result);
            }
            Ok(Inbound::Event { event, payload }) => {
                let delivered = events.emit(&event, payload);
                tracing::debug!(event = %event, delivered, "host event received");
            }
            Ok(Inbound::Action {
                id,
                action,
                payload,
            }) => {
                tracing::debug!(?id, %action, "action received");
                if actions.send(ActionRequest { id, action, payload }).is_err() {
                    tracing::warn!("no action handler attached; dropping action");
                }
            }
            Err(err) => {
                let raw_line = String::from_utf8_lossy(trimmed);
                tracing::warn!(error = %err, %raw_line, "failed to parse host message");
            }
        }
    }

    let _ = closed.send(true);
    lock_pending(&pending).clear();
}

fn lock_pending(pending: &Mutex<PendingMap>) -> std::sync::MutexGuard<'_, PendingMap> {
    pending
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    const FOCUS_EVENT: &[u8] =
        b"{\"type\":\"event\",\"event\":\"window-focus-changed\",\"payload\":{\"focused\":true}}\n";

    async fn wait_until(mut done: impl FnMut() -> bool) {
        for _ in 0..50 {
            if done() {
                return;
            }
            tokio::task::yield_now().await;
        }
    }

    fn connected() -> (Arc<StdioHost>, Arc<EventBus>, tokio::io::DuplexStream) {
        let (client_io, host_io) = tokio::io::duplex(4096);
        let (reader, writer) = tokio::io::split(client_io);
        let events = Arc::new(EventBus::new());
        let host = StdioHost::connect(reader, writer, events.clone());
        (host, events, host_io)
    }

    #[tokio::test]
    async fn call_round_trips_through_reply_line() {
        let (host, _events, host_io) = connected();
        let (host_read, mut host_write) = tokio::io::split(host_io);
        let mut host_lines = BufReader::new(host_read).lines();

        let caller = host.clone();
        let call = tokio::spawn(async move {
            caller
                .call("get_always_on_top", json!({ "attempt": 1 }))
                .await
        });

        let line = host_lines
            .next_line()
            .await
            .expect("read should work")
            .expect("call line should arrive");
        let sent: Value = serde_json::from_str(&line).expect("call should be json");
        assert_eq!(sent["type"], "call");
        assert_eq!(sent["command"], "get_always_on_top");
        assert_eq!(sent["args"], json!({ "attempt": 1 }));

        let reply = json!({ "type": "reply", "id": sent["id"], "ok": true, "value": false });
        host_write
            .write_all(format!("{reply}\n").as_bytes())
            .await
            .expect("reply should be written");

        let result = call.await.expect("task should join");
        assert_eq!(result, Ok(json!(false)));
    }

    #[tokio::test]
    async fn error_reply_becomes_rejected() {
        let (host, _events, host_io) = connected();
        let (host_read, mut host_write) = tokio::io::split(host_io);
        let mut host_lines = BufReader::new(host_read).lines();

        let caller = host.clone();
        let call = tokio::spawn(async move { caller.call("exit_process", Value::Null).await });

        let line = host_lines.next_line().await.unwrap().unwrap();
        let sent: Value = serde_json::from_str(&line).unwrap();
        let reply = json!({ "type": "reply", "id": sent["id"], "ok": false, "error": "busy" });
        host_write
            .write_all(format!("{reply}\n").as_bytes())
            .await
            .unwrap();

        assert_eq!(
            call.await.unwrap(),
            Err(HostError::rejected("exit_process", "busy"))
        );
    }

    #[tokio::test]
    async fn events_are_forwarded_and_garbage_is_skipped() {
        let (_host, events, mut host_io) = connected();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _subscription = events.subscribe(
            "window-focus-changed",
            Arc::new(move |payload| sink.lock().unwrap().push(payload)),
        );

        host_io.write_all(b"not json\n").await.unwrap();
        host_io.write_all(FOCUS_EVENT).await.unwrap();

        wait_until(|| !seen.lock().unwrap().is_empty()).await;
        assert_eq!(seen.lock().unwrap().as_slice(), &[json!({ "focused": true })]);
    }

    #[tokio::test]
    async fn non_utf8_line_is_skipped_without_closing() {
        let (host, events, mut host_io) = connected();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _subscription = events.subscribe(
            "window-focus-changed",
            Arc::new(move |payload| sink.lock().unwrap().push(payload)),
        );

        host_io.write_all(b"\xff\xfe garbage\n").await.unwrap();
        host_io.write_all(FOCUS_EVENT).await.unwrap();

        wait_until(|| !seen.lock().unwrap().is_empty()).await;
        assert_eq!(seen.lock().unwrap().as_slice(), &[json!({ "focused": true })]);
        assert!(!host.is_closed());
    }

    #[tokio::test]
    async fn actions_are_queued_for_the_taker() {
        let (host, _events, mut host_io) = connected();
        let mut actions = host.take_actions().expect("first take gets the queue");
        assert!(host.take_actions().is_none());

        let action = json!({
            "type": "action",
            "id": 4,
            "action": "set_audio_url",
            "payload": { "url": "file:///ding.wav" }
        });
        host_io
            .write_all(format!("{action}\n").as_bytes())
            .await
            .unwrap();
        host_io
            .write_all(b"{\"type\":\"action\",\"action\":\"cancel\"}\n")
            .await
            .unwrap();

        let first = actions.recv().await.expect("action should arrive");
        assert_eq!(
            first,
            ActionRequest {
                id: Some(4),
                action: "set_audio_url".to_string(),
                payload: json!({ "url": "file:///ding.wav" }),
            }
        );
        let second = actions.recv().await.expect("action should arrive");
        assert_eq!(second.id, None);
        assert_eq!(second.action, "cancel");
        assert_eq!(second.payload, Value::Null);
    }

    #[tokio::test]
    async fn events_and_action_results_are_written_as_lines() {
        let (host, _events, host_io) = connected();
        let (host_read, _host_write) = tokio::io::split(host_io);
        let mut host_lines = BufReader::new(host_read).lines();

        host.emit("popup-state-changed", &json!({ "phase": "showing" }))
            .await
            .expect("emit should work");
        host.reply_action(4, Ok(json!(true)))
            .await
            .expect("reply should work");
        host.reply_action(5, Err("popup closed".to_string()))
            .await
            .expect("reply should work");

        let mut lines = Vec::new();
        for _ in 0..3 {
            let line = host_lines.next_line().await.unwrap().unwrap();
            lines.push(serde_json::from_str::<Value>(&line).unwrap());
        }
        assert_eq!(
            lines,
            [
                json!({
                    "type": "event",
                    "event": "popup-state-changed",
                    "payload": { "phase": "showing" }
                }),
                json!({ "type": "action_result", "id": 4, "ok": true, "value": true }),
                json!({ "type": "action_result", "id": 5, "ok": false, "error": "popup closed" }),
            ]
        );
    }

    #[tokio::test]
    async fn host_eof_fails_pending_calls_and_closes() {
        let (host, _events, host_io) = connected();
        let caller = host.clone();
        let call = tokio::spawn(async move { caller.call("get_app_info", Value::Null).await });
        tokio::task::yield_now().await;

        drop(host_io);
        host.closed().await;

        assert!(matches!(
            call.await.unwrap(),
            Err(HostError::Unreachable(_))
        ));
        assert!(matches!(
            host.call("get_app_info", Value::Null).await,
            Err(HostError::Unreachable(_))
        ));
    }
}
