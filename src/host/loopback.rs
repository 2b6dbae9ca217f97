//! Scripted in-process host.
//!
//! Replies are configured per command; anything unscripted answers `null`.
//! Every call is recorded so callers can assert on what reached the host.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Notify;

use super::{HostError, HostGateway, HostResult};

#[derive(Debug, Clone, PartialEq)]
pub struct HostCall {
    pub command: String,
    pub args: Value,
}

#[derive(Debug, Clone)]
enum Reply {
    Value(Value),
    Error(String),
}

#[derive(Default)]
struct Script {
    replies: HashMap<String, Reply>,
    gates: HashMap<String, Arc<Notify>>,
    calls: Vec<HostCall>,
}

#[derive(Default)]
pub struct ScriptedHost {
    script: Mutex<Script>,
}

impl ScriptedHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, command: &str, value: Value) {
        self.lock()
            .replies
            .insert(command.to_string(), Reply::Value(value));
    }

    pub fn fail(&self, command: &str, message: impl Into<String>) {
        self.lock()
            .replies
            .insert(command.to_string(), Reply::Error(message.into()));
    }

    /// Hold every call to `command` until the returned handle is notified.
    pub fn gate(&self, command: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.lock().gates.insert(command.to_string(), gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.lock().calls.clone()
    }

    pub fn calls_to(&self, command: &str) -> Vec<HostCall> {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.command == command)
            .cloned()
            .collect()
    }

    pub fn count(&self, command: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.command == command)
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl HostGateway for ScriptedHost {
    async fn call(&self, command: &str, args: Value) -> HostResult<Value> {
        let gate = {
            let mut script = self.lock();
            script.calls.push(HostCall {
                command: command.to_string(),
                args,
            });
            script.gates.get(command).cloned()
        };

        if let Some(gate) = gate {
            gate.notified().await;
        }

        match self.lock().replies.get(command).cloned() {
            Some(Reply::Value(value)) => Ok(value),
            Some(Reply::Error(message)) => Err(HostError::rejected(command, message)),
            None => Ok(Value::Null),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn scripted_replies_and_call_log() {
        let host = ScriptedHost::new();
        host.respond("get_always_on_top", json!(false));
        host.fail("set_always_on_top", "denied");

        assert_eq!(
            host.call("get_always_on_top", Value::Null).await,
            Ok(json!(false))
        );
        assert_eq!(
            host.call("set_always_on_top", json!({ "enabled": true })).await,
            Err(HostError::rejected("set_always_on_top", "denied"))
        );
        assert_eq!(host.call("unknown", Value::Null).await, Ok(Value::Null));

        assert_eq!(host.calls().len(), 3);
        assert_eq!(
            host.calls_to("set_always_on_top")[0].args,
            json!({ "enabled": true })
        );
    }

    #[tokio::test]
    async fn gated_call_waits_for_release() {
        let host = Arc::new(ScriptedHost::new());
        let gate = host.gate("download_and_install_update");

        let task_host = host.clone();
        let task = tokio::spawn(async move {
            task_host
                .call("download_and_install_update", Value::Null)
                .await
        });
        tokio::task::yield_now().await;
        assert!(!task.is_finished());
        assert_eq!(host.count("download_and_install_update"), 1);

        gate.notify_one();
        let result = task.await.expect("task should join");
        assert_eq!(result, Ok(Value::Null));
    }
}
