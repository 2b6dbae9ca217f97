//! Calls into the host process and the events it emits.
//!
//! Every other module talks to the host through [`HostGateway`] and
//! [`EventChannel`], so the same components run against the stdio transport
//! in production and against [`loopback::ScriptedHost`] in tests.

pub mod commands;
pub mod events;
pub mod loopback;
pub mod stdio;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

pub use events::{EventBus, EventChannel, EventHandler, Subscription};

pub type HostResult<T> = std::result::Result<T, HostError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HostError {
    #[error("host rejected `{command}`: {message}")]
    Rejected { command: String, message: String },
    #[error("host unreachable: {0}")]
    Unreachable(String),
    #[error("unexpected payload for `{command}`: {message}")]
    Decode { command: String, message: String },
}

impl HostError {
    pub fn rejected(command: &str, message: impl Into<String>) -> Self {
        Self::Rejected {
            command: command.to_string(),
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Rejected { message, .. } | Self::Decode { message, .. } => message,
            Self::Unreachable(message) => message,
        }
    }

    /// Window minimized or too small to measure. Both clear up on their own.
    pub fn is_transient_window_condition(&self) -> bool {
        let Self::Rejected { message, .. } = self else {
            return false;
        };
        let message = message.to_ascii_lowercase();
        message.contains("minimized") || message.contains("too small")
    }
}

#[async_trait]
pub trait HostGateway: Send + Sync {
    async fn call(&self, command: &str, args: Value) -> HostResult<Value>;
}

/// Call `command` and decode the reply into `T`.
pub async fn invoke<T: DeserializeOwned>(
    host: &dyn HostGateway,
    command: &str,
    args: Value,
) -> HostResult<T> {
    let value = host.call(command, args).await?;
    serde_json::from_value(value).map_err(|err| HostError::Decode {
        command: command.to_string(),
        message: err.to_string(),
    })
}

/// Call `command` for its side effect, ignoring whatever the host returns.
pub async fn invoke_unit(host: &dyn HostGateway, command: &str, args: Value) -> HostResult<()> {
    host.call(command, args).await.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_window_condition_matches_minimized_and_too_small() {
        assert!(HostError::rejected("get_current_window_size", "Window is minimized")
            .is_transient_window_condition());
        assert!(HostError::rejected("get_current_window_size", "window too small to measure")
            .is_transient_window_condition());
        assert!(!HostError::rejected("get_current_window_size", "permission denied")
            .is_transient_window_condition());
        assert!(!HostError::Unreachable("minimized".to_string()).is_transient_window_condition());
    }

    #[tokio::test]
    async fn invoke_reports_decode_errors_with_command_name() {
        let host = loopback::ScriptedHost::new();
        host.respond(commands::GET_ALWAYS_ON_TOP, serde_json::json!("yes"));

        let err = invoke::<bool>(&host, commands::GET_ALWAYS_ON_TOP, Value::Null)
            .await
            .expect_err("string should not decode as bool");

        assert!(matches!(
            err,
            HostError::Decode { ref command, .. } if command == commands::GET_ALWAYS_ON_TOP
        ));
    }
}
