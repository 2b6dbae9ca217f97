use serde::{Deserialize, Serialize};

use crate::geometry::{WindowConstraints, WindowSettings};

pub const DEFAULT_CONTINUE_PROMPT: &str = "Please continue following best practices";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSettings {
    pub enabled: bool,
    pub url: String,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            url: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplyConfig {
    pub enable_continue_reply: bool,
    pub continue_prompt: String,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            enable_continue_reply: true,
            continue_prompt: DEFAULT_CONTINUE_PROMPT.to_string(),
        }
    }
}

impl ReplyConfig {
    pub fn apply(&mut self, patch: &ReplyConfigPatch) {
        if let Some(enabled) = patch.enable_continue_reply {
            self.enable_continue_reply = enabled;
        }
        if let Some(prompt) = &patch.continue_prompt {
            self.continue_prompt.clone_from(prompt);
        }
    }
}

/// Partial reply update; absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyConfigPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_continue_reply: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continue_prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SettingsSnapshot {
    pub constraints: WindowConstraints,
    pub always_on_top: bool,
    pub audio: AudioSettings,
    pub window: WindowSettings,
    pub reply: ReplyConfig,
}

impl Default for SettingsSnapshot {
    fn default() -> Self {
        Self {
            constraints: WindowConstraints::default(),
            always_on_top: true,
            audio: AudioSettings::default(),
            window: WindowSettings::default(),
            reply: ReplyConfig::default(),
        }
    }
}
