use serde::Serialize;

use crate::request::ReviewRequest;

pub const DEFAULT_THEME: &str = "dark";
pub const THEME_CYCLE: [&str; 2] = ["light", "dark"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PopupPhase {
    #[default]
    Idle,
    Loading,
    Showing,
    Submitting,
}

impl PopupPhase {
    pub const fn holds_request(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

/// What the presentation layer renders from. `request` is present exactly
/// when `phase` is not `Idle`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PopupState {
    pub phase: PopupPhase,
    pub current_theme: String,
    pub request: Option<ReviewRequest>,
}

impl Default for PopupState {
    fn default() -> Self {
        Self {
            phase: PopupPhase::Idle,
            current_theme: DEFAULT_THEME.to_string(),
            request: None,
        }
    }
}

impl PopupState {
    pub fn is_visible(&self) -> bool {
        self.phase.holds_request()
    }

    pub fn is_loading(&self) -> bool {
        self.phase == PopupPhase::Loading
    }

    pub fn is_submitting(&self) -> bool {
        self.phase == PopupPhase::Submitting
    }
}
