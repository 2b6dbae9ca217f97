use super::model::PopupPhase;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopupEvent {
    Show,
    Settle,
    Submit,
    Cancel,
    SendFailed,
    Complete,
    Hide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTransition {
    pub from: PopupPhase,
    pub event: PopupEvent,
    pub to: PopupPhase,
}

impl PhaseTransition {
    pub const fn new(from: PopupPhase, event: PopupEvent, to: PopupPhase) -> Self {
        Self { from, event, to }
    }
}
