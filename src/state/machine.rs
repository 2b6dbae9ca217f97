use super::error::{StateError, StateResult};
use super::{PhaseTransition, PopupEvent, PopupPhase};

#[derive(Debug)]
pub struct StateMachine {
    phase: PopupPhase,
    transition_history: Vec<PhaseTransition>,
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            phase: PopupPhase::default(),
            transition_history: Vec::new(),
        }
    }

    pub fn phase(&self) -> PopupPhase {
        self.phase
    }

    pub fn can_transition(&self, event: PopupEvent) -> bool {
        self.next_phase(event).is_some()
    }

    pub fn next_phase(&self, event: PopupEvent) -> Option<PopupPhase> {
        use PopupEvent::*;
        use PopupPhase::*;
        match (self.phase, event) {
            (_, Hide) => Some(Idle),
            (Idle | Loading | Showing, Show) => Some(Loading),
            (Loading, Settle) => Some(Showing),
            (Showing, Submit) => Some(Submitting),
            (Loading | Showing, Cancel) => Some(Submitting),
            (Submitting, SendFailed) => Some(Showing),
            (Submitting, Complete) => Some(Idle),
            _ => None,
        }
    }

    pub fn transition(&mut self, event: PopupEvent) -> StateResult<PopupPhase> {
        tracing::debug!(from = ?self.phase, event = ?event, "request popup transition");
        let next = self.next_phase(event).ok_or_else(|| {
            let from = self.phase;
            tracing::warn!(from = ?from, event = ?event, "invalid popup transition requested");
            StateError::InvalidStateTransition { from, event }
        })?;

        let record = PhaseTransition::new(self.phase, event, next);
        self.phase = next;
        self.transition_history.push(record);

        Ok(self.phase)
    }

    pub fn history(&self) -> &[PhaseTransition] {
        &self.transition_history
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PopupPhase::{:?}", self.phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_transition_tracks_valid_and_invalid_events() {
        let mut machine = StateMachine::new();
        assert!(machine.can_transition(PopupEvent::Show));
        assert!(!machine.can_transition(PopupEvent::Submit));
        assert!(!machine.can_transition(PopupEvent::Cancel));

        let _ = machine
            .transition(PopupEvent::Show)
            .expect("idle -> loading should transition");

        assert!(machine.can_transition(PopupEvent::Settle));
        assert!(machine.can_transition(PopupEvent::Cancel));
        assert!(!machine.can_transition(PopupEvent::Submit));
    }

    #[test]
    fn submit_round_trip_records_ordered_history() {
        let mut machine = StateMachine::new();
        machine.transition(PopupEvent::Show).expect("show should work");
        machine
            .transition(PopupEvent::Settle)
            .expect("settle should work");
        machine
            .transition(PopupEvent::Submit)
            .expect("submit should work");
        machine
            .transition(PopupEvent::Complete)
            .expect("complete should work");

        assert_eq!(machine.phase(), PopupPhase::Idle);
        assert_eq!(
            machine.history(),
            &[
                PhaseTransition::new(PopupPhase::Idle, PopupEvent::Show, PopupPhase::Loading),
                PhaseTransition::new(PopupPhase::Loading, PopupEvent::Settle, PopupPhase::Showing),
                PhaseTransition::new(
                    PopupPhase::Showing,
                    PopupEvent::Submit,
                    PopupPhase::Submitting
                ),
                PhaseTransition::new(
                    PopupPhase::Submitting,
                    PopupEvent::Complete,
                    PopupPhase::Idle
                ),
            ]
        );
    }

    #[test]
    fn failed_send_returns_to_showing() {
        let mut machine = StateMachine::new();
        machine.transition(PopupEvent::Show).unwrap();
        machine.transition(PopupEvent::Cancel).unwrap();
        assert_eq!(
            machine.transition(PopupEvent::SendFailed).unwrap(),
            PopupPhase::Showing
        );
        assert!(machine.can_transition(PopupEvent::Submit));
    }

    #[test]
    fn submitting_rejects_second_submit_and_cancel() {
        let mut machine = StateMachine::new();
        machine.transition(PopupEvent::Show).unwrap();
        machine.transition(PopupEvent::Settle).unwrap();
        machine.transition(PopupEvent::Submit).unwrap();

        assert!(!machine.can_transition(PopupEvent::Submit));
        assert!(!machine.can_transition(PopupEvent::Cancel));
        assert!(!machine.can_transition(PopupEvent::Show));
        assert!(machine.can_transition(PopupEvent::Hide));
    }

    #[test]
    fn invalid_transition_returns_error_without_mutating_history() {
        let mut machine = StateMachine::new();

        let err = machine
            .transition(PopupEvent::Settle)
            .expect_err("idle -> settle should fail");
        assert!(matches!(
            err,
            StateError::InvalidStateTransition {
                from: PopupPhase::Idle,
                event: PopupEvent::Settle
            }
        ));
        assert_eq!(machine.phase(), PopupPhase::Idle);
        assert!(machine.history().is_empty());
    }
}
