use super::event::PopupEvent;
use super::model::PopupPhase;
use crate::host::HostError;
use thiserror::Error;

pub type StateResult<T> = std::result::Result<T, StateError>;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("invalid state transition: from {from:?} using event {event:?}")]
    InvalidStateTransition { from: PopupPhase, event: PopupEvent },
}

pub type PopupResult<T> = std::result::Result<T, PopupError>;

#[derive(Debug, Error)]
pub enum PopupError {
    #[error("failed to deliver response to host")]
    Send(#[source] HostError),
    #[error("response delivered but host did not exit")]
    Exit(#[source] HostError),
}
