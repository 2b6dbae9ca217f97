pub mod error;
pub mod event;
pub mod machine;
pub mod model;
pub mod popup;

pub use error::{PopupError, PopupResult, StateError, StateResult};
pub use event::{PhaseTransition, PopupEvent};
pub use machine::StateMachine;
pub use model::{PopupPhase, PopupState};
pub use popup::{PopupController, SendOutcome, ShowOutcome};
