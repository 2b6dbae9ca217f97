use crate::host::HostError;
use crate::settings::SettingsError;
use crate::state::PopupError;
use crate::update::UpdateError;
use thiserror::Error;

pub type AppResult<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Popup(#[from] PopupError),
    #[error(transparent)]
    Host(#[from] HostError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Update(#[from] UpdateError),
    #[error("unknown or malformed action `{action}`: {source}")]
    InvalidAction {
        action: String,
        #[source]
        source: serde_json::Error,
    },
}
