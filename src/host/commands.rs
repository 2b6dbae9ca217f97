//! Wire names of host commands and events.

pub const SEND_RESPONSE: &str = "send_response";
pub const EXIT_PROCESS: &str = "exit_process";
pub const GET_CLI_LAUNCH_ARGS: &str = "get_cli_launch_args";
pub const READ_REQUEST_FILE: &str = "read_request_file";
pub const GET_DELIVERY_PREFERENCE: &str = "get_delivery_preference";
pub const PLAY_NOTIFICATION_SOUND: &str = "play_notification_sound";
pub const START_EXTERNAL_RELAY: &str = "start_external_relay";

pub const GET_WINDOW_CONSTRAINTS: &str = "get_window_constraints";
pub const GET_WINDOW_SETTINGS: &str = "get_window_settings";
pub const SET_WINDOW_SETTINGS: &str = "set_window_settings";
pub const UPDATE_WINDOW_SIZE: &str = "update_window_size";
pub const GET_CURRENT_WINDOW_SIZE: &str = "get_current_window_size";
pub const SYNC_WINDOW_STATE: &str = "sync_window_state";
pub const GET_ALWAYS_ON_TOP: &str = "get_always_on_top";
pub const SET_ALWAYS_ON_TOP: &str = "set_always_on_top";
pub const GET_AUDIO_NOTIFICATION_ENABLED: &str = "get_audio_notification_enabled";
pub const SET_AUDIO_NOTIFICATION_ENABLED: &str = "set_audio_notification_enabled";
pub const GET_AUDIO_URL: &str = "get_audio_url";
pub const SET_AUDIO_URL: &str = "set_audio_url";
pub const TEST_AUDIO_SOUND: &str = "test_audio_sound";
pub const STOP_AUDIO_SOUND: &str = "stop_audio_sound";
pub const GET_REPLY_CONFIG: &str = "get_reply_config";
pub const SET_REPLY_CONFIG: &str = "set_reply_config";
pub const RELOAD_CONFIG: &str = "reload_config";

pub const GET_APP_INFO: &str = "get_app_info";
pub const CHECK_FOR_UPDATES: &str = "check_for_updates";
pub const DOWNLOAD_AND_INSTALL_UPDATE: &str = "download_and_install_update";
pub const RESTART_PROCESS: &str = "restart_process";
pub const OPEN_EXTERNAL_URL: &str = "open_external_url";

pub mod events {
    pub const REQUEST_ARRIVED: &str = "request-arrived";
    pub const UPDATE_DOWNLOAD_PROGRESS: &str = "update_download_progress";
    pub const UPDATE_INSTALL_STARTED: &str = "update_install_started";
    pub const UPDATE_INSTALL_FINISHED: &str = "update_install_finished";
    pub const WINDOW_FOCUS_CHANGED: &str = "window-focus-changed";
    pub const WINDOW_RESIZED: &str = "window-resized";

    /// Emitted by this process to the presentation side.
    pub const POPUP_STATE_CHANGED: &str = "popup-state-changed";
}
