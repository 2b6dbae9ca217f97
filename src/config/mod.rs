use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigPathError {
    MissingHomeDirectory,
}

const APP_DIR: &str = "review-popup";
const APP_CONFIG_FILE: &str = "config.json";
const STATE_FILE: &str = "state.json";

/// Application-level settings from `config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub settle_delay_ms: u64,
    pub update_check_interval_minutes: u64,
    /// GitHub-style `releases/latest` endpoint. Without it the host's
    /// updater answers version checks.
    pub release_url: Option<String>,
    /// Opened when a version check carried no release link.
    pub download_page: Option<String>,
    pub state_file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 300,
            update_check_interval_minutes: 60,
            release_url: None,
            download_page: None,
            state_file: None,
        }
    }
}

impl AppConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn update_check_interval(&self) -> Duration {
        Duration::from_secs(self.update_check_interval_minutes.saturating_mul(60))
    }

    /// Explicit `state_file`, else `state.json` beside the config file.
    pub fn state_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.state_file {
            return Some(path.clone());
        }
        let (xdg_config_home, home) = config_env_dirs();
        app_config_path(APP_DIR, STATE_FILE, xdg_config_home.as_deref(), home.as_deref()).ok()
    }
}

pub fn load_app_config() -> AppConfig {
    let (xdg_config_home, home) = config_env_dirs();
    load_app_config_with(xdg_config_home.as_deref(), home.as_deref())
}

fn load_app_config_with(xdg_config_home: Option<&Path>, home: Option<&Path>) -> AppConfig {
    let path = match app_config_path(APP_DIR, APP_CONFIG_FILE, xdg_config_home, home) {
        Ok(p) => p,
        Err(_) => return AppConfig::default(),
    };
    if !path.exists() {
        return AppConfig::default();
    }
    match std::fs::read_to_string(&path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|err| {
            tracing::warn!(?err, ?path, "failed to parse config.json; using defaults");
            AppConfig::default()
        }),
        Err(err) => {
            tracing::warn!(?err, ?path, "failed to read config.json; using defaults");
            AppConfig::default()
        }
    }
}

pub fn config_env_dirs() -> (Option<PathBuf>, Option<PathBuf>) {
    (
        std::env::var_os("XDG_CONFIG_HOME").map(PathBuf::from),
        std::env::var_os("HOME").map(PathBuf::from),
    )
}

pub fn app_config_path(
    app_dir: &str,
    file_name: &str,
    xdg_config_home: Option<&Path>,
    home: Option<&Path>,
) -> Result<PathBuf, ConfigPathError> {
    let mut path = config_root(xdg_config_home, home)?;
    path.push(app_dir);
    path.push(file_name);
    Ok(path)
}

fn config_root(
    xdg_config_home: Option<&Path>,
    home: Option<&Path>,
) -> Result<PathBuf, ConfigPathError> {
    if let Some(xdg) = xdg_config_home.filter(|path| !path.as_os_str().is_empty()) {
        return Ok(xdg.to_path_buf());
    }

    let home = home.ok_or(ConfigPathError::MissingHomeDirectory)?;
    Ok(home.join(".config"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_config_path_prefers_xdg_config_home() {
        let path = app_config_path(
            APP_DIR,
            APP_CONFIG_FILE,
            Some(Path::new("/tmp/config-root")),
            Some(Path::new("/tmp/home")),
        )
        .expect("path should resolve");

        assert_eq!(
            path,
            PathBuf::from("/tmp/config-root/review-popup/config.json")
        );
    }

    #[test]
    fn app_config_path_falls_back_to_home_dot_config() {
        let path = app_config_path(
            APP_DIR,
            STATE_FILE,
            Some(Path::new("")),
            Some(Path::new("/tmp/home")),
        )
        .expect("path should resolve");

        assert_eq!(path, PathBuf::from("/tmp/home/.config/review-popup/state.json"));
    }

    #[test]
    fn app_config_path_errors_when_home_missing_and_xdg_unset() {
        let error = app_config_path(APP_DIR, APP_CONFIG_FILE, None, None).unwrap_err();
        assert_eq!(error, ConfigPathError::MissingHomeDirectory);
    }

    #[test]
    fn partial_config_file_keeps_defaults() {
        let root = tempfile::tempdir().expect("tempdir should exist");
        let dir = root.path().join(APP_DIR);
        std::fs::create_dir_all(&dir).expect("config dir should be created");
        std::fs::write(
            dir.join(APP_CONFIG_FILE),
            r#"{
                "release_url": "https://example.invalid/releases/latest",
                "download_page": "https://example.invalid/downloads"
            }"#,
        )
        .expect("config should be written");

        let config = load_app_config_with(Some(root.path()), None);

        assert_eq!(config.settle_delay(), Duration::from_millis(300));
        assert_eq!(config.update_check_interval(), Duration::from_secs(3600));
        assert_eq!(
            config.release_url.as_deref(),
            Some("https://example.invalid/releases/latest")
        );
        assert_eq!(
            config.download_page.as_deref(),
            Some("https://example.invalid/downloads")
        );
        assert_eq!(config.state_file, None);
    }

    #[test]
    fn invalid_config_file_falls_back_to_defaults() {
        let root = tempfile::tempdir().expect("tempdir should exist");
        let dir = root.path().join(APP_DIR);
        std::fs::create_dir_all(&dir).expect("config dir should be created");
        std::fs::write(dir.join(APP_CONFIG_FILE), "{ not json").expect("config should be written");

        assert_eq!(load_app_config_with(Some(root.path()), None), AppConfig::default());
    }

    #[test]
    fn explicit_state_file_wins() {
        let config = AppConfig {
            state_file: Some(PathBuf::from("/var/lib/review-popup/state.json")),
            ..AppConfig::default()
        };
        assert_eq!(
            config.state_path(),
            Some(PathBuf::from("/var/lib/review-popup/state.json"))
        );
    }
}
