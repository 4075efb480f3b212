use adw::Application;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::session::{Session, UserProfile};

pub const ENV_API_URL: &str = "CALLOPS_API_URL";
pub const ENV_TOKEN: &str = "CALLOPS_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub dashboard_poll_secs: u64,
    pub batch_poll_secs: u64,
    pub upload_max_bytes: u64,
    pub ws_base_delay_ms: u64,
    pub ws_max_attempts: u32,
    pub locale: String,
    pub currency: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            request_timeout_secs: 15,
            max_retries: 3,
            dashboard_poll_secs: 30,
            batch_poll_secs: 5,
            upload_max_bytes: 10 * 1024 * 1024,
            ws_base_delay_ms: 1000,
            ws_max_attempts: 5,
            locale: "es-CL".into(),
            currency: "CLP".into(),
        }
    }
}

/// Everything the console keeps between runs. The token and user live under
/// fixed keys so other tools can find them.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppState {
    pub base_url: String,
    pub auth_token: Option<String>,
    pub user_data: Option<UserProfile>,
    pub settings: Settings,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    fn toml_path() -> Option<PathBuf> {
        let proj = directories::ProjectDirs::from("com", "callops", "callops-console")?;
        Some(proj.config_dir().join("console.toml"))
    }

    /// Loads the saved state, then applies environment overrides.
    pub fn load() -> Self {
        let mut state = Self::toml_path()
            .map(|p| Self::load_from(&p))
            .unwrap_or_default();
        state.apply_env(|key| std::env::var(key).ok());
        state
    }

    /// A missing or unreadable file yields the defaults.
    pub fn load_from(path: &Path) -> Self {
        let Ok(text) = fs::read_to_string(path) else {
            return Self::new();
        };
        match toml::from_str::<AppState>(&text) {
            Ok(state) => state,
            Err(e) => {
                log::warn!("ignoring unreadable config {}: {}", path.display(), e);
                Self::new()
            }
        }
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.base_url = crate::utils::normalize_url(&url);
        }
        if let Some(token) = lookup(ENV_TOKEN).filter(|v| !v.trim().is_empty()) {
            self.auth_token = Some(token);
        }
    }

    pub fn save(&self) -> std::io::Result<()> {
        match Self::toml_path() {
            Some(path) => self.save_to(&path),
            None => Err(std::io::Error::new(std::io::ErrorKind::NotFound, "No config dir")),
        }
    }

    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let toml = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
        fs::write(path, toml)
    }

    /// Token and profile together. A token alone, for instance one from
    /// `CALLOPS_TOKEN`, is not a session and still leads to the sign-in window.
    pub fn session(&self) -> Option<Session> {
        let token = self.auth_token.clone().filter(|t| !t.is_empty())?;
        let user = self.user_data.clone()?;
        Some(Session { token, user })
    }

    pub fn is_signed_in(&self) -> bool {
        !self.base_url.is_empty() && self.session().is_some()
    }
}

pub fn build_ui(app: &Application) {
    let state = AppState::load();
    if state.is_signed_in() {
        crate::ui::main_window::show_main_window(app);
    } else {
        crate::ui::login::show_login_window(app);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("console.toml");
        let mut state = AppState::new();
        state.base_url = "https://api.example.com".into();
        state.auth_token = Some("tok".into());
        state.user_data = Some(UserProfile {
            id: "u1".into(),
            email: "ops@example.com".into(),
            name: "Ops".into(),
            role: "admin".into(),
        });
        state.settings.batch_poll_secs = 7;
        state.save_to(&path).unwrap();

        let loaded = AppState::load_from(&path);
        assert_eq!(loaded.base_url, "https://api.example.com");
        assert_eq!(loaded.auth_token.as_deref(), Some("tok"));
        assert_eq!(loaded.settings.batch_poll_secs, 7);
        assert_eq!(loaded.settings.dashboard_poll_secs, 30);
        assert!(loaded.is_signed_in());
    }

    #[test]
    fn corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("console.toml");
        fs::write(&path, "base_url = [[[").unwrap();
        let loaded = AppState::load_from(&path);
        assert!(loaded.base_url.is_empty());
        assert_eq!(loaded.settings.upload_max_bytes, 10 * 1024 * 1024);
        assert!(!loaded.is_signed_in());
    }

    #[test]
    fn env_overrides_url_and_token() {
        let mut state = AppState::new();
        state.apply_env(|key| match key {
            ENV_API_URL => Some("api.local:8000".into()),
            ENV_TOKEN => Some("env-token".into()),
            _ => None,
        });
        assert_eq!(state.base_url, "https://api.local:8000");
        assert_eq!(state.auth_token.as_deref(), Some("env-token"));
        // No stored profile, so the token alone does not open the console.
        assert!(state.session().is_none());
        assert!(!state.is_signed_in());
    }
}
