//! Signed-in user state.
//!
//! The console never checks credentials itself. A [`SessionVerifier`] turns
//! credentials into a [`Session`]; the one shipped here accepts anything and
//! mints a local token, so the backend stays the only place auth is enforced.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::app::AppState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user: UserProfile,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Enter a username")]
    MissingUsername,
    #[error("Enter the API server address")]
    MissingServer,
    #[error("Not signed in")]
    NotSignedIn,
    #[error("Sign-in rejected: {0}")]
    Rejected(String),
    #[error("Could not save session: {0}")]
    Persist(#[from] std::io::Error),
}

#[async_trait]
pub trait SessionVerifier: Send + Sync {
    async fn validate(&self, credentials: &Credentials) -> Result<Session, SessionError>;
    async fn refresh(&self, session: &Session) -> Result<Session, SessionError>;
    async fn revoke(&self, session: &Session) -> Result<(), SessionError>;
}

/// Accepts any username and fabricates a profile for it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalStubVerifier;

impl LocalStubVerifier {
    fn mint_token() -> String {
        format!("local-{}", uuid::Uuid::new_v4())
    }
}

#[async_trait]
impl SessionVerifier for LocalStubVerifier {
    async fn validate(&self, credentials: &Credentials) -> Result<Session, SessionError> {
        let username = credentials.username.trim();
        if username.is_empty() {
            return Err(SessionError::MissingUsername);
        }
        let (name, email) = match username.split_once('@') {
            Some((local, _)) => (local.to_string(), username.to_string()),
            None => (username.to_string(), format!("{username}@local")),
        };
        Ok(Session {
            token: Self::mint_token(),
            user: UserProfile {
                id: uuid::Uuid::new_v4().to_string(),
                email,
                name,
                role: "admin".into(),
            },
        })
    }

    async fn refresh(&self, session: &Session) -> Result<Session, SessionError> {
        Ok(Session {
            token: Self::mint_token(),
            user: session.user.clone(),
        })
    }

    async fn revoke(&self, _session: &Session) -> Result<(), SessionError> {
        Ok(())
    }
}

/// Keeps the current session in the console config under `auth_token` and
/// `user_data`.
pub struct SessionService<V> {
    verifier: V,
    config_path: Option<PathBuf>,
}

impl SessionService<LocalStubVerifier> {
    pub fn local() -> Self {
        Self::new(LocalStubVerifier)
    }
}

impl<V: SessionVerifier> SessionService<V> {
    pub fn new(verifier: V) -> Self {
        Self {
            verifier,
            config_path: None,
        }
    }

    /// Reads and writes `path` instead of the per-user config file.
    pub fn with_config_path(verifier: V, path: impl Into<PathBuf>) -> Self {
        Self {
            verifier,
            config_path: Some(path.into()),
        }
    }

    fn load_state(&self) -> AppState {
        match &self.config_path {
            Some(path) => AppState::load_from(path),
            None => AppState::load(),
        }
    }

    fn save_state(&self, state: &AppState) -> Result<(), SessionError> {
        match &self.config_path {
            Some(path) => state.save_to(path)?,
            None => state.save()?,
        }
        Ok(())
    }

    /// The stored session, if both the token and the profile are present.
    pub fn current(&self) -> Option<Session> {
        self.load_state().session()
    }

    pub fn require(&self) -> Result<Session, SessionError> {
        self.current().ok_or(SessionError::NotSignedIn)
    }

    pub async fn login(&self, server_url: &str, credentials: &Credentials) -> Result<Session, SessionError> {
        let base_url = crate::utils::normalize_url(server_url);
        if base_url.is_empty() {
            return Err(SessionError::MissingServer);
        }
        let session = self.verifier.validate(credentials).await?;
        let mut state = self.load_state();
        state.base_url = base_url;
        state.auth_token = Some(session.token.clone());
        state.user_data = Some(session.user.clone());
        self.save_state(&state)?;
        log::info!("signed in as {}", session.user.email);
        Ok(session)
    }

    pub async fn refresh(&self) -> Result<Session, SessionError> {
        let current = self.require()?;
        let renewed = self.verifier.refresh(&current).await?;
        let mut state = self.load_state();
        state.auth_token = Some(renewed.token.clone());
        state.user_data = Some(renewed.user.clone());
        self.save_state(&state)?;
        Ok(renewed)
    }

    /// Clears the stored session even when revocation fails; the server URL
    /// is kept for the next sign-in.
    pub async fn logout(&self) -> Result<(), SessionError> {
        let mut state = self.load_state();
        if let Some(session) = state.session() {
            if let Err(e) = self.verifier.revoke(&session).await {
                log::warn!("session revoke failed: {e}");
            }
        }
        state.auth_token = None;
        state.user_data = None;
        self.save_state(&state)?;
        log::info!("signed out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn creds(user: &str) -> Credentials {
        Credentials {
            username: user.into(),
            password: "whatever".into(),
        }
    }

    #[tokio::test]
    async fn stub_accepts_any_password() {
        let session = LocalStubVerifier.validate(&creds("ana@acme.cl")).await.unwrap();
        assert!(session.token.starts_with("local-"));
        assert_eq!(session.user.name, "ana");
        assert_eq!(session.user.email, "ana@acme.cl");

        let plain = LocalStubVerifier.validate(&creds("ops")).await.unwrap();
        assert_eq!(plain.user.email, "ops@local");
        assert!(matches!(
            LocalStubVerifier.validate(&creds("  ")).await,
            Err(SessionError::MissingUsername)
        ));
    }

    #[tokio::test]
    async fn login_persists_and_logout_clears() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("console.toml");
        let service = SessionService::with_config_path(LocalStubVerifier, &path);
        assert!(service.current().is_none());

        let session = service.login("api.example.com/", &creds("ops")).await.unwrap();
        let stored = AppState::load_from(&path);
        assert_eq!(stored.base_url, "https://api.example.com");
        assert_eq!(stored.auth_token.as_deref(), Some(session.token.as_str()));
        assert_eq!(service.current(), Some(session.clone()));

        let renewed = service.refresh().await.unwrap();
        assert_ne!(renewed.token, session.token);
        assert_eq!(renewed.user, session.user);

        service.logout().await.unwrap();
        let stored = AppState::load_from(&path);
        assert!(stored.auth_token.is_none());
        assert!(stored.user_data.is_none());
        assert_eq!(stored.base_url, "https://api.example.com");
        assert!(matches!(service.require(), Err(SessionError::NotSignedIn)));
    }

    #[tokio::test]
    async fn login_needs_a_server() {
        let dir = tempfile::tempdir().unwrap();
        let service = SessionService::with_config_path(LocalStubVerifier, dir.path().join("c.toml"));
        assert!(matches!(
            service.login(" ", &creds("ops")).await,
            Err(SessionError::MissingServer)
        ));
    }

    struct FailingRevoke(Arc<AtomicUsize>);

    #[async_trait]
    impl SessionVerifier for FailingRevoke {
        async fn validate(&self, c: &Credentials) -> Result<Session, SessionError> {
            LocalStubVerifier.validate(c).await
        }
        async fn refresh(&self, s: &Session) -> Result<Session, SessionError> {
            Ok(s.clone())
        }
        async fn revoke(&self, _s: &Session) -> Result<(), SessionError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(SessionError::Rejected("server down".into()))
        }
    }

    #[tokio::test]
    async fn logout_clears_even_if_revoke_fails() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let service = SessionService::with_config_path(FailingRevoke(calls.clone()), dir.path().join("c.toml"));
        service.login("localhost:8000", &creds("ops")).await.unwrap();
        service.logout().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(service.current().is_none());
    }
}
