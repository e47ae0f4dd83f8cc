//! Authentication session mirror.
//!
//! Mirrors the backend's auth state into an observable [`AuthState`] that
//! screens (or the CLI) watch. It never retries; failures are recorded in
//! the state and returned to the caller as-is.

use std::sync::Arc;

use tokio::sync::watch;

use crate::api::models::{AuthTokens, User};
use crate::api::Backend;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthState {
    pub current_user: Option<User>,
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub error: Option<String>,
}

pub struct Session<B: Backend> {
    backend: Arc<B>,
    state: watch::Sender<AuthState>,
}

impl<B: Backend> Session<B> {
    pub fn new(backend: Arc<B>) -> Self {
        let (state, _) = watch::channel(AuthState::default());
        Self { backend, state }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> AuthState {
        self.state.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated
    }

    pub fn current_user(&self) -> Option<User> {
        self.state.borrow().current_user.clone()
    }

    pub fn require_user(&self) -> Result<User> {
        self.current_user().ok_or(Error::UserNotFound)
    }

    pub fn tokens(&self) -> Option<AuthTokens> {
        self.backend.tokens()
    }

    pub fn restore_tokens(&self, tokens: Option<AuthTokens>) {
        self.backend.restore_tokens(tokens);
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> Result<User> {
        self.begin();
        let result = self.backend.sign_up(email, password).await;
        self.finish_auth(result)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<User> {
        self.begin();
        let result = self.backend.sign_in(email, password).await;
        self.finish_auth(result)
    }

    /// Local state is cleared even when the backend call fails.
    pub async fn sign_out(&self) -> Result<()> {
        self.begin();
        let result = self.backend.sign_out().await;
        let error = result.as_ref().err().map(ToString::to_string);
        self.state.send_modify(|s| {
            s.current_user = None;
            s.is_authenticated = false;
            s.is_loading = false;
            s.error = error;
        });
        result
    }

    pub async fn reset_password(&self, email: &str) -> Result<()> {
        self.begin();
        let result = self.backend.reset_password(email).await;
        let error = result.as_ref().err().map(ToString::to_string);
        self.state.send_modify(|s| {
            s.is_loading = false;
            s.error = error;
        });
        result
    }

    /// Re-validates the stored session. Any failure signs the mirror out;
    /// tokens the backend rejected are dropped, while a network failure keeps
    /// them for the next attempt.
    pub async fn check_session(&self) -> Result<User> {
        match self.backend.session_user().await {
            Ok(user) => {
                self.state.send_modify(|s| {
                    s.current_user = Some(user.clone());
                    s.is_authenticated = true;
                });
                Ok(user)
            }
            Err(e) => {
                log::debug!("session check failed: {e}");
                if !matches!(e, Error::Network(_)) {
                    self.backend.restore_tokens(None);
                }
                self.state.send_modify(|s| {
                    s.current_user = None;
                    s.is_authenticated = false;
                });
                Err(e)
            }
        }
    }

    /// Replaces the mirrored user, e.g. after a profile edit.
    pub fn set_current_user(&self, user: User) {
        self.state.send_modify(|s| {
            if s.is_authenticated {
                s.current_user = Some(user);
            }
        });
    }

    fn begin(&self) {
        self.state.send_modify(|s| {
            s.is_loading = true;
            s.error = None;
        });
    }

    fn finish_auth(&self, result: Result<User>) -> Result<User> {
        match &result {
            Ok(user) => {
                let user = user.clone();
                self.state.send_modify(|s| {
                    s.current_user = Some(user);
                    s.is_authenticated = true;
                    s.is_loading = false;
                });
            }
            Err(e) => {
                let message = e.to_string();
                self.state.send_modify(|s| {
                    s.is_loading = false;
                    s.error = Some(message);
                });
            }
        }
        result
    }
}
