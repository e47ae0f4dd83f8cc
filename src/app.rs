use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::api::models::AuthTokens;
use crate::api::Backend;
use crate::config::AppSettings;
use crate::session::Session;
use crate::storage::Cache;

/// What survives a restart: which backend we talked to and the session tokens.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AppState {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_path() -> Option<PathBuf> {
        let base = BaseDirs::new()?;
        Some(base.config_dir().join("roundup.toml"))
    }

    pub fn load() -> Self {
        Self::default_path().map(|p| Self::load_from(&p)).unwrap_or_default()
    }

    /// Unreadable or malformed files fall back to an empty state.
    pub fn load_from(path: &Path) -> Self {
        let Ok(text) = fs::read_to_string(path) else {
            return Self::new();
        };
        match toml::from_str::<AppState>(&text) {
            Ok(state) => state,
            Err(e) => {
                log::warn!("ignoring malformed {}: {}", path.display(), e);
                Self::new()
            }
        }
    }

    pub fn save(&self) -> std::io::Result<()> {
        match Self::default_path() {
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

    pub fn tokens(&self) -> Option<AuthTokens> {
        self.access_token.as_ref().map(|access| AuthTokens {
            access_token: access.clone(),
            refresh_token: self.refresh_token.clone(),
        })
    }

    pub fn set_tokens(&mut self, tokens: Option<AuthTokens>) {
        match tokens {
            Some(t) => {
                self.access_token = Some(t.access_token);
                self.refresh_token = t.refresh_token;
            }
            None => {
                self.access_token = None;
                self.refresh_token = None;
            }
        }
    }
}

/// The client as a whole: the session mirror plus settings and the optional
/// local group cache. Group, message, profile and recommendation operations
/// live in their own modules as `impl` blocks on this type.
pub struct RoundUp<B: Backend> {
    pub(crate) session: Session<B>,
    pub(crate) settings: AppSettings,
    pub(crate) cache: Option<Mutex<Cache>>,
}

impl<B: Backend> RoundUp<B> {
    pub fn new(backend: Arc<B>, settings: AppSettings) -> Self {
        Self { session: Session::new(backend), settings, cache: None }
    }

    pub fn with_cache(mut self, cache: Cache) -> Self {
        self.cache = Some(Mutex::new(cache));
        self
    }

    pub fn session(&self) -> &Session<B> {
        &self.session
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub(crate) fn backend(&self) -> &B {
        self.session.backend()
    }
}
