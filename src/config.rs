use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use url::Url;

use crate::utils::normalize_url;

pub const DEFAULT_MAX_GROUP_SIZE: usize = 50;
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 1000;

/// Key/value pairs read from a `.env` style file.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentLoader {
    environment: HashMap<String, String>,
}

impl EnvironmentLoader {
    /// Missing or unreadable files yield an empty environment and a warning.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(content) => Self::parse(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("{} file not found", path.display());
                Self::default()
            }
            Err(e) => {
                log::warn!("Error loading {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn parse(content: &str) -> Self {
        let mut environment = HashMap::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                environment.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
        Self { environment }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.environment.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.environment.len()
    }

    pub fn is_empty(&self) -> bool {
        self.environment.is_empty()
    }

    fn parsed_or<T: FromStr>(&self, key: &str, default: T) -> T {
        match self.get(key) {
            None => default,
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                log::warn!("Ignoring invalid value for {key}: {raw:?}");
                default
            }),
        }
    }
}

/// Backend endpoint and public key.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendConfig {
    pub url: Url,
    pub anon_key: String,
}

impl BackendConfig {
    /// The URL path is kept as a prefix for every endpoint.
    pub fn new(url: &str, anon_key: &str) -> crate::Result<Self> {
        let mut url = Url::parse(&normalize_url(url)).map_err(|e| crate::Error::Config(e.to_string()))?;
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(Self { url, anon_key: anon_key.to_string() })
    }

    /// Returns `None` (backend disabled) when the values are missing,
    /// still template placeholders, or malformed.
    pub fn from_env(env: &EnvironmentLoader) -> Option<Self> {
        let url = usable(env, "SUPABASE_URL")?;
        let key = usable(env, "SUPABASE_ANON_KEY")?;
        match Self::new(url, key) {
            Ok(cfg) => Some(cfg),
            Err(e) => {
                log::warn!("SUPABASE_URL is malformed, backend disabled: {e}");
                None
            }
        }
    }
}

fn usable<'a>(env: &'a EnvironmentLoader, key: &str) -> Option<&'a str> {
    match env.get(key) {
        Some(v) if !v.is_empty() && !v.ends_with("_HERE") => Some(v),
        Some(_) => {
            log::warn!("{key} is still a placeholder, backend disabled");
            None
        }
        None => {
            log::warn!("{key} not set, backend disabled");
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppSettings {
    pub max_group_size: usize,
    pub max_message_length: usize,
    pub cache_enabled: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            max_group_size: DEFAULT_MAX_GROUP_SIZE,
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
            cache_enabled: true,
        }
    }
}

impl AppSettings {
    pub fn from_env(env: &EnvironmentLoader) -> Self {
        let defaults = Self::default();
        Self {
            max_group_size: env.parsed_or("MAX_GROUP_SIZE", defaults.max_group_size),
            max_message_length: env.parsed_or("MAX_MESSAGE_LENGTH", defaults.max_message_length),
            cache_enabled: env.parsed_or("CACHE_ENABLED", defaults.cache_enabled),
        }
    }
}
