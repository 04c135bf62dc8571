//! Runtime configuration, resolved once at startup and shared by reference.
//!
//! Each credential comes from the environment first and falls back to a
//! local, untracked dotenv-style secrets file. A missing credential is not an
//! error: the backend that needs it simply reports itself unavailable.

use crate::dispatch::RetryPolicy;
use crate::error::ConfigError;
use std::{collections::HashMap, fmt, path::Path, time::Duration};

pub const CREATOMATE_KEY_VAR: &str = "CREATOMATE_API_KEY";
pub const GEMINI_KEY_VAR: &str = "GEMINI_API_KEY";
pub const SECRETS_FILE_VAR: &str = "AD_RENDERER_SECRETS_FILE";
pub const DEFAULT_SECRETS_FILE: &str = ".secrets.local";

pub const DEFAULT_CREATOMATE_URL: &str = "https://api.creatomate.com";
pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash-exp";
pub const DEFAULT_PORT: u16 = 6108;

/// Key/value pairs read from the secrets file without touching the process env.
#[derive(Debug, Clone, Default)]
pub struct Secrets(HashMap<String, String>);

impl Secrets {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let to_err = |source| ConfigError::SecretsFile { path: path.to_path_buf(), source };
        let mut values = HashMap::new();
        for item in dotenvy::from_path_iter(path).map_err(to_err)? {
            let (key, value) = item.map_err(to_err)?;
            values.insert(key, value);
        }
        Ok(Self(values))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

impl FromIterator<(String, String)> for Secrets {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Clone)]
pub struct Config {
    pub creatomate_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
    pub creatomate_base_url: String,
    pub gemini_base_url: String,
    pub gemini_model: String,
    pub poll: RetryPolicy,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            creatomate_api_key: None,
            gemini_api_key: None,
            creatomate_base_url: DEFAULT_CREATOMATE_URL.into(),
            gemini_base_url: DEFAULT_GEMINI_URL.into(),
            gemini_model: DEFAULT_GEMINI_MODEL.into(),
            poll: RetryPolicy::default(),
            port: DEFAULT_PORT,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |k: &Option<String>| if k.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Config")
            .field("creatomate_api_key", &mask(&self.creatomate_api_key))
            .field("gemini_api_key", &mask(&self.gemini_api_key))
            .field("creatomate_base_url", &self.creatomate_base_url)
            .field("gemini_base_url", &self.gemini_base_url)
            .field("gemini_model", &self.gemini_model)
            .field("poll", &self.poll)
            .field("port", &self.port)
            .finish()
    }
}

impl Config {
    /// Reads the process environment and the secrets file.
    pub fn load() -> Result<Self, ConfigError> {
        let secrets_path = std::env::var(SECRETS_FILE_VAR).unwrap_or_else(|_| DEFAULT_SECRETS_FILE.into());
        let secrets = Secrets::from_file(Path::new(&secrets_path))?;
        Self::resolve(|key| std::env::var(key).ok(), &secrets)
    }

    pub fn resolve(env: impl Fn(&str) -> Option<String>, secrets: &Secrets) -> Result<Self, ConfigError> {
        let credential = |var: &str| {
            env(var)
                .filter(|v| !v.trim().is_empty())
                .or_else(|| secrets.get(var).filter(|v| !v.trim().is_empty()).map(str::to_string))
                .map(|v| v.trim().to_string())
        };
        let defaults = Self::default();

        let interval_ms = parse_var(&env, "RENDER_POLL_INTERVAL_MS")?;
        let max_attempts = parse_var(&env, "RENDER_POLL_MAX_ATTEMPTS")?;
        let port = parse_var(&env, "RENDER_PORT")?;

        Ok(Self {
            creatomate_api_key: credential(CREATOMATE_KEY_VAR),
            gemini_api_key: credential(GEMINI_KEY_VAR),
            creatomate_base_url: env("CREATOMATE_BASE_URL").unwrap_or(defaults.creatomate_base_url),
            gemini_base_url: env("GEMINI_BASE_URL").unwrap_or(defaults.gemini_base_url),
            gemini_model: env("GEMINI_MODEL").unwrap_or(defaults.gemini_model),
            poll: RetryPolicy {
                interval: interval_ms.map(Duration::from_millis).unwrap_or(defaults.poll.interval),
                max_attempts: max_attempts.unwrap_or(defaults.poll.max_attempts),
            },
            port: port.unwrap_or(defaults.port),
        })
    }
}

fn parse_var<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match env(var) {
        None => Ok(None),
        Some(value) => value.trim().parse().map(Some).map_err(|_| ConfigError::InvalidNumber { var, value }),
    }
}
