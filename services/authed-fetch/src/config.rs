//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Seed tokens come from AUTH_ACCESS_TOKEN / AUTH_REFRESH_TOKEN only,
//! never from the TOML, so they cannot leak through a committed file.

use auth_client::DEFAULT_REFRESH_PATH;
use common::Secret;
use credential_store::Credential;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ACCESS_TOKEN_ENV: &str = "AUTH_ACCESS_TOKEN";
pub const REFRESH_TOKEN_ENV: &str = "AUTH_REFRESH_TOKEN";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub client: ClientConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(skip)]
    pub seed: Option<SeedTokens>,
}

/// Upstream API settings
#[derive(Debug, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
}

/// Credential persistence settings
#[derive(Debug, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default = "default_credentials_path")]
    pub path: PathBuf,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            path: default_credentials_path(),
        }
    }
}

/// Token pair supplied through the environment.
#[derive(Debug)]
pub struct SeedTokens {
    pub access: Secret<String>,
    pub refresh: Secret<String>,
}

impl SeedTokens {
    pub fn credential(&self) -> Credential {
        Credential::new(self.access.expose().as_str(), self.refresh.expose().as_str())
    }
}

fn default_timeout_ms() -> u64 {
    3000
}

fn default_refresh_path() -> String {
    DEFAULT_REFRESH_PATH.to_string()
}

fn default_credentials_path() -> PathBuf {
    PathBuf::from("credentials.json")
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if !config.client.base_url.starts_with("http://")
            && !config.client.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                config.client.base_url
            )));
        }

        if config.client.timeout_ms == 0 {
            return Err(common::Error::Config(
                "timeout_ms must be greater than 0".into(),
            ));
        }

        if !config.client.refresh_path.starts_with('/') {
            return Err(common::Error::Config(format!(
                "refresh_path must start with /, got: {}",
                config.client.refresh_path
            )));
        }

        config.seed = seed_from_env()?;
        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("authed-fetch.toml")
    }
}

/// Both variables must be present to seed; a present but blank one is an error.
fn seed_from_env() -> common::Result<Option<SeedTokens>> {
    let access = read_env(ACCESS_TOKEN_ENV)?;
    let refresh = read_env(REFRESH_TOKEN_ENV)?;
    match (access, refresh) {
        (Some(access), Some(refresh)) => Ok(Some(SeedTokens { access, refresh })),
        _ => Ok(None),
    }
}

fn read_env(name: &str) -> common::Result<Option<Secret<String>>> {
    match std::env::var(name) {
        Ok(value) if value.trim().is_empty() => Err(common::Error::EmptyEnv {
            name: name.to_string(),
        }),
        Ok(value) => Ok(Some(Secret::new(value))),
        Err(_) => Ok(None),
    }
}
