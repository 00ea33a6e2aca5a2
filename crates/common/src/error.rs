//! Configuration and startup errors

use thiserror::Error;

/// Errors raised while loading client configuration.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("reading configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("parsing configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("environment variable {name} is set but empty")]
    EmptyEnv { name: String },
}

/// Result alias using the configuration Error
pub type Result<T> = std::result::Result<T, Error>;
