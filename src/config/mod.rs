//! Application configuration module
//!
//! Configuration is read once at startup from two sources, in increasing
//! precedence:
//!
//! 1. A YAML file (default `config/env.yaml`, overridable with
//!    `OTTERLY_CONFIG_PATH`) whose top-level `API_KEY` and `GEMINI_API_KEY`
//!    keys hold the two credentials. Optional `server`, `websocket` and
//!    `gemini` sections may sit alongside them.
//! 2. Environment variables with the `OTTERLY` prefix, using `__` to separate
//!    nested values.
//!
//! # Example
//!
//! ```no_run
//! use otterly_gateway::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod error;
mod gemini;
mod server;
mod websocket;

pub use error::{ConfigError, ValidationError};
pub use gemini::GeminiSettings;
pub use server::{Environment, ServerConfig};
pub use websocket::WebSocketConfig;

use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming the YAML configuration file
pub const CONFIG_PATH_VAR: &str = "OTTERLY_CONFIG_PATH";

/// Default YAML configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/env.yaml";

/// Root application configuration
///
/// Load using [`AppConfig::load()`]; credentials are never printed by `Debug`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Credential every client must present (`API_KEY`)
    #[serde(skip)]
    pub api_key: Option<Secret<String>>,

    /// Credential for the Gemini API (`GEMINI_API_KEY`)
    #[serde(skip)]
    pub gemini_api_key: Option<Secret<String>>,

    /// Server configuration (host, port, environment)
    #[serde(default)]
    pub server: ServerConfig,

    /// WebSocket transport limits
    #[serde(default)]
    pub websocket: WebSocketConfig,

    /// Gemini upstream settings
    #[serde(default)]
    pub gemini: GeminiSettings,
}

impl AppConfig {
    /// Load configuration from the YAML file and environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads the YAML file named by `OTTERLY_CONFIG_PATH` (if it exists)
    /// 3. Overlays environment variables with `OTTERLY` prefix
    ///
    /// # Environment Variable Format
    ///
    /// - `OTTERLY__API_KEY=...` -> gateway credential
    /// - `OTTERLY__SERVER__PORT=8080` -> `server.port = 8080`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is malformed or a value cannot be
    /// parsed into its expected type.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let path = std::env::var(CONFIG_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        Self::load_from(&path)
    }

    /// Load configuration from an explicit YAML file plus the environment
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::default()
                    .prefix("OTTERLY")
                    .separator("__"),
            )
            .build()?;

        let api_key = credential(&settings, "api_key", "API_KEY");
        let gemini_api_key = credential(&settings, "gemini_api_key", "GEMINI_API_KEY");

        let mut config: AppConfig = settings.try_deserialize()?;
        config.api_key = api_key;
        config.gemini_api_key = gemini_api_key;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::MissingRequired` when either credential is
    /// absent or empty, or the section error for an invalid limit.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.gateway_credential()?;
        self.gemini_credential()?;
        self.server.validate()?;
        self.websocket.validate()?;
        self.gemini.validate()?;
        Ok(())
    }

    /// The credential clients must present
    pub fn gateway_credential(&self) -> Result<Secret<String>, ValidationError> {
        required(&self.api_key, "API_KEY")
    }

    /// The Gemini API credential
    pub fn gemini_credential(&self) -> Result<Secret<String>, ValidationError> {
        required(&self.gemini_api_key, "GEMINI_API_KEY")
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}

/// Environment keys arrive lowercased; file keys keep their original case.
fn credential(settings: &config::Config, env_key: &str, file_key: &str) -> Option<Secret<String>> {
    settings
        .get_string(env_key)
        .or_else(|_| settings.get_string(file_key))
        .ok()
        .map(Secret::new)
}

fn required(
    value: &Option<Secret<String>>,
    name: &'static str,
) -> Result<Secret<String>, ValidationError> {
    match value {
        Some(secret) if !secret.expose_secret().is_empty() => Ok(secret.clone()),
        _ => Err(ValidationError::MissingRequired(name)),
    }
}
