//! Gemini upstream configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Gemini upstream settings (the credential lives at the top level)
#[derive(Debug, Clone, Deserialize)]
pub struct GeminiSettings {
    /// Model used for every dialogue
    #[serde(default = "default_model")]
    pub model: String,

    /// API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Seconds allowed for connecting, receiving response headers, and each
    /// gap between streamed chunks
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl GeminiSettings {
    /// Get timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate Gemini settings
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.model.trim().is_empty() {
            return Err(ValidationError::InvalidModel);
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ValidationError::InvalidBaseUrl(self.base_url.clone()));
        }
        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout("gemini.timeout_secs"));
        }
        Ok(())
    }
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_timeout() -> u64 {
    120
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gemini_defaults() {
        let config = GeminiSettings::default();
        assert_eq!(config.model, "gemini-2.5-flash");
        assert_eq!(config.timeout(), Duration::from_secs(120));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_blank_model_rejected() {
        let config = GeminiSettings {
            model: "  ".to_string(),
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidModel));
    }

    #[test]
    fn test_base_url_requires_scheme() {
        let config = GeminiSettings {
            base_url: "generativelanguage.googleapis.com".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidBaseUrl(_))
        ));
    }
}
