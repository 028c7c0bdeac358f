use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Connect timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub http_version: HttpVersion,

    // Basic auth, sent only when a username is set
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// HTTP protocol version requested from the transport
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum HttpVersion {
    #[serde(rename = "1.0")]
    Http10,
    #[serde(rename = "1.1")]
    #[default]
    Http11,
}

fn default_base_url() -> String {
    "http://localhost:5984".to_string()
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_user_agent() -> String {
    format!("sofa/{}", env!("CARGO_PKG_VERSION"))
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ClientConfig = serde_json::from_str(&contents)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            http_version: HttpVersion::default(),
            username: None,
            password: None,
            user_agent: default_user_agent(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"base_url": "http://db:5984/", "http_version": "1.0"}"#)
                .unwrap();
        assert_eq!(config.base_url(), "http://db:5984");
        assert_eq!(config.http_version, HttpVersion::Http10);
        assert_eq!(config.timeout_secs, 5);
        assert!(config.username.is_none());
        assert!(config.user_agent.starts_with("sofa/"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = ClientConfig::load("/nonexistent/sofa.json").unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
