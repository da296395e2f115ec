//! Engine configuration, loadable from a JSON file with CLI overrides.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::adapters::AdapterContext;
use crate::engine::credentials::CredentialCache;
use crate::engine::walker::DEFAULT_MAX_DEPTH;
use crate::transport::TransportConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Top-level configuration. Every field has a default, so an empty file (or
/// no file at all) yields a working engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub max_directory_depth: usize,
    /// Base domain rendered into deferred per-file resolution URLs.
    pub deferred_base: String,
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
    /// Background credentials per provider id, used when the caller does
    /// not supply their own.
    pub shared_credentials: HashMap<String, Credential>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            read_timeout_secs: 30,
            max_directory_depth: DEFAULT_MAX_DEPTH,
            deferred_base: "http://127.0.0.1:6400".to_string(),
            user_agent: None,
            proxy: None,
            shared_credentials: HashMap::new(),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Materializes the adapter construction context: one fresh credential
    /// cache plus the connection settings.
    #[must_use]
    pub fn adapter_context(&self) -> AdapterContext {
        let mut transport = TransportConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            ..TransportConfig::default()
        };
        if let Some(user_agent) = &self.user_agent {
            transport.user_agent = user_agent.clone();
        }
        transport.proxy = self.proxy.clone();
        AdapterContext {
            credentials: Arc::new(CredentialCache::new()),
            transport,
            deferred_base: self.deferred_base.clone(),
            max_directory_depth: self.max_directory_depth,
        }
    }

    /// The shared credential for one provider as the extras-bag value
    /// adapters expect, if configured.
    #[must_use]
    pub fn credential_value(&self, provider_id: &str) -> Option<serde_json::Value> {
        self.shared_credentials.get(provider_id).map(|credential| {
            json!({
                "username": credential.username,
                "password": credential.password,
                "cookie": credential.cookie,
            })
        })
    }
}

/// One provider's background credential. Secrets are redacted from debug
/// output so they never reach logs.
#[derive(Clone, Deserialize, Default)]
#[serde(default)]
pub struct Credential {
    pub username: String,
    pub password: String,
    /// Cookie-authenticated providers take a whole session cookie instead.
    pub cookie: Option<String>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("cookie", &self.cookie.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.connect_timeout_secs, 10);
        assert_eq!(config.read_timeout_secs, 30);
        assert_eq!(config.max_directory_depth, DEFAULT_MAX_DEPTH);
        assert!(config.shared_credentials.is_empty());
    }

    #[test]
    fn test_credentials_parse_and_redact() {
        let config: EngineConfig = serde_json::from_str(
            r#"{
                "maxDirectoryDepth": 8,
                "sharedCredentials": {
                    "ilanzou": { "username": "u", "password": "hunter2" }
                }
            }"#,
        )
        .unwrap();
        assert_eq!(config.max_directory_depth, 8);
        let value = config.credential_value("ilanzou").unwrap();
        assert_eq!(value["username"], "u");
        assert_eq!(value["password"], "hunter2");
        assert!(config.credential_value("weiyun").is_none());

        let debug = format!("{:?}", config.shared_credentials["ilanzou"]);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_adapter_context_reflects_settings() {
        let config = EngineConfig {
            connect_timeout_secs: 3,
            proxy: Some("http://proxy:8080".to_string()),
            deferred_base: "https://dl.example".to_string(),
            ..EngineConfig::default()
        };
        let ctx = config.adapter_context();
        assert_eq!(ctx.transport.connect_timeout, Duration::from_secs(3));
        assert_eq!(ctx.transport.proxy.as_deref(), Some("http://proxy:8080"));
        assert_eq!(ctx.deferred_base, "https://dl.example");
    }
}
