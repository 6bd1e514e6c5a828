//! Client configuration
//!
//! `ClientConfig` is built once at client creation and read-only afterwards.
//! `ClientSettings` is its serializable counterpart, for applications that
//! keep client settings in a YAML or JSON file.

use crate::auth::Auth;
use crate::error::{Result, ResultExt};
use crate::http::{Query, RateLimiterConfig, DEFAULT_RETRY_AFTER};
use crate::types::StringMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest response body read into memory by default (32 MiB)
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 32 * 1024 * 1024;

// ============================================================================
// Client Config
// ============================================================================

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL every relative path is joined onto
    pub base_url: String,
    /// Network client to use instead of building one
    pub http_client: Option<reqwest::Client>,
    /// Request timeout (ignored with a custom client)
    pub timeout: Duration,
    /// Connect timeout (ignored with a custom client)
    pub connect_timeout: Duration,
    /// User agent string (ignored with a custom client)
    pub user_agent: String,
    /// Headers sent with every request
    pub default_headers: StringMap,
    /// Query parameters sent with every request unless overridden per call
    pub default_query: Query,
    /// Credentials attached to every request
    pub auth: Auth,
    /// Delay reported for 429 responses without a usable hint
    pub default_retry_after: Duration,
    /// Upper bound on response body size
    pub max_response_bytes: usize,
    /// Client-side pacing, off by default
    pub rate_limit: Option<RateLimiterConfig>,
}

impl ClientConfig {
    /// Config with defaults for everything but the base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http_client: None,
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            user_agent: format!("{}/{}", crate::NAME, crate::VERSION),
            default_headers: StringMap::new(),
            default_query: Query::new(),
            auth: Auth::None,
            default_retry_after: DEFAULT_RETRY_AFTER,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            rate_limit: None,
        }
    }

    /// Create a new config builder
    pub fn builder(base_url: impl Into<String>) -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self::new(base_url),
        }
    }
}

/// Builder for client config
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Use this network client instead of building one
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.config.http_client = Some(client);
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    /// Add a default header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.insert(key.into(), value.into());
        self
    }

    /// Append a default query parameter
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_query.push(key, value);
        self
    }

    /// Set credentials
    pub fn auth(mut self, auth: Auth) -> Self {
        self.config.auth = auth;
        self
    }

    /// Authenticate with an API token query parameter
    pub fn api_token(self, token: impl Into<String>) -> Self {
        self.auth(Auth::api_token(token))
    }

    /// Set the delay reported for 429 responses without a hint
    pub fn default_retry_after(mut self, delay: Duration) -> Self {
        self.config.default_retry_after = delay;
        self
    }

    /// Set the response body size bound
    pub fn max_response_bytes(mut self, limit: usize) -> Self {
        self.config.max_response_bytes = limit;
        self
    }

    /// Enable client-side pacing
    pub fn rate_limit(mut self, config: RateLimiterConfig) -> Self {
        self.config.rate_limit = Some(config);
        self
    }

    /// Disable client-side pacing
    pub fn no_rate_limit(mut self) -> Self {
        self.config.rate_limit = None;
        self
    }

    /// Build the config
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

// ============================================================================
// Settings
// ============================================================================

/// A query parameter in settings files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParam {
    pub name: String,
    pub value: String,
}

/// Serializable client settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientSettings {
    /// Base URL for API requests
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Connect timeout in seconds
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,

    /// User agent override
    #[serde(default)]
    pub user_agent: Option<String>,

    /// Headers sent with every request
    #[serde(default)]
    pub headers: StringMap,

    /// Query parameters sent with every request
    #[serde(default)]
    pub query: Vec<QueryParam>,

    /// Credentials
    #[serde(default)]
    pub auth: Auth,

    /// Default 429 delay in seconds
    #[serde(default)]
    pub default_retry_after_secs: Option<u64>,

    /// Response body size bound
    #[serde(default)]
    pub max_response_bytes: Option<usize>,

    /// Client-side pacing
    #[serde(default)]
    pub rate_limit: Option<RateLimiterConfig>,
}

impl ClientSettings {
    /// Parse settings from YAML (JSON is valid YAML too)
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read and parse a settings file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        Self::from_yaml_str(&contents)
    }

    /// Turn settings into a config, filling gaps with defaults
    pub fn into_config(self) -> ClientConfig {
        let mut config = ClientConfig::new(self.base_url);

        if let Some(secs) = self.timeout_secs {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.connect_timeout_secs {
            config.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(agent) = self.user_agent {
            config.user_agent = agent;
        }
        if let Some(secs) = self.default_retry_after_secs {
            config.default_retry_after = Duration::from_secs(secs);
        }
        if let Some(limit) = self.max_response_bytes {
            config.max_response_bytes = limit;
        }

        config.default_headers = self.headers;
        config.default_query = self
            .query
            .into_iter()
            .map(|p| (p.name, p.value))
            .collect();
        config.auth = self.auth;
        config.rate_limit = self.rate_limit;
        config
    }
}

impl From<ClientSettings> for ClientConfig {
    fn from(settings: ClientSettings) -> Self {
        settings.into_config()
    }
}
