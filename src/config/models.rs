//! Configuration data structures for the routekit server binary.
//!
//! These types map directly to YAML (also JSON / TOML / INI) configuration files. They are
//! serde-friendly and include defaults so that minimal configs remain concise.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::url::UrlLimits;

fn default_listen_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_index_file() -> Option<String> {
    Some("index.html".to_string())
}

/// A directory served below a URL prefix
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct StaticMountConfig {
    /// URL prefix for static files (e.g., "/static")
    pub prefix: String,
    /// Root directory for static files
    pub root: String,
    /// Default file to serve for directories (e.g., "index.html")
    #[serde(default = "default_index_file")]
    pub index_file: Option<String>,
}

/// Cross-origin resource sharing
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins; empty reflects the caller's origin
    pub origins: Vec<String>,
}

/// HTTP basic authentication for every route
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct BasicAuthConfig {
    /// Required username; any username is accepted when omitted
    #[serde(default)]
    pub username: Option<String>,
    pub password: String,
    /// Realm advertised in the challenge, "server" when omitted
    #[serde(default)]
    pub realm: Option<String>,
}

/// Log output settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human readable output
    pub json: bool,
    /// Include span enter/exit events
    pub spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
            spans: false,
        }
    }
}

/// Main server configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Request target limits applied before routing
    #[serde(default)]
    pub limits: UrlLimits,
    /// Maximum request body size in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default)]
    pub static_files: Vec<StaticMountConfig>,
    #[serde(default)]
    pub cors: Option<CorsConfig>,
    #[serde(default)]
    pub basic_auth: Option<BasicAuthConfig>,
    /// Extra headers added to every response
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Add common security hardening headers
    #[serde(default)]
    pub security_headers: bool,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_max_body_bytes() -> usize {
    crate::adapters::http_handler::DEFAULT_MAX_BODY_BYTES
}

impl ServerConfig {
    /// Create a new builder for ServerConfig
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            limits: UrlLimits::default(),
            max_body_bytes: default_max_body_bytes(),
            static_files: Vec::new(),
            cors: None,
            basic_auth: None,
            headers: HashMap::new(),
            security_headers: false,
            logging: LoggingConfig::default(),
        }
    }
}

/// Builder for ServerConfig
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Set the listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    pub fn limits(mut self, limits: UrlLimits) -> Self {
        self.config.limits = limits;
        self
    }

    /// Serve `root` below `prefix`
    pub fn static_files(mut self, prefix: impl Into<String>, root: impl Into<String>) -> Self {
        self.config.static_files.push(StaticMountConfig {
            prefix: prefix.into(),
            root: root.into(),
            index_file: default_index_file(),
        });
        self
    }

    pub fn cors(mut self, origins: Vec<String>) -> Self {
        self.config.cors = Some(CorsConfig { origins });
        self
    }

    pub fn basic_auth(
        mut self,
        username: Option<String>,
        password: impl Into<String>,
        realm: Option<String>,
    ) -> Self {
        self.config.basic_auth = Some(BasicAuthConfig {
            username,
            password: password.into(),
            realm,
        });
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.insert(name.into(), value.into());
        self
    }

    pub fn security_headers(mut self, enabled: bool) -> Self {
        self.config.security_headers = enabled;
        self
    }

    pub fn logging(mut self, config: LoggingConfig) -> Self {
        self.config.logging = config;
        self
    }

    /// Build the ServerConfig
    pub fn build(self) -> Result<ServerConfig, String> {
        if self.config.listen_addr.is_empty() {
            return Err("listen_addr must not be empty".to_string());
        }
        Ok(self.config)
    }
}
