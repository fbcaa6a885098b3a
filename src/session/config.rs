//! Configuration consumed by the session subsystem.
//!
//! Constructed once by the embedding proxy and passed into the store
//! factory and TLS builder explicitly.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How this outpost is deployed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    /// Co-located with a centrally managed cache shared across outposts.
    Embedded,
    /// Self-contained; sessions persist on the local filesystem.
    Standalone,
}

/// Connection settings for the shared remote cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    #[serde(default = "default_cache_host")]
    pub host: String,

    #[serde(default = "default_cache_port")]
    pub port: u16,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Logical database index.
    #[serde(default)]
    pub db: i64,

    /// Connect with TLS.
    #[serde(default)]
    pub tls: bool,

    /// Peer verification mode: "required" (default), or "none"/"false" to
    /// disable verification.
    #[serde(default = "default_tls_verification")]
    pub tls_verification: String,

    /// Optional CA bundle appended to the system trust store.
    #[serde(default)]
    pub tls_ca_bundle: Option<PathBuf>,
}

fn default_cache_host() -> String {
    "localhost".to_string()
}

fn default_cache_port() -> u16 {
    6379
}

fn default_tls_verification() -> String {
    "required".to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            host: default_cache_host(),
            port: default_cache_port(),
            username: None,
            password: None,
            db: 0,
            tls: false,
            tls_verification: default_tls_verification(),
            tls_ca_bundle: None,
        }
    }
}

/// Process-wide outpost configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutpostConfig {
    #[serde(default = "default_mode")]
    pub mode: DeploymentMode,

    #[serde(default)]
    pub cache: CacheConfig,
}

fn default_mode() -> DeploymentMode {
    DeploymentMode::Standalone
}

impl Default for OutpostConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            cache: CacheConfig::default(),
        }
    }
}

impl OutpostConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.mode == DeploymentMode::Embedded && self.cache.host.is_empty() {
            return Err("embedded mode requires a cache host".to_string());
        }
        Ok(())
    }
}

/// Per-application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Application slug, used for log context.
    pub name: String,

    /// Secret the application's session codecs are derived from.
    pub cookie_secret: String,

    /// Cookie Domain attribute (omitted when unset).
    #[serde(default)]
    pub cookie_domain: Option<String>,

    /// Access-token validity in seconds; bounds the session cookie
    /// lifetime. Unset means session-only cookies.
    #[serde(default)]
    pub access_token_validity: Option<u64>,

    /// Cookie name carrying the signed session identifier.
    #[serde(default = "default_session_cookie_name")]
    pub session_cookie_name: String,
}

fn default_session_cookie_name() -> String {
    "outpost_session".to_string()
}

impl AppConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.cookie_secret.is_empty() {
            return Err(format!("application {} has an empty cookie secret", self.name));
        }
        if self.session_cookie_name.is_empty() {
            return Err(format!("application {} has an empty cookie name", self.name));
        }
        Ok(())
    }
}
