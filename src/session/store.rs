//! Store construction and cookie security attributes.
//!
//! [`get_store`] runs once at startup or reconfiguration and produces the
//! single active store for the process: remote-cache backed in embedded
//! deployments, filesystem backed otherwise. The returned store is safe for
//! concurrent use; every operation round-trips to the backing store.

use anyhow::{anyhow, Context, Result};
use std::env;
use std::sync::Arc;
use tracing::trace;
use url::Url;

use crate::codecs::{codecs_for_app, decode_any, Codec};
use super::backend::{BackendKind, SessionBackend};
use super::cache::{build_cache_client, CacheBackend, CACHE_KEY_PREFIX};
use super::config::{AppConfig, DeploymentMode, OutpostConfig};
use super::filesystem::FilesystemBackend;
use super::types::{Session, SessionId};

/// Security attributes applied to every session cookie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub http_only: bool,
    pub secure: bool,
    pub domain: Option<String>,
    pub same_site: String,
    /// Cookie lifetime in seconds; 0 means a session-only cookie.
    pub max_age: u64,
    pub path: String,
}

impl SessionOptions {
    pub fn for_app(app: &AppConfig, external_host: &Url) -> Self {
        Self {
            http_only: true,
            secure: external_host.scheme().eq_ignore_ascii_case("https"),
            domain: app.cookie_domain.clone(),
            same_site: "Lax".to_string(),
            max_age: cookie_max_age(app.access_token_validity),
            path: "/".to_string(),
        }
    }

    /// Render a Set-Cookie header value with these attributes.
    pub fn build_cookie(&self, name: &str, value: &str) -> String {
        let mut cookie = format!("{}={}", name, value);

        if let Some(ref domain) = self.domain {
            cookie.push_str(&format!("; Domain={}", domain));
        }

        cookie.push_str(&format!("; Path={}", self.path));

        if self.secure {
            cookie.push_str("; Secure");
        }

        if self.http_only {
            cookie.push_str("; HttpOnly");
        }

        cookie.push_str(&format!("; SameSite={}", self.same_site));

        if self.max_age > 0 {
            cookie.push_str(&format!("; Max-Age={}", self.max_age));
        }

        cookie
    }
}

/// Cookie lifetime derived from the access-token validity: one second past
/// the token expiry, so a session can never outlive its token indefinitely.
/// Unset validity yields 0, a session-only cookie.
pub fn cookie_max_age(validity: Option<u64>) -> u64 {
    validity.map(|v| v + 1).unwrap_or(0)
}

/// The active session store: one backend, the owning application's codecs,
/// and the cookie policy.
pub struct SessionStore {
    backend: Arc<dyn SessionBackend>,
    codecs: Vec<Codec>,
    options: SessionOptions,
    session_name: String,
}

/// Select and configure the backend store for this deployment.
///
/// Embedded outposts share the centrally managed cache; standalone outposts
/// persist sessions under the system temporary directory. Cache client
/// construction failure and an unreadable CA bundle are fatal.
pub fn get_store(
    outpost: &OutpostConfig,
    app: &AppConfig,
    external_host: &Url,
) -> Result<SessionStore> {
    let max_age = cookie_max_age(app.access_token_validity);
    let options = SessionOptions::for_app(app, external_host);

    match outpost.mode {
        DeploymentMode::Embedded => {
            let client = build_cache_client(&outpost.cache)?;
            let backend = CacheBackend::new(client, CACHE_KEY_PREFIX);
            trace!("using remote cache session backend");
            Ok(SessionStore::new(
                Arc::new(backend),
                codecs_for_app(max_age, &app.cookie_secret),
                options,
                &app.session_cookie_name,
            ))
        }
        DeploymentMode::Standalone => {
            let dir = env::temp_dir();
            let backend = FilesystemBackend::new(dir.clone());
            let mut codecs = codecs_for_app(max_age, &app.cookie_secret);
            // Identity providers can attach large id_token payloads; the
            // default encoded-length bound would reject those sessions.
            for codec in &mut codecs {
                codec.set_max_length(usize::MAX);
            }
            trace!(dir = %dir.display(), "using filesystem session backend");
            Ok(SessionStore::new(
                Arc::new(backend),
                codecs,
                options,
                &app.session_cookie_name,
            ))
        }
    }
}

impl SessionStore {
    pub fn new(
        backend: Arc<dyn SessionBackend>,
        codecs: Vec<Codec>,
        options: SessionOptions,
        session_name: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            codecs,
            options,
            session_name: session_name.into(),
        }
    }

    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Cookie name sessions are stored and signed under.
    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    pub(crate) fn backend(&self) -> &dyn SessionBackend {
        self.backend.as_ref()
    }

    fn signing_codec(&self) -> Result<&Codec> {
        self.codecs
            .first()
            .ok_or_else(|| anyhow!("store has no codecs configured"))
    }

    /// Persist a session and return the Set-Cookie header value carrying
    /// its signed identifier.
    pub async fn save(&self, session: &Session) -> Result<String> {
        let codec = self.signing_codec()?;
        let key = self.backend.key(&session.id.to_hex());
        let payload = match self.backend.kind() {
            BackendKind::Filesystem => codec
                .encode(&self.session_name, session)?
                .into_bytes(),
            BackendKind::RemoteCache => {
                rmp_serde::to_vec(session).context("failed to serialize session")?
            }
        };
        self.backend.put(&key, &payload).await?;

        let id_value = codec.encode(&self.session_name, &session.id.to_hex())?;
        Ok(self.options.build_cookie(&self.session_name, &id_value))
    }

    /// Resolve a Cookie header back to its stored session.
    ///
    /// Anything short of a verifiable cookie pointing at a decodable stored
    /// session resolves to `None`: to the proxy those requests are simply
    /// unauthenticated.
    pub async fn load(&self, cookie_header: &str) -> Result<Option<Session>> {
        let raw_value = match self.parse_session_cookie(cookie_header) {
            Some(value) => value,
            None => return Ok(None),
        };

        let id_hex: String = match decode_any(&self.session_name, &raw_value, &self.codecs) {
            Ok(id) => id,
            Err(e) => {
                trace!(error = %e, "session cookie failed verification");
                return Ok(None);
            }
        };
        let id = match SessionId::from_hex(&id_hex) {
            Some(id) => id,
            None => {
                trace!("session cookie carries a malformed identifier");
                return Ok(None);
            }
        };

        let key = self.backend.key(&id.to_hex());
        let raw = match self.backend.get(&key).await {
            Ok(raw) => raw,
            Err(e) => {
                trace!(error = %e, key = %key, "session not found in backend");
                return Ok(None);
            }
        };

        let session = match self.backend.kind() {
            BackendKind::Filesystem => {
                let raw = match String::from_utf8(raw) {
                    Ok(raw) => raw,
                    Err(e) => {
                        trace!(error = %e, key = %key, "stored session is not valid UTF-8");
                        return Ok(None);
                    }
                };
                match decode_any::<Session>(&self.session_name, &raw, &self.codecs) {
                    Ok(session) => session,
                    Err(e) => {
                        trace!(error = %e, key = %key, "failed to decode stored session");
                        return Ok(None);
                    }
                }
            }
            BackendKind::RemoteCache => match rmp_serde::from_slice(&raw) {
                Ok(session) => session,
                Err(e) => {
                    trace!(error = %e, key = %key, "failed to deserialize stored session");
                    return Ok(None);
                }
            },
        };

        Ok(Some(session))
    }

    /// Delete a single session by ID.
    pub async fn delete(&self, id: &SessionId) -> Result<()> {
        self.backend.delete(&self.backend.key(&id.to_hex())).await
    }

    /// Number of sessions currently persisted (for observability).
    pub async fn session_count(&self) -> Result<usize> {
        Ok(self.backend.enumerate().await?.len())
    }

    /// Extract this store's session cookie value from a Cookie header.
    pub fn parse_session_cookie(&self, cookie_header: &str) -> Option<String> {
        for part in cookie_header.split(';') {
            let part = part.trim();
            if let Some(value) = part.strip_prefix(&format!("{}=", self.session_name)) {
                return Some(value.to_string());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::types::Claims;
    use tempfile::tempdir;

    fn test_app(validity: Option<u64>) -> AppConfig {
        AppConfig {
            name: "app".to_string(),
            cookie_secret: "app-secret".to_string(),
            cookie_domain: Some("example.com".to_string()),
            access_token_validity: validity,
            session_cookie_name: "outpost_session".to_string(),
        }
    }

    fn filesystem_store(dir: &std::path::Path, app: &AppConfig) -> SessionStore {
        let host = Url::parse("https://app.example.com").unwrap();
        let mut codecs = codecs_for_app(cookie_max_age(app.access_token_validity), &app.cookie_secret);
        for codec in &mut codecs {
            codec.set_max_length(usize::MAX);
        }
        SessionStore::new(
            Arc::new(FilesystemBackend::new(dir.to_path_buf())),
            codecs,
            SessionOptions::for_app(app, &host),
            &app.session_cookie_name,
        )
    }

    #[test]
    fn test_standalone_selects_filesystem_backend() {
        let outpost = OutpostConfig::default();
        let host = Url::parse("https://app.example.com").unwrap();
        let store = get_store(&outpost, &test_app(None), &host).unwrap();
        assert_eq!(store.kind(), BackendKind::Filesystem);
    }

    #[test]
    fn test_embedded_selects_cache_backend() {
        let outpost = OutpostConfig {
            mode: DeploymentMode::Embedded,
            ..Default::default()
        };
        let host = Url::parse("https://app.example.com").unwrap();
        let store = get_store(&outpost, &test_app(None), &host).unwrap();
        assert_eq!(store.kind(), BackendKind::RemoteCache);
    }

    #[test]
    fn test_secure_follows_url_scheme() {
        let outpost = OutpostConfig::default();
        let app = test_app(None);

        let https = Url::parse("https://app.example.com").unwrap();
        assert!(get_store(&outpost, &app, &https).unwrap().options().secure);

        let http = Url::parse("http://app.example.com").unwrap();
        assert!(!get_store(&outpost, &app, &http).unwrap().options().secure);
    }

    #[test]
    fn test_max_age_outlives_token_by_one() {
        let host = Url::parse("https://app.example.com").unwrap();
        let options = SessionOptions::for_app(&test_app(Some(3600)), &host);
        assert_eq!(options.max_age, 3601);

        let options = SessionOptions::for_app(&test_app(None), &host);
        assert_eq!(options.max_age, 0);
    }

    #[test]
    fn test_cookie_attributes() {
        let host = Url::parse("https://app.example.com").unwrap();
        let options = SessionOptions::for_app(&test_app(Some(3600)), &host);

        let cookie = options.build_cookie("outpost_session", "value123");
        assert!(cookie.starts_with("outpost_session=value123"));
        assert!(cookie.contains("Domain=example.com"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("Secure"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Max-Age=3601"));
    }

    #[test]
    fn test_session_only_cookie_has_no_max_age() {
        let host = Url::parse("http://app.example.com").unwrap();
        let options = SessionOptions::for_app(&test_app(None), &host);

        let cookie = options.build_cookie("outpost_session", "value123");
        assert!(!cookie.contains("Max-Age"));
        assert!(!cookie.contains("Secure"));
    }

    #[test]
    fn test_cookie_parsing() {
        let dir = tempdir().unwrap();
        let store = filesystem_store(dir.path(), &test_app(None));

        let header = "other=value; outpost_session=abc123; another=test";
        assert_eq!(
            store.parse_session_cookie(header),
            Some("abc123".to_string())
        );
        assert_eq!(store.parse_session_cookie("no_session=here"), None);
    }

    #[tokio::test]
    async fn test_save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let app = test_app(Some(3600));
        let store = filesystem_store(dir.path(), &app);

        let mut session = Session::new();
        session
            .set_claims(&Claims {
                sub: "alice".to_string(),
                ..Default::default()
            })
            .unwrap();

        let cookie = store.save(&session).await.unwrap();
        assert!(cookie.starts_with("outpost_session="));
        assert_eq!(store.session_count().await.unwrap(), 1);

        // The Set-Cookie value's leading name=value pair doubles as a
        // Cookie header.
        let loaded = store.load(&cookie).await.unwrap().unwrap();
        assert_eq!(loaded.id, session.id);
        assert_eq!(loaded.claims().unwrap().unwrap().sub, "alice");
    }

    #[tokio::test]
    async fn test_load_rejects_forged_cookie() {
        let dir = tempdir().unwrap();
        let store = filesystem_store(dir.path(), &test_app(None));

        let loaded = store
            .load("outpost_session=not-a-signed-value")
            .await
            .unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_load_with_other_apps_secret_fails() {
        let dir = tempdir().unwrap();
        let app = test_app(None);
        let store = filesystem_store(dir.path(), &app);

        let session = Session::new();
        let cookie = store.save(&session).await.unwrap();

        let mut other = app.clone();
        other.cookie_secret = "different-secret".to_string();
        let other_store = filesystem_store(dir.path(), &other);
        assert!(other_store.load(&cookie).await.unwrap().is_none());
    }
}
