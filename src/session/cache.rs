//! Remote-cache session backend speaking the Redis protocol.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use tokio::sync::OnceCell;

use super::backend::{BackendKind, SessionBackend};
use super::config::CacheConfig;
use crate::tls::build_cache_tls;

/// Namespace prefix for every session key in the cache.
pub const CACHE_KEY_PREFIX: &str = "outpost_proxy_session_";

/// Build the cache client from connection settings. Construction parses and
/// validates the settings; the connection itself is established lazily on
/// first use.
pub fn build_cache_client(cache: &CacheConfig) -> Result<redis::Client> {
    let redis_info = RedisConnectionInfo {
        db: cache.db,
        username: cache.username.clone(),
        password: cache.password.clone(),
        ..Default::default()
    };

    let client = if cache.tls {
        let policy = build_cache_tls(&cache.tls_verification, cache.tls_ca_bundle.as_deref())?;
        let info = ConnectionInfo {
            addr: ConnectionAddr::TcpTls {
                host: cache.host.clone(),
                port: cache.port,
                insecure: policy.skip_verify(),
                tls_params: None,
            },
            redis: redis_info,
        };
        match policy.certificates() {
            Some(certificates) => redis::Client::build_with_tls(info, certificates),
            None => redis::Client::open(info),
        }
    } else {
        redis::Client::open(ConnectionInfo {
            addr: ConnectionAddr::Tcp(cache.host.clone(), cache.port),
            redis: redis_info,
        })
    };

    client.context("failed to construct session cache client")
}

pub struct CacheBackend {
    client: redis::Client,
    key_prefix: String,
    conn: OnceCell<MultiplexedConnection>,
}

impl CacheBackend {
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
            conn: OnceCell::new(),
        }
    }

    async fn connection(&self) -> Result<MultiplexedConnection> {
        let conn = self
            .conn
            .get_or_try_init(|| self.client.get_multiplexed_async_connection())
            .await
            .context("failed to connect to session cache")?;
        Ok(conn.clone())
    }
}

#[async_trait]
impl SessionBackend for CacheBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::RemoteCache
    }

    fn key(&self, id: &str) -> String {
        format!("{}{}", self.key_prefix, id)
    }

    async fn enumerate(&self) -> Result<Vec<String>> {
        let mut conn = self.connection().await?;
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(format!("{}*", self.key_prefix))
            .query_async(&mut conn)
            .await
            .context("failed to enumerate session keys")?;
        Ok(keys)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let mut conn = self.connection().await?;
        let value: Option<Vec<u8>> = conn
            .get(key)
            .await
            .with_context(|| format!("failed to get {key}"))?;
        value.ok_or_else(|| anyhow!("key {key} disappeared during scan"))
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut conn = self.connection().await?;
        conn.set::<_, _, ()>(key, value)
            .await
            .with_context(|| format!("failed to set {key}"))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(key)
            .await
            .with_context(|| format!("failed to delete {key}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_config() -> CacheConfig {
        CacheConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_client_construction_is_lazy() {
        // No listener on the port; construction still succeeds because the
        // connection is only established on first use.
        let client = build_cache_client(&unreachable_config());
        assert!(client.is_ok());
    }

    #[test]
    fn test_key_carries_namespace_prefix() {
        let client = build_cache_client(&unreachable_config()).unwrap();
        let backend = CacheBackend::new(client, CACHE_KEY_PREFIX);
        assert_eq!(
            backend.key("abc123"),
            "outpost_proxy_session_abc123".to_string()
        );
    }

    #[tokio::test]
    async fn test_enumerate_surfaces_connection_errors() {
        let client = build_cache_client(&unreachable_config()).unwrap();
        let backend = CacheBackend::new(client, CACHE_KEY_PREFIX);
        assert!(backend.enumerate().await.is_err());
    }
}
