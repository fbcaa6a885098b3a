//! Backend capability interface shared by the persistence implementations.

use anyhow::Result;
use async_trait::async_trait;

/// Which persistence backend is active. Exactly one per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Filesystem,
    RemoteCache,
}

/// The capabilities the store and the bulk-logout scan need from a
/// backend. Callers dispatch on [`BackendKind`]; concrete backend types
/// never leak past construction.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Full storage key for a hex session ID, including the backend's
    /// fixed namespace prefix.
    fn key(&self, id: &str) -> String;

    /// List every stored session key. Failure here is structural: without
    /// a reliable key list a bulk scan cannot proceed.
    async fn enumerate(&self) -> Result<Vec<String>>;

    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    async fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}
