//! Filesystem session backend: one file per session under a root
//! directory, file names carrying a fixed prefix.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::backend::{BackendKind, SessionBackend};

/// Prefix shared by every session file name.
pub const SESSION_FILE_PREFIX: &str = "session_";

pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// A backend rooted at `root`. Production stores root at the system
    /// temporary directory.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl SessionBackend for FilesystemBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Filesystem
    }

    fn key(&self, id: &str) -> String {
        format!("{SESSION_FILE_PREFIX}{id}")
    }

    async fn enumerate(&self) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(&self.root)
            .with_context(|| format!("failed to list session directory {}", self.root.display()))?;
        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry
                .with_context(|| format!("failed to list session directory {}", self.root.display()))?;
            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with(SESSION_FILE_PREFIX) {
                    keys.push(name.to_string());
                }
            }
        }
        Ok(keys)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key);
        std::fs::read(&path).with_context(|| format!("failed to read {}", path.display()))
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.path_for(key);
        std::fs::write(&path, value).with_context(|| format!("failed to write {}", path.display()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        std::fs::remove_file(&path).with_context(|| format!("failed to remove {}", path.display()))
    }
}
