//! Claims-predicate bulk logout across the active backend.

use anyhow::Result;
use tracing::{trace, warn};

use crate::codecs::{decode_any, CodecRegistry};
use super::backend::BackendKind;
use super::store::SessionStore;
use super::types::{Claims, Session};

impl SessionStore {
    /// Delete every stored session whose decoded identity claims satisfy
    /// `filter`.
    ///
    /// The scan decodes with the registry spanning all configured
    /// applications, since a stored session does not identify its owner.
    /// Failures on individual sessions are logged and skipped; only a
    /// failure to enumerate the stored sessions aborts the call, in which
    /// case nothing is deleted. Sessions created after the enumeration
    /// snapshot is taken are not seen by that call; bulk invalidation is
    /// best-effort against concurrent writers. Dropping the returned
    /// future (e.g. under a timeout) aborts the remaining scan.
    pub async fn logout<F>(&self, registry: &CodecRegistry, filter: F) -> Result<()>
    where
        F: Fn(&Claims) -> bool,
    {
        match self.kind() {
            BackendKind::Filesystem => self.logout_filesystem(registry, &filter).await,
            BackendKind::RemoteCache => self.logout_cache(&filter).await,
        }
    }

    async fn logout_filesystem<F>(&self, registry: &CodecRegistry, filter: &F) -> Result<()>
    where
        F: Fn(&Claims) -> bool,
    {
        let keys = self.backend().enumerate().await?;
        for key in keys {
            let raw = match self.backend().get(&key).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(error = %e, file = %key, "failed to read session file");
                    continue;
                }
            };
            let raw = match String::from_utf8(raw) {
                Ok(raw) => raw,
                Err(e) => {
                    trace!(error = %e, file = %key, "session file is not valid UTF-8");
                    continue;
                }
            };
            let session: Session = match decode_any(self.session_name(), &raw, registry.all_codecs())
            {
                Ok(session) => session,
                Err(e) => {
                    trace!(error = %e, file = %key, "failed to decode session");
                    continue;
                }
            };
            let claims = match session.claims() {
                Ok(Some(claims)) => claims,
                Ok(None) => continue,
                Err(e) => {
                    trace!(error = %e, file = %key, "session claims are malformed");
                    continue;
                }
            };
            if filter(&claims) {
                trace!(file = %key, "deleting session");
                if let Err(e) = self.backend().delete(&key).await {
                    warn!(error = %e, file = %key, "failed to delete session");
                }
            }
        }
        Ok(())
    }

    async fn logout_cache<F>(&self, filter: &F) -> Result<()>
    where
        F: Fn(&Claims) -> bool,
    {
        let keys = self.backend().enumerate().await?;
        for key in keys {
            let raw = match self.backend().get(&key).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(error = %e, key = %key, "failed to get session value");
                    continue;
                }
            };
            let session: Session = match rmp_serde::from_slice(&raw) {
                Ok(session) => session,
                Err(e) => {
                    warn!(error = %e, key = %key, "failed to deserialize session");
                    continue;
                }
            };
            let claims = match session.claims() {
                Ok(Some(claims)) => claims,
                Ok(None) => continue,
                Err(e) => {
                    warn!(error = %e, key = %key, "session claims are malformed");
                    continue;
                }
            };
            if filter(&claims) {
                trace!(key = %key, "deleting session");
                if let Err(e) = self.backend().delete(&key).await {
                    warn!(error = %e, key = %key, "failed to delete session");
                }
            }
        }
        Ok(())
    }
}
