//! Session and identity-claims types.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Key under which a session's identity claims are stored.
pub const SESSION_CLAIMS_KEY: &str = "claims";

/// Unique session identifier (16-byte random value, hex-encoded for storage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId([u8; 16]);

impl SessionId {
    /// Generate a new random session ID.
    pub fn new() -> Self {
        Self(rand::random())
    }

    /// Convert to hex string for storage keys and cookies.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        if bytes.len() != 16 {
            return None;
        }
        let mut arr = [0u8; 16];
        arr.copy_from_slice(&bytes);
        Some(Self(arr))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Opaque session contents as stored by the backend.
pub type SessionValues = HashMap<String, serde_json::Value>;

/// A persisted authenticated session.
///
/// The values map is opaque to the subsystem apart from the
/// [`SESSION_CLAIMS_KEY`] entry; an absent or null entry marks the session
/// as unauthenticated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    pub values: SessionValues,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: SessionId::new(),
            created_at: Utc::now(),
            values: HashMap::new(),
        }
    }

    /// Store identity claims under the well-known entry.
    pub fn set_claims(&mut self, claims: &Claims) -> Result<()> {
        let value = serde_json::to_value(claims).context("failed to serialize claims")?;
        self.values.insert(SESSION_CLAIMS_KEY.to_string(), value);
        Ok(())
    }

    /// Decode this session's identity claims.
    ///
    /// Returns `Ok(None)` for an unauthenticated session (entry absent or
    /// null) and an error when the entry exists but is not decodable as
    /// claims.
    pub fn claims(&self) -> Result<Option<Claims>> {
        match self.values.get(SESSION_CLAIMS_KEY) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .context("claims entry is not decodable as identity claims"),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity claims associated with an authenticated session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user identifier).
    pub sub: String,

    /// Issuer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Preferred username.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,

    /// Group memberships.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,

    /// Additional deployment-specific claims.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}
