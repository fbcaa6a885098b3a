//! Session codecs derived from application cookie secrets.
//!
//! Every application owns an ordered list of codecs; encode always uses the
//! first, decode tries each in order so that rotated secrets keep old
//! sessions readable. The [`CodecRegistry`] aggregates the codecs of all
//! configured applications for decode-only use, because a stored session
//! does not identify which application wrote it.

use anyhow::{anyhow, Context, Result};
use jsonwebtoken::{
    decode, encode, get_current_timestamp, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

use crate::session::config::AppConfig;

/// Default bound on the encoded payload length, in bytes.
///
/// Stores that persist payloads outside the cookie raise this; see
/// [`Codec::set_max_length`].
pub const DEFAULT_MAX_LENGTH: usize = 4096;

/// A sign/verify key pair derived from one application cookie secret.
pub struct Codec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    /// Validity window in seconds applied to signed payloads; 0 disables
    /// the window (decode-only codecs).
    max_age: u64,
    max_length: usize,
}

/// Signed wrapper around an encoded value. The session name is bound into
/// the signature via `sub`, so a payload minted under one cookie name never
/// verifies under another.
#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    sub: String,
    iat: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    exp: Option<u64>,
    values: T,
}

impl Codec {
    /// Derive a codec from a cookie secret. The HS256 signing key is the
    /// SHA-256 digest of the secret, so identical secrets always yield
    /// interchangeable codecs.
    pub fn from_secret(secret: &[u8], max_age: u64) -> Self {
        let key = Sha256::digest(secret);
        Self {
            encoding: EncodingKey::from_secret(key.as_slice()),
            decoding: DecodingKey::from_secret(key.as_slice()),
            max_age,
            max_length: DEFAULT_MAX_LENGTH,
        }
    }

    /// Raise or lower the bound on the encoded payload length.
    pub fn set_max_length(&mut self, max_length: usize) {
        self.max_length = max_length;
    }

    /// Sign `values` under `name`. When the codec carries a validity
    /// window, the payload expires `max_age` seconds from now.
    pub fn encode<T: Serialize>(&self, name: &str, values: &T) -> Result<String> {
        let now = get_current_timestamp();
        let envelope = Envelope {
            sub: name.to_string(),
            iat: now,
            exp: (self.max_age > 0).then(|| now + self.max_age),
            values,
        };
        let raw = encode(&Header::default(), &envelope, &self.encoding)
            .context("failed to sign session payload")?;
        if raw.len() > self.max_length {
            return Err(anyhow!(
                "encoded session is {} bytes, above the {} byte limit",
                raw.len(),
                self.max_length
            ));
        }
        Ok(raw)
    }

    /// Verify `raw` against this codec's key, name binding, and validity
    /// window, and deserialize the signed value.
    pub fn decode<T: DeserializeOwned>(&self, name: &str, raw: &str) -> Result<T> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.sub = Some(name.to_string());
        if self.max_age == 0 {
            validation.validate_exp = false;
            validation.required_spec_claims = HashSet::new();
        }
        let data = decode::<Envelope<T>>(raw, &self.decoding, &validation)
            .context("session payload failed verification")?;
        Ok(data.claims.values)
    }
}

/// Ordered codec list for one application.
///
/// The first codec signs new payloads; the rest only verify, so a rotated
/// secret can be kept at the tail until old sessions age out.
pub fn codecs_for_app(max_age: u64, secret: &str) -> Vec<Codec> {
    vec![Codec::from_secret(secret.as_bytes(), max_age)]
}

/// Decode with the first codec in `codecs` that verifies `raw`.
pub fn decode_any<T: DeserializeOwned>(name: &str, raw: &str, codecs: &[Codec]) -> Result<T> {
    for codec in codecs {
        if let Ok(values) = codec.decode(name, raw) {
            return Ok(values);
        }
    }
    Err(anyhow!(
        "session payload does not verify against any configured codec"
    ))
}

/// Immutable decode-only snapshot of every configured application's codecs.
///
/// Rebuild the snapshot whenever application configuration changes; readers
/// holding the old one keep a consistent view.
pub struct CodecRegistry {
    codecs: Vec<Codec>,
}

impl CodecRegistry {
    /// Build the snapshot from the currently configured applications. The
    /// codecs carry no validity window: the registry is used to decode
    /// sessions regardless of age, never to mint them.
    pub fn from_apps(apps: &[AppConfig]) -> Self {
        let codecs = apps
            .iter()
            .flat_map(|app| codecs_for_app(0, &app.cookie_secret))
            .collect();
        Self { codecs }
    }

    pub fn all_codecs(&self) -> &[Codec] {
        &self.codecs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn app(name: &str, secret: &str) -> AppConfig {
        AppConfig {
            name: name.to_string(),
            cookie_secret: secret.to_string(),
            cookie_domain: None,
            access_token_validity: None,
            session_cookie_name: "outpost_session".to_string(),
        }
    }

    fn sample_values() -> HashMap<String, serde_json::Value> {
        let mut values = HashMap::new();
        values.insert("claims".to_string(), serde_json::json!({"sub": "alice"}));
        values.insert("state".to_string(), serde_json::json!("xyz"));
        values
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let codecs = codecs_for_app(300, "app-secret");
        let values = sample_values();

        let raw = codecs[0].encode("outpost_session", &values).unwrap();
        let decoded: HashMap<String, serde_json::Value> =
            codecs[0].decode("outpost_session", &raw).unwrap();
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_registry_decodes_any_configured_app() {
        let apps = vec![app("app-a", "secret-a"), app("app-b", "secret-b")];
        let registry = CodecRegistry::from_apps(&apps);

        let codecs = codecs_for_app(300, "secret-b");
        let raw = codecs[0].encode("outpost_session", &sample_values()).unwrap();

        let decoded: HashMap<String, serde_json::Value> =
            decode_any("outpost_session", &raw, registry.all_codecs()).unwrap();
        assert_eq!(decoded, sample_values());
    }

    #[test]
    fn test_registry_without_secret_fails_cleanly() {
        let registry = CodecRegistry::from_apps(&[app("app-a", "secret-a")]);

        let codecs = codecs_for_app(300, "unrelated-secret");
        let raw = codecs[0].encode("outpost_session", &sample_values()).unwrap();

        let result: Result<HashMap<String, serde_json::Value>> =
            decode_any("outpost_session", &raw, registry.all_codecs());
        assert!(result.is_err());
    }

    #[test]
    fn test_name_binding_rejects_other_names() {
        let codecs = codecs_for_app(300, "app-secret");
        let raw = codecs[0].encode("outpost_session", &sample_values()).unwrap();

        let result: Result<HashMap<String, serde_json::Value>> =
            codecs[0].decode("other_cookie", &raw);
        assert!(result.is_err());
    }

    #[test]
    fn test_unbounded_codec_decodes_bounded_payload() {
        // The registry derives codecs without a validity window; they must
        // still accept payloads minted with one.
        let signing = codecs_for_app(300, "app-secret");
        let raw = signing[0].encode("outpost_session", &sample_values()).unwrap();

        let verifying = codecs_for_app(0, "app-secret");
        let decoded: HashMap<String, serde_json::Value> =
            verifying[0].decode("outpost_session", &raw).unwrap();
        assert_eq!(decoded, sample_values());
    }

    #[test]
    fn test_max_length_enforced_and_liftable() {
        let mut codec = Codec::from_secret(b"app-secret", 0);
        codec.set_max_length(16);
        assert!(codec.encode("outpost_session", &sample_values()).is_err());

        codec.set_max_length(usize::MAX);
        assert!(codec.encode("outpost_session", &sample_values()).is_ok());
    }
}
