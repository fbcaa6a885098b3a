//! TLS client policy for the remote session cache connection.
//!
//! Builds the trust configuration from a verification-mode string and an
//! optional CA bundle. An unreadable bundle is a configuration error; a
//! bundle that parses to nothing degrades to the system trust store.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use redis::TlsCertificates;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::CertificateDer;
use std::path::Path;
use tracing::{debug, warn};

/// Trust policy applied to the cache connection.
pub struct CacheTlsPolicy {
    skip_verify: bool,
    root_bundle: Option<Vec<u8>>,
}

impl CacheTlsPolicy {
    /// Whether peer-certificate verification is disabled.
    pub fn skip_verify(&self) -> bool {
        self.skip_verify
    }

    /// The assembled root bundle as client certificates, when a CA bundle
    /// was configured. `None` leaves the client on its default trust store.
    pub fn certificates(&self) -> Option<TlsCertificates> {
        self.root_bundle.as_ref().map(|root| TlsCertificates {
            client_tls: None,
            root_cert: Some(root.clone()),
        })
    }
}

/// Build the cache trust policy.
///
/// `verification` values `none` and `false` disable peer verification;
/// `required` (or anything else) keeps it enabled. When `ca_bundle` is set,
/// the returned policy trusts the OS root store plus every certificate in
/// the bundle.
pub fn build_cache_tls(verification: &str, ca_bundle: Option<&Path>) -> Result<CacheTlsPolicy> {
    let skip_verify = matches!(verification.to_lowercase().as_str(), "none" | "false");

    let mut root_bundle = None;
    if let Some(path) = ca_bundle {
        // Start from the OS trust store; entries that fail to load are
        // skipped rather than failing the whole policy.
        let mut bundle = system_roots_pem();

        let pem = std::fs::read(path)
            .with_context(|| format!("failed to read CA bundle {}", path.display()))?;

        let mut appended = 0;
        for cert in CertificateDer::pem_slice_iter(&pem).flatten() {
            push_pem(&mut bundle, cert.as_ref());
            appended += 1;
        }
        if appended == 0 {
            warn!(
                path = %path.display(),
                "no certificates appended from CA bundle, using system roots only"
            );
        }
        root_bundle = Some(bundle);
    }

    Ok(CacheTlsPolicy {
        skip_verify,
        root_bundle,
    })
}

/// The OS trust store re-encoded as a PEM bundle. Load failures reduce the
/// bundle instead of erroring.
fn system_roots_pem() -> Vec<u8> {
    let loaded = rustls_native_certs::load_native_certs();
    if !loaded.errors.is_empty() {
        debug!(
            errors = loaded.errors.len(),
            "some system trust store entries failed to load"
        );
    }
    let mut pem = Vec::new();
    for cert in loaded.certs {
        push_pem(&mut pem, cert.as_ref());
    }
    pem
}

fn push_pem(out: &mut Vec<u8>, der: &[u8]) {
    out.extend_from_slice(b"-----BEGIN CERTIFICATE-----\n");
    let encoded = BASE64.encode(der);
    for chunk in encoded.as_bytes().chunks(64) {
        out.extend_from_slice(chunk);
        out.push(b'\n');
    }
    out.extend_from_slice(b"-----END CERTIFICATE-----\n");
}
