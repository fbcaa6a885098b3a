//! Session management for the outpost authentication reverse-proxy.
//!
//! This crate decides how authenticated-session state is persisted (local
//! filesystem or a shared remote cache), configures the security attributes
//! of the session cookie, and implements bulk session invalidation driven
//! by a predicate over decoded identity claims.

pub mod codecs;
pub mod session;
pub mod tls;

pub use codecs::{codecs_for_app, decode_any, Codec, CodecRegistry};
pub use session::{
    cookie_max_age, get_store, AppConfig, BackendKind, CacheConfig, Claims, DeploymentMode,
    OutpostConfig, Session, SessionBackend, SessionId, SessionOptions, SessionStore,
};
pub use tls::{build_cache_tls, CacheTlsPolicy};
