//! Session persistence, cookie policy, and bulk invalidation.
//!
//! The store factory selects exactly one backend per process (local
//! filesystem for standalone outposts, a shared remote cache for embedded
//! ones) and applies the session-cookie security attributes. Bulk logout
//! scans whichever backend is active and deletes sessions matching a
//! predicate over decoded identity claims.

pub mod backend;
pub mod cache;
pub mod config;
pub mod filesystem;
mod logout;
pub mod store;
pub mod types;

pub use backend::{BackendKind, SessionBackend};
pub use cache::CACHE_KEY_PREFIX;
pub use config::{AppConfig, CacheConfig, DeploymentMode, OutpostConfig};
pub use filesystem::SESSION_FILE_PREFIX;
pub use store::{cookie_max_age, get_store, SessionOptions, SessionStore};
pub use types::{Claims, Session, SessionId, SessionValues, SESSION_CLAIMS_KEY};
