//! Durable storage for SlipGuard.
//!
//! One SQLite database holds both the issuer/merchant template store (the
//! source of truth the caches project from) and the learning-record queue
//! the batch trainer consumes. Caches are disposable; this is not.

pub mod sqlite;

pub use sqlite::SqliteStore;
