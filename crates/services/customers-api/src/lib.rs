//! A small customer registry backed by PostgreSQL.
//!
//! New customers are validated against the GitHub users API before they are
//! stored. The crate is both a binary and a library so tests can run the
//! service in-process.

use sqlx::migrate::Migrator;

pub mod config;
pub mod ctx;
pub mod db;
pub mod github;
pub mod handlers;
pub mod service;

/// Schema migrations of the service, embedded at compile time.
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Directory holding the service's migration files.
pub const MIGRATIONS_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/migrations");
