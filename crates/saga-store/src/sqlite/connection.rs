//! `SQLite` connection pool.
//!
//! Every new connection gets WAL journaling, a busy timeout and
//! `synchronous = NORMAL` via [`PragmaCustomizer`].

use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::errors::Result;

/// Alias for the connection pool type.
pub type ConnectionPool = Pool<SqliteConnectionManager>;

/// Pool settings.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Maximum pool size (default: 4).
    pub pool_size: u32,
    /// Busy timeout in milliseconds (default: 5000).
    pub busy_timeout_ms: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            pool_size: 4,
            busy_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug)]
struct PragmaCustomizer {
    busy_timeout_ms: u32,
}

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for PragmaCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = WAL;\
             PRAGMA busy_timeout = {};\
             PRAGMA synchronous = NORMAL;",
            self.busy_timeout_ms
        ))
    }
}

fn builder(config: &ConnectionConfig) -> r2d2::Builder<SqliteConnectionManager> {
    Pool::builder()
        .max_size(config.pool_size)
        .connection_timeout(Duration::from_secs(5))
        .connection_customizer(Box::new(PragmaCustomizer {
            busy_timeout_ms: config.busy_timeout_ms,
        }))
}

/// Single-connection in-memory pool.
///
/// Each in-memory connection is its own database, so the pool holds exactly
/// one connection and never recycles it.
pub fn new_in_memory(config: &ConnectionConfig) -> Result<ConnectionPool> {
    let pool = builder(config)
        .max_size(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .build(SqliteConnectionManager::memory())?;
    Ok(pool)
}

/// File-backed pool.
pub fn new_file(path: &std::path::Path, config: &ConnectionConfig) -> Result<ConnectionPool> {
    let pool = builder(config).build(SqliteConnectionManager::file(path))?;
    Ok(pool)
}
