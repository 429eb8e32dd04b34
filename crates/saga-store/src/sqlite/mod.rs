//! `SQLite` session store.
//!
//! - **[`connection`]**: `r2d2` pool with per-connection pragmas
//! - **[`migrations`]**: embedded, version-tracked schema
//! - **[`repository`]**: stateless queries over a borrowed connection
//!
//! Blocking `rusqlite` calls run on the blocking thread pool.

pub mod connection;
pub mod migrations;
pub mod repository;

use std::path::Path;

use async_trait::async_trait;
use rusqlite::Connection;
use saga_core::{Session, SessionId};
use tracing::debug;

pub use connection::{ConnectionConfig, ConnectionPool};
pub use repository::SessionSummary;

use crate::errors::{Result, StoreError};
use crate::traits::SessionStore;

/// Session store backed by a pooled `SQLite` database.
#[derive(Clone)]
pub struct SqliteStore {
    pool: ConnectionPool,
}

impl SqliteStore {
    /// Open (creating if needed) the database file at `path` and migrate it.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with(path, &ConnectionConfig::default())
    }

    /// [`SqliteStore::open`] with explicit pool settings.
    pub fn open_with(path: &Path, config: &ConnectionConfig) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Unavailable(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        debug!(path = %path.display(), "opening session database");
        Self::from_pool(connection::new_file(path, config)?)
    }

    /// Fresh in-memory database.
    pub fn in_memory() -> Result<Self> {
        Self::from_pool(connection::new_in_memory(&ConnectionConfig::default())?)
    }

    fn from_pool(pool: ConnectionPool) -> Result<Self> {
        let conn = pool.get()?;
        let _ = migrations::run_migrations(&conn)?;
        drop(conn);
        Ok(Self { pool })
    }

    /// Stored sessions, most recently updated first.
    pub async fn list_sessions(&self, limit: Option<u32>) -> Result<Vec<SessionSummary>> {
        self.with_conn(move |conn| repository::list(conn, limit)).await
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await
        .map_err(|e| StoreError::Internal(format!("blocking store task failed: {e}")))?
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn get(&self, id: &SessionId) -> Result<Option<Session>> {
        let id = id.clone();
        self.with_conn(move |conn| repository::get(conn, id.as_str()))
            .await
    }

    async fn set(&self, session: &Session) -> Result<()> {
        let session = session.clone();
        self.with_conn(move |conn| repository::upsert(conn, &session))
            .await
    }

    async fn delete(&self, id: &SessionId) -> Result<()> {
        let id = id.clone();
        let removed = self
            .with_conn(move |conn| repository::delete(conn, id.as_str()))
            .await?;
        debug!(removed, "session delete");
        Ok(())
    }
}
