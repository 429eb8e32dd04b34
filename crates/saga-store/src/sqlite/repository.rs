//! Session table queries.
//!
//! Stateless functions over a borrowed connection. The full session is the
//! JSON `snapshot` column; the remaining columns only serve listings.

use chrono::SecondsFormat;
use rusqlite::{Connection, OptionalExtension, params};
use saga_core::{Session, SessionId, SessionMode};

use crate::errors::Result;

/// Listing row for one stored session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSummary {
    /// Session ID.
    pub id: SessionId,
    /// Adventure mode.
    pub mode: SessionMode,
    /// Completed turns.
    pub turn_count: u64,
    /// Creation time (RFC 3339).
    pub created_at: String,
    /// Last update time (RFC 3339).
    pub updated_at: String,
}

fn timestamp(t: &chrono::DateTime<chrono::Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Insert or replace a snapshot.
pub fn upsert(conn: &Connection, session: &Session) -> Result<()> {
    let snapshot = serde_json::to_string(session)?;
    let turn_count = i64::try_from(session.turn_count()).unwrap_or(i64::MAX);
    let _ = conn.execute(
        "INSERT INTO sessions (id, mode, turn_count, created_at, updated_at, snapshot)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT(id) DO UPDATE SET
           mode = excluded.mode,
           turn_count = excluded.turn_count,
           updated_at = excluded.updated_at,
           snapshot = excluded.snapshot",
        params![
            session.id.as_str(),
            session.mode.as_str(),
            turn_count,
            timestamp(&session.created_at),
            timestamp(&session.updated_at),
            snapshot,
        ],
    )?;
    Ok(())
}

/// Load a snapshot.
pub fn get(conn: &Connection, id: &str) -> Result<Option<Session>> {
    let raw: Option<String> = conn
        .query_row("SELECT snapshot FROM sessions WHERE id = ?1", [id], |row| {
            row.get(0)
        })
        .optional()?;
    match raw {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

/// Delete a snapshot. Returns whether a row was removed.
pub fn delete(conn: &Connection, id: &str) -> Result<bool> {
    let changed = conn.execute("DELETE FROM sessions WHERE id = ?1", [id])?;
    Ok(changed > 0)
}

/// List sessions, most recently updated first.
pub fn list(conn: &Connection, limit: Option<u32>) -> Result<Vec<SessionSummary>> {
    let limit = limit.map_or(-1, i64::from);
    let mut stmt = conn.prepare(
        "SELECT id, mode, turn_count, created_at, updated_at
         FROM sessions
         ORDER BY updated_at DESC, id DESC
         LIMIT ?1",
    )?;
    let rows = stmt.query_map([limit], |row| {
        let mode: String = row.get(1)?;
        let turn_count: i64 = row.get(2)?;
        Ok(SessionSummary {
            id: SessionId::from(row.get::<_, String>(0)?),
            mode: if mode == SessionMode::Custom.as_str() {
                SessionMode::Custom
            } else {
                SessionMode::Standard
            },
            turn_count: u64::try_from(turn_count).unwrap_or(0),
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    })?;
    Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
}
