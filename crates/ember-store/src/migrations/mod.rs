//! Database migration runner.
//!
//! Migrations are executed in order every time a [`Database`](crate::Database)
//! is opened.  Each migration is guarded by a `user_version` pragma so it
//! runs exactly once.

pub mod v001_initial;
pub mod v002_match_blocking;

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.  Bump this and add a new migration module whenever
/// the schema changes.
pub const CURRENT_VERSION: u32 = 2;

/// Run all pending migrations against the open connection.
///
/// Reads `PRAGMA user_version` to find which migrations were already applied,
/// then executes the outstanding ones in order, each inside its own
/// transaction so a half-applied step never bumps the version.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let current: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    tracing::info!(
        current_version = current,
        target_version = CURRENT_VERSION,
        "checking database migrations"
    );

    if current < 1 {
        tracing::info!("applying migration v001_initial");
        apply(conn, 1, v001_initial::up)?;
    }

    if current < 2 {
        tracing::info!("applying migration v002_match_blocking");
        apply(conn, 2, v002_match_blocking::up)?;
    }

    Ok(())
}

fn apply(
    conn: &mut Connection,
    version: u32,
    up: fn(&Connection) -> std::result::Result<(), rusqlite::Error>,
) -> Result<()> {
    let tx = conn.transaction()?;
    up(&tx).map_err(|e| StoreError::Migration(format!("v{version:03}: {e}")))?;
    tx.pragma_update(None, "user_version", version)?;
    tx.commit()?;
    Ok(())
}
