//! A small pool of connections to one database file.
//!
//! Each request checks out its own [`Database`], so requests for different
//! users run in parallel while SQLite's write lock serializes the
//! immediate transactions that touch shared rows.  The same guarantee holds
//! when several server processes open the same file.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::database::Database;
use crate::error::{Result, StoreError};

/// Idle connections kept around between requests.
const DEFAULT_MAX_IDLE: usize = 8;

pub struct Store {
    path: PathBuf,
    idle: Mutex<Vec<Database>>,
    max_idle: usize,
}

impl Store {
    /// Open the database at `path`, running migrations eagerly.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let first = Database::open_at(&path)?;

        tracing::info!(path = %path.display(), "opened store");

        Ok(Self {
            path,
            idle: Mutex::new(vec![first]),
            max_idle: DEFAULT_MAX_IDLE,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` with a pooled connection.
    ///
    /// The connection is returned to the pool afterwards; an open
    /// transaction that `f` did not commit is rolled back when it drops.
    pub fn with_db<T, E>(
        &self,
        f: impl FnOnce(&mut Database) -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut db = self.checkout()?;
        let result = f(&mut db);
        self.checkin(db);
        result
    }

    fn checkout(&self) -> Result<Database> {
        let pooled = self
            .idle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop();
        match pooled {
            Some(db) => Ok(db),
            None => {
                tracing::debug!(path = %self.path.display(), "opening pooled connection");
                Database::open_at(&self.path)
            }
        }
    }

    fn checkin(&self, db: Database) {
        let mut idle = self
            .idle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if idle.len() < self.max_idle {
            idle.push(db);
        }
    }
}
