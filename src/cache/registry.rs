//! Durable table of cache entries shared by every scrip process
//!
//! Backed by a SQLite database under the cache base directory. Each
//! operation opens its own connection and runs in a single IMMEDIATE
//! transaction, so the only cross-process synchronisation is SQLite's own
//! locking. Lock transitions are conditional updates: they apply only when
//! the row still matches the expected lease state.

use crate::cache::key::CacheKey;
use crate::error::{ScripError, ScripResult};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;
use tracing::debug;

/// How long a connection waits on SQLite's own file lock before failing
const BUSY_TIMEOUT: StdDuration = StdDuration::from_secs(10);

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS entries (
        key TEXT PRIMARY KEY,
        last_access INTEGER NOT NULL,
        reader_count INTEGER NOT NULL CHECK (reader_count >= 0),
        writer_held INTEGER NOT NULL CHECK (writer_held IN (0, 1)),
        CHECK (writer_held = 0 OR reader_count = 0)
    );
"#;

/// Current time at the precision stored in the registry (milliseconds)
pub fn now() -> DateTime<Utc> {
    from_millis(Utc::now().timestamp_millis())
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// Lease fields of a registry row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseState {
    /// Number of shared leases held
    pub readers: u32,
    /// Whether the exclusive lease is held
    pub writer: bool,
}

impl LeaseState {
    pub const UNLOCKED: Self = Self {
        readers: 0,
        writer: false,
    };

    pub const WRITER: Self = Self {
        readers: 0,
        writer: true,
    };

    pub const ONE_READER: Self = Self {
        readers: 1,
        writer: false,
    };

    pub fn is_locked(&self) -> bool {
        self.writer || self.readers > 0
    }
}

/// Predicate a row must satisfy for a conditional update or delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// Row is exactly in this state
    Exactly(LeaseState),
    /// No writer; any number of readers
    NoWriter,
    /// No writer and at least one reader
    HeldByReaders,
}

impl Expect {
    fn clause(&self) -> String {
        match self {
            Self::Exactly(state) => format!(
                "reader_count = {} AND writer_held = {}",
                state.readers,
                i64::from(state.writer)
            ),
            Self::NoWriter => "writer_held = 0 AND reader_count >= 0".to_string(),
            Self::HeldByReaders => "writer_held = 0 AND reader_count > 0".to_string(),
        }
    }
}

/// New lease fields written by a conditional update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Update {
    Set(LeaseState),
    AddReader,
    RemoveReader,
}

impl Update {
    fn clause(&self) -> String {
        match self {
            Self::Set(state) => format!(
                "reader_count = {}, writer_held = {}",
                state.readers,
                i64::from(state.writer)
            ),
            Self::AddReader => "reader_count = reader_count + 1".to_string(),
            Self::RemoveReader => "reader_count = reader_count - 1".to_string(),
        }
    }
}

/// One row of the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub last_access: DateTime<Utc>,
    pub reader_count: u32,
    pub writer_held: bool,
}

impl CacheEntry {
    pub fn state(&self) -> LeaseState {
        LeaseState {
            readers: self.reader_count,
            writer: self.writer_held,
        }
    }

    /// Time since the entry was last locked or unlocked
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.last_access
    }
}

/// Outcome of [`Registry::ensure`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ensured {
    /// The row did not exist and was inserted with the requested state
    pub created: bool,
    /// `last_access` of the row as found (or as inserted)
    pub last_access: DateTime<Utc>,
}

/// Handle to the registry database.
///
/// Holds only the path; connections are opened per operation and never
/// kept across calls.
#[derive(Debug, Clone)]
pub struct Registry {
    path: PathBuf,
}

impl Registry {
    /// Database file name inside the cache base directory
    pub const FILE_NAME: &'static str = "registry.db";

    /// Open (creating if needed) the registry under `base_dir`
    pub fn open(base_dir: &Path) -> ScripResult<Self> {
        fs::create_dir_all(base_dir).map_err(|e| {
            ScripError::io(format!("creating directory {}", base_dir.display()), e)
        })?;

        let registry = Self {
            path: base_dir.join(Self::FILE_NAME),
        };
        let conn = registry.connect()?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| ScripError::registry("initializing registry schema", e))?;

        debug!("Opened registry at {}", registry.path.display());
        Ok(registry)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> ScripResult<Connection> {
        let conn = Connection::open(&self.path).map_err(|e| {
            ScripError::registry(format!("opening {}", self.path.display()), e)
        })?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| ScripError::registry("setting busy timeout", e))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| ScripError::registry("enabling WAL", e))?;
        Ok(conn)
    }

    fn with_immediate_tx<T, F>(&self, context: &str, f: F) -> ScripResult<T>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> rusqlite::Result<T>,
    {
        let mut conn = self.connect()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| ScripError::registry(format!("{}: starting transaction", context), e))?;
        let result = f(&tx).map_err(|e| ScripError::registry(context, e))?;
        tx.commit()
            .map_err(|e| ScripError::registry(format!("{}: committing", context), e))?;
        Ok(result)
    }

    /// Insert a row in `initial` state if none exists for `key`.
    ///
    /// Returns whether the row was created and its current `last_access`.
    pub fn ensure(
        &self,
        key: &CacheKey,
        initial: LeaseState,
        now: DateTime<Utc>,
    ) -> ScripResult<Ensured> {
        self.with_immediate_tx("ensuring entry", |tx| {
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO entries (key, last_access, reader_count, writer_held)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    key.as_str(),
                    now.timestamp_millis(),
                    initial.readers,
                    initial.writer
                ],
            )?;
            if inserted == 1 {
                return Ok(Ensured {
                    created: true,
                    last_access: now,
                });
            }

            let last_access: i64 = tx.query_row(
                "SELECT last_access FROM entries WHERE key = ?1",
                params![key.as_str()],
                |row| row.get(0),
            )?;
            Ok(Ensured {
                created: false,
                last_access: from_millis(last_access),
            })
        })
    }

    /// Apply `update` (and set `last_access = now`) only if the row matches `expect`.
    ///
    /// Returns the row's previous `last_access` when exactly one row was
    /// updated, `None` when nothing matched.
    pub fn compare_and_swap(
        &self,
        key: &CacheKey,
        expect: Expect,
        update: Update,
        now: DateTime<Utc>,
    ) -> ScripResult<Option<DateTime<Utc>>> {
        let predicate = expect.clause();
        let select = format!(
            "SELECT last_access FROM entries WHERE key = ?1 AND {}",
            predicate
        );
        let sql = format!(
            "UPDATE entries SET {}, last_access = ?1 WHERE key = ?2 AND {}",
            update.clause(),
            predicate
        );

        self.with_immediate_tx("updating entry", |tx| {
            let prior: Option<i64> = tx
                .query_row(&select, params![key.as_str()], |row| row.get(0))
                .optional()?;
            let Some(prior) = prior else {
                return Ok(None);
            };

            let changed = tx.execute(&sql, params![now.timestamp_millis(), key.as_str()])?;
            Ok((changed == 1).then(|| from_millis(prior)))
        })
    }

    /// Delete the row only if it matches `expect`; returns rows removed
    pub fn delete(&self, key: &CacheKey, expect: Expect) -> ScripResult<usize> {
        let sql = format!(
            "DELETE FROM entries WHERE key = ?1 AND {}",
            expect.clause()
        );
        self.with_immediate_tx("deleting entry", |tx| {
            tx.execute(&sql, params![key.as_str()])
        })
    }

    /// Reset a row to unlocked regardless of its lease state.
    ///
    /// Only for recovering leases leaked by a crashed process.
    pub fn force_unlock(&self, key: &CacheKey, now: DateTime<Utc>) -> ScripResult<usize> {
        self.with_immediate_tx("force unlocking entry", |tx| {
            tx.execute(
                "UPDATE entries SET reader_count = 0, writer_held = 0, last_access = ?1
                 WHERE key = ?2",
                params![now.timestamp_millis(), key.as_str()],
            )
        })
    }

    /// Fetch a single row
    pub fn get(&self, key: &CacheKey) -> ScripResult<Option<CacheEntry>> {
        let conn = self.connect()?;
        let row = conn
            .query_row(
                "SELECT key, last_access, reader_count, writer_held FROM entries WHERE key = ?1",
                params![key.as_str()],
                read_row,
            )
            .optional()
            .map_err(|e| ScripError::registry("reading entry", e))?;

        row.map(RawEntry::into_entry).transpose()
    }

    /// All rows, oldest access first
    pub fn list(&self) -> ScripResult<Vec<CacheEntry>> {
        let conn = self.connect()?;
        let mut stmt = conn
            .prepare(
                "SELECT key, last_access, reader_count, writer_held FROM entries
                 ORDER BY last_access",
            )
            .map_err(|e| ScripError::registry("listing entries", e))?;
        let raw = stmt
            .query_map([], read_row)
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(|e| ScripError::registry("listing entries", e))?;

        raw.into_iter().map(RawEntry::into_entry).collect()
    }

    #[cfg(test)]
    pub(crate) fn set_last_access(&self, key: &CacheKey, at: DateTime<Utc>) -> ScripResult<()> {
        self.with_immediate_tx("backdating entry", |tx| {
            tx.execute(
                "UPDATE entries SET last_access = ?1 WHERE key = ?2",
                params![at.timestamp_millis(), key.as_str()],
            )
        })?;
        Ok(())
    }
}

struct RawEntry {
    key: String,
    last_access: i64,
    reader_count: u32,
    writer_held: bool,
}

impl RawEntry {
    fn into_entry(self) -> ScripResult<CacheEntry> {
        Ok(CacheEntry {
            key: CacheKey::parse(&self.key)?,
            last_access: from_millis(self.last_access),
            reader_count: self.reader_count,
            writer_held: self.writer_held,
        })
    }
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawEntry> {
    Ok(RawEntry {
        key: row.get(0)?,
        last_access: row.get(1)?,
        reader_count: row.get(2)?,
        writer_held: row.get(3)?,
    })
}
