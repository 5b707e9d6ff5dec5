use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::num::ParseIntError;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use crate::config::{ConfigPaths, StorageOptions};

pub mod memory;
mod schema;

pub use memory::MemoryStore;

pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Opaque note identifier, assigned by the store and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(i64);

impl NoteId {
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NoteId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.trim().trim_start_matches('#').parse().map(Self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Note {
    pub id: NoteId,
    pub title: String,
    pub body: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub modified_at: OffsetDateTime,
}

/// Field set for a single-record write. `None` leaves the stored value as is;
/// `modified_at` is always written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteUpdate {
    pub title: Option<String>,
    pub body: Option<String>,
    pub modified_at: OffsetDateTime,
}

impl NoteUpdate {
    pub fn new(modified_at: OffsetDateTime) -> Self {
        Self {
            title: None,
            body: None,
            modified_at,
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("note {0} not found")]
    NotFound(NoteId),
    #[error("note store unavailable")]
    Unavailable(#[source] BoxError),
}

impl StoreError {
    pub fn unavailable(err: impl Into<BoxError>) -> Self {
        Self::Unavailable(err.into())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Durable record store consumed by editing sessions.
///
/// Implementations must make `update` and `delete` atomic per record, and
/// `read` must observe the most recent committed `update`.
pub trait NoteStore {
    /// Allocates a new empty record and returns its identifier.
    fn create(&self) -> StoreResult<NoteId>;
    fn read(&self, id: NoteId) -> StoreResult<Note>;
    fn update(&self, id: NoteId, update: &NoteUpdate) -> StoreResult<()>;
    fn delete(&self, id: NoteId) -> StoreResult<()>;
}

impl<T: NoteStore + ?Sized> NoteStore for &T {
    fn create(&self) -> StoreResult<NoteId> {
        (**self).create()
    }

    fn read(&self, id: NoteId) -> StoreResult<Note> {
        (**self).read(id)
    }

    fn update(&self, id: NoteId, update: &NoteUpdate) -> StoreResult<()> {
        (**self).update(id, update)
    }

    fn delete(&self, id: NoteId) -> StoreResult<()> {
        (**self).delete(id)
    }
}

impl<T: NoteStore + ?Sized> NoteStore for Arc<T> {
    fn create(&self) -> StoreResult<NoteId> {
        (**self).create()
    }

    fn read(&self, id: NoteId) -> StoreResult<Note> {
        (**self).read(id)
    }

    fn update(&self, id: NoteId, update: &NoteUpdate) -> StoreResult<()> {
        (**self).update(id, update)
    }

    fn delete(&self, id: NoteId) -> StoreResult<()> {
        (**self).delete(id)
    }
}

/// SQLite-backed note store. Cheap to clone; every call opens its own
/// connection and issues a single statement.
#[derive(Debug, Clone)]
pub struct StorageHandle {
    db_path: Arc<PathBuf>,
    options: Arc<StorageOptions>,
}

impl StorageHandle {
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&*self.db_path)
            .with_context(|| format!("opening database {}", self.db_path.display()))?;
        prepare_connection(&conn, &self.options)?;
        Ok(conn)
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.connect()?;
        f(&conn)
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }

    fn try_create(&self) -> Result<NoteId> {
        self.with_connection(|conn| {
            let now = to_millis(OffsetDateTime::now_utc());
            conn.execute(
                "INSERT INTO notes (title, body, created_at, modified_at)
                 VALUES ('', '', ?1, ?1)",
                params![now],
            )
            .context("inserting empty note")?;
            Ok(NoteId::new(conn.last_insert_rowid()))
        })
    }

    fn try_read(&self, id: NoteId) -> Result<Option<Note>> {
        self.with_connection(|conn| {
            conn.query_row(
                "SELECT id, title, body, created_at, modified_at
                 FROM notes
                 WHERE id = ?1",
                params![id.get()],
                note_from_row,
            )
            .optional()
            .with_context(|| format!("reading note {id}"))
        })
    }

    fn try_update(&self, id: NoteId, update: &NoteUpdate) -> Result<usize> {
        self.with_connection(|conn| {
            conn.execute(
                "UPDATE notes
                 SET title = COALESCE(?1, title),
                     body = COALESCE(?2, body),
                     modified_at = ?3
                 WHERE id = ?4",
                params![
                    update.title.as_deref(),
                    update.body.as_deref(),
                    to_millis(update.modified_at),
                    id.get()
                ],
            )
            .with_context(|| format!("updating note {id}"))
        })
    }

    fn try_delete(&self, id: NoteId) -> Result<usize> {
        self.with_connection(|conn| {
            conn.execute("DELETE FROM notes WHERE id = ?1", params![id.get()])
                .with_context(|| format!("deleting note {id}"))
        })
    }
}

impl NoteStore for StorageHandle {
    fn create(&self) -> StoreResult<NoteId> {
        let id = self.try_create().map_err(StoreError::unavailable)?;
        tracing::trace!(note_id = %id, "created note row");
        Ok(id)
    }

    fn read(&self, id: NoteId) -> StoreResult<Note> {
        self.try_read(id)
            .map_err(StoreError::unavailable)?
            .ok_or(StoreError::NotFound(id))
    }

    fn update(&self, id: NoteId, update: &NoteUpdate) -> StoreResult<()> {
        match self.try_update(id, update).map_err(StoreError::unavailable)? {
            0 => Err(StoreError::NotFound(id)),
            _ => Ok(()),
        }
    }

    fn delete(&self, id: NoteId) -> StoreResult<()> {
        match self.try_delete(id).map_err(StoreError::unavailable)? {
            0 => Err(StoreError::NotFound(id)),
            _ => Ok(()),
        }
    }
}

fn note_from_row(row: &Row<'_>) -> rusqlite::Result<Note> {
    Ok(Note {
        id: NoteId::new(row.get(0)?),
        title: row.get(1)?,
        body: row.get(2)?,
        created_at: timestamp_column(row, 3)?,
        modified_at: timestamp_column(row, 4)?,
    })
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<OffsetDateTime> {
    let millis: i64 = row.get(idx)?;
    from_millis(millis)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(err)))
}

pub(crate) fn to_millis(ts: OffsetDateTime) -> i64 {
    (ts.unix_timestamp_nanos() / 1_000_000) as i64
}

pub(crate) fn from_millis(
    millis: i64,
) -> std::result::Result<OffsetDateTime, time::error::ComponentRange> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
}

pub fn init(paths: &ConfigPaths, storage: &StorageOptions) -> Result<StorageHandle> {
    let db_path = &paths.database_path;
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    let conn = Connection::open(db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;
    prepare_connection(&conn, storage)?;
    schema::apply(&conn)?;
    tracing::debug!(path = %db_path.display(), "note store ready");
    Ok(StorageHandle {
        db_path: Arc::new(db_path.clone()),
        options: Arc::new(storage.clone()),
    })
}

fn prepare_connection(conn: &Connection, storage: &StorageOptions) -> Result<()> {
    conn.busy_timeout(Duration::from_millis(storage.busy_timeout_ms))
        .context("setting busy timeout")?;
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("setting journal_mode=WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("setting synchronous=NORMAL")?;
    conn.pragma_update(
        None,
        "wal_autocheckpoint",
        storage.wal_autocheckpoint.to_string(),
    )
    .context("setting wal_autocheckpoint")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigPaths, StorageOptions};
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    fn temp_paths(root: &TempDir) -> ConfigPaths {
        let base = root.path();
        let config_dir = base.join("config");
        let data_dir = base.join("data");
        ConfigPaths {
            config_dir: config_dir.clone(),
            config_file: config_dir.join("config.toml"),
            data_dir: data_dir.clone(),
            database_path: data_dir.join("notes.db"),
        }
    }

    fn init_storage() -> anyhow::Result<(TempDir, StorageHandle)> {
        let temp = TempDir::new()?;
        let paths = temp_paths(&temp);
        paths.ensure_directories()?;
        let storage = init(&paths, &StorageOptions::default())?;
        Ok((temp, storage))
    }

    #[test]
    fn create_allocates_empty_note() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let id = storage.create()?;
        let note = storage.read(id)?;
        assert_eq!(note.id, id);
        assert!(note.title.is_empty());
        assert!(note.body.is_empty());
        assert_eq!(note.created_at, note.modified_at);
        Ok(())
    }

    #[test]
    fn update_leaves_missing_fields_untouched() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let id = storage.create()?;
        let first = OffsetDateTime::now_utc();
        storage.update(id, &NoteUpdate::new(first).title("Plan").body("draft"))?;

        let later = first + time::Duration::seconds(5);
        storage.update(id, &NoteUpdate::new(later).body("final"))?;

        let note = storage.read(id)?;
        assert_eq!(note.title, "Plan");
        assert_eq!(note.body, "final");
        assert_eq!(to_millis(note.modified_at), to_millis(later));
        assert!(note.created_at <= note.modified_at);
        Ok(())
    }

    #[test]
    fn missing_records_report_not_found() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let ghost = NoteId::new(4242);
        assert_matches!(storage.read(ghost), Err(StoreError::NotFound(id)) if id == ghost);
        assert_matches!(
            storage.update(ghost, &NoteUpdate::new(OffsetDateTime::now_utc()).body("x")),
            Err(StoreError::NotFound(_))
        );
        assert_matches!(storage.delete(ghost), Err(StoreError::NotFound(_)));
        Ok(())
    }

    #[test]
    fn deleted_ids_are_never_reused() -> anyhow::Result<()> {
        let (_temp, storage) = init_storage()?;
        let first = storage.create()?;
        let second = storage.create()?;
        storage.delete(second)?;
        let third = storage.create()?;
        assert!(third > second, "expected {third} to be newer than {second}");
        assert_matches!(storage.read(second), Err(StoreError::NotFound(_)));
        assert_matches!(storage.delete(second), Err(StoreError::NotFound(_)));
        assert!(storage.read(first).is_ok());
        Ok(())
    }

    #[test]
    fn records_survive_reopening_the_database() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let paths = temp_paths(&temp);
        paths.ensure_directories()?;
        let id = {
            let storage = init(&paths, &StorageOptions::default())?;
            let id = storage.create()?;
            storage.update(
                id,
                &NoteUpdate::new(OffsetDateTime::now_utc())
                    .title("Kept")
                    .body("across restarts"),
            )?;
            id
        };

        let reopened = init(&paths, &StorageOptions::default())?;
        let note = reopened.read(id)?;
        assert_eq!(note.title, "Kept");
        assert_eq!(note.body, "across restarts");
        Ok(())
    }

    #[test]
    fn note_ids_parse_with_optional_hash_prefix() {
        assert_eq!("#12".parse::<NoteId>().ok(), Some(NoteId::new(12)));
        assert_eq!(" 7 ".parse::<NoteId>().ok(), Some(NoteId::new(7)));
        assert!("seven".parse::<NoteId>().is_err());
    }
}
