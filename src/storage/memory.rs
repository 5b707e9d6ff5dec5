use std::io;

use indexmap::IndexMap;
use parking_lot::Mutex;
use time::OffsetDateTime;

use super::{Note, NoteId, NoteStore, NoteUpdate, StoreError, StoreResult};

/// In-process note store for tests and ephemeral sessions.
///
/// Identifiers come from a monotonic counter, so a deleted id is never
/// handed out again. `set_fail_writes` makes every mutating call fail with
/// `StoreError::Unavailable`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    notes: IndexMap<NoteId, Note>,
    last_id: i64,
    fail_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.lock().fail_writes = fail;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: NoteId) -> bool {
        self.inner.lock().notes.contains_key(&id)
    }

    /// Inserts a fully formed note, bypassing `create`. Returns its id.
    pub fn insert(&self, title: &str, body: &str) -> NoteId {
        let mut inner = self.inner.lock();
        let id = inner.next_id();
        let now = OffsetDateTime::now_utc();
        inner.notes.insert(
            id,
            Note {
                id,
                title: title.to_owned(),
                body: body.to_owned(),
                created_at: now,
                modified_at: now,
            },
        );
        id
    }
}

impl Inner {
    fn next_id(&mut self) -> NoteId {
        self.last_id += 1;
        NoteId::new(self.last_id)
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.fail_writes {
            return Err(StoreError::unavailable(io::Error::new(
                io::ErrorKind::Other,
                "simulated write failure",
            )));
        }
        Ok(())
    }
}

impl NoteStore for MemoryStore {
    fn create(&self) -> StoreResult<NoteId> {
        let mut inner = self.inner.lock();
        inner.check_writable()?;
        let id = inner.next_id();
        let now = OffsetDateTime::now_utc();
        inner.notes.insert(
            id,
            Note {
                id,
                title: String::new(),
                body: String::new(),
                created_at: now,
                modified_at: now,
            },
        );
        Ok(id)
    }

    fn read(&self, id: NoteId) -> StoreResult<Note> {
        self.inner
            .lock()
            .notes
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    fn update(&self, id: NoteId, update: &NoteUpdate) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.check_writable()?;
        let note = inner.notes.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if let Some(title) = &update.title {
            note.title.clone_from(title);
        }
        if let Some(body) = &update.body {
            note.body.clone_from(body);
        }
        note.modified_at = update.modified_at;
        Ok(())
    }

    fn delete(&self, id: NoteId) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.check_writable()?;
        inner
            .notes
            .shift_remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn ids_are_monotonic_across_deletes() {
        let store = MemoryStore::new();
        let a = store.create().unwrap();
        let b = store.create().unwrap();
        store.delete(b).unwrap();
        let c = store.create().unwrap();
        assert!(a < b && b < c);
        assert_eq!(store.len(), 2);
        assert!(!store.contains(b));
    }

    #[test]
    fn update_applies_only_present_fields() {
        let store = MemoryStore::new();
        let id = store.insert("Title", "Body");
        let stamp = OffsetDateTime::now_utc() + time::Duration::minutes(1);
        store.update(id, &NoteUpdate::new(stamp).body("New body")).unwrap();

        let note = store.read(id).unwrap();
        assert_eq!(note.title, "Title");
        assert_eq!(note.body, "New body");
        assert_eq!(note.modified_at, stamp);
    }

    #[test]
    fn failing_writes_leave_records_untouched() {
        let store = MemoryStore::new();
        let id = store.insert("Keep", "me");
        store.set_fail_writes(true);

        assert_matches!(store.create(), Err(StoreError::Unavailable(_)));
        assert_matches!(
            store.update(id, &NoteUpdate::new(OffsetDateTime::now_utc()).body("lost")),
            Err(StoreError::Unavailable(_))
        );
        assert_matches!(store.delete(id), Err(StoreError::Unavailable(_)));
        assert_eq!(store.read(id).unwrap().body, "me");

        store.set_fail_writes(false);
        assert!(store.delete(id).is_ok());
        assert_matches!(store.delete(id), Err(StoreError::NotFound(_)));
    }
}
