//! Editing-session lifecycle for a single note.
//!
//! A [`SessionController`] owns one [`EditSession`] and a handle to a
//! [`NoteStore`]. It decides when the target record is created, committed,
//! or discarded:
//!
//! - `OPEN(INSERTING)` moves to `OPEN(EDITING)` after the first commit of
//!   content (`save`, `import_from_clipboard_record`, or `finalize`).
//! - Any open session moves to `CLOSED` through `delete` or `finalize`.
//! - `finalize` runs once per session; later calls are no-ops.

use thiserror::Error;
use time::OffsetDateTime;

use crate::config::SessionOptions;
use crate::storage::{NoteId, NoteStore, NoteUpdate, StoreError};

mod state;
mod title;

pub use state::{char_count, EditSession, SessionMode};
pub use title::{derive_title, TITLE_MAX_CHARS};

use state::Phase;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("note {0} does not exist")]
    NotFound(NoteId),
    #[error(transparent)]
    StoreUnavailable(StoreError),
    #[error("note has neither a title nor a body")]
    EmptyNote,
    #[error("note {0} was already deleted")]
    AlreadyDeleted(NoteId),
    #[error("editing session for note {0} is already closed")]
    Closed(NoteId),
}

impl SessionError {
    /// Recoverable errors leave the session usable; the caller may prompt
    /// the user and carry on.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::EmptyNote | Self::AlreadyDeleted(_))
    }
}

impl From<StoreError> for SessionError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::StoreUnavailable(other),
        }
    }
}

/// How a session ended, as reported by [`SessionController::finalize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// Buffers were written to the target record.
    Committed(NoteId),
    /// The empty note was removed; the caller should treat the edit as
    /// cancelled.
    Discarded(NoteId),
    /// Nothing changed since the session opened, so nothing was written.
    Unchanged(NoteId),
    /// The target record no longer existed.
    Missing(NoteId),
    /// `finalize` had already run, or the note was explicitly deleted.
    AlreadyClosed,
}

impl FinalizeOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Discarded(_))
    }
}

/// Request that starts a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchIntent {
    Edit(NoteId),
    Insert { template: Option<NoteId> },
    Paste { source: Option<NoteId>, text: String },
}

#[derive(Debug)]
pub struct SessionController<S> {
    store: S,
    options: SessionOptions,
    session: EditSession,
}

impl<S: NoteStore> SessionController<S> {
    /// Opens an existing note for editing.
    pub fn open_for_edit(store: S, id: NoteId) -> Result<Self, SessionError> {
        let note = store.read(id)?;
        tracing::debug!(note_id = %id, "opened note for editing");
        Ok(Self {
            store,
            options: SessionOptions::default(),
            session: EditSession::new(SessionMode::Editing, id, note.title, note.body),
        })
    }

    /// Creates a placeholder record and opens it in insert mode.
    ///
    /// A `template` seeds the buffers (not the record). It is read before
    /// anything is created, so a missing template leaves the store untouched.
    pub fn open_for_insert(store: S, template: Option<NoteId>) -> Result<Self, SessionError> {
        let (title, body) = match template {
            Some(template_id) => {
                let note = store.read(template_id)?;
                (note.title, note.body)
            }
            None => (String::new(), String::new()),
        };
        let id = store.create()?;
        tracing::debug!(note_id = %id, ?template, "opened placeholder note for insert");
        Ok(Self {
            store,
            options: SessionOptions::default(),
            session: EditSession::new(SessionMode::Inserting, id, title, body),
        })
    }

    pub fn launch(store: S, intent: LaunchIntent) -> Result<Self, SessionError> {
        match intent {
            LaunchIntent::Edit(id) => Self::open_for_edit(store, id),
            LaunchIntent::Insert { template } => Self::open_for_insert(store, template),
            LaunchIntent::Paste { source, text } => {
                let mut controller = Self::open_for_insert(store, None)?;
                if let Err(err) = controller.import_from_clipboard_record(source, &text) {
                    controller.abandon_placeholder();
                    return Err(err);
                }
                Ok(controller)
            }
        }
    }

    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn session(&self) -> &EditSession {
        &self.session
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn target_id(&self) -> NoteId {
        self.session.target_id()
    }

    pub fn edit_title(&mut self, text: impl Into<String>) {
        self.session.set_title(text.into());
    }

    pub fn edit_body(&mut self, text: impl Into<String>) {
        self.session.set_body(text.into());
    }

    /// Imports pasted content into the session and commits it at once.
    ///
    /// Content comes from `source` when it names an existing note, otherwise
    /// from `raw_text` with no title. A missing title is derived from the
    /// body. An empty source title counts as missing too, so a pasted copy
    /// of an untitled note gets a derived title instead of staying blank.
    /// The session is in edit mode afterwards.
    pub fn import_from_clipboard_record(
        &mut self,
        source: Option<NoteId>,
        raw_text: &str,
    ) -> Result<(), SessionError> {
        self.ensure_open()?;
        let (title, body) = match source {
            Some(source_id) => match self.store.read(source_id) {
                Ok(note) => (Some(note.title), note.body),
                Err(StoreError::NotFound(_)) => {
                    tracing::debug!(%source_id, "paste source missing, importing raw text");
                    (None, raw_text.to_owned())
                }
                Err(err) => return Err(err.into()),
            },
            None => (None, raw_text.to_owned()),
        };
        let title = title
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| derive_title(&body));

        self.session.set_title(title);
        self.session.set_body(body);
        let id = self.target_id();
        let update = NoteUpdate::new(OffsetDateTime::now_utc())
            .title(self.session.title())
            .body(self.session.body());
        self.store.update(id, &update)?;
        self.session.promote();
        tracing::debug!(note_id = %id, "imported pasted note");
        Ok(())
    }

    /// Commits both buffers. Refused with [`SessionError::EmptyNote`] when
    /// title and body are both empty.
    pub fn save(&mut self) -> Result<(), SessionError> {
        self.ensure_open()?;
        if self.session.is_empty() {
            return Err(SessionError::EmptyNote);
        }
        let id = self.target_id();
        let update = NoteUpdate::new(OffsetDateTime::now_utc())
            .title(self.session.title())
            .body(self.session.body());
        self.store.update(id, &update)?;
        if self.session.promote() {
            tracing::debug!(note_id = %id, "inserted note now in edit mode");
        }
        tracing::debug!(note_id = %id, "saved note");
        Ok(())
    }

    /// Removes the target record and closes the session.
    pub fn delete(&mut self) -> Result<(), SessionError> {
        let id = self.target_id();
        match self.session.phase() {
            Phase::Open => {}
            Phase::Closed { deleted: true } => return Err(SessionError::AlreadyDeleted(id)),
            Phase::Closed { deleted: false } => return Err(SessionError::Closed(id)),
        }
        match self.store.delete(id) {
            Ok(()) => {
                self.session.close(true);
                tracing::info!(note_id = %id, "deleted note");
                Ok(())
            }
            Err(StoreError::NotFound(_)) => {
                self.session.close(true);
                Err(SessionError::AlreadyDeleted(id))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Tears the session down, committing or discarding its content.
    ///
    /// When abandoning with an empty body the record is deleted. Otherwise an
    /// edit-mode session writes its body (and title, when non-empty) and an
    /// insert-mode session writes both, deriving a title if none was typed.
    /// A record that vanished in the meantime makes this a no-op. The session
    /// is closed afterwards even when the store write fails.
    pub fn finalize(&mut self, is_abandoning: bool) -> Result<FinalizeOutcome, SessionError> {
        if !self.session.is_open() {
            tracing::trace!(note_id = %self.target_id(), "finalize on closed session");
            return Ok(FinalizeOutcome::AlreadyClosed);
        }
        let result = self.finalize_open(is_abandoning);
        let deleted = matches!(
            result,
            Ok(FinalizeOutcome::Discarded(_) | FinalizeOutcome::Missing(_))
        );
        self.session.close(deleted);
        result
    }

    fn finalize_open(&mut self, is_abandoning: bool) -> Result<FinalizeOutcome, SessionError> {
        let id = self.target_id();
        if is_abandoning && self.session.body().is_empty() {
            return match self.store.delete(id) {
                Ok(()) => {
                    tracing::info!(note_id = %id, "discarded empty note");
                    Ok(FinalizeOutcome::Discarded(id))
                }
                Err(StoreError::NotFound(_)) => Ok(self.missing(id)),
                Err(err) => Err(err.into()),
            };
        }

        let now = OffsetDateTime::now_utc();
        match self.session.mode() {
            SessionMode::Editing => {
                if self.options.skip_unchanged_writes && !self.session.is_modified() {
                    tracing::debug!(note_id = %id, "note unchanged, skipping write");
                    return Ok(FinalizeOutcome::Unchanged(id));
                }
                let mut update = NoteUpdate::new(now).body(self.session.body());
                if !self.session.title().is_empty() {
                    update = update.title(self.session.title());
                }
                self.commit(id, &update)
            }
            SessionMode::Inserting => {
                let title = if self.session.title().is_empty() {
                    derive_title(self.session.body())
                } else {
                    self.session.title().to_owned()
                };
                let update = NoteUpdate::new(now)
                    .title(title.as_str())
                    .body(self.session.body());
                let outcome = self.commit(id, &update)?;
                if let FinalizeOutcome::Committed(_) = outcome {
                    self.session.set_title(title);
                    self.session.promote();
                }
                Ok(outcome)
            }
        }
    }

    fn commit(&self, id: NoteId, update: &NoteUpdate) -> Result<FinalizeOutcome, SessionError> {
        match self.store.update(id, update) {
            Ok(()) => {
                tracing::debug!(note_id = %id, mode = %self.session.mode(), "committed note");
                Ok(FinalizeOutcome::Committed(id))
            }
            Err(StoreError::NotFound(_)) => Ok(self.missing(id)),
            Err(err) => Err(err.into()),
        }
    }

    fn missing(&self, id: NoteId) -> FinalizeOutcome {
        tracing::warn!(note_id = %id, "note vanished before finalize, nothing to do");
        FinalizeOutcome::Missing(id)
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        let id = self.target_id();
        match self.session.phase() {
            Phase::Open => Ok(()),
            Phase::Closed { deleted: true } => Err(SessionError::AlreadyDeleted(id)),
            Phase::Closed { deleted: false } => Err(SessionError::Closed(id)),
        }
    }

    fn abandon_placeholder(&mut self) {
        let id = self.target_id();
        match self.store.delete(id) {
            Ok(()) | Err(StoreError::NotFound(_)) => {}
            Err(err) => {
                tracing::warn!(note_id = %id, error = %err, "failed to remove placeholder note");
            }
        }
        self.session.close(true);
    }
}
