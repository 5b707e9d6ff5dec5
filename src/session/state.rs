use strum::{AsRefStr, Display};
use unicode_segmentation::UnicodeSegmentation;

use crate::storage::NoteId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum SessionMode {
    /// The target record already holds committed content.
    Editing,
    /// The target record is a fresh placeholder with no committed content.
    Inserting,
}

/// Combined length of title and body in user-perceived characters.
pub fn char_count(title: &str, body: &str) -> usize {
    title.graphemes(true).count() + body.graphemes(true).count()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Open,
    Closed { deleted: bool },
}

/// State of one open editor: target record, mode and the text buffers.
#[derive(Debug, Clone)]
pub struct EditSession {
    mode: SessionMode,
    target_id: NoteId,
    original_title: String,
    original_body: String,
    title: String,
    body: String,
    phase: Phase,
}

impl EditSession {
    pub(crate) fn new(mode: SessionMode, target_id: NoteId, title: String, body: String) -> Self {
        Self {
            mode,
            target_id,
            original_title: title.clone(),
            original_body: body.clone(),
            title,
            body,
            phase: Phase::Open,
        }
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn target_id(&self) -> NoteId {
        self.target_id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Body as loaded when the session opened.
    pub fn original_body(&self) -> &str {
        &self.original_body
    }

    pub fn is_open(&self) -> bool {
        self.phase == Phase::Open
    }

    pub fn is_deleted(&self) -> bool {
        self.phase == Phase::Closed { deleted: true }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_empty() && self.body.is_empty()
    }

    /// True when either buffer differs from what the session opened with.
    pub fn is_modified(&self) -> bool {
        self.title != self.original_title || self.body != self.original_body
    }

    pub fn char_count(&self) -> usize {
        char_count(&self.title, &self.body)
    }

    pub(crate) fn phase(&self) -> Phase {
        self.phase
    }

    pub(crate) fn set_title(&mut self, title: String) {
        self.title = title;
    }

    pub(crate) fn set_body(&mut self, body: String) {
        self.body = body;
    }

    /// INSERTING becomes EDITING; never the other way round.
    pub(crate) fn promote(&mut self) -> bool {
        if self.mode == SessionMode::Inserting {
            self.mode = SessionMode::Editing;
            return true;
        }
        false
    }

    pub(crate) fn close(&mut self, deleted: bool) {
        self.phase = Phase::Closed { deleted };
    }
}
