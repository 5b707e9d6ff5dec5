pub mod cli;
pub mod config;
pub mod highlight;
pub mod session;
pub mod storage;

pub use config::{AppConfig, ConfigLoader, ConfigPaths, SessionOptions};
pub use session::{
    EditSession, FinalizeOutcome, LaunchIntent, SessionController, SessionError, SessionMode,
};
pub use storage::{MemoryStore, Note, NoteId, NoteStore, NoteUpdate, StorageHandle, StoreError};
