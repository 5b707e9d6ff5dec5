use std::fmt::Write as _;
use std::io::{self, Read};

use anyhow::{Context, Result};
use clap::Args;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::config::SessionOptions;
use crate::highlight::{find_matches, mark_matches};
use crate::session::{char_count, FinalizeOutcome, LaunchIntent, SessionController, SessionError};
use crate::storage::{NoteId, NoteStore};

const MATCH_OPEN: &str = "[";
const MATCH_CLOSE: &str = "]";

#[derive(Args, Debug, Clone, Default)]
pub struct NewArgs {
    /// Title for the note, trimmed (derived from the body when omitted)
    #[arg(long)]
    pub title: Option<String>,
    /// Provide the note body inline, kept verbatim. If omitted, reads from stdin.
    #[arg(long)]
    pub body: Option<String>,
    /// Start from a copy of an existing note's title and body
    #[arg(long)]
    pub template: Option<NoteId>,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    /// Note identifier
    pub id: NoteId,
    /// Replace the title (surrounding whitespace is trimmed)
    #[arg(long)]
    pub title: Option<String>,
    /// Replace the body verbatim. If omitted, reads from stdin when piped;
    /// empty stdin leaves the body as it is.
    #[arg(long)]
    pub body: Option<String>,
    /// Save explicitly before closing (refuses an empty note)
    #[arg(long)]
    pub save: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct PasteArgs {
    /// Copy title and body from this note when it exists
    #[arg(long)]
    pub source: Option<NoteId>,
    /// Text to import when no source note is given. If omitted, reads from stdin.
    #[arg()]
    pub text: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct DeleteArgs {
    /// Note identifier
    pub id: NoteId,
}

#[derive(Args, Debug, Clone)]
pub struct ShowArgs {
    /// Note identifier
    pub id: NoteId,
    /// Highlight every case-insensitive occurrence of this text in the body
    #[arg(long)]
    pub find: Option<String>,
    /// Print the note as JSON
    #[arg(long)]
    pub json: bool,
}

fn read_stdin() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .context("reading note text from stdin")?;
    Ok(Some(buf))
}

/// Titles are single-line labels, so stray spaces and the newline a shell
/// adds are dropped. Bodies keep their whitespace.
fn clean_title(title: &str) -> &str {
    title.trim()
}

/// Empty piped input (`</dev/null`) means "no new body", not "clear it".
fn replacement_body(piped: Option<String>) -> Option<String> {
    piped.filter(|text| !text.is_empty())
}

pub fn new_note<S: NoteStore>(
    store: S,
    options: SessionOptions,
    mut args: NewArgs,
) -> Result<()> {
    if args.body.is_none() {
        args.body = read_stdin()?;
    }
    print!("{}", run_new(store, options, &args)?);
    Ok(())
}

pub fn edit_note<S: NoteStore>(
    store: S,
    options: SessionOptions,
    mut args: EditArgs,
) -> Result<()> {
    if args.body.is_none() {
        args.body = replacement_body(read_stdin()?);
    }
    print!("{}", run_edit(store, options, &args)?);
    Ok(())
}

pub fn paste_note<S: NoteStore>(
    store: S,
    options: SessionOptions,
    mut args: PasteArgs,
) -> Result<()> {
    if args.text.is_none() && args.source.is_none() {
        args.text = read_stdin()?;
    }
    print!("{}", run_paste(store, options, &args)?);
    Ok(())
}

pub fn delete_note<S: NoteStore>(store: S, args: DeleteArgs) -> Result<()> {
    print!("{}", run_delete(store, &args)?);
    Ok(())
}

pub fn show_note<S: NoteStore>(store: &S, args: ShowArgs) -> Result<()> {
    print!("{}", run_show(store, &args)?);
    Ok(())
}

fn run_new<S: NoteStore>(store: S, options: SessionOptions, args: &NewArgs) -> Result<String> {
    let mut controller = SessionController::launch(
        store,
        LaunchIntent::Insert {
            template: args.template,
        },
    )
    .context("opening insert session")?
    .with_options(options);
    if let Some(title) = &args.title {
        controller.edit_title(clean_title(title));
    }
    if let Some(body) = &args.body {
        controller.edit_body(body.as_str());
    }
    let outcome = controller.finalize(true).context("closing new note")?;
    Ok(describe_outcome(outcome, controller.session().title()))
}

fn run_edit<S: NoteStore>(store: S, options: SessionOptions, args: &EditArgs) -> Result<String> {
    let mut controller = SessionController::launch(store, LaunchIntent::Edit(args.id))
        .with_context(|| format!("opening note {}", args.id))?
        .with_options(options);
    if let Some(title) = &args.title {
        controller.edit_title(clean_title(title));
    }
    if let Some(body) = &args.body {
        controller.edit_body(body.as_str());
    }

    let mut out = String::new();
    if args.save {
        match controller.save() {
            Ok(()) => {
                let _ = writeln!(&mut out, "Saved note #{}", args.id);
            }
            Err(err @ SessionError::EmptyNote) => {
                tracing::warn!(note_id = %args.id, "explicit save refused: {err}");
                let _ = writeln!(&mut out, "Nothing to save: {err}");
            }
            Err(err) => return Err(err).context("saving note"),
        }
    }
    let outcome = controller.finalize(true).context("closing note")?;
    out.push_str(&describe_outcome(outcome, controller.session().title()));
    Ok(out)
}

fn run_paste<S: NoteStore>(store: S, options: SessionOptions, args: &PasteArgs) -> Result<String> {
    let intent = LaunchIntent::Paste {
        source: args.source,
        text: args.text.clone().unwrap_or_default(),
    };
    let mut controller = SessionController::launch(store, intent)
        .context("importing pasted note")?
        .with_options(options);
    let outcome = controller.finalize(true).context("closing pasted note")?;
    Ok(describe_outcome(outcome, controller.session().title()))
}

fn run_delete<S: NoteStore>(store: S, args: &DeleteArgs) -> Result<String> {
    let mut controller = SessionController::launch(store, LaunchIntent::Edit(args.id))
        .with_context(|| format!("opening note {}", args.id))?;
    let message = match controller.delete() {
        Ok(()) => format!("Deleted note #{}\n", args.id),
        Err(err @ SessionError::AlreadyDeleted(_)) => format!("{err}\n"),
        Err(err) => return Err(err).context("deleting note"),
    };
    controller.finalize(true).context("closing note")?;
    Ok(message)
}

fn run_show<S: NoteStore>(store: &S, args: &ShowArgs) -> Result<String> {
    let note = store
        .read(args.id)
        .map_err(SessionError::from)
        .with_context(|| format!("reading note {}", args.id))?;
    if args.json {
        let mut json = serde_json::to_string_pretty(&note).context("serialising note")?;
        json.push('\n');
        return Ok(json);
    }

    let mut out = String::new();
    let title = if note.title.is_empty() {
        "(untitled)"
    } else {
        note.title.as_str()
    };
    let _ = writeln!(&mut out, "#{}  {}", note.id, title);
    let _ = writeln!(&mut out, "    created  {}", format_timestamp(note.created_at));
    let _ = writeln!(&mut out, "    modified {}", format_timestamp(note.modified_at));
    let _ = writeln!(
        &mut out,
        "    {} characters",
        char_count(&note.title, &note.body)
    );
    let body = match args.find.as_deref() {
        Some(query) => {
            let hits = find_matches(&note.body, query).len();
            let _ = writeln!(&mut out, "    {hits} match(es) for {query:?}");
            mark_matches(&note.body, query, MATCH_OPEN, MATCH_CLOSE)
        }
        None => note.body.clone(),
    };
    out.push('\n');
    out.push_str(&body);
    if !body.ends_with('\n') {
        out.push('\n');
    }
    Ok(out)
}

fn describe_outcome(outcome: FinalizeOutcome, title: &str) -> String {
    match outcome {
        FinalizeOutcome::Committed(id) => format!("Saved note #{id}  {title}\n"),
        FinalizeOutcome::Unchanged(id) => format!("Note #{id} unchanged\n"),
        FinalizeOutcome::Discarded(id) => format!("Discarded empty note #{id}\n"),
        FinalizeOutcome::Missing(id) => format!("Note #{id} no longer exists\n"),
        FinalizeOutcome::AlreadyClosed => String::new(),
    }
}

fn format_timestamp(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339)
        .unwrap_or_else(|_| ts.unix_timestamp().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    type TestResult<T = ()> = Result<T>;

    #[test]
    fn cli_new_with_body_derives_title() -> TestResult {
        let store = MemoryStore::new();
        let args = NewArgs {
            body: Some("Pick up the dry cleaning before six tonight".into()),
            ..NewArgs::default()
        };
        let output = run_new(&store, SessionOptions::default(), &args)?;
        assert_eq!(output, "Saved note #1  Pick up the dry cleaning\n");
        assert_eq!(store.read(NoteId::new(1))?.title, "Pick up the dry cleaning");
        Ok(())
    }

    #[test]
    fn cli_new_without_body_discards_placeholder() -> TestResult {
        let store = MemoryStore::new();
        let output = run_new(&store, SessionOptions::default(), &NewArgs::default())?;
        assert_eq!(output, "Discarded empty note #1\n");
        assert!(store.is_empty());
        Ok(())
    }

    #[test]
    fn cli_edit_refused_save_still_closes() -> TestResult {
        let store = MemoryStore::new();
        let id = store.insert("Title", "Body");
        let args = EditArgs {
            id,
            title: Some(String::new()),
            body: Some(String::new()),
            save: true,
        };
        let output = run_edit(&store, SessionOptions::default(), &args)?;
        assert!(output.starts_with("Nothing to save"));
        assert!(output.contains("Discarded empty note"));
        assert!(!store.contains(id));
        Ok(())
    }

    #[test]
    fn cli_edit_updates_body() -> TestResult {
        let store = MemoryStore::new();
        let id = store.insert("Title", "Body");
        let args = EditArgs {
            id,
            title: None,
            body: Some("Revised body".into()),
            save: false,
        };
        run_edit(&store, SessionOptions::default(), &args)?;
        let note = store.read(id)?;
        assert_eq!(note.title, "Title");
        assert_eq!(note.body, "Revised body");
        Ok(())
    }

    #[test]
    fn cli_edit_title_only_keeps_body() -> TestResult {
        let store = MemoryStore::new();
        let id = store.insert("Meeting", "Important meeting notes");
        let args = EditArgs {
            id,
            title: Some("Renamed\n".into()),
            body: replacement_body(Some(String::new())),
            save: false,
        };
        let output = run_edit(&store, SessionOptions::default(), &args)?;
        assert_eq!(output, format!("Saved note #{id}  Renamed\n"));
        let note = store.read(id)?;
        assert_eq!(note.title, "Renamed");
        assert_eq!(note.body, "Important meeting notes");
        Ok(())
    }

    #[test]
    fn piped_body_keeps_whitespace() {
        assert_eq!(
            replacement_body(Some("  indented\n".into())),
            Some("  indented\n".to_owned())
        );
        assert_eq!(replacement_body(None), None);
        assert_eq!(clean_title("  Groceries \n"), "Groceries");
    }

    #[test]
    fn cli_paste_copies_source_note() -> TestResult {
        let store = MemoryStore::new();
        let source = store.insert("Groceries", "Milk");
        let args = PasteArgs {
            source: Some(source),
            text: None,
        };
        let output = run_paste(&store, SessionOptions::default(), &args)?;
        assert_eq!(output, "Saved note #2  Groceries\n");
        let copy = store.read(NoteId::new(2))?;
        assert_eq!((copy.title.as_str(), copy.body.as_str()), ("Groceries", "Milk"));
        Ok(())
    }

    #[test]
    fn cli_delete_reports_missing_note() {
        let store = MemoryStore::new();
        let err = run_delete(&store, &DeleteArgs { id: NoteId::new(3) }).unwrap_err();
        assert!(format!("{err:#}").contains("does not exist"));
    }

    #[test]
    fn cli_show_highlights_without_touching_store() -> TestResult {
        let store = MemoryStore::new();
        let id = store.insert("Shopping", "eggs, Eggs and more EGGS");
        let args = ShowArgs {
            id,
            find: Some("eggs".into()),
            json: false,
        };
        let output = run_show(&store, &args)?;
        assert!(output.contains("3 match(es)"));
        assert!(output.contains("[eggs], [Eggs] and more [EGGS]"));
        assert_eq!(store.read(id)?.body, "eggs, Eggs and more EGGS");
        Ok(())
    }

    #[test]
    fn cli_show_json_includes_fields() -> TestResult {
        let store = MemoryStore::new();
        let id = store.insert("Json", "body");
        let args = ShowArgs {
            id,
            find: None,
            json: true,
        };
        let output = run_show(&store, &args)?;
        let value: serde_json::Value = serde_json::from_str(&output)?;
        assert_eq!(value["id"], 1);
        assert_eq!(value["title"], "Json");
        assert!(value["modified_at"].is_string());
        Ok(())
    }
}
