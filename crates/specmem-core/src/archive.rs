use crate::error::Result;
use crate::memory::{MemoryDocument, MemoryEntry, MemoryStore};
use crate::parser::{self, Parsed};
use crate::paths;
use crate::types::Tag;
use chrono::NaiveDate;
use serde::Serialize;
use std::path::Path;

const ARCHIVE_PREAMBLE: &str = "# Project Memory Archive\n\nEntries moved out of memory.md by `specmem memory archive`.";

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveReport {
    pub moved: Vec<String>,
    pub remaining: usize,
    pub archived_total: usize,
}

/// True when `entry` may be archived: dated, not the current context, and
/// strictly older than `days` as of `today`.
pub fn is_stale(entry: &MemoryEntry, days: u32, today: NaiveDate) -> bool {
    if entry.tag == Tag::Current {
        return false;
    }
    match entry.date {
        Some(d) => (today - d).num_days() > i64::from(days),
        None => false,
    }
}

/// Move stale entries from the memory document into the archive.
///
/// The archive is written first; if the memory rewrite then fails the entries
/// exist in both files and the next run deduplicates them by id.
pub fn archive_older_than(
    store: &mut MemoryStore,
    days: u32,
    today: NaiveDate,
) -> Result<ArchiveReport> {
    let (stale, keep): (Vec<MemoryEntry>, Vec<MemoryEntry>) = store
        .entries()
        .iter()
        .cloned()
        .partition(|e| is_stale(e, days, today));

    if stale.is_empty() {
        return Ok(ArchiveReport {
            moved: Vec::new(),
            remaining: keep.len(),
            archived_total: store.archived().len(),
        });
    }

    // Phase 1: archive.
    let mut archive = load_archive_document(store.root())?;
    for entry in &stale {
        if !entry.id.is_empty() && archive.get(&entry.id).is_some() {
            continue;
        }
        archive.entries.push(entry.clone());
    }
    crate::io::atomic_write(&paths::archive_path(store.root()), archive.render().as_bytes())?;

    // Phase 2: memory document.
    let mut doc = store.document().clone();
    doc.entries = keep;
    store.replace_document(doc);
    store.save()?;

    let moved: Vec<String> = stale.into_iter().map(|e| e.id).collect();
    tracing::info!(moved = moved.len(), days, "archived stale memory entries");

    let remaining = store.entries().len();
    let archived_total = archive.entries.len();
    store.set_archived(archive.entries);
    Ok(ArchiveReport {
        moved,
        remaining,
        archived_total,
    })
}

fn load_archive_document(root: &Path) -> Result<MemoryDocument> {
    let raw = crate::io::read_optional(&paths::archive_path(root))?.unwrap_or_default();
    let mut doc = match parser::parse(&raw) {
        Parsed::Tagged(doc) => doc,
        Parsed::Unstructured => MemoryDocument::default(),
    };
    if doc.preamble.trim().is_empty() {
        doc.preamble = ARCHIVE_PREAMBLE.to_string();
    }
    Ok(doc)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
