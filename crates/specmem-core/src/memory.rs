use crate::error::{Result, SpecmemError};
use crate::parser::{self, Parsed};
use crate::paths;
use crate::types::Tag;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// MemoryEntry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// `{PREFIX}-{NNN}`. Empty when a hand-edited entry has no id.
    pub id: String,
    pub tag: Tag,
    pub title: String,
    pub content: String,
    pub date: Option<NaiveDate>,
    pub related_features: Vec<String>,
}

impl MemoryEntry {
    pub fn relates_to(&self, feature_id: &str) -> bool {
        self.related_features.iter().any(|f| f == feature_id)
    }

    /// First line of the body, used for one-line summaries.
    pub fn summary(&self) -> &str {
        self.content.lines().next().unwrap_or("").trim()
    }
}

// ---------------------------------------------------------------------------
// MemoryDocument
// ---------------------------------------------------------------------------

/// In-memory form of a memory document. Entries keep document order; render
/// groups them by tag.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MemoryDocument {
    /// Text before the first tag section.
    pub preamble: String,
    /// Text between a section heading and its first entry.
    pub intros: BTreeMap<Tag, String>,
    pub entries: Vec<MemoryEntry>,
}

impl MemoryDocument {
    pub fn render(&self) -> String {
        parser::render(self)
    }

    /// Highest numeric suffix used for `tag` in this document.
    pub fn max_id(&self, tag: Tag) -> u32 {
        max_id_in(&self.entries, tag)
    }

    pub fn current(&self) -> Option<&MemoryEntry> {
        self.entries.iter().find(|e| e.tag == Tag::Current)
    }

    /// The feature named by the current-context entry, if any.
    pub fn active_feature(&self) -> Option<&str> {
        self.current()
            .and_then(|e| e.related_features.first())
            .map(String::as_str)
    }

    pub fn get(&self, id: &str) -> Option<&MemoryEntry> {
        self.entries.iter().find(|e| e.id.eq_ignore_ascii_case(id))
    }

    /// Append (or, for `current`, replace in place). `floor` is the highest
    /// suffix already used elsewhere, e.g. in the archive.
    fn insert(
        &mut self,
        tag: Tag,
        title: String,
        content: String,
        related_features: Vec<String>,
        date: NaiveDate,
        floor: u32,
    ) -> MemoryEntry {
        if tag.is_singleton() {
            if let Some(pos) = self.entries.iter().position(|e| e.tag == tag) {
                let extra = self.entries.iter().filter(|e| e.tag == tag).count() - 1;
                if extra > 0 {
                    tracing::warn!(extra, "collapsing duplicate current-context entries");
                    let mut seen = 0usize;
                    self.entries.retain(|e| {
                        if e.tag != tag {
                            return true;
                        }
                        seen += 1;
                        seen == 1
                    });
                }
                let next = self.max_id(tag).max(floor) + 1;
                let existing = &mut self.entries[pos];
                if existing.id.is_empty() {
                    existing.id = parser::format_id(tag, next);
                }
                existing.title = title;
                existing.content = content;
                existing.date = Some(date);
                existing.related_features = related_features;
                return existing.clone();
            }
        }

        let next = self.max_id(tag).max(floor) + 1;
        let entry = MemoryEntry {
            id: parser::format_id(tag, next),
            tag,
            title,
            content,
            date: Some(date),
            related_features,
        };
        tracing::debug!(id = %entry.id, "allocated memory entry");
        self.entries.push(entry.clone());
        entry
    }
}

pub(crate) fn max_id_in(entries: &[MemoryEntry], tag: Tag) -> u32 {
    entries
        .iter()
        .filter_map(|e| parser::id_number(&e.id, tag))
        .max()
        .unwrap_or(0)
}

/// Titles live on the `###` line, so line breaks become spaces.
fn flatten_title(title: &str) -> String {
    title
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Trim the body, drop trailing whitespace per line, and close a fence left
/// open so it cannot swallow the fields written after it.
fn normalize_content(content: &str) -> String {
    let lines: Vec<&str> = content.trim().lines().map(str::trim_end).collect();
    let mut out = lines.join("\n");
    if lines.iter().filter(|l| parser::is_fence(l)).count() % 2 == 1 {
        out.push_str("\n```");
    }
    out
}

fn normalize_features(related: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for f in related.iter().flat_map(|r| parser::split_features(r)) {
        if !out.contains(&f) {
            out.push(f);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// The per-project memory document plus its archive, loaded fully into memory.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    root: PathBuf,
    doc: MemoryDocument,
    archived: Vec<MemoryEntry>,
}

impl MemoryStore {
    /// Load the memory document under `root`. A missing document is empty; a
    /// document without tag sections is reported as `UnstructuredDocument`.
    pub fn open(root: &Path) -> Result<Self> {
        if !paths::specmem_dir(root).is_dir() {
            return Err(SpecmemError::NotInitialized);
        }
        let path = paths::memory_path(root);
        let doc = match crate::io::read_optional(&path)? {
            None => MemoryDocument::default(),
            Some(raw) => match parser::parse(&raw) {
                Parsed::Tagged(doc) => doc,
                Parsed::Unstructured => return Err(SpecmemError::UnstructuredDocument { path }),
            },
        };
        let archived = load_archive(root)?;
        tracing::debug!(
            entries = doc.entries.len(),
            archived = archived.len(),
            "loaded memory store"
        );
        Ok(Self {
            root: root.to_path_buf(),
            doc,
            archived,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn document(&self) -> &MemoryDocument {
        &self.doc
    }

    pub fn entries(&self) -> &[MemoryEntry] {
        &self.doc.entries
    }

    pub fn archived(&self) -> &[MemoryEntry] {
        &self.archived
    }

    /// Allocate the next id for `tag` and persist the new entry. For `current`
    /// the single context entry is replaced instead.
    pub fn add(
        &mut self,
        tag: Tag,
        title: &str,
        content: &str,
        related_features: &[String],
    ) -> Result<MemoryEntry> {
        self.add_on(tag, title, content, related_features, Utc::now().date_naive())
    }

    pub fn add_on(
        &mut self,
        tag: Tag,
        title: &str,
        content: &str,
        related_features: &[String],
        date: NaiveDate,
    ) -> Result<MemoryEntry> {
        let floor = max_id_in(&self.archived, tag);
        let entry = self.doc.insert(
            tag,
            flatten_title(title),
            normalize_content(content),
            normalize_features(related_features),
            date,
            floor,
        );
        self.save()?;
        Ok(entry)
    }

    /// Look up one entry by id, falling back to the archive.
    pub fn get(&self, id: &str) -> Result<&MemoryEntry> {
        self.doc
            .get(id)
            .or_else(|| self.archived.iter().find(|e| e.id.eq_ignore_ascii_case(id)))
            .ok_or_else(|| SpecmemError::EntryNotFound(id.to_string()))
    }

    /// Rewrite the whole document.
    pub fn save(&self) -> Result<()> {
        let path = paths::memory_path(&self.root);
        crate::io::atomic_write(&path, self.doc.render().as_bytes())?;
        tracing::debug!(path = %path.display(), "saved memory document");
        Ok(())
    }

    pub(crate) fn replace_document(&mut self, doc: MemoryDocument) {
        self.doc = doc;
    }

    pub(crate) fn set_archived(&mut self, archived: Vec<MemoryEntry>) {
        self.archived = archived;
    }
}

pub(crate) fn load_archive(root: &Path) -> Result<Vec<MemoryEntry>> {
    let path = paths::archive_path(root);
    match crate::io::read_optional(&path)? {
        None => Ok(Vec::new()),
        Some(raw) => match parser::parse(&raw) {
            Parsed::Tagged(doc) => Ok(doc.entries),
            Parsed::Unstructured => {
                tracing::warn!(path = %path.display(), "archive has no tagged sections; ignoring");
                Ok(Vec::new())
            }
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
