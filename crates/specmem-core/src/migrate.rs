//! One-time conversion of an untagged legacy memory document into the tagged
//! layout.
//!
//! The legacy text is cut into blocks at markdown headings, each block is
//! classified by a [`BlockClassifier`], and the result is rendered as a tagged
//! document. Blocks the classifier cannot place with confidence are kept
//! verbatim under a "Needs Review" heading instead of being guessed. The
//! original text is backed up and verified before anything is overwritten.

use crate::error::{Result, SpecmemError};
use crate::memory::{self, MemoryDocument, MemoryEntry};
use crate::parser::{self, Parsed};
use crate::paths;
use crate::types::Tag;
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const NEEDS_REVIEW_HEADING: &str = "## Needs Review";

// ---------------------------------------------------------------------------
// Blocks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegacyBlock {
    /// Heading text without the leading hashes.
    pub heading: Option<String>,
    /// Heading level (number of `#`), 0 when there is no heading.
    pub level: usize,
    pub body: String,
}

impl LegacyBlock {
    /// Heading and body together, lowercased, for keyword matching.
    pub fn text(&self) -> String {
        let mut s = self.heading.clone().unwrap_or_default();
        s.push('\n');
        s.push_str(&self.body);
        s.to_lowercase()
    }

    fn title(&self) -> String {
        match &self.heading {
            Some(h) => h.clone(),
            None => {
                let first = self.body.lines().next().unwrap_or("").trim();
                let clipped: String = first.chars().take(60).collect();
                clipped.trim_end_matches(['.', ':', ',']).trim().to_string()
            }
        }
    }

    fn render_verbatim(&self) -> String {
        let mut out = String::new();
        if let Some(h) = &self.heading {
            // Demoted so a heading can never be mistaken for a tag section.
            out.push_str(&format!("#### {h}\n"));
        }
        if !self.body.is_empty() {
            out.push_str(&self.body);
            out.push('\n');
        }
        out
    }
}

static HEADING_RE: OnceLock<Regex> = OnceLock::new();

fn heading_re() -> &'static Regex {
    HEADING_RE.get_or_init(|| Regex::new(r"^\s{0,3}(#{1,6})[ \t]+(.*?)[ \t#]*$").unwrap())
}

/// Cut legacy text into blocks at headings outside code fences.
pub fn split_blocks(raw: &str) -> Vec<LegacyBlock> {
    let mut blocks = Vec::new();
    let mut heading: Option<(usize, String)> = None;
    let mut body: Vec<&str> = Vec::new();
    let mut in_fence = false;

    for line in raw.lines() {
        if parser::is_fence(line) {
            in_fence = !in_fence;
            body.push(line);
            continue;
        }
        if !in_fence {
            if let Some(caps) = heading_re().captures(line) {
                push_block(&mut blocks, heading.take(), &body);
                body.clear();
                heading = Some((caps[1].len(), caps[2].to_string()));
                continue;
            }
        }
        body.push(line);
    }
    push_block(&mut blocks, heading.take(), &body);
    blocks
}

fn push_block(blocks: &mut Vec<LegacyBlock>, heading: Option<(usize, String)>, body: &[&str]) {
    let text = trim_blank_lines(body);
    let (level, heading) = match heading {
        Some((l, h)) => (l, Some(h)),
        None if text.is_empty() => return,
        None => (0, None),
    };
    blocks.push(LegacyBlock {
        heading,
        level,
        body: text,
    });
}

fn trim_blank_lines(lines: &[&str]) -> String {
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    match (start, end) {
        (Some(s), Some(e)) => lines[s..=e]
            .iter()
            .map(|l| l.trim_end())
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "tags", rename_all = "snake_case")]
pub enum Verdict {
    Tag(Tag),
    /// Two or more tags scored equally; needs a human decision.
    Ambiguous(Vec<Tag>),
    Unknown,
}

/// Decides which tag a legacy block belongs to. Swap implementations to
/// change the heuristic or to ask the user interactively.
pub trait BlockClassifier {
    fn classify(&self, block: &LegacyBlock) -> Verdict;
}

/// Counts keyword hits per tag; headings naming a tag weigh more.
#[derive(Debug, Clone, Default)]
pub struct KeywordClassifier;

const DECISION_WORDS: &[&str] = &[
    "decided", "decision", "we chose", "chosen", "selected", "went with", "rationale",
    "trade-off", "tradeoff", "instead of", "adopt",
];
const PATTERN_WORDS: &[&str] = &[
    "pattern", "convention", "always use", "example", "template", "format", "naming",
    "style", "idiom",
];
const CONSTRAINT_WORDS: &[&str] = &[
    "must", "never", "cannot", "can't", "constraint", "required", "requirement", "limit",
    "compliance", "not allowed", "forbidden",
];
const CURRENT_WORDS: &[&str] = &[
    "currently", "in progress", "working on", "status", "blocker", "blocked", "next step",
    "todo", "wip", "active feature",
];

const HEADING_WEIGHT: u32 = 3;

fn keywords(tag: Tag) -> &'static [&'static str] {
    match tag {
        Tag::Decision => DECISION_WORDS,
        Tag::Pattern => PATTERN_WORDS,
        Tag::Constraint => CONSTRAINT_WORDS,
        Tag::Current => CURRENT_WORDS,
    }
}

impl BlockClassifier for KeywordClassifier {
    fn classify(&self, block: &LegacyBlock) -> Verdict {
        let text = block.text();
        let heading = block.heading.as_deref().map(str::to_lowercase);

        let scores: Vec<(Tag, u32)> = Tag::all()
            .iter()
            .map(|&tag| {
                let mut score = keywords(tag)
                    .iter()
                    .filter(|w| text.contains(*w))
                    .count() as u32;
                if let Some(h) = &heading {
                    if Tag::from_heading(h) == Some(tag) {
                        score += HEADING_WEIGHT;
                    }
                }
                (tag, score)
            })
            .collect();

        let best = scores.iter().map(|(_, s)| *s).max().unwrap_or(0);
        if best == 0 {
            return Verdict::Unknown;
        }
        let top: Vec<Tag> = scores
            .iter()
            .filter(|(_, s)| *s == best)
            .map(|(t, _)| *t)
            .collect();
        if top.len() == 1 {
            Verdict::Tag(top[0])
        } else {
            Verdict::Ambiguous(top)
        }
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

static FEATURE_REF_RE: OnceLock<Regex> = OnceLock::new();
static DATE_RE: OnceLock<Regex> = OnceLock::new();

fn feature_ref_re() -> &'static Regex {
    FEATURE_REF_RE.get_or_init(|| {
        Regex::new(r"(?i)(?:\bfeatures?[ \t#:-]*|\bspecs/)(\d{3})\b").unwrap()
    })
}

fn date_re() -> &'static Regex {
    DATE_RE.get_or_init(|| Regex::new(r"\b(\d{4}-\d{2}-\d{2})\b").unwrap())
}

fn detect_features(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for caps in feature_ref_re().captures_iter(text) {
        let id = caps[1].to_string();
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

fn detect_date(text: &str) -> Option<NaiveDate> {
    date_re()
        .captures_iter(text)
        .find_map(|c| NaiveDate::parse_from_str(&c[1], "%Y-%m-%d").ok())
}

#[derive(Debug, Clone, Serialize)]
pub struct FlaggedBlock {
    pub block: LegacyBlock,
    pub verdict: Verdict,
}

/// Result of classifying a legacy document, before anything is written.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationPlan {
    pub document: MemoryDocument,
    pub flagged: Vec<FlaggedBlock>,
    pub counts: BTreeMap<Tag, usize>,
}

impl MigrationPlan {
    pub fn render(&self) -> String {
        self.document.render()
    }
}

/// Classify `raw` without touching disk.
pub fn plan(raw: &str, classifier: &dyn BlockClassifier) -> MigrationPlan {
    build_plan(raw, classifier, &[])
}

fn build_plan(raw: &str, classifier: &dyn BlockClassifier, archived: &[MemoryEntry]) -> MigrationPlan {
    let mut preamble: Vec<String> = Vec::new();
    let mut flagged: Vec<FlaggedBlock> = Vec::new();
    let mut entries: Vec<MemoryEntry> = Vec::new();
    let mut current_blocks: Vec<LegacyBlock> = Vec::new();
    let mut counts: BTreeMap<Tag, usize> = BTreeMap::new();
    let mut next: BTreeMap<Tag, u32> = Tag::all()
        .iter()
        .map(|&t| (t, memory::max_id_in(archived, t)))
        .collect();
    let mut alloc = |tag: Tag| {
        let n = next.entry(tag).or_default();
        *n += 1;
        parser::format_id(tag, *n)
    };

    for block in split_blocks(raw) {
        if block.body.is_empty() {
            // Title-only headings stay as document structure. A bare tag
            // heading would be read back as a section marker, so demote it.
            let heading = block.heading.clone().unwrap_or_default();
            if block.level == 2 && Tag::from_heading(&heading).is_some() {
                preamble.push(format!("#### {heading}"));
            } else {
                preamble.push(format!("{} {heading}", "#".repeat(block.level.max(1))));
            }
            continue;
        }

        let tag = match classifier.classify(&block) {
            Verdict::Tag(tag) => tag,
            verdict => {
                flagged.push(FlaggedBlock { block, verdict });
                continue;
            }
        };
        *counts.entry(tag).or_default() += 1;

        if tag == Tag::Current {
            current_blocks.push(block);
            continue;
        }
        let id = alloc(tag);
        let full_text = block.text();
        entries.push(finish_entry(tag, id, block.title(), &block.body, &full_text));
    }

    // Several status blocks collapse into the single current-context entry.
    if let Some((first, rest)) = current_blocks.split_first() {
        let mut body = first.body.clone();
        let mut full_text = first.text();
        for b in rest {
            match &b.heading {
                Some(h) => body.push_str(&format!("\n\n**{h}**\n")),
                None => body.push_str("\n\n"),
            }
            body.push_str(&b.body);
            full_text.push('\n');
            full_text.push_str(&b.text());
        }
        let id = alloc(Tag::Current);
        entries.push(finish_entry(Tag::Current, id, first.title(), &body, &full_text));
    }

    if !flagged.is_empty() {
        preamble.push(String::new());
        preamble.push(NEEDS_REVIEW_HEADING.to_string());
        preamble.push(String::new());
        preamble.push(
            "These blocks could not be classified automatically. Move each one into the right section."
                .to_string(),
        );
        for f in &flagged {
            preamble.push(String::new());
            preamble.push(f.block.render_verbatim().trim_end().to_string());
        }
    }

    let document = MemoryDocument {
        preamble: preamble.join("\n").trim().to_string(),
        intros: BTreeMap::new(),
        entries,
    };
    // Store what a later load will read back, not what we assembled.
    let document = match parser::parse(&document.render()) {
        Parsed::Tagged(reread) => reread,
        Parsed::Unstructured => document,
    };

    MigrationPlan {
        document,
        flagged,
        counts,
    }
}

fn finish_entry(tag: Tag, id: String, title: String, body: &str, full_text: &str) -> MemoryEntry {
    let mut entry = parser::entry_from_body(tag, id, title, body);
    for f in detect_features(full_text) {
        if !entry.related_features.contains(&f) {
            entry.related_features.push(f);
        }
    }
    if entry.date.is_none() {
        entry.date = detect_date(full_text);
    }
    entry
}

// ---------------------------------------------------------------------------
// Backup
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct BackupHandle {
    pub path: PathBuf,
    pub created_at: DateTime<Utc>,
}

/// Write `raw` to a new timestamped file under `.specmem/backups/` and read it
/// back. Any failure is `BackupFailure`.
pub fn create_backup(root: &Path, raw: &str) -> Result<BackupHandle> {
    let dir = paths::backups_dir(root);
    let created_at = Utc::now();
    let stamp = created_at.format("%Y%m%d-%H%M%S").to_string();

    let fail = |path: &Path, source: std::io::Error| SpecmemError::BackupFailure {
        path: path.to_path_buf(),
        source,
    };

    std::fs::create_dir_all(&dir).map_err(|e| fail(&dir, e))?;

    let mut attempt = 0u32;
    let (path, mut file) = loop {
        let name = if attempt == 0 {
            format!("memory-{stamp}.md")
        } else {
            format!("memory-{stamp}-{attempt}.md")
        };
        let path = dir.join(name);
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(f) => break (path, f),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && attempt < 100 => {
                attempt += 1;
            }
            Err(e) => return Err(fail(&path, e)),
        }
    };

    file.write_all(raw.as_bytes()).map_err(|e| fail(&path, e))?;
    file.sync_all().map_err(|e| fail(&path, e))?;
    drop(file);

    let written = std::fs::read_to_string(&path).map_err(|e| fail(&path, e))?;
    if written != raw {
        return Err(fail(
            &path,
            std::io::Error::new(std::io::ErrorKind::Other, "backup content does not match"),
        ));
    }
    tracing::info!(path = %path.display(), "memory backup written");
    Ok(BackupHandle { path, created_at })
}

// ---------------------------------------------------------------------------
// Migrate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct MigrationOutcome {
    pub entries: Vec<MemoryEntry>,
    pub flagged: usize,
    pub backup: BackupHandle,
}

/// Read the legacy document for the project at `root` without writing anything.
pub fn preview(root: &Path, classifier: &dyn BlockClassifier) -> Result<MigrationPlan> {
    let raw = read_legacy(root)?;
    let archived = memory::load_archive(root)?;
    Ok(build_plan(&raw, classifier, &archived))
}

/// Back up the legacy document, then replace it with its tagged form.
pub fn migrate(root: &Path, classifier: &dyn BlockClassifier) -> Result<MigrationOutcome> {
    let raw = read_legacy(root)?;
    let archived = memory::load_archive(root)?;
    let plan = build_plan(&raw, classifier, &archived);

    let backup = create_backup(root, &raw)?;
    crate::io::atomic_write(&paths::memory_path(root), plan.render().as_bytes())?;

    tracing::info!(
        entries = plan.document.entries.len(),
        flagged = plan.flagged.len(),
        "migrated memory document"
    );
    Ok(MigrationOutcome {
        entries: plan.document.entries,
        flagged: plan.flagged.len(),
        backup,
    })
}

fn read_legacy(root: &Path) -> Result<String> {
    if !paths::specmem_dir(root).is_dir() {
        return Err(SpecmemError::NotInitialized);
    }
    let path = paths::memory_path(root);
    let raw = crate::io::read_optional(&path)?.unwrap_or_default();
    match parser::parse(&raw) {
        Parsed::Unstructured => Ok(raw),
        Parsed::Tagged(_) => Err(SpecmemError::AlreadyTagged { path }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use tempfile::TempDir;

    const LEGACY: &str = "\
# Project Memory

## Payment provider
We decided to go with Stripe instead of Adyen for feature 003.
Date: 2025-11-02

## Error responses
All handlers follow the same error pattern: `{ error: { code, message } }`.
Used by specs/001-auth and specs/002-catalog.

## Logging
Logs can't contain card numbers (PCI compliance).

## Team lunch
Fridays at noon, rotating venue.

## Now
Currently working on feature 003 checkout, blocked on webhook secrets.

Some loose thought that fits nowhere.

```bash
## deploy
./deploy.sh
```
";

    fn non_ws(s: &str) -> usize {
        s.chars().filter(|c| !c.is_whitespace()).count()
    }

    #[test]
    fn split_blocks_respects_fences() {
        let blocks = split_blocks(LEGACY);
        let headings: Vec<_> = blocks.iter().map(|b| b.heading.clone()).collect();
        assert_eq!(
            headings,
            vec![
                Some("Project Memory".to_string()),
                Some("Payment provider".to_string()),
                Some("Error responses".to_string()),
                Some("Logging".to_string()),
                Some("Team lunch".to_string()),
                Some("Now".to_string()),
            ]
        );
        assert!(blocks[5].body.contains("## deploy"));
    }

    #[test]
    fn keyword_classifier_verdicts() {
        let c = KeywordClassifier;
        let block = |heading: &str, body: &str| LegacyBlock {
            heading: Some(heading.to_string()),
            level: 2,
            body: body.to_string(),
        };
        assert_eq!(
            c.classify(&block("Provider", "We decided on Stripe.")),
            Verdict::Tag(Tag::Decision)
        );
        assert_eq!(
            c.classify(&block("Constraints", "Keep it simple.")),
            Verdict::Tag(Tag::Constraint)
        );
        assert_eq!(c.classify(&block("Misc", "Lunch is at noon.")), Verdict::Unknown);
        assert_eq!(
            c.classify(&block("Rules", "Errors must use the shared format.")),
            Verdict::Ambiguous(vec![Tag::Pattern, Tag::Constraint])
        );
    }

    #[test]
    fn verdict_json_shape() {
        let v = Verdict::Ambiguous(vec![Tag::Pattern, Tag::Constraint]);
        assert_eq!(
            serde_json::to_value(&v).unwrap(),
            serde_json::json!({ "kind": "ambiguous", "tags": ["pattern", "constraint"] })
        );
        assert_eq!(
            serde_json::to_value(Verdict::Unknown).unwrap(),
            serde_json::json!({ "kind": "unknown" })
        );
    }

    #[test]
    fn classifier_is_deterministic() {
        let a = plan(LEGACY, &KeywordClassifier);
        let b = plan(LEGACY, &KeywordClassifier);
        assert_eq!(a.render(), b.render());
    }

    #[test]
    fn plan_classifies_and_extracts_metadata() {
        let p = plan(LEGACY, &KeywordClassifier);
        let d = &p.document;

        let dec = &d.by_tag(Tag::Decision)[0];
        assert_eq!(dec.id, "DEC-001");
        assert_eq!(dec.title, "Payment provider");
        assert_eq!(dec.related_features, vec!["003"]);
        assert_eq!(dec.date, NaiveDate::from_ymd_opt(2025, 11, 2));

        let pat = &d.by_tag(Tag::Pattern)[0];
        assert_eq!(pat.related_features, vec!["001", "002"]);

        let cons = &d.by_tag(Tag::Constraint)[0];
        assert_eq!(cons.title, "Logging");

        let current = d.by_tag(Tag::Current);
        assert_eq!(current.len(), 1);
        assert_eq!(d.active_feature(), Some("003"));
    }

    #[test]
    fn migration_never_loses_content() {
        let p = plan(LEGACY, &KeywordClassifier);
        let rendered = p.render();
        assert!(non_ws(&rendered) >= non_ws(LEGACY));
        for needle in ["Stripe", "card numbers", "./deploy.sh", "webhook secrets"] {
            assert!(rendered.contains(needle), "lost: {needle}");
        }
    }

    #[test]
    fn labelled_lines_in_legacy_blocks_are_kept() {
        let mut raw = String::from("## Decision\n");
        for n in 1..=40 {
            raw.push_str(&format!("Content: v{n:02}\n"));
        }
        let p = plan(&raw, &KeywordClassifier);
        let rendered = p.render();
        assert!(non_ws(&rendered) >= non_ws(&raw));

        let doc = match parser::parse(&rendered) {
            Parsed::Tagged(doc) => doc,
            Parsed::Unstructured => panic!("migrated document must be tagged"),
        };
        assert_eq!(doc.entries.len(), 1);
        let content = &doc.entries[0].content;
        for n in 1..=40 {
            let line = format!("Content: v{n:02}");
            assert!(content.lines().any(|l| l == line), "lost: {line}");
        }
    }

    #[test]
    fn ambiguous_blocks_are_flagged_not_guessed() {
        let raw = "## Rules\nErrors must use the shared format.\n\n## Lunch\nNoon.\n";
        let p = plan(raw, &KeywordClassifier);
        assert!(p.document.entries.is_empty());
        assert_eq!(p.flagged.len(), 2);
        let rendered = p.render();
        assert!(rendered.contains(NEEDS_REVIEW_HEADING));
        assert!(rendered.contains("#### Rules"));
        assert!(non_ws(&rendered) >= non_ws(raw));

        // Flagged text stays out of the tag sections after a reload.
        match parser::parse(&rendered) {
            Parsed::Tagged(doc) => {
                assert!(doc.entries.is_empty());
                assert!(doc.preamble.contains("shared format"));
            }
            Parsed::Unstructured => panic!("migrated document must be tagged"),
        }
    }

    #[test]
    fn several_current_blocks_merge_into_one() {
        let raw = "## Status\nWorking on feature 004.\n\n## Blockers\nBlocked on design review.\n";
        let p = plan(raw, &KeywordClassifier);
        let current = p.document.by_tag(Tag::Current);
        assert_eq!(current.len(), 1);
        assert!(current[0].content.contains("Blocked on design review."));
        assert!(current[0].content.contains("**Blockers**"));
    }

    #[test]
    fn migrate_backs_up_and_rewrites() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".specmem")).unwrap();
        std::fs::write(dir.path().join(".specmem/memory.md"), LEGACY).unwrap();

        let outcome = migrate(dir.path(), &KeywordClassifier).unwrap();
        assert_eq!(std::fs::read_to_string(&outcome.backup.path).unwrap(), LEGACY);
        assert_eq!(outcome.flagged, 1);

        let store = MemoryStore::open(dir.path()).unwrap();
        assert_eq!(store.entries(), outcome.entries.as_slice());

        // A second run has nothing to do.
        assert!(matches!(
            migrate(dir.path(), &KeywordClassifier),
            Err(SpecmemError::AlreadyTagged { .. })
        ));
    }

    #[test]
    fn backup_failure_leaves_original_untouched() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".specmem")).unwrap();
        std::fs::write(dir.path().join(".specmem/memory.md"), LEGACY).unwrap();
        // A plain file where the backups directory should be.
        std::fs::write(dir.path().join(".specmem/backups"), "not a dir").unwrap();

        let err = migrate(dir.path(), &KeywordClassifier).unwrap_err();
        assert!(matches!(err, SpecmemError::BackupFailure { .. }));
        assert_eq!(
            std::fs::read_to_string(dir.path().join(".specmem/memory.md")).unwrap(),
            LEGACY
        );
    }

    #[test]
    fn backups_never_overwrite_each_other() {
        let dir = TempDir::new().unwrap();
        let a = create_backup(dir.path(), "one").unwrap();
        let b = create_backup(dir.path(), "two").unwrap();
        assert_ne!(a.path, b.path);
        assert_eq!(std::fs::read_to_string(&a.path).unwrap(), "one");
    }
}
