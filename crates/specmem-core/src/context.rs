use crate::config::{Config, ContextConfig, CONTEXT_CHAR_LIMIT};
use crate::error::{Result, SpecmemError};
use crate::memory::{MemoryDocument, MemoryEntry, MemoryStore};
use crate::profile::ProjectProfile;
use crate::types::Tag;
use serde::Serialize;
use std::path::Path;

/// Opening marker of an injected context block. HTML comments keep the block
/// invisible in rendered markdown.
pub const CONTEXT_START: &str = "<!-- specmem:context:start -->";
/// Closing marker of an injected context block.
pub const CONTEXT_END: &str = "<!-- specmem:context:end -->";

// ---------------------------------------------------------------------------
// ContextBlock
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextBlock {
    /// Newline-separated lines, never longer than `CONTEXT_CHAR_LIMIT` chars.
    pub content: String,
    /// Ids of the entries that made it in, in block order.
    pub included: Vec<String>,
    /// Candidates left out because the next one would break the ceiling.
    pub dropped: usize,
}

impl ContextBlock {
    pub fn render(&self) -> String {
        format!("{CONTEXT_START}\n{}\n{CONTEXT_END}", self.content)
    }

    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

fn entry_line(entry: &MemoryEntry) -> String {
    if entry.title.is_empty() {
        format!("- {}", entry.id)
    } else {
        format!("- {}: {}", entry.id, entry.title)
    }
}

fn clip(line: String, limit: usize) -> String {
    if line.chars().count() <= limit {
        return line;
    }
    let mut out: String = line.chars().take(limit.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

/// Decisions first, then patterns; most recent first within each.
fn candidates<'a>(
    doc: &'a MemoryDocument,
    feature: Option<&str>,
    opts: &ContextConfig,
) -> Vec<&'a MemoryEntry> {
    let (decisions, patterns): (Vec<&MemoryEntry>, Vec<&MemoryEntry>) = match feature {
        Some(f) => {
            let relevant = doc.relevant(f);
            let pick = |tag: Tag, max: usize| {
                relevant
                    .iter()
                    .rev()
                    .filter(|e| e.tag == tag)
                    .take(max)
                    .copied()
                    .collect::<Vec<_>>()
            };
            (
                pick(Tag::Decision, opts.max_decisions),
                pick(Tag::Pattern, opts.max_patterns),
            )
        }
        None => (
            doc.recent(Tag::Decision, Some(opts.max_decisions)),
            doc.recent(Tag::Pattern, Some(opts.max_patterns)),
        ),
    };
    decisions.into_iter().chain(patterns).collect()
}

/// Build the bounded context block. Entries are added greedily and whole; the
/// first one that would overflow the ceiling stops the fill.
pub fn build_context(
    profile: &ProjectProfile,
    doc: &MemoryDocument,
    feature: Option<&str>,
    opts: &ContextConfig,
) -> ContextBlock {
    let mut content = clip(profile.summary_line(), CONTEXT_CHAR_LIMIT);
    let mut len = content.chars().count();
    let mut included = Vec::new();

    let pool = candidates(doc, feature, opts);
    let total = pool.len();
    for entry in pool {
        let line = entry_line(entry);
        let next = len + 1 + line.chars().count();
        if next > CONTEXT_CHAR_LIMIT {
            break;
        }
        content.push('\n');
        content.push_str(&line);
        len = next;
        included.push(entry.id.clone());
    }

    let dropped = total - included.len();
    if dropped > 0 {
        tracing::debug!(dropped, "context ceiling reached");
    }
    ContextBlock {
        content,
        included,
        dropped,
    }
}

/// Load profile, config, and memory for `root` and build the context block.
pub fn inject(root: &Path, feature: Option<&str>) -> Result<ContextBlock> {
    let profile = ProjectProfile::load(root)?;
    let config = Config::load(root)?;
    // A legacy document still yields the profile summary; only `migrate`
    // rewrites it.
    let doc = match MemoryStore::open(root) {
        Ok(store) => store.document().clone(),
        Err(SpecmemError::UnstructuredDocument { path }) => {
            tracing::warn!(
                path = %path.display(),
                "memory document is untagged; injecting profile summary only"
            );
            MemoryDocument::default()
        }
        Err(e) => return Err(e),
    };
    Ok(build_context(&profile, &doc, feature, &config.context))
}

// ---------------------------------------------------------------------------
// Writing into templates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectOutcome {
    Created,
    Replaced,
    Prepended,
    /// A start marker without its end marker; the file was left alone.
    Skipped,
}

/// Put `block` into the file at `path`: refresh an existing marked block in
/// place, otherwise prepend it.
pub fn inject_into_file(path: &Path, block: &ContextBlock) -> Result<InjectOutcome> {
    let rendered = block.render();
    let Some(existing) = crate::io::read_optional(path)? else {
        crate::io::atomic_write(path, format!("{rendered}\n").as_bytes())?;
        return Ok(InjectOutcome::Created);
    };

    if existing.contains(CONTEXT_START) {
        return match crate::io::replace_between_markers(
            &existing,
            CONTEXT_START,
            CONTEXT_END,
            &rendered,
        ) {
            Some(updated) => {
                crate::io::atomic_write(path, updated.as_bytes())?;
                Ok(InjectOutcome::Replaced)
            }
            None => {
                tracing::warn!(path = %path.display(), "context start marker without end marker");
                Ok(InjectOutcome::Skipped)
            }
        };
    }

    crate::io::atomic_write(path, format!("{rendered}\n\n{existing}").as_bytes())?;
    Ok(InjectOutcome::Prepended)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(id: &str, tag: Tag, title: &str, related: &[&str]) -> MemoryEntry {
        MemoryEntry {
            id: id.to_string(),
            tag,
            title: title.to_string(),
            content: String::new(),
            date: None,
            related_features: related.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn doc(entries: Vec<MemoryEntry>) -> MemoryDocument {
        MemoryDocument {
            entries,
            ..Default::default()
        }
    }

    #[test]
    fn empty_memory_yields_summary_only() {
        let block = build_context(
            &ProjectProfile::default(),
            &MemoryDocument::default(),
            None,
            &ContextConfig::default(),
        );
        assert_eq!(block.content, "Project: (unconfigured)");
        assert!(block.included.is_empty());
        assert!(block.render().starts_with(CONTEXT_START));
        assert!(block.render().ends_with(CONTEXT_END));
    }

    #[test]
    fn unscoped_takes_three_recent_decisions_then_patterns() {
        let mut entries: Vec<MemoryEntry> = (1..=5)
            .map(|n| entry(&format!("DEC-00{n}"), Tag::Decision, "d", &[]))
            .collect();
        entries.extend((1..=4).map(|n| entry(&format!("PATTERN-00{n}"), Tag::Pattern, "p", &[])));
        entries.push(entry("CONST-001", Tag::Constraint, "c", &[]));

        let block = build_context(
            &ProjectProfile::default(),
            &doc(entries),
            None,
            &ContextConfig::default(),
        );
        assert_eq!(
            block.included,
            vec!["DEC-005", "DEC-004", "DEC-003", "PATTERN-004", "PATTERN-003", "PATTERN-002"]
        );
    }

    #[test]
    fn scoped_uses_relevant_entries_only() {
        let d = doc(vec![
            entry("DEC-001", Tag::Decision, "Use Stripe", &["003"]),
            entry("DEC-002", Tag::Decision, "Use Redis", &["004"]),
            entry("PATTERN-001", Tag::Pattern, "API Error Format", &["001", "003"]),
            entry("CURRENT-001", Tag::Current, "Checkout", &["003"]),
        ]);
        let block = build_context(
            &ProjectProfile::default(),
            &d,
            Some("003"),
            &ContextConfig::default(),
        );
        assert_eq!(block.included, vec!["DEC-001", "PATTERN-001"]);
        assert!(block.content.contains("- DEC-001: Use Stripe"));
        assert!(!block.content.contains("Redis"));
    }

    #[test]
    fn fill_stops_before_the_ceiling_without_partial_entries() {
        // Each line is exactly 80 chars: "- DEC-0NN: " (11) + 69 title chars.
        let title = "x".repeat(69);
        let entries: Vec<MemoryEntry> = (1..=10)
            .map(|n| entry(&format!("DEC-{n:03}"), Tag::Decision, &title, &[]))
            .collect();
        let opts = ContextConfig {
            max_decisions: 10,
            max_patterns: 0,
        };
        let block = build_context(&ProjectProfile::default(), &doc(entries), None, &opts);

        assert!(block.char_len() <= CONTEXT_CHAR_LIMIT);
        assert!(block.included.len() <= 6);
        assert_eq!(block.included.len() + block.dropped, 10);
        for line in block.content.lines().skip(1) {
            assert_eq!(line.chars().count(), 80, "partial entry: {line}");
        }
    }

    #[test]
    fn ceiling_holds_for_huge_profiles() {
        let mut profile = ProjectProfile::default();
        profile.set("name", &"n".repeat(2000)).unwrap();
        for i in 0..50 {
            profile.add_preference(&format!("preference number {i}"));
        }
        let d = doc(vec![entry("DEC-001", Tag::Decision, "Use Stripe", &[])]);
        let block = build_context(&profile, &d, None, &ContextConfig::default());
        assert!(block.char_len() <= CONTEXT_CHAR_LIMIT);
        assert!(block.included.is_empty());
        assert_eq!(block.dropped, 1);
    }

    #[test]
    fn ceiling_counts_characters_not_bytes() {
        let title = "é".repeat(60);
        let entries: Vec<MemoryEntry> = (1..=3)
            .map(|n| entry(&format!("DEC-{n:03}"), Tag::Decision, &title, &[]))
            .collect();
        let block = build_context(
            &ProjectProfile::default(),
            &doc(entries),
            None,
            &ContextConfig::default(),
        );
        assert_eq!(block.included.len(), 3);
        assert!(block.char_len() <= CONTEXT_CHAR_LIMIT);
    }

    #[test]
    fn inject_into_file_prepends_then_replaces() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plan.md");
        std::fs::write(&path, "# Plan\n").unwrap();

        let first = ContextBlock {
            content: "Project: one".to_string(),
            included: vec![],
            dropped: 0,
        };
        assert_eq!(inject_into_file(&path, &first).unwrap(), InjectOutcome::Prepended);

        let second = ContextBlock {
            content: "Project: two".to_string(),
            included: vec![],
            dropped: 0,
        };
        assert_eq!(inject_into_file(&path, &second).unwrap(), InjectOutcome::Replaced);

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("Project: two"));
        assert!(!text.contains("Project: one"));
        assert_eq!(text.matches(CONTEXT_START).count(), 1);
        assert!(text.ends_with("# Plan\n"));
    }

    #[test]
    fn inject_into_missing_file_creates_it() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("new.md");
        let block = ContextBlock {
            content: "Project: (unconfigured)".to_string(),
            included: vec![],
            dropped: 0,
        };
        assert_eq!(inject_into_file(&path, &block).unwrap(), InjectOutcome::Created);
        assert!(std::fs::read_to_string(&path).unwrap().contains(CONTEXT_END));
    }

    #[test]
    fn inject_skips_unterminated_block() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.md");
        let original = format!("{CONTEXT_START}\nhalf\n");
        std::fs::write(&path, &original).unwrap();
        let block = ContextBlock {
            content: "x".to_string(),
            included: vec![],
            dropped: 0,
        };
        assert_eq!(inject_into_file(&path, &block).unwrap(), InjectOutcome::Skipped);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn inject_reads_store_and_profile() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".specmem")).unwrap();
        let mut store = MemoryStore::open(dir.path()).unwrap();
        store.add(Tag::Decision, "Use Stripe", "PCI", &["003".to_string()]).unwrap();
        let mut profile = ProjectProfile::default();
        profile.set("name", "shop").unwrap();
        profile.save(dir.path()).unwrap();

        let block = inject(dir.path(), Some("003")).unwrap();
        assert!(block.content.starts_with("Project: shop"));
        assert_eq!(block.included, vec!["DEC-001"]);
    }

    #[test]
    fn inject_on_legacy_memory_uses_summary_only() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".specmem")).unwrap();
        std::fs::write(
            dir.path().join(".specmem/memory.md"),
            "We chose Stripe for payments.\n",
        )
        .unwrap();
        let mut profile = ProjectProfile::default();
        profile.set("name", "shop").unwrap();
        profile.save(dir.path()).unwrap();

        let block = inject(dir.path(), None).unwrap();
        assert!(block.included.is_empty());
        assert!(block.content.starts_with("Project: shop"));
        assert!(!block.content.contains("Stripe"));
    }

    #[test]
    fn inject_still_rejects_a_malformed_profile() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".specmem")).unwrap();
        std::fs::write(dir.path().join(".specmem/memory.md"), "legacy notes\n").unwrap();
        std::fs::write(dir.path().join(".specmem/project.yaml"), "name: [unclosed\n").unwrap();
        assert!(matches!(
            inject(dir.path(), None),
            Err(SpecmemError::MalformedProfile { .. })
        ));
    }
}
