use crate::memory::{MemoryDocument, MemoryEntry};
use crate::types::Tag;
use chrono::NaiveDate;
use regex::Regex;
use std::fmt::Write as _;
use std::sync::OnceLock;

/// Written when a document has no preamble of its own.
pub const DEFAULT_PREAMBLE: &str = "# Project Memory";

// ---------------------------------------------------------------------------
// Line grammar
// ---------------------------------------------------------------------------

static SECTION_RE: OnceLock<Regex> = OnceLock::new();
static ENTRY_RE: OnceLock<Regex> = OnceLock::new();
static ENTRY_ID_RE: OnceLock<Regex> = OnceLock::new();
static FIELD_RE: OnceLock<Regex> = OnceLock::new();
static LABEL_COLON_RE: OnceLock<Regex> = OnceLock::new();
static HEADING_LIKE_RE: OnceLock<Regex> = OnceLock::new();

/// `## Decisions`: exactly two hashes.
fn section_re() -> &'static Regex {
    SECTION_RE.get_or_init(|| Regex::new(r"^\s{0,3}##[ \t]+(.+?)[ \t#]*$").unwrap())
}

/// `### DEC-001: Title` or a bare `### Title`.
fn entry_re() -> &'static Regex {
    ENTRY_RE.get_or_init(|| Regex::new(r"^\s{0,3}#{3,6}[ \t]+(.*?)[ \t]*$").unwrap())
}

fn entry_id_re() -> &'static Regex {
    ENTRY_ID_RE
        .get_or_init(|| Regex::new(r"^([A-Za-z]+)-(\d+)[ \t]*(?::[ \t]*(.*))?$").unwrap())
}

/// `- **Rationale**: text`, `**Date:** 2026-01-01`, `Used in: 001, 002`.
fn field_re() -> &'static Regex {
    FIELD_RE.get_or_init(|| {
        Regex::new(
            r"^\s*(?:[-*+][ \t]+)?(?:\*\*|__)?[ \t]*([A-Za-z][A-Za-z \t]{0,24}?)[ \t]*(?:\*\*|__)?[ \t]*:[ \t]*(?:\*\*|__)?[ \t]*(.*)$",
        )
        .unwrap()
    })
}

/// A label line split around its colon, with any backslashes before the
/// colon captured separately: `Status\: x` → (`Status`, `Status`, `\`, ` x`).
fn label_colon_re() -> &'static Regex {
    LABEL_COLON_RE.get_or_init(|| {
        Regex::new(
            r"^(\s*(?:[-*+][ \t]+)?(?:\*\*|__)?[ \t]*([A-Za-z][A-Za-z \t]{0,24}?)[ \t]*(?:\*\*|__)?[ \t]*)(\\*):(.*)$",
        )
        .unwrap()
    })
}

/// Anything the section or entry grammar could read as a heading, escaped or not.
fn heading_like_re() -> &'static Regex {
    HEADING_LIKE_RE.get_or_init(|| Regex::new(r"^(\s{0,3})(\\*#.*)$").unwrap())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Content,
    Relation,
    Date,
}

fn field_kind(label: &str) -> Option<FieldKind> {
    let normalized = label.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    match normalized.as_str() {
        "rationale" | "description" | "example" | "status" | "content" | "context" => {
            Some(FieldKind::Content)
        }
        "related" | "related features" | "used in" | "applies to" | "feature" | "features" => {
            Some(FieldKind::Relation)
        }
        "date" | "created" | "updated" | "last updated" => Some(FieldKind::Date),
        _ => None,
    }
}

/// Split a relation value into feature ids: `001, #002 003` → `["001", "002", "003"]`.
pub fn split_features(value: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for raw in value.split(|c: char| c == ',' || c == ';' || c.is_whitespace()) {
        let id = raw.trim().trim_start_matches('#').trim_matches('`');
        if id.is_empty() || matches!(id.to_lowercase().as_str(), "none" | "n/a" | "-") {
            continue;
        }
        if !out.iter().any(|f| f == id) {
            out.push(id.to_string());
        }
    }
    out
}

/// Opening or closing line of a fenced code block. Headings and labels
/// inside a fence are plain text.
pub fn is_fence(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with("```") || t.starts_with("~~~")
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    let v = value.trim();
    let head = v.get(..10).unwrap_or(v);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

/// Numeric suffix of an id in the given tag's namespace.
pub fn id_number(id: &str, tag: Tag) -> Option<u32> {
    let (prefix, digits) = id.split_once('-')?;
    if !prefix.eq_ignore_ascii_case(tag.id_prefix()) {
        return None;
    }
    digits.parse().ok()
}

pub fn format_id(tag: Tag, n: u32) -> String {
    format!("{}-{:03}", tag.id_prefix(), n)
}

// ---------------------------------------------------------------------------
// Parse
// ---------------------------------------------------------------------------

/// Result of reading a memory document.
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed {
    Tagged(MemoryDocument),
    /// Non-blank text with no tag section at all: a legacy document that
    /// needs migration.
    Unstructured,
}

struct EntryBuilder {
    tag: Tag,
    id: String,
    title: String,
    lines: Vec<String>,
    date: Option<NaiveDate>,
    related: Vec<String>,
    /// Only the first content label is a field; later ones are body text.
    content_seen: bool,
}

impl EntryBuilder {
    fn new(tag: Tag, heading: &str) -> Self {
        let (id, title) = match entry_id_re().captures(heading) {
            Some(caps) => (
                format!("{}-{}", caps[1].to_uppercase(), &caps[2]),
                caps.get(3).map(|m| m.as_str().trim().to_string()).unwrap_or_default(),
            ),
            None => (String::new(), heading.trim().to_string()),
        };
        Self {
            tag,
            id,
            title,
            lines: Vec::new(),
            date: None,
            related: Vec::new(),
            content_seen: false,
        }
    }

    fn push_line(&mut self, line: &str) {
        if let Some(caps) = field_re().captures(line) {
            if let Some(kind) = field_kind(&caps[1]) {
                let value = caps[2].trim();
                match kind {
                    FieldKind::Content if !self.content_seen => {
                        self.content_seen = true;
                        self.lines.push(value.to_string());
                        return;
                    }
                    FieldKind::Content => {}
                    FieldKind::Relation => {
                        for f in split_features(value) {
                            if !self.related.contains(&f) {
                                self.related.push(f);
                            }
                        }
                        return;
                    }
                    FieldKind::Date if self.date.is_none() => {
                        if let Some(d) = parse_date(value) {
                            self.date = Some(d);
                            return;
                        }
                    }
                    // A second or unparseable date stays in the body.
                    FieldKind::Date => {}
                }
            }
        }
        self.lines.push(unescape_body_line(line.trim_end()));
    }

    fn finish(self) -> MemoryEntry {
        MemoryEntry {
            id: self.id,
            tag: self.tag,
            title: self.title,
            content: join_trimmed(&self.lines),
            date: self.date,
            related_features: self.related,
        }
    }
}

/// Read loose body text with the same field rules `parse` applies inside an
/// entry, so the result renders and re-parses to itself. Content labels in
/// loose text are kept verbatim; only dates and relations are lifted out.
pub(crate) fn entry_from_body(tag: Tag, id: String, title: String, body: &str) -> MemoryEntry {
    let mut b = EntryBuilder {
        tag,
        id,
        title,
        lines: Vec::new(),
        date: None,
        related: Vec::new(),
        content_seen: true,
    };
    let mut in_fence = false;
    for line in body.lines() {
        let fence_line = is_fence(line);
        if in_fence || fence_line {
            if fence_line {
                in_fence = !in_fence;
            }
            b.lines.push(line.trim_end().to_string());
            continue;
        }
        b.push_line(line);
    }
    b.finish()
}

fn join_trimmed(lines: &[String]) -> String {
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    match (start, end) {
        (Some(s), Some(e)) => lines[s..=e].join("\n"),
        _ => String::new(),
    }
}

/// Parse a memory document. Parsing never fails: missing fields default to
/// empty, and lines that carry no recognized label are kept in the entry body.
pub fn parse(raw: &str) -> Parsed {
    if raw.trim().is_empty() {
        return Parsed::Tagged(MemoryDocument::default());
    }

    let mut doc = MemoryDocument::default();
    let mut preamble: Vec<String> = Vec::new();
    let mut intro: Vec<String> = Vec::new();
    let mut section: Option<Tag> = None;
    let mut entry: Option<EntryBuilder> = None;

    fn flush_intro(doc: &mut MemoryDocument, tag: Option<Tag>, intro: &mut Vec<String>) {
        if let Some(tag) = tag {
            let text = join_trimmed(intro);
            if !text.is_empty() {
                let slot = doc.intros.entry(tag).or_default();
                if !slot.is_empty() {
                    slot.push_str("\n\n");
                }
                slot.push_str(&text);
            }
        }
        intro.clear();
    }

    let mut in_fence = false;
    for line in raw.lines() {
        let fence_line = is_fence(line);
        if in_fence || fence_line {
            if fence_line {
                in_fence = !in_fence;
            }
            let text = line.trim_end().to_string();
            match (section, entry.as_mut()) {
                (None, _) => preamble.push(text),
                (Some(_), Some(b)) => b.lines.push(text),
                (Some(_), None) => intro.push(text),
            }
            continue;
        }

        if !line.trim_start().starts_with("###") {
            if let Some(caps) = section_re().captures(line) {
                if let Some(tag) = Tag::from_heading(&caps[1]) {
                    if let Some(b) = entry.take() {
                        doc.entries.push(b.finish());
                    }
                    flush_intro(&mut doc, section, &mut intro);
                    section = Some(tag);
                    continue;
                }
            }
        }

        let Some(tag) = section else {
            preamble.push(line.trim_end().to_string());
            continue;
        };

        if let Some(caps) = entry_re().captures(line) {
            if let Some(b) = entry.take() {
                doc.entries.push(b.finish());
            }
            flush_intro(&mut doc, section, &mut intro);
            entry = Some(EntryBuilder::new(tag, &caps[1]));
            continue;
        }

        match entry.as_mut() {
            Some(b) => b.push_line(line),
            None => intro.push(line.trim_end().to_string()),
        }
    }

    if section.is_none() {
        return Parsed::Unstructured;
    }
    if let Some(b) = entry.take() {
        doc.entries.push(b.finish());
    }
    flush_intro(&mut doc, section, &mut intro);
    doc.preamble = join_trimmed(&preamble);
    Parsed::Tagged(doc)
}

// ---------------------------------------------------------------------------
// Render
// ---------------------------------------------------------------------------

/// Content lines that would read back as a field or a heading get one extra
/// backslash: before the colon of a known label, or before a leading `#`.
/// `unescape_body_line` removes exactly one, so text that already carries
/// backslashes survives too.
fn escape_body_line(line: &str) -> String {
    if let Some(caps) = heading_like_re().captures(line) {
        return format!("{}\\{}", &caps[1], &caps[2]);
    }
    if let Some(caps) = label_colon_re().captures(line) {
        if field_kind(&caps[2]).is_some() {
            return format!("{}\\{}:{}", &caps[1], &caps[3], &caps[4]);
        }
    }
    line.to_string()
}

fn unescape_body_line(line: &str) -> String {
    if let Some(caps) = heading_like_re().captures(line) {
        if let Some(rest) = caps[2].strip_prefix('\\') {
            return format!("{}{rest}", &caps[1]);
        }
        return line.to_string();
    }
    if let Some(caps) = label_colon_re().captures(line) {
        if field_kind(&caps[2]).is_some() {
            if let Some(rest) = caps[3].strip_prefix('\\') {
                return format!("{}{rest}:{}", &caps[1], &caps[4]);
            }
        }
    }
    line.to_string()
}

pub fn render_entry(entry: &MemoryEntry) -> String {
    let mut out = String::new();
    if entry.id.is_empty() {
        let _ = writeln!(out, "### {}", entry.title);
    } else if entry.title.is_empty() {
        let _ = writeln!(out, "### {}:", entry.id);
    } else {
        let _ = writeln!(out, "### {}: {}", entry.id, entry.title);
    }

    let mut body = entry.content.lines().peekable();
    if let Some(first) = body.peek() {
        // A fence must start its own line or the parser will not see it.
        if is_fence(first) {
            let _ = writeln!(out, "- **{}**:", entry.tag.content_label());
        } else {
            let _ = writeln!(out, "- **{}**: {}", entry.tag.content_label(), first);
            body.next();
        }
        let mut in_fence = false;
        for line in body {
            if is_fence(line) {
                in_fence = !in_fence;
                let _ = writeln!(out, "{line}");
            } else if in_fence {
                let _ = writeln!(out, "{line}");
            } else {
                let _ = writeln!(out, "{}", escape_body_line(line));
            }
        }
    }
    if let Some(date) = entry.date {
        let _ = writeln!(out, "- **Date**: {}", date.format("%Y-%m-%d"));
    }
    if !entry.related_features.is_empty() {
        let _ = writeln!(
            out,
            "- **{}**: {}",
            entry.tag.relation_label(),
            entry.related_features.join(", ")
        );
    }
    out
}

/// Render the whole document. Sections always appear in canonical tag order,
/// entries within a section in creation order.
pub fn render(doc: &MemoryDocument) -> String {
    let mut out = String::new();
    if doc.preamble.trim().is_empty() {
        out.push_str(DEFAULT_PREAMBLE);
    } else {
        out.push_str(doc.preamble.trim_end());
    }
    out.push('\n');

    for &tag in Tag::all() {
        let _ = write!(out, "\n## {}\n", tag.section_heading());
        if let Some(intro) = doc.intros.get(&tag).filter(|s| !s.trim().is_empty()) {
            let _ = write!(out, "\n{}\n", intro.trim_end());
        }
        for entry in doc.entries.iter().filter(|e| e.tag == tag) {
            out.push('\n');
            out.push_str(&render_entry(entry));
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
