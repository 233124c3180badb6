//! Read-only projections over a memory document.
//!
//! Every query is a single pass over the entries. Entries inside a tag are
//! already in creation order, so "most recent" is simply reverse document order.

use crate::memory::{MemoryDocument, MemoryEntry};
use crate::types::Tag;
use std::collections::HashMap;

impl MemoryDocument {
    /// All entries with `tag`, in creation order.
    pub fn by_tag(&self, tag: Tag) -> Vec<&MemoryEntry> {
        self.entries.iter().filter(|e| e.tag == tag).collect()
    }

    /// Entries related to `feature_id` across all tags, ordered by tag then
    /// creation order.
    pub fn by_feature(&self, feature_id: &str) -> Vec<&MemoryEntry> {
        let mut buckets: [Vec<&MemoryEntry>; 4] = Default::default();
        for e in self.entries.iter().filter(|e| e.relates_to(feature_id)) {
            buckets[tag_slot(e.tag)].push(e);
        }
        buckets.into_iter().flatten().collect()
    }

    /// The last `n` entries of `tag`, most recent first. `None` returns all.
    pub fn recent(&self, tag: Tag, n: Option<usize>) -> Vec<&MemoryEntry> {
        let limit = n.unwrap_or(usize::MAX);
        self.entries
            .iter()
            .rev()
            .filter(|e| e.tag == tag)
            .take(limit)
            .collect()
    }

    /// Decisions and patterns directly related to `feature_id`, plus the
    /// current-context entry when it is focused on that feature.
    ///
    /// Patterns reachable only through another feature are not included.
    pub fn relevant(&self, feature_id: &str) -> Vec<&MemoryEntry> {
        let mut decisions = Vec::new();
        let mut patterns = Vec::new();
        let mut current = None;
        for e in &self.entries {
            match e.tag {
                Tag::Decision if e.relates_to(feature_id) => decisions.push(e),
                Tag::Pattern if e.relates_to(feature_id) => patterns.push(e),
                Tag::Current
                    if current.is_none()
                        && e.related_features.first().map(String::as_str) == Some(feature_id) =>
                {
                    current = Some(e)
                }
                _ => {}
            }
        }
        decisions.extend(patterns);
        decisions.extend(current);
        decisions
    }
}

fn tag_slot(tag: Tag) -> usize {
    match tag {
        Tag::Decision => 0,
        Tag::Pattern => 1,
        Tag::Constraint => 2,
        Tag::Current => 3,
    }
}

// ---------------------------------------------------------------------------
// FeatureIndex
// ---------------------------------------------------------------------------

/// Inverted feature → entry index, built once and reused for many lookups.
/// Answers exactly what `by_feature` and `relevant` answer.
pub struct FeatureIndex<'a> {
    doc: &'a MemoryDocument,
    by_feature: HashMap<&'a str, Vec<usize>>,
}

impl<'a> FeatureIndex<'a> {
    pub fn build(doc: &'a MemoryDocument) -> Self {
        let mut by_feature: HashMap<&'a str, Vec<usize>> = HashMap::new();
        for (i, e) in doc.entries.iter().enumerate() {
            for f in &e.related_features {
                by_feature.entry(f.as_str()).or_default().push(i);
            }
        }
        Self { doc, by_feature }
    }

    pub fn feature_count(&self) -> usize {
        self.by_feature.len()
    }

    pub fn by_feature(&self, feature_id: &str) -> Vec<&'a MemoryEntry> {
        let Some(idx) = self.by_feature.get(feature_id) else {
            return Vec::new();
        };
        let mut hits: Vec<&'a MemoryEntry> = idx.iter().map(|&i| &self.doc.entries[i]).collect();
        // Stable sort keeps creation order inside each tag.
        hits.sort_by_key(|e| tag_slot(e.tag));
        hits
    }

    pub fn relevant(&self, feature_id: &str) -> Vec<&'a MemoryEntry> {
        let Some(idx) = self.by_feature.get(feature_id) else {
            return Vec::new();
        };
        let current_idx = self.doc.entries.iter().position(|e| e.tag == Tag::Current);
        let mut hits: Vec<&'a MemoryEntry> = idx
            .iter()
            .map(|&i| (i, &self.doc.entries[i]))
            .filter(|(i, e)| match e.tag {
                Tag::Decision | Tag::Pattern => true,
                Tag::Current => {
                    Some(*i) == current_idx
                        && e.related_features.first().map(String::as_str) == Some(feature_id)
                }
                Tag::Constraint => false,
            })
            .map(|(_, e)| e)
            .collect();
        hits.sort_by_key(|e| tag_slot(e.tag));
        hits
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

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

    fn ids(entries: &[&MemoryEntry]) -> Vec<String> {
        entries.iter().map(|e| e.id.clone()).collect()
    }

    fn sample() -> MemoryDocument {
        doc(vec![
            entry("DEC-001", Tag::Decision, "D1", &["001"]),
            entry("PATTERN-001", Tag::Pattern, "P1", &["001", "002"]),
            entry("PATTERN-002", Tag::Pattern, "P2", &["002"]),
            entry("CONST-001", Tag::Constraint, "C1", &["002"]),
            entry("CURRENT-001", Tag::Current, "Now", &["002"]),
        ])
    }

    #[test]
    fn relevance_is_a_direct_union() {
        let d = sample();
        assert_eq!(ids(&d.relevant("001")), vec!["DEC-001", "PATTERN-001"]);
        assert_eq!(
            ids(&d.relevant("002")),
            vec!["PATTERN-001", "PATTERN-002", "CURRENT-001"]
        );
    }

    #[test]
    fn relevance_scenario_orders_decisions_before_patterns() {
        let d = doc(vec![
            entry("PATTERN-001", Tag::Pattern, "API Error Format", &["001", "002", "003"]),
            entry("DEC-001", Tag::Decision, "Use Stripe", &["003"]),
        ]);
        assert_eq!(ids(&d.relevant("003")), vec!["DEC-001", "PATTERN-001"]);
    }

    #[test]
    fn relevance_for_unknown_feature_is_empty() {
        assert!(sample().relevant("999").is_empty());
    }

    #[test]
    fn relevance_does_not_expand_transitively() {
        // P2 shares feature 002 with P1, which relates to 001; P2 must not leak in.
        let binding = sample();
        let r = binding.relevant("001");
        assert!(!r.iter().any(|e| e.id == "PATTERN-002"));
    }

    #[test]
    fn by_feature_spans_all_tags_in_tag_order() {
        let d = doc(vec![
            entry("CONST-001", Tag::Constraint, "C", &["007"]),
            entry("CURRENT-001", Tag::Current, "Now", &["007"]),
            entry("PATTERN-001", Tag::Pattern, "P", &["007"]),
            entry("DEC-001", Tag::Decision, "D1", &["007"]),
            entry("DEC-002", Tag::Decision, "D2", &["007"]),
        ]);
        assert_eq!(
            ids(&d.by_feature("007")),
            vec!["DEC-001", "DEC-002", "PATTERN-001", "CONST-001", "CURRENT-001"]
        );
    }

    #[test]
    fn recent_returns_newest_first() {
        let d = doc(
            (1..=5)
                .map(|n| entry(&format!("DEC-00{n}"), Tag::Decision, "d", &[]))
                .collect(),
        );
        assert_eq!(
            ids(&d.recent(Tag::Decision, Some(3))),
            vec!["DEC-005", "DEC-004", "DEC-003"]
        );
        assert_eq!(d.recent(Tag::Decision, None).len(), 5);
        assert_eq!(d.recent(Tag::Decision, Some(50)).len(), 5);
        assert!(d.recent(Tag::Pattern, Some(3)).is_empty());
    }

    #[test]
    fn by_tag_keeps_creation_order() {
        let d = sample();
        assert_eq!(ids(&d.by_tag(Tag::Pattern)), vec!["PATTERN-001", "PATTERN-002"]);
    }

    #[test]
    fn index_matches_linear_queries() {
        let d = sample();
        let index = FeatureIndex::build(&d);
        assert_eq!(index.feature_count(), 2);
        for f in ["001", "002", "999"] {
            assert_eq!(ids(&index.by_feature(f)), ids(&d.by_feature(f)));
            assert_eq!(ids(&index.relevant(f)), ids(&d.relevant(f)));
        }
    }
}
