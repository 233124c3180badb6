use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Tag
// ---------------------------------------------------------------------------

/// Classification axis for memory entries. Declaration order is the canonical
/// section order of the memory document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tag {
    Decision,
    Pattern,
    Constraint,
    Current,
}

impl Tag {
    pub fn all() -> &'static [Tag] {
        &[Tag::Decision, Tag::Pattern, Tag::Constraint, Tag::Current]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tag::Decision => "decision",
            Tag::Pattern => "pattern",
            Tag::Constraint => "constraint",
            Tag::Current => "current",
        }
    }

    /// Prefix of every entry id in this tag's namespace (`DEC-001`).
    pub fn id_prefix(self) -> &'static str {
        match self {
            Tag::Decision => "DEC",
            Tag::Pattern => "PATTERN",
            Tag::Constraint => "CONST",
            Tag::Current => "CURRENT",
        }
    }

    pub fn section_heading(self) -> &'static str {
        match self {
            Tag::Decision => "Decisions",
            Tag::Pattern => "Patterns",
            Tag::Constraint => "Constraints",
            Tag::Current => "Current Context",
        }
    }

    /// Label written in front of an entry's free-text body.
    pub fn content_label(self) -> &'static str {
        match self {
            Tag::Decision => "Rationale",
            Tag::Pattern | Tag::Constraint => "Description",
            Tag::Current => "Status",
        }
    }

    /// Label written in front of an entry's related features.
    pub fn relation_label(self) -> &'static str {
        match self {
            Tag::Decision => "Related",
            Tag::Pattern => "Used in",
            Tag::Constraint => "Applies to",
            Tag::Current => "Feature",
        }
    }

    /// Only `current` is rewritten in place; every other tag is append-only.
    pub fn is_singleton(self) -> bool {
        matches!(self, Tag::Current)
    }

    /// Match a `##` section heading. The heading must contain the tag name;
    /// when several do, the one named first wins.
    pub fn from_heading(heading: &str) -> Option<Tag> {
        let lower = heading.to_lowercase();
        Tag::all()
            .iter()
            .copied()
            .filter_map(|t| lower.find(t.as_str()).map(|pos| (pos, t)))
            .min_by_key(|(pos, _)| *pos)
            .map(|(_, t)| t)
    }

    pub fn from_id_prefix(prefix: &str) -> Option<Tag> {
        Tag::all()
            .iter()
            .copied()
            .find(|t| t.id_prefix().eq_ignore_ascii_case(prefix))
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Tag {
    type Err = crate::error::SpecmemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "decision" | "decisions" | "dec" => Ok(Tag::Decision),
            "pattern" | "patterns" => Ok(Tag::Pattern),
            "constraint" | "constraints" | "const" => Ok(Tag::Constraint),
            "current" | "context" => Ok(Tag::Current),
            _ => Err(crate::error::SpecmemError::InvalidTag(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_parse_and_display() {
        for tag in Tag::all() {
            let parsed: Tag = tag.as_str().parse().unwrap();
            assert_eq!(parsed, *tag);
            assert_eq!(tag.to_string(), tag.as_str());
        }
        assert_eq!("Decisions".parse::<Tag>().unwrap(), Tag::Decision);
        assert!("bogus".parse::<Tag>().is_err());
    }

    #[test]
    fn heading_detection_is_case_insensitive() {
        assert_eq!(Tag::from_heading("Architectural DECISIONS"), Some(Tag::Decision));
        assert_eq!(Tag::from_heading("Current Context"), Some(Tag::Current));
        assert_eq!(Tag::from_heading("Patterns in use"), Some(Tag::Pattern));
        assert_eq!(Tag::from_heading("Random notes"), None);
    }

    #[test]
    fn heading_naming_two_tags_takes_the_first() {
        assert_eq!(Tag::from_heading("Constraints on patterns"), Some(Tag::Constraint));
        assert_eq!(Tag::from_heading("Patterns and decisions"), Some(Tag::Pattern));
    }

    #[test]
    fn id_prefix_lookup() {
        assert_eq!(Tag::from_id_prefix("DEC"), Some(Tag::Decision));
        assert_eq!(Tag::from_id_prefix("const"), Some(Tag::Constraint));
        assert_eq!(Tag::from_id_prefix("NOPE"), None);
    }
}
