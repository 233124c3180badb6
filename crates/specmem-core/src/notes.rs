use crate::error::{Result, SpecmemError};
use crate::paths;
use crate::session::Session;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// Note
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// All notes for one feature, stored at `.specmem/notes/<feature>.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureNotes {
    pub feature: String,
    /// Monotonic counter; ids are never reused after a note is removed.
    #[serde(default)]
    pub next_seq: u32,
    #[serde(default)]
    pub notes: Vec<Note>,
}

impl FeatureNotes {
    pub fn load(root: &Path, feature: &str) -> Result<Self> {
        paths::validate_feature_id(feature)?;
        let path = paths::notes_path(root, feature);
        match crate::io::read_optional(&path)? {
            Some(data) if !data.trim().is_empty() => Ok(serde_yaml::from_str(&data)?),
            _ => Ok(Self {
                feature: feature.to_string(),
                ..Self::default()
            }),
        }
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::notes_path(root, &self.feature);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    fn push(&mut self, body: &str) -> Note {
        self.next_seq += 1;
        let note = Note {
            id: format!("N{}", self.next_seq),
            body: body.trim().to_string(),
            created_at: Utc::now(),
        };
        self.notes.push(note.clone());
        note
    }

    fn remove(&mut self, id: &str) -> bool {
        match self.notes.iter().position(|n| n.id.eq_ignore_ascii_case(id)) {
            Some(pos) => {
                self.notes.remove(pos);
                true
            }
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Attach a note to `feature`, or to the session's active feature when none
/// is given.
pub fn add_note(session: &Session, feature: Option<&str>, body: &str) -> Result<(String, Note)> {
    let feature = match feature.or(session.active_feature()) {
        Some(f) => f.to_string(),
        None => return Err(SpecmemError::NoActiveFeature),
    };
    let mut notes = FeatureNotes::load(session.root(), &feature)?;
    let note = notes.push(body);
    notes.save(session.root())?;
    tracing::debug!(feature = %feature, id = %note.id, "added note");
    Ok((feature, note))
}

pub fn list_notes(root: &Path, feature: &str) -> Result<Vec<Note>> {
    Ok(FeatureNotes::load(root, feature)?.notes)
}

pub fn remove_note(root: &Path, feature: &str, id: &str) -> Result<()> {
    let mut notes = FeatureNotes::load(root, feature)?;
    if !notes.remove(id) {
        return Err(SpecmemError::NoteNotFound {
            feature: feature.to_string(),
            id: id.to_string(),
        });
    }
    notes.save(root)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
