use crate::error::{Result, SpecmemError};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const SPECMEM_DIR: &str = ".specmem";
pub const BACKUPS_DIR: &str = ".specmem/backups";
pub const NOTES_DIR: &str = ".specmem/notes";

pub const MEMORY_FILE: &str = ".specmem/memory.md";
pub const ARCHIVE_FILE: &str = ".specmem/memory-archive.md";
pub const PROFILE_FILE: &str = ".specmem/project.yaml";
pub const CONFIG_FILE: &str = ".specmem/config.yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn specmem_dir(root: &Path) -> PathBuf {
    root.join(SPECMEM_DIR)
}

pub fn memory_path(root: &Path) -> PathBuf {
    root.join(MEMORY_FILE)
}

pub fn archive_path(root: &Path) -> PathBuf {
    root.join(ARCHIVE_FILE)
}

pub fn profile_path(root: &Path) -> PathBuf {
    root.join(PROFILE_FILE)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn backups_dir(root: &Path) -> PathBuf {
    root.join(BACKUPS_DIR)
}

pub fn notes_path(root: &Path, feature: &str) -> PathBuf {
    root.join(NOTES_DIR).join(format!("{feature}.yaml"))
}

// ---------------------------------------------------------------------------
// Feature id validation
// ---------------------------------------------------------------------------

static FEATURE_ID_RE: OnceLock<Regex> = OnceLock::new();

fn feature_id_re() -> &'static Regex {
    FEATURE_ID_RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9\-]*[A-Za-z0-9]$|^[A-Za-z0-9]$").unwrap()
    })
}

/// Feature ids are opaque, but they become file names for notes, so they must
/// stay path-safe.
pub fn validate_feature_id(id: &str) -> Result<()> {
    if id.is_empty() || id.len() > 64 || !feature_id_re().is_match(id) {
        return Err(SpecmemError::InvalidFeatureId(id.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
