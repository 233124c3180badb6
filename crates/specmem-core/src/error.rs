use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpecmemError {
    #[error("not initialized: run 'specmem init'")]
    NotInitialized,

    #[error("memory entry not found: {0}")]
    EntryNotFound(String),

    #[error("malformed project profile at {}: {message}", path.display())]
    MalformedProfile { path: PathBuf, message: String },

    #[error("memory document at {} has no tagged sections: run 'specmem memory migrate'", path.display())]
    UnstructuredDocument { path: PathBuf },

    #[error("memory document at {} is already tagged; nothing to migrate", path.display())]
    AlreadyTagged { path: PathBuf },

    #[error("could not create backup at {}: {source}", path.display())]
    BackupFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid tag '{0}': expected decision, pattern, constraint, or current")]
    InvalidTag(String),

    #[error("invalid feature id '{0}': must be alphanumeric with hyphens")]
    InvalidFeatureId(String),

    #[error("unknown profile key '{0}'")]
    UnknownProfileKey(String),

    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("no feature given and no active feature in the current context")]
    NoActiveFeature,

    #[error("note '{id}' not found for feature '{feature}'")]
    NoteNotFound { feature: String, id: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, SpecmemError>;
