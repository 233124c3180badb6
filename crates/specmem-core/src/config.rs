use crate::error::Result;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Hard ceiling on injected context content, excluding the markers.
pub const CONTEXT_CHAR_LIMIT: usize = 500;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// ContextConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "default_max_decisions")]
    pub max_decisions: usize,
    #[serde(default = "default_max_patterns")]
    pub max_patterns: usize,
}

fn default_max_decisions() -> usize {
    3
}

fn default_max_patterns() -> usize {
    3
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_decisions: default_max_decisions(),
            max_patterns: default_max_patterns(),
        }
    }
}

// ---------------------------------------------------------------------------
// ArchiveConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Entries older than this many days are moved to the archive.
    #[serde(default = "default_after_days")]
    pub after_days: u32,
}

fn default_after_days() -> u32 {
    180
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            after_days: default_after_days(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            context: ContextConfig::default(),
            archive: ArchiveConfig::default(),
        }
    }
}

impl Config {
    /// Load `.specmem/config.yaml`, falling back to defaults when absent.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        match crate::io::read_optional(&path)? {
            None => Ok(Self::default()),
            Some(data) if data.trim().is_empty() => Ok(Self::default()),
            Some(data) => Ok(serde_yaml::from_str(&data)?),
        }
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.context.max_decisions == 0 && self.context.max_patterns == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "context.max_decisions and context.max_patterns are both 0; \
                          injected context will only carry the project summary"
                    .to_string(),
            });
        }

        if self.archive.after_days == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "archive.after_days=0 would archive every entry".to_string(),
            });
        } else if self.archive.after_days < 30 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "archive.after_days={} (<30 is unusual)",
                    self.archive.after_days
                ),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
