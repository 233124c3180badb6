use crate::error::{Result, SpecmemError};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

// ---------------------------------------------------------------------------
// TechCategory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TechCategory {
    Frontend,
    Backend,
    Database,
    Cache,
    Queue,
}

impl TechCategory {
    pub fn all() -> &'static [TechCategory] {
        &[
            TechCategory::Frontend,
            TechCategory::Backend,
            TechCategory::Database,
            TechCategory::Cache,
            TechCategory::Queue,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TechCategory::Frontend => "frontend",
            TechCategory::Backend => "backend",
            TechCategory::Database => "database",
            TechCategory::Cache => "cache",
            TechCategory::Queue => "queue",
        }
    }
}

impl fmt::Display for TechCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TechCategory {
    type Err = SpecmemError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        TechCategory::all()
            .iter()
            .copied()
            .find(|c| c.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| SpecmemError::UnknownProfileKey(format!("tech_stack.{s}")))
    }
}

// ---------------------------------------------------------------------------
// ProjectProfile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectProfile {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub project_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tech_stack: BTreeMap<TechCategory, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preferences: Vec<String>,
}

impl ProjectProfile {
    /// Load the profile. An absent file is the empty profile; a file that
    /// does not parse is `MalformedProfile` and is left untouched.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::profile_path(root);
        let Some(data) = crate::io::read_optional(&path)? else {
            return Ok(Self::default());
        };
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&data).map_err(|e| SpecmemError::MalformedProfile {
            path,
            message: e.to_string(),
        })
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::profile_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn is_configured(&self) -> bool {
        *self != Self::default()
    }

    /// Set a scalar field by dotted key. Empty values clear the field.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match key {
            "name" => self.name = value.to_string(),
            "type" => self.project_type = value.to_string(),
            "description" => self.description = value.to_string(),
            "version" => self.version = value.to_string(),
            "team_size" => {
                self.team_size = if value.is_empty() {
                    None
                } else {
                    Some(value.parse().map_err(|_| SpecmemError::InvalidValue {
                        key: key.to_string(),
                        reason: format!("'{value}' is not a non-negative integer"),
                    })?)
                };
            }
            other => {
                let Some(category) = other.strip_prefix("tech_stack.") else {
                    return Err(SpecmemError::UnknownProfileKey(other.to_string()));
                };
                let category: TechCategory = category.parse()?;
                if value.is_empty() {
                    self.tech_stack.remove(&category);
                } else {
                    self.tech_stack.insert(category, value.to_string());
                }
            }
        }
        Ok(())
    }

    /// Append a preference, ignoring exact duplicates.
    pub fn add_preference(&mut self, text: &str) {
        let text = text.trim();
        if !text.is_empty() && !self.preferences.iter().any(|p| p == text) {
            self.preferences.push(text.to_string());
        }
    }

    /// Compact one-line summary for context injection.
    pub fn summary_line(&self) -> String {
        if !self.is_configured() {
            return "Project: (unconfigured)".to_string();
        }
        let name = if self.name.is_empty() {
            "(unnamed)"
        } else {
            self.name.as_str()
        };
        let mut line = format!("Project: {name}");
        if !self.project_type.is_empty() {
            line.push_str(&format!(" ({})", self.project_type));
        }
        if !self.version.is_empty() {
            line.push_str(&format!(" v{}", self.version.trim_start_matches('v')));
        }
        if !self.tech_stack.is_empty() {
            let stack: Vec<String> = self
                .tech_stack
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            line.push_str(&format!(" | Stack: {}", stack.join(", ")));
        }
        if let Some(n) = self.team_size {
            line.push_str(&format!(" | Team: {n}"));
        }
        if !self.preferences.is_empty() {
            line.push_str(&format!(" | Prefs: {}", self.preferences.join("; ")));
        }
        line
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn absent_profile_is_default() {
        let dir = TempDir::new().unwrap();
        let p = ProjectProfile::load(dir.path()).unwrap();
        assert!(!p.is_configured());
        assert_eq!(p.summary_line(), "Project: (unconfigured)");
    }

    #[test]
    fn set_and_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut p = ProjectProfile::default();
        p.set("name", "shop").unwrap();
        p.set("type", "web").unwrap();
        p.set("version", "1.2").unwrap();
        p.set("tech_stack.backend", "Axum").unwrap();
        p.set("tech_stack.frontend", "React").unwrap();
        p.set("team_size", "4").unwrap();
        p.add_preference("small PRs");
        p.add_preference("small PRs");
        p.save(dir.path()).unwrap();

        let loaded = ProjectProfile::load(dir.path()).unwrap();
        assert_eq!(loaded, p);
        assert_eq!(loaded.preferences.len(), 1);
        assert_eq!(
            loaded.summary_line(),
            "Project: shop (web) v1.2 | Stack: frontend=React, backend=Axum | Team: 4 | Prefs: small PRs"
        );
    }

    #[test]
    fn unset_categories_are_absent_from_yaml() {
        let mut p = ProjectProfile::default();
        p.set("tech_stack.database", "Postgres").unwrap();
        let yaml = serde_yaml::to_string(&p).unwrap();
        assert!(yaml.contains("database: Postgres"));
        assert!(!yaml.contains("cache"));
        assert!(!yaml.contains("team_size"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut p = ProjectProfile::default();
        assert!(matches!(
            p.set("colour", "blue"),
            Err(SpecmemError::UnknownProfileKey(_))
        ));
        assert!(matches!(
            p.set("tech_stack.mobile", "Swift"),
            Err(SpecmemError::UnknownProfileKey(_))
        ));
        assert!(matches!(
            p.set("team_size", "many"),
            Err(SpecmemError::InvalidValue { .. })
        ));
    }

    #[test]
    fn malformed_profile_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".specmem/project.yaml");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "name: [unclosed\n").unwrap();
        match ProjectProfile::load(dir.path()) {
            Err(SpecmemError::MalformedProfile { path: p, .. }) => assert_eq!(p, path),
            other => panic!("expected MalformedProfile, got {other:?}"),
        }
        // The broken file is never replaced.
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "name: [unclosed\n");
    }

    #[test]
    fn nested_tech_stack_yaml_parses() {
        let yaml = "name: api\ntype: service\ntech_stack:\n  backend: Rust\n  queue: NATS\npreferences:\n  - tests first\n";
        let p: ProjectProfile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(p.tech_stack[&TechCategory::Queue], "NATS");
        assert_eq!(p.project_type, "service");
    }
}
