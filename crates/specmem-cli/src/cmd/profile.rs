use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use specmem_core::{paths, profile::ProjectProfile};
use std::path::Path;

#[derive(Subcommand)]
pub enum ProfileSubcommand {
    /// Show the project profile and its one-line summary
    Show,
    /// Set a field: name, type, description, version, team_size, tech_stack.<category>
    ///
    /// Categories: frontend, backend, database, cache, queue. An empty value
    /// clears the field.
    Set { key: String, value: String },
    /// Append a working preference (e.g. "small PRs")
    AddPreference { text: String },
}

pub fn run(root: &Path, subcmd: ProfileSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ProfileSubcommand::Show => show(root, json),
        ProfileSubcommand::Set { key, value } => set(root, &key, &value, json),
        ProfileSubcommand::AddPreference { text } => add_preference(root, &text, json),
    }
}

fn require_init(root: &Path) -> anyhow::Result<()> {
    if !paths::specmem_dir(root).is_dir() {
        anyhow::bail!(specmem_core::SpecmemError::NotInitialized);
    }
    Ok(())
}

fn show(root: &Path, json: bool) -> anyhow::Result<()> {
    let profile = ProjectProfile::load(root)?;

    if json {
        let mut value = serde_json::to_value(&profile)?;
        value["summary"] = serde_json::Value::String(profile.summary_line());
        return print_json(&value);
    }

    println!("{}", profile.summary_line());
    if !profile.description.is_empty() {
        println!("\n{}", profile.description);
    }
    Ok(())
}

fn set(root: &Path, key: &str, value: &str, json: bool) -> anyhow::Result<()> {
    require_init(root)?;
    let mut profile = ProjectProfile::load(root)?;
    profile.set(key, value)?;
    profile.save(root).context("failed to write project.yaml")?;

    if json {
        return print_json(&serde_json::json!({ "key": key, "value": value.trim() }));
    }
    println!("{key} = {}", value.trim());
    Ok(())
}

fn add_preference(root: &Path, text: &str, json: bool) -> anyhow::Result<()> {
    require_init(root)?;
    let mut profile = ProjectProfile::load(root)?;
    profile.add_preference(text);
    profile.save(root).context("failed to write project.yaml")?;

    if json {
        return print_json(&profile.preferences);
    }
    println!("Preferences: {}", profile.preferences.join("; "));
    Ok(())
}
