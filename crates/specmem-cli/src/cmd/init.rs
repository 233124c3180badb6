use crate::output::print_json;
use anyhow::Context;
use specmem_core::{
    config::Config,
    io,
    memory::MemoryDocument,
    paths,
    profile::ProjectProfile,
};
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let project_name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());

    if !json {
        println!("Initializing specmem in: {}", root.display());
    }

    for dir in [paths::SPECMEM_DIR, paths::BACKUPS_DIR, paths::NOTES_DIR] {
        let p = root.join(dir);
        io::ensure_dir(&p).with_context(|| format!("failed to create {}", p.display()))?;
    }

    let mut created: Vec<&str> = Vec::new();
    let mut existing: Vec<&str> = Vec::new();

    if paths::config_path(root).exists() {
        existing.push(paths::CONFIG_FILE);
    } else {
        Config::default()
            .save(root)
            .context("failed to write config.yaml")?;
        created.push(paths::CONFIG_FILE);
    }

    if paths::profile_path(root).exists() {
        existing.push(paths::PROFILE_FILE);
    } else {
        let profile = ProjectProfile {
            name: project_name,
            ..ProjectProfile::default()
        };
        profile.save(root).context("failed to write project.yaml")?;
        created.push(paths::PROFILE_FILE);
    }

    // An existing memory.md, tagged or not, is never touched here.
    let empty = MemoryDocument::default().render();
    if io::write_if_missing(&paths::memory_path(root), empty.as_bytes())
        .context("failed to write memory.md")?
    {
        created.push(paths::MEMORY_FILE);
    } else {
        existing.push(paths::MEMORY_FILE);
    }

    if json {
        return print_json(&serde_json::json!({
            "root": root.display().to_string(),
            "created": created,
            "existing": existing,
        }));
    }

    for f in &created {
        println!("  created: {f}");
    }
    for f in &existing {
        println!("  exists:  {f}");
    }
    println!("\nspecmem initialized. Next: specmem profile set name <name>");
    Ok(())
}
