use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use specmem_core::{
    notes::{add_note, list_notes, remove_note},
    session::Session,
};
use std::path::Path;

#[derive(Subcommand)]
pub enum NoteSubcommand {
    /// Add a note to a feature (defaults to the active feature)
    Add {
        body: String,
        #[arg(long)]
        feature: Option<String>,
    },
    /// List notes for a feature (defaults to the active feature)
    List {
        #[arg(long)]
        feature: Option<String>,
    },
    /// Remove a note by id
    Remove { feature: String, id: String },
}

pub fn run(root: &Path, subcmd: NoteSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        NoteSubcommand::Add { body, feature } => add(root, &body, feature.as_deref(), json),
        NoteSubcommand::List { feature } => list(root, feature.as_deref(), json),
        NoteSubcommand::Remove { feature, id } => remove(root, &feature, &id, json),
    }
}

fn add(root: &Path, body: &str, feature: Option<&str>, json: bool) -> anyhow::Result<()> {
    let session = Session::load(root).context("failed to load session")?;
    let (feature, note) = add_note(&session, feature, body)?;

    if json {
        return print_json(&serde_json::json!({ "feature": feature, "note": note }));
    }
    println!("Added note {} to feature {feature}", note.id);
    Ok(())
}

fn list(root: &Path, feature: Option<&str>, json: bool) -> anyhow::Result<()> {
    let session = Session::load(root).context("failed to load session")?;
    let Some(feature) = feature.or(session.active_feature()) else {
        return Err(specmem_core::SpecmemError::NoActiveFeature.into());
    };
    let notes = list_notes(root, feature)?;

    if json {
        return print_json(&notes);
    }
    if notes.is_empty() {
        println!("No notes for feature {feature}.");
        return Ok(());
    }
    let rows = notes
        .iter()
        .map(|n| {
            vec![
                n.id.clone(),
                n.created_at.format("%Y-%m-%d %H:%M").to_string(),
                n.body.clone(),
            ]
        })
        .collect();
    print_table(&["ID", "CREATED", "NOTE"], rows);
    Ok(())
}

fn remove(root: &Path, feature: &str, id: &str, json: bool) -> anyhow::Result<()> {
    remove_note(root, feature, id)?;
    if json {
        return print_json(&serde_json::json!({ "feature": feature, "removed": id }));
    }
    println!("Removed note {id} from feature {feature}");
    Ok(())
}
