use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Subcommand;
use specmem_core::{
    archive::archive_older_than,
    config::{Config, WarnLevel},
    memory::{MemoryEntry, MemoryStore},
    migrate::{self, KeywordClassifier, Verdict},
    parser::split_features,
    types::Tag,
};
use std::path::Path;

#[derive(Subcommand)]
pub enum MemorySubcommand {
    /// Add a tagged entry (decision, pattern, constraint, current)
    Add {
        tag: String,
        title: String,
        /// Body text: rationale, description, or status depending on the tag
        #[arg(long)]
        content: Option<String>,
        /// Related feature ids, comma-separated (e.g. 001,003)
        #[arg(long)]
        related: Option<String>,
    },
    /// Replace the single current-context entry
    SetCurrent {
        title: String,
        #[arg(long)]
        status: Option<String>,
        /// Feature currently being worked on
        #[arg(long)]
        feature: Option<String>,
    },
    /// List entries, optionally only one tag
    List {
        #[arg(long)]
        tag: Option<String>,
    },
    /// Show one entry by id (searches the archive too)
    Show { id: String },
    /// Most recent entries of a tag, newest first
    Recent {
        tag: String,
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Entries that reference a feature, grouped by tag
    Feature { id: String },
    /// Decisions, patterns, and current context relevant to a feature
    Relevant { id: String },
    /// Convert an untagged memory.md into tagged sections
    Migrate {
        /// Print the result without writing anything
        #[arg(long)]
        dry_run: bool,
        /// Apply without asking
        #[arg(long)]
        yes: bool,
    },
    /// Move stale entries into memory-archive.md
    Archive {
        /// Override archive.after_days from config.yaml
        #[arg(long)]
        older_than_days: Option<u32>,
    },
}

pub fn run(root: &Path, subcmd: MemorySubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        MemorySubcommand::Add {
            tag,
            title,
            content,
            related,
        } => add(
            root,
            &tag,
            &title,
            content.as_deref().unwrap_or(""),
            related.as_deref(),
            json,
        ),
        MemorySubcommand::SetCurrent {
            title,
            status,
            feature,
        } => set_current(root, &title, status.as_deref(), feature.as_deref(), json),
        MemorySubcommand::List { tag } => list(root, tag.as_deref(), json),
        MemorySubcommand::Show { id } => show(root, &id, json),
        MemorySubcommand::Recent { tag, limit } => recent(root, &tag, limit, json),
        MemorySubcommand::Feature { id } => feature(root, &id, json),
        MemorySubcommand::Relevant { id } => relevant(root, &id, json),
        MemorySubcommand::Migrate { dry_run, yes } => migrate_cmd(root, dry_run, yes, json),
        MemorySubcommand::Archive { older_than_days } => archive(root, older_than_days, json),
    }
}

fn open(root: &Path) -> anyhow::Result<MemoryStore> {
    MemoryStore::open(root).context("failed to load memory")
}

fn add(
    root: &Path,
    tag: &str,
    title: &str,
    content: &str,
    related: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let tag: Tag = tag.parse()?;
    let related = related.map(split_features).unwrap_or_default();
    let mut store = open(root)?;
    let entry = store
        .add(tag, title, content, &related)
        .context("failed to save memory")?;

    if json {
        return print_json(&entry);
    }
    println!("Added {}: {}", entry.id, entry.title);
    Ok(())
}

fn set_current(
    root: &Path,
    title: &str,
    status: Option<&str>,
    feature: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let related: Vec<String> = feature.map(split_features).unwrap_or_default();
    let mut store = open(root)?;
    let entry = store
        .add(Tag::Current, title, status.unwrap_or(""), &related)
        .context("failed to save memory")?;

    if json {
        return print_json(&entry);
    }
    match entry.related_features.first() {
        Some(f) => println!("Current context {}: {} (feature {f})", entry.id, entry.title),
        None => println!("Current context {}: {}", entry.id, entry.title),
    }
    Ok(())
}

fn rows(entries: &[&MemoryEntry]) -> Vec<Vec<String>> {
    entries
        .iter()
        .map(|e| {
            vec![
                e.id.clone(),
                e.tag.to_string(),
                e.date
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "-".to_string()),
                if e.related_features.is_empty() {
                    "-".to_string()
                } else {
                    e.related_features.join(",")
                },
                e.title.clone(),
            ]
        })
        .collect()
}

fn print_entries(entries: &[&MemoryEntry], empty: &str, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("{empty}");
        return Ok(());
    }
    print_table(&["ID", "TAG", "DATE", "FEATURES", "TITLE"], rows(entries));
    Ok(())
}

fn list(root: &Path, tag: Option<&str>, json: bool) -> anyhow::Result<()> {
    let store = open(root)?;
    let doc = store.document();
    let entries: Vec<&MemoryEntry> = match tag {
        Some(t) => doc.by_tag(t.parse()?),
        None => Tag::all().iter().flat_map(|&t| doc.by_tag(t)).collect(),
    };
    print_entries(&entries, "No memory entries.", json)
}

fn show(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let store = open(root)?;
    let entry = store.get(id)?;
    let archived = store.document().get(id).is_none();

    if json {
        let mut value = serde_json::to_value(entry)?;
        value["archived"] = serde_json::Value::Bool(archived);
        return print_json(&value);
    }

    println!("{}: {}", entry.id, entry.title);
    println!("Tag:      {}", entry.tag);
    if let Some(d) = entry.date {
        println!("Date:     {}", d.format("%Y-%m-%d"));
    }
    if !entry.related_features.is_empty() {
        println!("Features: {}", entry.related_features.join(", "));
    }
    if archived {
        println!("Archived: yes");
    }
    if !entry.content.is_empty() {
        println!("\n{}", entry.content);
    }
    Ok(())
}

fn recent(root: &Path, tag: &str, limit: Option<usize>, json: bool) -> anyhow::Result<()> {
    let tag: Tag = tag.parse()?;
    let store = open(root)?;
    let entries = store.document().recent(tag, limit);
    print_entries(&entries, &format!("No {tag} entries."), json)
}

fn feature(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let store = open(root)?;
    let entries = store.document().by_feature(id);
    print_entries(&entries, &format!("No entries reference feature {id}."), json)
}

fn relevant(root: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let store = open(root)?;
    let entries = store.document().relevant(id);
    print_entries(&entries, &format!("Nothing relevant to feature {id}."), json)
}

fn migrate_cmd(root: &Path, dry_run: bool, yes: bool, json: bool) -> anyhow::Result<()> {
    let classifier = KeywordClassifier;

    if dry_run || !yes {
        let plan = migrate::preview(root, &classifier).context("failed to read memory.md")?;
        if json {
            return print_json(&serde_json::json!({
                "applied": false,
                "counts": plan.counts,
                "flagged": plan.flagged,
                "document": plan.render(),
            }));
        }
        if dry_run {
            print!("{}", plan.render());
            return Ok(());
        }
        for (tag, n) in &plan.counts {
            println!("  {tag}: {n}");
        }
        for f in &plan.flagged {
            let why = match &f.verdict {
                Verdict::Ambiguous(tags) => {
                    let names: Vec<String> = tags.iter().map(Tag::to_string).collect();
                    format!("ambiguous ({})", names.join("/"))
                }
                _ => "unclassified".to_string(),
            };
            println!(
                "  needs review: {} [{why}]",
                f.block.heading.as_deref().unwrap_or("(untitled)")
            );
        }
        anyhow::bail!("re-run with --yes to apply, or --dry-run to print the result");
    }

    let outcome = migrate::migrate(root, &classifier).context("migration failed")?;
    if json {
        return print_json(&serde_json::json!({
            "applied": true,
            "entries": outcome.entries,
            "flagged": outcome.flagged,
            "backup": outcome.backup,
        }));
    }
    println!(
        "Migrated {} entries ({} need review). Backup: {}",
        outcome.entries.len(),
        outcome.flagged,
        outcome.backup.path.display()
    );
    Ok(())
}

fn archive(root: &Path, older_than_days: Option<u32>, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config.yaml")?;
    let days = match older_than_days {
        Some(d) => d,
        None => {
            if let Some(w) = config
                .validate()
                .into_iter()
                .find(|w| w.level == WarnLevel::Error)
            {
                anyhow::bail!("{}", w.message);
            }
            config.archive.after_days
        }
    };
    if days == 0 {
        anyhow::bail!("--older-than-days must be at least 1");
    }

    let mut store = open(root)?;
    let today = chrono::Utc::now().date_naive();
    let report = archive_older_than(&mut store, days, today).context("archive failed")?;

    if json {
        return print_json(&report);
    }
    if report.moved.is_empty() {
        println!("Nothing older than {days} days.");
    } else {
        println!(
            "Archived {} entries: {}",
            report.moved.len(),
            report.moved.join(", ")
        );
    }
    Ok(())
}
