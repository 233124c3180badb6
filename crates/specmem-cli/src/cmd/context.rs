use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use specmem_core::context::{inject, inject_into_file, InjectOutcome};
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum ContextSubcommand {
    /// Print the context block that would be injected
    Show {
        /// Scope to decisions and patterns related to this feature
        #[arg(long)]
        feature: Option<String>,
    },
    /// Write the context block into a template file, replacing any earlier block
    Inject {
        file: PathBuf,
        #[arg(long)]
        feature: Option<String>,
    },
}

pub fn run(root: &Path, subcmd: ContextSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ContextSubcommand::Show { feature } => show(root, feature.as_deref(), json),
        ContextSubcommand::Inject { file, feature } => {
            inject_file(root, &file, feature.as_deref(), json)
        }
    }
}

fn show(root: &Path, feature: Option<&str>, json: bool) -> anyhow::Result<()> {
    let block = inject(root, feature).context("failed to build context")?;
    if json {
        return print_json(&serde_json::json!({
            "content": block.content,
            "chars": block.char_len(),
            "included": block.included,
            "dropped": block.dropped,
        }));
    }
    println!("{}", block.render());
    Ok(())
}

fn inject_file(root: &Path, file: &Path, feature: Option<&str>, json: bool) -> anyhow::Result<()> {
    let target = if file.is_absolute() {
        file.to_path_buf()
    } else {
        root.join(file)
    };
    let block = inject(root, feature).context("failed to build context")?;
    let outcome = inject_into_file(&target, &block)
        .with_context(|| format!("failed to write {}", target.display()))?;

    if json {
        return print_json(&serde_json::json!({
            "file": target.display().to_string(),
            "outcome": outcome,
            "included": block.included,
            "chars": block.char_len(),
        }));
    }

    match outcome {
        InjectOutcome::Created => println!("Created {} with context block", target.display()),
        InjectOutcome::Replaced => println!("Refreshed context block in {}", target.display()),
        InjectOutcome::Prepended => println!("Added context block to {}", target.display()),
        InjectOutcome::Skipped => {
            anyhow::bail!(
                "{} has a context start marker without an end marker; fix it by hand",
                target.display()
            )
        }
    }
    Ok(())
}
