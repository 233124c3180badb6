mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{
    context::ContextSubcommand, memory::MemorySubcommand, note::NoteSubcommand,
    profile::ProfileSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "specmem",
    about = "Tagged project memory and bounded context injection for spec-driven development",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .specmem/ or .git/)
    #[arg(long, global = true, env = "SPECMEM_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize specmem in the current project
    Init,

    /// Add, list, query, migrate, and archive memory entries
    Memory {
        #[command(subcommand)]
        subcommand: MemorySubcommand,
    },

    /// Show and edit the project profile
    Profile {
        #[command(subcommand)]
        subcommand: ProfileSubcommand,
    },

    /// Build the bounded context block and write it into templates
    Context {
        #[command(subcommand)]
        subcommand: ContextSubcommand,
    },

    /// Per-feature working notes
    Note {
        #[command(subcommand)]
        subcommand: NoteSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root, cli.json),
        Commands::Memory { subcommand } => cmd::memory::run(&root, subcommand, cli.json),
        Commands::Profile { subcommand } => cmd::profile::run(&root, subcommand, cli.json),
        Commands::Context { subcommand } => cmd::context::run(&root, subcommand, cli.json),
        Commands::Note { subcommand } => cmd::note::run(&root, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
