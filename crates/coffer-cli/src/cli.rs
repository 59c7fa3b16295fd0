use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "coffer",
    about = "Encrypted, versioned, content-addressed file repositories",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (default: ./coffer.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Blob store root, overriding the configuration file
    #[arg(long, global = true)]
    pub storage: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print a fresh random repository key as hex
    Keygen,
    /// Create, snapshot and inspect repositories
    Repo(RepoArgs),
}

#[derive(Args)]
pub struct RepoArgs {
    #[command(subcommand)]
    pub action: RepoCommand,
}

#[derive(Subcommand)]
pub enum RepoCommand {
    /// Create a new empty repository
    Init(InitArgs),
    /// Snapshot a local directory into a repository
    Snapshot(SnapshotArgs),
    /// Create a child repository and link it into the parent
    Add(AddChildArgs),
    /// Snapshot a local directory into a child repository
    SnapshotChild(SnapshotChildArgs),
    /// List a directory of the latest snapshot
    Ls(LsArgs),
    /// Write a file of the latest snapshot to stdout
    Cat(CatArgs),
    /// Show the head commit
    Log(LogArgs),
}

#[derive(Args)]
pub struct InitArgs {
    #[arg(long)]
    pub key_hex: String,
}

/// Identifies an existing repository and its key.
#[derive(Args)]
pub struct RepoRef {
    #[arg(long)]
    pub key_hex: String,
    #[arg(long)]
    pub repo_id: String,
}

#[derive(Args)]
pub struct SnapshotArgs {
    #[command(flatten)]
    pub repo: RepoRef,
    #[arg(long)]
    pub source_dir: PathBuf,
}

#[derive(Args)]
pub struct AddChildArgs {
    #[command(flatten)]
    pub repo: RepoRef,
    /// Slash-separated path of the link to the new child
    #[arg(long)]
    pub child_target_path: String,
}

#[derive(Args)]
pub struct SnapshotChildArgs {
    #[command(flatten)]
    pub repo: RepoRef,
    #[arg(long)]
    pub child_repo_id: String,
    #[arg(long)]
    pub source_dir: PathBuf,
}

#[derive(Args)]
pub struct LsArgs {
    #[command(flatten)]
    pub repo: RepoRef,
    /// Slash-separated directory path (default: root)
    pub path: Option<String>,
}

#[derive(Args)]
pub struct CatArgs {
    #[command(flatten)]
    pub repo: RepoRef,
    pub path: String,
}

#[derive(Args)]
pub struct LogArgs {
    #[command(flatten)]
    pub repo: RepoRef,
}

/// Split a slash-separated path into segments. Leading, trailing and
/// doubled slashes are ignored, so `/` is the root.
pub fn split_path(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}
