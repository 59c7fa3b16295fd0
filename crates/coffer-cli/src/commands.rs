use std::io::Write;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use coffer_crypto::EncryptionKey;
use coffer_repo::{
    snapshot_dir, Backend, DirEntryKind, MainRepository, RepoConfig, Repository,
};
use coffer_types::RepoId;
use colored::Colorize;

use crate::cli::*;
use crate::config::CliConfig;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Keygen => cmd_keygen(),
        Command::Repo(args) => {
            let config = CliConfig::load(cli.config.as_deref())?.with_storage(cli.storage);
            let backend = config.backend();
            match args.action {
                RepoCommand::Init(args) => cmd_init(&backend, args).await,
                RepoCommand::Snapshot(args) => cmd_snapshot(&backend, args).await,
                RepoCommand::Add(args) => cmd_add_child(&backend, args).await,
                RepoCommand::SnapshotChild(args) => cmd_snapshot_child(&backend, args).await,
                RepoCommand::Ls(args) => cmd_ls(&backend, args).await,
                RepoCommand::Cat(args) => cmd_cat(&backend, args).await,
                RepoCommand::Log(args) => cmd_log(&backend, args).await,
            }
        }
    }
}

fn cmd_keygen() -> anyhow::Result<()> {
    println!("{}", EncryptionKey::generate().to_hex());
    Ok(())
}

fn parse_key(key_hex: &str) -> anyhow::Result<EncryptionKey> {
    EncryptionKey::from_hex(key_hex).context("--key-hex must be 32 hex characters")
}

fn parse_repo_id(id: &str) -> anyhow::Result<RepoId> {
    RepoId::new(id).with_context(|| format!("invalid repository id {id:?}"))
}

async fn open(backend: &Backend, repo: &RepoRef) -> anyhow::Result<Repository> {
    let id = parse_repo_id(&repo.repo_id)?;
    let config = RepoConfig::new(parse_key(&repo.key_hex)?);
    Repository::open(id.clone(), backend, config)
        .await
        .with_context(|| format!("opening repository {id}"))
}

async fn cmd_init(backend: &Backend, args: InitArgs) -> anyhow::Result<()> {
    let key = parse_key(&args.key_hex)?;
    let repo = Repository::create(RepoId::generate(), backend, RepoConfig::new(key)).await?;
    println!("{} Repo created: {}", "✓".green().bold(), repo.repo_id().to_string().cyan());
    Ok(())
}

async fn cmd_snapshot(backend: &Backend, args: SnapshotArgs) -> anyhow::Result<()> {
    let mut repo = open(backend, &args.repo).await?;
    let snapshot = snapshot_dir(&mut repo, &args.source_dir, Utc::now()).await?;
    println!(
        "{} Snapshot {} of {}",
        "✓".green().bold(),
        snapshot.hash.short_hex().yellow(),
        args.source_dir.display().to_string().bold()
    );
    Ok(())
}

async fn cmd_add_child(backend: &Backend, args: AddChildArgs) -> anyhow::Result<()> {
    let target = split_path(&args.child_target_path);
    if target.is_empty() {
        bail!("--child-target-path must name an entry");
    }
    let root = open(backend, &args.repo).await?;
    let mut main = MainRepository::new(backend.clone(), root);
    let child = main.create_child(Utc::now()).await?;
    println!("Child repo id: {}", child.repo_id().to_string().cyan());

    let mut root = main.into_inner();
    root.insert_repo_link(&target, child.repo_id()).await?;
    let snapshot = root.create_snapshot(Utc::now()).await?;
    println!(
        "{} Linked at {} in snapshot {}",
        "✓".green().bold(),
        args.child_target_path.bold(),
        snapshot.hash.short_hex().yellow()
    );
    Ok(())
}

async fn cmd_snapshot_child(backend: &Backend, args: SnapshotChildArgs) -> anyhow::Result<()> {
    let root = open(backend, &args.repo).await?;
    let child_id = parse_repo_id(&args.child_repo_id)?;
    let main = MainRepository::new(backend.clone(), root);
    let Some(mut child) = main.open_child(&child_id).await? else {
        bail!("Can't find child repo {child_id}");
    };
    let snapshot = snapshot_dir(&mut child, &args.source_dir, Utc::now()).await?;
    println!(
        "{} Snapshot {} of {} into child {}",
        "✓".green().bold(),
        snapshot.hash.short_hex().yellow(),
        args.source_dir.display().to_string().bold(),
        child_id.to_string().cyan()
    );
    Ok(())
}

async fn cmd_ls(backend: &Backend, args: LsArgs) -> anyhow::Result<()> {
    let mut repo = open(backend, &args.repo).await?;
    let path = split_path(args.path.as_deref().unwrap_or(""));
    let Some(entries) = repo.list_directory(&path).await? else {
        bail!("no such directory: /{}", path.join("/"));
    };
    for entry in entries {
        match entry.kind {
            DirEntryKind::File { size, modification_time, .. } => {
                let modified = DateTime::<Utc>::from_timestamp_millis(modification_time)
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!("{:>12}  {}  {}", size, modified.dimmed(), entry.name);
            }
            DirEntryKind::Directory => println!("{:>12}  {:16}  {}/", "-", "", entry.name.blue().bold()),
            DirEntryKind::RepoLink { repo_id } => println!(
                "{:>12}  {:16}  {} -> {}",
                "link",
                "",
                entry.name.cyan(),
                repo_id.to_string().dimmed()
            ),
        }
    }
    Ok(())
}

async fn cmd_cat(backend: &Backend, args: CatArgs) -> anyhow::Result<()> {
    let mut repo = open(backend, &args.repo).await?;
    let path = split_path(&args.path);
    let Some(data) = repo.read_file(&path).await? else {
        bail!("no such file: {}", args.path);
    };
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&data)?;
    stdout.flush()?;
    Ok(())
}

async fn cmd_log(backend: &Backend, args: LogArgs) -> anyhow::Result<()> {
    let repo = open(backend, &args.repo).await?;
    let Some(head) = repo.head().await? else {
        println!("No snapshots on {}.", repo.config().branch.yellow());
        return Ok(());
    };
    println!("{}  ({})", head.hash.to_string().yellow().bold(), repo.config().branch.green());
    println!("  Date:   {}", head.timestamp.to_rfc3339());
    println!("  Tree:   {}", head.tree.hash.to_string().dimmed());
    for parent in &head.parents {
        println!("  Parent: {}", parent.to_string().dimmed());
    }
    Ok(())
}
