//! reposync command-line driver
//!
//! Edits files of a GitHub repository through the local queue and commits
//! them back atomically.
//!
//! Usage:
//!   reposync open acme schemas --path models
//!   reposync write <id> a.yaml ./a.yaml
//!   reposync stage <id> --all
//!   reposync sync <id> -m "Update a.yaml"
//!
//! The access token is read from `GITHUB_TOKEN`.

use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use reposync_engine::{EngineConfig, SyncOrchestrator, SyncOutcome, WorkspaceManager, WriteOutcome};
use reposync_remote::GitHubClient;
use reposync_store::QueueStore;
use reposync_types::{ConflictResolution, Resolution, WorkspaceId};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "reposync")]
#[command(about = "Local-first editing of hosted repositories")]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Queue database, overriding the configuration
    #[arg(long)]
    db: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open a repository location for editing
    Open {
        owner: String,
        repo: String,
        /// Branch to edit; the repository's default branch if omitted
        #[arg(short, long)]
        branch: Option<String>,
        /// Directory inside the repository
        #[arg(short, long, default_value = "")]
        path: String,
    },
    /// List recently opened workspaces
    Recent,
    /// Close a workspace, discarding its queued edits
    Close { id: WorkspaceId },
    /// Queue new content for a file
    Write {
        id: WorkspaceId,
        path: String,
        /// Local file holding the new content
        file: PathBuf,
    },
    /// Queue the deletion of a file
    Rm { id: WorkspaceId, path: String },
    /// Print a file as the workspace sees it
    Cat { id: WorkspaceId, path: String },
    /// Include edits in the next push
    Stage {
        id: WorkspaceId,
        paths: Vec<String>,
        #[arg(long, conflicts_with = "paths")]
        all: bool,
    },
    /// Exclude edits from the next push
    Unstage {
        id: WorkspaceId,
        paths: Vec<String>,
        #[arg(long, conflicts_with = "paths")]
        all: bool,
    },
    /// Show queued edits
    Status { id: WorkspaceId },
    /// Check queued edits against the remote branch
    Pull { id: WorkspaceId },
    /// Commit staged edits
    Push {
        id: WorkspaceId,
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Pull, then push staged edits
    Sync {
        id: WorkspaceId,
        #[arg(short, long)]
        message: Option<String>,
    },
    /// Resolve a conflicting path: use-remote, keep-local or manual=FILE
    Resolve {
        id: WorkspaceId,
        path: String,
        #[arg(value_parser = parse_resolution)]
        resolution: Resolution,
    },
}

fn parse_resolution(s: &str) -> Result<Resolution, String> {
    match s {
        "use-remote" => Ok(Resolution::UseRemote),
        "keep-local" => Ok(Resolution::KeepLocal),
        other => match other.strip_prefix("manual=") {
            Some(file) => fs::read_to_string(file)
                .map(Resolution::Manual)
                .map_err(|e| format!("cannot read {file}: {e}")),
            None => Err(format!(
                "unknown resolution {other:?}; expected use-remote, keep-local or manual=FILE"
            )),
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(db) = args.db {
        config.database_path = db;
    }
    config.github.token = std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty());
    if config.github.token.is_none() {
        debug!("GITHUB_TOKEN not set; sending unauthenticated requests");
    }

    let store = QueueStore::open(&config.database_path)
        .with_context(|| format!("opening {}", config.database_path.display()))?
        .with_recent_limit(config.recent_limit);
    let remote = GitHubClient::new(config.github.clone())?;
    let manager = WorkspaceManager::new(Arc::new(store), Arc::new(remote), config);

    run(&manager, args.command).await
}

async fn run(manager: &WorkspaceManager<GitHubClient>, command: Command) -> Result<()> {
    match command {
        Command::Open {
            owner,
            repo,
            branch,
            path,
        } => {
            let ws = manager
                .open_workspace(&owner, &repo, branch.as_deref(), &path)
                .await?;
            let ws = ws.workspace().await;
            println!("{}  {} ({})", ws.id, ws.display_name, ws.branch());
        }
        Command::Recent => {
            for entry in manager.recent_workspaces()? {
                println!(
                    "{}  {} ({})  {}",
                    entry.workspace_id,
                    entry.display_name,
                    entry.key.branch,
                    entry.last_opened_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        Command::Close { id } => {
            manager.close_workspace(&id).await?;
            info!("Closed {}", id);
        }
        Command::Write { id, path, file } => {
            let content = fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let ws = manager.restore_workspace(&id).await?;
            report_write(&path, ws.write_file(&path, &content)?);
        }
        Command::Rm { id, path } => {
            let ws = manager.restore_workspace(&id).await?;
            report_write(&path, ws.delete_file(&path)?);
        }
        Command::Cat { id, path } => {
            let ws = manager.restore_workspace(&id).await?;
            print!("{}", ws.read_file(&path).await?);
        }
        Command::Stage { id, paths, all } => {
            let ws = manager.restore_workspace(&id).await?;
            let n = if all {
                ws.stage_all()?
            } else {
                ws.stage(&as_strs(&paths))?
            };
            info!("Staged {} edit(s)", n);
        }
        Command::Unstage { id, paths, all } => {
            let ws = manager.restore_workspace(&id).await?;
            let n = if all {
                ws.unstage_all()?
            } else {
                ws.unstage(&as_strs(&paths))?
            };
            info!("Unstaged {} edit(s)", n);
        }
        Command::Status { id } => {
            let ws = manager.restore_workspace(&id).await?;
            print_status(&ws).await?;
        }
        Command::Pull { id } => {
            let ws = manager.restore_workspace(&id).await?;
            report_cycle(ws.pull().await?);
        }
        Command::Push { id, message } => {
            let ws = manager.restore_workspace(&id).await?;
            report_cycle(ws.push(message.as_deref()).await?);
        }
        Command::Sync { id, message } => {
            let ws = manager.restore_workspace(&id).await?;
            report_cycle(ws.sync(message.as_deref()).await?);
        }
        Command::Resolve {
            id,
            path,
            resolution,
        } => {
            let ws = manager.restore_workspace(&id).await?;
            // Conflicts are held in memory only; rediscover them first.
            if let SyncOutcome::UpToDate = ws.pull().await? {
                bail!("no conflicts in {}", id);
            }
            let remaining = ws
                .resolve_conflicts(&[ConflictResolution::new(path.as_str(), resolution)])
                .await?;
            info!("Resolved {}; {} conflict(s) remaining", path, remaining);
        }
    }
    Ok(())
}

fn as_strs(paths: &[String]) -> Vec<&str> {
    paths.iter().map(String::as_str).collect()
}

fn report_write(path: &str, outcome: WriteOutcome) {
    match outcome {
        WriteOutcome::Queued(action) => info!("Queued {} of {}", action, path),
        WriteOutcome::Reverted => info!("{} matches the remote again; edit dropped", path),
        WriteOutcome::Unchanged => info!("{} unchanged", path),
    }
}

fn report_cycle(outcome: SyncOutcome) {
    match outcome {
        SyncOutcome::AlreadySyncing => info!("A sync is already running"),
        SyncOutcome::UpToDate => info!("Up to date"),
        SyncOutcome::NothingToPush => info!("Nothing staged"),
        SyncOutcome::Committed(summary) => {
            println!("{}", summary.commit_sha);
            info!("Committed {} file(s)", summary.files);
            if summary.restored > 0 {
                info!("{} edit(s) reverted during the push are queued again", summary.restored);
            }
        }
        SyncOutcome::Conflicts(conflicts) => {
            for conflict in &conflicts {
                let remote = conflict.remote_sha.as_deref().unwrap_or("deleted");
                println!("conflict  {}  (base {}, remote {})", conflict.path, conflict.local_sha, remote);
            }
            info!(
                "{} conflict(s); resolve with `reposync resolve`",
                conflicts.len()
            );
        }
    }
}

async fn print_status(ws: &SyncOrchestrator<GitHubClient>) -> Result<()> {
    let workspace = ws.workspace().await;
    println!("{} ({})", workspace.display_name, workspace.branch());
    match workspace.last_synced_at {
        Some(at) => println!("last synced {}", at.format("%Y-%m-%d %H:%M:%S")),
        None => println!("never synced"),
    }
    let edits = ws.pending_edits()?;
    if edits.is_empty() {
        println!("no pending edits");
    }
    for edit in edits {
        let mark = if edit.staged { "staged  " } else { "unstaged" };
        println!("{mark}  {:<6}  {}", edit.action.as_str(), edit.path);
    }
    Ok(())
}
