use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use refwatch::changes;
use refwatch::notify::{self, Notifier};
use refwatch::setting::{valid_org_name, valid_repo_name};
use refwatch::{AppConfig, ReconcileEngine, Setting};

#[derive(Parser)]
#[command(name = "refwatch")]
#[command(about = "Poll-based watcher for git branches, tags and pinned references")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile one user's tracked references against the remote
    Run {
        /// Path to the user's settings file
        settings: PathBuf,

        /// Compute and report the diff without persisting state
        #[arg(long)]
        no_save: bool,
    },

    /// Reconcile every user found under the data directory
    RunAll {
        /// Only process users of this provider
        #[arg(long)]
        provider: Option<String>,
    },

    /// Show saved run history for a user
    Show {
        /// Path to the user's settings file
        settings: PathBuf,

        /// Identifier of a saved run to print in full
        id: Option<String>,
    },

    /// Validate a settings file and verify tracked repositories exist
    Check {
        /// Path to the user's settings file
        settings: PathBuf,

        /// Skip remote existence checks
        #[arg(long)]
        offline: bool,
    },

    /// Search the provider for repositories or users to track
    Search {
        /// Path to the user's settings file (supplies provider and token)
        settings: PathBuf,

        /// Search query; `owner/name` fragments narrow repository search
        query: String,

        /// Search users/organisations instead of repositories
        #[arg(long)]
        users: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose)?;
    info!("Starting refwatch v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(cli.config)?;

    match cli.command {
        Commands::Run { settings, no_save } => cmd_run(&settings, no_save, &config).await,
        Commands::RunAll { provider } => cmd_run_all(provider, &config).await,
        Commands::Show { settings, id } => cmd_show(&settings, id),
        Commands::Check { settings, offline } => cmd_check(&settings, offline, &config).await,
        Commands::Search {
            settings,
            query,
            users,
        } => cmd_search(&settings, &query, users, &config).await,
    }
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    Ok(())
}

/// Load configuration from specified path or default location
fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig> {
    let mut config = match config_path {
        Some(path) => AppConfig::load(&path)?,
        None => AppConfig::load_or_default()?,
    };
    config.expand_paths()?;
    Ok(config)
}

/// History directory sitting next to a settings file
fn history_dir(settings_path: &Path) -> PathBuf {
    settings_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("diff")
}

/// Reconcile one user and persist the outcome
async fn cmd_run(settings_path: &Path, no_save: bool, config: &AppConfig) -> Result<()> {
    let mut setting = Setting::load(settings_path)?;
    let engine = ReconcileEngine::new(&setting, config)?;

    let report = engine
        .run(&mut setting)
        .await
        .with_context(|| format!("Run failed for {}", setting.auth.user_info()))?;

    if report.any_changed {
        println!("{}", notify::render_text(&report.change_sets));
    } else {
        println!("No changes for {}", setting.auth.user_info());
    }

    if no_save {
        info!("Skipping persistence (--no-save)");
        return Ok(());
    }

    changes::save_history(&history_dir(settings_path), &report.change_sets)?;
    setting.save(settings_path)?;

    if report.any_changed {
        if let Some(webhook) = notify::webhook_for(&setting, &config.webhook_integrations)? {
            webhook.notify(&report.change_sets).await?;
        }
    }

    Ok(())
}

/// Reconcile every user with a settings file under the data directory.
/// Per-user failures are logged and do not stop the sweep.
async fn cmd_run_all(provider_filter: Option<String>, config: &AppConfig) -> Result<()> {
    let settings_files = collect_settings_files(
        Path::new(&config.data_dir),
        &config.settings_file,
        provider_filter.as_deref(),
    )?;
    if settings_files.is_empty() {
        println!("No user settings found under {}", config.data_dir);
        return Ok(());
    }

    let total = settings_files.len();
    let mut failures = 0usize;
    for path in settings_files {
        if let Err(err) = cmd_run(&path, false, config).await {
            warn!("Skipping {}: {:#}", path.display(), err);
            failures += 1;
        }
    }

    info!("Processed {} users ({} failed)", total, failures);
    Ok(())
}

/// Settings files laid out as `<data_dir>/<provider>/<username>/settings.yml`
fn collect_settings_files(
    data_dir: &Path,
    settings_file: &str,
    provider_filter: Option<&str>,
) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if !data_dir.is_dir() {
        return Ok(files);
    }

    for provider_entry in std::fs::read_dir(data_dir)
        .with_context(|| format!("Failed to read data directory {}", data_dir.display()))?
    {
        let provider_dir = provider_entry?.path();
        if !provider_dir.is_dir() {
            continue;
        }
        if let Some(filter) = provider_filter {
            if provider_dir.file_name().and_then(|n| n.to_str()) != Some(filter) {
                continue;
            }
        }

        for user_entry in std::fs::read_dir(&provider_dir)? {
            let candidate = user_entry?.path().join(settings_file);
            if candidate.is_file() {
                files.push(candidate);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// List saved runs, or print one in full
fn cmd_show(settings_path: &Path, id: Option<String>) -> Result<()> {
    let dir = history_dir(settings_path);

    match id {
        Some(id) => {
            let sets = changes::load_history(&dir, &id)?;
            let text = notify::render_text(&sets);
            if text.is_empty() {
                println!("Run {} recorded no changes", id);
            } else {
                println!("{}", text);
            }
        }
        None => {
            let entries = changes::list_history(&dir)?;
            if entries.is_empty() {
                println!("No saved runs under {}", dir.display());
                return Ok(());
            }
            for entry in entries {
                println!("{}", entry);
            }
        }
    }

    Ok(())
}

/// Validate a settings file; unless offline, also confirm each tracked
/// repository is reachable with the stored credentials
async fn cmd_check(settings_path: &Path, offline: bool, config: &AppConfig) -> Result<()> {
    let setting = Setting::load(settings_path)?;
    let mut problems = 0usize;

    for repo in &setting.repos {
        if !valid_repo_name(&repo.repo) {
            println!("❌ Invalid repository name: {}", repo.repo);
            problems += 1;
        }
    }
    for org in &setting.orgs {
        if !valid_org_name(&org.name) {
            println!("❌ Invalid organisation name: {}", org.name);
            problems += 1;
        }
    }

    if !notify::has_notification_target(&setting, &config.webhook_integrations) {
        println!("❌ No usable notification target (email or webhook)");
        problems += 1;
    }

    if !offline {
        let engine = ReconcileEngine::new(&setting, config)?;
        for repo in &setting.repos {
            match engine.client().default_branch(&repo.repo).await {
                Ok(branch) => println!("✅ {} (default branch: {})", repo.repo, branch),
                Err(err) => {
                    println!("❌ {}: {}", repo.repo, err);
                    problems += 1;
                }
            }
        }
        for org in &setting.orgs {
            match engine.client().org_kind(&org.name).await {
                Ok(kind) if kind == org.kind => println!("✅ {} ({})", org.name, kind),
                Ok(kind) => {
                    println!(
                        "❌ {} is a {} but is tracked as a {}",
                        org.name, kind, org.kind
                    );
                    problems += 1;
                }
                Err(err) => {
                    println!("❌ {}: {}", org.name, err);
                    problems += 1;
                }
            }
        }
    }

    if problems == 0 {
        println!(
            "✅ {} looks good ({} repos, {} orgs)",
            settings_path.display(),
            setting.repos.len(),
            setting.orgs.len()
        );
        Ok(())
    } else {
        anyhow::bail!("Found {} problem(s) in {}", problems, settings_path.display())
    }
}

/// Search the user's provider for repositories or users to track
async fn cmd_search(
    settings_path: &Path,
    query: &str,
    users: bool,
    config: &AppConfig,
) -> Result<()> {
    let setting = Setting::load(settings_path)?;
    let engine = ReconcileEngine::new(&setting, config)?;

    if users {
        let found = engine.client().search_users(query).await?;
        if found.is_empty() {
            println!("No users matching '{}'", query);
        }
        for user in found {
            println!("{} ({})", user.login, user.kind);
        }
    } else {
        let found = engine.client().search_repos(query).await?;
        if found.is_empty() {
            println!("No repositories matching '{}'", query);
        }
        for repo in found {
            if repo.description.is_empty() {
                println!("{}", repo.name);
            } else {
                println!("{} - {}", repo.name, repo.description);
            }
        }
    }

    Ok(())
}
