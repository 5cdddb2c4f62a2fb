//! binmirror CLI - command-line interface for the binary mirror.

mod commands;
mod config;
mod progress;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::Term;
use tracing_subscriber::EnvFilter;

use crate::commands::shared::OutputFormat;

#[derive(Parser)]
#[command(name = "binmirror")]
#[command(version)]
#[command(about = "Binary mirror synchronization for a private package registry")]
#[command(
    long_about = "binmirror mirrors prebuilt binaries (Node.js, Electron, Playwright browsers, \
node-pre-gyp addons, ...) from their upstream hosts into one virtual directory tree per \
category, keeping the tree in a database and the bytes in a blob store."
)]
#[command(after_long_help = r#"EXAMPLES
    List the configured categories:
        $ binmirror categories

    Mirror Node.js and Electron now:
        $ binmirror sync node electron

    See what a sync would touch without writing anything:
        $ binmirror sync node --dry-run

    Run a long-lived worker that drains the task queue:
        $ binmirror worker --concurrency 8

    Browse the mirrored tree:
        $ binmirror ls node /v20.11.0/

CONFIGURATION
    binmirror reads configuration from:
      1. ~/.config/binmirror/config.toml (or $XDG_CONFIG_HOME/binmirror/config.toml)
      2. ./binmirror.toml
      3. Environment variables (BINMIRROR_ prefix, `__` between sections)
      4. .env file in current directory

ENVIRONMENT VARIABLES
    BINMIRROR_DATABASE__URL     Database connection string (default: ~/.local/state/binmirror/binmirror.db)
    BINMIRROR_STORAGE__ROOT     Blob store directory (default: ~/.local/share/binmirror/blobs)
    BINMIRROR_GITHUB__TOKEN     GitHub token for release listings (GITHUB_TOKEN also works)
    RUST_LOG                    Log filter (default: binmirror=info,binmirror_cli=info)
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
    /// List configured categories
    Categories {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Sync categories now
    Sync(SyncArgs),
    /// Run a worker pool until Ctrl+C
    Worker {
        /// Categories synced concurrently (default from config or 4)
        #[arg(short = 'c', long)]
        concurrency: Option<usize>,
    },
    /// List one directory of the mirrored tree
    Ls {
        /// Category name
        category: String,
        /// Directory path
        #[arg(default_value = "/")]
        path: String,
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Show per-category task state and node counts
    Status {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        output: OutputFormat,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
    /// Generate man page(s)
    Man {
        /// Output directory for man pages (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum MigrateAction {
    /// Apply all pending migrations
    Up,
    /// Rollback the last migration
    Down,
    /// Show migration status
    Status,
    /// Drop all tables and reapply migrations
    Fresh {
        /// Confirm dropping all mirrored metadata
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Debug, Clone, clap::Args)]
struct SyncArgs {
    /// Category name(s)
    categories: Vec<String>,

    /// Sync every configured category
    #[arg(short = 'A', long, conflicts_with = "categories")]
    all: bool,

    /// Dry run - list upstream without writing nodes, blobs or tasks
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Categories synced concurrently (default from config or 4)
    #[arg(short = 'c', long)]
    concurrency: Option<usize>,
}

fn init_tracing() {
    let explicit = std::env::var_os("RUST_LOG").is_some();
    // On a TTY the progress spinners replace log output unless a filter is
    // set explicitly.
    if Term::stdout().is_term() && !explicit {
        return;
    }

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("binmirror=info,binmirror_cli=info"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

fn ensure_sqlite_dir(database_url: &str) -> std::io::Result<()> {
    let Some(db_path) = database_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    // Strip query parameters (e.g., ?mode=rwc) before path operations
    let db_path = db_path.split('?').next().unwrap_or(db_path);
    let db_path = std::path::Path::new(db_path);

    if db_path.is_relative() && !db_path.as_os_str().is_empty() {
        tracing::warn!(
            "Database path '{}' is relative - behavior depends on current directory. \
             Consider using an absolute path.",
            db_path.display()
        );
    }

    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    // Handle commands that don't require configuration or database access first
    match &cli.command {
        Commands::Completions { shell } => {
            return commands::meta::handle_completions(*shell);
        }
        Commands::Man { output } => {
            return commands::meta::handle_man(output.clone());
        }
        _ => {}
    }

    let config = config::Config::load()?;

    if let Commands::Categories { output } = &cli.command {
        return commands::categories::handle_categories(&config, *output);
    }

    let database_url = config
        .database_url()
        .ok_or("Could not determine a database URL; set [database] url")?;
    ensure_sqlite_dir(&database_url)?;

    match cli.command {
        Commands::Migrate { action } => {
            commands::migrate::handle_migrate(action, &database_url).await?;
        }
        Commands::Sync(args) => {
            commands::sync::handle_sync(args, &config, &database_url).await?;
        }
        Commands::Worker { concurrency } => {
            commands::worker::handle_worker(concurrency, &config, &database_url).await?;
        }
        Commands::Ls {
            category,
            path,
            output,
        } => {
            commands::ls::handle_ls(&category, &path, output, &database_url).await?;
        }
        Commands::Status { output } => {
            commands::status::handle_status(output, &database_url).await?;
        }
        Commands::Categories { .. } | Commands::Completions { .. } | Commands::Man { .. } => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn sync_parses_categories_and_flags() {
        let cli = Cli::try_parse_from(["binmirror", "sync", "node", "electron", "-n", "-c", "2"])
            .expect("valid args");
        let Commands::Sync(args) = cli.command else {
            panic!("expected sync");
        };
        assert_eq!(args.categories, vec!["node", "electron"]);
        assert!(args.dry_run);
        assert_eq!(args.concurrency, Some(2));
        assert!(!args.all);
    }

    #[test]
    fn sync_all_conflicts_with_names() {
        assert!(Cli::try_parse_from(["binmirror", "sync", "--all", "node"]).is_err());
        assert!(Cli::try_parse_from(["binmirror", "sync", "--all"]).is_ok());
    }

    #[test]
    fn ls_defaults_to_root() {
        let cli = Cli::try_parse_from(["binmirror", "ls", "node"]).expect("valid args");
        let Commands::Ls { path, .. } = cli.command else {
            panic!("expected ls");
        };
        assert_eq!(path, "/");
    }

    #[test]
    fn sqlite_dir_is_created() {
        let dir = tempfile::tempdir().expect("temp dir");
        let db = dir.path().join("state/nested/binmirror.db");
        ensure_sqlite_dir(&format!("sqlite://{}?mode=rwc", db.display())).expect("create");
        assert!(db.parent().expect("parent").is_dir());
        ensure_sqlite_dir("postgres://localhost/binmirror").expect("non-sqlite is a no-op");
    }
}
