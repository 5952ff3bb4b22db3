//! sqlstep CLI - Apply and roll back numbered SQL migrations

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use sqlstep_storage::MigrationBackend;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod commands;
mod config;
mod output;

use commands::{check, completions, migrate, status};
use config::Config;
use output::OutputFormat;

#[derive(Parser)]
#[command(name = "sqlstep")]
#[command(author, version, about = "Numbered SQL migrations with in-database version tracking")]
pub struct Cli {
    /// SQLite database file
    #[arg(short, long, env = "SQLSTEP_DATABASE", global = true)]
    pub database: Option<PathBuf>,

    /// Postgres connection URL
    #[cfg(feature = "postgres")]
    #[arg(long, env = "SQLSTEP_POSTGRES", global = true)]
    pub postgres: Option<String>,

    /// Migrations directory
    #[arg(short, long, global = true)]
    pub migrations: Option<PathBuf>,

    /// Name of the version tracking table
    #[arg(long, global = true)]
    pub table: Option<String>,

    /// Output format: table, json
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn output_format(&self) -> OutputFormat {
        OutputFormat::from(self.format.as_str())
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Migrate the database to a target version
    Migrate(migrate::MigrateArgs),
    /// Show the current and latest versions
    Status,
    /// Validate the migrations directory without touching a database
    Check,
    /// Manage configuration
    Config(commands::config::ConfigArgs),
    /// Generate shell completions
    Completions(completions::CompletionsArgs),
}

/// Settings resolved from flags, the config file and defaults
pub struct AppContext {
    pub config: Config,
    pub migrations_dir: PathBuf,
    pub version_table: String,
}

impl AppContext {
    pub fn new(cli: &Cli) -> Self {
        let config = Config::load();
        let migrations_dir = cli
            .migrations
            .clone()
            .unwrap_or_else(|| PathBuf::from(&config.migrations_dir));
        let version_table = cli
            .table
            .clone()
            .unwrap_or_else(|| config.version_table.clone());

        Self {
            config,
            migrations_dir,
            version_table,
        }
    }

    /// Connect to the configured database, preferring Postgres when a URL
    /// is configured
    pub async fn backend(&self, cli: &Cli) -> anyhow::Result<Arc<dyn MigrationBackend>> {
        if let Some(backend) = self.postgres_backend(cli).await? {
            return Ok(backend);
        }
        if let Some(backend) = self.sqlite_backend(cli)? {
            return Ok(backend);
        }

        anyhow::bail!(
            "No database configured. Pass --database, or set `database` in {}",
            config::config_file_path().display()
        )
    }

    #[cfg(feature = "postgres")]
    async fn postgres_backend(&self, cli: &Cli) -> anyhow::Result<Option<Arc<dyn MigrationBackend>>> {
        let Some(url) = cli.postgres.clone().or_else(|| self.config.postgres.clone()) else {
            return Ok(None);
        };
        tracing::debug!("Using postgres backend");
        let backend: Arc<dyn MigrationBackend> = Arc::new(
            sqlstep_storage::PostgresBackend::connect(&url)
                .await?
                .with_version_table(&self.version_table)?,
        );
        Ok(Some(backend))
    }

    #[cfg(not(feature = "postgres"))]
    async fn postgres_backend(&self, _cli: &Cli) -> anyhow::Result<Option<Arc<dyn MigrationBackend>>> {
        Ok(None)
    }

    #[cfg(feature = "sqlite")]
    fn sqlite_backend(&self, cli: &Cli) -> anyhow::Result<Option<Arc<dyn MigrationBackend>>> {
        let database = cli
            .database
            .clone()
            .or_else(|| self.config.database.as_ref().map(PathBuf::from));
        let Some(path) = database else {
            return Ok(None);
        };
        tracing::debug!("Using database at: {:?}", path);
        let backend: Arc<dyn MigrationBackend> = Arc::new(
            sqlstep_storage::SqliteBackend::open(&path)?.with_version_table(&self.version_table)?,
        );
        Ok(Some(backend))
    }

    #[cfg(not(feature = "sqlite"))]
    fn sqlite_backend(&self, _cli: &Cli) -> anyhow::Result<Option<Arc<dyn MigrationBackend>>> {
        Ok(None)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    tracing::debug!("Starting sqlstep CLI");

    let ctx = AppContext::new(&cli);

    match &cli.command {
        Commands::Migrate(args) => migrate::run(args, &cli, &ctx).await?,
        Commands::Status => status::run(&cli, &ctx).await?,
        Commands::Check => check::run(&cli, &ctx).await?,
        Commands::Config(args) => commands::config::run(args).await?,
        Commands::Completions(args) => completions::run(args)?,
    }

    Ok(())
}
