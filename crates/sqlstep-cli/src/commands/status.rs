//! Status command

use serde::Serialize;
use sqlstep_core::{DirectorySource, Plan};
use sqlstep_storage::VersionStore;

use crate::output::{print_json, OutputFormat};
use crate::{AppContext, Cli};

#[derive(Debug, Serialize)]
struct Status {
    /// `None` until the first migrate creates the version table
    current: Option<u32>,
    latest: u32,
    /// The database records a version no migration file reaches
    ahead: bool,
    pending: Vec<String>,
}

pub async fn run(cli: &Cli, ctx: &AppContext) -> anyhow::Result<()> {
    let backend = ctx.backend(cli).await?;
    let current = VersionStore::new(&backend).current().await?;

    let set = sqlstep_core::load(&DirectorySource::new(&ctx.migrations_dir)).await?;
    let latest = set.max_number();
    let from = current.unwrap_or(0);
    let ahead = from > latest;
    let pending = if ahead {
        Vec::new()
    } else {
        Plan::between(&set, from, latest)?
            .steps
            .into_iter()
            .map(|s| s.name)
            .collect()
    };

    let status = Status {
        current,
        latest,
        ahead,
        pending,
    };

    match cli.output_format() {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Table => {
            match status.current {
                Some(v) => println!("Current version: {}", v),
                None => println!("Current version: none (version table {} not created)", ctx.version_table),
            }
            println!("Latest version:  {}", status.latest);
            if status.ahead {
                println!(
                    "Database is ahead of the migrations in {}",
                    ctx.migrations_dir.display()
                );
            }
            for name in &status.pending {
                println!("  pending {}", name);
            }
        }
    }

    Ok(())
}
