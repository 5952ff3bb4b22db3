//! Migrate command

use clap::Args;
use sqlstep_core::{DirectorySource, Target};
use sqlstep_storage::{CancellationToken, MigrationRunner};

use crate::output::{print_json, OutputFormat};
use crate::{AppContext, Cli};

#[derive(Args)]
pub struct MigrateArgs {
    /// Target version (-1 = latest)
    #[arg(short, long, default_value_t = Target::LATEST, allow_negative_numbers = true)]
    pub target: i64,

    /// Print the planned steps without applying them
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn run(args: &MigrateArgs, cli: &Cli, ctx: &AppContext) -> anyhow::Result<()> {
    let target = Target::from_raw(args.target)?;
    let backend = ctx.backend(cli).await?;
    let runner = MigrationRunner::new(backend, DirectorySource::new(&ctx.migrations_dir));

    if args.dry_run {
        let plan = runner.preview(target).await?;
        match cli.output_format() {
            OutputFormat::Json => print_json(&plan)?,
            OutputFormat::Table => {
                if plan.is_empty() {
                    println!("Already at version {}", plan.from);
                }
                for step in &plan.steps {
                    println!("{} -> {}  {}", step.number, step.version_after, step.name);
                }
            }
        }
        return Ok(());
    }

    // Ctrl-C stops the run at the next step boundary
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping after the current step");
            on_signal.cancel();
        }
    });

    tracing::info!("Migrating {} to {}", ctx.migrations_dir.display(), target);
    let report = runner.run_until_cancelled(target, &cancel).await?;

    match cli.output_format() {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table if cli.quiet => {}
        OutputFormat::Table => {
            if report.is_noop() {
                println!("Already at version {}", report.to);
            } else {
                println!(
                    "Migrated from {} to {} ({} steps)",
                    report.from,
                    report.to,
                    report.applied.len()
                );
            }
        }
    }

    Ok(())
}
