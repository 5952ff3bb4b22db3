//! Check command for validating a migrations directory

use sqlstep_core::DirectorySource;

use crate::output::{print_json, OutputFormat};
use crate::{AppContext, Cli};

pub async fn run(cli: &Cli, ctx: &AppContext) -> anyhow::Result<()> {
    let source = DirectorySource::new(&ctx.migrations_dir);
    let set = sqlstep_core::load(&source).await?;

    match cli.output_format() {
        OutputFormat::Json => {
            let files: Vec<_> = set.files().collect();
            print_json(&files)?;
        }
        OutputFormat::Table => {
            for file in set.files() {
                println!("{:>5} {:<4} {}", file.number, file.direction.as_str(), file.name);
            }
            println!(
                "OK: {} migration files, latest version {}",
                set.len(),
                set.max_number()
            );
        }
    }

    Ok(())
}
