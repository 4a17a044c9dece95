use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use loomwork::presentation::cli::commands::{InvalidateCommand, PlanCommand, RunCommand};
use loomwork::presentation::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("loomwork=debug,info")
    } else {
        EnvFilter::new("loomwork=info")
    };

    fmt().with_env_filter(filter).with_target(false).init();

    match cli.command {
        Commands::Plan { workspace, modules, target } => {
            PlanCommand::execute(&workspace, &modules, &target)?;
        }
        Commands::Run { workspace, modules, target, given } => {
            RunCommand::execute(&workspace, &modules, &target, &given).await?;
        }
        Commands::Invalidate { workspace, modules, item } => {
            InvalidateCommand::execute(&workspace, &modules, &item)?;
        }
    }

    Ok(())
}
