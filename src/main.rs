use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use event_engine::{config, init_tracing};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    init_tracing(&config::load_logging_config(&args.config));

    match args.get_command() {
        cli::Commands::Start => {
            commands::start::execute(&args.config).await?;
        }
        cli::Commands::Ingest(ingest) => {
            commands::ingest::execute(&args.config, ingest).await?;
        }
        cli::Commands::Query(query) => {
            commands::query::execute(&args.config, query).await?;
        }
        cli::Commands::Buckets(buckets) => {
            commands::buckets::execute(&args.config, buckets).await?;
        }
        cli::Commands::Purge(purge) => {
            commands::purge::execute(&args.config, purge).await?;
        }
        cli::Commands::Maintenance => {
            commands::maintenance::execute(&args.config).await?;
        }
        cli::Commands::Sql(sql) => {
            commands::sql::execute(sql)?;
        }
        cli::Commands::Config { action } => match action {
            cli::ConfigCommands::Show => commands::config::show(&args.config)?,
            cli::ConfigCommands::Validate => commands::config::validate(&args.config)?,
        },
        cli::Commands::Version => {
            println!("Event Engine v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
