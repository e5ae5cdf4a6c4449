mod cli;
mod commands;
mod logging;
mod output;

use agrigate_authz::AuthorizationService;
use agrigate_authz::config::loader::load_config;
use anyhow::{Context, Result};
use clap::Parser;

use cli::{Cli, Commands, ConfigCommands};
use output::print_error;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let format = cli.format.unwrap_or_default();

    let config = load_config(cli.config.as_deref()).context("failed to load configuration")?;
    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    logging::init_tracing_with_level(level);

    if let Commands::Config(args) = &cli.command {
        return match &args.command {
            ConfigCommands::Show(show) => commands::config::show(&config, show.toml, format),
            ConfigCommands::Validate => commands::config::validate(&config),
        };
    }

    let service = AuthorizationService::from_config(config)?;
    let outcome = match &cli.command {
        Commands::Roles(args) => commands::roles::list(&service, args.role, format),
        Commands::Resources => commands::roles::resources(&service, format),
        Commands::Check(args) => commands::check::run(&service, args, format).await,
        Commands::Query(args) => commands::query::run(&service, args, format),
        Commands::Config(_) => Ok(()),
    };
    service.shutdown().await?;
    outcome
}
