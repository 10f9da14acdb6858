//! CLI entry point.

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use glair_cli::{Cli, CliError, Commands, handlers};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(cli).await {
        if let Some(cli_err) = err.downcast_ref::<CliError>() {
            eprintln!("Error: {cli_err}");
            std::process::exit(cli_err.exit_code());
        }
        return Err(err);
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };
    let config = cli.config.as_deref();

    match command {
        Commands::Crop(args) => {
            let settings = handlers::settings::load(config)?;
            handlers::crop::execute(&settings, args)?;
        }
        Commands::Replay(args) => {
            let settings = handlers::settings::load(config)?;
            handlers::replay::execute(settings, args).await?;
        }
        Commands::Settings { command } => {
            handlers::settings::execute(config, command)?;
        }
    }
    Ok(())
}
