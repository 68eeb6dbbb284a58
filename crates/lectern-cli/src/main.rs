//! CLI entry point - the composition root.

use clap::{CommandFactory, Parser};

use lectern_cli::{Cli, CliConfig, CliError, Commands, handlers, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let Some(command) = cli.command.as_ref() else {
        Cli::command().print_help()?;
        return Ok(());
    };

    if let Err(err) = run(&cli, command).await {
        if let Some(cli_err) = err.downcast_ref::<CliError>() {
            eprintln!("Error: {cli_err}");
            std::process::exit(cli_err.exit_code());
        }
        return Err(err);
    }
    Ok(())
}

async fn run(cli: &Cli, command: &Commands) -> anyhow::Result<()> {
    let config = CliConfig::from_cli(cli)?;
    tracing::debug!(?config, "Effective configuration");

    match command {
        Commands::Devices => handlers::devices::execute().map_err(into_cli)?,
        Commands::Play { file, format } => {
            handlers::play::execute(config.audio, file, *format)
                .await
                .map_err(into_cli)?;
        }
        Commands::Config => handlers::config::execute(&config)?,
    }
    Ok(())
}

/// Surface pipeline errors as `CliError` so they get a specific exit code.
fn into_cli(err: anyhow::Error) -> anyhow::Error {
    match err.downcast::<lectern_voice::VoiceError>() {
        Ok(voice) => CliError::from(voice).into(),
        Err(other) => other,
    }
}
