use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use biql::cli::{Cli, Commands, normalize_args};
use biql::commands::{
    ExtractOptions, handle_extract_command, handle_init_command, handle_parse_command,
    interruptible,
};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_from(normalize_args(std::env::args_os()));
    init_tracing(cli.verbose);

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("biql: error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Init { dir } => handle_init_command(&dir),
        Commands::Extract {
            table,
            output,
            samples,
            format,
            truncate,
            timeout,
            access_token,
            endpoint,
        } => {
            let opts = ExtractOptions {
                table,
                output,
                samples,
                format,
                truncate,
                timeout: timeout.map(Duration::from_secs),
                access_token,
                endpoint,
            };
            interruptible(handle_extract_command(&opts), tokio::signal::ctrl_c()).await
        }
        Commands::Parse { config, json } => handle_parse_command(&config, json),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "biql=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
