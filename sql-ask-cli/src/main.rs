mod commands;
mod config;

use std::{error::Error, path::PathBuf, process::ExitCode};

use clap::*;
use commands::{Ask, Initialize, Repl, Schema};

use crate::config::{DEFAULT_CONFIG, TomlConfig};

#[derive(Parser)]
#[command(
    name = "sql-ask",
    bin_name = "sql-ask",
    version,
    about = "Ask a database questions in natural language"
)]
struct Cli {
    #[arg(long, global = true, help = "Show debug information")]
    debug: bool,
    #[arg(long, global = true, value_name = "PATH", default_value = DEFAULT_CONFIG)]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    Init(Initialize),
    Schema(Schema),
    Ask(Ask),
    Repl(Repl),
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    commands::init_logging(cli.debug)?;
    match cli.command {
        Command::Init(args) => args.init(&cli.config),
        Command::Schema(args) => args.run(&TomlConfig::load(&cli.config)?).await,
        Command::Ask(args) => args.run(&TomlConfig::load(&cli.config)?).await,
        Command::Repl(args) => args.run(&TomlConfig::load(&cli.config)?).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}
