use std::{error::Error, io::Write};

use sql_ask_core::{export::CsvExporter, pipeline::Answer};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use crate::{
    commands::{Session, print_answer, report_skipped},
    config::TomlConfig,
};

const HELP: &str = "\
Type a question, or one of:
  :refresh  re-read the database schema
  :schema   print the schema given to the model
  :clear    remove the exported result file
  :quit     exit";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Question(String),
    Refresh,
    Schema,
    Clear,
    Help,
    Quit,
    Unknown(String),
}

impl Input {
    fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some(command) = line.strip_prefix(':') else {
            return Some(Input::Question(line.to_owned()));
        };
        Some(match command {
            "refresh" | "r" => Input::Refresh,
            "schema" | "s" => Input::Schema,
            "clear" | "c" => Input::Clear,
            "help" | "h" | "?" => Input::Help,
            "quit" | "q" | "exit" => Input::Quit,
            other => Input::Unknown(other.to_owned()),
        })
    }
}

/// Prints an answer, reporting an export failure instead of ending the
/// session. Returns whether everything succeeded.
fn show_answer(answer: &Answer, exporter: &CsvExporter) -> bool {
    match print_answer(answer, exporter, None) {
        Ok(()) => true,
        Err(err) => {
            eprintln!("Error: {err}");
            false
        }
    }
}

#[derive(clap::Args, Debug, Clone)]
#[command(about = "Answer questions interactively", long_about = None)]
#[must_use]
pub struct Repl {}

impl Repl {
    pub async fn run(self, config: &TomlConfig) -> Result<(), Box<dyn Error>> {
        let mut session = Session::open(config).await?;
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        eprintln!("{HELP}");
        loop {
            print!("sql-ask> ");
            std::io::stdout().flush()?;
            let Some(line) = lines.next_line().await? else {
                break;
            };
            let Some(input) = Input::parse(&line) else {
                continue;
            };
            match input {
                Input::Quit => break,
                Input::Help => eprintln!("{HELP}"),
                Input::Unknown(command) => eprintln!("Unknown command :{command}\n{HELP}"),
                Input::Schema => println!("{}", session.context.snapshot().text),
                Input::Refresh => match session.context.refresh().await {
                    Ok(snapshot) => {
                        report_skipped(&session.context);
                        eprintln!("Schema refreshed: {} tables", snapshot.document.tables().len());
                    }
                    Err(err) => eprintln!("Error: {err}"),
                },
                Input::Clear => match session.exporter.clear() {
                    Ok(true) => eprintln!("Removed {}", session.exporter.path().display()),
                    Ok(false) => eprintln!("Nothing to clear"),
                    Err(err) => eprintln!("Error: {err}"),
                },
                Input::Question(question) => {
                    match session.sql_ask.ask(&session.context, &question).await {
                        Ok(answer) => {
                            show_answer(&answer, &session.exporter);
                        }
                        Err(err) => eprintln!("Error: {err}"),
                    }
                }
            }
        }
        if let Err(err) = session.exporter.clear() {
            warn!("Could not remove {}: {err}", session.exporter.path().display());
        }
        Ok(())
    }
}
