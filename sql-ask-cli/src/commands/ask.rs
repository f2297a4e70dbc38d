use std::{error::Error, path::PathBuf};

use sql_ask_core::{executor::QueryOutcome, export::export_to};

use crate::{
    commands::{Session, print_answer},
    config::TomlConfig,
};

#[derive(clap::Args, Debug, Clone)]
#[command(about = "Answer a single question", long_about = None)]
#[must_use]
pub struct Ask {
    #[arg(required = true, help = "Question in natural language")]
    question: Vec<String>,
    #[arg(long, help = "Generate the SQL without running it")]
    dry_run: bool,
    #[arg(long, help = "Print the prompt sent to the model")]
    show_prompt: bool,
    #[arg(long, help = "Print the whole answer as JSON")]
    json: bool,
    #[arg(long, value_name = "PATH", help = "Write result rows to this CSV file")]
    export: Option<PathBuf>,
}

impl Ask {
    pub async fn run(self, config: &TomlConfig) -> Result<(), Box<dyn Error>> {
        let question = self.question.join(" ");
        let session = Session::open(config).await?;
        let answer = match self.dry_run {
            true => session.sql_ask.generate(&session.context, &question).await?,
            false => session.sql_ask.ask(&session.context, &question).await?,
        };

        if self.json {
            if let (Some(path), Some(QueryOutcome::Rows(result))) = (&self.export, &answer.outcome) {
                export_to(result, path)?;
            }
            println!("{}", serde_json::to_string_pretty(&answer)?);
            return Ok(());
        }
        if self.show_prompt {
            println!("Prompt:\n{}\n", answer.prompt.trim());
        }
        print_answer(&answer, &session.exporter, self.export.as_deref())
    }
}
