use std::error::Error;

use crate::{commands::load_context, config::TomlConfig};

#[derive(clap::Args, Debug, Clone)]
#[command(about = "Print the schema description given to the model", long_about = None)]
#[must_use]
pub struct Schema {
    #[arg(long, help = "Print the schema document as JSON")]
    json: bool,
}

impl Schema {
    pub async fn run(self, config: &TomlConfig) -> Result<(), Box<dyn Error>> {
        let context = load_context(config).await?;
        let snapshot = context.snapshot();
        if self.json {
            println!("{}", serde_json::to_string_pretty(snapshot.as_ref())?);
        } else if snapshot.document.is_empty() {
            eprintln!("No tables found in {}", context.owner());
        } else {
            println!("{}", snapshot.text);
        }
        Ok(())
    }
}
