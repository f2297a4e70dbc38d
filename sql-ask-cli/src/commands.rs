mod ask;
mod init;
mod repl;
mod schema;

use std::{error::Error, path::Path, sync::Arc};

use sql_ask_core::{
    SqlAsk,
    backend::{self, Backend},
    executor::QueryOutcome,
    export::{CsvExporter, export_to},
    llm::OllamaClient,
    pipeline::{AppContext, Answer},
};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

pub use ask::Ask;
pub use init::Initialize;
pub use repl::Repl;
pub use schema::Schema;

use crate::config::TomlConfig;

// Logs go to stderr so `--json` output stays parseable.
fn init_standard() -> Result<(), Box<dyn Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::WARN)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn init_debug() -> Result<(), Box<dyn Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

pub fn init_logging(debug: bool) -> Result<(), Box<dyn Error>> {
    match debug {
        true => init_debug(),
        false => init_standard(),
    }
}

/// Connects to the configured database and checks that it answers.
async fn connect(config: &TomlConfig) -> Result<Arc<dyn Backend>, Box<dyn Error>> {
    let url = config.db_url()?;
    let backend = backend::connect(&url, config.database.connect_options()).await?;
    backend.ping().await?;
    info!("Connected to {} database", backend.name());
    Ok(backend)
}

async fn load_context(config: &TomlConfig) -> Result<AppContext, Box<dyn Error>> {
    let backend = connect(config).await?;
    let context = AppContext::load(backend, config.database.owner.clone()).await?;
    report_skipped(&context);
    Ok(context)
}

fn report_skipped(context: &AppContext) {
    for skipped in &context.snapshot().skipped {
        eprintln!("Warning: {skipped}");
    }
}

/// Everything needed to answer questions.
struct Session {
    context: AppContext,
    sql_ask: SqlAsk,
    exporter: CsvExporter,
}

impl Session {
    async fn open(config: &TomlConfig) -> Result<Self, Box<dyn Error>> {
        let context = load_context(config).await?;

        let client = OllamaClient::new(config.model.clone())?;
        client.health_check().await?;

        let mut sql_ask = SqlAsk::builder();
        sql_ask
            .template(config.template(context.backend().name())?)
            .extractor(config.extractor());
        Ok(Self {
            context,
            sql_ask: sql_ask.build(Arc::new(client)),
            exporter: config.exporter(),
        })
    }
}

/// Prints the SQL and its outcome, exporting rows to `export` or, when that
/// is unset, to the exporter's result file.
fn print_answer(
    answer: &Answer,
    exporter: &CsvExporter,
    export: Option<&Path>,
) -> Result<(), Box<dyn Error>> {
    println!("SQL:\n{}\n", answer.sql);
    let Some(outcome) = &answer.outcome else {
        return Ok(());
    };
    println!("{outcome}");
    if let QueryOutcome::Rows(result) = outcome {
        let saved = match export {
            Some(path) => {
                export_to(result, path)?;
                Some(path.to_path_buf())
            }
            None => exporter.export(result)?,
        };
        if let Some(path) = saved {
            eprintln!("Results saved to {}", path.display());
        }
    }
    Ok(())
}
