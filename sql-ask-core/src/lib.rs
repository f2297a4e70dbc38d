use std::sync::Arc;

use tracing::info;

use crate::{
    cleaner::{SqlExtractor, starts_with_statement_keyword},
    executor::execute,
    llm::CompletionClient,
    pipeline::{AppContext, Answer, PipelineError},
    prompt::PromptTemplate,
};

pub mod backend;
pub mod cleaner;
pub mod executor;
pub mod export;
pub mod introspect;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod schema;

#[must_use]
#[derive(Default)]
pub struct SqlAskBuilder {
    template: PromptTemplate,
    extractor: SqlExtractor,
}

impl SqlAskBuilder {
    pub fn template(&mut self, template: PromptTemplate) -> &mut Self {
        self.template = template;
        self
    }

    pub fn extractor(&mut self, extractor: SqlExtractor) -> &mut Self {
        self.extractor = extractor;
        self
    }

    pub fn build(self, client: Arc<dyn CompletionClient>) -> SqlAsk {
        SqlAsk {
            template: self.template,
            extractor: self.extractor,
            client,
        }
    }
}

/// Turns questions into SQL with a completion model and runs the result.
pub struct SqlAsk {
    template: PromptTemplate,
    extractor: SqlExtractor,
    client: Arc<dyn CompletionClient>,
}

impl SqlAsk {
    pub fn builder() -> SqlAskBuilder {
        SqlAskBuilder::default()
    }

    pub fn prompt(&self, context: &AppContext, question: &str) -> String {
        self.template.build(&context.snapshot().text, question)
    }

    /// Produces the SQL for `question` without running it.
    pub async fn generate(
        &self,
        context: &AppContext,
        question: &str,
    ) -> Result<Answer, PipelineError> {
        let prompt = self.prompt(context, question);
        let raw_completion = self.client.complete(&prompt).await?;
        let sql = self.extractor.clean(&raw_completion);
        if !starts_with_statement_keyword(&sql) {
            return Err(PipelineError::ExtractionEmpty {
                raw: raw_completion,
            });
        }
        info!("Generated SQL: {sql}");
        Ok(Answer {
            question: question.to_owned(),
            prompt,
            raw_completion,
            sql,
            outcome: None,
        })
    }

    pub async fn ask(&self, context: &AppContext, question: &str) -> Result<Answer, PipelineError> {
        let mut answer = self.generate(context, question).await?;
        let outcome = execute(context.backend(), &answer.sql)
            .await
            .map_err(|err| match err.is_connection() {
                true => PipelineError::ConnectionFailure(err),
                false => PipelineError::ExecutionFailure {
                    sql: answer.sql.clone(),
                    message: err.to_string(),
                },
            })?;
        answer.outcome = Some(outcome);
        Ok(answer)
    }
}

pub fn escape_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace("\"", "\"\""))
}
