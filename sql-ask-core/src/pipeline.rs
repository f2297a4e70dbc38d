use std::{error::Error, fmt::Display, sync::Arc};

use serde::Serialize;
use tracing::info;

use crate::{
    backend::{Backend, DbError},
    executor::QueryOutcome,
    introspect::{Extraction, SkippedTable, extract_schema},
    llm::GenerationError,
    schema::SchemaDocument,
};

#[derive(Debug)]
pub enum PipelineError {
    ConnectionFailure(DbError),
    GenerationFailure(GenerationError),
    /// The completion contained no statement keyword.
    ExtractionEmpty { raw: String },
    ExecutionFailure { sql: String, message: String },
}

impl Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::ConnectionFailure(err) => write!(f, "{err}"),
            PipelineError::GenerationFailure(err) => write!(f, "SQL generation failed: {err}"),
            PipelineError::ExtractionEmpty { raw } => {
                write!(f, "No SQL statement found in model output:\n{raw}")
            }
            PipelineError::ExecutionFailure { sql, message } => {
                write!(f, "Error executing query: {message}\nSQL: {sql}")
            }
        }
    }
}

impl Error for PipelineError {}

impl From<GenerationError> for PipelineError {
    fn from(value: GenerationError) -> Self {
        PipelineError::GenerationFailure(value)
    }
}

impl From<DbError> for PipelineError {
    fn from(value: DbError) -> Self {
        PipelineError::ConnectionFailure(value)
    }
}

/// An extracted schema together with its prompt rendering.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchemaSnapshot {
    pub document: SchemaDocument,
    pub text: String,
    pub skipped: Vec<SkippedTable>,
}

impl From<Extraction> for SchemaSnapshot {
    fn from(value: Extraction) -> Self {
        Self {
            text: value.document.to_string(),
            document: value.document,
            skipped: value.skipped,
        }
    }
}

/// Database handle plus the schema snapshot questions are answered against.
pub struct AppContext {
    backend: Arc<dyn Backend>,
    owner: String,
    snapshot: Arc<SchemaSnapshot>,
}

impl AppContext {
    /// Extracts the schema of `owner`, or of the backend's default owner.
    pub async fn load(
        backend: Arc<dyn Backend>,
        owner: Option<String>,
    ) -> Result<Self, PipelineError> {
        let owner = owner.unwrap_or_else(|| backend.default_owner().to_owned());
        let extraction = extract_schema(backend.as_ref(), &owner).await?;
        let snapshot = Arc::new(SchemaSnapshot::from(extraction));
        Ok(Self {
            backend,
            owner,
            snapshot,
        })
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn snapshot(&self) -> Arc<SchemaSnapshot> {
        Arc::clone(&self.snapshot)
    }

    /// Re-extracts the schema and replaces the snapshot. On failure the
    /// previous snapshot stays in place.
    pub async fn refresh(&mut self) -> Result<Arc<SchemaSnapshot>, PipelineError> {
        let extraction = extract_schema(self.backend.as_ref(), &self.owner).await?;
        info!(
            "Schema refreshed: {} tables",
            extraction.document.tables().len()
        );
        self.snapshot = Arc::new(SchemaSnapshot::from(extraction));
        Ok(self.snapshot())
    }
}

/// Everything produced while answering one question.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub question: String,
    pub prompt: String,
    pub raw_completion: String,
    pub sql: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<QueryOutcome>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::sqlite::tests::memory_backend;

    #[tokio::test]
    async fn load_uses_default_owner() {
        let context = AppContext::load(Arc::new(memory_backend().await), None)
            .await
            .unwrap();
        assert_eq!(context.owner(), "main");
        let snapshot = context.snapshot();
        assert_eq!(snapshot.document.tables().len(), 5);
        assert!(snapshot.text.starts_with("### Category Tablosu"));
    }

    #[tokio::test]
    async fn refresh_swaps_snapshot() {
        let mut context = AppContext::load(Arc::new(memory_backend().await), None)
            .await
            .unwrap();
        let before = context.snapshot();
        context
            .backend()
            .execute("CREATE TABLE Region (Id INTEGER PRIMARY KEY, Name TEXT)")
            .await
            .unwrap();
        let after = context.refresh().await.unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert!(before.document.table("Region").is_none());
        assert!(after.document.table("Region").is_some());
        assert!(after.text.contains("### Region Tablosu"));
    }

    #[test]
    fn error_messages() {
        let err = PipelineError::ExecutionFailure {
            sql: "SELECT * FROM Nope".into(),
            message: "no such table: Nope".into(),
        };
        assert_eq!(
            err.to_string(),
            "Error executing query: no such table: Nope\nSQL: SELECT * FROM Nope"
        );
        let err = PipelineError::ExtractionEmpty {
            raw: "I cannot help".into(),
        };
        assert!(err.to_string().ends_with("I cannot help"));
    }
}
