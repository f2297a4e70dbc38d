use std::{cmp, fmt};

use serde::{Deserialize, Serialize};

use crate::{
    backend::{Backend, DbError},
    cleaner::starts_with_statement_keyword,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatementKind {
    Read,
    Write,
}

impl StatementKind {
    /// A statement is a read when it begins with `SELECT`; everything else is
    /// executed as a write inside a transaction.
    pub fn classify(sql: &str) -> Self {
        let head = sql.trim_start();
        match head
            .get(..6)
            .is_some_and(|keyword| keyword.eq_ignore_ascii_case("select"))
        {
            true => StatementKind::Read,
            false => StatementKind::Write,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::Text(value) => write!(f, "{value}"),
            Value::Bytes(bytes) => {
                write!(f, "\\x")?;
                for byte in bytes {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Value::Json(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl fmt::Display for ResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cells = self
            .rows
            .iter()
            .map(|row| row.iter().map(Value::to_string).collect::<Vec<_>>())
            .collect::<Vec<_>>();
        let mut lengths = self
            .columns
            .iter()
            .map(|name| name.chars().count())
            .collect::<Vec<_>>();
        for row in &cells {
            for (length, cell) in lengths.iter_mut().zip(row) {
                *length = cmp::max(*length, cell.chars().count());
            }
        }
        let pad = |text: &str, len: usize| {
            format!("{text}{}", " ".repeat(len - text.chars().count()))
        };

        let header = self
            .columns
            .iter()
            .zip(&lengths)
            .map(|(name, &len)| pad(name, len))
            .collect::<Vec<_>>()
            .join("  |  ");
        writeln!(f, "{}", header.trim_end())?;
        let rule = lengths
            .iter()
            .map(|&len| "-".repeat(len))
            .collect::<Vec<_>>()
            .join("--+--");
        writeln!(f, "{rule}")?;
        for row in &cells {
            let line = row
                .iter()
                .zip(&lengths)
                .map(|(cell, &len)| pad(cell, len))
                .collect::<Vec<_>>()
                .join("  |  ");
            writeln!(f, "{}", line.trim_end())?;
        }
        write!(f, "({} rows)", self.rows.len())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum QueryOutcome {
    Rows(ResultSet),
    Affected { rows: u64 },
}

impl fmt::Display for QueryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryOutcome::Rows(result) => write!(f, "{result}"),
            QueryOutcome::Affected { rows } => {
                write!(f, "Statement executed successfully. Rows affected: {rows}")
            }
        }
    }
}

#[derive(Debug)]
pub enum ExecutionError {
    NotSql { text: String },
    Database(DbError),
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionError::NotSql { text } => {
                write!(f, "Refusing to execute text that is not a SQL statement: {text}")
            }
            ExecutionError::Database(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ExecutionError {}

impl From<DbError> for ExecutionError {
    fn from(value: DbError) -> Self {
        ExecutionError::Database(value)
    }
}

/// Runs a cleaned statement, dispatching on its kind.
pub async fn execute(backend: &dyn Backend, sql: &str) -> Result<QueryOutcome, DbError> {
    match StatementKind::classify(sql) {
        StatementKind::Read => Ok(QueryOutcome::Rows(backend.fetch(sql).await?)),
        StatementKind::Write => Ok(QueryOutcome::Affected {
            rows: backend.execute(sql).await?,
        }),
    }
}

/// Like [`execute`] but refuses anything that does not start with a
/// recognised statement keyword.
pub async fn execute_checked(
    backend: &dyn Backend,
    sql: &str,
) -> Result<QueryOutcome, ExecutionError> {
    if !starts_with_statement_keyword(sql) {
        return Err(ExecutionError::NotSql {
            text: sql.to_owned(),
        });
    }
    Ok(execute(backend, sql).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::sqlite::tests::memory_backend;

    #[test]
    fn classify_by_leading_select() {
        assert_eq!(StatementKind::classify("SELECT 1"), StatementKind::Read);
        assert_eq!(StatementKind::classify("  select *"), StatementKind::Read);
        assert_eq!(
            StatementKind::classify("UPDATE Product SET UnitPrice=10"),
            StatementKind::Write
        );
        assert_eq!(StatementKind::classify("SEL"), StatementKind::Write);
        assert_eq!(StatementKind::classify(""), StatementKind::Write);
    }

    #[test]
    fn result_set_renders_aligned() {
        let result = ResultSet {
            columns: vec!["Id".into(), "CompanyName".into()],
            rows: vec![
                vec![Value::Int(1), Value::Text("Alfreds".into())],
                vec![Value::Int(20), Value::Null],
            ],
        };
        let text = result.to_string();
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "Id  |  CompanyName");
        assert_eq!(lines[2], "1   |  Alfreds");
        assert_eq!(lines[3], "20  |  NULL");
        assert_eq!(lines[4], "(2 rows)");
    }

    #[tokio::test]
    async fn select_one_returns_single_cell() {
        let backend = memory_backend().await;
        let outcome = execute(&backend, "SELECT 1").await.unwrap();
        let QueryOutcome::Rows(result) = outcome else {
            panic!("expected rows, got {outcome:?}");
        };
        assert_eq!(result.columns.len(), 1);
        assert_eq!(result.rows, vec![vec![Value::Int(1)]]);
    }

    #[tokio::test]
    async fn write_reports_affected_rows() {
        let backend = memory_backend().await;
        let outcome = execute(&backend, "UPDATE Product SET UnitPrice = 10 WHERE CategoryId = 1")
            .await
            .unwrap();
        assert_eq!(outcome, QueryOutcome::Affected { rows: 3 });
    }

    #[tokio::test]
    async fn empty_select_keeps_column_names() {
        let backend = memory_backend().await;
        let outcome = execute(&backend, "SELECT Id, ProductName FROM Product WHERE 1 = 0")
            .await
            .unwrap();
        let QueryOutcome::Rows(result) = outcome else {
            panic!("expected rows, got {outcome:?}");
        };
        assert!(result.is_empty());
        assert_eq!(result.columns, vec!["Id", "ProductName"]);
    }

    #[tokio::test]
    async fn refuses_text_without_keyword() {
        let backend = memory_backend().await;
        let err = execute_checked(&backend, "I cannot help with that")
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::NotSql { .. }));
    }

    #[tokio::test]
    async fn failed_write_is_not_committed() {
        let backend = memory_backend().await;
        let err = execute(
            &backend,
            "INSERT INTO Category (Id, CategoryName) VALUES (3, 'Seafood'), (1, 'Beverages')",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, DbError::Query { .. }), "{err}");
        let outcome = execute(&backend, "SELECT COUNT(*) AS n FROM Category")
            .await
            .unwrap();
        let QueryOutcome::Rows(result) = outcome else {
            panic!("expected rows, got {outcome:?}");
        };
        assert_eq!(result.rows, vec![vec![Value::Int(2)]]);
    }
}
