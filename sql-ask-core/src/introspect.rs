use std::fmt::Display;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    backend::{Backend, DbError},
    schema::{ColumnInfo, SchemaDocument, TableInfo},
};

/// A table left out of the document because its metadata could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedTable {
    pub table: String,
    pub reason: String,
}

impl Display for SkippedTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[table] {}: {}", self.table, self.reason)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    pub document: SchemaDocument,
    pub skipped: Vec<SkippedTable>,
}

async fn describe_table(
    backend: &dyn Backend,
    owner: &str,
    table: &str,
) -> Result<TableInfo, DbError> {
    let primary_key = backend.primary_key(owner, table).await?;
    let columns = backend.columns(owner, table).await?;
    if columns.is_empty() {
        // Dropped between listing and description.
        return Err(DbError::Query {
            message: "table has no columns or no longer exists".into(),
        });
    }
    let columns = columns
        .into_iter()
        .map(|column| ColumnInfo {
            is_primary_key: primary_key.contains(&column.name),
            name: column.name,
            data_type: column.data_type,
            nullable: column.nullable,
            default: column.default,
        })
        .collect();
    let foreign_keys = backend.foreign_keys(owner, table).await?;
    Ok(TableInfo {
        name: table.to_owned(),
        columns,
        primary_key,
        foreign_keys,
    })
}

/// Builds a schema document for `owner`.
///
/// Only the table listing itself can fail; a table whose metadata cannot be
/// read is reported in [`Extraction::skipped`] and extraction carries on.
pub async fn extract_schema(backend: &dyn Backend, owner: &str) -> Result<Extraction, DbError> {
    let tables = backend.list_tables(owner).await?;
    info!("Found {} tables in {owner}", tables.len());

    let mut extraction = Extraction::default();
    for table in tables {
        match describe_table(backend, owner, &table).await {
            Ok(info) => extraction.document.push_table(info),
            Err(err) => {
                warn!("Skipping table {table}: {err}");
                extraction.skipped.push(SkippedTable {
                    table,
                    reason: err.to_string(),
                });
            }
        }
    }
    Ok(extraction)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::*;
    use crate::{
        backend::{RawColumn, sqlite::tests::memory_backend},
        executor::ResultSet,
        schema::{ForeignKeyEdge, format_schema},
    };

    struct FlakyBackend {
        tables: Vec<&'static str>,
        broken: &'static str,
        columns: HashMap<&'static str, Vec<&'static str>>,
    }

    #[async_trait]
    impl Backend for FlakyBackend {
        fn name(&self) -> &str {
            "flaky"
        }

        fn default_owner(&self) -> &str {
            "main"
        }

        async fn ping(&self) -> Result<(), DbError> {
            Ok(())
        }

        async fn list_tables(&self, _owner: &str) -> Result<Vec<String>, DbError> {
            Ok(self.tables.iter().map(|t| t.to_string()).collect())
        }

        async fn columns(&self, _owner: &str, table: &str) -> Result<Vec<RawColumn>, DbError> {
            if table == self.broken {
                return Err(DbError::Query {
                    message: "permission denied".into(),
                });
            }
            Ok(self
                .columns
                .get(table)
                .into_iter()
                .flatten()
                .map(|name| RawColumn {
                    name: name.to_string(),
                    data_type: "TEXT".into(),
                    nullable: true,
                    default: None,
                })
                .collect())
        }

        async fn primary_key(&self, _owner: &str, _table: &str) -> Result<Vec<String>, DbError> {
            Ok(vec!["Id".into()])
        }

        async fn foreign_keys(
            &self,
            _owner: &str,
            _table: &str,
        ) -> Result<Vec<ForeignKeyEdge>, DbError> {
            Ok(vec![])
        }

        async fn fetch(&self, _sql: &str) -> Result<ResultSet, DbError> {
            Ok(ResultSet::default())
        }

        async fn execute(&self, _sql: &str) -> Result<u64, DbError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn failing_tables_are_skipped() {
        let backend = FlakyBackend {
            tables: vec!["Customer", "Secret", "Gone", "Employee"],
            broken: "Secret",
            columns: HashMap::from([
                ("Customer", vec!["Id", "CompanyName"]),
                ("Employee", vec!["Id", "LastName"]),
            ]),
        };
        let extraction = extract_schema(&backend, "main").await.unwrap();
        let names = extraction
            .document
            .tables()
            .iter()
            .map(|table| table.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["Customer", "Employee"]);
        let skipped = extraction
            .skipped
            .iter()
            .map(|skip| skip.table.as_str())
            .collect::<Vec<_>>();
        assert_eq!(skipped, vec!["Secret", "Gone"]);
        assert!(extraction.skipped[0].reason.contains("permission denied"));
        assert!(extraction.document.tables()[0].columns[0].is_primary_key);
        assert!(!extraction.document.tables()[0].columns[1].is_primary_key);
    }

    #[tokio::test]
    async fn extracts_sqlite_schema() {
        let backend = memory_backend().await;
        let extraction = extract_schema(&backend, "main").await.unwrap();
        assert!(extraction.skipped.is_empty());

        let document = &extraction.document;
        assert_eq!(document.tables().len(), 5);
        let order_item = document.table("OrderItem").unwrap();
        assert_eq!(order_item.primary_key, vec!["OrderId", "ProductId"]);
        assert!(order_item.column("OrderId").unwrap().is_primary_key);
        assert!(!order_item.column("Quantity").unwrap().is_primary_key);
        assert_eq!(order_item.foreign_keys.len(), 2);
        // OrderItem (2) + Product (1) + Shipment (1)
        assert_eq!(document.foreign_keys().len(), 4);

        let text = format_schema(document);
        for table in document.tables() {
            assert!(text.contains(&table.name));
            for column in &table.columns {
                assert!(text.contains(&column.name));
            }
        }
        assert!(text.contains("- UnitPrice: DECIMAL NOT NULL DEFAULT 0"));
        assert!(text.contains("- OrderId, ProductId → OrderItem(OrderId, ProductId)"));
    }
}
