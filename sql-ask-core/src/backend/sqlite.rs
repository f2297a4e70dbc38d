use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use sqlx::{
    Column, Executor, Row, Statement, TypeInfo, ValueRef,
    sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow},
};

use crate::{
    backend::{Backend, ConnectOptions, DbError, RawColumn, bounded},
    escape_ident,
    executor::{ResultSet, Value},
    schema::ForeignKeyEdge,
};

const MAIN: &str = "main";

const COLUMNS_QUERY: &str = r#"
SELECT name, type, "notnull", dflt_value
FROM pragma_table_info(?1, ?2)
ORDER BY cid"#;

const PRIMARY_KEY_QUERY: &str = r#"
SELECT name
FROM pragma_table_info(?1, ?2)
WHERE pk > 0
ORDER BY pk"#;

const FOREIGN_KEYS_QUERY: &str = r#"
SELECT id, "table", "from", "to"
FROM pragma_foreign_key_list(?1, ?2)
ORDER BY id, seq"#;

pub struct SqliteBackend {
    pool: SqlitePool,
    timeout: Duration,
}

impl SqliteBackend {
    pub async fn connect(url: &str, options: ConnectOptions) -> Result<Self, DbError> {
        let connect_options = SqliteConnectOptions::from_str(url)?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(options.timeout)
            .connect_with(connect_options)
            .await?;
        Ok(Self::from_pool(pool, options))
    }

    pub fn from_pool(pool: SqlitePool, options: ConnectOptions) -> Self {
        Self {
            pool,
            timeout: options.timeout,
        }
    }

    fn tables_query(owner: &str) -> String {
        let master = match owner {
            MAIN => "sqlite_master".to_owned(),
            owner => format!("{}.sqlite_master", escape_ident(owner)),
        };
        format!(
            "SELECT name FROM {master} WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name"
        )
    }
}

fn decode_cell(row: &SqliteRow, idx: usize) -> Result<Value, sqlx::Error> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    // The value's storage class, not the declared column type.
    let storage = raw.type_info().name().to_owned();
    Ok(match storage.as_str() {
        "INTEGER" => Value::Int(row.try_get(idx)?),
        "REAL" => Value::Float(row.try_get(idx)?),
        "BLOB" => Value::Bytes(row.try_get(idx)?),
        _ => Value::Text(row.try_get(idx)?),
    })
}

#[async_trait]
impl Backend for SqliteBackend {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn default_owner(&self) -> &str {
        MAIN
    }

    async fn ping(&self) -> Result<(), DbError> {
        let (one,): (i64,) = bounded(
            self.timeout,
            sqlx::query_as("SELECT 1").fetch_one(&self.pool),
        )
        .await?;
        match one {
            1 => Ok(()),
            other => Err(DbError::Connection {
                message: format!("unexpected ping result {other}"),
            }),
        }
    }

    async fn list_tables(&self, owner: &str) -> Result<Vec<String>, DbError> {
        let query = Self::tables_query(owner);
        let tables: Vec<(String,)> =
            bounded(self.timeout, sqlx::query_as(&query).fetch_all(&self.pool)).await?;
        Ok(tables.into_iter().map(|(name,)| name).collect())
    }

    async fn columns(&self, owner: &str, table: &str) -> Result<Vec<RawColumn>, DbError> {
        let rows: Vec<(String, String, i64, Option<String>)> = bounded(
            self.timeout,
            sqlx::query_as(COLUMNS_QUERY)
                .bind(table)
                .bind(owner)
                .fetch_all(&self.pool),
        )
        .await?;
        Ok(rows
            .into_iter()
            .map(|(name, data_type, not_null, default)| RawColumn {
                name,
                data_type,
                nullable: not_null == 0,
                default,
            })
            .collect())
    }

    async fn primary_key(&self, owner: &str, table: &str) -> Result<Vec<String>, DbError> {
        let rows: Vec<(String,)> = bounded(
            self.timeout,
            sqlx::query_as(PRIMARY_KEY_QUERY)
                .bind(table)
                .bind(owner)
                .fetch_all(&self.pool),
        )
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn foreign_keys(
        &self,
        owner: &str,
        table: &str,
    ) -> Result<Vec<ForeignKeyEdge>, DbError> {
        let rows: Vec<(i64, String, String, Option<String>)> = bounded(
            self.timeout,
            sqlx::query_as(FOREIGN_KEYS_QUERY)
                .bind(table)
                .bind(owner)
                .fetch_all(&self.pool),
        )
        .await?;

        // One row per column pair; rows sharing an id form one constraint.
        let mut constraints: Vec<(i64, ForeignKeyEdge, bool)> = vec![];
        for (id, target_table, from, to) in rows {
            let implicit_target = to.is_none();
            match constraints.last_mut() {
                Some((last_id, edge, implicit)) if *last_id == id => {
                    edge.source_columns.push(from);
                    edge.target_columns.extend(to);
                    *implicit |= implicit_target;
                }
                _ => constraints.push((
                    id,
                    ForeignKeyEdge {
                        source_table: table.to_owned(),
                        source_columns: vec![from],
                        target_table,
                        target_columns: to.into_iter().collect(),
                    },
                    implicit_target,
                )),
            }
        }

        let mut edges = Vec::with_capacity(constraints.len());
        for (_, mut edge, implicit) in constraints {
            // `REFERENCES t` without columns points at t's primary key.
            if implicit {
                edge.target_columns = self.primary_key(owner, &edge.target_table).await?;
            }
            edges.push(edge);
        }
        Ok(edges)
    }

    async fn fetch(&self, sql: &str) -> Result<ResultSet, DbError> {
        bounded(self.timeout, async {
            let statement = self.pool.prepare(sql).await?;
            let columns = statement
                .columns()
                .iter()
                .map(|column| column.name().to_owned())
                .collect::<Vec<_>>();
            let rows = statement.query().fetch_all(&self.pool).await?;
            let mut values = Vec::with_capacity(rows.len());
            for row in &rows {
                let mut cells = Vec::with_capacity(columns.len());
                for idx in 0..row.len() {
                    cells.push(decode_cell(row, idx)?);
                }
                values.push(cells);
            }
            Ok::<_, sqlx::Error>(ResultSet {
                columns,
                rows: values,
            })
        })
        .await
    }

    async fn execute(&self, sql: &str) -> Result<u64, DbError> {
        bounded(self.timeout, async {
            let mut tx = self.pool.begin().await?;
            let result = sqlx::query(sql).execute(&mut *tx).await?;
            tx.commit().await?;
            Ok::<_, sqlx::Error>(result.rows_affected())
        })
        .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    const NORTHWIND: &str = r#"
CREATE TABLE Category (
    Id INTEGER PRIMARY KEY,
    CategoryName VARCHAR(8000) NOT NULL
);
CREATE TABLE Product (
    Id INTEGER PRIMARY KEY,
    ProductName VARCHAR(8000),
    CategoryId INTEGER NOT NULL REFERENCES Category(Id),
    UnitPrice DECIMAL NOT NULL DEFAULT 0
);
CREATE TABLE "Order" (
    Id INTEGER PRIMARY KEY,
    OrderDate VARCHAR(8000)
);
CREATE TABLE OrderItem (
    OrderId INTEGER NOT NULL REFERENCES "Order",
    ProductId INTEGER NOT NULL,
    Quantity INTEGER NOT NULL DEFAULT 1,
    PRIMARY KEY (OrderId, ProductId),
    FOREIGN KEY (ProductId) REFERENCES Product(Id)
);
CREATE TABLE Shipment (
    OrderId INTEGER NOT NULL,
    ProductId INTEGER NOT NULL,
    FOREIGN KEY (OrderId, ProductId) REFERENCES OrderItem(OrderId, ProductId)
);
INSERT INTO Category (Id, CategoryName) VALUES (1, 'Beverages'), (2, 'Condiments');
INSERT INTO Product (Id, ProductName, CategoryId, UnitPrice) VALUES
    (1, 'Chai', 1, 18.0),
    (2, 'Chang', 1, 19.0),
    (3, 'Guaraná Fantástica', 1, 4.5),
    (4, 'Aniseed Syrup', 2, 10.0);
"#;

    pub(crate) async fn memory_backend() -> SqliteBackend {
        let options = ConnectOptions::default();
        let backend = SqliteBackend::connect("sqlite::memory:", options)
            .await
            .unwrap();
        sqlx::raw_sql(NORTHWIND).execute(&backend.pool).await.unwrap();
        backend
    }

    #[tokio::test]
    async fn lists_tables_by_name() {
        let backend = memory_backend().await;
        let tables = backend.list_tables(MAIN).await.unwrap();
        assert_eq!(
            tables,
            vec!["Category", "Order", "OrderItem", "Product", "Shipment"]
        );
    }

    #[tokio::test]
    async fn reads_column_metadata() {
        let backend = memory_backend().await;
        let columns = backend.columns(MAIN, "Product").await.unwrap();
        assert_eq!(columns.len(), 4);
        assert_eq!(columns[0].name, "Id");
        assert_eq!(columns[1].data_type, "VARCHAR(8000)");
        assert!(columns[1].nullable);
        assert!(!columns[2].nullable);
        assert_eq!(columns[3].default.as_deref(), Some("0"));
    }

    #[tokio::test]
    async fn composite_primary_key_keeps_order() {
        let backend = memory_backend().await;
        let pk = backend.primary_key(MAIN, "OrderItem").await.unwrap();
        assert_eq!(pk, vec!["OrderId", "ProductId"]);
    }

    #[tokio::test]
    async fn groups_composite_foreign_keys() {
        let backend = memory_backend().await;
        let edges = backend.foreign_keys(MAIN, "Shipment").await.unwrap();
        assert_eq!(
            edges,
            vec![ForeignKeyEdge {
                source_table: "Shipment".into(),
                source_columns: vec!["OrderId".into(), "ProductId".into()],
                target_table: "OrderItem".into(),
                target_columns: vec!["OrderId".into(), "ProductId".into()],
            }]
        );
    }

    #[tokio::test]
    async fn implicit_reference_resolves_to_primary_key() {
        let backend = memory_backend().await;
        let edges = backend.foreign_keys(MAIN, "OrderItem").await.unwrap();
        let order = edges
            .iter()
            .find(|edge| edge.target_table == "Order")
            .unwrap();
        assert_eq!(order.source_columns, vec!["OrderId"]);
        assert_eq!(order.target_columns, vec!["Id"]);
    }

    #[tokio::test]
    async fn fetch_decodes_storage_classes() {
        let backend = memory_backend().await;
        let result = backend
            .fetch("SELECT ProductName, UnitPrice, CategoryId, NULL AS missing FROM Product WHERE Id = 3")
            .await
            .unwrap();
        assert_eq!(
            result.rows,
            vec![vec![
                Value::Text("Guaraná Fantástica".into()),
                Value::Float(4.5),
                Value::Int(1),
                Value::Null,
            ]]
        );
    }

    #[tokio::test]
    async fn ping_succeeds() {
        memory_backend().await.ping().await.unwrap();
    }
}
