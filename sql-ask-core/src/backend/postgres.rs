use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::{
    Column, Executor, Row, Statement, TypeInfo, ValueRef,
    postgres::{PgPool, PgPoolOptions, PgRow, PgValueFormat},
    types::{BigDecimal, Uuid},
};
use tracing::debug;

use crate::{
    backend::{Backend, ConnectOptions, DbError, RawColumn, bounded},
    executor::{ResultSet, Value},
    schema::ForeignKeyEdge,
};

const PUBLIC: &str = "public";

const TABLES_QUERY: &str = r#"
SELECT table_name::text
FROM information_schema.tables
WHERE table_schema = $1 AND table_type = 'BASE TABLE'
ORDER BY table_name"#;

// format_type keeps array element types, lengths and enum names.
const COLUMNS_QUERY: &str = r#"
SELECT att.attname::text, format_type(att.atttypid, att.atttypmod), NOT att.attnotnull,
    pg_get_expr(def.adbin, def.adrelid)
FROM pg_attribute att
JOIN pg_class cls ON cls.oid = att.attrelid
JOIN pg_namespace nsp ON nsp.oid = cls.relnamespace
LEFT JOIN pg_attrdef def ON def.adrelid = att.attrelid AND def.adnum = att.attnum
WHERE nsp.nspname = $1 AND cls.relname = $2 AND att.attnum > 0 AND NOT att.attisdropped
ORDER BY att.attnum"#;

const PRIMARY_KEY_QUERY: &str = r#"
SELECT kcu.column_name::text
FROM information_schema.table_constraints tc
JOIN information_schema.key_column_usage kcu
    ON tc.constraint_name = kcu.constraint_name
    AND tc.table_schema = kcu.table_schema
    AND tc.table_name = kcu.table_name
WHERE tc.constraint_type = 'PRIMARY KEY'
    AND tc.table_schema = $1
    AND tc.table_name = $2
ORDER BY kcu.ordinal_position"#;

const FOREIGN_KEYS_QUERY: &str = r#"
SELECT con.conname::text, ref_cls.relname::text, att.attname::text, ref_att.attname::text
FROM pg_constraint con
JOIN pg_class cls ON cls.oid = con.conrelid
JOIN pg_namespace nsp ON nsp.oid = cls.relnamespace
JOIN pg_class ref_cls ON ref_cls.oid = con.confrelid
CROSS JOIN LATERAL unnest(con.conkey, con.confkey) WITH ORDINALITY AS k(attnum, ref_attnum, ord)
JOIN pg_attribute att ON att.attrelid = con.conrelid AND att.attnum = k.attnum
JOIN pg_attribute ref_att ON ref_att.attrelid = con.confrelid AND ref_att.attnum = k.ref_attnum
WHERE con.contype = 'f' AND nsp.nspname = $1 AND cls.relname = $2
ORDER BY con.conname, k.ord"#;

pub struct PostgresBackend {
    pool: PgPool,
    timeout: Duration,
}

impl PostgresBackend {
    pub async fn connect(url: &str, options: ConnectOptions) -> Result<Self, DbError> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(options.timeout)
            .connect(url)
            .await?;
        Ok(Self {
            pool,
            timeout: options.timeout,
        })
    }
}

/// The server's own text rendering of a cell.
///
/// Rows fetched through the simple query protocol arrive in text format, so
/// this covers every type without a dedicated arm (intervals, network
/// addresses, enums, ranges...).
fn text_cell(row: &PgRow, idx: usize) -> Result<Value, sqlx::Error> {
    let raw = row.try_get_raw(idx)?;
    match raw.format() {
        PgValueFormat::Text => Ok(Value::Text(
            raw.as_str().map_err(sqlx::Error::Decode)?.to_owned(),
        )),
        PgValueFormat::Binary => Err(sqlx::Error::Decode(
            format!("no decoder for binary column type {}", raw.type_info().name()).into(),
        )),
    }
}

fn json_array<T: serde::Serialize>(items: Vec<T>) -> Result<Value, sqlx::Error> {
    serde_json::to_value(items)
        .map(Value::Json)
        .map_err(|err| sqlx::Error::Decode(err.into()))
}

fn decode_cell(row: &PgRow, idx: usize) -> Result<Value, sqlx::Error> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_owned();
    Ok(match type_name.as_str() {
        "BOOL" => Value::Bool(row.try_get(idx)?),
        "INT2" => Value::Int(row.try_get::<i16, _>(idx)?.into()),
        "INT4" => Value::Int(row.try_get::<i32, _>(idx)?.into()),
        "INT8" => Value::Int(row.try_get(idx)?),
        "FLOAT4" => Value::Float(row.try_get::<f32, _>(idx)?.into()),
        "FLOAT8" => Value::Float(row.try_get(idx)?),
        "NUMERIC" => Value::Text(row.try_get::<BigDecimal, _>(idx)?.to_string()),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" => Value::Text(row.try_get(idx)?),
        "UUID" => Value::Text(row.try_get::<Uuid, _>(idx)?.to_string()),
        "DATE" => Value::Text(row.try_get::<NaiveDate, _>(idx)?.to_string()),
        "TIME" => Value::Text(row.try_get::<NaiveTime, _>(idx)?.to_string()),
        "TIMESTAMP" => Value::Text(row.try_get::<NaiveDateTime, _>(idx)?.to_string()),
        "TIMESTAMPTZ" => Value::Text(row.try_get::<DateTime<Utc>, _>(idx)?.to_rfc3339()),
        "JSON" | "JSONB" => Value::Json(row.try_get(idx)?),
        "BYTEA" => Value::Bytes(row.try_get(idx)?),
        "BOOL[]" => json_array(row.try_get::<Vec<Option<bool>>, _>(idx)?)?,
        "INT2[]" => json_array(row.try_get::<Vec<Option<i16>>, _>(idx)?)?,
        "INT4[]" => json_array(row.try_get::<Vec<Option<i32>>, _>(idx)?)?,
        "INT8[]" => json_array(row.try_get::<Vec<Option<i64>>, _>(idx)?)?,
        "FLOAT8[]" => json_array(row.try_get::<Vec<Option<f64>>, _>(idx)?)?,
        "TEXT[]" | "VARCHAR[]" => json_array(row.try_get::<Vec<Option<String>>, _>(idx)?)?,
        "UUID[]" => json_array(
            row.try_get::<Vec<Option<Uuid>>, _>(idx)?
                .into_iter()
                .map(|id| id.map(|id| id.to_string()))
                .collect(),
        )?,
        "INTERVAL" | "INET" | "CIDR" | "MACADDR" | "MONEY" => text_cell(row, idx)?,
        other => {
            debug!("No typed decoder for column type {other}, using its text form");
            text_cell(row, idx)?
        }
    })
}

#[async_trait]
impl Backend for PostgresBackend {
    fn name(&self) -> &str {
        "postgres"
    }

    fn default_owner(&self) -> &str {
        PUBLIC
    }

    async fn ping(&self) -> Result<(), DbError> {
        let (one,): (i32,) = bounded(
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
        let tables: Vec<(String,)> = bounded(
            self.timeout,
            sqlx::query_as(TABLES_QUERY).bind(owner).fetch_all(&self.pool),
        )
        .await?;
        Ok(tables.into_iter().map(|(name,)| name).collect())
    }

    async fn columns(&self, owner: &str, table: &str) -> Result<Vec<RawColumn>, DbError> {
        let rows: Vec<(String, String, bool, Option<String>)> = bounded(
            self.timeout,
            sqlx::query_as(COLUMNS_QUERY)
                .bind(owner)
                .bind(table)
                .fetch_all(&self.pool),
        )
        .await?;
        Ok(rows
            .into_iter()
            .map(|(name, data_type, nullable, default)| RawColumn {
                name,
                data_type,
                nullable,
                default,
            })
            .collect())
    }

    async fn primary_key(&self, owner: &str, table: &str) -> Result<Vec<String>, DbError> {
        let rows: Vec<(String,)> = bounded(
            self.timeout,
            sqlx::query_as(PRIMARY_KEY_QUERY)
                .bind(owner)
                .bind(table)
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
        let rows: Vec<(String, String, String, String)> = bounded(
            self.timeout,
            sqlx::query_as(FOREIGN_KEYS_QUERY)
                .bind(owner)
                .bind(table)
                .fetch_all(&self.pool),
        )
        .await?;
        let mut edges: Vec<(String, ForeignKeyEdge)> = vec![];
        for (constraint, target_table, from, to) in rows {
            match edges.last_mut() {
                Some((name, edge)) if *name == constraint => {
                    edge.source_columns.push(from);
                    edge.target_columns.push(to);
                }
                _ => edges.push((
                    constraint,
                    ForeignKeyEdge {
                        source_table: table.to_owned(),
                        source_columns: vec![from],
                        target_table,
                        target_columns: vec![to],
                    },
                )),
            }
        }
        Ok(edges.into_iter().map(|(_, edge)| edge).collect())
    }

    async fn fetch(&self, sql: &str) -> Result<ResultSet, DbError> {
        bounded(self.timeout, async {
            // Preparing rejects multi-statement text and yields column names
            // even when no row comes back.
            let statement = self.pool.prepare(sql).await?;
            let columns = statement
                .columns()
                .iter()
                .map(|column| column.name().to_owned())
                .collect::<Vec<_>>();
            // Without bind arguments the rows come back in text format.
            let rows = sqlx::raw_sql(sql).fetch_all(&self.pool).await?;
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
