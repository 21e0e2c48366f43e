use async_trait::async_trait;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};
use thiserror::Error;
use tracing::debug;

use crate::DbPool;

/// Upper bound on rows returned by a single query.
pub const MAX_ROWS: usize = 500;

#[derive(Debug, Error)]
pub enum PassthroughError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub primary_key: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

/// Rows of one query, cut off at [`MAX_ROWS`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryRows {
    pub rows: Vec<Map<String, Value>>,
    pub truncated: bool,
}

/// Read-only access to the reporting database.
#[async_trait]
pub trait QueryPassthrough: Send + Sync {
    async fn schema(&self) -> Result<Vec<TableSchema>, PassthroughError>;
    async fn execute(&self, sql: &str) -> Result<QueryRows, PassthroughError>;
}

pub struct SqlQueryPassthrough {
    pool: DbPool,
}

impl SqlQueryPassthrough {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueryPassthrough for SqlQueryPassthrough {
    async fn schema(&self) -> Result<Vec<TableSchema>, PassthroughError> {
        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut schema = Vec::with_capacity(tables.len());
        for (table,) in tables {
            let rows = sqlx::query(
                "SELECT name, type, \"notnull\", pk FROM pragma_table_info(?) ORDER BY cid",
            )
            .bind(&table)
            .fetch_all(&self.pool)
            .await?;

            let columns = rows.iter().map(row_to_column).collect::<Result<Vec<_>, _>>()?;
            schema.push(TableSchema { name: table, columns });
        }

        Ok(schema)
    }

    async fn execute(&self, sql: &str) -> Result<QueryRows, PassthroughError> {
        let mut stream = sqlx::query(sql).fetch(&self.pool);
        let mut result = QueryRows::default();
        while let Some(row) = stream.try_next().await? {
            if result.rows.len() == MAX_ROWS {
                result.truncated = true;
                break;
            }
            result.rows.push(row_to_json(&row)?);
        }
        debug!(
            event_name = "db.passthrough.executed",
            row_count = result.rows.len(),
            truncated = result.truncated,
            "passthrough query executed"
        );
        Ok(result)
    }
}

fn row_to_column(row: &SqliteRow) -> Result<ColumnSchema, PassthroughError> {
    let name: String = row.try_get("name").map_err(|e| PassthroughError::Decode(e.to_string()))?;
    let data_type: String =
        row.try_get("type").map_err(|e| PassthroughError::Decode(e.to_string()))?;
    let not_null: i64 =
        row.try_get("notnull").map_err(|e| PassthroughError::Decode(e.to_string()))?;
    let primary_key: i64 = row.try_get("pk").map_err(|e| PassthroughError::Decode(e.to_string()))?;
    Ok(ColumnSchema { name, data_type, nullable: not_null == 0, primary_key: primary_key > 0 })
}

fn row_to_json(row: &SqliteRow) -> Result<Map<String, Value>, PassthroughError> {
    let mut object = Map::new();
    for column in row.columns() {
        let index = column.ordinal();
        let raw = row.try_get_raw(index).map_err(|e| PassthroughError::Decode(e.to_string()))?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let storage = raw.type_info().name().to_ascii_uppercase();
            match storage.as_str() {
                "INTEGER" | "BOOLEAN" => Value::from(
                    row.try_get::<i64, _>(index).map_err(|e| PassthroughError::Decode(e.to_string()))?,
                ),
                "REAL" => Value::from(
                    row.try_get::<f64, _>(index).map_err(|e| PassthroughError::Decode(e.to_string()))?,
                ),
                "BLOB" => {
                    let bytes = row
                        .try_get::<Vec<u8>, _>(index)
                        .map_err(|e| PassthroughError::Decode(e.to_string()))?;
                    Value::String(format!("<{} bytes>", bytes.len()))
                }
                _ => Value::String(
                    row.try_get::<String, _>(index)
                        .map_err(|e| PassthroughError::Decode(e.to_string()))?,
                ),
            }
        };
        object.insert(column.name().to_string(), value);
    }
    Ok(object)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{QueryPassthrough, SqlQueryPassthrough, MAX_ROWS};
    use crate::{connect_with_settings, DbPool};

    async fn setup() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        sqlx::query(
            "CREATE TABLE time_entries (
                id INTEGER PRIMARY KEY,
                project_name TEXT NOT NULL,
                entry_date TEXT NOT NULL,
                hours REAL NOT NULL,
                note TEXT
            )",
        )
        .execute(&pool)
        .await
        .expect("create table");
        sqlx::query(
            "INSERT INTO time_entries (project_name, entry_date, hours, note) VALUES
                ('Website', '2025-04-16', 4.0, NULL),
                ('Website', '2025-04-17', 2.5, 'review')",
        )
        .execute(&pool)
        .await
        .expect("seed rows");
        pool
    }

    #[tokio::test]
    async fn schema_lists_tables_with_columns() {
        let passthrough = SqlQueryPassthrough::new(setup().await);

        let schema = passthrough.schema().await.expect("schema");

        assert_eq!(schema.len(), 1);
        assert_eq!(schema[0].name, "time_entries");
        let names: Vec<_> = schema[0].columns.iter().map(|column| column.name.as_str()).collect();
        assert_eq!(names, vec!["id", "project_name", "entry_date", "hours", "note"]);
        assert!(schema[0].columns[0].primary_key);
        assert!(!schema[0].columns[1].nullable);
        assert!(schema[0].columns[4].nullable);
    }

    #[tokio::test]
    async fn execute_returns_rows_as_json_objects() {
        let passthrough = SqlQueryPassthrough::new(setup().await);

        let rows = passthrough
            .execute("SELECT id, project_name, hours, note FROM time_entries ORDER BY id")
            .await
            .expect("query");

        assert!(!rows.truncated);
        let rows = rows.rows;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("id"), Some(&json!(1)));
        assert_eq!(rows[0].get("project_name"), Some(&json!("Website")));
        assert_eq!(rows[0].get("hours"), Some(&json!(4.0)));
        assert_eq!(rows[0].get("note"), Some(&json!(null)));
        assert_eq!(rows[1].get("note"), Some(&json!("review")));
    }

    #[tokio::test]
    async fn aggregate_queries_are_supported() {
        let passthrough = SqlQueryPassthrough::new(setup().await);

        let rows = passthrough
            .execute("SELECT SUM(hours) AS total FROM time_entries")
            .await
            .expect("query");

        assert_eq!(rows.rows[0].get("total"), Some(&json!(6.5)));
    }

    #[tokio::test]
    async fn large_results_stop_at_the_row_cap() {
        let passthrough = SqlQueryPassthrough::new(setup().await);

        let result = passthrough
            .execute(
                "WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < 2000) \
                 SELECT i FROM n",
            )
            .await
            .expect("query");

        assert!(result.truncated);
        assert_eq!(result.rows.len(), MAX_ROWS);
        assert_eq!(result.rows[MAX_ROWS - 1].get("i"), Some(&json!(MAX_ROWS)));
    }

    #[tokio::test]
    async fn invalid_sql_is_a_database_error() {
        let passthrough = SqlQueryPassthrough::new(setup().await);

        let result = passthrough.execute("SELECT * FROM missing_table").await;

        assert!(matches!(result, Err(super::PassthroughError::Database(_))));
    }
}
