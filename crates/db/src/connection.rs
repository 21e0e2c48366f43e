use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

pub type DbPool = sqlx::SqlitePool;

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, 2, 30).await
}

pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?.busy_timeout(Duration::from_secs(5));
    pool_options(max_connections, timeout_secs).connect_with(options).await
}

/// Opens the database so that every statement on the pool is rejected by
/// SQLite if it tries to write.
pub async fn connect_read_only(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .read_only(true)
        .busy_timeout(Duration::from_secs(5));
    pool_options(max_connections, timeout_secs)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA query_only = ON").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect_with(options)
        .await
}

fn pool_options(max_connections: u32, timeout_secs: u64) -> SqlitePoolOptions {
    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::{connect_read_only, connect_with_settings};

    #[tokio::test]
    async fn read_only_pool_rejects_writes() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("reporting.db");
        let url = format!("sqlite://{}?mode=rwc", path.display());

        let writable = connect_with_settings(&url, 1, 5).await.expect("writable connect");
        sqlx::query("CREATE TABLE projects (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
            .execute(&writable)
            .await
            .expect("create table");
        writable.close().await;

        let read_only = connect_read_only(&format!("sqlite://{}", path.display()), 1, 5)
            .await
            .expect("read-only connect");
        let insert = sqlx::query("INSERT INTO projects (name) VALUES ('Website')")
            .execute(&read_only)
            .await;
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM projects")
            .fetch_one(&read_only)
            .await
            .expect("read should still work");

        assert!(insert.is_err());
        assert_eq!(count.0, 0);
    }
}
