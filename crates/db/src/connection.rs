use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;

pub type DbPool = sqlx::SqlitePool;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, DEFAULT_MAX_CONNECTIONS, DEFAULT_TIMEOUT_SECS).await
}

pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    pool_options(max_connections, timeout_secs).connect(database_url).await
}

/// Every connection to `sqlite::memory:` opens its own database, so the pool holds
/// exactly one and never recycles it.
pub async fn connect_in_memory() -> Result<DbPool, sqlx::Error> {
    pool_options(1, DEFAULT_TIMEOUT_SECS)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
}

fn pool_options(max_connections: u32, timeout_secs: u64) -> SqlitePoolOptions {
    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                // negotiation.product_id must reference a stored product
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
}

#[cfg(test)]
mod tests {
    use super::connect_in_memory;

    #[tokio::test]
    async fn in_memory_pool_keeps_one_database() {
        let pool = connect_in_memory().await.expect("connect");
        sqlx::query("CREATE TABLE scratch (id INTEGER)").execute(&pool).await.expect("create");
        sqlx::query("INSERT INTO scratch VALUES (1)").execute(&pool).await.expect("insert");

        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM scratch").fetch_one(&pool).await.expect("count");
        assert_eq!(count, 1);

        let (foreign_keys,): (i64,) =
            sqlx::query_as("PRAGMA foreign_keys").fetch_one(&pool).await.expect("pragma");
        assert_eq!(foreign_keys, 1);
    }
}
