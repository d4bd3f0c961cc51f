//! SQLite schema and the small key-value tables that carry engine-wide
//! bookkeeping, mirroring the reference resolver's `queries`/`ftl`/`counters`
//! tables in `database.c` table for table.

use crate::error::EngineError;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Connection, Executor, Sqlite, SqliteConnection};
use std::str::FromStr;

pub const CURRENT_SCHEMA_VERSION: i64 = 2;

pub const FTL_KEY_VERSION: i64 = 0;
pub const FTL_KEY_LAST_TIMESTAMP: i64 = 1;
#[allow(dead_code)]
pub const FTL_KEY_FIRST_COUNTER_TIMESTAMP: i64 = 2;

pub const COUNTER_KEY_TOTAL: i64 = 0;
pub const COUNTER_KEY_BLOCKED: i64 = 1;

pub(crate) fn sqlx_err(e: sqlx::Error) -> EngineError {
    EngineError::StoreUnavailable(e.to_string())
}

/// Opens (creating if absent) the store at `path`. One connection per flush
/// cycle; the handle is closed at the end of the cycle rather than held open
/// for the life of the process.
pub async fn open(path: &str) -> Result<SqliteConnection, EngineError> {
    let opts = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))
        .map_err(sqlx_err)?
        .create_if_missing(true);
    SqliteConnection::connect_with(&opts).await.map_err(sqlx_err)
}

/// Creates the schema if missing and migrates version 1 stores forward.
/// Version numbers older than 1 are rejected outright — there is no
/// migration path that old (spec.md §4.H).
pub async fn ensure_schema(conn: &mut SqliteConnection) -> Result<(), EngineError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS queries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp INTEGER NOT NULL,
            type INTEGER NOT NULL,
            status INTEGER NOT NULL,
            domain TEXT NOT NULL,
            client TEXT NOT NULL,
            upstream TEXT
        )",
    )
    .await
    .map_err(sqlx_err)?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_queries_timestamp ON queries(timestamp)")
        .await
        .map_err(sqlx_err)?;
    conn.execute("CREATE TABLE IF NOT EXISTS ftl (id INTEGER PRIMARY KEY, value INTEGER NOT NULL)")
        .await
        .map_err(sqlx_err)?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS counters (id INTEGER PRIMARY KEY, value INTEGER NOT NULL)",
    )
    .await
    .map_err(sqlx_err)?;

    match get_property(&mut *conn, FTL_KEY_VERSION).await? {
        None => {
            set_property(&mut *conn, FTL_KEY_VERSION, CURRENT_SCHEMA_VERSION).await?;
            set_counter(&mut *conn, COUNTER_KEY_TOTAL, 0).await?;
            set_counter(&mut *conn, COUNTER_KEY_BLOCKED, 0).await?;
        }
        Some(v) if v < 1 => {
            return Err(EngineError::SchemaIncompatible { found: v, minimum: 1 });
        }
        Some(1) => {
            if get_counter(&mut *conn, COUNTER_KEY_TOTAL).await?.is_none() {
                set_counter(&mut *conn, COUNTER_KEY_TOTAL, 0).await?;
            }
            if get_counter(&mut *conn, COUNTER_KEY_BLOCKED).await?.is_none() {
                set_counter(&mut *conn, COUNTER_KEY_BLOCKED, 0).await?;
            }
            set_property(&mut *conn, FTL_KEY_VERSION, CURRENT_SCHEMA_VERSION).await?;
            tracing::info!("migrated store schema from version 1 to 2");
        }
        Some(_) => {}
    }
    Ok(())
}

pub async fn get_property<'e, E>(executor: E, key: i64) -> Result<Option<i64>, EngineError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row: Option<(i64,)> = sqlx::query_as("SELECT value FROM ftl WHERE id = ?")
        .bind(key)
        .fetch_optional(executor)
        .await
        .map_err(sqlx_err)?;
    Ok(row.map(|(v,)| v))
}

pub async fn set_property<'e, E>(executor: E, key: i64, value: i64) -> Result<(), EngineError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO ftl (id, value) VALUES (?, ?) ON CONFLICT(id) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(executor)
    .await
    .map_err(sqlx_err)?;
    Ok(())
}

pub async fn get_counter<'e, E>(executor: E, key: i64) -> Result<Option<i64>, EngineError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row: Option<(i64,)> = sqlx::query_as("SELECT value FROM counters WHERE id = ?")
        .bind(key)
        .fetch_optional(executor)
        .await
        .map_err(sqlx_err)?;
    Ok(row.map(|(v,)| v))
}

pub async fn set_counter<'e, E>(executor: E, key: i64, value: i64) -> Result<(), EngineError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO counters (id, value) VALUES (?, ?) ON CONFLICT(id) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(executor)
    .await
    .map_err(sqlx_err)?;
    Ok(())
}

pub async fn add_counter<'e, E>(executor: E, key: i64, delta: i64) -> Result<(), EngineError>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("UPDATE counters SET value = value + ? WHERE id = ?")
        .bind(delta)
        .bind(key)
        .execute(executor)
        .await
        .map_err(sqlx_err)?;
    Ok(())
}

pub async fn prune_older_than<'e, E>(executor: E, cutoff: i64) -> Result<u64, EngineError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM queries WHERE timestamp <= ?")
        .bind(cutoff)
        .execute(executor)
        .await
        .map_err(sqlx_err)?;
    Ok(result.rows_affected())
}

/// One row read back from the `queries` table during bootstrap.
pub struct StoredQuery {
    pub db_id: i64,
    pub timestamp: i64,
    pub qtype: i64,
    pub status: i64,
    pub domain: String,
    pub client: String,
    pub upstream: Option<String>,
}

pub async fn load_since<'e, E>(executor: E, since: i64) -> Result<Vec<StoredQuery>, EngineError>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows: Vec<(i64, i64, i64, i64, String, String, Option<String>)> = sqlx::query_as(
        "SELECT id, timestamp, type, status, domain, client, upstream \
         FROM queries WHERE timestamp >= ? ORDER BY timestamp ASC",
    )
    .bind(since)
    .fetch_all(executor)
    .await
    .map_err(sqlx_err)?;
    Ok(rows
        .into_iter()
        .map(|(db_id, timestamp, qtype, status, domain, client, upstream)| StoredQuery {
            db_id,
            timestamp,
            qtype,
            status,
            domain,
            client,
            upstream,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_conn() -> SqliteConnection {
        SqliteConnection::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn fresh_store_stamps_current_version() {
        let mut conn = memory_conn().await;
        ensure_schema(&mut conn).await.unwrap();
        let version = get_property(&mut conn, FTL_KEY_VERSION).await.unwrap();
        assert_eq!(version, Some(CURRENT_SCHEMA_VERSION));
        assert_eq!(get_counter(&mut conn, COUNTER_KEY_TOTAL).await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn version_one_migrates_to_current() {
        let mut conn = memory_conn().await;
        conn.execute("CREATE TABLE ftl (id INTEGER PRIMARY KEY, value INTEGER NOT NULL)")
            .await
            .unwrap();
        conn.execute("INSERT INTO ftl (id, value) VALUES (0, 1)").await.unwrap();
        ensure_schema(&mut conn).await.unwrap();
        let version = get_property(&mut conn, FTL_KEY_VERSION).await.unwrap();
        assert_eq!(version, Some(CURRENT_SCHEMA_VERSION));
    }

    #[tokio::test]
    async fn version_older_than_one_is_rejected() {
        let mut conn = memory_conn().await;
        conn.execute("CREATE TABLE ftl (id INTEGER PRIMARY KEY, value INTEGER NOT NULL)")
            .await
            .unwrap();
        conn.execute("INSERT INTO ftl (id, value) VALUES (0, 0)").await.unwrap();
        let err = ensure_schema(&mut conn).await.unwrap_err();
        assert!(matches!(err, EngineError::SchemaIncompatible { found: 0, minimum: 1 }));
    }

    #[tokio::test]
    async fn add_counter_accumulates() {
        let mut conn = memory_conn().await;
        ensure_schema(&mut conn).await.unwrap();
        add_counter(&mut conn, COUNTER_KEY_TOTAL, 5).await.unwrap();
        add_counter(&mut conn, COUNTER_KEY_TOTAL, 3).await.unwrap();
        assert_eq!(get_counter(&mut conn, COUNTER_KEY_TOTAL).await.unwrap(), Some(8));
    }
}
