//! Embedded database lifecycle service.
//!
//! Owns the open/close lifecycle of a file-backed SQLite database and hands
//! out cloneable [`DatabaseHandle`]s to code that needs to run queries. The
//! service itself carries no query logic; it only guards the start/stop
//! state machine:
//!
//! - `start` opens (creating if absent) the database and fails when one is
//!   already open.
//! - `stop` is idempotent; stopping a service that never started is a no-op.
//! - `handle` returns the live handle or [`DbError::NotStarted`].

use crate::error::{DbError, DbResult};
use serde_json::{json, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// File name of the database inside the managed directory.
const DB_FILE_NAME: &str = "app.db";

/// Cloneable handle to a started embedded database.
#[derive(Clone, Debug)]
pub struct DatabaseHandle {
    pool: SqlitePool,
}

impl DatabaseHandle {
    fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Execute a SELECT statement and return rows as JSON maps.
    pub async fn query(
        &self,
        sql: &str,
        params: &[Value],
    ) -> DbResult<Vec<serde_json::Map<String, Value>>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_param(query, param);
        }

        let rows = query.fetch_all(&self.pool).await?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row_to_json(&row));
        }
        Ok(result)
    }

    /// Execute an INSERT/UPDATE/DELETE statement and return affected rows.
    pub async fn execute(&self, sql: &str, params: &[Value]) -> DbResult<u64> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_param(query, param);
        }

        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

fn bind_param<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    param: &Value,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    match param {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(f) = n.as_f64() {
                query.bind(f)
            } else {
                query.bind(n.to_string())
            }
        }
        Value::String(s) => query.bind(s.clone()),
        Value::Array(_) | Value::Object(_) => query.bind(param.to_string()),
    }
}

fn row_to_json(row: &SqliteRow) -> serde_json::Map<String, Value> {
    let mut map = serde_json::Map::new();

    for (i, column) in row.columns().iter().enumerate() {
        let name = column.name().to_string();

        // SQLite is dynamically typed; declared column types are unreliable
        // for expressions and aggregates, so probe the runtime type.
        let value = if let Ok(v) = row.try_get::<i64, _>(i) {
            json!(v)
        } else if let Ok(v) = row.try_get::<f64, _>(i) {
            json!(v)
        } else if let Ok(v) = row.try_get::<String, _>(i) {
            json!(v)
        } else if let Ok(v) = row.try_get::<bool, _>(i) {
            json!(v)
        } else {
            Value::Null
        };

        map.insert(name, value);
    }

    map
}

struct Started {
    handle: DatabaseHandle,
    db_file: PathBuf,
}

/// Start/stop manager for the embedded database.
///
/// Injected as an `Arc<DatabaseService>` wherever database access is needed;
/// there is deliberately no process-global instance.
pub struct DatabaseService {
    state: Mutex<Option<Started>>,
}

impl DatabaseService {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(None),
        }
    }

    /// Open the database stored under `dir`, creating directory and database
    /// file if absent. Fails with [`DbError::AlreadyStarted`] if a database
    /// is already open.
    pub async fn start(&self, dir: &Path) -> DbResult<DatabaseHandle> {
        let mut state = self.state.lock().await;
        if state.is_some() {
            return Err(DbError::AlreadyStarted);
        }

        std::fs::create_dir_all(dir)?;
        let db_file = dir.join(DB_FILE_NAME);

        let options = SqliteConnectOptions::new()
            .filename(&db_file)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        // Test connection before declaring the database started.
        sqlx::query("SELECT 1").execute(&pool).await?;

        info!("database opened at {:?}", db_file);
        let handle = DatabaseHandle::new(pool);
        *state = Some(Started {
            handle: handle.clone(),
            db_file,
        });
        Ok(handle)
    }

    /// Close the database. Calling `stop` when not started is a no-op.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        match state.take() {
            Some(started) => {
                started.handle.close().await;
                info!("database closed at {:?}", started.db_file);
            }
            None => debug!("database stop requested but nothing is open"),
        }
    }

    /// The live handle, or [`DbError::NotStarted`].
    pub async fn handle(&self) -> DbResult<DatabaseHandle> {
        let state = self.state.lock().await;
        state
            .as_ref()
            .map(|started| started.handle.clone())
            .ok_or(DbError::NotStarted)
    }

    pub async fn is_started(&self) -> bool {
        self.state.lock().await.is_some()
    }
}

impl Default for DatabaseService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_start_creates_database() {
        let dir = TempDir::new().unwrap();
        let service = DatabaseService::new();

        let handle = service.start(dir.path()).await.unwrap();
        assert!(dir.path().join(DB_FILE_NAME).exists());
        assert!(service.is_started().await);

        let rows = handle.query("SELECT 1 AS one", &[]).await.unwrap();
        assert_eq!(rows[0]["one"], json!(1));

        service.stop().await;
    }

    #[tokio::test]
    async fn test_double_start_fails() {
        let dir = TempDir::new().unwrap();
        let service = DatabaseService::new();

        service.start(dir.path()).await.unwrap();
        let err = service.start(dir.path()).await.unwrap_err();
        assert!(matches!(err, DbError::AlreadyStarted));

        service.stop().await;
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let service = DatabaseService::new();

        // Never started: both calls are no-ops.
        service.stop().await;
        service.stop().await;

        let dir = TempDir::new().unwrap();
        service.start(dir.path()).await.unwrap();
        service.stop().await;
        service.stop().await;
        assert!(!service.is_started().await);
    }

    #[tokio::test]
    async fn test_restart_after_stop() {
        let dir = TempDir::new().unwrap();
        let service = DatabaseService::new();

        service.start(dir.path()).await.unwrap();
        service.stop().await;
        service.start(dir.path()).await.unwrap();
        assert!(service.is_started().await);
        service.stop().await;
    }

    #[tokio::test]
    async fn test_handle_requires_started() {
        let service = DatabaseService::new();
        assert!(matches!(
            service.handle().await.unwrap_err(),
            DbError::NotStarted
        ));
    }

    #[tokio::test]
    async fn test_execute_and_query_round_trip() {
        let dir = TempDir::new().unwrap();
        let service = DatabaseService::new();
        let handle = service.start(dir.path()).await.unwrap();

        handle
            .execute("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)", &[])
            .await
            .unwrap();
        let affected = handle
            .execute(
                "INSERT INTO notes (body) VALUES (?)",
                &[json!("hello from test")],
            )
            .await
            .unwrap();
        assert_eq!(affected, 1);

        let rows = handle
            .query("SELECT body FROM notes WHERE id = ?", &[json!(1)])
            .await
            .unwrap();
        assert_eq!(rows[0]["body"], json!("hello from test"));

        service.stop().await;
    }
}
