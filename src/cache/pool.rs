// src/cache/pool.rs
// Async connection pool wrapper over deadpool-sqlite, down to the one
// pattern this crate needs: `run`, which hands a sync closure a
// `&Connection` on the blocking pool and converts its error into
// `GridError`.

use std::path::{Path, PathBuf};

use deadpool_sqlite::{Config, Pool, Runtime};
use rusqlite::Connection;

use crate::error::GridError;

/// Retry delays for SQLite contention backoff: per-table serialisation
/// is acceptable and expected during a populate.
const RETRY_DELAYS: [std::time::Duration; 3] = [
    std::time::Duration::from_millis(100),
    std::time::Duration::from_millis(500),
    std::time::Duration::from_millis(2000),
];

fn is_contention(err: &rusqlite::Error) -> bool {
    use rusqlite::ffi;
    matches!(
        err,
        rusqlite::Error::SqliteFailure(
            ffi::Error {
                code: ffi::ErrorCode::DatabaseBusy | ffi::ErrorCode::DatabaseLocked,
                ..
            },
            _,
        )
    )
}

pub struct DbPool {
    pool: Pool,
    #[allow(dead_code)]
    path: Option<PathBuf>,
}

impl DbPool {
    pub async fn open(path: &Path) -> Result<Self, GridError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(GridError::from)?;
            }
        }
        let conn_str = path.to_string_lossy().to_string();
        Self::open_internal(&conn_str, Some(path.to_path_buf())).await
    }

    /// Shared-cache in-memory database, keeping multiple pooled
    /// connections on the same state for tests.
    pub async fn open_in_memory() -> Result<Self, GridError> {
        let uri = format!("file:gridcache_{}?mode=memory&cache=shared", uuid::Uuid::new_v4());
        Self::open_internal(&uri, None).await
    }

    async fn open_internal(conn_str: &str, path: Option<PathBuf>) -> Result<Self, GridError> {
        let cfg = Config::new(conn_str);
        let pool = cfg
            .builder(Runtime::Tokio1)
            .map_err(|e| GridError::Pool(e.to_string()))?
            .max_size(8)
            .build()
            .map_err(|e| GridError::Pool(e.to_string()))?;

        let db_pool = Self { pool, path };
        db_pool
            .run(|conn| crate::cache::schema::run_all_migrations(conn).map_err(GridError::from))
            .await?;
        Ok(db_pool)
    }

    /// Run a closure on a pooled connection on the blocking thread pool.
    pub async fn run<F, R>(&self, f: F) -> Result<R, GridError>
    where
        F: FnOnce(&Connection) -> Result<R, GridError> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self.pool.get().await.map_err(GridError::from)?;
        conn.interact(move |conn| f(conn))
            .await
            .map_err(GridError::from)?
    }

    /// Like [`run`](Self::run) but retries on SQLite contention, for the
    /// populate/write-through race between a table clear and a mutation.
    pub async fn run_with_retry<F, R>(&self, f: F) -> Result<R, GridError>
    where
        F: FnOnce(&Connection) -> Result<R, GridError> + Send + Clone + 'static,
        R: Send + 'static,
    {
        for delay in RETRY_DELAYS {
            match self.run(f.clone()).await {
                Ok(v) => return Ok(v),
                Err(GridError::Db(ref e)) if is_contention(e) => {
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
        self.run(f).await
    }
}
