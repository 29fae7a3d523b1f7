// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use deadpool_sqlite::{Config, Hook, Pool, Runtime};
use rusqlite::Connection;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Retry delays for SQLite contention backoff (100ms, 500ms, 2s), per §10.
const RETRY_DELAYS: [std::time::Duration; 3] = [
    std::time::Duration::from_millis(100),
    std::time::Duration::from_millis(500),
    std::time::Duration::from_millis(2000),
];

fn is_rusqlite_contention(err: &rusqlite::Error) -> bool {
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

fn is_sqlite_contention(err: &anyhow::Error) -> bool {
    err.downcast_ref::<rusqlite::Error>()
        .map(is_rusqlite_contention)
        .unwrap_or(false)
}

/// Retry `op` with the backoff schedule in [`RETRY_DELAYS`] while `is_retryable`
/// returns true for the returned error; the final attempt is never retried.
async fn retry_with_backoff<F, Fut, R>(
    mut op: F,
    is_retryable: impl Fn(&anyhow::Error) -> bool,
) -> Result<R>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<R>>,
{
    for (attempt, delay) in RETRY_DELAYS.iter().enumerate() {
        match op().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if is_retryable(&e) {
                    tracing::warn!(
                        attempt = attempt + 1,
                        of = RETRY_DELAYS.len(),
                        ?delay,
                        "sqlite contention, retrying"
                    );
                    tokio::time::sleep(*delay).await;
                } else {
                    return Err(e);
                }
            }
        }
    }
    op().await
}

/// Pooled handle to the `messages.db` SQLite database (§4.1, §6.3).
///
/// All access goes through [`StorePool::interact`] / [`StorePool::interact_with_retry`],
/// which run the closure on the pool's blocking thread so the async runtime
/// is never blocked on a synchronous database call (§5).
pub struct StorePool {
    pool: Pool,
    path: Option<PathBuf>,
}

impl StorePool {
    /// Open a pooled database at the given path, creating parent directories
    /// and running schema migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        ensure_parent_directory(path)?;
        let conn_str = path.to_string_lossy().to_string();
        let hook = make_file_post_create_hook(path.to_path_buf());

        let cfg = Config::new(&conn_str);
        let pool = cfg
            .builder(Runtime::Tokio1)
            .context("failed to create pool builder")?
            .max_size(8)
            .post_create(hook)
            .build()
            .context("failed to build connection pool")?;

        let store = Self {
            pool,
            path: Some(path.to_path_buf()),
        };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Open an in-memory database (shared cache, for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let uri = format!("file:nanoclaw_memdb_{}?mode=memory&cache=shared", uuid::Uuid::new_v4());
        let hook = make_memory_post_create_hook();
        let cfg = Config::new(&uri);
        let pool = cfg
            .builder(Runtime::Tokio1)
            .context("failed to create pool builder")?
            .max_size(8)
            .post_create(hook)
            .build()
            .context("failed to build connection pool")?;

        let store = Self { pool, path: None };
        store.run_migrations().await?;
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run a closure with a pooled connection on the blocking thread pool.
    pub async fn interact<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self.pool.get().await.context("failed to get connection from pool")?;
        conn.interact(move |conn| f(conn))
            .await
            .map_err(|e| anyhow::anyhow!("interact failed: {e}"))?
    }

    /// Like [`interact`](Self::interact), retried on `SQLITE_BUSY`/`SQLITE_LOCKED`.
    /// Use for writes that must not be silently dropped under contention.
    pub async fn interact_with_retry<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R> + Send + Clone + 'static,
        R: Send + 'static,
    {
        retry_with_backoff(
            || {
                let f_clone = f.clone();
                self.interact(f_clone)
            },
            is_sqlite_contention,
        )
        .await
    }

    async fn run_migrations(&self) -> Result<()> {
        self.interact(|conn| {
            crate::schema::run_all_migrations(conn)?;
            Ok(())
        })
        .await
    }
}

fn ensure_parent_directory(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn make_file_post_create_hook(path: PathBuf) -> Hook {
    Hook::async_fn(move |conn, _metrics| {
        let path_for_perms = path.clone();
        Box::pin(async move {
            conn.interact(move |conn| {
                setup_connection(conn)?;
                #[cfg(unix)]
                if let Ok(metadata) = std::fs::metadata(&path_for_perms) {
                    let mut perms = metadata.permissions();
                    perms.set_mode(0o600);
                    let _ = std::fs::set_permissions(&path_for_perms, perms);
                }
                Ok::<_, rusqlite::Error>(())
            })
            .await
            .map_err(|e| deadpool_sqlite::HookError::Message(format!("interact failed: {e}").into()))?
            .map_err(|e| deadpool_sqlite::HookError::Message(format!("connection setup failed: {e}").into()))
        })
    })
}

fn make_memory_post_create_hook() -> Hook {
    Hook::async_fn(|conn, _metrics| {
        Box::pin(async move {
            conn.interact(|conn| {
                conn.execute_batch("PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;")?;
                Ok::<_, rusqlite::Error>(())
            })
            .await
            .map_err(|e| deadpool_sqlite::HookError::Message(format!("interact failed: {e}").into()))?
            .map_err(|e| deadpool_sqlite::HookError::Message(format!("connection setup failed: {e}").into()))
        })
    })
}

/// WAL journaling, foreign keys, a 5-second busy timeout, and NORMAL
/// synchronous mode (safe with WAL, avoids an fsync per write). Matches §4.1.
fn setup_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL; \
         PRAGMA foreign_keys=ON; \
         PRAGMA busy_timeout=5000; \
         PRAGMA synchronous=NORMAL;",
    )
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_in_memory_runs_migrations() {
        let store = StorePool::open_in_memory().await.unwrap();
        let version: i64 = store
            .interact(|conn| Ok(conn.query_row("SELECT version FROM schema_meta", [], |r| r.get(0))?))
            .await
            .unwrap();
        assert!(version >= 1);
    }

    #[tokio::test]
    async fn open_file_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/messages.db");
        let store = StorePool::open(&path).await.unwrap();
        assert!(path.exists());
        assert_eq!(store.path(), Some(path.as_path()));
    }
}
