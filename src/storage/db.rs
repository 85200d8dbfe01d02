use async_trait::async_trait;
use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};

use super::migrations::run_migrations;
use super::{CorrelationStore, PendingRequest};
use crate::core::error::{AppError, AppResult};
use crate::download::mode::DownloadMode;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Create a new database connection pool
///
/// Initializes a connection pool with up to 10 connections and brings the
/// schema up to date before returning.
///
/// # Arguments
///
/// * `database_path` - Path to SQLite database file
///
/// # Example
///
/// ```no_run
/// use clipdrop::storage::db;
///
/// let pool = db::create_pool("clipdrop.sqlite")?;
/// # Ok::<(), clipdrop::core::AppError>(())
/// ```
pub fn create_pool(database_path: &str) -> AppResult<DbPool> {
    let manager = SqliteConnectionManager::file(database_path)
        .with_init(|c| c.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;"));
    let pool = Pool::builder()
        .max_size(10) // Maximum 10 connections in the pool
        .build(manager)?;

    let mut conn = pool.get()?;
    run_migrations(&mut conn)?;

    Ok(pool)
}

/// Get a connection from the pool
///
/// The connection is returned to the pool when dropped.
pub fn get_connection(pool: &DbPool) -> AppResult<DbConnection> {
    Ok(pool.get()?)
}

/// Correlation store backed by a SQLite file.
///
/// Survives restarts and can be shared by several processes pointing at the
/// same file, which is what webhook deployments need.
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Opens (or creates) the database at `path` and migrates it.
    pub fn open(path: &str) -> AppResult<Self> {
        Ok(Self::new(create_pool(path)?))
    }

    /// Runs `f` on a pooled connection in the blocking thread pool.
    ///
    /// rusqlite calls block (up to the busy timeout), so they stay off the
    /// async worker threads.
    async fn with_connection<T, F>(&self, f: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&DbConnection) -> AppResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = get_connection(&pool)?;
            f(&conn)
        })
        .await
        .map_err(|e| AppError::Io(std::io::Error::other(format!("database task failed: {}", e))))?
    }
}

fn row_to_request(token: &str, row: &rusqlite::Row<'_>) -> rusqlite::Result<(PendingRequest, Option<String>)> {
    let url: String = row.get(0)?;
    let mode: Option<String> = row.get(1)?;
    let chat_id: i64 = row.get(2)?;
    let origin_message_id: i32 = row.get(3)?;
    let created_at_ms: i64 = row.get(4)?;

    let request = PendingRequest {
        token: token.to_string(),
        url,
        mode: None,
        created_at: DateTime::from_timestamp_millis(created_at_ms).unwrap_or(DateTime::<Utc>::MIN_UTC),
        chat_id,
        origin_message_id,
    };
    Ok((request, mode))
}

#[async_trait]
impl CorrelationStore for SqliteStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn insert(&self, request: &PendingRequest) -> AppResult<bool> {
        let request = request.clone();
        self.with_connection(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO pending_requests (token, url, mode, chat_id, origin_message_id, created_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    request.token,
                    request.url,
                    request.mode.map(|m| m.as_str()),
                    request.chat_id,
                    request.origin_message_id,
                    request.created_at.timestamp_millis(),
                ],
            )?;
            if inserted > 0 {
                log::debug!("Stored pending request {} -> {}", request.token, request.url);
            }
            Ok(inserted > 0)
        })
        .await
    }

    async fn take(&self, token: &str) -> AppResult<Option<PendingRequest>> {
        let token = token.to_string();
        self.with_connection(move |conn| {
            // Single statement, so two concurrent presses cannot both get the row.
            let found = conn
                .query_row(
                    "DELETE FROM pending_requests WHERE token = ?1
                     RETURNING url, mode, chat_id, origin_message_id, created_at_ms",
                    params![token],
                    |row| row_to_request(&token, row),
                )
                .optional()?;

            match found {
                Some((mut request, mode)) => {
                    if let Some(code) = mode {
                        request.mode = Some(
                            DownloadMode::parse(&code)
                                .ok_or_else(|| AppError::Validation(format!("unknown stored mode: {}", code)))?,
                        );
                    }
                    Ok(Some(request))
                }
                None => Ok(None),
            }
        })
        .await
    }

    async fn remove_created_before(&self, cutoff: DateTime<Utc>) -> AppResult<usize> {
        let cutoff_ms = cutoff.timestamp_millis();
        self.with_connection(move |conn| {
            let removed = conn.execute(
                "DELETE FROM pending_requests WHERE created_at_ms < ?1",
                params![cutoff_ms],
            )?;
            Ok(removed)
        })
        .await
    }

    async fn len(&self) -> AppResult<usize> {
        self.with_connection(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM pending_requests", [], |row| row.get(0))?;
            Ok(count.max(0) as usize)
        })
        .await
    }
}
