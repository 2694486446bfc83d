use anyhow::{Context as _, Result};
use sqlx::{sqlite::SqliteConnectOptions, ConnectOptions, SqlitePool};
use std::{path::Path, str::FromStr};

/// Default timeout for individual SQLite queries.
/// Prevents hung queries from blocking the daemon indefinitely.
const QUERY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Execute a future with the standard query timeout.
/// Returns an error if the operation takes longer than `QUERY_TIMEOUT`.
async fn with_timeout<T>(fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(QUERY_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!(
            "database query timed out after {}s",
            QUERY_TIMEOUT.as_secs()
        )),
    }
}

/// Raw task row as persisted. Enum fields are stored as their wire strings
/// ("Todo", "In-Progress", ...); `created_at` is RFC 3339.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TaskRow {
    pub id: String,
    pub title: String,
    pub status: String,
    pub priority: String,
    pub category: String,
    pub file_url: String,
    pub created_at: String,
}

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        Self::new_with_slow_query(data_dir, 0).await
    }

    /// Create storage with slow-query logging enabled.
    ///
    /// `slow_query_ms` is the threshold in milliseconds — queries exceeding it
    /// are logged at WARN level. Set to 0 to disable slow-query logging.
    pub async fn new_with_slow_query(data_dir: &Path, slow_query_ms: u64) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir)
            .await
            .with_context(|| format!("failed to create data dir {}", data_dir.display()))?;
        let db_path = data_dir.join("boardd.db");
        let mut opts =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))?
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .create_if_missing(true);

        if slow_query_ms > 0 {
            opts = opts.log_slow_statements(
                log::LevelFilter::Warn,
                std::time::Duration::from_millis(slow_query_ms),
            );
        }

        let pool = SqlitePool::connect_with(opts)
            .await
            .context("failed to open task database")?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// Return a clone of the connection pool (cheap — Arc-backed).
    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    async fn migrate(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS tasks (
                 id         TEXT PRIMARY KEY,
                 title      TEXT NOT NULL,
                 status     TEXT NOT NULL,
                 priority   TEXT NOT NULL,
                 category   TEXT NOT NULL,
                 file_url   TEXT NOT NULL DEFAULT '',
                 created_at TEXT NOT NULL
             )",
        )
        .execute(pool)
        .await
        .context("failed to run database migration")?;
        Ok(())
    }

    // ─── Tasks ──────────────────────────────────────────────────────────────

    pub async fn insert_task(&self, row: &TaskRow) -> Result<()> {
        sqlx::query(
            "INSERT INTO tasks (id, title, status, priority, category, file_url, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&row.id)
        .bind(&row.title)
        .bind(&row.status)
        .bind(&row.priority)
        .bind(&row.category)
        .bind(&row.file_url)
        .bind(&row.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_task(&self, id: &str) -> Result<Option<TaskRow>> {
        Ok(sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Overwrite every mutable field of a task. `id` and `created_at` never
    /// change. Returns the updated row, or `None` if the id is absent
    /// (including when it was deleted between the caller's read and this write).
    pub async fn set_task_fields(
        &self,
        id: &str,
        title: &str,
        status: &str,
        priority: &str,
        category: &str,
        file_url: &str,
    ) -> Result<Option<TaskRow>> {
        let result = sqlx::query(
            "UPDATE tasks SET title = ?, status = ?, priority = ?, category = ?, file_url = ?
             WHERE id = ?",
        )
        .bind(title)
        .bind(status)
        .bind(priority)
        .bind(category)
        .bind(file_url)
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_task(id).await
    }

    /// Status-only update — the drag-and-drop hot path.
    pub async fn set_task_status(&self, id: &str, status: &str) -> Result<Option<TaskRow>> {
        let result = sqlx::query("UPDATE tasks SET status = ? WHERE id = ?")
            .bind(status)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_task(id).await
    }

    /// Returns `true` if a row was actually deleted.
    pub async fn delete_task(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Full snapshot in stable insertion order. The (created_at, id) ordering
    /// breaks ties deterministically when tasks share a timestamp.
    pub async fn list_tasks(&self) -> Result<Vec<TaskRow>> {
        with_timeout(async {
            Ok(
                sqlx::query_as("SELECT * FROM tasks ORDER BY created_at ASC, id ASC")
                    .fetch_all(&self.pool)
                    .await?,
            )
        })
        .await
    }

    pub async fn count_tasks(&self) -> Result<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tasks")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0 as u64)
    }
}
