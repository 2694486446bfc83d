//! Authoritative task store — the single source of truth for the board.
//!
//! Wraps [`Storage`] with the domain contract: create assigns `id` and
//! `createdAt`; update/move/delete report a missing id as a non-fatal no-op
//! (`Ok(None)` / `Ok(false)`) so the caller can suppress the broadcast
//! without tearing anything down.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::storage::{Storage, TaskRow};

use super::{Category, Priority, Status, Task, TaskDraft, TaskPatch};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("task title must not be empty")]
    InvalidTitle,
    #[error("persistence error: {0}")]
    Persistence(#[from] anyhow::Error),
}

pub struct TaskStore {
    storage: Arc<Storage>,
}

impl TaskStore {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    /// Persist a new task. The server assigns `id` and `createdAt`; every
    /// other field comes from the draft, defaulted where unspecified.
    pub async fn create(&self, draft: TaskDraft) -> Result<Task, StoreError> {
        validate_title(&draft.title)?;
        let task = Task {
            id: Uuid::new_v4().to_string(),
            title: draft.title.trim().to_string(),
            status: draft.status,
            priority: draft.priority,
            category: draft.category,
            file_url: draft.file_url,
            created_at: Utc::now(),
        };
        self.storage.insert_task(&to_row(&task)).await?;
        debug!(id = %task.id, title = %task.title, "task created");
        Ok(task)
    }

    /// Merge `patch` into the existing record. `id` and `createdAt` never
    /// change; status moves only through [`TaskStore::move_task`].
    /// Returns `Ok(None)` when the id does not exist.
    pub async fn update(&self, id: &str, patch: TaskPatch) -> Result<Option<Task>, StoreError> {
        if let Some(title) = &patch.title {
            validate_title(title)?;
        }
        let Some(existing) = self.storage.get_task(id).await? else {
            return Ok(None);
        };
        let mut task = from_row(&existing)?;
        if let Some(title) = patch.title {
            task.title = title.trim().to_string();
        }
        if let Some(priority) = patch.priority {
            task.priority = priority;
        }
        if let Some(category) = patch.category {
            task.category = category;
        }
        if let Some(file_url) = patch.file_url {
            task.file_url = file_url;
        }
        let updated = self
            .storage
            .set_task_fields(
                id,
                &task.title,
                task.status.as_str(),
                task.priority.as_str(),
                task.category.as_str(),
                &task.file_url,
            )
            .await?;
        updated.as_ref().map(from_row).transpose().map_err(Into::into)
    }

    /// Status-only convenience form of update — the most frequent mutation
    /// (drag-and-drop), kept separate so it is independently observable.
    pub async fn move_task(&self, id: &str, new_status: Status) -> Result<Option<Task>, StoreError> {
        let moved = self.storage.set_task_status(id, new_status.as_str()).await?;
        moved.as_ref().map(from_row).transpose().map_err(Into::into)
    }

    /// Returns `false` when the id was already gone.
    pub async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.storage.delete_task(id).await?)
    }

    /// Full snapshot, used only at connection time (`tasks:initial`).
    pub async fn list(&self) -> Result<Vec<Task>, StoreError> {
        let rows = self.storage.list_tasks().await?;
        rows.iter()
            .map(from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    pub async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.storage.count_tasks().await?)
    }
}

fn validate_title(title: &str) -> Result<(), StoreError> {
    if title.trim().is_empty() {
        return Err(StoreError::InvalidTitle);
    }
    Ok(())
}

fn to_row(task: &Task) -> TaskRow {
    TaskRow {
        id: task.id.clone(),
        title: task.title.clone(),
        status: task.status.as_str().to_string(),
        priority: task.priority.as_str().to_string(),
        category: task.category.as_str().to_string(),
        file_url: task.file_url.clone(),
        created_at: task.created_at.to_rfc3339(),
    }
}

fn from_row(row: &TaskRow) -> Result<Task, anyhow::Error> {
    let created_at = DateTime::parse_from_rfc3339(&row.created_at)
        .map_err(|e| anyhow::anyhow!("bad created_at for task {}: {e}", row.id))?
        .with_timezone(&Utc);
    Ok(Task {
        id: row.id.clone(),
        title: row.title.clone(),
        status: Status::from_str(&row.status).map_err(|e| anyhow::anyhow!(e))?,
        priority: Priority::from_str(&row.priority).map_err(|e| anyhow::anyhow!(e))?,
        category: Category::from_str(&row.category).map_err(|e| anyhow::anyhow!(e))?,
        file_url: row.file_url.clone(),
        created_at,
    })
}
