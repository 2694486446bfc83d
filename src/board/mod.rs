pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The fixed ordered set of columns a task can sit in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Status {
    #[default]
    Todo,
    #[serde(rename = "In-Progress")]
    InProgress,
    Done,
}

impl Status {
    /// All columns in display order.
    pub const ALL: [Status; 3] = [Status::Todo, Status::InProgress, Status::Done];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Todo => "Todo",
            Status::InProgress => "In-Progress",
            Status::Done => "Done",
        }
    }
}

impl std::str::FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Todo" => Ok(Status::Todo),
            "In-Progress" => Ok(Status::InProgress),
            "Done" => Ok(Status::Done),
            other => Err(format!("unknown status {other:?}")),
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Low" => Ok(Priority::Low),
            "Medium" => Ok(Priority::Medium),
            "High" => Ok(Priority::High),
            other => Err(format!("unknown priority {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Category {
    Bug,
    #[default]
    Feature,
    Enhancement,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Bug => "Bug",
            Category::Feature => "Feature",
            Category::Enhancement => "Enhancement",
        }
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Bug" => Ok(Category::Bug),
            "Feature" => Ok(Category::Feature),
            "Enhancement" => Ok(Category::Enhancement),
            other => Err(format!("unknown category {other:?}")),
        }
    }
}

/// A task record — the sole entity of the board.
///
/// `id` and `createdAt` are server-assigned and immutable for the task's
/// lifetime. An empty `fileUrl` means "no attachment".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub title: String,
    pub status: Status,
    pub priority: Priority,
    pub category: Category,
    #[serde(default)]
    pub file_url: String,
    pub created_at: DateTime<Utc>,
}

/// Client-submitted partial task for `task:create`. Title is required;
/// everything else is defaulted server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub file_url: String,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            status: Status::default(),
            priority: Priority::default(),
            category: Category::default(),
            file_url: String::new(),
        }
    }
}

/// Field-level merge for `task:update`. Absent fields are left untouched;
/// `id`, `createdAt`, and `status` can never change through a patch
/// (status moves only through `task:move`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    pub title: Option<String>,
    pub priority: Option<Priority>,
    pub category: Option<Category>,
    pub file_url: Option<String>,
}

impl TaskPatch {
    /// Build the patch a full-record `task:update` intent implies.
    pub fn from_task(task: &Task) -> Self {
        Self {
            title: Some(task.title.clone()),
            priority: Some(task.priority),
            category: Some(task.category),
            file_url: Some(task.file_url.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.priority.is_none()
            && self.category.is_none()
            && self.file_url.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_wire_names() {
        for status in Status::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            let back: Status = serde_json::from_str(&json).unwrap();
            assert_eq!(back, status);
        }
        assert_eq!(serde_json::to_string(&Status::InProgress).unwrap(), "\"In-Progress\"");
    }

    #[test]
    fn draft_defaults_apply() {
        let draft: TaskDraft = serde_json::from_str(r#"{"title":"Write spec"}"#).unwrap();
        assert_eq!(draft.status, Status::Todo);
        assert_eq!(draft.priority, Priority::Medium);
        assert_eq!(draft.category, Category::Feature);
        assert_eq!(draft.file_url, "");
    }

    #[test]
    fn task_serializes_camel_case() {
        let task = Task {
            id: "t1".into(),
            title: "Write spec".into(),
            status: Status::Todo,
            priority: Priority::High,
            category: Category::Feature,
            file_url: String::new(),
            created_at: Utc::now(),
        };
        let v = serde_json::to_value(&task).unwrap();
        assert!(v.get("fileUrl").is_some());
        assert!(v.get("createdAt").is_some());
        assert!(v.get("file_url").is_none());
    }
}
