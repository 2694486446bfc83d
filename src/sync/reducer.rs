//! Client-side projection of the task collection.
//!
//! The projection is updated only by inbound server events — never by direct
//! local mutation, with one deliberate exception: deletes are applied
//! optimistically. Rather than removing the record outright, the reducer
//! marks it *pending-delete* and hides it from the rendered view; the record
//! is dropped for real only on the confirming `task:deleted` broadcast or the
//! next full snapshot. A pending-delete id also blocks re-append, so a
//! confirmation that never arrives cannot resurrect the task.

use std::collections::HashSet;

use crate::board::{Status, Task};
use crate::protocol::ServerEvent;

/// `Unsynced` before the first `tasks:initial`, `Synced` after. A reconnect
/// resets to `Unsynced`; there is no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    #[default]
    Unsynced,
    Synced,
}

#[derive(Debug, Default)]
pub struct BoardProjection {
    /// Insertion-ordered task sequence, snapshot order first, then appends.
    tasks: Vec<Task>,
    /// Ids hidden by an optimistic local delete, awaiting confirmation.
    pending_deletes: HashSet<String>,
    state: SyncState,
}

impl BoardProjection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn is_synced(&self) -> bool {
        self.state == SyncState::Synced
    }

    /// The rendered view: every task not hidden by a pending delete.
    pub fn tasks(&self) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|t| !self.pending_deletes.contains(&t.id))
            .collect()
    }

    /// Tasks of one column, in insertion order.
    pub fn column(&self, status: Status) -> Vec<&Task> {
        self.tasks()
            .into_iter()
            .filter(|t| t.status == status)
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        if self.pending_deletes.contains(id) {
            return None;
        }
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Apply one inbound server event. Every rule is idempotent against
    /// receiving this client's own change back.
    pub fn apply(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::Initial(tasks) => {
                self.tasks = tasks.clone();
                self.pending_deletes.clear();
                self.state = SyncState::Synced;
            }
            ServerEvent::Created(task) => {
                if !self.tasks.iter().any(|t| t.id == task.id)
                    && !self.pending_deletes.contains(&task.id)
                {
                    self.tasks.push(task.clone());
                }
            }
            ServerEvent::Updated(task) | ServerEvent::Moved(task) => {
                // No-op when absent: the record lost a race with a delete.
                if let Some(slot) = self.tasks.iter_mut().find(|t| t.id == task.id) {
                    *slot = task.clone();
                }
            }
            ServerEvent::Deleted(task_ref) => {
                self.tasks.retain(|t| t.id != task_ref.task_id);
                self.pending_deletes.remove(&task_ref.task_id);
            }
        }
    }

    /// Optimistically hide a record the local client just asked to delete.
    /// Returns `false` when the id is unknown (nothing to hide).
    pub fn mark_pending_delete(&mut self, id: &str) -> bool {
        if !self.tasks.iter().any(|t| t.id == id) {
            return false;
        }
        self.pending_deletes.insert(id.to_string());
        true
    }

    /// Back to the connection-time state. Called on reconnect before the
    /// snapshot is re-requested.
    pub fn reset(&mut self) {
        self.tasks.clear();
        self.pending_deletes.clear();
        self.state = SyncState::Unsynced;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{Category, Priority, TaskDraft};
    use crate::protocol::TaskRef;
    use chrono::Utc;

    fn task(id: &str, status: Status) -> Task {
        Task {
            id: id.into(),
            title: format!("task {id}"),
            status,
            priority: Priority::Medium,
            category: Category::Feature,
            file_url: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn starts_unsynced_and_syncs_on_initial() {
        let mut board = BoardProjection::new();
        assert_eq!(board.state(), SyncState::Unsynced);
        board.apply(&ServerEvent::Initial(vec![task("a", Status::Todo)]));
        assert!(board.is_synced());
        assert_eq!(board.tasks().len(), 1);
    }

    #[test]
    fn created_is_idempotent_against_own_echo() {
        let mut board = BoardProjection::new();
        board.apply(&ServerEvent::Initial(vec![]));
        let t = task("a", Status::Todo);
        board.apply(&ServerEvent::Created(t.clone()));
        board.apply(&ServerEvent::Created(t));
        assert_eq!(board.tasks().len(), 1);
    }

    #[test]
    fn update_for_unknown_id_is_a_no_op() {
        let mut board = BoardProjection::new();
        board.apply(&ServerEvent::Initial(vec![]));
        board.apply(&ServerEvent::Updated(task("ghost", Status::Done)));
        assert!(board.tasks().is_empty());
    }

    #[test]
    fn moved_replaces_in_place_keeping_order() {
        let mut board = BoardProjection::new();
        board.apply(&ServerEvent::Initial(vec![
            task("a", Status::Todo),
            task("b", Status::Todo),
        ]));
        board.apply(&ServerEvent::Moved(task("a", Status::Done)));
        let ids: Vec<_> = board.tasks().iter().map(|t| t.id.clone()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(board.column(Status::Done).len(), 1);
    }

    #[test]
    fn deleted_twice_leaves_projection_unchanged_after_first() {
        let mut board = BoardProjection::new();
        board.apply(&ServerEvent::Initial(vec![task("a", Status::Todo)]));
        let deleted = ServerEvent::Deleted(TaskRef { task_id: "a".into() });
        board.apply(&deleted);
        assert!(board.tasks().is_empty());
        board.apply(&deleted);
        assert!(board.tasks().is_empty());
    }

    #[test]
    fn pending_delete_hides_immediately_and_clears_on_confirmation() {
        let mut board = BoardProjection::new();
        board.apply(&ServerEvent::Initial(vec![task("a", Status::Todo)]));
        assert!(board.mark_pending_delete("a"));
        assert!(board.tasks().is_empty());
        assert!(board.get("a").is_none());

        board.apply(&ServerEvent::Deleted(TaskRef { task_id: "a".into() }));
        assert!(board.tasks().is_empty());
        // The confirmation cleared the mark, so a fresh task may reuse the id.
        board.apply(&ServerEvent::Created(task("a", Status::Todo)));
        assert_eq!(board.tasks().len(), 1);
    }

    #[test]
    fn pending_delete_blocks_resurrection() {
        let mut board = BoardProjection::new();
        board.apply(&ServerEvent::Initial(vec![task("a", Status::Todo)]));
        board.mark_pending_delete("a");
        // A stale created broadcast for the same id must not bring it back.
        board.apply(&ServerEvent::Created(task("a", Status::Todo)));
        assert!(board.tasks().is_empty());
    }

    #[test]
    fn mark_pending_delete_of_unknown_id_reports_false() {
        let mut board = BoardProjection::new();
        board.apply(&ServerEvent::Initial(vec![]));
        assert!(!board.mark_pending_delete("ghost"));
    }

    #[test]
    fn snapshot_clears_pending_deletes() {
        let mut board = BoardProjection::new();
        board.apply(&ServerEvent::Initial(vec![task("a", Status::Todo)]));
        board.mark_pending_delete("a");
        // Full resync: the server still has the task (our delete failed), so
        // it reappears — the documented correction path.
        board.apply(&ServerEvent::Initial(vec![task("a", Status::Todo)]));
        assert_eq!(board.tasks().len(), 1);
    }

    #[test]
    fn reset_returns_to_unsynced() {
        let mut board = BoardProjection::new();
        board.apply(&ServerEvent::Initial(vec![task("a", Status::Todo)]));
        board.reset();
        assert_eq!(board.state(), SyncState::Unsynced);
        assert!(board.tasks().is_empty());
    }

    #[test]
    fn draft_defaults_match_create_scenario() {
        // Matches the create scenario: a draft with only title/priority set
        // lands in Todo with no attachment.
        let draft = TaskDraft::new("Write spec");
        assert_eq!(draft.status, Status::Todo);
        assert_eq!(draft.file_url, "");
    }
}
