//! Drag-reorder controller: translates a finished drag gesture into at most
//! one `task:move` intent. Purely a UI-to-intent translator — it holds no
//! state and is never authoritative.

use crate::board::Status;
use crate::protocol::{ClientEvent, MovePayload};

/// A completed drag gesture. `destination` is `None` when the card was
/// dropped outside any column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragDrop {
    pub task_id: String,
    pub source: Status,
    pub destination: Option<Status>,
}

/// Dropping outside a column or back into the source column yields no intent:
/// display order within a column is derived, not persisted, so a same-column
/// reorder has nothing to tell the server.
pub fn drop_to_intent(drop: &DragDrop) -> Option<ClientEvent> {
    let destination = drop.destination?;
    if destination == drop.source {
        return None;
    }
    Some(ClientEvent::Move(MovePayload {
        task_id: drop.task_id.clone(),
        new_status: destination,
    }))
}
