//! The named-event wire vocabulary exchanged between server and clients.
//!
//! Every frame is one JSON text message of the form
//! `{"event": "<name>", "data": <payload>}` (`data` omitted when the event
//! carries none). Each client→server intent, if and only if the store
//! operation succeeds, produces exactly one server→all broadcast; on failure
//! nothing is emitted and the failure is only server-logged.

use serde::{Deserialize, Serialize};

use crate::board::{Status, Task, TaskDraft};

/// Client→server intent events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    /// Request the full snapshot. Sent by every client on connect;
    /// the server replies directly with `tasks:initial`, not a broadcast.
    #[serde(rename = "task:load")]
    Load,
    #[serde(rename = "task:create")]
    Create(TaskDraft),
    #[serde(rename = "task:move")]
    Move(MovePayload),
    /// Full-record field update; status is ignored here (moves go through
    /// `task:move`).
    #[serde(rename = "task:update")]
    Update(Task),
    #[serde(rename = "task:delete")]
    Delete(TaskRef),
}

/// Server→client events. All but `tasks:initial` are broadcast to every
/// connected client, including the originator of the intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "tasks:initial")]
    Initial(Vec<Task>),
    #[serde(rename = "task:created")]
    Created(Task),
    #[serde(rename = "task:moved")]
    Moved(Task),
    #[serde(rename = "task:updated")]
    Updated(Task),
    #[serde(rename = "task:deleted")]
    Deleted(TaskRef),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovePayload {
    pub task_id: String,
    pub new_status: Status,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRef {
    pub task_id: String,
}

impl ClientEvent {
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

impl ServerEvent {
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// The wire name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Initial(_) => "tasks:initial",
            ServerEvent::Created(_) => "task:created",
            ServerEvent::Moved(_) => "task:moved",
            ServerEvent::Updated(_) => "task:updated",
            ServerEvent::Deleted(_) => "task:deleted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Priority;

    #[test]
    fn create_intent_decodes_from_wire_shape() {
        let frame = r#"{"event":"task:create","data":{"title":"Write spec","priority":"High"}}"#;
        let event = ClientEvent::decode(frame).unwrap();
        match event {
            ClientEvent::Create(draft) => {
                assert_eq!(draft.title, "Write spec");
                assert_eq!(draft.priority, Priority::High);
                assert_eq!(draft.status, Status::Todo);
            }
            other => panic!("decoded wrong event: {other:?}"),
        }
    }

    #[test]
    fn load_intent_has_no_payload() {
        assert_eq!(ClientEvent::Load.encode(), r#"{"event":"task:load"}"#);
        assert_eq!(ClientEvent::decode(r#"{"event":"task:load"}"#).unwrap(), ClientEvent::Load);
    }

    #[test]
    fn move_payload_uses_camel_case_and_column_names() {
        let event = ClientEvent::Move(MovePayload {
            task_id: "t1".into(),
            new_status: Status::InProgress,
        });
        assert_eq!(
            event.encode(),
            r#"{"event":"task:move","data":{"taskId":"t1","newStatus":"In-Progress"}}"#
        );
    }

    #[test]
    fn deleted_broadcast_carries_task_id() {
        let event = ServerEvent::Deleted(TaskRef { task_id: "t1".into() });
        assert_eq!(event.name(), "task:deleted");
        assert_eq!(event.encode(), r#"{"event":"task:deleted","data":{"taskId":"t1"}}"#);
    }

    #[test]
    fn unknown_event_name_is_an_error() {
        assert!(ClientEvent::decode(r#"{"event":"task:destroy","data":{}}"#).is_err());
        assert!(ClientEvent::decode("not json").is_err());
    }
}
