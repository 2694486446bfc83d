pub mod board;
pub mod client;
pub mod config;
pub mod ipc;
pub mod protocol;
pub mod storage;
pub mod sync;
pub mod uploads;

use std::sync::Arc;

use board::store::TaskStore;
use config::{BoardConfig, HotConfig};
use ipc::event::EventBroadcaster;
use uploads::LocalAttachmentStore;

/// Shared application state passed to every event handler and background task.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<BoardConfig>,
    /// Authoritative task collection — the single shared mutable resource.
    pub tasks: Arc<TaskStore>,
    /// Fans committed mutations out to every connected client.
    pub broadcaster: Arc<EventBroadcaster>,
    /// Attachment storage boundary (local filesystem).
    pub attachments: Arc<LocalAttachmentStore>,
    /// Hot-reloadable config subset (upload ceiling).
    pub hot: Arc<tokio::sync::RwLock<HotConfig>>,
    pub started_at: std::time::Instant,
}
