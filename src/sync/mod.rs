pub mod drag;
pub mod reducer;

pub use drag::{drop_to_intent, DragDrop};
pub use reducer::{BoardProjection, SyncState};
