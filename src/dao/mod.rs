//! Data access layer: durable snapshot storage for the game state document.

pub mod snapshot;
pub mod storage;

pub use snapshot::{FileSnapshotStore, SnapshotStore};
