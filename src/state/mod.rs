//! Shared application state: the game document store, the broadcast hub,
//! connected clients, and the latches coordinating resets and timers.

pub mod field;
pub mod game;
mod hub;
pub mod store;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::dao::SnapshotStore;
use crate::dto::common::ClientRole;
use crate::dto::ws::ServerMessage;
use crate::services::sequence::Sequencer;
use crate::state::game::GameState;

pub use self::hub::{Envelope, EventHub};
pub use self::store::{FieldChange, StateStore, Subscription, stage_field, stage_slot};

/// Shared handle to the application state.
pub type SharedState = Arc<AppState>;

/// Broadcast channel capacity for the event hub.
const HUB_CAPACITY: usize = 64;

#[derive(Clone)]
/// Handle used to push messages to a connected client socket.
pub struct ClientConnection {
    /// Connection id, also the origin id on broadcast envelopes.
    pub id: Uuid,
    /// Declared client kind.
    pub role: ClientRole,
    /// Outbound channel feeding the connection's writer task.
    pub tx: mpsc::UnboundedSender<Message>,
}

/// Central application state shared by every route and service.
pub struct AppState {
    config: Arc<AppConfig>,
    store: StateStore,
    hub: EventHub,
    sequencer: Sequencer,
    clients: DashMap<Uuid, ClientConnection>,
    timer_task: Mutex<Option<JoinHandle<()>>>,
    resetting: AtomicBool,
}

impl AppState {
    /// Construct the shared state, restoring the game document from the
    /// snapshot store when one is available.
    pub fn new(config: AppConfig, snapshot_store: Option<Arc<dyn SnapshotStore>>) -> SharedState {
        let defaults = GameState::with_config(config.game.clone());
        let store = match snapshot_store {
            Some(backend) => StateStore::restore(defaults, backend),
            None => StateStore::new(defaults),
        };

        Arc::new(Self {
            config: Arc::new(config),
            store,
            hub: EventHub::new(HUB_CAPACITY),
            sequencer: Sequencer::new(),
            clients: DashMap::new(),
            timer_task: Mutex::new(None),
            resetting: AtomicBool::new(false),
        })
    }

    /// Immutable runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The game document store.
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// The broadcast hub feeding WebSocket and SSE fan-out.
    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    /// Tracker for the cancelable timed resolution sequences.
    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    /// Registry of connected client sockets keyed by connection id.
    pub fn clients(&self) -> &DashMap<Uuid, ClientConnection> {
        &self.clients
    }

    /// A fresh default document for the configured board.
    pub fn fresh_state(&self) -> GameState {
        GameState::with_config(self.config.game.clone())
    }

    /// Publish an event to every connected client except the originator.
    pub fn broadcast(&self, origin: Option<Uuid>, message: ServerMessage) {
        self.hub.broadcast(origin, message);
    }

    /// Try to enter the full-reset critical section. Returns `false` when a
    /// reset is already running.
    pub fn begin_reset(&self) -> bool {
        !self.resetting.swap(true, Ordering::SeqCst)
    }

    /// Leave the full-reset critical section.
    pub fn end_reset(&self) {
        self.resetting.store(false, Ordering::SeqCst);
    }

    /// Replace the countdown task handle, aborting any previous one.
    pub fn install_timer_task(&self, handle: JoinHandle<()>) {
        let mut slot = self.timer_task.lock().expect("timer task lock");
        if let Some(previous) = slot.replace(handle) {
            previous.abort();
        }
    }

    /// Abort the countdown task if one is running.
    pub fn abort_timer_task(&self) {
        if let Some(handle) = self.timer_task.lock().expect("timer task lock").take() {
            handle.abort();
        }
    }
}
