//! The state store: the single mutable home of the game document.
//!
//! Every mutation goes through [`StateStore::set`] or [`StateStore::apply`]:
//! subscribers for the touched field paths are notified synchronously in
//! subscription order, then the whole document is persisted through the
//! installed snapshot store. Storage failures are logged and swallowed — the
//! game keeps running in memory.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};

use serde_json::Value;
use tracing::warn;

use crate::dao::SnapshotStore;
use crate::state::field::{FieldError, FieldPath};
use crate::state::game::{GameState, TeamId, team_slot_value};

/// A single applied field mutation, carried to subscribers and broadcasts.
#[derive(Debug, Clone)]
pub struct FieldChange {
    /// The field that changed.
    pub path: FieldPath,
    /// Value before the mutation.
    pub old: Value,
    /// Value after the mutation.
    pub new: Value,
}

impl FieldChange {
    /// Build a change record from serializable old/new values.
    pub fn of<T: serde::Serialize>(path: FieldPath, old: &T, new: &T) -> Self {
        Self {
            path,
            old: serde_json::to_value(old).unwrap_or(Value::Null),
            new: serde_json::to_value(new).unwrap_or(Value::Null),
        }
    }
}

/// Write one field on the document inside an [`StateStore::apply`] closure,
/// recording the change when the value actually differs. Internal writes
/// address fixed document structure, so a field error here is a bug; it is
/// logged and the write skipped.
pub fn stage_field(
    doc: &mut GameState,
    changes: &mut Vec<FieldChange>,
    path: FieldPath,
    value: Value,
) {
    match doc.write_field(&path, value.clone()) {
        Ok(old) => {
            if old != value {
                changes.push(FieldChange {
                    path,
                    old,
                    new: value,
                });
            }
        }
        Err(err) => warn!(%path, error = %err, "internal field write rejected"),
    }
}

/// [`stage_field`] for the team-slot fields (`0` encodes "no team").
pub fn stage_slot(
    doc: &mut GameState,
    changes: &mut Vec<FieldChange>,
    path: FieldPath,
    slot: Option<TeamId>,
) {
    stage_field(doc, changes, path, team_slot_value(slot));
}

type Callback = Arc<dyn Fn(&Value, &Value) + Send + Sync>;

struct StoreInner {
    state: RwLock<GameState>,
    subscribers: Mutex<HashMap<String, Vec<(u64, Callback)>>>,
    next_id: AtomicU64,
    snapshot: RwLock<Option<Arc<dyn SnapshotStore>>>,
}

/// Cheaply clonable handle to the shared game document.
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<StoreInner>,
}

/// Handle returned by [`StateStore::subscribe`]; dropping it unsubscribes.
pub struct Subscription {
    inner: Weak<StoreInner>,
    key: String,
    id: u64,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade()
            && let Ok(mut subscribers) = inner.subscribers.lock()
            && let Some(entries) = subscribers.get_mut(&self.key)
        {
            entries.retain(|(id, _)| *id != self.id);
        }
    }
}

impl StateStore {
    /// Create a store seeded with the given document and no persistence.
    pub fn new(initial: GameState) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                state: RwLock::new(initial),
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                snapshot: RwLock::new(None),
            }),
        }
    }

    /// Create a store from defaults merged with whatever the snapshot store
    /// holds, then install that store for subsequent persistence.
    ///
    /// A missing snapshot starts from defaults; an unreadable or corrupt one
    /// is discarded with a warning.
    pub fn restore(defaults: GameState, snapshot_store: Arc<dyn SnapshotStore>) -> Self {
        let initial = match snapshot_store.load() {
            Ok(Some(saved)) => GameState::merged_with(defaults, saved),
            Ok(None) => defaults,
            Err(err) => {
                warn!(error = %err, "failed to load snapshot; starting from defaults");
                defaults
            }
        };

        let store = Self::new(initial);
        store.install_snapshot_store(snapshot_store);
        store
    }

    /// Install (or replace) the persistence backend.
    pub fn install_snapshot_store(&self, snapshot_store: Arc<dyn SnapshotStore>) {
        *self.inner.snapshot.write().expect("snapshot lock") = Some(snapshot_store);
    }

    /// Clone of the whole document.
    pub fn snapshot(&self) -> GameState {
        self.inner.state.read().expect("state lock").clone()
    }

    /// Read the document under the lock without cloning.
    pub fn read<R>(&self, f: impl FnOnce(&GameState) -> R) -> R {
        f(&self.inner.state.read().expect("state lock"))
    }

    /// Read one field as a JSON value.
    pub fn get_field(&self, path: &FieldPath) -> Result<Value, FieldError> {
        self.read(|state| state.read_field(path))
    }

    /// Atomic single-field update: write, notify that path's subscribers in
    /// order, persist the whole document.
    pub fn set(&self, path: &FieldPath, value: Value) -> Result<(), FieldError> {
        let (old, new, persisted) = {
            let mut state = self.inner.state.write().expect("state lock");
            let old = state.write_field(path, value.clone())?;
            (old, value, state.clone())
        };

        self.notify(&[FieldChange {
            path: *path,
            old,
            new,
        }]);
        self.persist(&persisted);
        Ok(())
    }

    /// Atomic multi-field update used by the turn resolver.
    ///
    /// The closure mutates the document and reports which fields it touched;
    /// notifications fire in the reported order after the lock is released,
    /// then the document persists once.
    pub fn apply<R>(&self, f: impl FnOnce(&mut GameState) -> (R, Vec<FieldChange>)) -> R {
        let (result, changes, persisted) = {
            let mut state = self.inner.state.write().expect("state lock");
            let (result, changes) = f(&mut state);
            (result, changes, state.clone())
        };

        if !changes.is_empty() {
            self.notify(&changes);
            self.persist(&persisted);
        }
        result
    }

    /// Replace the document wholesale (full reset and state sync), clearing
    /// the persisted snapshot first when `clear_snapshot` is set.
    pub fn replace(&self, state: GameState, clear_snapshot: bool) {
        if clear_snapshot
            && let Some(snapshot_store) = self.snapshot_store()
            && let Err(err) = snapshot_store.clear()
        {
            warn!(error = %err, "failed to clear persisted snapshot");
        }

        let persisted = {
            let mut slot = self.inner.state.write().expect("state lock");
            *slot = state;
            slot.clone()
        };
        self.persist(&persisted);
    }

    /// Register a callback for one exact field path. Multiple callbacks per
    /// path are allowed and run in subscription order.
    pub fn subscribe(
        &self,
        path: &FieldPath,
        callback: impl Fn(&Value, &Value) + Send + Sync + 'static,
    ) -> Subscription {
        let key = path.to_string();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .lock()
            .expect("subscriber lock")
            .entry(key.clone())
            .or_default()
            .push((id, Arc::new(callback)));

        Subscription {
            inner: Arc::downgrade(&self.inner),
            key,
            id,
        }
    }

    fn snapshot_store(&self) -> Option<Arc<dyn SnapshotStore>> {
        self.inner.snapshot.read().expect("snapshot lock").clone()
    }

    fn notify(&self, changes: &[FieldChange]) {
        for change in changes {
            let callbacks: Vec<Callback> = {
                let subscribers = self.inner.subscribers.lock().expect("subscriber lock");
                subscribers
                    .get(&change.path.to_string())
                    .map(|entries| entries.iter().map(|(_, cb)| cb.clone()).collect())
                    .unwrap_or_default()
            };
            for callback in callbacks {
                callback(&change.new, &change.old);
            }
        }
    }

    fn persist(&self, state: &GameState) {
        let Some(snapshot_store) = self.snapshot_store() else {
            return;
        };

        match serde_json::to_value(state) {
            Ok(document) => {
                if let Err(err) = snapshot_store.save(&document) {
                    warn!(error = %err, "failed to persist game state; continuing in memory");
                }
            }
            Err(err) => warn!(error = %err, "failed to encode game state for persistence"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::snapshot::tests::MemorySnapshotStore;
    use crate::state::field::TeamField;
    use crate::state::game::GameConfig;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn store() -> StateStore {
        StateStore::new(GameState::with_config(GameConfig::default()))
    }

    #[test]
    fn set_notifies_subscribers_in_order_with_old_and_new() {
        let store = store();
        let log = Arc::new(Mutex::new(Vec::new()));

        let first = {
            let log = log.clone();
            store.subscribe(&FieldPath::TimerValue, move |new, old| {
                log.lock().unwrap().push(("first", old.clone(), new.clone()));
            })
        };
        let second = {
            let log = log.clone();
            store.subscribe(&FieldPath::TimerValue, move |new, old| {
                log.lock().unwrap().push(("second", old.clone(), new.clone()));
            })
        };

        store.set(&FieldPath::TimerValue, json!(10)).unwrap();

        let entries = log.lock().unwrap().clone();
        assert_eq!(
            entries,
            vec![
                ("first", json!(15), json!(10)),
                ("second", json!(15), json!(10)),
            ]
        );
        drop((first, second));
    }

    #[test]
    fn subscriptions_match_exact_paths_only() {
        let store = store();
        let hits = Arc::new(AtomicUsize::new(0));

        let _sub = {
            let hits = hits.clone();
            store.subscribe(
                &FieldPath::Team(TeamId::new(1).unwrap(), TeamField::Score),
                move |_, _| {
                    hits.fetch_add(1, Ordering::SeqCst);
                },
            )
        };

        store
            .set(
                &FieldPath::Team(TeamId::new(2).unwrap(), TeamField::Score),
                json!(3),
            )
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        store
            .set(
                &FieldPath::Team(TeamId::new(1).unwrap(), TeamField::Score),
                json!(1),
            )
            .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dropping_the_subscription_unsubscribes() {
        let store = store();
        let hits = Arc::new(AtomicUsize::new(0));

        let sub = {
            let hits = hits.clone();
            store.subscribe(&FieldPath::TimerRunning, move |_, _| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };

        store.set(&FieldPath::TimerRunning, json!(true)).unwrap();
        drop(sub);
        store.set(&FieldPath::TimerRunning, json!(false)).unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn every_mutation_persists_the_whole_document() {
        let backend = Arc::new(MemorySnapshotStore::default());
        let store = store();
        store.install_snapshot_store(backend.clone());

        store.set(&FieldPath::CurrentSet, json!(4)).unwrap();

        let saved = backend.slot.lock().unwrap().clone().unwrap();
        assert_eq!(saved["currentSet"], json!(4));
        assert_eq!(saved["currentQuestion"], json!(1));
    }

    #[test]
    fn restore_merges_saved_fields_over_defaults() {
        let backend = Arc::new(MemorySnapshotStore::default());
        *backend.slot.lock().unwrap() = Some(json!({
            "currentSet": 6,
            "teams": {"3": {"score": 9}},
        }));

        let store = StateStore::restore(GameState::with_config(GameConfig::default()), backend);
        let state = store.snapshot();
        assert_eq!(state.current_set, 6);
        assert_eq!(state.team(TeamId::new(3).unwrap()).score, 9);
        assert_eq!(state.team(TeamId::new(3).unwrap()).name, "Team C");
        assert_eq!(state.timer_value, 15);
    }

    #[test]
    fn apply_reports_changes_in_order() {
        let store = store();
        let log = Arc::new(Mutex::new(Vec::new()));

        let _a = {
            let log = log.clone();
            store.subscribe(&FieldPath::CurrentSet, move |new, _| {
                log.lock().unwrap().push(("set", new.clone()));
            })
        };
        let _b = {
            let log = log.clone();
            store.subscribe(&FieldPath::CurrentQuestion, move |new, _| {
                log.lock().unwrap().push(("question", new.clone()));
            })
        };

        store.apply(|state| {
            let old_set = state.current_set;
            let old_question = state.current_question;
            state.current_set = 2;
            state.current_question = 3;
            (
                (),
                vec![
                    FieldChange::of(FieldPath::CurrentSet, &old_set, &2u8),
                    FieldChange::of(FieldPath::CurrentQuestion, &old_question, &3u8),
                ],
            )
        });

        let entries = log.lock().unwrap().clone();
        assert_eq!(entries, vec![("set", json!(2)), ("question", json!(3))]);
    }

    #[test]
    fn replace_clears_the_persisted_snapshot_on_reset() {
        let backend = Arc::new(MemorySnapshotStore::default());
        let store = store();
        store.install_snapshot_store(backend.clone());
        store.set(&FieldPath::CurrentSet, json!(9)).unwrap();

        store.replace(GameState::with_config(GameConfig::default()), true);

        let saved = backend.slot.lock().unwrap().clone().unwrap();
        assert_eq!(saved["currentSet"], json!(1));
    }
}
