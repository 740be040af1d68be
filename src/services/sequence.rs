//! Cancelable scheduled task chains.
//!
//! The browser original sequenced animation-coupled mutations with nested
//! `setTimeout` cascades that a reset could race. Here every timed resolution
//! sequence runs as one tracked task; a full reset aborts them all, so no
//! stale continuation can touch the fresh document.

use std::future::Future;
use std::sync::Mutex;

use tokio::task::JoinHandle;

/// Tracker for the in-flight timed resolution sequences.
pub struct Sequencer {
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Sequencer {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawn a sequence and keep its handle for cancellation.
    pub fn spawn(&self, sequence: impl Future<Output = ()> + Send + 'static) {
        let handle = tokio::spawn(sequence);
        let mut tasks = self.tasks.lock().expect("sequencer lock");
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    /// Abort every pending sequence.
    pub fn cancel_all(&self) {
        let mut tasks = self.tasks.lock().expect("sequencer lock");
        for task in tasks.drain(..) {
            task.abort();
        }
    }

    /// Number of sequences still tracked (finished ones may linger until the
    /// next spawn prunes them).
    pub fn tracked(&self) -> usize {
        self.tasks.lock().expect("sequencer lock").len()
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn sequences_run_to_completion() {
        let sequencer = Sequencer::new();
        let fired = Arc::new(AtomicBool::new(false));

        let flag = fired.clone();
        sequencer.spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            flag.store(true, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_aborts_pending_steps() {
        let sequencer = Sequencer::new();
        let fired = Arc::new(AtomicBool::new(false));

        let flag = fired.clone();
        sequencer.spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            flag.store(true, Ordering::SeqCst);
        });

        sequencer.cancel_all();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!fired.load(Ordering::SeqCst));
        assert_eq!(sequencer.tracked(), 0);
    }
}
