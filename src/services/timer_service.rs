//! Countdown timer: a server-driven 1 Hz tick with moderator controls.
//!
//! The countdown runs as a dedicated task owned by the shared state; stop,
//! reset and the full game reset abort it. When the value reaches zero the
//! timer stops, `timer_ended` goes out exactly once, and the emergency
//! meeting flag stays up until a display acknowledges the alarm.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::dto::ws::{ServerMessage, TimerAction};
use crate::services::Outcome;
use crate::state::field::FieldPath;
use crate::state::{SharedState, stage_field};

/// Apply an absolute timer state pushed by a client.
pub fn apply_update(state: &SharedState, origin: Option<Uuid>, value: u32, running: bool) -> Outcome {
    state.store().apply(|doc| {
        let mut changes = Vec::new();
        stage_field(doc, &mut changes, FieldPath::TimerValue, Value::from(value));
        stage_field(
            doc,
            &mut changes,
            FieldPath::TimerRunning,
            Value::from(running),
        );
        ((), changes)
    });

    state.broadcast(origin, ServerMessage::TimerUpdate { value, running });

    if running {
        spawn_countdown(state);
    } else {
        state.abort_timer_task();
    }
    Outcome::Applied
}

/// Execute a moderator timer control verb.
pub fn control(state: &SharedState, origin: Option<Uuid>, action: TimerAction, amount: i64) -> Outcome {
    match action {
        TimerAction::Start => start(state, origin),
        TimerAction::Stop => stop(state, origin),
        TimerAction::Reset => reset(state, origin),
        TimerAction::Adjust => adjust(state, origin, amount),
        TimerAction::Set => {
            let Ok(value) = u32::try_from(amount) else {
                debug!(amount, "timer set ignored: negative value");
                return Outcome::Ignored;
            };
            set_value(state, origin, value)
        }
    }
}

/// Start the countdown. A no-op while it is already ticking or at zero.
pub fn start(state: &SharedState, origin: Option<Uuid>) -> Outcome {
    let started = state.store().apply(|doc| {
        if doc.timer_running || doc.timer_value == 0 {
            return (None, Vec::new());
        }
        let mut changes = Vec::new();
        stage_field(doc, &mut changes, FieldPath::TimerRunning, Value::from(true));
        (Some(doc.timer_value), changes)
    });

    let Some(value) = started else {
        debug!("timer start ignored");
        return Outcome::Ignored;
    };

    state.broadcast(origin, ServerMessage::TimerUpdate { value, running: true });
    spawn_countdown(state);
    Outcome::Applied
}

/// Stop the countdown and restore the remembered value.
pub fn stop(state: &SharedState, origin: Option<Uuid>) -> Outcome {
    state.abort_timer_task();

    let value = state.store().apply(|doc| {
        let mut changes = Vec::new();
        stage_field(doc, &mut changes, FieldPath::TimerRunning, Value::from(false));
        let restored = doc.default_timer_value;
        stage_field(
            doc,
            &mut changes,
            FieldPath::TimerValue,
            Value::from(restored),
        );
        (restored, changes)
    });

    state.broadcast(origin, ServerMessage::TimerUpdate { value, running: false });
    Outcome::Applied
}

/// Reset the value and the remembered default to the configured duration.
pub fn reset(state: &SharedState, origin: Option<Uuid>) -> Outcome {
    state.abort_timer_task();

    let value = state.store().apply(|doc| {
        let duration = doc.config.timer_duration;
        let mut changes = Vec::new();
        stage_field(doc, &mut changes, FieldPath::TimerRunning, Value::from(false));
        stage_field(doc, &mut changes, FieldPath::TimerValue, Value::from(duration));
        stage_field(
            doc,
            &mut changes,
            FieldPath::DefaultTimerValue,
            Value::from(duration),
        );
        (duration, changes)
    });

    state.broadcast(origin, ServerMessage::TimerUpdate { value, running: false });
    Outcome::Applied
}

/// Nudge the value by a signed number of seconds, floored at zero. The new
/// value becomes the remembered default.
pub fn adjust(state: &SharedState, origin: Option<Uuid>, delta: i64) -> Outcome {
    let (value, running) = state.store().apply(|doc| {
        let new = i64::from(doc.timer_value).saturating_add(delta).max(0) as u32;
        let mut changes = Vec::new();
        stage_field(doc, &mut changes, FieldPath::TimerValue, Value::from(new));
        stage_field(
            doc,
            &mut changes,
            FieldPath::DefaultTimerValue,
            Value::from(new),
        );
        ((new, doc.timer_running), changes)
    });

    state.broadcast(origin, ServerMessage::TimerUpdate { value, running });
    Outcome::Applied
}

/// Set the value (and the remembered default) outright.
pub fn set_value(state: &SharedState, origin: Option<Uuid>, value: u32) -> Outcome {
    let running = state.store().apply(|doc| {
        let mut changes = Vec::new();
        stage_field(doc, &mut changes, FieldPath::TimerValue, Value::from(value));
        stage_field(
            doc,
            &mut changes,
            FieldPath::DefaultTimerValue,
            Value::from(value),
        );
        (doc.timer_running, changes)
    });

    state.broadcast(origin, ServerMessage::TimerUpdate { value, running });
    Outcome::Applied
}

/// A display finished playing the timer-expired alarm.
pub fn emergency_meeting_done(state: &SharedState, _origin: Option<Uuid>) -> Outcome {
    state.store().apply(|doc| {
        let mut changes = Vec::new();
        stage_field(
            doc,
            &mut changes,
            FieldPath::EmergencyMeetingActive,
            Value::from(false),
        );
        ((), changes)
    });
    Outcome::Applied
}

enum Tick {
    Running(u32),
    Expired,
    ExpiredQuietly,
    Stopped,
}

fn spawn_countdown(state: &SharedState) {
    let shared = state.clone();
    let handle = tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(1)).await;

            let tick = shared.store().apply(|doc| {
                if !doc.timer_running {
                    return (Tick::Stopped, Vec::new());
                }

                let mut changes = Vec::new();
                let new = doc.timer_value.saturating_sub(1);
                stage_field(doc, &mut changes, FieldPath::TimerValue, Value::from(new));

                if new > 0 {
                    return (Tick::Running(new), changes);
                }

                stage_field(doc, &mut changes, FieldPath::TimerRunning, Value::from(false));
                if doc.emergency_meeting_active {
                    // An alarm is already playing; do not restart it.
                    (Tick::ExpiredQuietly, changes)
                } else {
                    stage_field(
                        doc,
                        &mut changes,
                        FieldPath::EmergencyMeetingActive,
                        Value::from(true),
                    );
                    (Tick::Expired, changes)
                }
            });

            match tick {
                Tick::Running(value) => {
                    shared.broadcast(None, ServerMessage::TimerUpdate { value, running: true });
                }
                Tick::Expired => {
                    shared.broadcast(
                        None,
                        ServerMessage::TimerUpdate {
                            value: 0,
                            running: false,
                        },
                    );
                    shared.broadcast(None, ServerMessage::TimerEnded);
                    break;
                }
                Tick::ExpiredQuietly => {
                    shared.broadcast(
                        None,
                        ServerMessage::TimerUpdate {
                            value: 0,
                            running: false,
                        },
                    );
                    break;
                }
                Tick::Stopped => break,
            }
        }
    });

    state.install_timer_task(handle);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::state::AppState;

    fn shared_state() -> SharedState {
        AppState::new(AppConfig::default(), None)
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_ticks_to_zero_and_raises_the_alarm_once() {
        let state = shared_state();
        set_value(&state, None, 3);

        assert_eq!(start(&state, None), Outcome::Applied);
        tokio::time::sleep(Duration::from_secs(10)).await;

        state.store().read(|doc| {
            assert_eq!(doc.timer_value, 0);
            assert!(!doc.timer_running);
            assert!(doc.emergency_meeting_active);
        });

        // A second start at zero is refused until the timer is reset.
        assert_eq!(start(&state, None), Outcome::Ignored);

        emergency_meeting_done(&state, None);
        state
            .store()
            .read(|doc| assert!(!doc.emergency_meeting_active));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_restores_the_remembered_value() {
        let state = shared_state();
        set_value(&state, None, 20);

        start(&state, None);
        tokio::time::sleep(Duration::from_secs(5)).await;
        state.store().read(|doc| assert!(doc.timer_value < 20));

        stop(&state, None);
        state.store().read(|doc| {
            assert_eq!(doc.timer_value, 20);
            assert!(!doc.timer_running);
        });

        // The aborted countdown no longer ticks.
        tokio::time::sleep(Duration::from_secs(5)).await;
        state.store().read(|doc| assert_eq!(doc.timer_value, 20));
    }

    #[tokio::test(start_paused = true)]
    async fn adjust_floors_at_zero_and_updates_the_default() {
        let state = shared_state();

        adjust(&state, None, -100);
        state.store().read(|doc| {
            assert_eq!(doc.timer_value, 0);
            assert_eq!(doc.default_timer_value, 0);
        });

        adjust(&state, None, 7);
        state.store().read(|doc| {
            assert_eq!(doc.timer_value, 7);
            assert_eq!(doc.default_timer_value, 7);
        });
    }

    #[tokio::test(start_paused = true)]
    async fn reset_returns_to_the_configured_duration() {
        let state = shared_state();
        set_value(&state, None, 99);
        start(&state, None);

        reset(&state, None);
        state.store().read(|doc| {
            assert_eq!(doc.timer_value, 15);
            assert_eq!(doc.default_timer_value, 15);
            assert!(!doc.timer_running);
        });
    }

    #[tokio::test(start_paused = true)]
    async fn starting_twice_keeps_a_single_countdown() {
        let state = shared_state();
        set_value(&state, None, 10);

        start(&state, None);
        assert_eq!(start(&state, None), Outcome::Ignored);

        tokio::time::sleep(Duration::from_secs(3)).await;
        state.store().read(|doc| assert_eq!(doc.timer_value, 7));
    }
}
