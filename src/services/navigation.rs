//! Navigation: maps the board cursor to character positions and travel
//! directions, and performs the bounds-checked cursor moves.
//!
//! The question markers sit on a circular orbit, so cross-set wraparounds
//! deliberately run against naive numeric comparison: leaving the last
//! question for the next set's first marker takes the short path backward,
//! and vice versa.

use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::dto::common::{Direction, StepDirection};
use crate::dto::validation;
use crate::dto::ws::ServerMessage;
use crate::services::Outcome;
use crate::state::field::FieldPath;
use crate::state::game::GameConfig;
use crate::state::{FieldChange, SharedState, stage_field};

/// Character position (percent across the track) for a board cursor.
///
/// Question numbers outside the configured table fall back to clamped linear
/// progress across the whole board.
pub fn character_position(config: &GameConfig, set: u8, question: u8) -> f32 {
    if let Some(&position) = config.character_positions.get(&question) {
        return position;
    }

    let total = f32::from(config.total_sets) * f32::from(config.questions_per_set);
    let index = f32::from(set - 1) * f32::from(config.questions_per_set) + f32::from(question);
    (index / total * 100.0).clamp(15.0, 85.0)
}

/// Which way the character runs between two board cursors.
pub fn travel_direction(config: &GameConfig, from: (u8, u8), to: (u8, u8)) -> Direction {
    let (from_set, from_question) = from;
    let (to_set, to_question) = to;
    let last = config.questions_per_set;

    if from_set == to_set {
        return if to_question > from_question {
            Direction::Forward
        } else {
            Direction::Backward
        };
    }

    // Circular orbit wraparounds take the shorter visual path.
    if from_question == last && to_question == 1 && to_set == from_set + 1 {
        Direction::Backward
    } else if from_question == 1 && to_question == last && to_set + 1 == from_set {
        Direction::Forward
    } else if to_question == 1 && to_set == from_set + 1 {
        Direction::Backward
    } else if to_set > from_set {
        Direction::Forward
    } else {
        Direction::Backward
    }
}

/// Target cursor for a moderator arrow-key step, `None` at the board edges.
pub fn step_target(config: &GameConfig, set: u8, question: u8, step: StepDirection) -> Option<(u8, u8)> {
    match step {
        StepDirection::Next => {
            if question < config.questions_per_set {
                Some((set, question + 1))
            } else if set < config.total_sets {
                Some((set + 1, 1))
            } else {
                None
            }
        }
        StepDirection::Previous => {
            if question > 1 {
                Some((set, question - 1))
            } else if set > 1 {
                Some((set - 1, config.questions_per_set))
            } else {
                None
            }
        }
    }
}

/// Move the board cursor, broadcasting the progress event on success.
///
/// Rejected (a logged no-op) while a move animation is still running, when
/// the target is outside the board, and when the cursor is already there.
/// Leaving a set drops that set's Q1 three-chances bookkeeping and un-grays
/// its failed teams.
pub fn move_to(
    state: &SharedState,
    origin: Option<Uuid>,
    set: u8,
    question: u8,
    animate: bool,
) -> Outcome {
    struct Applied {
        position: f32,
        direction: Direction,
        left_set: Option<u8>,
        q1_restore: Option<(u8, Vec<u8>)>,
    }

    let applied = state.store().apply(|doc| {
        if doc.is_animating {
            return (None, Vec::new());
        }
        if !validation::within_board(&doc.config, set, question) {
            return (None, Vec::new());
        }
        let from = (doc.current_set, doc.current_question);
        if from == (set, question) {
            return (None, Vec::new());
        }

        let direction = travel_direction(&doc.config, from, (set, question));
        let position = character_position(&doc.config, set, question);

        let mut changes = Vec::new();
        stage_field(doc, &mut changes, FieldPath::CurrentSet, Value::from(set));
        stage_field(
            doc,
            &mut changes,
            FieldPath::CurrentQuestion,
            Value::from(question),
        );
        if animate {
            stage_field(doc, &mut changes, FieldPath::IsAnimating, Value::from(true));
        }

        let left_set = (from.0 != set).then(|| {
            // The abandoned set's chance bookkeeping drops entirely; the
            // change record is built by hand so the counter is not
            // re-created as an explicit zero.
            let old_attempts = doc.q1_attempts.get(&from.0).copied().unwrap_or(0);
            doc.clear_q1_tracking(from.0);
            if old_attempts != 0 {
                changes.push(FieldChange {
                    path: FieldPath::Q1Attempts(from.0),
                    old: Value::from(old_attempts),
                    new: Value::from(0u8),
                });
            }
            from.0
        });

        // Re-entering a set's first question restores its chance display and
        // team graying on every client.
        let q1_restore = (question == 1).then(|| {
            let attempts = doc.q1_attempts.get(&set).copied().unwrap_or(0);
            let failed = doc
                .q1_failed_teams
                .get(&set)
                .map(|teams| teams.iter().map(|id| id.get()).collect())
                .unwrap_or_default();
            (attempts, failed)
        });

        (
            Some(Applied {
                position,
                direction,
                left_set,
                q1_restore,
            }),
            changes,
        )
    });

    let Some(applied) = applied else {
        debug!(set, question, "navigation rejected");
        return Outcome::Ignored;
    };

    state.broadcast(
        origin,
        ServerMessage::ProgressUpdate {
            set_number: set,
            question_number: question,
            position: applied.position,
            direction: applied.direction,
            animate_run: animate,
        },
    );

    if let Some(left) = applied.left_set {
        state.broadcast(
            origin,
            ServerMessage::Q1Status {
                set_number: left,
                attempts: 0,
                failed_teams: Vec::new(),
            },
        );
    }
    if let Some((attempts, failed_teams)) = applied.q1_restore {
        state.broadcast(
            origin,
            ServerMessage::Q1Status {
                set_number: set,
                attempts,
                failed_teams,
            },
        );
    }

    if animate {
        let shared = state.clone();
        let movement = state.config().delays.movement();
        state.sequencer().spawn(async move {
            tokio::time::sleep(movement).await;
            shared.store().apply(|doc| {
                let mut changes = Vec::new();
                stage_field(doc, &mut changes, FieldPath::IsAnimating, Value::from(false));
                ((), changes)
            });
        });
    }

    Outcome::Applied
}

/// Resolve and perform a moderator arrow-key step.
pub fn step(state: &SharedState, origin: Option<Uuid>, step: StepDirection) -> Outcome {
    let target = state.store().read(|doc| {
        step_target(&doc.config, doc.current_set, doc.current_question, step)
    });

    match target {
        Some((set, question)) => move_to(state, origin, set, question, true),
        None => Outcome::Ignored,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GameConfig {
        GameConfig::default()
    }

    #[test]
    fn positions_come_from_the_configured_table() {
        let config = config();
        assert_eq!(character_position(&config, 1, 1), 34.0);
        assert_eq!(character_position(&config, 7, 2), 45.0);
        assert_eq!(character_position(&config, 12, 4), 66.0);
    }

    #[test]
    fn out_of_table_questions_fall_back_to_clamped_progress() {
        let mut config = config();
        config.character_positions.clear();
        // First question of the board: 1/48 of the track, clamped up to 15.
        assert_eq!(character_position(&config, 1, 1), 15.0);
        // Last question: 100%, clamped down to 85.
        assert_eq!(character_position(&config, 12, 4), 85.0);
        // Mid-board stays linear: set 6 question 2 is 22/48.
        let expected = 22.0 / 48.0 * 100.0;
        assert!((character_position(&config, 6, 2) - expected).abs() < f32::EPSILON);
    }

    #[test]
    fn same_set_direction_follows_question_order() {
        let config = config();
        assert_eq!(
            travel_direction(&config, (3, 1), (3, 2)),
            Direction::Forward
        );
        assert_eq!(
            travel_direction(&config, (3, 4), (3, 2)),
            Direction::Backward
        );
    }

    #[test]
    fn circular_wraparounds_invert_naive_comparison() {
        let config = config();
        // Q4 -> next set Q1 runs backward along the short path.
        assert_eq!(
            travel_direction(&config, (2, 4), (3, 1)),
            Direction::Backward
        );
        // Q1 -> previous set Q4 runs forward.
        assert_eq!(
            travel_direction(&config, (3, 1), (2, 4)),
            Direction::Forward
        );
        // Q2/Q3 -> next set Q1 also takes the backward path.
        assert_eq!(
            travel_direction(&config, (2, 2), (3, 1)),
            Direction::Backward
        );
        // Distant set jumps fall back to set order.
        assert_eq!(
            travel_direction(&config, (2, 2), (5, 3)),
            Direction::Forward
        );
        assert_eq!(
            travel_direction(&config, (5, 3), (2, 2)),
            Direction::Backward
        );
    }

    #[test]
    fn steps_cross_set_boundaries_and_saturate_at_edges() {
        let config = config();
        assert_eq!(step_target(&config, 1, 1, StepDirection::Next), Some((1, 2)));
        assert_eq!(step_target(&config, 1, 4, StepDirection::Next), Some((2, 1)));
        assert_eq!(step_target(&config, 12, 4, StepDirection::Next), None);
        assert_eq!(step_target(&config, 2, 1, StepDirection::Previous), Some((1, 4)));
        assert_eq!(step_target(&config, 1, 1, StepDirection::Previous), None);
    }
}
