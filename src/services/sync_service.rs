//! Synchronization dispatch: maps inbound client events onto turn-resolver
//! and state-store operations.
//!
//! Every applied mutation is re-broadcast to all other clients through the
//! hub; the presentation layer on each client depends only on those broadcast
//! events, never on which peer originated them. Unknown events and invalid
//! team ids are logged no-ops — a misbehaving client cannot take the game
//! down.

use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::dto::validation;
use crate::dto::ws::{ClientMessage, ServerMessage};
use crate::services::navigation;
use crate::services::ranking;
use crate::services::timer_service;
use crate::services::turn_service;
use crate::state::field::{FieldPath, SetField, TeamField};
use crate::state::game::{GameState, TeamColor, TeamId};
use crate::state::{SharedState, stage_field};

/// Handle one inbound event from the identified connection.
///
/// Returns a message to send directly back to the requester, when the event
/// calls for one (currently only the full-state request).
pub fn dispatch(
    state: &SharedState,
    origin: Uuid,
    message: ClientMessage,
) -> Option<ServerMessage> {
    let origin = Some(origin);

    match message {
        ClientMessage::Identification { .. } => {
            warn!("ignoring duplicate identification message");
        }
        ClientMessage::BuzzerPressed { team_id } => {
            if let Some(team) = checked_team(team_id) {
                turn_service::buzz_in(state, origin, team);
            }
        }
        ClientMessage::AnswerResult { team_id, correct } => {
            if let Some(team) = checked_team(team_id) {
                if correct {
                    turn_service::answer_correct(state, origin, team);
                } else {
                    turn_service::answer_incorrect(state, origin, team);
                }
            }
        }
        ClientMessage::ScoreUpdate { team_id, score } => {
            if let Some(team) = checked_team(team_id) {
                set_score(state, origin, team, score);
            }
        }
        ClientMessage::TimerUpdate { value, running } => {
            timer_service::apply_update(state, origin, value, running);
        }
        ClientMessage::TimerControl { action, amount } => {
            timer_service::control(state, origin, action, amount);
        }
        ClientMessage::CardUpdate {
            team_id,
            card_type,
            status,
        } => {
            if let Some(team) = checked_team(team_id) {
                state.store().apply(|doc| {
                    let mut changes = Vec::new();
                    stage_field(
                        doc,
                        &mut changes,
                        FieldPath::ActionCard(team, card_type),
                        Value::from(status),
                    );
                    ((), changes)
                });
                state.broadcast(
                    origin,
                    ServerMessage::CardUpdate {
                        team_id,
                        card_type,
                        status,
                    },
                );
            }
        }
        ClientMessage::ProgressUpdate {
            set_number,
            question_number,
            animate_run,
        } => {
            navigation::move_to(
                state,
                origin,
                set_number,
                question_number,
                animate_run.unwrap_or(true),
            );
        }
        ClientMessage::Navigate { direction } => {
            navigation::step(state, origin, direction);
        }
        ClientMessage::ChallengeActivated { team_id } => {
            if let Some(team) = checked_team(team_id) {
                turn_service::toggle_challenge(state, origin, team);
            }
        }
        ClientMessage::AngelActivated { team_id } => {
            if let Some(team) = checked_team(team_id) {
                turn_service::toggle_angel(state, origin, team);
            }
        }
        ClientMessage::DevilAttackOpen { team_id } => {
            if let Some(team) = checked_team(team_id) {
                turn_service::open_devil_attack(state, origin, team);
            }
        }
        ClientMessage::DevilAttack {
            attacking_team,
            target_team,
        } => {
            if let (Some(attacker), Some(victim)) =
                (checked_team(attacking_team), checked_team(target_team))
            {
                turn_service::confirm_devil_attack(state, origin, attacker, victim);
            }
        }
        ClientMessage::DevilAttackCancel => {
            turn_service::cancel_devil_attack(state, origin);
        }
        ClientMessage::ActionCardsReset => {
            turn_service::action_cards_reset(state, origin);
        }
        ClientMessage::ResetBuzzers | ClientMessage::ClearBuzzers => {
            turn_service::reset_buzzers(state, origin);
        }
        ClientMessage::AdminReset => {
            turn_service::admin_reset(state, origin);
        }
        ClientMessage::TeamUpdate {
            team_id,
            name,
            color,
        } => {
            if let Some(team) = checked_team(team_id) {
                update_team(state, origin, team, name, color);
            }
        }
        ClientMessage::QuestionSetUpdate {
            set_number,
            title,
            theme,
        } => {
            update_question_set(state, origin, set_number, title, theme);
        }
        ClientMessage::EmergencyMeetingDone => {
            timer_service::emergency_meeting_done(state, origin);
        }
        ClientMessage::GetServerState => {
            return Some(ServerMessage::ServerStateResponse {
                state: Box::new(state.store().snapshot()),
            });
        }
        ClientMessage::GameStateSync { state: document } => {
            merge_full_state(state, origin, document);
        }
        ClientMessage::Unknown => {
            debug!("ignoring unknown event type");
        }
    }

    None
}

fn checked_team(raw: u8) -> Option<TeamId> {
    let team = validation::team_id(raw);
    if team.is_none() {
        debug!(team_id = raw, "ignoring event with invalid team id");
    }
    team
}

/// Absolute score edit from the console. Scores travel as new totals, never
/// deltas, so replaying or reordering these events stays last-write-wins.
fn set_score(state: &SharedState, origin: Option<Uuid>, team: TeamId, score: u32) {
    let (adjustment, rankings) = state.store().apply(|doc| {
        let old = doc.team(team).score;
        let mut changes = Vec::new();
        stage_field(
            doc,
            &mut changes,
            FieldPath::Team(team, TeamField::Score),
            Value::from(score),
        );
        ranking::refresh(doc);
        (
            (i64::from(score) - i64::from(old), ranking::payload(doc)),
            changes,
        )
    });

    state.broadcast(
        origin,
        ServerMessage::ScoreUpdate {
            team_id: team.get(),
            score,
            adjustment,
            correct: false,
        },
    );
    state.broadcast(origin, ServerMessage::RankingsUpdate { rankings });
}

fn update_team(
    state: &SharedState,
    origin: Option<Uuid>,
    team: TeamId,
    name: Option<String>,
    color: Option<TeamColor>,
) {
    let (name, color) = state.store().apply(|doc| {
        let mut changes = Vec::new();
        if let Some(name) = name {
            stage_field(
                doc,
                &mut changes,
                FieldPath::Team(team, TeamField::Name),
                Value::from(name),
            );
        }
        if let Some(color) = color {
            stage_field(
                doc,
                &mut changes,
                FieldPath::Team(team, TeamField::Color),
                serde_json::to_value(color).unwrap_or(Value::Null),
            );
        }
        let team = doc.team(team);
        ((team.name.clone(), team.color), changes)
    });

    state.broadcast(
        origin,
        ServerMessage::TeamUpdate {
            team_id: team.get(),
            name,
            color,
        },
    );
}

fn update_question_set(
    state: &SharedState,
    origin: Option<Uuid>,
    set: u8,
    title: Option<String>,
    theme: Option<String>,
) {
    let result = state.store().apply(|doc| {
        if !doc.question_sets.contains_key(&set) {
            return (None, Vec::new());
        }
        let mut changes = Vec::new();
        if let Some(title) = title {
            stage_field(
                doc,
                &mut changes,
                FieldPath::QuestionSet(set, SetField::Title),
                Value::from(title),
            );
        }
        if let Some(theme) = theme {
            stage_field(
                doc,
                &mut changes,
                FieldPath::QuestionSet(set, SetField::Theme),
                Value::from(theme),
            );
        }
        let info = &doc.question_sets[&set];
        (Some((info.title.clone(), info.theme.clone())), changes)
    });

    let Some((title, theme)) = result else {
        debug!(set, "question set update ignored: set outside the board");
        return;
    };

    state.broadcast(
        origin,
        ServerMessage::QuestionSetUpdate {
            set_number: set,
            title,
            theme,
        },
    );
}

/// Merge a pushed full document over the current one, field by field: keys
/// the pushed document carries overwrite, everything else stays. The merged
/// result is re-broadcast so every client converges on it.
fn merge_full_state(state: &SharedState, origin: Option<Uuid>, document: Value) {
    let merged = {
        let current = state.store().snapshot();
        let mut merged = GameState::merged_with(current, document);
        ranking::refresh(&mut merged);
        merged
    };

    state.store().replace(merged.clone(), false);
    state.broadcast(
        origin,
        ServerMessage::GameStateSync {
            state: Box::new(merged),
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::state::AppState;
    use crate::state::game::Rank;
    use serde_json::json;

    fn shared_state() -> SharedState {
        AppState::new(AppConfig::default(), None)
    }

    fn team(raw: u8) -> TeamId {
        TeamId::new(raw).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn score_update_applies_absolute_value_and_rankings() {
        let state = shared_state();

        dispatch(
            &state,
            Uuid::new_v4(),
            ClientMessage::ScoreUpdate {
                team_id: 3,
                score: 5,
            },
        );

        state.store().read(|doc| {
            assert_eq!(doc.team(team(3)).score, 5);
            assert_eq!(doc.rankings[&team(3)].rank, Rank::First);
        });
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_team_ids_are_no_ops() {
        let state = shared_state();

        dispatch(
            &state,
            Uuid::new_v4(),
            ClientMessage::BuzzerPressed { team_id: 0 },
        );
        dispatch(
            &state,
            Uuid::new_v4(),
            ClientMessage::ScoreUpdate {
                team_id: 9,
                score: 5,
            },
        );

        state.store().read(|doc| {
            assert_eq!(doc.current_team, None);
            for id in TeamId::all() {
                assert_eq!(doc.team(id).score, 0);
            }
        });
    }

    #[tokio::test(start_paused = true)]
    async fn get_server_state_answers_with_the_full_document() {
        let state = shared_state();
        dispatch(
            &state,
            Uuid::new_v4(),
            ClientMessage::ScoreUpdate {
                team_id: 1,
                score: 2,
            },
        );

        let reply = dispatch(&state, Uuid::new_v4(), ClientMessage::GetServerState);
        match reply {
            Some(ServerMessage::ServerStateResponse { state: document }) => {
                assert_eq!(document.team(team(1)).score, 2);
            }
            other => panic!("expected server state response, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn full_state_sync_merges_only_pushed_fields() {
        let state = shared_state();
        dispatch(
            &state,
            Uuid::new_v4(),
            ClientMessage::ScoreUpdate {
                team_id: 2,
                score: 4,
            },
        );

        dispatch(
            &state,
            Uuid::new_v4(),
            ClientMessage::GameStateSync {
                state: json!({"currentSet": 7}),
            },
        );

        state.store().read(|doc| {
            assert_eq!(doc.current_set, 7);
            // Fields the pushed document did not carry are untouched.
            assert_eq!(doc.team(team(2)).score, 4);
        });
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_events_stay_last_write_wins() {
        let state = shared_state();
        let message = ClientMessage::ScoreUpdate {
            team_id: 4,
            score: 6,
        };

        dispatch(&state, Uuid::new_v4(), message.clone());
        dispatch(&state, Uuid::new_v4(), message);

        state
            .store()
            .read(|doc| assert_eq!(doc.team(team(4)).score, 6));
    }

    #[tokio::test(start_paused = true)]
    async fn navigate_steps_the_cursor() {
        use crate::dto::common::StepDirection;

        let state = shared_state();
        dispatch(
            &state,
            Uuid::new_v4(),
            ClientMessage::Navigate {
                direction: StepDirection::Next,
            },
        );

        // Let the movement animation flag clear.
        tokio::time::sleep(std::time::Duration::from_secs(3)).await;
        state.store().read(|doc| {
            assert_eq!(doc.current_set, 1);
            assert_eq!(doc.current_question, 2);
            assert!(!doc.is_animating);
        });
    }

    #[tokio::test(start_paused = true)]
    async fn team_update_edits_roster_fields() {
        let state = shared_state();

        dispatch(
            &state,
            Uuid::new_v4(),
            ClientMessage::TeamUpdate {
                team_id: 5,
                name: Some("The Impostors".into()),
                color: None,
            },
        );

        state.store().read(|doc| {
            assert_eq!(doc.team(team(5)).name, "The Impostors");
        });
    }
}
