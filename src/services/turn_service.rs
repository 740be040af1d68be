//! Turn resolver: the rule engine behind every gameplay input.
//!
//! Each operation checks its preconditions against the current document and
//! either applies the transition or resolves to [`Outcome::Ignored`] — bad
//! team ids, actions without a buzzed team, and conflicting triggers are
//! logged no-ops, never errors. Mutations that the table couples to display
//! animations run as cancelable timed sequences, so a full reset can abort
//! them before they touch the fresh document.

use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::dto::ws::ServerMessage;
use crate::services::navigation;
use crate::services::{Outcome, ranking};
use crate::state::field::{FieldPath, TeamField};
use crate::state::game::{CardKind, GameState, Ranking, TeamId};
use crate::state::{FieldChange, SharedState, stage_field, stage_slot};

/// Clear the buzz lock and every transient card activation. Cross flags and
/// card availability are deliberately untouched.
fn clear_transients(doc: &mut GameState, changes: &mut Vec<FieldChange>) {
    stage_slot(doc, changes, FieldPath::CurrentTeam, None);
    stage_slot(doc, changes, FieldPath::CurrentChallenge, None);
    stage_slot(doc, changes, FieldPath::AngelTeam, None);
    stage_slot(doc, changes, FieldPath::AttackTeam, None);
    stage_slot(doc, changes, FieldPath::VictimTeam, None);
}

fn q1_status(doc: &GameState, set: u8) -> ServerMessage {
    ServerMessage::Q1Status {
        set_number: set,
        attempts: doc.q1_attempts.get(&set).copied().unwrap_or(0),
        failed_teams: doc
            .q1_failed_teams
            .get(&set)
            .map(|teams| teams.iter().map(|id| id.get()).collect())
            .unwrap_or_default(),
    }
}

/// A team presses its buzzer. First writer wins: while a team holds the
/// lock, later buzzes are rejected until a verdict or reset clears it.
pub fn buzz_in(state: &SharedState, origin: Option<Uuid>, team: TeamId) -> Outcome {
    let accepted = state.store().apply(|doc| {
        if doc.current_team.is_some() {
            return (false, Vec::new());
        }
        let mut changes = Vec::new();
        stage_slot(doc, &mut changes, FieldPath::CurrentTeam, Some(team));
        (true, changes)
    });

    if !accepted {
        debug!(%team, "buzz rejected: another team holds the lock");
        return Outcome::Ignored;
    }

    state.broadcast(origin, ServerMessage::BuzzerPressed { team_id: team.get() });

    // The overlay hides on its own; the buzz lock stays until resolved.
    let shared = state.clone();
    let overlay = state.config().delays.buzz_overlay();
    state.sequencer().spawn(async move {
        tokio::time::sleep(overlay).await;
        shared.broadcast(None, ServerMessage::BuzzerOverlayHide);
    });

    Outcome::Applied
}

/// The moderator judges the buzzed team's answer correct.
pub fn answer_correct(state: &SharedState, origin: Option<Uuid>, team: TeamId) -> Outcome {
    struct Plan {
        set: u8,
        question: u8,
        reward: u32,
        was_victim: bool,
    }

    let plan = state.store().apply(|doc| {
        if doc.current_team != Some(team) {
            return (None, Vec::new());
        }

        let question = doc.current_question;
        let is_challenge = doc.current_challenge == Some(team);
        let has_angel = doc.angel_team == Some(team);
        let was_victim = doc.victim_team == Some(team) && doc.attack_team.is_some();

        // An active angel on Q2-Q4 doubles the reward like a challenge.
        let reward = if is_challenge || (has_angel && question > 1) {
            2
        } else {
            1
        };

        let mut changes = Vec::new();
        if was_victim {
            // The attack resolves now; the victim's cross clears after the
            // score animation.
            stage_slot(doc, &mut changes, FieldPath::AttackTeam, None);
            stage_slot(doc, &mut changes, FieldPath::VictimTeam, None);
        }

        (
            Some(Plan {
                set: doc.current_set,
                question,
                reward,
                was_victim,
            }),
            changes,
        )
    });

    let Some(plan) = plan else {
        debug!(%team, "correct verdict ignored: team does not hold the buzz lock");
        return Outcome::Ignored;
    };

    state.broadcast(
        origin,
        ServerMessage::AnswerResult {
            team_id: team.get(),
            correct: true,
        },
    );

    let shared = state.clone();
    let delays = state.config().delays.clone();
    state.sequencer().spawn(async move {
        tokio::time::sleep(delays.answer_animation()).await;

        let (score, rankings) = shared.store().apply(|doc| {
            let old = doc.team(team).score;
            let new = old + plan.reward;
            let mut changes = Vec::new();
            stage_field(
                doc,
                &mut changes,
                FieldPath::Team(team, TeamField::Score),
                Value::from(new),
            );
            ranking::refresh(doc);
            ((new, ranking::payload(doc)), changes)
        });

        shared.broadcast(
            None,
            ServerMessage::ScoreUpdate {
                team_id: team.get(),
                score,
                adjustment: i64::from(plan.reward),
                correct: true,
            },
        );
        shared.broadcast(None, ServerMessage::RankingsUpdate { rankings });

        tokio::time::sleep(delays.score_delta()).await;
        shared.broadcast(
            None,
            ServerMessage::ScoreAnimation {
                amount: i64::from(plan.reward),
            },
        );

        if plan.was_victim {
            // The victim has answered; the protection is spent.
            shared.store().apply(|doc| {
                let mut changes = Vec::new();
                stage_field(
                    doc,
                    &mut changes,
                    FieldPath::ActionCard(team, CardKind::Cross),
                    Value::from(false),
                );
                ((), changes)
            });
            shared.broadcast(
                None,
                ServerMessage::CardUpdate {
                    team_id: team.get(),
                    card_type: CardKind::Cross,
                    status: false,
                },
            );
        }

        navigate_after_correct(&shared, plan.set, plan.question);
    });

    Outcome::Applied
}

/// Smart navigation after a correct answer: walk the set in order, and cross
/// to the next set's first question (buzzers reset first) from the last one.
fn navigate_after_correct(state: &SharedState, set: u8, question: u8) {
    let (questions_per_set, total_sets) = state
        .store()
        .read(|doc| (doc.config.questions_per_set, doc.config.total_sets));

    if question < questions_per_set {
        navigation::move_to(state, None, set, question + 1, true);
    } else {
        reset_buzzers(state, None);
        navigation::move_to(state, None, (set + 1).min(total_sets), 1, true);
    }
}

/// The moderator judges the buzzed team's answer incorrect.
pub fn answer_incorrect(state: &SharedState, origin: Option<Uuid>, team: TeamId) -> Outcome {
    #[derive(Clone, Copy, PartialEq)]
    enum PenaltyKind {
        Minus,
        Protected,
        None,
    }

    struct Plan {
        set: u8,
        question: u8,
        attacker: Option<TeamId>,
        penalty: PenaltyKind,
    }

    let (plan, q1_event) = state.store().apply(|doc| {
        if doc.current_team != Some(team) {
            return ((None, None), Vec::new());
        }

        let set = doc.current_set;
        let question = doc.current_question;
        let is_challenge = doc.current_challenge == Some(team);
        let has_angel = doc.angel_team == Some(team);
        let attacker = if doc.victim_team == Some(team) {
            doc.attack_team
        } else {
            None
        };

        let mut changes = Vec::new();

        if has_angel {
            // Protection is consumed the moment it absorbs a wrong answer.
            stage_field(
                doc,
                &mut changes,
                FieldPath::ActionCard(team, CardKind::Angel),
                Value::from(false),
            );
            stage_slot(doc, &mut changes, FieldPath::AngelTeam, None);
        }

        if let Some(attacking) = attacker {
            stage_slot(doc, &mut changes, FieldPath::AttackTeam, None);
            stage_slot(doc, &mut changes, FieldPath::VictimTeam, None);
            if !doc.cards(team).cross {
                stage_field(
                    doc,
                    &mut changes,
                    FieldPath::ActionCard(team, CardKind::Cross),
                    Value::from(true),
                );
            }
            if question == 1 {
                // A failed bonus question burns a chance for both sides.
                doc.record_q1_failure(set, team);
                doc.record_q1_failure(set, attacking);
            }
        } else if question == 1 {
            doc.record_q1_failure(set, team);
        }

        let penalty = if attacker.is_some() {
            if has_angel {
                PenaltyKind::Protected
            } else {
                PenaltyKind::Minus
            }
        } else if has_angel {
            // Angel takes precedence over challenge.
            PenaltyKind::Protected
        } else if is_challenge {
            PenaltyKind::Minus
        } else if question == 1 {
            PenaltyKind::Minus
        } else {
            PenaltyKind::None
        };

        let q1_event = (question == 1).then(|| q1_status(doc, set));
        (
            (
                Some(Plan {
                    set,
                    question,
                    attacker,
                    penalty,
                }),
                q1_event,
            ),
            changes,
        )
    });

    let Some(plan) = plan else {
        debug!(%team, "incorrect verdict ignored: team does not hold the buzz lock");
        return Outcome::Ignored;
    };

    state.broadcast(
        origin,
        ServerMessage::AnswerResult {
            team_id: team.get(),
            correct: false,
        },
    );
    if let Some(event) = q1_event {
        state.broadcast(origin, event);
    }

    if plan.penalty == PenaltyKind::None && plan.attacker.is_none() {
        // Q2-Q4 without challenge or angel: no penalty, no animation, the
        // board moves on immediately.
        auto_navigate_after_incorrect(state, plan.set, plan.question);
        return Outcome::Applied;
    }

    let shared = state.clone();
    let delays = state.config().delays.clone();
    state.sequencer().spawn(async move {
        tokio::time::sleep(delays.answer_animation()).await;

        struct Scores {
            attacker: Option<(TeamId, u32)>,
            victim: Option<(TeamId, u32)>,
            rankings: std::collections::BTreeMap<u8, Ranking>,
        }

        let scores = shared.store().apply(|doc| {
            let mut changes = Vec::new();

            let attacker = plan.attacker.map(|attacking| {
                let new = doc.team(attacking).score + 2;
                stage_field(
                    doc,
                    &mut changes,
                    FieldPath::Team(attacking, TeamField::Score),
                    Value::from(new),
                );
                (attacking, new)
            });

            let victim = (plan.penalty == PenaltyKind::Minus).then(|| {
                let new = doc.team(team).score.saturating_sub(1);
                stage_field(
                    doc,
                    &mut changes,
                    FieldPath::Team(team, TeamField::Score),
                    Value::from(new),
                );
                (team, new)
            });

            ranking::refresh(doc);
            (
                Scores {
                    attacker,
                    victim,
                    rankings: ranking::payload(doc),
                },
                changes,
            )
        });

        if let Some((attacking, score)) = scores.attacker {
            shared.broadcast(
                None,
                ServerMessage::ScoreUpdate {
                    team_id: attacking.get(),
                    score,
                    adjustment: 2,
                    correct: false,
                },
            );
        }
        if let Some((penalized, score)) = scores.victim {
            shared.broadcast(
                None,
                ServerMessage::ScoreUpdate {
                    team_id: penalized.get(),
                    score,
                    adjustment: -1,
                    correct: false,
                },
            );
        }
        if scores.attacker.is_some() || scores.victim.is_some() {
            shared.broadcast(
                None,
                ServerMessage::RankingsUpdate {
                    rankings: scores.rankings,
                },
            );
        }

        tokio::time::sleep(delays.score_delta()).await;
        match plan.penalty {
            PenaltyKind::Minus => {
                shared.broadcast(None, ServerMessage::ScoreAnimation { amount: -1 });
            }
            PenaltyKind::Protected => {
                shared.broadcast(
                    None,
                    ServerMessage::ProtectionAnimation { team_id: team.get() },
                );
            }
            PenaltyKind::None => {}
        }

        if plan.attacker.is_some() {
            // The victim has answered; the protection is spent.
            shared.store().apply(|doc| {
                let mut changes = Vec::new();
                stage_field(
                    doc,
                    &mut changes,
                    FieldPath::ActionCard(team, CardKind::Cross),
                    Value::from(false),
                );
                ((), changes)
            });
            shared.broadcast(
                None,
                ServerMessage::CardUpdate {
                    team_id: team.get(),
                    card_type: CardKind::Cross,
                    status: false,
                },
            );
        }

        auto_navigate_after_incorrect(&shared, plan.set, plan.question);
    });

    Outcome::Applied
}

/// Q1-chances-aware navigation after an incorrect answer.
///
/// On the first question the set tolerates three incorrect attempts before
/// the board abandons it for the next set. Anywhere else the board moves to
/// the next set's first question immediately. Buzzers reset first in every
/// case.
fn auto_navigate_after_incorrect(state: &SharedState, set: u8, question: u8) {
    reset_buzzers(state, None);

    let total_sets = state.store().read(|doc| doc.config.total_sets);
    let next_set = (set + 1).min(total_sets);

    if question == 1 {
        enum Decision {
            Stay(ServerMessage),
            Advance,
        }

        let decision = state.store().apply(|doc| {
            let attempts = doc.q1_attempts.get(&set).copied().unwrap_or(0);
            if attempts + 1 >= 3 {
                return (Decision::Advance, Vec::new());
            }
            let mut changes = Vec::new();
            stage_field(
                doc,
                &mut changes,
                FieldPath::Q1Attempts(set),
                Value::from(attempts + 1),
            );
            (Decision::Stay(q1_status(doc, set)), changes)
        });

        match decision {
            Decision::Stay(event) => state.broadcast(None, event),
            Decision::Advance if next_set == set => {
                // Last set: nowhere to advance, the chances just recycle.
                state.store().apply(|doc| {
                    doc.clear_q1_tracking(set);
                    let mut changes = Vec::new();
                    stage_field(doc, &mut changes, FieldPath::Q1Attempts(set), Value::from(0u8));
                    ((), changes)
                });
                state.broadcast(
                    None,
                    ServerMessage::Q1Status {
                        set_number: set,
                        attempts: 0,
                        failed_teams: Vec::new(),
                    },
                );
            }
            Decision::Advance => {
                navigation::move_to(state, None, next_set, 1, true);
            }
        }
    } else {
        navigation::move_to(state, None, next_set, 1, true);
    }
}

/// Toggle the buzzed team's angel activation.
///
/// Activating on Q2-Q4 also couples challenge mode onto the team; turning the
/// angel back off releases that coupling when this team was its source.
pub fn toggle_angel(state: &SharedState, origin: Option<Uuid>, team: TeamId) -> Outcome {
    let result = state.store().apply(|doc| {
        if doc.current_team != Some(team) || !doc.cards(team).angel {
            return (None, Vec::new());
        }

        let activating = doc.angel_team != Some(team);
        let mut changes = Vec::new();
        stage_slot(
            doc,
            &mut changes,
            FieldPath::AngelTeam,
            activating.then_some(team),
        );

        let mut challenge = None;
        if activating && doc.current_question > 1 && doc.current_challenge != Some(team) {
            stage_slot(doc, &mut changes, FieldPath::CurrentChallenge, Some(team));
            challenge = Some(true);
        } else if !activating && doc.current_challenge == Some(team) {
            stage_slot(doc, &mut changes, FieldPath::CurrentChallenge, None);
            challenge = Some(false);
        }

        (Some((activating, challenge)), changes)
    });

    let Some((active, challenge)) = result else {
        debug!(%team, "angel toggle ignored");
        return Outcome::Ignored;
    };

    state.broadcast(
        origin,
        ServerMessage::AngelActivated {
            team_id: team.get(),
            active,
        },
    );
    if let Some(active) = challenge {
        state.broadcast(
            origin,
            ServerMessage::ChallengeActivated {
                team_id: team.get(),
                active,
            },
        );
    }

    Outcome::Applied
}

/// Flip challenge mode for the buzzed team.
pub fn toggle_challenge(state: &SharedState, origin: Option<Uuid>, team: TeamId) -> Outcome {
    let result = state.store().apply(|doc| {
        if doc.current_team != Some(team) {
            return (None, Vec::new());
        }
        let activating = doc.current_challenge != Some(team);
        let mut changes = Vec::new();
        stage_slot(
            doc,
            &mut changes,
            FieldPath::CurrentChallenge,
            activating.then_some(team),
        );
        (Some(activating), changes)
    });

    let Some(active) = result else {
        debug!(%team, "challenge toggle ignored");
        return Outcome::Ignored;
    };

    state.broadcast(
        origin,
        ServerMessage::ChallengeActivated {
            team_id: team.get(),
            active,
        },
    );
    Outcome::Applied
}

/// Open devil-attack target selection for the buzzed team.
///
/// Blocked while another attack is in flight. The candidate list excludes
/// the attacker itself and every team holding an active cross.
pub fn open_devil_attack(state: &SharedState, origin: Option<Uuid>, team: TeamId) -> Outcome {
    let candidates = state.store().apply(|doc| {
        if doc.current_team != Some(team) || !doc.cards(team).devil {
            return (None, Vec::new());
        }
        if doc.attack_team.is_some() || doc.victim_team.is_some() {
            return (None, Vec::new());
        }

        let mut changes = Vec::new();
        stage_slot(doc, &mut changes, FieldPath::AttackTeam, Some(team));
        (Some(doc.attack_candidates(team)), changes)
    });

    let Some(candidates) = candidates else {
        debug!(%team, "devil attack open ignored");
        return Outcome::Ignored;
    };

    state.broadcast(
        origin,
        ServerMessage::DevilAttackOpen {
            team_id: team.get(),
            candidates: candidates.iter().map(|id| id.get()).collect(),
        },
    );
    Outcome::Applied
}

/// Confirm a devil attack: spend the attacker's card, shield the victim with
/// a cross, and pass control to the victim once the cut-scene finishes.
pub fn confirm_devil_attack(
    state: &SharedState,
    origin: Option<Uuid>,
    attacker: TeamId,
    victim: TeamId,
) -> Outcome {
    let accepted = state.store().apply(|doc| {
        if doc.attack_team != Some(attacker) || doc.victim_team.is_some() {
            return (false, Vec::new());
        }
        if attacker == victim || doc.cards(victim).cross || !doc.cards(attacker).devil {
            return (false, Vec::new());
        }

        let mut changes = Vec::new();
        stage_field(
            doc,
            &mut changes,
            FieldPath::ActionCard(attacker, CardKind::Devil),
            Value::from(false),
        );
        stage_field(
            doc,
            &mut changes,
            FieldPath::ActionCard(victim, CardKind::Cross),
            Value::from(true),
        );
        stage_slot(doc, &mut changes, FieldPath::VictimTeam, Some(victim));
        (true, changes)
    });

    if !accepted {
        debug!(%attacker, %victim, "devil attack confirmation ignored");
        return Outcome::Ignored;
    }

    state.broadcast(
        origin,
        ServerMessage::CardUpdate {
            team_id: attacker.get(),
            card_type: CardKind::Devil,
            status: false,
        },
    );
    state.broadcast(
        origin,
        ServerMessage::CardUpdate {
            team_id: victim.get(),
            card_type: CardKind::Cross,
            status: true,
        },
    );
    state.broadcast(
        origin,
        ServerMessage::DevilAttack {
            attacking_team: attacker.get(),
            target_team: victim.get(),
        },
    );
    state.broadcast(
        origin,
        ServerMessage::AttackAnimation {
            attacking_team: attacker.get(),
            target_team: victim.get(),
        },
    );

    // Control passes to the victim once the cut-scene has played out.
    let shared = state.clone();
    let cut_scene = state.config().delays.attack_animation();
    state.sequencer().spawn(async move {
        tokio::time::sleep(cut_scene).await;
        shared.store().apply(|doc| {
            let mut changes = Vec::new();
            stage_slot(doc, &mut changes, FieldPath::CurrentTeam, Some(victim));
            ((), changes)
        });
        shared.broadcast(
            None,
            ServerMessage::BuzzerPressed {
                team_id: victim.get(),
            },
        );
    });

    Outcome::Applied
}

/// Abandon an open devil-attack selection; no card state changes.
pub fn cancel_devil_attack(state: &SharedState, origin: Option<Uuid>) -> Outcome {
    let cancelled = state.store().apply(|doc| {
        if doc.attack_team.is_none() || doc.victim_team.is_some() {
            return (false, Vec::new());
        }
        let mut changes = Vec::new();
        stage_slot(doc, &mut changes, FieldPath::AttackTeam, None);
        (true, changes)
    });

    if !cancelled {
        debug!("devil attack cancel ignored");
        return Outcome::Ignored;
    }

    state.broadcast(origin, ServerMessage::DevilAttackCancel);
    Outcome::Applied
}

/// Clear the buzz lock and transient activations. Cross flags and card
/// availability survive; only a verdict or a full reset may touch those.
pub fn reset_buzzers(state: &SharedState, origin: Option<Uuid>) -> Outcome {
    state.store().apply(|doc| {
        let mut changes = Vec::new();
        clear_transients(doc, &mut changes);
        ((), changes)
    });

    state.broadcast(origin, ServerMessage::ClearBuzzers);
    Outcome::Applied
}

/// Restore every team's action cards to their initial state and drop any
/// transient activation referring to them.
pub fn action_cards_reset(state: &SharedState, origin: Option<Uuid>) -> Outcome {
    let cards = state.store().apply(|doc| {
        let mut changes = Vec::new();
        for team in TeamId::all() {
            stage_field(
                doc,
                &mut changes,
                FieldPath::ActionCard(team, CardKind::Angel),
                Value::from(true),
            );
            stage_field(
                doc,
                &mut changes,
                FieldPath::ActionCard(team, CardKind::Devil),
                Value::from(true),
            );
            stage_field(
                doc,
                &mut changes,
                FieldPath::ActionCard(team, CardKind::Cross),
                Value::from(false),
            );
        }
        stage_slot(doc, &mut changes, FieldPath::AngelTeam, None);
        stage_slot(doc, &mut changes, FieldPath::AttackTeam, None);
        stage_slot(doc, &mut changes, FieldPath::VictimTeam, None);

        let cards = doc
            .action_cards
            .iter()
            .map(|(id, set)| (id.get(), *set))
            .collect();
        (cards, changes)
    });

    state.broadcast(origin, ServerMessage::ActionCardsReset { cards });
    Outcome::Applied
}

/// Full game reset: cancel every pending sequence and the countdown, reload
/// the default document, and clear the persisted snapshot.
///
/// Guarded by a reentrancy latch — reset cascades through navigation and
/// broadcast handlers that could re-trigger it — with a timed auto-clear as
/// a safety net against the latch sticking.
pub fn admin_reset(state: &SharedState, origin: Option<Uuid>) -> Outcome {
    if !state.begin_reset() {
        debug!("admin reset ignored: reset already in progress");
        return Outcome::Ignored;
    }

    state.sequencer().cancel_all();
    state.abort_timer_task();
    state.store().replace(state.fresh_state(), true);
    state.broadcast(origin, ServerMessage::AdminReset);

    // Deliberately not tracked by the sequencer: a second reset's cancel_all
    // must not be able to strand the latch.
    let shared = state.clone();
    let latch = state.config().delays.reset_latch();
    tokio::spawn(async move {
        tokio::time::sleep(latch).await;
        shared.end_reset();
    });

    Outcome::Applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, DelayTable};
    use crate::state::AppState;
    use std::time::Duration;

    fn team(raw: u8) -> TeamId {
        TeamId::new(raw).unwrap()
    }

    /// Test state with short, nonzero delays so paused-clock tests can step
    /// through the sequences deterministically.
    fn shared_state() -> SharedState {
        let config = AppConfig {
            delays: DelayTable {
                answer_animation_ms: 100,
                score_delta_ms: 10,
                buzz_overlay_ms: 50,
                movement_ms: 20,
                attack_animation_ms: 30,
                reset_latch_ms: 40,
            },
            ..AppConfig::default()
        };
        AppState::new(config, None)
    }

    /// Let every pending sequence run to completion on the paused clock.
    async fn settle(_state: &SharedState) {
        tokio::time::sleep(Duration::from_secs(5)).await;
    }

    fn score(state: &SharedState, raw: u8) -> u32 {
        state.store().read(|doc| doc.team(team(raw)).score)
    }

    #[tokio::test(start_paused = true)]
    async fn buzz_lock_is_first_writer_wins() {
        let state = shared_state();

        assert_eq!(buzz_in(&state, None, team(1)), Outcome::Applied);
        assert_eq!(buzz_in(&state, None, team(2)), Outcome::Ignored);
        assert_eq!(
            state.store().read(|doc| doc.current_team),
            Some(team(1))
        );

        reset_buzzers(&state, None);
        assert_eq!(buzz_in(&state, None, team(2)), Outcome::Applied);
        settle(&state).await;
    }

    #[tokio::test(start_paused = true)]
    async fn correct_answer_scores_and_advances() {
        let state = shared_state();

        buzz_in(&state, None, team(1));
        assert_eq!(answer_correct(&state, None, team(1)), Outcome::Applied);
        settle(&state).await;

        assert_eq!(score(&state, 1), 1);
        state.store().read(|doc| {
            assert_eq!(doc.current_set, 1);
            assert_eq!(doc.current_question, 2);
        });
    }

    #[tokio::test(start_paused = true)]
    async fn correct_without_buzz_is_ignored() {
        let state = shared_state();
        assert_eq!(answer_correct(&state, None, team(1)), Outcome::Ignored);
        assert_eq!(score(&state, 1), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn challenge_doubles_the_reward() {
        let state = shared_state();

        buzz_in(&state, None, team(2));
        toggle_challenge(&state, None, team(2));
        answer_correct(&state, None, team(2));
        settle(&state).await;

        assert_eq!(score(&state, 2), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn q1_incorrect_clamps_score_at_zero_and_burns_a_chance() {
        let state = shared_state();

        buzz_in(&state, None, team(2));
        assert_eq!(answer_incorrect(&state, None, team(2)), Outcome::Applied);
        settle(&state).await;

        assert_eq!(score(&state, 2), 0);
        state.store().read(|doc| {
            assert_eq!(doc.q1_attempts.get(&1), Some(&1));
            assert_eq!(doc.current_set, 1);
            assert_eq!(doc.current_question, 1);
            assert_eq!(doc.current_team, None);
            assert!(doc.q1_failed_teams[&1].contains(&team(2)));
        });
    }

    #[tokio::test(start_paused = true)]
    async fn three_q1_failures_abandon_the_set() {
        let state = shared_state();

        for raw in [1u8, 2, 3] {
            buzz_in(&state, None, team(raw));
            answer_incorrect(&state, None, team(raw));
            settle(&state).await;
        }

        state.store().read(|doc| {
            assert_eq!(doc.current_set, 2);
            assert_eq!(doc.current_question, 1);
            // Advancing dropped the abandoned set's bookkeeping.
            assert_eq!(doc.q1_attempts.get(&1), None);
            assert_eq!(doc.q1_failed_teams.get(&1), None);
        });
    }

    #[tokio::test(start_paused = true)]
    async fn non_q1_incorrect_moves_to_next_set_without_penalty() {
        let state = shared_state();
        navigation::move_to(&state, None, 1, 3, false);

        buzz_in(&state, None, team(4));
        answer_incorrect(&state, None, team(4));
        settle(&state).await;

        assert_eq!(score(&state, 4), 0);
        state.store().read(|doc| {
            assert_eq!(doc.current_set, 2);
            assert_eq!(doc.current_question, 1);
        });
    }

    #[tokio::test(start_paused = true)]
    async fn angel_protects_and_is_consumed() {
        let state = shared_state();
        navigation::move_to(&state, None, 1, 2, false);

        // Give the team something to lose.
        state.store().apply(|doc| {
            doc.teams.get_mut(&team(3)).unwrap().score = 2;
            ((), Vec::new())
        });

        buzz_in(&state, None, team(3));
        toggle_angel(&state, None, team(3));
        // Activating the angel on Q2 couples challenge mode.
        state.store().read(|doc| {
            assert_eq!(doc.angel_team, Some(team(3)));
            assert_eq!(doc.current_challenge, Some(team(3)));
        });

        answer_incorrect(&state, None, team(3));
        settle(&state).await;

        assert_eq!(score(&state, 3), 2);
        state.store().read(|doc| {
            assert!(!doc.cards(team(3)).angel);
            assert_eq!(doc.angel_team, None);
        });
    }

    #[tokio::test(start_paused = true)]
    async fn angel_without_card_is_ignored() {
        let state = shared_state();
        state.store().apply(|doc| {
            doc.action_cards.get_mut(&team(1)).unwrap().angel = false;
            ((), Vec::new())
        });

        buzz_in(&state, None, team(1));
        assert_eq!(toggle_angel(&state, None, team(1)), Outcome::Ignored);
        settle(&state).await;
    }

    #[tokio::test(start_paused = true)]
    async fn challenge_only_incorrect_costs_a_point() {
        let state = shared_state();
        navigation::move_to(&state, None, 1, 2, false);
        state.store().apply(|doc| {
            doc.teams.get_mut(&team(5)).unwrap().score = 3;
            ((), Vec::new())
        });

        buzz_in(&state, None, team(5));
        toggle_challenge(&state, None, team(5));
        answer_incorrect(&state, None, team(5));
        settle(&state).await;

        assert_eq!(score(&state, 5), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn devil_attack_rewards_attacker_and_penalizes_victim() {
        let state = shared_state();
        state.store().apply(|doc| {
            doc.teams.get_mut(&team(2)).unwrap().score = 3;
            ((), Vec::new())
        });

        buzz_in(&state, None, team(1));
        assert_eq!(open_devil_attack(&state, None, team(1)), Outcome::Applied);
        assert_eq!(
            confirm_devil_attack(&state, None, team(1), team(2)),
            Outcome::Applied
        );
        settle(&state).await;

        // Control passed to the victim after the cut-scene.
        state.store().read(|doc| {
            assert_eq!(doc.current_team, Some(team(2)));
            assert!(!doc.cards(team(1)).devil);
            assert!(doc.cards(team(2)).cross);
        });

        answer_incorrect(&state, None, team(2));
        settle(&state).await;

        assert_eq!(score(&state, 1), 2);
        assert_eq!(score(&state, 2), 2);
        state.store().read(|doc| {
            // The victim answered, so the protection is spent.
            assert!(!doc.cards(team(2)).cross);
            assert_eq!(doc.attack_team, None);
            assert_eq!(doc.victim_team, None);
        });
    }

    #[tokio::test(start_paused = true)]
    async fn protected_victim_keeps_points_and_loses_angel() {
        let state = shared_state();
        state.store().apply(|doc| {
            doc.teams.get_mut(&team(2)).unwrap().score = 3;
            ((), Vec::new())
        });

        buzz_in(&state, None, team(1));
        open_devil_attack(&state, None, team(1));
        confirm_devil_attack(&state, None, team(1), team(2));
        settle(&state).await;

        // The victim shields with its angel before answering.
        toggle_angel(&state, None, team(2));
        answer_incorrect(&state, None, team(2));
        settle(&state).await;

        assert_eq!(score(&state, 1), 2);
        assert_eq!(score(&state, 2), 3);
        state.store().read(|doc| assert!(!doc.cards(team(2)).angel));
    }

    #[tokio::test(start_paused = true)]
    async fn victims_cross_survives_buzzer_resets() {
        let state = shared_state();

        buzz_in(&state, None, team(1));
        open_devil_attack(&state, None, team(1));
        confirm_devil_attack(&state, None, team(1), team(2));
        settle(&state).await;

        for _ in 0..3 {
            reset_buzzers(&state, None);
        }
        state.store().read(|doc| {
            assert!(doc.cards(team(2)).cross);
            assert_eq!(doc.current_team, None);
        });
    }

    #[tokio::test(start_paused = true)]
    async fn protected_teams_cannot_be_targeted() {
        let state = shared_state();
        state.store().apply(|doc| {
            doc.action_cards.get_mut(&team(3)).unwrap().cross = true;
            ((), Vec::new())
        });

        buzz_in(&state, None, team(1));
        open_devil_attack(&state, None, team(1));
        assert_eq!(
            confirm_devil_attack(&state, None, team(1), team(3)),
            Outcome::Ignored
        );
        assert_eq!(
            confirm_devil_attack(&state, None, team(1), team(1)),
            Outcome::Ignored
        );
        settle(&state).await;
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_releases_the_provisional_attack() {
        let state = shared_state();

        buzz_in(&state, None, team(1));
        open_devil_attack(&state, None, team(1));
        assert_eq!(cancel_devil_attack(&state, None), Outcome::Applied);
        state.store().read(|doc| {
            assert_eq!(doc.attack_team, None);
            assert!(doc.cards(team(1)).devil);
        });
        settle(&state).await;
    }

    #[tokio::test(start_paused = true)]
    async fn admin_reset_reloads_defaults_and_cancels_sequences() {
        let state = shared_state();

        buzz_in(&state, None, team(1));
        // A correct answer's score application is pending when reset fires.
        answer_correct(&state, None, team(1));
        assert_eq!(admin_reset(&state, None), Outcome::Applied);
        // Latched while resetting.
        assert_eq!(admin_reset(&state, None), Outcome::Ignored);
        settle(&state).await;

        // The canceled sequence never applied its score.
        assert_eq!(score(&state, 1), 0);
        state.store().read(|doc| {
            assert_eq!(doc.current_set, 1);
            assert_eq!(doc.current_question, 1);
            assert_eq!(doc.current_team, None);
        });
        // Latch auto-cleared; the next reset goes through.
        assert_eq!(admin_reset(&state, None), Outcome::Applied);
        settle(&state).await;
    }

    #[tokio::test(start_paused = true)]
    async fn scores_never_go_negative() {
        let state = shared_state();

        for _ in 0..3 {
            buzz_in(&state, None, team(6));
            answer_incorrect(&state, None, team(6));
            settle(&state).await;
            // Walk back to a first question for the next penalty round.
            navigation::move_to(&state, None, 1, 1, false);
        }

        assert_eq!(score(&state, 6), 0);
    }
}
