//! WebSocket wire protocol: inbound client intents and outbound broadcasts.
//!
//! Event names and payload shapes follow the original transport (tagged JSON
//! objects, camelCase fields, raw numeric team ids with `0` meaning "none").
//! Team ids arriving from clients are plain `u8`s validated at dispatch time;
//! unknown event types decode to [`ClientMessage::Unknown`] and are ignored
//! with a log line rather than killing the connection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::dto::common::{ClientRole, Direction, StepDirection};
use crate::state::game::{ActionCardSet, CardKind, GameState, Ranking, TeamColor};

/// Messages accepted from connected clients.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// First frame of every connection, declaring the client kind.
    #[serde(rename_all = "camelCase")]
    Identification {
        /// Declared client kind.
        role: ClientRole,
    },
    /// A team pressed its buzzer.
    #[serde(rename_all = "camelCase")]
    BuzzerPressed {
        /// Buzzing team.
        team_id: u8,
    },
    /// Moderator verdict on the buzzed team's answer.
    #[serde(rename_all = "camelCase")]
    AnswerResult {
        /// Team being judged.
        team_id: u8,
        /// Whether the answer was correct.
        correct: bool,
    },
    /// Direct score edit from the console (absolute value, never a delta).
    #[serde(rename_all = "camelCase")]
    ScoreUpdate {
        /// Team whose score changes.
        team_id: u8,
        /// New absolute score.
        score: u32,
    },
    /// Absolute timer state pushed by a client.
    #[serde(rename_all = "camelCase")]
    TimerUpdate {
        /// Seconds remaining.
        value: u32,
        /// Whether the countdown is ticking.
        running: bool,
    },
    /// Moderator timer controls.
    #[serde(rename_all = "camelCase")]
    TimerControl {
        /// Requested action.
        action: TimerAction,
        /// Seconds delta for [`TimerAction::Adjust`], absolute value for
        /// [`TimerAction::Set`].
        #[serde(default)]
        amount: i64,
    },
    /// Direct action-card flag edit from the console.
    #[serde(rename_all = "camelCase")]
    CardUpdate {
        /// Team owning the card.
        team_id: u8,
        /// Which card.
        card_type: CardKind,
        /// New availability/active flag.
        status: bool,
    },
    /// Navigate the board cursor.
    #[serde(rename_all = "camelCase")]
    ProgressUpdate {
        /// Target set.
        set_number: u8,
        /// Target question within the set.
        question_number: u8,
        /// Whether displays should play the run animation.
        #[serde(default)]
        animate_run: Option<bool>,
    },
    /// Step the cursor one question forward or back (moderator arrow keys).
    #[serde(rename_all = "camelCase")]
    Navigate {
        /// Which way to step.
        direction: StepDirection,
    },
    /// Toggle challenge mode for the buzzed team.
    #[serde(rename_all = "camelCase")]
    ChallengeActivated {
        /// Team toggling challenge mode.
        team_id: u8,
    },
    /// Toggle the angel card for the buzzed team.
    #[serde(rename_all = "camelCase")]
    AngelActivated {
        /// Team toggling its angel card.
        team_id: u8,
    },
    /// Open devil-attack target selection for the buzzed team.
    #[serde(rename_all = "camelCase")]
    DevilAttackOpen {
        /// Prospective attacker.
        team_id: u8,
    },
    /// Confirm a devil attack against a selected target.
    #[serde(rename_all = "camelCase")]
    DevilAttack {
        /// Attacking team.
        attacking_team: u8,
        /// Targeted team.
        target_team: u8,
    },
    /// Abandon the open devil-attack selection.
    DevilAttackCancel,
    /// Restore every team's action cards to their initial state.
    ActionCardsReset,
    /// Clear the buzz lock and transient card activations.
    ResetBuzzers,
    /// Alias of [`ClientMessage::ResetBuzzers`] kept for older consoles.
    ClearBuzzers,
    /// Full game reset.
    AdminReset,
    /// Edit a team's roster entry.
    #[serde(rename_all = "camelCase")]
    TeamUpdate {
        /// Team being edited.
        team_id: u8,
        /// New display name, when present.
        #[serde(default)]
        name: Option<String>,
        /// New color, when present.
        #[serde(default)]
        color: Option<TeamColor>,
    },
    /// Edit a question set's display metadata.
    #[serde(rename_all = "camelCase")]
    QuestionSetUpdate {
        /// Set being edited.
        set_number: u8,
        /// New title, when present.
        #[serde(default)]
        title: Option<String>,
        /// New theme key, when present.
        #[serde(default)]
        theme: Option<String>,
    },
    /// Display finished the timer-expired alarm.
    EmergencyMeetingDone,
    /// Request the full document; answered directly with
    /// [`ServerMessage::ServerStateResponse`].
    GetServerState,
    /// Push a full document for reconciliation (merged field-by-field).
    #[serde(rename_all = "camelCase")]
    GameStateSync {
        /// The document to merge.
        state: serde_json::Value,
    },
    /// Any event type this server does not understand.
    #[serde(other)]
    Unknown,
}

/// Timer control verbs folded into one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerAction {
    /// Start the countdown.
    Start,
    /// Stop the countdown and restore the remembered value.
    Stop,
    /// Reset value and remembered default to the configured duration.
    Reset,
    /// Nudge the value by `amount` seconds (floored at zero).
    Adjust,
    /// Set value and remembered default to `amount` seconds.
    Set,
}

/// Events broadcast to connected clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A team acquired the buzz lock.
    #[serde(rename_all = "camelCase")]
    BuzzerPressed {
        /// Buzzing team.
        team_id: u8,
    },
    /// The buzz overlay's auto-hide deadline passed.
    BuzzerOverlayHide,
    /// The moderator judged an answer; displays play the verdict animation.
    #[serde(rename_all = "camelCase")]
    AnswerResult {
        /// Judged team.
        team_id: u8,
        /// Verdict.
        correct: bool,
    },
    /// A team's score changed (absolute value plus the applied delta).
    #[serde(rename_all = "camelCase")]
    ScoreUpdate {
        /// Team whose score changed.
        team_id: u8,
        /// New absolute score.
        score: u32,
        /// Signed delta that was applied.
        adjustment: i64,
        /// Whether this came from a correct answer.
        correct: bool,
    },
    /// Displays play the coin (positive) or coin-minus (negative) animation.
    #[serde(rename_all = "camelCase")]
    ScoreAnimation {
        /// Signed score delta being animated.
        amount: i64,
    },
    /// Displays play the shield animation for a protected team.
    #[serde(rename_all = "camelCase")]
    ProtectionAnimation {
        /// Protected team.
        team_id: u8,
    },
    /// Displays play the devil-attack cut-scene.
    #[serde(rename_all = "camelCase")]
    AttackAnimation {
        /// Attacking team.
        attacking_team: u8,
        /// Victim team.
        target_team: u8,
    },
    /// Absolute timer state.
    #[serde(rename_all = "camelCase")]
    TimerUpdate {
        /// Seconds remaining.
        value: u32,
        /// Whether the countdown is ticking.
        running: bool,
    },
    /// The countdown hit zero; displays run the emergency-meeting alarm.
    TimerEnded,
    /// An action-card flag changed.
    #[serde(rename_all = "camelCase")]
    CardUpdate {
        /// Team owning the card.
        team_id: u8,
        /// Which card.
        card_type: CardKind,
        /// New flag value.
        status: bool,
    },
    /// Every team's cards were restored; carries the full card table.
    #[serde(rename_all = "camelCase")]
    ActionCardsReset {
        /// Card state per team after the reset.
        cards: BTreeMap<u8, ActionCardSet>,
    },
    /// The board cursor moved.
    #[serde(rename_all = "camelCase")]
    ProgressUpdate {
        /// New set.
        set_number: u8,
        /// New question.
        question_number: u8,
        /// Character position percent for the presentation layer.
        position: f32,
        /// Which way the character runs.
        direction: Direction,
        /// Whether displays should animate the move.
        animate_run: bool,
    },
    /// Q1 three-chances bookkeeping for the current set changed.
    #[serde(rename_all = "camelCase")]
    Q1Status {
        /// Set the bookkeeping belongs to.
        set_number: u8,
        /// Incorrect attempts consumed so far.
        attempts: u8,
        /// Teams grayed out after failing.
        failed_teams: Vec<u8>,
    },
    /// Challenge mode toggled.
    #[serde(rename_all = "camelCase")]
    ChallengeActivated {
        /// Team involved.
        team_id: u8,
        /// Whether challenge mode is now on.
        active: bool,
    },
    /// Angel activation toggled.
    #[serde(rename_all = "camelCase")]
    AngelActivated {
        /// Team involved.
        team_id: u8,
        /// Whether the angel is now active.
        active: bool,
    },
    /// Devil-attack target selection opened.
    #[serde(rename_all = "camelCase")]
    DevilAttackOpen {
        /// Prospective attacker.
        team_id: u8,
        /// Teams that may be targeted.
        candidates: Vec<u8>,
    },
    /// A devil attack was confirmed.
    #[serde(rename_all = "camelCase")]
    DevilAttack {
        /// Attacking team.
        attacking_team: u8,
        /// Victim team.
        target_team: u8,
    },
    /// The open devil-attack selection was abandoned.
    DevilAttackCancel,
    /// Buzz lock and transient activations cleared.
    ClearBuzzers,
    /// The whole game was reset to defaults.
    AdminReset,
    /// A roster entry changed; carries the resulting values.
    #[serde(rename_all = "camelCase")]
    TeamUpdate {
        /// Team that changed.
        team_id: u8,
        /// Current display name.
        name: String,
        /// Current color.
        color: TeamColor,
    },
    /// A question set's display metadata changed.
    #[serde(rename_all = "camelCase")]
    QuestionSetUpdate {
        /// Set that changed.
        set_number: u8,
        /// Current title.
        title: String,
        /// Current theme key.
        theme: String,
    },
    /// Derived rankings after a score change.
    #[serde(rename_all = "camelCase")]
    RankingsUpdate {
        /// Ranking entry per team.
        rankings: BTreeMap<u8, Ranking>,
    },
    /// Full document, answering [`ClientMessage::GetServerState`].
    #[serde(rename_all = "camelCase")]
    ServerStateResponse {
        /// The whole game document.
        state: Box<GameState>,
    },
    /// A reconciliation document pushed by one client, forwarded to the rest.
    #[serde(rename_all = "camelCase")]
    GameStateSync {
        /// The merged document now in effect.
        state: Box<GameState>,
    },
}

impl ServerMessage {
    /// Wire/SSE event name of this message.
    pub fn name(&self) -> &'static str {
        match self {
            ServerMessage::BuzzerPressed { .. } => "buzzer_pressed",
            ServerMessage::BuzzerOverlayHide => "buzzer_overlay_hide",
            ServerMessage::AnswerResult { .. } => "answer_result",
            ServerMessage::ScoreUpdate { .. } => "score_update",
            ServerMessage::ScoreAnimation { .. } => "score_animation",
            ServerMessage::ProtectionAnimation { .. } => "protection_animation",
            ServerMessage::AttackAnimation { .. } => "attack_animation",
            ServerMessage::TimerUpdate { .. } => "timer_update",
            ServerMessage::TimerEnded => "timer_ended",
            ServerMessage::CardUpdate { .. } => "card_update",
            ServerMessage::ActionCardsReset { .. } => "action_cards_reset",
            ServerMessage::ProgressUpdate { .. } => "progress_update",
            ServerMessage::Q1Status { .. } => "q1_status",
            ServerMessage::ChallengeActivated { .. } => "challenge_activated",
            ServerMessage::AngelActivated { .. } => "angel_activated",
            ServerMessage::DevilAttackOpen { .. } => "devil_attack_open",
            ServerMessage::DevilAttack { .. } => "devil_attack",
            ServerMessage::DevilAttackCancel => "devil_attack_cancel",
            ServerMessage::ClearBuzzers => "clear_buzzers",
            ServerMessage::AdminReset => "admin_reset",
            ServerMessage::TeamUpdate { .. } => "team_update",
            ServerMessage::QuestionSetUpdate { .. } => "question_set_update",
            ServerMessage::RankingsUpdate { .. } => "rankings_update",
            ServerMessage::ServerStateResponse { .. } => "server_state_response",
            ServerMessage::GameStateSync { .. } => "game_state_sync",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn inbound_events_use_original_wire_spelling() {
        let message: ClientMessage =
            serde_json::from_value(json!({"type": "buzzer_pressed", "teamId": 3})).unwrap();
        assert!(matches!(message, ClientMessage::BuzzerPressed { team_id: 3 }));

        let message: ClientMessage = serde_json::from_value(
            json!({"type": "progress_update", "setNumber": 2, "questionNumber": 4}),
        )
        .unwrap();
        assert!(matches!(
            message,
            ClientMessage::ProgressUpdate {
                set_number: 2,
                question_number: 4,
                animate_run: None,
            }
        ));
    }

    #[test]
    fn unknown_event_types_degrade_to_unknown() {
        let message: ClientMessage =
            serde_json::from_value(json!({"type": "log_update", "line": "hi"})).unwrap();
        assert!(matches!(message, ClientMessage::Unknown));
    }

    #[test]
    fn outbound_tag_matches_event_name() {
        let message = ServerMessage::ScoreUpdate {
            team_id: 1,
            score: 3,
            adjustment: 2,
            correct: true,
        };
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], json!(message.name()));
        assert_eq!(value["teamId"], json!(1));
        assert_eq!(value["adjustment"], json!(2));
    }

    #[test]
    fn card_update_round_trips() {
        let value = json!({"type": "card_update", "teamId": 2, "cardType": "cross", "status": true});
        let message: ClientMessage = serde_json::from_value(value).unwrap();
        assert!(matches!(
            message,
            ClientMessage::CardUpdate {
                team_id: 2,
                card_type: CardKind::Cross,
                status: true,
            }
        ));
    }
}
