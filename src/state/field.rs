//! Typed field addressing for the game document.
//!
//! The browser original addressed nested state with dot-separated strings
//! (`teams.3.score`). Those spellings survive on the wire and in subscription
//! keys, but inside the engine every addressable field is a [`FieldPath`]
//! variant, so the turn resolver gets exhaustive matches instead of string
//! comparisons and a typo cannot silently address nothing.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use thiserror::Error;

use crate::state::game::{CardKind, GameState, TeamId, team_slot_value};

/// Addressable sub-field of a [`Team`](crate::state::game::Team).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TeamField {
    /// `teams.N.score`
    Score,
    /// `teams.N.name`
    Name,
    /// `teams.N.color`
    Color,
}

/// Addressable sub-field of a question set entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetField {
    /// `questionSets.N.title`
    Title,
    /// `questionSets.N.theme`
    Theme,
}

/// One addressable field of the game document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldPath {
    /// Cursor set number.
    CurrentSet,
    /// Cursor question number.
    CurrentQuestion,
    /// Buzz lock holder.
    CurrentTeam,
    /// Challenge mode holder.
    CurrentChallenge,
    /// Temporary angel activation holder.
    AngelTeam,
    /// In-flight attack attacker.
    AttackTeam,
    /// In-flight attack victim.
    VictimTeam,
    /// Character movement mutual-exclusion flag.
    IsAnimating,
    /// Countdown value in seconds.
    TimerValue,
    /// Countdown running flag.
    TimerRunning,
    /// Remembered moderator-set timer value.
    DefaultTimerValue,
    /// Timer-expired alarm reentrancy guard.
    EmergencyMeetingActive,
    /// A team sub-field, e.g. `teams.3.score`.
    Team(TeamId, TeamField),
    /// An action card flag, e.g. `actionCards.2.cross`.
    ActionCard(TeamId, CardKind),
    /// A question set sub-field, e.g. `questionSets.4.title`.
    QuestionSet(u8, SetField),
    /// Q1 attempt counter for a set, e.g. `q1Attempts_4`.
    Q1Attempts(u8),
    /// Q1 failed-team list for a set, e.g. `q1FailedTeams_4`.
    Q1FailedTeams(u8),
}

/// Error raised when a path or a value does not fit the document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    /// The dot-path does not name a known field.
    #[error("unknown field path `{0}`")]
    UnknownPath(String),
    /// The value cannot be decoded into the addressed field's type.
    #[error("value for `{path}` is not a valid {expected}")]
    TypeMismatch {
        /// Path being written.
        path: String,
        /// Expected type description.
        expected: &'static str,
    },
    /// The path addresses a set outside the configured board.
    #[error("set `{0}` outside the configured board")]
    UnknownSet(u8),
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldPath::CurrentSet => write!(f, "currentSet"),
            FieldPath::CurrentQuestion => write!(f, "currentQuestion"),
            FieldPath::CurrentTeam => write!(f, "currentTeam"),
            FieldPath::CurrentChallenge => write!(f, "currentChallenge"),
            FieldPath::AngelTeam => write!(f, "angelTeam"),
            FieldPath::AttackTeam => write!(f, "attackTeam"),
            FieldPath::VictimTeam => write!(f, "victimTeam"),
            FieldPath::IsAnimating => write!(f, "isAnimating"),
            FieldPath::TimerValue => write!(f, "timerValue"),
            FieldPath::TimerRunning => write!(f, "timerRunning"),
            FieldPath::DefaultTimerValue => write!(f, "defaultTimerValue"),
            FieldPath::EmergencyMeetingActive => write!(f, "emergencyMeetingActive"),
            FieldPath::Team(id, TeamField::Score) => write!(f, "teams.{id}.score"),
            FieldPath::Team(id, TeamField::Name) => write!(f, "teams.{id}.name"),
            FieldPath::Team(id, TeamField::Color) => write!(f, "teams.{id}.color"),
            FieldPath::ActionCard(id, kind) => write!(f, "actionCards.{id}.{}", kind.as_str()),
            FieldPath::QuestionSet(set, SetField::Title) => write!(f, "questionSets.{set}.title"),
            FieldPath::QuestionSet(set, SetField::Theme) => write!(f, "questionSets.{set}.theme"),
            FieldPath::Q1Attempts(set) => write!(f, "q1Attempts_{set}"),
            FieldPath::Q1FailedTeams(set) => write!(f, "q1FailedTeams_{set}"),
        }
    }
}

impl FromStr for FieldPath {
    type Err = FieldError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let unknown = || FieldError::UnknownPath(input.to_string());

        match input {
            "currentSet" => return Ok(FieldPath::CurrentSet),
            "currentQuestion" => return Ok(FieldPath::CurrentQuestion),
            "currentTeam" => return Ok(FieldPath::CurrentTeam),
            "currentChallenge" => return Ok(FieldPath::CurrentChallenge),
            "angelTeam" => return Ok(FieldPath::AngelTeam),
            "attackTeam" => return Ok(FieldPath::AttackTeam),
            "victimTeam" => return Ok(FieldPath::VictimTeam),
            "isAnimating" => return Ok(FieldPath::IsAnimating),
            "timerValue" => return Ok(FieldPath::TimerValue),
            "timerRunning" => return Ok(FieldPath::TimerRunning),
            "defaultTimerValue" => return Ok(FieldPath::DefaultTimerValue),
            "emergencyMeetingActive" => return Ok(FieldPath::EmergencyMeetingActive),
            _ => {}
        }

        if let Some(rest) = input.strip_prefix("q1Attempts_") {
            return rest.parse().map(FieldPath::Q1Attempts).map_err(|_| unknown());
        }
        if let Some(rest) = input.strip_prefix("q1FailedTeams_") {
            return rest
                .parse()
                .map(FieldPath::Q1FailedTeams)
                .map_err(|_| unknown());
        }

        let mut parts = input.split('.');
        let (root, index, leaf) = (
            parts.next().ok_or_else(unknown)?,
            parts.next().ok_or_else(unknown)?,
            parts.next().ok_or_else(unknown)?,
        );
        if parts.next().is_some() {
            return Err(unknown());
        }

        match root {
            "teams" => {
                let id = parse_team(index).ok_or_else(unknown)?;
                let field = match leaf {
                    "score" => TeamField::Score,
                    "name" => TeamField::Name,
                    "color" => TeamField::Color,
                    _ => return Err(unknown()),
                };
                Ok(FieldPath::Team(id, field))
            }
            "actionCards" => {
                let id = parse_team(index).ok_or_else(unknown)?;
                let kind = match leaf {
                    "angel" => CardKind::Angel,
                    "devil" => CardKind::Devil,
                    "cross" => CardKind::Cross,
                    _ => return Err(unknown()),
                };
                Ok(FieldPath::ActionCard(id, kind))
            }
            "questionSets" => {
                let set = index.parse().map_err(|_| unknown())?;
                let field = match leaf {
                    "title" => SetField::Title,
                    "theme" => SetField::Theme,
                    _ => return Err(unknown()),
                };
                Ok(FieldPath::QuestionSet(set, field))
            }
            _ => Err(unknown()),
        }
    }
}

fn parse_team(raw: &str) -> Option<TeamId> {
    raw.parse().ok().and_then(TeamId::new)
}

impl GameState {
    /// Read the addressed field as a JSON value.
    pub fn read_field(&self, path: &FieldPath) -> Result<Value, FieldError> {
        let value = match *path {
            FieldPath::CurrentSet => Value::from(self.current_set),
            FieldPath::CurrentQuestion => Value::from(self.current_question),
            FieldPath::CurrentTeam => team_slot_value(self.current_team),
            FieldPath::CurrentChallenge => team_slot_value(self.current_challenge),
            FieldPath::AngelTeam => team_slot_value(self.angel_team),
            FieldPath::AttackTeam => team_slot_value(self.attack_team),
            FieldPath::VictimTeam => team_slot_value(self.victim_team),
            FieldPath::IsAnimating => Value::from(self.is_animating),
            FieldPath::TimerValue => Value::from(self.timer_value),
            FieldPath::TimerRunning => Value::from(self.timer_running),
            FieldPath::DefaultTimerValue => Value::from(self.default_timer_value),
            FieldPath::EmergencyMeetingActive => Value::from(self.emergency_meeting_active),
            FieldPath::Team(id, TeamField::Score) => Value::from(self.teams[&id].score),
            FieldPath::Team(id, TeamField::Name) => Value::from(self.teams[&id].name.clone()),
            FieldPath::Team(id, TeamField::Color) => {
                serde_json::to_value(self.teams[&id].color).expect("color serializes")
            }
            FieldPath::ActionCard(id, kind) => {
                let cards = self.action_cards[&id];
                Value::from(match kind {
                    CardKind::Angel => cards.angel,
                    CardKind::Devil => cards.devil,
                    CardKind::Cross => cards.cross,
                })
            }
            FieldPath::QuestionSet(set, field) => {
                let info = self
                    .question_sets
                    .get(&set)
                    .ok_or(FieldError::UnknownSet(set))?;
                Value::from(match field {
                    SetField::Title => info.title.clone(),
                    SetField::Theme => info.theme.clone(),
                })
            }
            FieldPath::Q1Attempts(set) => {
                Value::from(self.q1_attempts.get(&set).copied().unwrap_or(0))
            }
            FieldPath::Q1FailedTeams(set) => serde_json::to_value(
                self.q1_failed_teams.get(&set).cloned().unwrap_or_default(),
            )
            .expect("team list serializes"),
        };
        Ok(value)
    }

    /// Write the addressed field from a JSON value, returning the old value.
    ///
    /// Unknown paths and type mismatches are errors; there is no implicit
    /// creation of structure beyond the fixed document shape.
    pub fn write_field(&mut self, path: &FieldPath, value: Value) -> Result<Value, FieldError> {
        let old = self.read_field(path)?;

        let mismatch = |expected: &'static str| FieldError::TypeMismatch {
            path: path.to_string(),
            expected,
        };

        match *path {
            FieldPath::CurrentSet => {
                self.current_set = decode(value).ok_or_else(|| mismatch("set number"))?;
            }
            FieldPath::CurrentQuestion => {
                self.current_question = decode(value).ok_or_else(|| mismatch("question number"))?;
            }
            FieldPath::CurrentTeam => {
                self.current_team = decode_slot(value).ok_or_else(|| mismatch("team slot"))?;
            }
            FieldPath::CurrentChallenge => {
                self.current_challenge = decode_slot(value).ok_or_else(|| mismatch("team slot"))?;
            }
            FieldPath::AngelTeam => {
                self.angel_team = decode_slot(value).ok_or_else(|| mismatch("team slot"))?;
            }
            FieldPath::AttackTeam => {
                self.attack_team = decode_slot(value).ok_or_else(|| mismatch("team slot"))?;
            }
            FieldPath::VictimTeam => {
                self.victim_team = decode_slot(value).ok_or_else(|| mismatch("team slot"))?;
            }
            FieldPath::IsAnimating => {
                self.is_animating = value.as_bool().ok_or_else(|| mismatch("bool"))?;
            }
            FieldPath::TimerValue => {
                self.timer_value = decode(value).ok_or_else(|| mismatch("seconds"))?;
            }
            FieldPath::TimerRunning => {
                self.timer_running = value.as_bool().ok_or_else(|| mismatch("bool"))?;
            }
            FieldPath::DefaultTimerValue => {
                self.default_timer_value = decode(value).ok_or_else(|| mismatch("seconds"))?;
            }
            FieldPath::EmergencyMeetingActive => {
                self.emergency_meeting_active = value.as_bool().ok_or_else(|| mismatch("bool"))?;
            }
            FieldPath::Team(id, field) => {
                let team = self.teams.get_mut(&id).expect("fixed team roster");
                match field {
                    TeamField::Score => {
                        team.score = decode(value).ok_or_else(|| mismatch("score"))?;
                    }
                    TeamField::Name => {
                        team.name = decode(value).ok_or_else(|| mismatch("string"))?;
                    }
                    TeamField::Color => {
                        team.color = decode(value).ok_or_else(|| mismatch("team color"))?;
                    }
                }
            }
            FieldPath::ActionCard(id, kind) => {
                let status = value.as_bool().ok_or_else(|| mismatch("bool"))?;
                let cards = self.action_cards.get_mut(&id).expect("fixed team roster");
                match kind {
                    CardKind::Angel => cards.angel = status,
                    CardKind::Devil => cards.devil = status,
                    CardKind::Cross => cards.cross = status,
                }
            }
            FieldPath::QuestionSet(set, field) => {
                let info = self
                    .question_sets
                    .get_mut(&set)
                    .ok_or(FieldError::UnknownSet(set))?;
                let text: String = decode(value).ok_or_else(|| mismatch("string"))?;
                match field {
                    SetField::Title => info.title = text,
                    SetField::Theme => info.theme = text,
                }
            }
            FieldPath::Q1Attempts(set) => {
                let attempts = decode(value).ok_or_else(|| mismatch("attempt count"))?;
                self.q1_attempts.insert(set, attempts);
            }
            FieldPath::Q1FailedTeams(set) => {
                let teams: Vec<TeamId> = decode(value).ok_or_else(|| mismatch("team list"))?;
                self.q1_failed_teams.insert(set, teams);
            }
        }

        Ok(old)
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Option<T> {
    serde_json::from_value(value).ok()
}

/// Decode a team-slot value: `0` clears the slot, `1..=6` selects a team,
/// anything else is a mismatch.
fn decode_slot(value: Value) -> Option<Option<TeamId>> {
    let raw = value.as_u64()?;
    if raw == 0 {
        Some(None)
    } else {
        u8::try_from(raw).ok().and_then(TeamId::new).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::game::GameConfig;
    use serde_json::json;

    fn state() -> GameState {
        GameState::with_config(GameConfig::default())
    }

    #[test]
    fn paths_round_trip_through_display() {
        let paths = [
            FieldPath::CurrentSet,
            FieldPath::CurrentTeam,
            FieldPath::TimerRunning,
            FieldPath::Team(TeamId::new(3).unwrap(), TeamField::Score),
            FieldPath::ActionCard(TeamId::new(2).unwrap(), CardKind::Cross),
            FieldPath::QuestionSet(7, SetField::Title),
            FieldPath::Q1Attempts(4),
            FieldPath::Q1FailedTeams(9),
        ];

        for path in paths {
            let spelled = path.to_string();
            assert_eq!(spelled.parse::<FieldPath>().unwrap(), path, "{spelled}");
        }
    }

    #[test]
    fn unknown_paths_are_rejected() {
        for bad in [
            "teams.0.score",
            "teams.7.score",
            "teams.3.points",
            "teams.3",
            "actionCards.2.shield",
            "somethingElse",
            "teams.3.score.extra",
        ] {
            assert!(bad.parse::<FieldPath>().is_err(), "{bad}");
        }
    }

    #[test]
    fn write_returns_old_value_and_applies_new() {
        let mut state = state();
        let path = FieldPath::Team(TeamId::new(1).unwrap(), TeamField::Score);
        let old = state.write_field(&path, json!(5)).unwrap();
        assert_eq!(old, json!(0));
        assert_eq!(state.team(TeamId::new(1).unwrap()).score, 5);
    }

    #[test]
    fn slot_write_accepts_zero_as_clear() {
        let mut state = state();
        state
            .write_field(&FieldPath::CurrentTeam, json!(2))
            .unwrap();
        assert_eq!(state.current_team, TeamId::new(2));

        state
            .write_field(&FieldPath::CurrentTeam, json!(0))
            .unwrap();
        assert_eq!(state.current_team, None);

        assert!(state.write_field(&FieldPath::CurrentTeam, json!(9)).is_err());
    }

    #[test]
    fn type_mismatch_leaves_state_untouched() {
        let mut state = state();
        let path = FieldPath::TimerValue;
        let err = state.write_field(&path, json!("soon")).unwrap_err();
        assert!(matches!(err, FieldError::TypeMismatch { .. }));
        assert_eq!(state.timer_value, 15);
    }

    #[test]
    fn question_set_bounds_are_enforced() {
        let mut state = state();
        let err = state
            .write_field(&FieldPath::QuestionSet(40, SetField::Title), json!("x"))
            .unwrap_err();
        assert_eq!(err, FieldError::UnknownSet(40));
    }
}
