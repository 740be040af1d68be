//! Runtime representation of the shared quiz-bowl game document.
//!
//! One [`GameState`] instance describes the entire game: board cursor, buzz
//! lock, action-card flags, timer, scores and derived rankings. It is mutated
//! exclusively through the state store and replicated to every connected
//! client, so the serialized shape doubles as the wire and snapshot format
//! (camelCase keys, `0` encoding "no team").

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// Number of teams on the board. The id set is fixed at `1..=TEAM_COUNT`.
pub const TEAM_COUNT: u8 = 6;

/// Identifier of one of the six teams, validated to `1..=TEAM_COUNT`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub struct TeamId(u8);

impl TeamId {
    /// Validate a raw id, returning `None` for `0` and out-of-range values.
    pub fn new(raw: u8) -> Option<Self> {
        (1..=TEAM_COUNT).contains(&raw).then_some(Self(raw))
    }

    /// The raw numeric id.
    pub fn get(self) -> u8 {
        self.0
    }

    /// Iterate every team id in order.
    pub fn all() -> impl Iterator<Item = TeamId> {
        (1..=TEAM_COUNT).map(TeamId)
    }
}

impl TryFrom<u8> for TeamId {
    type Error = String;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        TeamId::new(raw).ok_or_else(|| format!("team id `{raw}` out of range 1..={TEAM_COUNT}"))
    }
}

impl From<TeamId> for u8 {
    fn from(id: TeamId) -> Self {
        id.0
    }
}

impl std::fmt::Display for TeamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Serde adapter keeping the original numeric encoding for the buzz-lock
/// style slots: `0` on the wire means "no team".
pub mod team_slot {
    use super::TeamId;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize `None` as `0` and `Some(id)` as the raw id.
    pub fn serialize<S: Serializer>(slot: &Option<TeamId>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(slot.map_or(0, TeamId::get))
    }

    /// Deserialize `0` (or anything out of range) as `None`.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<TeamId>, D::Error> {
        let raw = u8::deserialize(deserializer)?;
        Ok(TeamId::new(raw))
    }
}

/// Encode a team slot the way the wire does (`0` for none).
pub fn team_slot_value(slot: Option<TeamId>) -> Value {
    Value::from(slot.map_or(0, TeamId::get))
}

/// Palette of team colors consumed by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamColor {
    /// Crewmate red.
    Red,
    /// Crewmate blue.
    Blue,
    /// Crewmate lime.
    Lime,
    /// Crewmate orange.
    Orange,
    /// Crewmate pink.
    Pink,
    /// Crewmate yellow.
    Yellow,
    /// Crewmate purple.
    Purple,
    /// Crewmate cyan.
    Cyan,
    /// Neutral white, used when no team holds the floor.
    White,
}

/// One of the three per-team action card kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardKind {
    /// Protection from the score penalty on an incorrect answer.
    Angel,
    /// Attack forcing another team to answer a bonus question.
    Devil,
    /// Immunity from being targeted by a devil attack.
    Cross,
}

impl CardKind {
    /// Wire spelling of the card kind.
    pub fn as_str(self) -> &'static str {
        match self {
            CardKind::Angel => "angel",
            CardKind::Devil => "devil",
            CardKind::Cross => "cross",
        }
    }
}

/// A competing team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    /// Current score, clamped at zero on every decrement.
    pub score: u32,
    /// Display name chosen by the moderator.
    pub name: String,
    /// Character color on the displays.
    pub color: TeamColor,
}

/// Per-team action card availability.
///
/// `angel`/`devil` flip to `false` permanently once used; `cross` marks an
/// active protection-from-attack and is cleared when the team next answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCardSet {
    /// Angel card still available.
    pub angel: bool,
    /// Devil card still available.
    pub devil: bool,
    /// Protection from being attacked currently active.
    pub cross: bool,
}

impl Default for ActionCardSet {
    fn default() -> Self {
        Self {
            angel: true,
            devil: true,
            cross: false,
        }
    }
}

/// Ordinal rank label shown on a team card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rank {
    /// Highest positive score tier.
    #[serde(rename = "1st")]
    First,
    /// Second score tier.
    #[serde(rename = "2nd")]
    Second,
    /// Third score tier.
    #[serde(rename = "3rd")]
    Third,
    /// Zero score, or any tier past third.
    #[serde(rename = "badge")]
    Badge,
}

/// Derived ranking entry for one team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ranking {
    /// Rank label.
    pub rank: Rank,
    /// 1-based position among positive-score teams, `0` for badge holders.
    pub position: u8,
}

impl Default for Ranking {
    fn default() -> Self {
        Self {
            rank: Rank::Badge,
            position: 0,
        }
    }
}

/// Display metadata for one question set, editable by the moderator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionSetInfo {
    /// Set title shown on the main display.
    pub title: String,
    /// Theme key selecting the set icon.
    pub theme: String,
}

/// Board geometry and tuning, immutable at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameConfig {
    /// Number of question sets on the board.
    pub total_sets: u8,
    /// Questions per set.
    pub questions_per_set: u8,
    /// Character position (percent across the track) per question number.
    pub character_positions: BTreeMap<u8, f32>,
    /// Countdown timer default in seconds.
    pub timer_duration: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            total_sets: 12,
            questions_per_set: 4,
            character_positions: BTreeMap::from([(1, 34.0), (2, 45.0), (3, 55.0), (4, 66.0)]),
            timer_duration: 15,
        }
    }
}

/// The whole game document, one instance per running server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    /// Set the cursor is parked on, `1..=config.total_sets`.
    pub current_set: u8,
    /// Question within the set, `1..=config.questions_per_set`.
    pub current_question: u8,
    /// Team currently holding the buzz lock.
    #[serde(with = "team_slot")]
    pub current_team: Option<TeamId>,
    /// Team in challenge mode (doubled correct-answer reward).
    #[serde(with = "team_slot")]
    pub current_challenge: Option<TeamId>,
    /// Team with a temporary angel activation.
    #[serde(with = "team_slot")]
    pub angel_team: Option<TeamId>,
    /// Attacker of an in-flight devil attack.
    #[serde(with = "team_slot")]
    pub attack_team: Option<TeamId>,
    /// Victim of an in-flight devil attack.
    #[serde(with = "team_slot")]
    pub victim_team: Option<TeamId>,
    /// Character run animation in progress; navigation is rejected while set.
    pub is_animating: bool,
    /// Countdown timer value in seconds.
    pub timer_value: u32,
    /// Last timer value the moderator explicitly set.
    pub default_timer_value: u32,
    /// Whether the countdown is ticking.
    pub timer_running: bool,
    /// Guards against re-entering the timer-expired alarm.
    pub emergency_meeting_active: bool,
    /// Display metadata per set, in board order.
    pub question_sets: IndexMap<u8, QuestionSetInfo>,
    /// The competing teams.
    pub teams: BTreeMap<TeamId, Team>,
    /// Action card availability per team.
    pub action_cards: BTreeMap<TeamId, ActionCardSet>,
    /// Derived rankings, recomputed on every score change.
    pub rankings: BTreeMap<TeamId, Ranking>,
    /// Board geometry, copied from the application configuration.
    pub config: GameConfig,
    /// Incorrect attempts consumed on each set's first question.
    #[serde(default)]
    pub q1_attempts: BTreeMap<u8, u8>,
    /// Teams grayed out after failing each set's first question.
    #[serde(default)]
    pub q1_failed_teams: BTreeMap<u8, Vec<TeamId>>,
}

const DEFAULT_TEAMS: [(&str, TeamColor); TEAM_COUNT as usize] = [
    ("Team A", TeamColor::Red),
    ("Team B", TeamColor::Blue),
    ("Team C", TeamColor::Lime),
    ("Team D", TeamColor::Orange),
    ("Team E", TeamColor::Pink),
    ("Team F", TeamColor::Yellow),
];

const DEFAULT_SET_TITLES: [&str; 12] = [
    "General Knowledge",
    "Science & Technology",
    "History & Geography",
    "Arts & Literature",
    "Sports & Entertainment",
    "Mathematics",
    "Current Events",
    "Mystery & Logic",
    "Science Fiction",
    "Ecology & Environment",
    "Philosophy & Ethics",
    "Culture & Traditions",
];

impl GameState {
    /// Build the default document for the given board configuration.
    pub fn with_config(config: GameConfig) -> Self {
        let teams = TeamId::all()
            .zip(DEFAULT_TEAMS)
            .map(|(id, (name, color))| {
                (
                    id,
                    Team {
                        score: 0,
                        name: name.to_string(),
                        color,
                    },
                )
            })
            .collect();

        let question_sets = (1..=config.total_sets)
            .map(|set| {
                let title = DEFAULT_SET_TITLES
                    .get(set as usize - 1)
                    .map_or_else(|| format!("Question Set {set}"), |t| t.to_string());
                (
                    set,
                    QuestionSetInfo {
                        title,
                        theme: "brainstorm".to_string(),
                    },
                )
            })
            .collect();

        Self {
            current_set: 1,
            current_question: 1,
            current_team: None,
            current_challenge: None,
            angel_team: None,
            attack_team: None,
            victim_team: None,
            is_animating: false,
            timer_value: config.timer_duration,
            default_timer_value: config.timer_duration,
            timer_running: false,
            emergency_meeting_active: false,
            question_sets,
            teams,
            action_cards: TeamId::all().map(|id| (id, ActionCardSet::default())).collect(),
            rankings: TeamId::all().map(|id| (id, Ranking::default())).collect(),
            config,
            q1_attempts: BTreeMap::new(),
            q1_failed_teams: BTreeMap::new(),
        }
    }

    /// Merge a persisted snapshot over the defaults.
    ///
    /// Keys present in the snapshot overwrite the defaults, missing keys keep
    /// their default values, and a snapshot that fails to decode after the
    /// merge is discarded entirely — a stale save from an older schema must
    /// never prevent startup.
    pub fn merged_with(defaults: Self, snapshot: Value) -> Self {
        let mut base = match serde_json::to_value(&defaults) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "failed to encode default state; ignoring snapshot");
                return defaults;
            }
        };

        deep_merge(&mut base, snapshot);

        match serde_json::from_value(base) {
            Ok(state) => state,
            Err(err) => {
                warn!(error = %err, "snapshot incompatible with current schema; using defaults");
                defaults
            }
        }
    }

    /// Borrow a team by id.
    pub fn team(&self, id: TeamId) -> &Team {
        &self.teams[&id]
    }

    /// Borrow a team's action cards.
    pub fn cards(&self, id: TeamId) -> ActionCardSet {
        self.action_cards[&id]
    }

    /// The attacker/victim pairing if an attack is fully in flight.
    pub fn attack_in_flight(&self) -> Option<(TeamId, TeamId)> {
        Some((self.attack_team?, self.victim_team?))
    }

    /// Teams a given attacker may target: everyone except itself and teams
    /// holding an active cross protection.
    pub fn attack_candidates(&self, attacker: TeamId) -> Vec<TeamId> {
        TeamId::all()
            .filter(|&id| id != attacker && !self.cards(id).cross)
            .collect()
    }

    /// Record a Q1 failure for a team on a set, once per team.
    pub fn record_q1_failure(&mut self, set: u8, team: TeamId) {
        let failed = self.q1_failed_teams.entry(set).or_default();
        if !failed.contains(&team) {
            failed.push(team);
        }
    }

    /// Drop the Q1 bookkeeping for a set (attempt counter and failed teams).
    pub fn clear_q1_tracking(&mut self, set: u8) {
        self.q1_attempts.remove(&set);
        self.q1_failed_teams.remove(&set);
    }
}

/// Recursively overlay `overlay` onto `base`: objects merge per key, every
/// other value replaces wholesale.
fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(slot) => deep_merge(slot, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn default_state() -> GameState {
        GameState::with_config(GameConfig::default())
    }

    #[test]
    fn defaults_cover_every_team() {
        let state = default_state();
        assert_eq!(state.teams.len(), TEAM_COUNT as usize);
        assert_eq!(state.action_cards.len(), TEAM_COUNT as usize);
        assert_eq!(state.question_sets.len(), 12);
        assert!(state.current_team.is_none());
        assert_eq!(state.timer_value, 15);
        for id in TeamId::all() {
            assert_eq!(state.team(id).score, 0);
            assert!(state.cards(id).angel);
            assert!(!state.cards(id).cross);
        }
    }

    #[test]
    fn team_id_rejects_out_of_range() {
        assert!(TeamId::new(0).is_none());
        assert!(TeamId::new(7).is_none());
        assert_eq!(TeamId::new(3).map(TeamId::get), Some(3));
    }

    #[test]
    fn team_slots_round_trip_through_zero_encoding() {
        let mut state = default_state();
        state.current_team = TeamId::new(4);
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value["currentTeam"], json!(4));
        assert_eq!(value["victimTeam"], json!(0));

        let back: GameState = serde_json::from_value(value).unwrap();
        assert_eq!(back.current_team, TeamId::new(4));
        assert_eq!(back.victim_team, None);
    }

    #[test]
    fn snapshot_merge_keeps_defaults_for_missing_fields() {
        let snapshot = json!({
            "currentSet": 5,
            "teams": {"2": {"score": 7}},
        });

        let merged = GameState::merged_with(default_state(), snapshot);
        assert_eq!(merged.current_set, 5);
        assert_eq!(merged.team(TeamId::new(2).unwrap()).score, 7);
        // Untouched fields keep their defaults.
        assert_eq!(merged.current_question, 1);
        assert_eq!(merged.team(TeamId::new(2).unwrap()).name, "Team B");
        assert_eq!(merged.team(TeamId::new(1).unwrap()).score, 0);
    }

    #[test]
    fn full_document_survives_a_snapshot_round_trip() {
        let mut state = default_state();
        state.current_set = 4;
        state.current_question = 3;
        state.current_team = TeamId::new(5);
        state.teams.get_mut(&TeamId::new(5).unwrap()).unwrap().score = 6;
        state.action_cards.get_mut(&TeamId::new(5).unwrap()).unwrap().devil = false;
        state.q1_attempts.insert(4, 2);
        state
            .q1_failed_teams
            .insert(4, vec![TeamId::new(1).unwrap(), TeamId::new(5).unwrap()]);
        state.timer_value = 9;

        let snapshot = serde_json::to_value(&state).unwrap();
        let restored = GameState::merged_with(default_state(), snapshot);
        assert_eq!(restored, state);
    }

    #[test]
    fn incompatible_snapshot_falls_back_to_defaults() {
        let snapshot = json!({"teams": "not an object"});
        let merged = GameState::merged_with(default_state(), snapshot);
        assert_eq!(merged, default_state());
    }

    #[test]
    fn rank_labels_use_ordinal_spelling() {
        assert_eq!(serde_json::to_value(Rank::First).unwrap(), json!("1st"));
        assert_eq!(serde_json::to_value(Rank::Badge).unwrap(), json!("badge"));
    }

    #[test]
    fn q1_failures_record_once_per_team() {
        let mut state = default_state();
        let team = TeamId::new(2).unwrap();
        state.record_q1_failure(1, team);
        state.record_q1_failure(1, team);
        assert_eq!(state.q1_failed_teams[&1], vec![team]);

        state.clear_q1_tracking(1);
        assert!(state.q1_failed_teams.get(&1).is_none());
    }

    #[test]
    fn attack_candidates_exclude_self_and_protected() {
        let mut state = default_state();
        let attacker = TeamId::new(1).unwrap();
        let protected = TeamId::new(3).unwrap();
        state.action_cards.get_mut(&protected).unwrap().cross = true;

        let candidates = state.attack_candidates(attacker);
        assert!(!candidates.contains(&attacker));
        assert!(!candidates.contains(&protected));
        assert_eq!(candidates.len(), 4);
    }
}
