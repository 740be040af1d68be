//! Validation helpers for values arriving over the wire.

use crate::state::game::{GameConfig, TeamId};

/// Validate a raw team id from a client payload.
///
/// Returns `None` for `0` (the "no team" sentinel never names a team in a
/// request) and for anything outside the fixed roster.
pub fn team_id(raw: u8) -> Option<TeamId> {
    TeamId::new(raw)
}

/// Check a board cursor against the configured geometry.
pub fn within_board(config: &GameConfig, set: u8, question: u8) -> bool {
    (1..=config.total_sets).contains(&set)
        && (1..=config.questions_per_set).contains(&question)
}
