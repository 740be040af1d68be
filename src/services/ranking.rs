//! Ranking calculator: derives ordinal team rankings from the score table.
//!
//! A pure function recomputed in full on every score change — rankings are
//! never updated incrementally, so they can never drift from the scores.

use std::collections::BTreeMap;

use crate::state::game::{GameState, Rank, Ranking, Team, TeamId};

/// Compute the ranking table for the given teams.
///
/// Zero-score teams always wear the participation badge (position 0). Teams
/// with points get dense competition ranking: equal scores share a rank, and
/// the next distinct lower score ranks at its 1-based position in the sorted
/// list. Only the first three ranks carry ordinal labels; anything deeper
/// collapses to the badge.
pub fn compute(teams: &BTreeMap<TeamId, Team>) -> BTreeMap<TeamId, Ranking> {
    let mut rankings: BTreeMap<TeamId, Ranking> = teams
        .keys()
        .map(|id| (*id, Ranking::default()))
        .collect();

    let mut scored: Vec<(TeamId, u32)> = teams
        .iter()
        .map(|(id, team)| (*id, team.score))
        .collect();
    // Descending by score; ties fall back to team id so the output is stable.
    scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut position = 1u8;
    let mut previous_score = None;
    for (index, (id, score)) in scored.iter().filter(|(_, s)| *s > 0).enumerate() {
        if let Some(previous) = previous_score
            && *score < previous
        {
            position = index as u8 + 1;
        }
        previous_score = Some(*score);

        let rank = match position {
            1 => Rank::First,
            2 => Rank::Second,
            3 => Rank::Third,
            _ => Rank::Badge,
        };
        rankings.insert(*id, Ranking { rank, position });
    }

    rankings
}

/// Recompute and store the rankings on the document.
pub fn refresh(state: &mut GameState) {
    state.rankings = compute(&state.teams);
}

/// Project the ranking table into the wire shape (raw numeric team ids).
pub fn payload(state: &GameState) -> BTreeMap<u8, Ranking> {
    state
        .rankings
        .iter()
        .map(|(id, ranking)| (id.get(), *ranking))
        .collect()
}
