// Leaderboard ordering.
//
// Primary key is the rank ordinal (better rank first), secondary key is
// points descending. Remaining ties fall back to display name and identity
// key so that the order is total and re-sorting never reshuffles entries.

use std::cmp::Ordering;

use crate::roster::{IdentityKey, PlayerRecord, Roster};

/// A roster entry borrowed for ordering and rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Standing<'a> {
    pub key: &'a IdentityKey,
    pub player: &'a PlayerRecord,
}

/// Compare two standings in leaderboard order (`Less` = placed higher).
pub fn compare_standings(a: &Standing<'_>, b: &Standing<'_>) -> Ordering {
    let rank_a = a.player.rank.key();
    let rank_b = b.player.rank.key();

    rank_a
        .cmp(&rank_b)
        .then_with(|| {
            let points_a = a.player.rank.points.unwrap_or(0);
            let points_b = b.player.rank.points.unwrap_or(0);
            points_b.cmp(&points_a)
        })
        .then_with(|| {
            a.player
                .display_name
                .to_lowercase()
                .cmp(&b.player.display_name.to_lowercase())
        })
        .then_with(|| a.key.cmp(b.key))
}

pub fn sort_standings(standings: &mut [Standing<'_>]) {
    standings.sort_by(compare_standings);
}

/// Snapshot the roster in leaderboard order.
pub fn sorted_standings(roster: &Roster) -> Vec<Standing<'_>> {
    let mut standings: Vec<Standing<'_>> = roster
        .iter()
        .map(|(key, player)| Standing { key, player })
        .collect();
    sort_standings(&mut standings);
    standings
}
