// Leaderboard line rendering and tier markers.

use thiserror::Error;

use crate::rank::{RankInfo, Tier, UNRANKED_LABEL};

/// Render one leaderboard line:
/// `"{position}. {marker }{name} : {tier}{ division}{ - points LP}"`.
///
/// `position` is 1-based. An empty marker is treated as no marker.
pub fn format_entry(name: &str, rank: &RankInfo, position: usize, marker: Option<&str>) -> String {
    let marker_part = match marker {
        Some(m) if !m.is_empty() => format!("{m} "),
        _ => String::new(),
    };
    format!("{position}. {marker_part}{name} : {}", rank_summary(rank))
}

/// Tier, division and points as shown to users, e.g. `"GOLD II - 40 LP"`,
/// `"CHALLENGER - 900 LP"`, `"Unranked"`.
pub fn rank_summary(rank: &RankInfo) -> String {
    let tier_text = rank.tier.map_or(UNRANKED_LABEL, Tier::as_str);

    let division_text = match (rank.tier, rank.division) {
        (Some(tier), _) if tier.is_apex() => String::new(),
        (_, Some(division)) => format!(" {division}"),
        _ => String::new(),
    };

    let points_text = match rank.points {
        Some(points) if points > 0 => format!(" - {points} LP"),
        _ => String::new(),
    };

    format!("{tier_text}{division_text}{points_text}")
}

// ---------------------------------------------------------------------------
// Tier markers
// ---------------------------------------------------------------------------

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown tier `{0}` in marker table")]
pub struct UnknownTierKey(pub String);

/// Decorative marker (custom emoji markup) per tier, with an explicit entry
/// for unranked players. Tiers without an entry use the unranked marker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MarkerTable {
    tiers: [Option<String>; 10],
    unranked: Option<String>,
}

impl MarkerTable {
    /// Build from `(key, markup)` pairs where key is a tier name or
    /// `UNRANKED` (case-insensitive). Any other key is rejected.
    pub fn from_entries<I, K, V>(entries: I) -> Result<Self, UnknownTierKey>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut table = MarkerTable::default();
        for (key, markup) in entries {
            let key = key.as_ref();
            let markup = markup.into();
            let markup = if markup.trim().is_empty() { None } else { Some(markup) };
            if key.trim().eq_ignore_ascii_case("UNRANKED") {
                table.unranked = markup;
            } else if let Some(tier) = Tier::parse(key) {
                table.tiers[tier as usize] = markup;
            } else {
                return Err(UnknownTierKey(key.to_string()));
            }
        }
        Ok(table)
    }

    pub fn marker_for(&self, tier: Option<Tier>) -> Option<&str> {
        let specific = tier.and_then(|t| self.tiers[t as usize].as_deref());
        match specific {
            Some(markup) => Some(markup),
            // Unknown or missing tiers get the unranked marker.
            None => self.unranked.as_deref(),
        }
    }
}
