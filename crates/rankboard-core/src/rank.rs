// Rank classification: tiers, divisions and the total rank order.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Ordered rank table
// ---------------------------------------------------------------------------

/// Every rank key in leaderboard order, best first. `RankKey::ordinal` is an
/// index into this table.
pub const RANK_ORDER: [&str; 32] = [
    "CHALLENGER",
    "GRANDMASTER",
    "MASTER",
    "DIAMOND I",
    "DIAMOND II",
    "DIAMOND III",
    "DIAMOND IV",
    "EMERALD I",
    "EMERALD II",
    "EMERALD III",
    "EMERALD IV",
    "PLATINUM I",
    "PLATINUM II",
    "PLATINUM III",
    "PLATINUM IV",
    "GOLD I",
    "GOLD II",
    "GOLD III",
    "GOLD IV",
    "SILVER I",
    "SILVER II",
    "SILVER III",
    "SILVER IV",
    "BRONZE I",
    "BRONZE II",
    "BRONZE III",
    "BRONZE IV",
    "IRON I",
    "IRON II",
    "IRON III",
    "IRON IV",
    "Unranked",
];

/// Label used wherever a player has no known tier.
pub const UNRANKED_LABEL: &str = "Unranked";

// ---------------------------------------------------------------------------
// Tier
// ---------------------------------------------------------------------------

/// Ranked tiers, best first. The declaration order is the rank order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    Challenger,
    Grandmaster,
    Master,
    Diamond,
    Emerald,
    Platinum,
    Gold,
    Silver,
    Bronze,
    Iron,
}

impl Tier {
    pub const ALL: [Tier; 10] = [
        Tier::Challenger,
        Tier::Grandmaster,
        Tier::Master,
        Tier::Diamond,
        Tier::Emerald,
        Tier::Platinum,
        Tier::Gold,
        Tier::Silver,
        Tier::Bronze,
        Tier::Iron,
    ];

    /// Parse a tier name as the ranking service spells it ("GOLD").
    /// Case-insensitive; returns `None` for anything outside the tier set.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CHALLENGER" => Some(Tier::Challenger),
            "GRANDMASTER" => Some(Tier::Grandmaster),
            "MASTER" => Some(Tier::Master),
            "DIAMOND" => Some(Tier::Diamond),
            "EMERALD" => Some(Tier::Emerald),
            "PLATINUM" => Some(Tier::Platinum),
            "GOLD" => Some(Tier::Gold),
            "SILVER" => Some(Tier::Silver),
            "BRONZE" => Some(Tier::Bronze),
            "IRON" => Some(Tier::Iron),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Challenger => "CHALLENGER",
            Tier::Grandmaster => "GRANDMASTER",
            Tier::Master => "MASTER",
            Tier::Diamond => "DIAMOND",
            Tier::Emerald => "EMERALD",
            Tier::Platinum => "PLATINUM",
            Tier::Gold => "GOLD",
            Tier::Silver => "SILVER",
            Tier::Bronze => "BRONZE",
            Tier::Iron => "IRON",
        }
    }

    /// The three apex tiers have a single ladder and no divisions.
    pub fn is_apex(self) -> bool {
        matches!(self, Tier::Challenger | Tier::Grandmaster | Tier::Master)
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Division
// ---------------------------------------------------------------------------

/// Division within a non-apex tier. `I` is the best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Division {
    I,
    II,
    III,
    IV,
}

impl Division {
    pub const ALL: [Division; 4] = [Division::I, Division::II, Division::III, Division::IV];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "I" => Some(Division::I),
            "II" => Some(Division::II),
            "III" => Some(Division::III),
            "IV" => Some(Division::IV),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Division::I => "I",
            Division::II => "II",
            Division::III => "III",
            Division::IV => "IV",
        }
    }
}

impl fmt::Display for Division {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// RankInfo
// ---------------------------------------------------------------------------

/// Ranked standing of one player. `None` means unknown or unranked, never
/// zero.
///
/// On disk the fields keep the ranking service's spelling
/// (`{"tier": "GOLD", "division": "II", "lp": 40}`); unrecognised tier or
/// division strings load as `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "RawRankInfo", into = "RawRankInfo")]
pub struct RankInfo {
    pub tier: Option<Tier>,
    pub division: Option<Division>,
    pub points: Option<u32>,
}

impl RankInfo {
    pub fn new(tier: Tier, division: Option<Division>, points: u32) -> Self {
        Self {
            tier: Some(tier),
            division,
            points: Some(points),
        }
    }

    /// Standing for a player with no ranked data (or whose lookup failed).
    pub fn unranked() -> Self {
        Self::default()
    }

    /// Build from the raw strings returned by the ranking service.
    /// Apex tiers come back with division "I"; it is dropped.
    pub fn from_raw(tier: Option<&str>, division: Option<&str>, points: Option<i64>) -> Self {
        let tier = tier.and_then(Tier::parse);
        let division = match tier {
            Some(t) if t.is_apex() => None,
            _ => division.and_then(Division::parse),
        };
        Self {
            tier,
            division,
            points: points.and_then(|p| u32::try_from(p).ok()),
        }
    }

    pub fn key(&self) -> RankKey {
        RankKey::classify(self.tier, self.division)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawRankInfo {
    #[serde(default)]
    tier: Option<String>,
    #[serde(default)]
    division: Option<String>,
    #[serde(default)]
    lp: Option<i64>,
}

impl From<RawRankInfo> for RankInfo {
    fn from(raw: RawRankInfo) -> Self {
        RankInfo::from_raw(raw.tier.as_deref(), raw.division.as_deref(), raw.lp)
    }
}

impl From<RankInfo> for RawRankInfo {
    fn from(rank: RankInfo) -> Self {
        RawRankInfo {
            tier: rank.tier.map(|t| t.as_str().to_string()),
            division: rank.division.map(|d| d.as_str().to_string()),
            lp: rank.points.map(i64::from),
        }
    }
}

// ---------------------------------------------------------------------------
// RankKey
// ---------------------------------------------------------------------------

/// A position in [`RANK_ORDER`]. Ordering follows the table: `Less` means a
/// better rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RankKey {
    Apex(Tier),
    Ranked(Tier, Division),
    Unranked,
}

impl RankKey {
    /// Classify a (tier, division) pair. Apex tiers drop any division the
    /// service reports; combinations that do not map to a table entry
    /// (no tier, or a non-apex tier without a division) fall back to
    /// `Unranked`, the lowest rank.
    pub fn classify(tier: Option<Tier>, division: Option<Division>) -> Self {
        match (tier, division) {
            (Some(tier), _) if tier.is_apex() => RankKey::Apex(tier),
            (Some(tier), Some(division)) => RankKey::Ranked(tier, division),
            _ => RankKey::Unranked,
        }
    }

    /// Index into [`RANK_ORDER`].
    pub fn ordinal(self) -> usize {
        match self {
            RankKey::Apex(tier) => tier.index(),
            RankKey::Ranked(tier, _) if tier.is_apex() => tier.index(),
            RankKey::Ranked(tier, division) => {
                3 + (tier.index() - Tier::Diamond.index()) * 4 + division as usize
            }
            RankKey::Unranked => RANK_ORDER.len() - 1,
        }
    }

    /// Every key in rank order.
    pub fn all() -> impl Iterator<Item = RankKey> {
        Tier::ALL
            .into_iter()
            .flat_map(|tier| -> Vec<RankKey> {
                if tier.is_apex() {
                    vec![RankKey::Apex(tier)]
                } else {
                    Division::ALL
                        .into_iter()
                        .map(|division| RankKey::Ranked(tier, division))
                        .collect()
                }
            })
            .chain(std::iter::once(RankKey::Unranked))
    }
}

impl Ord for RankKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ordinal().cmp(&other.ordinal())
    }
}

impl PartialOrd for RankKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for RankKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(RANK_ORDER[self.ordinal()])
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_matches_generated_keys() {
        let keys: Vec<RankKey> = RankKey::all().collect();
        assert_eq!(keys.len(), RANK_ORDER.len());
        for (i, key) in keys.iter().enumerate() {
            assert_eq!(key.ordinal(), i);
            assert_eq!(key.to_string(), RANK_ORDER[i]);
        }
    }

    #[test]
    fn every_pair_classifies_into_table() {
        let tiers = Tier::ALL.iter().copied().map(Some).chain([None]);
        for tier in tiers {
            let divisions = Division::ALL.iter().copied().map(Some).chain([None]);
            for division in divisions {
                let key = RankKey::classify(tier, division);
                assert!(
                    RANK_ORDER.contains(&key.to_string().as_str()),
                    "{key} not in table"
                );
            }
        }
    }

    #[test]
    fn apex_tiers_never_carry_division() {
        for tier in [Tier::Challenger, Tier::Grandmaster, Tier::Master] {
            for division in Division::ALL {
                let key = RankKey::classify(Some(tier), Some(division));
                assert_eq!(key, RankKey::Apex(tier));
                assert_eq!(key.to_string(), tier.as_str());
            }
        }
    }

    #[test]
    fn unmapped_combinations_are_unranked() {
        assert_eq!(RankKey::classify(None, None), RankKey::Unranked);
        assert_eq!(RankKey::classify(None, Some(Division::II)), RankKey::Unranked);
        assert_eq!(RankKey::classify(Some(Tier::Gold), None), RankKey::Unranked);
        assert_eq!(RankKey::Unranked.to_string(), "Unranked");
    }

    #[test]
    fn order_is_best_first() {
        let challenger = RankKey::Apex(Tier::Challenger);
        let master = RankKey::Apex(Tier::Master);
        let diamond_one = RankKey::Ranked(Tier::Diamond, Division::I);
        let gold_two = RankKey::Ranked(Tier::Gold, Division::II);
        let gold_three = RankKey::Ranked(Tier::Gold, Division::III);
        let iron_four = RankKey::Ranked(Tier::Iron, Division::IV);

        assert!(challenger < master);
        assert!(master < diamond_one);
        assert!(gold_two < gold_three);
        assert!(iron_four < RankKey::Unranked);
        assert_eq!(iron_four.ordinal(), 30);
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(Tier::parse("gold"), Some(Tier::Gold));
        assert_eq!(Tier::parse(" Emerald "), Some(Tier::Emerald));
        assert_eq!(Tier::parse("WOOD"), None);
        assert_eq!(Division::parse("iv"), Some(Division::IV));
        assert_eq!(Division::parse("V"), None);
    }

    #[test]
    fn rank_info_reads_service_spelling() {
        let json = r#"{"tier":"GOLD","division":"II","lp":40}"#;
        let rank: RankInfo = serde_json::from_str(json).unwrap();
        assert_eq!(rank, RankInfo::new(Tier::Gold, Some(Division::II), 40));

        let back = serde_json::to_value(rank).unwrap();
        assert_eq!(back["tier"], "GOLD");
        assert_eq!(back["division"], "II");
        assert_eq!(back["lp"], 40);
    }

    #[test]
    fn apex_rank_info_drops_division() {
        let rank = RankInfo::from_raw(Some("MASTER"), Some("I"), Some(210));
        assert_eq!(rank.tier, Some(Tier::Master));
        assert_eq!(rank.division, None);
        assert_eq!(rank.points, Some(210));

        let rank = RankInfo::from_raw(Some("GOLD"), Some("I"), Some(10));
        assert_eq!(rank.division, Some(Division::I));
    }

    #[test]
    fn rank_info_tolerates_nulls_and_unknowns() {
        let json = r#"{"tier":null,"division":null,"lp":null}"#;
        let rank: RankInfo = serde_json::from_str(json).unwrap();
        assert_eq!(rank, RankInfo::unranked());

        let json = r#"{"tier":"MYTHIC","division":"VI","lp":-5}"#;
        let rank: RankInfo = serde_json::from_str(json).unwrap();
        assert_eq!(rank, RankInfo::unranked());
        assert_eq!(rank.key(), RankKey::Unranked);
    }
}
