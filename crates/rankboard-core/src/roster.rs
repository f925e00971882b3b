// Player roster: identity keys and the records tracked for each player.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::rank::RankInfo;

/// Stable, service-assigned player identifier (a Riot PUUID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One tracked player. Stored on disk as
/// `{"tag": "EUW", "username": "Name", "rank": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRecord {
    /// Tag line of the player's name; also selects the ranked platform.
    pub tag: String,
    #[serde(rename = "username")]
    pub display_name: String,
    #[serde(default, deserialize_with = "nullable_rank")]
    pub rank: RankInfo,
}

impl PlayerRecord {
    pub fn new(display_name: impl Into<String>, tag: impl Into<String>, rank: RankInfo) -> Self {
        Self {
            tag: tag.into(),
            display_name: display_name.into(),
            rank,
        }
    }
}

fn nullable_rank<'de, D>(deserializer: D) -> Result<RankInfo, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<RankInfo>::deserialize(deserializer)?.unwrap_or_default())
}

/// All tracked players keyed by identity. Keys are never rewritten; adding a
/// player that is already present replaces its record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roster {
    players: BTreeMap<IdentityKey, PlayerRecord>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn get(&self, key: &IdentityKey) -> Option<&PlayerRecord> {
        self.players.get(key)
    }

    /// Insert or replace a player. Returns the previous record, if any.
    pub fn upsert(&mut self, key: IdentityKey, record: PlayerRecord) -> Option<PlayerRecord> {
        self.players.insert(key, record)
    }

    /// Overwrite the rank of an existing player. Returns `false` if the key
    /// is not on the roster.
    pub fn set_rank(&mut self, key: &IdentityKey, rank: RankInfo) -> bool {
        match self.players.get_mut(key) {
            Some(record) => {
                record.rank = rank;
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&IdentityKey, &PlayerRecord)> {
        self.players.iter()
    }
}

impl FromIterator<(IdentityKey, PlayerRecord)> for Roster {
    fn from_iter<I: IntoIterator<Item = (IdentityKey, PlayerRecord)>>(iter: I) -> Self {
        Self {
            players: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rank::{Division, Tier};

    #[test]
    fn loads_legacy_players_file() {
        let json = r#"{
            "puuid-a": {"tag": "EUW", "username": "Alpha", "rank": {"tier": "GOLD", "division": "II", "lp": 40}},
            "puuid-b": {"tag": "NA1", "username": "Bravo", "rank": {"tier": null, "division": null, "lp": null}},
            "puuid-c": {"tag": "KR", "username": "Charlie", "rank": null}
        }"#;
        let roster: Roster = serde_json::from_str(json).unwrap();
        assert_eq!(roster.len(), 3);

        let alpha = roster.get(&IdentityKey::new("puuid-a")).unwrap();
        assert_eq!(alpha.display_name, "Alpha");
        assert_eq!(alpha.rank, RankInfo::new(Tier::Gold, Some(Division::II), 40));

        let charlie = roster.get(&IdentityKey::new("puuid-c")).unwrap();
        assert_eq!(charlie.rank, RankInfo::unranked());
    }

    #[test]
    fn upsert_replaces_existing_record() {
        let mut roster = Roster::new();
        let key = IdentityKey::new("k");
        assert!(roster
            .upsert(key.clone(), PlayerRecord::new("Old", "EUW", RankInfo::unranked()))
            .is_none());
        let previous = roster.upsert(key.clone(), PlayerRecord::new("New", "EUW", RankInfo::unranked()));
        assert_eq!(previous.map(|p| p.display_name), Some("Old".to_string()));
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.get(&key).unwrap().display_name, "New");
    }

    #[test]
    fn set_rank_ignores_unknown_players() {
        let mut roster = Roster::new();
        let rank = RankInfo::new(Tier::Iron, Some(Division::IV), 1);
        assert!(!roster.set_rank(&IdentityKey::new("missing"), rank));
        assert!(roster.is_empty());
    }
}
