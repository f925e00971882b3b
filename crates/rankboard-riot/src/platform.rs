// Regional platform routing for league-v4 requests.

use std::fmt;

/// League-v4 platform routing value, chosen from a player's tag line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Euw1,
    Eun1,
    Na1,
    Br1,
    La1,
    La2,
    Oc1,
    Tr1,
    Ru,
    Kr,
    Jp1,
}

/// Tag prefixes, tested in order.
const PREFIXES: &[(&str, Platform)] = &[
    ("EUW", Platform::Euw1),
    ("EUNE", Platform::Eun1),
    ("NA", Platform::Na1),
    ("BR", Platform::Br1),
    ("LAN", Platform::La1),
    ("LA1", Platform::La1),
    ("LAS", Platform::La2),
    ("LA2", Platform::La2),
    ("OCE", Platform::Oc1),
    ("OC1", Platform::Oc1),
    ("TR", Platform::Tr1),
    ("RU", Platform::Ru),
    ("KR", Platform::Kr),
    ("JP", Platform::Jp1),
];

impl Platform {
    /// Pick the platform for a tag line by case-insensitive prefix.
    /// Unrecognised tags route to EUW.
    pub fn from_tag(tag: &str) -> Self {
        let tag = tag.trim().to_ascii_uppercase();
        PREFIXES
            .iter()
            .find(|(prefix, _)| tag.starts_with(prefix))
            .map_or(Platform::Euw1, |(_, platform)| *platform)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Euw1 => "euw1",
            Platform::Eun1 => "eun1",
            Platform::Na1 => "na1",
            Platform::Br1 => "br1",
            Platform::La1 => "la1",
            Platform::La2 => "la2",
            Platform::Oc1 => "oc1",
            Platform::Tr1 => "tr1",
            Platform::Ru => "ru",
            Platform::Kr => "kr",
            Platform::Jp1 => "jp1",
        }
    }

    pub fn host(self) -> String {
        format!("{}.api.riotgames.com", self.as_str())
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_known_prefixes() {
        assert_eq!(Platform::from_tag("EUW"), Platform::Euw1);
        assert_eq!(Platform::from_tag("euw2"), Platform::Euw1);
        assert_eq!(Platform::from_tag("EUNE"), Platform::Eun1);
        assert_eq!(Platform::from_tag("NA1"), Platform::Na1);
        assert_eq!(Platform::from_tag("br1"), Platform::Br1);
        assert_eq!(Platform::from_tag("LAN"), Platform::La1);
        assert_eq!(Platform::from_tag("LA2"), Platform::La2);
        assert_eq!(Platform::from_tag("OCE"), Platform::Oc1);
        assert_eq!(Platform::from_tag("TR1"), Platform::Tr1);
        assert_eq!(Platform::from_tag("RU"), Platform::Ru);
        assert_eq!(Platform::from_tag("KR1"), Platform::Kr);
        assert_eq!(Platform::from_tag("JP1"), Platform::Jp1);
    }

    #[test]
    fn unknown_tags_default_to_euw() {
        assert_eq!(Platform::from_tag("1234"), Platform::Euw1);
        assert_eq!(Platform::from_tag(""), Platform::Euw1);
        assert_eq!(Platform::from_tag("SEA"), Platform::Euw1);
    }

    #[test]
    fn host_uses_routing_value() {
        assert_eq!(Platform::Eun1.host(), "eun1.api.riotgames.com");
    }
}
