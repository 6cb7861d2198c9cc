//! League name to provider id lookup
//!
//! API-Football identifies competitions by numeric id. The built-in table covers
//! the major competitions; deployments add more through `Config::leagues`.

use std::collections::HashMap;

/// Built-in league ids (API-Football)
pub const FOOTBALL_LEAGUES: [(&str, u32); 8] = [
    ("premier_league", 39),
    ("la_liga", 140),
    ("serie_a", 135),
    ("bundesliga", 78),
    ("ligue_1", 61),
    ("champions_league", 2),
    ("europa_league", 3),
    ("world_cup", 1),
];

/// Injected league lookup table
#[derive(Clone, Debug)]
pub struct LeagueTable {
    ids: HashMap<String, u32>,
}

impl Default for LeagueTable {
    fn default() -> Self {
        Self {
            ids: FOOTBALL_LEAGUES
                .iter()
                .map(|(name, id)| (name.to_string(), *id))
                .collect(),
        }
    }
}

impl LeagueTable {
    /// Built-in table extended (and overridden) by `extra`
    pub fn with_overrides(extra: &HashMap<String, u32>) -> Self {
        let mut table = Self::default();
        for (name, id) in extra {
            table.ids.insert(normalize(name), *id);
        }
        table
    }

    /// Provider id for a league name; accepts "Premier League", "premier-league", ...
    pub fn resolve(&self, name: &str) -> Option<u32> {
        self.ids.get(&normalize(name)).copied()
    }

    /// League name for a provider id
    pub fn name_of(&self, id: u32) -> Option<&str> {
        self.ids
            .iter()
            .find(|(_, v)| **v == id)
            .map(|(name, _)| name.as_str())
    }
}

fn normalize(name: &str) -> String {
    name.trim()
        .to_ascii_lowercase()
        .replace([' ', '-'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_builtin_leagues_with_loose_spelling() {
        let table = LeagueTable::default();
        assert_eq!(table.resolve("premier_league"), Some(39));
        assert_eq!(table.resolve("Premier League"), Some(39));
        assert_eq!(table.resolve("champions-league"), Some(2));
        assert_eq!(table.resolve("eredivisie"), None);
    }

    #[test]
    fn overrides_extend_and_replace() {
        let extra = HashMap::from([
            ("Eredivisie".to_string(), 88),
            ("la_liga".to_string(), 999),
        ]);
        let table = LeagueTable::with_overrides(&extra);

        assert_eq!(table.resolve("eredivisie"), Some(88));
        assert_eq!(table.resolve("la_liga"), Some(999));
        assert_eq!(table.resolve("serie_a"), Some(135));
        assert_eq!(table.name_of(88), Some("eredivisie"));
    }
}
