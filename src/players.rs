//! Player directory
//!
//! Session data for every player currently on the server. Written by the host
//! event handlers and read by the kill processing worker, so everything here
//! is behind a concurrent map.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

/// Live per-player stats as reported by a roster refresh
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerStats {
    pub name: String,
    #[serde(default)]
    pub clan_tag: Option<String>,
    #[serde(default)]
    pub guid: Option<String>,
    #[serde(default)]
    pub team_id: u32,
    #[serde(default)]
    pub kills: u32,
    #[serde(default)]
    pub deaths: u32,
    #[serde(default)]
    pub score: i32,
}

/// A player on the server
#[derive(Debug, Clone)]
pub struct Player {
    pub name: String,
    pub clan_tag: Option<String>,
    pub guid: Option<String>,
    pub team_id: u32,
    pub reserved: bool,
    pub online: bool,
    pub kills: u32,
    pub deaths: u32,
    pub score: i32,
    pub joined_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Player {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            clan_tag: None,
            guid: None,
            team_id: 0,
            reserved: false,
            online: true,
            kills: 0,
            deaths: 0,
            score: 0,
            joined_at: now,
            last_updated: now,
        }
    }

    /// Name with the clan tag prefixed, e.g. `[TAG]Name`
    #[must_use]
    pub fn verbose_name(&self) -> String {
        match self.clan_tag.as_deref() {
            Some(tag) if !tag.is_empty() => format!("[{tag}]{}", self.name),
            _ => self.name.clone(),
        }
    }

    fn apply_stats(&mut self, stats: &PlayerStats) {
        if stats.clan_tag.is_some() {
            self.clan_tag.clone_from(&stats.clan_tag);
        }
        if stats.guid.is_some() {
            self.guid.clone_from(&stats.guid);
        }
        self.team_id = stats.team_id;
        self.kills = stats.kills;
        self.deaths = stats.deaths;
        self.score = stats.score;
        self.online = true;
        self.last_updated = Utc::now();
    }

    /// Freeze the player's current stats for the kill being processed
    #[must_use]
    pub fn snapshot(&self, now: DateTime<Utc>) -> PlayerSnapshot {
        #[allow(clippy::cast_precision_loss)]
        let minutes = ((now - self.joined_at).num_seconds() as f64 / 60.0).max(1.0);
        PlayerSnapshot {
            name: self.name.clone(),
            verbose_name: self.verbose_name(),
            guid: self.guid.clone(),
            reserved: self.reserved,
            kills: self.kills,
            deaths: self.deaths,
            score: self.score,
            kpm: f64::from(self.kills) / minutes,
        }
    }
}

/// Immutable copy of a player's stats at the time of a kill
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlayerSnapshot {
    pub name: String,
    pub verbose_name: String,
    pub guid: Option<String>,
    pub reserved: bool,
    pub kills: u32,
    pub deaths: u32,
    pub score: i32,
    pub kpm: f64,
}

impl PlayerSnapshot {
    /// Kills per death; a player without deaths counts each kill
    #[must_use]
    pub fn kdr(&self) -> f64 {
        if self.deaths == 0 {
            f64::from(self.kills)
        } else {
            f64::from(self.kills) / f64::from(self.deaths)
        }
    }
}

/// Server details used in notifications
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub map: String,
    #[serde(default)]
    pub mode: String,
}

/// Shared, synchronized player store
#[derive(Debug, Clone, Default)]
pub struct PlayerDirectory {
    players: Arc<DashMap<String, Player>>,
    reserved: Arc<RwLock<HashSet<String>>>,
    server: Arc<RwLock<ServerInfo>>,
}

impl PlayerDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a player on join or first sighting
    pub fn join(&self, name: &str) {
        let reserved = self.is_reserved(name);
        self.players
            .entry(name.to_string())
            .and_modify(|player| player.online = true)
            .or_insert_with(|| {
                debug!("Player {name} joined");
                let mut player = Player::new(name);
                player.reserved = reserved;
                player
            });
    }

    /// Remove a departed player, returning the last known state
    pub fn leave(&self, name: &str) -> Option<Player> {
        self.players.remove(name).map(|(_, player)| player)
    }

    /// Apply a full roster refresh and return the players no longer present
    pub fn refresh(&self, roster: &[PlayerStats]) -> Vec<String> {
        let present: HashSet<&str> = roster.iter().map(|stats| stats.name.as_str()).collect();
        for stats in roster {
            let reserved = self.is_reserved(&stats.name);
            self.players
                .entry(stats.name.clone())
                .or_insert_with(|| {
                    let mut player = Player::new(stats.name.clone());
                    player.reserved = reserved;
                    player
                })
                .apply_stats(stats);
        }

        let departed: Vec<String> = self
            .players
            .iter()
            .filter(|entry| !present.contains(entry.key().as_str()))
            .map(|entry| entry.key().clone())
            .collect();
        for name in &departed {
            self.players.remove(name);
        }
        departed
    }

    /// Replace the reserved-slot list
    pub fn set_reserved(&self, names: impl IntoIterator<Item = String>) {
        let list: HashSet<String> = names.into_iter().collect();
        for mut entry in self.players.iter_mut() {
            entry.reserved = list.contains(entry.key());
        }
        *self.reserved.write().unwrap_or_else(PoisonError::into_inner) = list;
    }

    #[must_use]
    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Player> {
        self.players.get(name).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn snapshot(&self, name: &str) -> Option<PlayerSnapshot> {
        self.players
            .get(name)
            .map(|entry| entry.value().snapshot(Utc::now()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.players.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn set_server_info(&self, info: ServerInfo) {
        *self.server.write().unwrap_or_else(PoisonError::into_inner) = info;
    }

    #[must_use]
    pub fn server_info(&self) -> ServerInfo {
        self.server
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn stats(name: &str, kills: u32, deaths: u32) -> PlayerStats {
        PlayerStats {
            name: name.to_string(),
            kills,
            deaths,
            ..Default::default()
        }
    }

    #[test]
    fn test_join_and_leave() {
        let players = PlayerDirectory::new();
        players.join("Alpha");
        players.join("Alpha");
        assert_eq!(players.len(), 1);
        assert!(players.get("Alpha").is_some_and(|p| p.online));

        let left = players.leave("Alpha");
        assert_eq!(left.map(|p| p.name), Some("Alpha".to_string()));
        assert!(players.get("Alpha").is_none());
        assert!(players.leave("Alpha").is_none());
    }

    #[test]
    fn test_refresh_reports_departures() {
        let players = PlayerDirectory::new();
        players.join("Alpha");
        players.join("Bravo");

        let departed = players.refresh(&[stats("Alpha", 12, 3), stats("Charlie", 1, 1)]);
        assert_eq!(departed, vec!["Bravo".to_string()]);
        assert_eq!(players.len(), 2);
        let alpha = players.get("Alpha").unwrap();
        assert_eq!((alpha.kills, alpha.deaths), (12, 3));
        assert!(players.get("Charlie").is_some());
    }

    #[test]
    fn test_reserved_list_applies_to_known_and_new_players() {
        let players = PlayerDirectory::new();
        players.join("Alpha");
        players.set_reserved(vec!["Alpha".to_string(), "Bravo".to_string()]);
        assert!(players.get("Alpha").unwrap().reserved);

        players.join("Bravo");
        assert!(players.get("Bravo").unwrap().reserved);

        players.set_reserved(Vec::new());
        assert!(!players.get("Alpha").unwrap().reserved);
    }

    #[test]
    fn test_snapshot_ratios() {
        let mut player = Player::new("Alpha");
        player.kills = 30;
        player.deaths = 5;
        player.clan_tag = Some("FM".to_string());
        let now = player.joined_at + Duration::minutes(10);

        let snapshot = player.snapshot(now);
        assert_eq!(snapshot.verbose_name, "[FM]Alpha");
        assert!((snapshot.kdr() - 6.0).abs() < f64::EPSILON);
        assert!((snapshot.kpm - 3.0).abs() < f64::EPSILON);

        player.deaths = 0;
        assert!((player.snapshot(now).kdr() - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_server_info_round_trip() {
        let players = PlayerDirectory::new();
        players.set_server_info(ServerInfo {
            name: "Test Server".into(),
            map: "MP_Prison".into(),
            mode: "ConquestLarge0".into(),
        });
        assert_eq!(players.server_info().map, "MP_Prison");
    }
}
