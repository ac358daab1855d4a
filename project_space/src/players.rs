use std::collections::BTreeMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use space::ChunkKey;

/// Persistent per-account state. Survives reconnects and restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub account: u64,
    pub money: i64,
    pub galaxy: u32,
    pub system: u32,
    #[serde(default)]
    pub terrain_planet: Option<u64>,
    #[serde(default)]
    pub agency: Option<u64>,
    #[serde(default)]
    pub controlled_vessel: Option<u64>,
}

impl Player {
    pub fn new(account: u64, money: i64) -> Self {
        let (galaxy, system) = ChunkKey::HOME.coords();
        Self {
            account,
            money,
            galaxy,
            system,
            terrain_planet: None,
            agency: None,
            controlled_vessel: None,
        }
    }

    pub fn location(&self) -> ChunkKey {
        ChunkKey::from_coords(self.galaxy, self.system)
    }

    pub fn set_location(&mut self, key: ChunkKey) {
        let (galaxy, system) = key.coords();
        self.galaxy = galaxy;
        self.system = system;
    }
}

/// All players ever seen, keyed by account.
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    players: RwLock<BTreeMap<u64, Player>>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_players(players: Vec<Player>) -> Self {
        Self {
            players: RwLock::new(players.into_iter().map(|p| (p.account, p)).collect()),
        }
    }

    /// Returns the existing record or registers a fresh one at home.
    pub fn get_or_create(&self, account: u64, starting_money: i64) -> Player {
        let mut players = self.players.write().unwrap_or_else(|e| e.into_inner());
        players
            .entry(account)
            .or_insert_with(|| {
                tracing::info!(account, "new player registered");
                Player::new(account, starting_money)
            })
            .clone()
    }

    pub fn get(&self, account: u64) -> Option<Player> {
        self.players
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&account)
            .cloned()
    }

    /// Applies `f` to the stored record, if any.
    pub fn update<R>(&self, account: u64, f: impl FnOnce(&mut Player) -> R) -> Option<R> {
        self.players
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(&account)
            .map(f)
    }

    pub fn all(&self) -> Vec<Player> {
        self.players
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    pub fn agency_of(&self, account: u64) -> Option<u64> {
        self.get(account).and_then(|p| p.agency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_players_start_at_home_with_starting_money() {
        let reg = PlayerRegistry::new();
        let p = reg.get_or_create(5, 1234);
        assert_eq!(p.money, 1234);
        assert_eq!(p.location(), ChunkKey::HOME);
        assert!(p.agency.is_none());
    }

    #[test]
    fn get_or_create_keeps_existing_state() {
        let reg = PlayerRegistry::new();
        reg.get_or_create(5, 100);
        reg.update(5, |p| p.money = 7);
        assert_eq!(reg.get_or_create(5, 100).money, 7);
    }

    #[test]
    fn set_location_round_trips_through_coords() {
        let mut p = Player::new(1, 0);
        p.set_location(ChunkKey::Starmap { galaxy: 3 });
        assert_eq!((p.galaxy, p.system), (3, 0));
        assert_eq!(p.location(), ChunkKey::Starmap { galaxy: 3 });
    }
}
