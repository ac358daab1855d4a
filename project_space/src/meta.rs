//! Player and agency records on disk (`players.sa2.json`,
//! `agencies.sa2.json`), written atomically through the world store.

use persistence::{PersistenceError, WorldStore};

use crate::agency::{Agency, AgencyRegistry};
use crate::players::{Player, PlayerRegistry};

pub const PLAYERS_VERSION: u32 = 1;
pub const AGENCIES_VERSION: u32 = 1;

pub fn load_players(store: &WorldStore) -> Result<PlayerRegistry, PersistenceError> {
    let players: Vec<Player> = store
        .load_versioned(&store.layout().players_path(), PLAYERS_VERSION)?
        .unwrap_or_default();
    tracing::info!(count = players.len(), "players loaded");
    Ok(PlayerRegistry::from_players(players))
}

pub fn load_agencies(store: &WorldStore) -> Result<AgencyRegistry, PersistenceError> {
    let agencies: Vec<Agency> = store
        .load_versioned(&store.layout().agencies_path(), AGENCIES_VERSION)?
        .unwrap_or_default();
    tracing::info!(count = agencies.len(), "agencies loaded");
    Ok(AgencyRegistry::from_agencies(agencies))
}

/// Writes both files. Either failure is returned after attempting both.
pub fn save(store: &WorldStore, players: &PlayerRegistry, agencies: &AgencyRegistry) -> Result<(), PersistenceError> {
    let players_result = store.save_versioned(&store.layout().players_path(), PLAYERS_VERSION, &players.all());
    let agencies_result = store.save_versioned(
        &store.layout().agencies_path(),
        AGENCIES_VERSION,
        &agencies.export(),
    );
    players_result.and(agencies_result)
}
