//! Slow periodic work: the one-second agency tick, agency listings,
//! catalog reloads and autosave.

use std::sync::Arc;
use std::time::Duration;

use net::ServerPacket;
use tokio::task::JoinHandle;

use crate::agency::lock;
use crate::lifecycle::{spawn_periodic, ShutdownRx};
use crate::world::World;

pub const AGENCY_TICK: Duration = Duration::from_secs(1);
pub const AGENCY_LIST_EVERY: Duration = Duration::from_secs(30);

/// Income, construction and age for every agency, then fresh gamestate to
/// online members and the roster to everyone.
pub fn agency_second(world: &World) {
    let catalog = world.catalog.current();
    let online = world.online_agencies();
    for agency in world.agencies.all() {
        let (id, gamestate) = {
            let mut a = lock(&agency);
            a.tick_second(&catalog);
            let json = online.contains(&a.id).then(|| a.gamestate_json());
            (a.id, json)
        };
        if let Some(json) = gamestate {
            world.send_to_agency(id, &ServerPacket::AgencyGamestate { json });
        }
    }
    world.broadcast_roster();
}

pub fn agency_listing(world: &World) {
    world.broadcast(&world.agency_list_packet(), None);
}

/// Re-reads the catalog when its file changed and pushes it to clients.
pub fn reload_catalog(world: &World) -> bool {
    match world.catalog.reload_if_changed() {
        Ok(true) => {
            world.broadcast(&world.game_json_packet(), None);
            true
        }
        Ok(false) => false,
        Err(e) => {
            tracing::warn!(error = %e, "catalog reload failed, keeping the previous one");
            false
        }
    }
}

pub fn spawn(world: &Arc<World>, shutdown: &ShutdownRx) -> Vec<JoinHandle<()>> {
    let mut tasks = Vec::new();

    let w = world.clone();
    tasks.push(spawn_periodic("agency_tick", AGENCY_TICK, shutdown.clone(), move || {
        agency_second(&w)
    }));

    let w = world.clone();
    tasks.push(spawn_periodic("agency_list", AGENCY_LIST_EVERY, shutdown.clone(), move || {
        agency_listing(&w)
    }));

    let w = world.clone();
    let every = Duration::from_secs(world.config.world.catalog_reload_secs.max(1));
    tasks.push(spawn_periodic("catalog_reload", every, shutdown.clone(), move || {
        reload_catalog(&w);
    }));

    let w = world.clone();
    let every = Duration::from_secs(world.config.world.autosave_secs.max(1));
    tasks.push(spawn_periodic("autosave", every, shutdown.clone(), move || {
        let w = w.clone();
        tokio::task::spawn_blocking(move || w.save_all());
    }));

    tasks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::testing::TestWorld;
    use net::ClientPacket;

    #[test]
    fn agency_second_pays_income_and_updates_online_members() {
        let mut t = TestWorld::new();
        let a = t.join(1, 100);
        let b = t.join(2, 200);
        crate::dispatch::handle_packet(
            &t.world,
            a,
            ClientPacket::CreateAgency {
                is_public: true,
                name: "Earners".into(),
            },
        );
        let agency = t.world.players.agency_of(100).unwrap();
        let before = lock(&t.world.agencies.get(agency).unwrap()).treasury;
        t.drain();

        agency_second(&t.world);
        assert_eq!(lock(&t.world.agencies.get(agency).unwrap()).treasury, before + 10);

        let mut to_a = Vec::new();
        let mut to_b = Vec::new();
        while let Ok(o) = t.tcp.try_recv() {
            let (packet, _) = <ServerPacket as net::Decode>::decode_prefix(&o.bytes).unwrap();
            if o.session_id == a {
                to_a.push(packet);
            } else if o.session_id == b {
                to_b.push(packet);
            }
        }
        assert!(matches!(to_a[0], ServerPacket::AgencyGamestate { .. }));
        assert!(matches!(to_a[1], ServerPacket::PlayerRoster { .. }));
        assert_eq!(to_b.len(), 1);
        assert!(matches!(to_b[0], ServerPacket::PlayerRoster { .. }));
    }

    #[test]
    fn construction_finishes_after_its_build_time() {
        let mut t = TestWorld::new();
        let a = t.join(1, 100);
        crate::dispatch::handle_packet(
            &t.world,
            a,
            ClientPacket::CreateAgency {
                is_public: true,
                name: "Slow Build".into(),
            },
        );
        let home = t.world.home_planet();
        crate::dispatch::handle_packet(
            &t.world,
            a,
            ClientPacket::ConstructBuilding {
                planet: home,
                building_type: 3,
                angle: 10,
            },
        );
        let agency = t.world.agencies.get(t.world.players.agency_of(100).unwrap()).unwrap();
        for _ in 0..19 {
            agency_second(&t.world);
        }
        assert!(!lock(&agency).building(home, 3).unwrap().constructed);
        agency_second(&t.world);
        assert!(lock(&agency).building(home, 3).unwrap().constructed);
        assert_eq!(lock(&agency).income_per_second, 12);
    }

    #[test]
    fn listing_goes_to_every_identified_session() {
        let mut t = TestWorld::new();
        t.join(1, 100);
        t.join(2, 200);
        agency_listing(&t.world);
        let mut n = 0;
        while let Ok(o) = t.tcp.try_recv() {
            let (packet, _) = <ServerPacket as net::Decode>::decode_prefix(&o.bytes).unwrap();
            assert!(matches!(packet, ServerPacket::AgencyList { .. }));
            n += 1;
        }
        assert_eq!(n, 2);
    }

    #[test]
    fn fixed_catalog_never_reloads() {
        let mut t = TestWorld::new();
        t.join(1, 100);
        assert!(!reload_catalog(&t.world));
        assert!(t.tcp.try_recv().is_err());
    }
}
