mod common;

use common::{Client, TestServer};
use net::{ClientPacket, ServerPacket};
use project_space::agency::lock;
use space::ChunkKey;

const LAUNCHPAD: u16 = 2;
const LAUNCHPAD_COST: i64 = 15_000;

/// Every packet sent before this one has been handled once it returns.
async fn sync(client: &mut Client) {
    client.send(&ClientPacket::Keepalive).await;
    client.recv_until(|p| *p == ServerPacket::Keepalive).await;
}

async fn found_agency(client: &mut Client, name: &str) {
    client
        .send(&ClientPacket::CreateAgency {
            is_public: true,
            name: name.into(),
        })
        .await;
    let reply = client
        .recv_until(|p| matches!(p, ServerPacket::CreateAgencyReply { .. }))
        .await;
    assert_eq!(reply, ServerPacket::CreateAgencyReply { error: 0 });
}

#[tokio::test]
async fn racing_construction_charges_once() {
    let server = TestServer::start().await;
    let world = server.handle.world.clone();
    let home = world.home_planet();

    let mut a = server.connect().await;
    a.identify(100).await;
    found_agency(&mut a, "Racers").await;
    let agency_id = world.players.agency_of(100).unwrap();

    let mut b = server.connect().await;
    b.identify(200).await;
    b.send(&ClientPacket::JoinPublicAgency { agency: agency_id }).await;
    sync(&mut b).await;
    assert_eq!(world.players.agency_of(200), Some(agency_id));

    let agency = world.agencies.get(agency_id).unwrap();
    let before = lock(&agency).treasury;
    let build = ClientPacket::ConstructBuilding {
        planet: home,
        building_type: LAUNCHPAD,
        angle: 90,
    };
    tokio::join!(a.send(&build), b.send(&build));
    sync(&mut a).await;
    sync(&mut b).await;

    let (after, income) = {
        let a = lock(&agency);
        assert!(a.building(home, LAUNCHPAD).is_some());
        (a.treasury, a.income_per_second)
    };
    // Income keeps accruing once a second while the test runs.
    let charged = before - after;
    assert!(
        charged <= LAUNCHPAD_COST && charged > LAUNCHPAD_COST - 10 * income.max(1),
        "charged {charged}"
    );
    server.stop().await;
}

#[tokio::test]
async fn unchanged_terrain_is_not_resent() {
    let server = TestServer::start().await;
    let home = server.handle.world.home_planet();
    let mut a = server.connect().await;
    a.identify(100).await;
    found_agency(&mut a, "Surveyors").await;

    a.send(&ClientPacket::EnterTerrain {
        planet: home,
        last_hash: 0,
    })
    .await;
    let ServerPacket::EnterTerrainReply {
        error,
        hash,
        terrain,
        ..
    } = a
        .recv_until(|p| matches!(p, ServerPacket::EnterTerrainReply { .. }))
        .await
    else {
        unreachable!();
    };
    assert_eq!(error, 0);
    assert_ne!(hash, 0);
    assert!(!terrain.is_empty());

    a.send(&ClientPacket::EnterTerrain {
        planet: home,
        last_hash: hash,
    })
    .await;
    let again = a
        .recv_until(|p| matches!(p, ServerPacket::EnterTerrainReply { .. }))
        .await;
    assert_eq!(
        again,
        ServerPacket::EnterTerrainReply {
            error: 0,
            planet: home,
            hash,
            terrain: Vec::new(),
        }
    );
    server.stop().await;
}

#[tokio::test]
async fn world_survives_a_restart() {
    let server = TestServer::start().await;
    let home = server.handle.world.home_planet();
    let mut a = server.connect().await;
    a.identify(100).await;
    found_agency(&mut a, "Keepers").await;
    let request = format!(
        r#"{{"name":"Ark","planet":{home},"vessel_data":[{{"id":1,"x":0,"y":0}},{{"id":2,"x":0,"y":1}}]}}"#
    );
    a.send(&ClientPacket::ConstructVessel { request }).await;
    sync(&mut a).await;
    drop(a);

    let dir = server.stop().await;
    let server = TestServer::start_in(dir).await;
    let world = &server.handle.world;

    let objects = world.chunks.objects_in(ChunkKey::HOME);
    let ark = objects.iter().find(|o| o.name == "Ark").expect("vessel persisted");
    assert!(ark.vessel().is_some_and(|v| v.landed.is_some()));
    let highest = objects.iter().map(|o| o.id.to_u64()).max().unwrap();
    assert!(world.chunks.next_object_id() > highest);

    let agency_id = world.players.agency_of(100).expect("membership persisted");
    assert_eq!(lock(&world.agencies.get(agency_id).unwrap()).name, "Keepers");
    server.stop().await;
}
