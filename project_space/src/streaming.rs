//! UDP streaming loops. Every datagram is addressed by chunk membership:
//! a player hears about the chunk their occupant sits in and nothing else.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use engine_core::SimEvent;
use net::datagram::{next_stream_seq, PlayerSummaryEntry, StreamedObject};
use net::{NotifyKind, ServerDatagram, ServerPacket};
use session::SessionView;
use space::object::wrap_degrees;
use space::{ChunkKey, DVec2, ObjectId, SpaceObject};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use crate::agency::{counters, lock, AgencyId};
use crate::config::period_for_hz;
use crate::lifecycle::{spawn_periodic, ShutdownRx};
use crate::world::{DatagramRx, World};

/// Identified sessions with a bound UDP endpoint, by account.
fn bound_sessions(world: &World) -> BTreeMap<u64, (SessionView, SocketAddr)> {
    world
        .sessions()
        .broadcast_snapshot()
        .into_iter()
        .filter_map(|v| v.udp_addr.map(|addr| (v.account, (v, addr))))
        .collect()
}

/// Bound occupants grouped by the chunk they are in.
fn audiences(world: &World) -> BTreeMap<ChunkKey, Vec<(SessionView, SocketAddr, Option<ObjectId>)>> {
    let bound = bound_sessions(world);
    let mut by_chunk: BTreeMap<ChunkKey, Vec<_>> = BTreeMap::new();
    for (account, occ) in world.chunks.occupants() {
        if let Some(&(view, addr)) = bound.get(&account) {
            by_chunk.entry(occ.location).or_default().push((view, addr, occ.vessel));
        }
    }
    by_chunk
}

/// Per-chunk OBJECT_STREAM state kept by the position loop.
#[derive(Debug, Default)]
pub struct PositionStream {
    seqs: BTreeMap<ChunkKey, u16>,
    sent_frames: BTreeMap<ChunkKey, u64>,
}

impl PositionStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends each occupied chunk's newest frame to the players inside it.
    /// A frame already sent is not repeated. Returns the frames sent.
    pub fn send(&mut self, world: &World) -> usize {
        let audiences = audiences(world);
        self.seqs.retain(|k, _| audiences.contains_key(k));
        self.sent_frames.retain(|k, _| audiences.contains_key(k));

        let mut sent = 0;
        for (key, members) in audiences {
            let Some(frame) = world.chunks.frame(key) else {
                continue;
            };
            if self.sent_frames.get(&key) == Some(&frame.seq) {
                continue;
            }
            self.sent_frames.insert(key, frame.seq);

            let seq = self.seqs.entry(key).or_insert(0);
            let objects: Vec<StreamedObject> = frame
                .objects
                .iter()
                .map(|o| StreamedObject {
                    id: o.id.to_u64(),
                    x: o.position.x.round() as i64,
                    y: o.position.y.round() as i64,
                    vx: o.velocity.x as f32,
                    vy: o.velocity.y as f32,
                    rotation: o.rotation as f32,
                })
                .collect();
            for datagram in ServerDatagram::object_stream_batches(*seq, &objects) {
                for (_, addr, _) in &members {
                    world.send_datagram(*addr, datagram.clone());
                }
            }
            *seq = next_stream_seq(*seq);
            sent += 1;
        }
        sent
    }
}

/// PLAYER_SUMMARY per chunk: who is here and what they fly.
pub fn send_player_summaries(world: &World) {
    for (_, members) in audiences(world) {
        let entries: Vec<PlayerSummaryEntry> = members
            .iter()
            .map(|(view, _, vessel)| PlayerSummaryEntry {
                account: view.account,
                temp_id: view.temp_id,
                vessel: vessel.map(ObjectId::to_u64).unwrap_or(0),
            })
            .collect();
        let datagram = ServerDatagram::PlayerSummary { entries };
        for (_, addr, _) in &members {
            world.send_datagram(*addr, datagram.clone());
        }
    }
}

/// What the field loop needs from a vessel, copied out under the chunk lock.
struct VesselSample {
    state: ServerDatagram,
    cargo: ServerDatagram,
    agency: AgencyId,
    position: DVec2,
    aim_deg: f64,
    fov_deg: f64,
    range_km: f64,
}

impl VesselSample {
    fn of(object: &SpaceObject) -> Option<Self> {
        let v = object.vessel()?;
        let id = object.id.to_u64();
        Some(Self {
            state: ServerDatagram::VesselState {
                vessel: id,
                fuel: v.fuel as f32,
                power: v.power as f32,
                hull: v.hull as f32,
                temperature: v.temperature_k as f32,
                stage: v.stage,
                flags: v.flags.bits(),
                landed: v.landed.is_some(),
            },
            cargo: ServerDatagram::Cargo {
                vessel: id,
                items: v.cargo.iter().map(|(&r, &n)| (r, n)).collect(),
            },
            agency: v.agency,
            position: object.position,
            aim_deg: object.rotation + v.telescope_target_deg as f64,
            fov_deg: v.stats.telescope_fov_deg,
            range_km: v.stats.telescope_range_km,
        })
    }
}

/// Planets inside the telescope cone, in catalogue order.
fn sighted(world: &World, key: ChunkKey, sample: &VesselSample) -> Vec<SpaceObject> {
    let km_per_unit = key.scale().km_per_unit();
    let half = sample.fov_deg / 2.0;
    world
        .chunks
        .planets_in(key)
        .into_iter()
        .filter(|p| !p.object_type.is_star())
        .filter(|p| {
            let to = p.position - sample.position;
            let distance_km = to.length() * km_per_unit;
            if distance_km <= f64::EPSILON || distance_km > sample.range_km {
                return false;
            }
            let off = wrap_degrees(to.y.atan2(to.x).to_degrees() - sample.aim_deg);
            off.min(360.0 - off) <= half
        })
        .collect()
}

fn discover(world: &World, agency_id: AgencyId, planets: &[SpaceObject], vessel_name: &str) {
    let Some(agency) = world.agencies.get(agency_id) else {
        return;
    };
    let catalog = world.catalog.current();
    let (found, completed) = {
        let mut a = lock(&agency);
        let before = a.completed_quests();
        let found: Vec<&SpaceObject> = planets.iter().filter(|p| a.discover(&catalog, p.id.to_u64())).collect();
        let completed: Vec<u32> = a.completed_quests().difference(&before).copied().collect();
        (found, completed)
    };
    for planet in found {
        tracing::info!(agency = agency_id, planet = %planet.id, "planet discovered");
        world.notify_agency(
            agency_id,
            NotifyKind::Success,
            format!("{vessel_name} discovered {}", planet.name),
        );
    }
    world.quests_completed(agency_id, &completed);
}

/// The 5 Hz samples: VESSEL_STATE, CARGO and TELESCOPE_SIGHT to each
/// controller, then TERRAIN_ENTITIES to everyone viewing an open terrain.
pub fn sample_fields(world: &World, dt: f64) {
    let bound = bound_sessions(world);
    for (account, occ) in world.chunks.occupants() {
        let (Some(vessel), Some(&(_, addr))) = (occ.vessel, bound.get(&account)) else {
            continue;
        };
        let Some((sample, name)) = world
            .chunks
            .with_object(vessel, |o| VesselSample::of(o).map(|s| (s, o.name.clone())))
            .flatten()
        else {
            continue;
        };
        world.send_datagram(addr, sample.state.clone());
        world.send_datagram(addr, sample.cargo.clone());

        if sample.fov_deg > 0.0 {
            let planets = sighted(world, occ.location, &sample);
            world.send_datagram(
                addr,
                ServerDatagram::TelescopeSight {
                    vessel: vessel.to_u64(),
                    fov_deg: sample.fov_deg as f32,
                    objects: planets.iter().map(|p| p.id.to_u64()).collect(),
                },
            );
            discover(world, sample.agency, &planets, &name);
        }
    }

    for (planet, entities) in world.terrain.advance(dt) {
        let datagram = ServerDatagram::TerrainEntities { planet, entities };
        for (account, (_, addr)) in &bound {
            let viewing = world.players.get(*account).and_then(|p| p.terrain_planet) == Some(planet);
            if viewing {
                world.send_datagram(*addr, datagram.clone());
            }
        }
    }
}

/// Turns one simulation outcome into player state changes and datagrams.
pub fn relay_event(world: &World, event: SimEvent) {
    match event {
        SimEvent::ObjectDestroyed {
            object,
            chunk,
            controller,
            ..
        } => {
            let datagram = ServerDatagram::ObjectDestroyed {
                object: object.to_u64(),
            };
            let bound = bound_sessions(world);
            for account in world.chunks.occupants_of(chunk) {
                if let Some(&(_, addr)) = bound.get(&account) {
                    world.send_datagram(addr, datagram.clone());
                }
            }
            if let Some(account) = controller {
                let was_flying = world
                    .players
                    .update(account, |p| {
                        let flying = p.controlled_vessel == Some(object.to_u64());
                        if flying {
                            p.controlled_vessel = None;
                        }
                        flying
                    })
                    .unwrap_or(false);
                if was_flying {
                    world.chunks.set_controlled_vessel(account, None);
                }
                world.broadcast(
                    &ServerPacket::VesselController {
                        vessel: object.to_u64(),
                        controller: 0,
                    },
                    None,
                );
            }
        }
        SimEvent::RegionEntered {
            vessel,
            region,
            controller: Some(account),
        } => {
            let addr = world.sessions().session_for_account(account).and_then(|s| s.udp_addr);
            if let Some(addr) = addr {
                world.send_datagram(
                    addr,
                    ServerDatagram::RegionCue {
                        vessel: vessel.to_u64(),
                        region,
                    },
                );
            }
        }
        SimEvent::RegionEntered { controller: None, .. } => {}
        SimEvent::VesselLanded { vessel, body, chunk } => {
            let Some(agency_id) = world.chunks.with_object(vessel, |o| o.vessel().map(|v| v.agency)).flatten() else {
                return;
            };
            let Some(agency) = world.agencies.get(agency_id) else {
                return;
            };
            let catalog = world.catalog.current();
            let completed = {
                let mut a = lock(&agency);
                let before = a.completed_quests();
                a.discover(&catalog, body.to_u64());
                a.bump_counter(&catalog, counters::LANDINGS, 1);
                let completed: Vec<u32> = a.completed_quests().difference(&before).copied().collect();
                completed
            };
            tracing::info!(vessel = %vessel, body = %body, chunk = %chunk, "vessel landed");
            world.quests_completed(agency_id, &completed);
        }
        SimEvent::PlayerTransferred { account, to, .. } => {
            // A surface view never survives leaving the chunk that holds the planet.
            let left_terrain = world
                .players
                .update(account, |p| {
                    p.set_location(to);
                    p.terrain_planet.take().map(|_| p.agency)
                })
                .flatten();
            if let Some(agency) = left_terrain {
                if let Some(agency_id) = agency {
                    crate::terrain::release_astronauts(world, agency_id, account);
                }
                world.broadcast_roster();
            }
        }
        SimEvent::ChunkLoaded { key } => tracing::debug!(chunk = %key, "chunk resident"),
        SimEvent::ChunkEvicted { key } => tracing::debug!(chunk = %key, "chunk evicted"),
    }
}

/// Drains everything the tick loop produced since the last call.
pub fn relay_sim_events(world: &World) -> usize {
    let events = world.chunks.drain_events();
    let n = events.len();
    for event in events {
        relay_event(world, event);
    }
    n
}

/// Writes queued datagrams to the socket until shutdown.
pub async fn run_udp_sender(socket: Arc<UdpSocket>, mut rx: DatagramRx, mut shutdown: ShutdownRx) {
    loop {
        tokio::select! {
            next = rx.recv() => match next {
                Some((to, datagram)) => {
                    net::udp::send_datagram(&socket, &datagram, to).await;
                }
                None => return,
            },
            _ = shutdown.wait() => {
                tracing::debug!("udp sender stopping");
                return;
            }
        }
    }
}

/// Starts the position, player-summary and field loops.
pub fn spawn(world: &Arc<World>, shutdown: &ShutdownRx) -> Vec<JoinHandle<()>> {
    let stream = &world.config.stream;
    let mut tasks = Vec::new();

    let w = world.clone();
    let mut positions = PositionStream::new();
    tasks.push(spawn_periodic(
        "positions",
        period_for_hz(stream.positions_hz),
        shutdown.clone(),
        move || {
            relay_sim_events(&w);
            positions.send(&w);
        },
    ));

    let w = world.clone();
    tasks.push(spawn_periodic(
        "player_summary",
        period_for_hz(stream.players_hz),
        shutdown.clone(),
        move || send_player_summaries(&w),
    ));

    let w = world.clone();
    let period = period_for_hz(stream.fields_hz);
    let dt = period.as_secs_f64();
    tasks.push(spawn_periodic("fields", period, shutdown.clone(), move || {
        sample_fields(&w, dt)
    }));

    tasks
}
