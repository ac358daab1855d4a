//! Planet surface views: entering and leaving a terrain, and astronauts
//! walking around on it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use net::datagram::{MoveMode, TerrainEntityState};
use net::protocol::terrain_error;
use net::{HashedBlob, ServerPacket};
use persistence::{TerrainChunk, TerrainEntity, WorldStore};
use serde_json::{json, Map, Value};
use space::{ChunkKey, ObjectId};

use crate::agency::{lock, AgencyId};
use crate::world::World;

/// Walking speed in terrain units per second.
pub const ASTRONAUT_SPEED: f64 = 170.0;
const DEFAULT_WIDTH: f64 = 10_000.0;
const DEFAULT_HEIGHT: f64 = 4_000.0;
const SPAWN_SPACING: f64 = 8.0;
const ARRIVE_EPSILON: f64 = 1.0;

pub const KIND_BASE: &str = "base";
pub const KIND_ASTRONAUT: &str = "astronaut";

#[derive(Debug, Clone, Copy, PartialEq)]
enum Motion {
    Idle,
    Target { x: f64, y: f64 },
    Input { dx: f64, dy: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Mover {
    motion: Motion,
    dir_deg: f32,
}

#[derive(Debug)]
struct TerrainState {
    chunk: TerrainChunk,
    movers: BTreeMap<i64, Mover>,
    dirty: bool,
}

impl TerrainState {
    fn bounds(&self) -> (f64, f64) {
        let dim = |key: &str, default: f64| self.chunk.terrain.get(key).and_then(Value::as_f64).unwrap_or(default);
        (dim("width", DEFAULT_WIDTH), dim("height", DEFAULT_HEIGHT))
    }

    fn advance(&mut self, dt: f64) {
        let (width, height) = self.bounds();
        let step = ASTRONAUT_SPEED * dt;
        for (id, mover) in self.movers.iter_mut() {
            let Some(entity) = self.chunk.entities.iter_mut().find(|e| e.id == *id) else {
                continue;
            };
            let (dx, dy) = match mover.motion {
                Motion::Idle => continue,
                Motion::Target { x, y } => {
                    let (dx, dy) = (x - entity.x, y - entity.y);
                    let dist = dx.hypot(dy);
                    if dist <= step.max(ARRIVE_EPSILON) {
                        entity.x = x.clamp(0.0, width);
                        entity.y = y.clamp(0.0, height);
                        mover.motion = Motion::Idle;
                        self.dirty = true;
                        continue;
                    }
                    (dx / dist, dy / dist)
                }
                Motion::Input { dx, dy } => (dx, dy),
            };
            entity.x = (entity.x + dx * step).clamp(0.0, width);
            entity.y = (entity.y + dy * step).clamp(0.0, height);
            mover.dir_deg = dy.atan2(dx).to_degrees() as f32;
            self.dirty = true;
        }
    }

    fn entity_states(&self) -> Vec<TerrainEntityState> {
        self.chunk
            .entities
            .iter()
            .map(|e| {
                let mover = self.movers.get(&e.id);
                TerrainEntityState {
                    id: e.id,
                    x: e.x as f32,
                    y: e.y as f32,
                    moving: mover.is_some_and(|m| m.motion != Motion::Idle),
                    dir_deg: mover.map(|m| m.dir_deg).unwrap_or(0.0),
                }
            })
            .collect()
    }
}

/// Open terrains keyed by planet id.
#[derive(Debug, Default)]
pub struct TerrainRegistry {
    open: Mutex<BTreeMap<u64, TerrainState>>,
}

fn spot(defaults: &Map<String, Value>, key: &str) -> (f64, f64) {
    let v = defaults.get(key);
    let coord = |axis: &str| v.and_then(|o| o.get(axis)).and_then(Value::as_f64).unwrap_or(0.0);
    (coord("x"), coord("y"))
}

fn entity_agency(e: &TerrainEntity) -> Option<AgencyId> {
    e.data.get("agency").and_then(Value::as_u64)
}

fn data(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(m) => m,
        _ => Map::new(),
    }
}

impl TerrainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self, planet: u64) -> bool {
        lock(&self.open).contains_key(&planet)
    }

    /// Moves every walking astronaut by `dt` seconds and returns each open
    /// terrain's entity table.
    pub fn advance(&self, dt: f64) -> Vec<(u64, Vec<TerrainEntityState>)> {
        let mut open = lock(&self.open);
        open.iter_mut()
            .map(|(planet, state)| {
                state.advance(dt);
                (*planet, state.entity_states())
            })
            .collect()
    }

    /// Saves changed terrains and closes those nobody is viewing. Returns
    /// how many were written.
    pub fn flush(&self, store: &WorldStore, viewed: &BTreeSet<u64>) -> usize {
        let mut open = lock(&self.open);
        let mut saved = 0;
        for state in open.values_mut().filter(|s| s.dirty) {
            match store.save_terrain(&state.chunk) {
                Ok(()) => {
                    state.dirty = false;
                    saved += 1;
                }
                Err(e) => tracing::error!(planet = state.chunk.planet_id, error = %e, "terrain save failed"),
            }
        }
        open.retain(|planet, state| state.dirty || viewed.contains(planet));
        saved
    }

    fn set_motion(&self, planet: u64, entity: i64, motion: Motion) -> bool {
        let mut open = lock(&self.open);
        let Some(state) = open.get_mut(&planet) else {
            return false;
        };
        if state.chunk.entity(entity).is_none() {
            return false;
        }
        let mover = state.movers.entry(entity).or_insert(Mover {
            motion: Motion::Idle,
            dir_deg: 0.0,
        });
        mover.motion = motion;
        true
    }
}

/// ENTER_TERRAIN: validate, open the surface, reply with hash omission.
pub fn enter(world: &World, account: u64, planet: u64, last_hash: u64) -> ServerPacket {
    let reject = |error: u8| ServerPacket::EnterTerrainReply {
        error,
        planet,
        hash: 0,
        terrain: Vec::new(),
    };

    let Some(player) = world.players.get(account) else {
        return reject(terrain_error::NO_AGENCY);
    };
    let Some(agency_id) = player.agency else {
        return reject(terrain_error::NO_AGENCY);
    };
    let Some(chunk_key) = world.chunks.chunk_of(ObjectId(planet)) else {
        return reject(terrain_error::PLANET_NOT_LOADED);
    };
    if chunk_key != player.location() {
        return reject(terrain_error::NOT_IN_SAME_SYSTEM);
    }
    let Some(body) = world.chunks.with_object(ObjectId(planet), |o| o.clone()) else {
        return reject(terrain_error::PLANET_NOT_LOADED);
    };
    if !body.is_planet() || body.object_type.is_star() {
        return reject(terrain_error::NOT_A_PLANET);
    }
    let Some(agency) = world.agencies.get(agency_id) else {
        return reject(terrain_error::NO_AGENCY);
    };
    let (discovered, has_astronauts) = {
        let a = lock(&agency);
        let has_astronauts = a.astronauts_on(planet).next().is_some();
        (a.discovered_planets.contains(&planet), has_astronauts)
    };
    if !discovered {
        return reject(terrain_error::NOT_DISCOVERED);
    }
    if !has_astronauts && !has_landed_vessel(world, chunk_key, agency_id, planet) {
        return reject(terrain_error::NO_PRESENCE);
    }

    let online = world.online_agencies();
    let astronauts = astronauts_on(world, &online, planet);
    let defaults = world.catalog.current().terrain_defaults.clone();
    let (galaxy, system) = chunk_key.coords();

    let blob = {
        let mut open = lock(&world.terrain.open);
        if !open.contains_key(&planet) {
            let chunk = match world.chunks.store().load_terrain(galaxy, system, planet) {
                Ok(Some(c)) => c,
                Ok(None) => TerrainChunk::new(galaxy, system, planet, body.name.clone()),
                // An unreadable file stays on disk untouched for the operator.
                Err(e) => {
                    tracing::error!(planet, error = %e, "terrain load failed");
                    return reject(terrain_error::PLANET_NOT_LOADED);
                }
            };
            open.insert(
                planet,
                TerrainState {
                    chunk,
                    movers: BTreeMap::new(),
                    dirty: true,
                },
            );
        }
        let Some(state) = open.get_mut(&planet) else {
            return reject(terrain_error::PLANET_NOT_LOADED);
        };
        seed(state, &defaults, planet, &online, &astronauts);
        match state.chunk.to_compact_json() {
            Ok(bytes) => HashedBlob::new(bytes),
            Err(e) => {
                tracing::error!(planet, error = %e, "terrain encode failed");
                return reject(terrain_error::PLANET_NOT_LOADED);
            }
        }
    };

    world.players.update(account, |p| p.terrain_planet = Some(planet));
    world.broadcast_roster();

    let (hash, payload) = blob.reply_for(last_hash);
    tracing::debug!(account, planet, hash, omitted = payload.is_empty(), "terrain entered");
    ServerPacket::EnterTerrainReply {
        error: terrain_error::OK,
        planet,
        hash,
        terrain: payload.to_vec(),
    }
}

fn has_landed_vessel(world: &World, key: ChunkKey, agency: AgencyId, planet: u64) -> bool {
    world.chunks.objects_in(key).iter().any(|o| {
        o.vessel()
            .is_some_and(|v| v.agency == agency && v.landed.is_some_and(|l| l.body == ObjectId(planet)))
    })
}

/// `(agency, astronaut id, name)` for every online agency's astronaut on
/// `planet`.
fn astronauts_on(world: &World, online: &BTreeSet<AgencyId>, planet: u64) -> Vec<(AgencyId, u32, String)> {
    online
        .iter()
        .filter_map(|id| world.agencies.get(*id))
        .flat_map(|agency| {
            let a = lock(&agency);
            let found: Vec<_> = a.astronauts_on(planet).map(|s| (a.id, s.id, s.name.clone())).collect();
            found
        })
        .collect()
}

fn seed(
    state: &mut TerrainState,
    defaults: &Map<String, Value>,
    planet: u64,
    online: &BTreeSet<AgencyId>,
    astronauts: &[(AgencyId, u32, String)],
) {
    let chunk = &mut state.chunk;
    if chunk.merge_defaults(defaults) {
        state.dirty = true;
    }

    let base_id = -(planet as i64);
    if chunk.entity(base_id).is_none() {
        let (x, y) = spot(defaults, "base");
        chunk.upsert_entity(TerrainEntity {
            id: base_id,
            kind: KIND_BASE.to_string(),
            x,
            y,
            data: Map::new(),
        });
        state.dirty = true;
    }

    let (spawn_x, spawn_y) = spot(defaults, "spawn");
    for (idx, (agency, id, name)) in astronauts.iter().enumerate() {
        let id = *id as i64;
        if chunk.entity(id).is_some() {
            continue;
        }
        chunk.upsert_entity(TerrainEntity {
            id,
            kind: KIND_ASTRONAUT.to_string(),
            x: spawn_x + idx as f64 * SPAWN_SPACING,
            y: spawn_y,
            data: data(json!({ "agency": agency, "name": name })),
        });
        state.dirty = true;
    }

    let before = chunk.entities.len();
    chunk
        .entities
        .retain(|e| e.kind != KIND_ASTRONAUT || entity_agency(e).is_some_and(|a| online.contains(&a)));
    if chunk.entities.len() != before {
        let kept: BTreeSet<i64> = chunk.entities.iter().map(|e| e.id).collect();
        state.movers.retain(|id, _| kept.contains(id));
        state.dirty = true;
    }
}

/// EXIT_TERRAIN: stop viewing and let go of any astronauts.
pub fn exit(world: &World, account: u64) -> ServerPacket {
    let reply = |error: u8, planet: u64| ServerPacket::ExitTerrainReply { error, planet };
    let Some(player) = world.players.get(account) else {
        return reply(terrain_error::NO_AGENCY, 0);
    };
    let Some(agency_id) = player.agency else {
        return reply(terrain_error::NO_AGENCY, 0);
    };
    let Some(planet) = player.terrain_planet else {
        return reply(terrain_error::NOT_IN_TERRAIN, 0);
    };
    world.players.update(account, |p| p.terrain_planet = None);
    release_astronauts(world, agency_id, account);
    world.broadcast_roster();
    reply(terrain_error::OK, planet)
}

/// Frees astronauts steered by `account` and stops them where they stand.
pub fn release_astronauts(world: &World, agency_id: AgencyId, account: u64) {
    let Some(agency) = world.agencies.get(agency_id) else {
        return;
    };
    let released: Vec<(u64, u32)> = {
        let mut a = lock(&agency);
        let ids: Vec<(u64, u32)> = a
            .astronauts
            .values()
            .filter(|s| s.controller == Some(account))
            .map(|s| (s.planet, s.id))
            .collect();
        a.release_astronauts(account);
        ids
    };
    for (planet, id) in released {
        world.terrain.set_motion(planet, id as i64, Motion::Idle);
    }
}

/// ASTRONAUT_MOVE: claims the astronaut for `account` and sets its motion.
/// Returns false when the request was not applicable.
pub fn astronaut_move(world: &World, account: u64, astronaut: u32, mode: MoveMode, x: f32, y: f32) -> bool {
    let Some(player) = world.players.get(account) else {
        return false;
    };
    let (Some(agency_id), Some(planet)) = (player.agency, player.terrain_planet) else {
        return false;
    };
    let Some(agency) = world.agencies.get(agency_id) else {
        return false;
    };
    {
        let mut a = lock(&agency);
        let Some(s) = a.astronauts.get_mut(&astronaut) else {
            return false;
        };
        if s.planet != planet || s.controller.is_some_and(|c| c != account) {
            return false;
        }
        s.controller = Some(account);
    }
    let motion = match mode {
        MoveMode::Idle => Motion::Idle,
        MoveMode::Target => Motion::Target {
            x: x as f64,
            y: y as f64,
        },
        MoveMode::Input => {
            let (dx, dy) = (x as f64, y as f64);
            let len = dx.hypot(dy);
            if len < f64::EPSILON {
                Motion::Idle
            } else {
                Motion::Input {
                    dx: dx / len,
                    dy: dy / len,
                }
            }
        }
    };
    world.terrain.set_motion(planet, astronaut as i64, motion)
}
