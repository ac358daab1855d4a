//! Vessel construction and piloting.

use engine_core::unix_millis;
use net::{NotifyKind, ServerPacket, VesselAction};
use serde::Deserialize;
use space::{AttachedComponent, Body, DVec2, LandedState, ObjectId, ObjectType, SpaceObject, ThrustFlags, Vessel};

use crate::agency::{counters, lock};
use crate::error::{GameError, GameResult};
use crate::world::World;

/// Launchpads set the spawn angle around the planet when present.
const LAUNCHPAD: u16 = 2;
/// Physical radius of a vessel hull.
const VESSEL_RADIUS_KM: f64 = 0.01;

#[derive(Debug, Clone, Deserialize)]
pub struct VesselRequest {
    #[serde(default)]
    pub name: String,
    pub planet: u64,
    pub vessel_data: Vec<PartRequest>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PartRequest {
    pub id: u16,
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub stage: u8,
}

impl VesselRequest {
    pub fn parse(json: &str) -> GameResult<Self> {
        serde_json::from_str(json).map_err(|e| GameError::BadRequest(e.to_string()))
    }

    pub fn parts(&self) -> Vec<AttachedComponent> {
        self.vessel_data
            .iter()
            .map(|p| AttachedComponent {
                component_id: p.id,
                x: p.x,
                y: p.y,
                stage: p.stage,
            })
            .collect()
    }
}

fn vessel_object(id: ObjectId, name: &str, vessel: Vessel) -> SpaceObject {
    let mass = vessel.total_mass_kg();
    let name = if name.trim().is_empty() { "Vessel" } else { name.trim() };
    SpaceObject::new(id, ObjectType::BasicVessel, name)
        .with_mass(mass, VESSEL_RADIUS_KM)
        .with_body(Body::Vessel(Box::new(vessel)))
}

/// Builds a vessel on a planet in the player's current system. The agency
/// pays the summed component cost; the vessel starts landed and free.
pub fn construct_vessel(world: &World, account: u64, request: &str) -> GameResult<ObjectId> {
    let request = VesselRequest::parse(request)?;
    let catalog = world.catalog.current();
    let parts = request.parts();
    let cost = catalog.validate_layout(&parts)?;

    let player = world.players.get(account).ok_or(GameError::NoPlayer)?;
    let agency_id = player.agency.ok_or(GameError::NoAgency)?;
    let agency = world.agencies.get(agency_id).ok_or(GameError::AgencyNotFound)?;
    let key = player.location();
    let planet = world
        .planet_in(key, request.planet)
        .filter(|p| !p.object_type.is_star())
        .ok_or(GameError::PlanetNotFound)?;

    let (angle, agency_name) = {
        let mut a = lock(&agency);
        if !a.discovered_planets.contains(&request.planet) {
            return Err(GameError::PlanetNotDiscovered);
        }
        a.spend(cost)?;
        let angle = a.building(request.planet, LAUNCHPAD).map(|b| b.angle).unwrap_or(0);
        (angle, a.name.clone())
    };

    let mut vessel = Vessel::new(agency_id, account, parts);
    vessel.apply_stats(catalog.stats_for(&vessel.components), true);
    let dir = DVec2::from_angle((angle as f64).to_radians());
    let offset = dir * planet.radius_km;
    vessel.landed = Some(LandedState {
        body: planet.id,
        offset,
    });

    let id = world.chunks.allocate_id();
    let mut object = vessel_object(id, &request.name, vessel).at(planet.position + offset, planet.velocity);
    object.rotation = angle as f64;
    let vessel_name = object.name.clone();

    if let Err(e) = world.chunks.spawn_object(key, object, unix_millis()) {
        tracing::error!(error = %e, account, "vessel spawn failed");
        lock(&agency).refund(cost);
        return Err(GameError::Internal);
    }

    let completed = lock(&agency).bump_counter(&catalog, counters::VESSELS_LAUNCHED, 1);
    tracing::info!(vessel = id.0, agency = agency_id, cost, "vessel constructed");
    world.notify_agency(
        agency_id,
        NotifyKind::Success,
        format!("{agency_name} launched {vessel_name} from {}", planet.name),
    );
    world.quests_completed(agency_id, &completed);
    world.stats().vessel_launched(agency_id, id.0);
    Ok(id)
}

/// Applies one VESSEL_CONTROL key for `account`.
pub fn control_vessel(world: &World, account: u64, vessel: u64, action: VesselAction) -> GameResult<()> {
    let id = ObjectId(vessel);
    match action {
        VesselAction::RequestControl => request_control(world, account, id),
        VesselAction::ReleaseControl => {
            if release_vessel(world, account, id) {
                Ok(())
            } else {
                Err(GameError::NotController)
            }
        }
        VesselAction::DeployStage => deploy_stage(world, account, id),
        other => world
            .chunks
            .with_object_mut(id, |o| {
                let v = controlled(o, account)?;
                match other {
                    VesselAction::Thrust(on) => v.flags.set(ThrustFlags::THRUST, on),
                    VesselAction::RotateLeft(on) => v.flags.set(ThrustFlags::ROTATE_LEFT, on),
                    VesselAction::RotateRight(on) => v.flags.set(ThrustFlags::ROTATE_RIGHT, on),
                    VesselAction::SetTelescopeTargetAngle(deg) => v.telescope_target_deg = deg.rem_euclid(360.0),
                    VesselAction::SetSystemState { system, state } => {
                        v.systems.insert(system, state);
                    }
                    _ => {}
                }
                Ok(())
            })
            .ok_or(GameError::VesselNotFound)?,
    }
}

fn controlled(object: &mut SpaceObject, account: u64) -> GameResult<&mut Vessel> {
    let v = object.vessel_mut().ok_or(GameError::VesselNotFound)?;
    if v.controller != Some(account) {
        return Err(GameError::NotController);
    }
    Ok(v)
}

fn request_control(world: &World, account: u64, id: ObjectId) -> GameResult<()> {
    let player = world.players.get(account).ok_or(GameError::NoPlayer)?;
    let agency = player.agency.ok_or(GameError::NoAgency)?;

    world
        .chunks
        .with_object_mut(id, |o| {
            let v = o.vessel_mut().ok_or(GameError::VesselNotFound)?;
            if v.agency != agency {
                return Err(GameError::VesselNotFound);
            }
            match v.controller {
                Some(other) if other != account => Err(GameError::VesselControlled),
                _ => {
                    v.controller = Some(account);
                    Ok(())
                }
            }
        })
        .ok_or(GameError::VesselNotFound)??;

    if let Some(previous) = player.controlled_vessel.filter(|&p| p != id.0) {
        release_vessel(world, account, ObjectId(previous));
    }

    let key = world.chunks.chunk_of(id).ok_or(GameError::VesselNotFound)?;
    if let Err(e) = world.chunks.set_occupant(account, key, Some(id), unix_millis()) {
        tracing::error!(error = %e, account, vessel = id.0, "occupant move failed");
        return Err(GameError::Internal);
    }
    world.players.update(account, |p| {
        p.controlled_vessel = Some(id.0);
        p.set_location(key);
    });
    world.broadcast(
        &ServerPacket::VesselController {
            vessel: id.0,
            controller: account,
        },
        None,
    );
    tracing::debug!(account, vessel = id.0, "vessel control taken");
    Ok(())
}

/// Frees `id` if `account` controls it and tells everyone. Returns whether
/// anything was released.
pub fn release_vessel(world: &World, account: u64, id: ObjectId) -> bool {
    let released = world
        .chunks
        .with_object_mut(id, |o| match o.vessel_mut() {
            Some(v) if v.controller == Some(account) => {
                v.controller = None;
                v.flags.clear();
                true
            }
            _ => false,
        })
        .unwrap_or(false);

    let was_flying = world
        .players
        .update(account, |p| {
            let flying = p.controlled_vessel == Some(id.0);
            if flying {
                p.controlled_vessel = None;
            }
            flying
        })
        .unwrap_or(false);
    if was_flying {
        world.chunks.set_controlled_vessel(account, None);
    }
    if released {
        world.broadcast(
            &ServerPacket::VesselController {
                vessel: id.0,
                controller: 0,
            },
            None,
        );
    }
    released
}

/// Releases whatever `account` was flying. Used when the player leaves.
pub fn release_controlled(world: &World, account: u64) {
    if let Some(vessel) = world.players.get(account).and_then(|p| p.controlled_vessel) {
        release_vessel(world, account, ObjectId(vessel));
    }
}

/// Detaches the top stage. The dropped parts keep flying as a separate,
/// uncontrolled vessel of the same agency.
fn deploy_stage(world: &World, account: u64, id: ObjectId) -> GameResult<()> {
    let catalog = world.catalog.current();
    let debris = world
        .chunks
        .with_object_mut(id, |o| {
            let (position, velocity, rotation) = (o.position, o.velocity, o.rotation);
            let v = controlled(o, account)?;
            let dropped = v.deploy_stage();
            if dropped.is_empty() {
                return Ok(None);
            }
            v.apply_stats(catalog.stats_for(&v.components), false);
            let mut piece = Vessel::new(v.agency, v.constructed_by, dropped);
            piece.apply_stats(catalog.stats_for(&piece.components), false);
            piece.landed = v.landed;
            let mass = v.total_mass_kg();
            o.mass_kg = mass;
            Ok(Some((piece, position, velocity, rotation)))
        })
        .ok_or(GameError::VesselNotFound)??;

    let Some((piece, position, velocity, rotation)) = debris else {
        return Ok(());
    };
    let key = world.chunks.chunk_of(id).ok_or(GameError::VesselNotFound)?;
    let mut object = vessel_object(world.chunks.allocate_id(), "Debris", piece).at(position, velocity);
    object.rotation = rotation;
    match world.chunks.spawn_object(key, object, unix_millis()) {
        Ok(debris) => tracing::debug!(vessel = id.0, debris = debris.0, "stage deployed"),
        Err(e) => tracing::warn!(error = %e, vessel = id.0, "stage debris not spawned"),
    }
    Ok(())
}
