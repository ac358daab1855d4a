use std::collections::BTreeMap;

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::ids::ObjectId;
use crate::object::{wrap_degrees, Body, SpaceObject};
use crate::physics::{self, Particle};
use crate::scale::{ChunkKey, Scale};
use crate::snapshot::ChunkSnapshot;
use crate::vessel::{LandedState, ThrustFlags};

/// Touchdown speed (km/s, relative to the body) above which a vessel is lost.
pub const MAX_LANDING_SPEED: f64 = 0.5;
/// Touchdowns slower than this are free; faster ones cost hull.
const SAFE_LANDING_SPEED: f64 = 0.2;

#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error("object {0} already present in chunk")]
    DuplicateObject(ObjectId),

    #[error("object {0} not found in chunk")]
    ObjectNotFound(ObjectId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimMode {
    Live,
    Extrapolated,
}

/// Something that happened to an object while the chunk advanced.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkEvent {
    Destroyed {
        object: ObjectId,
        agency: u64,
        controller: Option<u64>,
    },
    Landed {
        vessel: ObjectId,
        body: ObjectId,
    },
    RegionEntered {
        vessel: ObjectId,
        region: u32,
        controller: Option<u64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectState {
    pub id: ObjectId,
    pub position: DVec2,
    pub velocity: DVec2,
    pub rotation: f64,
}

/// Kinematic snapshot of one chunk taken right after a step.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkFrame {
    pub key: ChunkKey,
    pub seq: u64,
    pub objects: Vec<ObjectState>,
}

#[derive(Debug, Clone)]
pub struct Chunk {
    key: ChunkKey,
    objects: BTreeMap<ObjectId, SpaceObject>,
    tick_seq: u64,
    last_advanced_ms: u64,
    mode: SimMode,
}

impl Chunk {
    /// A new, empty chunk. Chunks start extrapolated; occupancy promotes them.
    pub fn new(key: ChunkKey, now_ms: u64) -> Self {
        Self {
            key,
            objects: BTreeMap::new(),
            tick_seq: 0,
            last_advanced_ms: now_ms,
            mode: SimMode::Extrapolated,
        }
    }

    pub fn from_snapshot(snapshot: ChunkSnapshot) -> Self {
        Self {
            key: snapshot.key,
            objects: snapshot.objects.into_iter().map(|o| (o.id, o)).collect(),
            tick_seq: snapshot.tick_seq,
            last_advanced_ms: snapshot.last_advanced_ms,
            mode: SimMode::Extrapolated,
        }
    }

    pub fn to_snapshot(&self) -> ChunkSnapshot {
        ChunkSnapshot::new(
            self.key,
            self.tick_seq,
            self.last_advanced_ms,
            self.objects.values().cloned().collect(),
        )
    }

    pub fn key(&self) -> ChunkKey {
        self.key
    }

    pub fn scale(&self) -> Scale {
        self.key.scale()
    }

    pub fn mode(&self) -> SimMode {
        self.mode
    }

    pub fn is_live(&self) -> bool {
        self.mode == SimMode::Live
    }

    pub fn tick_seq(&self) -> u64 {
        self.tick_seq
    }

    pub fn last_advanced_ms(&self) -> u64 {
        self.last_advanced_ms
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn max_object_id(&self) -> u64 {
        self.objects.keys().next_back().map_or(0, |id| id.0)
    }

    pub fn insert(&mut self, object: SpaceObject) -> Result<(), ChunkError> {
        if self.objects.contains_key(&object.id) {
            return Err(ChunkError::DuplicateObject(object.id));
        }
        self.objects.insert(object.id, object);
        Ok(())
    }

    pub fn remove(&mut self, id: ObjectId) -> Result<SpaceObject, ChunkError> {
        self.objects.remove(&id).ok_or(ChunkError::ObjectNotFound(id))
    }

    pub fn get(&self, id: ObjectId) -> Option<&SpaceObject> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut SpaceObject> {
        self.objects.get_mut(&id)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn objects(&self) -> impl Iterator<Item = &SpaceObject> {
        self.objects.values()
    }

    pub fn object_ids(&self) -> Vec<ObjectId> {
        self.objects.keys().copied().collect()
    }

    /// Fast-forwards by the wall time elapsed since the chunk was last
    /// advanced, then switches to live integration.
    pub fn promote(&mut self, now_ms: u64, sim_rate: f64) -> Vec<ChunkEvent> {
        if self.mode == SimMode::Live {
            return Vec::new();
        }
        let elapsed_s = now_ms.saturating_sub(self.last_advanced_ms) as f64 / 1000.0;
        let events = self.extrapolate(elapsed_s * sim_rate);
        tracing::trace!(key = ?self.key, elapsed_s, objects = self.objects.len(), "chunk promoted");
        self.last_advanced_ms = now_ms;
        self.mode = SimMode::Live;
        events
    }

    pub fn demote(&mut self, now_ms: u64) {
        if self.mode == SimMode::Extrapolated {
            return;
        }
        for obj in self.objects.values_mut() {
            if let Some(v) = obj.vessel_mut() {
                v.flags.clear();
            }
        }
        self.last_advanced_ms = now_ms;
        self.mode = SimMode::Extrapolated;
    }

    /// Brings an extrapolated chunk's clock up to date without integrating,
    /// used before persisting so the saved positions match the saved time.
    pub fn catch_up(&mut self, now_ms: u64, sim_rate: f64) -> Vec<ChunkEvent> {
        if self.mode == SimMode::Live {
            return Vec::new();
        }
        let elapsed_s = now_ms.saturating_sub(self.last_advanced_ms) as f64 / 1000.0;
        let events = self.extrapolate(elapsed_s * sim_rate);
        self.last_advanced_ms = now_ms;
        events
    }

    /// Analytic fast-forward by `t` simulated seconds: straight-line motion
    /// at the current velocity, bodies spin at their fixed rate.
    pub fn extrapolate(&mut self, t: f64) -> Vec<ChunkEvent> {
        for obj in self.objects.values_mut() {
            if let Body::Planet(p) = &obj.body {
                obj.rotation = wrap_degrees(obj.rotation + p.spin_rate() * t);
            }
            let landed = obj.vessel().is_some_and(|v| v.landed.is_some());
            if !landed {
                obj.position += obj.velocity * t;
            }
        }
        self.settle(0.0)
    }

    /// One live integration step of `dt` simulated seconds.
    pub fn step(&mut self, dt: f64, now_ms: u64) -> Vec<ChunkEvent> {
        let scale = self.scale();
        self.lift_off();

        let free: Vec<ObjectId> = self
            .objects
            .values()
            .filter(|o| !o.vessel().is_some_and(|v| v.landed.is_some()))
            .map(|o| o.id)
            .collect();

        let gravity = if scale == Scale::System {
            let particles: Vec<Particle> = free
                .iter()
                .filter_map(|id| self.objects.get(id))
                .map(|o| Particle {
                    position: o.position,
                    mass_kg: o.mass_kg,
                    radius_km: o.radius_km,
                })
                .collect();
            physics::gravity_accelerations(&particles)
        } else {
            vec![DVec2::ZERO; free.len()]
        };

        // Thrust is specified in km/s²; coarser chunks measure in bigger units.
        let unit = Scale::System.ratio_to(scale);
        for (id, acc) in free.iter().zip(gravity) {
            let Some(obj) = self.objects.get_mut(id) else {
                continue;
            };
            let mut acc = acc;
            if let Body::Vessel(v) = &mut obj.body {
                let thrust = v.burn(dt);
                let turn = v.turn(dt);
                obj.mass_kg = v.total_mass_kg();
                obj.rotation = wrap_degrees(obj.rotation + turn);
                if thrust > 0.0 {
                    acc += obj.heading() * thrust * unit;
                }
            }
            physics::integrate(&mut obj.position, &mut obj.velocity, acc, dt);
        }

        for obj in self.objects.values_mut() {
            if let Body::Planet(p) = &obj.body {
                obj.rotation = wrap_degrees(obj.rotation + p.spin_rate() * dt);
            }
        }

        let events = self.settle(dt);
        self.tick_seq = self.tick_seq.wrapping_add(1);
        self.last_advanced_ms = now_ms;
        events
    }

    pub fn frame(&self) -> ChunkFrame {
        ChunkFrame {
            key: self.key,
            seq: self.tick_seq,
            objects: self
                .objects
                .values()
                .map(|o| ObjectState {
                    id: o.id,
                    position: o.position,
                    velocity: o.velocity,
                    rotation: o.rotation,
                })
                .collect(),
        }
    }

    fn lift_off(&mut self) {
        let lifting: Vec<(ObjectId, ObjectId)> = self
            .objects
            .values()
            .filter_map(|o| {
                let v = o.vessel()?;
                let landed = v.landed?;
                (v.flags.contains(ThrustFlags::THRUST) && v.fuel > 0.0).then_some((o.id, landed.body))
            })
            .collect();
        for (vessel_id, body_id) in lifting {
            let body_velocity = self.objects.get(&body_id).map_or(DVec2::ZERO, |b| b.velocity);
            if let Some(obj) = self.objects.get_mut(&vessel_id) {
                obj.velocity = body_velocity;
                if let Some(v) = obj.vessel_mut() {
                    v.landed = None;
                }
            }
        }
    }

    /// Post-motion bookkeeping shared by live steps and extrapolation:
    /// tidal locks, landed riders, surface contacts, region classification
    /// and vessel temperature. Idempotent for `dt == 0`.
    fn settle(&mut self, dt: f64) -> Vec<ChunkEvent> {
        let mut events = Vec::new();

        let locks: Vec<(ObjectId, ObjectId)> = self
            .objects
            .values()
            .filter_map(|o| Some((o.id, o.planet()?.tidally_locked_to?)))
            .collect();
        for (id, target) in locks {
            let Some(target_pos) = self.objects.get(&target).map(|t| t.position) else {
                continue;
            };
            if let Some(obj) = self.objects.get_mut(&id) {
                let d = target_pos - obj.position;
                obj.rotation = wrap_degrees(d.y.atan2(d.x).to_degrees());
            }
        }

        if self.scale() != Scale::System {
            return events;
        }

        let bodies: Vec<Surface> = self
            .objects
            .values()
            .filter(|o| !o.is_vessel() && o.radius_km > 0.0)
            .map(|o| {
                let (atmosphere_km, surface_k) =
                    o.planet().map_or((0.0, 0.0), |p| (p.atmosphere_km, p.surface_temp_k));
                Surface {
                    id: o.id,
                    position: o.position,
                    velocity: o.velocity,
                    radius_km: o.radius_km,
                    atmosphere_km,
                    surface_k,
                }
            })
            .collect();

        let mut destroyed = Vec::new();
        for obj in self.objects.values_mut() {
            let Body::Vessel(v) = &mut obj.body else {
                continue;
            };

            let mut resting_on = None;
            if let Some(landed) = v.landed {
                match bodies.iter().find(|b| b.id == landed.body) {
                    Some(b) => {
                        obj.position = b.position + landed.offset;
                        obj.velocity = b.velocity;
                        resting_on = Some(b);
                    }
                    None => v.landed = None,
                }
            } else if let Some(b) = bodies
                .iter()
                .find(|b| (obj.position - b.position).length() < b.radius_km)
            {
                let speed = (obj.velocity - b.velocity).length();
                if speed > MAX_LANDING_SPEED {
                    destroyed.push(obj.id);
                    continue;
                }
                if speed > SAFE_LANDING_SPEED {
                    v.hull -= (speed - SAFE_LANDING_SPEED) / (MAX_LANDING_SPEED - SAFE_LANDING_SPEED) * 0.5;
                }
                let dir = (obj.position - b.position).try_normalize().unwrap_or(DVec2::X);
                let offset = dir * b.radius_km;
                v.landed = Some(LandedState { body: b.id, offset });
                obj.position = b.position + offset;
                obj.velocity = b.velocity;
                resting_on = Some(b);
                events.push(ChunkEvent::Landed {
                    vessel: obj.id,
                    body: b.id,
                });
            }

            if v.hull <= 0.0 {
                destroyed.push(obj.id);
                continue;
            }

            let space_k = physics::ambient_temperature_k(obj.position.length());
            let ambient = match resting_on {
                Some(b) => physics::atmosphere_temperature_k(0.0, b.atmosphere_km, b.surface_k, space_k),
                None => space_k,
            };
            v.relax_temperature(ambient, dt);
        }

        // Innermost region across all planets wins.
        let regions: Vec<(ObjectId, Option<u32>)> = self
            .objects
            .values()
            .filter(|o| o.is_vessel() && !destroyed.contains(&o.id))
            .map(|o| {
                let region = self
                    .objects
                    .values()
                    .filter_map(|p| {
                        let planet = p.planet()?;
                        let dist = (o.position - p.position).length();
                        planet.region_at(dist).map(|r| (dist, r))
                    })
                    .min_by(|a, b| a.0.total_cmp(&b.0))
                    .map(|(_, r)| r);
                (o.id, region)
            })
            .collect();
        for (id, region) in regions {
            let Some(Body::Vessel(v)) = self.objects.get_mut(&id).map(|o| &mut o.body) else {
                continue;
            };
            if let Some(region) = v.enter_region(region) {
                events.push(ChunkEvent::RegionEntered {
                    vessel: id,
                    region,
                    controller: v.controller,
                });
            }
        }

        for id in destroyed {
            if let Some(obj) = self.objects.remove(&id) {
                let (agency, controller) = obj.vessel().map_or((0, None), |v| (v.agency, v.controller));
                events.push(ChunkEvent::Destroyed {
                    object: id,
                    agency,
                    controller,
                });
            }
        }
        events
    }
}

struct Surface {
    id: ObjectId,
    position: DVec2,
    velocity: DVec2,
    radius_km: f64,
    atmosphere_km: f64,
    surface_k: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{ObjectType, PlanetBody};
    use crate::vessel::{Vessel, VesselStats};

    const EARTH: ObjectId = ObjectId(2);
    const MOON: ObjectId = ObjectId(3);
    const SHIP: ObjectId = ObjectId(10);

    fn earth_moon() -> Chunk {
        let mut chunk = Chunk::new(ChunkKey::HOME, 1_000);
        let earth = SpaceObject::new(EARTH, ObjectType::Earth, "Earth")
            .with_mass(5.972e24, 6371.0)
            .with_body(Body::Planet(
                PlanetBody::new(86_400.0).with_regions(&[(1, 50_000.0), (2, 500_000.0)]),
            ));
        let moon_offset = DVec2::new(384_400.0, 0.0);
        let moon = SpaceObject::new(MOON, ObjectType::Luna, "Luna")
            .at(moon_offset, physics::circular_orbit_velocity(moon_offset, 5.972e24))
            .with_mass(7.342e22, 1737.0)
            .with_body(Body::Planet(PlanetBody {
                tidally_locked_to: Some(EARTH),
                ..PlanetBody::new(0.0)
            }));
        chunk.insert(earth).unwrap();
        chunk.insert(moon).unwrap();
        chunk
    }

    fn ship(position: DVec2, velocity: DVec2) -> SpaceObject {
        let mut v = Vessel::new(5, 77, Vec::new());
        v.apply_stats(
            VesselStats {
                dry_mass_kg: 1000.0,
                fuel_capacity: 100.0,
                thrust_kn: 20.0,
                fuel_burn_per_s: 1.0,
                ..Default::default()
            },
            true,
        );
        v.controller = Some(77);
        SpaceObject::new(SHIP, ObjectType::BasicVessel, "Scout")
            .at(position, velocity)
            .with_mass(1100.0, 0.01)
            .with_body(Body::Vessel(Box::new(v)))
    }

    #[test]
    fn promote_equals_direct_extrapolation() {
        let mut promoted = earth_moon();
        promoted
            .insert(ship(DVec2::new(1.0e6, 0.0), DVec2::new(0.0, 3.0)))
            .unwrap();
        let mut direct = promoted.clone();

        promoted.promote(1_000 + 10_000, 1.0);
        assert!(promoted.is_live());

        direct.extrapolate(10.0);
        direct.step(0.0, 11_000);

        for (a, b) in promoted.objects().zip(direct.objects()) {
            assert_eq!(a.id, b.id);
            assert!((a.position - b.position).length() < 1e-6);
            assert!((a.rotation - b.rotation).abs() < 1e-9);
        }
        let s = promoted.get(SHIP).unwrap();
        assert!((s.position.y - 30.0).abs() < 1e-9);
    }

    #[test]
    fn promote_honours_sim_rate() {
        let mut chunk = Chunk::new(ChunkKey::HOME, 0);
        chunk
            .insert(ship(DVec2::new(1.0e7, 0.0), DVec2::new(1.0, 0.0)))
            .unwrap();
        chunk.promote(2_000, 3.0);
        assert!((chunk.get(SHIP).unwrap().position.x - (1.0e7 + 6.0)).abs() < 1e-6);
    }

    #[test]
    fn live_step_pulls_moon_toward_earth() {
        let mut chunk = earth_moon();
        chunk.promote(1_000, 1.0);
        let before = chunk.get(MOON).unwrap().velocity;
        chunk.step(60.0, 2_000);
        let after = chunk.get(MOON).unwrap();
        assert!(after.velocity.x < before.x);
        assert_eq!(chunk.tick_seq(), 1);
        // Tidally locked: faces Earth.
        let d = chunk.get(EARTH).unwrap().position - after.position;
        let expected = wrap_degrees(d.y.atan2(d.x).to_degrees());
        assert!((after.rotation - expected).abs() < 1e-9);
    }

    #[test]
    fn hard_impact_destroys_exactly_once() {
        let mut chunk = earth_moon();
        chunk
            .insert(ship(DVec2::new(6000.0, 0.0), DVec2::new(-5.0, 0.0)))
            .unwrap();
        chunk.promote(1_000, 1.0);
        let events = chunk.step(0.1, 1_100);
        let destroyed: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, ChunkEvent::Destroyed { .. }))
            .collect();
        assert_eq!(destroyed.len(), 1);
        assert!(matches!(
            destroyed[0],
            ChunkEvent::Destroyed { object: SHIP, agency: 5, controller: Some(77) }
        ));
        assert!(!chunk.contains(SHIP));
        assert!(chunk.step(0.1, 1_200).is_empty());
    }

    #[test]
    fn gentle_touchdown_lands_and_rides_with_body() {
        let mut chunk = earth_moon();
        chunk
            .insert(ship(DVec2::new(6370.0, 0.0), DVec2::new(-0.1, 0.0)))
            .unwrap();
        let events = chunk.step(0.0, 1_000);
        assert!(events.contains(&ChunkEvent::Landed { vessel: SHIP, body: EARTH }));
        let landed = chunk.get(SHIP).unwrap();
        assert!((landed.position.x - 6371.0).abs() < 1e-9);
        assert!(landed.vessel().unwrap().landed.is_some());

        chunk.get_mut(EARTH).unwrap().velocity = DVec2::new(0.0, -29.78);
        chunk.step(1.0, 2_000);
        let earth = chunk.get(EARTH).unwrap().position;
        let ship = chunk.get(SHIP).unwrap();
        assert!((ship.position - earth - DVec2::new(6371.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn thrust_lifts_off_landed_vessel() {
        let mut chunk = earth_moon();
        let mut s = ship(DVec2::new(6371.0, 0.0), DVec2::ZERO);
        if let Body::Vessel(v) = &mut s.body {
            v.landed = Some(LandedState { body: EARTH, offset: DVec2::new(6371.0, 0.0) });
            v.flags.set(ThrustFlags::THRUST, true);
            v.stats.thrust_kn = 1.0e5;
        }
        chunk.insert(s).unwrap();
        chunk.step(1.0, 2_000);
        let ship = chunk.get(SHIP).unwrap();
        assert!(ship.vessel().unwrap().landed.is_none());
        assert!(ship.position.x > 6371.0);
    }

    #[test]
    fn region_cue_fires_on_first_entry() {
        let mut chunk = earth_moon();
        chunk
            .insert(ship(DVec2::new(40_000.0, 0.0), DVec2::ZERO))
            .unwrap();
        let events = chunk.step(0.0, 1_000);
        assert!(events.contains(&ChunkEvent::RegionEntered {
            vessel: SHIP,
            region: 1,
            controller: Some(77)
        }));
        assert!(chunk.step(0.0, 1_000).is_empty());
    }

    #[test]
    fn starmap_chunks_skip_gravity_and_contacts() {
        let mut chunk = Chunk::new(ChunkKey::Starmap { galaxy: 1 }, 0);
        chunk
            .insert(ship(DVec2::new(2.0e7, 0.0), DVec2::new(1.0e-5, 0.0)))
            .unwrap();
        chunk.promote(0, 1.0);
        chunk.step(10.0, 10_000);
        let s = chunk.get(SHIP).unwrap();
        assert!((s.position.x - (2.0e7 + 1.0e-4)).abs() < 1e-6);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut chunk = earth_moon();
        let dup = SpaceObject::new(EARTH, ObjectType::Earth, "Earth again");
        assert!(matches!(chunk.insert(dup), Err(ChunkError::DuplicateObject(EARTH))));
        assert!(matches!(chunk.remove(ObjectId(99)), Err(ChunkError::ObjectNotFound(_))));
    }

    #[test]
    fn demote_clears_thrust_and_stamps_time() {
        let mut chunk = earth_moon();
        let mut s = ship(DVec2::new(1.0e6, 0.0), DVec2::ZERO);
        if let Body::Vessel(v) = &mut s.body {
            v.flags.set(ThrustFlags::THRUST, true);
        }
        chunk.insert(s).unwrap();
        chunk.promote(1_000, 1.0);
        chunk.demote(5_000);
        assert_eq!(chunk.mode(), SimMode::Extrapolated);
        assert_eq!(chunk.last_advanced_ms(), 5_000);
        assert_eq!(chunk.get(SHIP).unwrap().vessel().unwrap().flags.bits(), 0);
    }
}
