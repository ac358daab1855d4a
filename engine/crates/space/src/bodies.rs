//! Initial contents of the home system, created once by the Big Bang.

use glam::DVec2;

use crate::ids::{ObjectId, ObjectIdSequence};
use crate::object::{Body, ObjectType, PlanetBody, SpaceObject};
use crate::physics::circular_orbit_velocity;

pub mod region {
    pub const EARTH_CLOSE: u32 = 1;
    pub const EARTH_NEAR: u32 = 2;
    pub const EARTH_DISTANT: u32 = 3;
    pub const MOON_NEAR: u32 = 4;
    pub const MARS_CLOSE: u32 = 6;
    pub const MARS_NEAR: u32 = 7;
    pub const MARS_DISTANT: u32 = 8;
    pub const VENUS_CLOSE: u32 = 9;
    pub const VENUS_NEAR: u32 = 10;
    pub const VENUS_DISTANT: u32 = 11;
    pub const MERCURY_CLOSE: u32 = 12;
    pub const MERCURY_NEAR: u32 = 13;
    pub const MERCURY_DISTANT: u32 = 14;
    pub const JUPITER_CLOSE: u32 = 16;
    pub const JUPITER_NEAR: u32 = 17;
    pub const JUPITER_DISTANT: u32 = 18;
    pub const SATURN_CLOSE: u32 = 19;
    pub const SATURN_NEAR: u32 = 20;
    pub const SATURN_DISTANT: u32 = 21;
    pub const URANUS_CLOSE: u32 = 22;
    pub const URANUS_NEAR: u32 = 23;
    pub const URANUS_DISTANT: u32 = 24;
    pub const NEPTUNE_CLOSE: u32 = 25;
    pub const NEPTUNE_NEAR: u32 = 26;
    pub const NEPTUNE_DISTANT: u32 = 27;
}

struct PlanetSpec {
    kind: ObjectType,
    name: &'static str,
    position: (f64, f64),
    velocity: (f64, f64),
    mass_kg: f64,
    radius_km: f64,
    day_length_s: f64,
    atmosphere_km: f64,
    surface_temp_k: f64,
    regions: &'static [(u32, f64)],
}

use region::*;

const PLANETS: &[PlanetSpec] = &[
    PlanetSpec {
        kind: ObjectType::Sun,
        name: "Sun",
        position: (0.0, 0.0),
        velocity: (0.0, 0.0),
        mass_kg: 1.989e30,
        radius_km: 695_700.0,
        day_length_s: 2_192_832.0,
        atmosphere_km: 1_000_000.0,
        surface_temp_k: 5778.0,
        regions: &[],
    },
    PlanetSpec {
        kind: ObjectType::Mercury,
        name: "Mercury",
        position: (0.0, -35_863_000.0),
        velocity: (-47.36, 0.0),
        mass_kg: 3.285e23,
        radius_km: 2439.7,
        day_length_s: 15_181_440.0,
        atmosphere_km: 5000.0,
        surface_temp_k: 440.0,
        regions: &[(MERCURY_CLOSE, 30_000.0), (MERCURY_NEAR, 300_000.0), (MERCURY_DISTANT, 1_000_000.0)],
    },
    PlanetSpec {
        kind: ObjectType::Venus,
        name: "Venus",
        position: (-67_225_000.0, 0.0),
        velocity: (0.0, 35.02),
        mass_kg: 4.867e24,
        radius_km: 6051.8,
        day_length_s: 20_995_200.0,
        atmosphere_km: 10_000.0,
        surface_temp_k: 737.0,
        regions: &[(VENUS_CLOSE, 50_000.0), (VENUS_NEAR, 500_000.0), (VENUS_DISTANT, 2_000_000.0)],
    },
    PlanetSpec {
        kind: ObjectType::Earth,
        name: "Earth",
        position: (152_000_000.0, 0.0),
        velocity: (0.0, -29.78),
        mass_kg: 5.972e24,
        radius_km: 6371.0,
        day_length_s: 86_400.0,
        atmosphere_km: 10_000.0,
        surface_temp_k: 288.0,
        regions: &[(EARTH_CLOSE, 50_000.0), (EARTH_NEAR, 500_000.0), (EARTH_DISTANT, 2_000_000.0)],
    },
    PlanetSpec {
        kind: ObjectType::Mars,
        name: "Mars",
        position: (0.0, 241_520_000.0),
        velocity: (24.1, 0.0),
        mass_kg: 6.41693e23,
        radius_km: 3389.5,
        day_length_s: 88_642.0,
        atmosphere_km: 8000.0,
        surface_temp_k: 210.0,
        regions: &[(MARS_CLOSE, 30_000.0), (MARS_NEAR, 300_000.0), (MARS_DISTANT, 1_000_000.0)],
    },
    PlanetSpec {
        kind: ObjectType::Jupiter,
        name: "Jupiter",
        position: (778_000_000.0, 0.0),
        velocity: (0.0, -13.07),
        mass_kg: 1.898e27,
        radius_km: 69_911.0,
        day_length_s: 35_430.0,
        atmosphere_km: 20_000.0,
        surface_temp_k: 165.0,
        regions: &[(JUPITER_CLOSE, 1.0e6), (JUPITER_NEAR, 30.0e6), (JUPITER_DISTANT, 300.0e6)],
    },
    PlanetSpec {
        kind: ObjectType::Saturn,
        name: "Saturn",
        position: (0.0, -888_650_000.0),
        velocity: (-9.69, 0.0),
        mass_kg: 5.685e26,
        radius_km: 58_232.0,
        day_length_s: 37_988.0,
        atmosphere_km: 15_000.0,
        surface_temp_k: 134.0,
        regions: &[(SATURN_CLOSE, 1.0e6), (SATURN_NEAR, 40.0e6), (SATURN_DISTANT, 400.0e6)],
    },
    PlanetSpec {
        kind: ObjectType::Uranus,
        name: "Uranus",
        position: (-2_918_400_000.0, 0.0),
        velocity: (0.0, 6.8),
        mass_kg: 8.681e25,
        radius_km: 25_362.0,
        day_length_s: -62_092.0,
        atmosphere_km: 12_000.0,
        surface_temp_k: 76.0,
        regions: &[(URANUS_CLOSE, 5.0e6), (URANUS_NEAR, 80.0e6), (URANUS_DISTANT, 800.0e6)],
    },
    PlanetSpec {
        kind: ObjectType::Neptune,
        name: "Neptune",
        position: (0.0, 4_470_800_000.0),
        velocity: (5.45, 0.0),
        mass_kg: 1.0241e26,
        radius_km: 24_622.0,
        day_length_s: 57_996.0,
        atmosphere_km: 11_000.0,
        surface_temp_k: 72.0,
        regions: &[(NEPTUNE_CLOSE, 2.0e6), (NEPTUNE_NEAR, 100.0e6), (NEPTUNE_DISTANT, 1.0e9)],
    },
];

struct MoonSpec {
    kind: ObjectType,
    name: &'static str,
    primary: ObjectType,
    distance_km: f64,
    mass_kg: f64,
    radius_km: f64,
    atmosphere_km: f64,
    surface_temp_k: f64,
    regions: &'static [(u32, f64)],
}

const MOONS: &[MoonSpec] = &[
    MoonSpec {
        kind: ObjectType::Luna,
        name: "Luna",
        primary: ObjectType::Earth,
        distance_km: 384_400.0,
        mass_kg: 7.342e22,
        radius_km: 1737.0,
        atmosphere_km: 1000.0,
        surface_temp_k: 220.0,
        regions: &[(MOON_NEAR, 50_000.0)],
    },
    MoonSpec {
        kind: ObjectType::Phobos,
        name: "Phobos",
        primary: ObjectType::Mars,
        distance_km: 9376.0,
        mass_kg: 1.0659e16,
        radius_km: 11.267,
        atmosphere_km: 0.0,
        surface_temp_k: 233.0,
        regions: &[],
    },
    MoonSpec {
        kind: ObjectType::Deimos,
        name: "Deimos",
        primary: ObjectType::Mars,
        distance_km: 23_463.0,
        mass_kg: 1.4762e15,
        radius_km: 6.2,
        atmosphere_km: 0.0,
        surface_temp_k: 233.0,
        regions: &[],
    },
];

/// The home planet every new agency starts on.
pub const HOME_PLANET: ObjectType = ObjectType::Earth;

/// Builds the home system: the Sun, eight planets and three tidally
/// locked moons on circular orbits about their primaries.
pub fn home_system(ids: &ObjectIdSequence) -> Vec<SpaceObject> {
    let mut objects: Vec<SpaceObject> = PLANETS
        .iter()
        .map(|p| {
            let mut body = PlanetBody::new(p.day_length_s).with_regions(p.regions);
            body.atmosphere_km = p.atmosphere_km;
            body.surface_temp_k = p.surface_temp_k;
            SpaceObject::new(ids.allocate(), p.kind, p.name)
                .at(DVec2::from(p.position), DVec2::from(p.velocity))
                .with_mass(p.mass_kg, p.radius_km)
                .with_body(Body::Planet(body))
        })
        .collect();

    for m in MOONS {
        let Some(primary) = objects.iter().find(|o| o.object_type == m.primary) else {
            continue;
        };
        let (primary_id, primary_pos, primary_vel, primary_mass): (ObjectId, DVec2, DVec2, f64) =
            (primary.id, primary.position, primary.velocity, primary.mass_kg);
        let offset = DVec2::new(m.distance_km, 0.0);
        let mut body = PlanetBody::new(0.0).with_regions(m.regions);
        body.atmosphere_km = m.atmosphere_km;
        body.surface_temp_k = m.surface_temp_k;
        body.tidally_locked_to = Some(primary_id);
        objects.push(
            SpaceObject::new(ids.allocate(), m.kind, m.name)
                .at(
                    primary_pos + offset,
                    primary_vel + circular_orbit_velocity(offset, primary_mass),
                )
                .with_mass(m.mass_kg, m.radius_km)
                .with_body(Body::Planet(body)),
        );
    }
    objects
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn home_system_has_all_bodies_with_unique_ids() {
        let ids = ObjectIdSequence::default();
        let objs = home_system(&ids);
        assert_eq!(objs.len(), 12);
        let mut seen: Vec<u64> = objs.iter().map(|o| o.id.0).collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 12);
        assert_eq!(ids.peek(), 13);
    }

    #[test]
    fn earth_and_luna_match_catalogue() {
        let objs = home_system(&ObjectIdSequence::default());
        let earth = objs.iter().find(|o| o.object_type == ObjectType::Earth).unwrap();
        assert_eq!(earth.position, DVec2::new(152.0e6, 0.0));
        assert_eq!(earth.velocity, DVec2::new(0.0, -29.78));
        let luna = objs.iter().find(|o| o.object_type == ObjectType::Luna).unwrap();
        assert_eq!(luna.position, earth.position + DVec2::new(384_400.0, 0.0));
        assert_eq!(luna.planet().unwrap().tidally_locked_to, Some(earth.id));
        // Orbiting Earth counter-clockwise on top of Earth's own motion.
        assert!(luna.velocity.y > earth.velocity.y);
    }

    #[test]
    fn uranus_spins_retrograde() {
        let objs = home_system(&ObjectIdSequence::default());
        let uranus = objs.iter().find(|o| o.object_type == ObjectType::Uranus).unwrap();
        assert!(uranus.planet().unwrap().spin_rate() < 0.0);
    }
}
