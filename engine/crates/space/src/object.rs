use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::ids::ObjectId;
use crate::vessel::Vessel;

/// Object-type tag sent on the wire and used to look up catalog content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[repr(u16)]
pub enum ObjectType {
    Undefined = 0,
    Sun = 1,
    Earth = 2,
    Luna = 3,
    Mars = 4,
    Venus = 5,
    Mercury = 6,
    Jupiter = 7,
    Saturn = 8,
    Uranus = 9,
    Neptune = 10,
    Phobos = 32,
    Deimos = 33,
    ProceduralRockyPlanet = 41,
    ProceduralGasGiant = 42,
    BasicVessel = 43,
}

impl ObjectType {
    pub fn is_star(self) -> bool {
        matches!(self, ObjectType::Sun)
    }
}

/// One entry of a planet's region table: the region applies to vessels
/// whose distance from the planet centre is at most `max_km`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionEdge {
    pub region: u32,
    pub max_km: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanetBody {
    /// Signed length of a day in simulated seconds. Negative spins
    /// retrograde, zero does not spin.
    pub day_length_s: f64,
    pub atmosphere_km: f64,
    pub surface_temp_k: f64,
    /// Sorted by `max_km`.
    pub regions: Vec<RegionEdge>,
    /// Keeps the same face toward this body instead of spinning.
    pub tidally_locked_to: Option<ObjectId>,
}

impl PlanetBody {
    pub fn new(day_length_s: f64) -> Self {
        Self {
            day_length_s,
            atmosphere_km: 0.0,
            surface_temp_k: 0.0,
            regions: Vec::new(),
            tidally_locked_to: None,
        }
    }

    pub fn with_regions(mut self, regions: &[(u32, f64)]) -> Self {
        self.regions = regions
            .iter()
            .map(|&(region, max_km)| RegionEdge { region, max_km })
            .collect();
        self.regions.sort_by(|a, b| a.max_km.total_cmp(&b.max_km));
        self
    }

    /// Degrees per simulated second.
    pub fn spin_rate(&self) -> f64 {
        if self.day_length_s == 0.0 || self.tidally_locked_to.is_some() {
            0.0
        } else {
            360.0 / self.day_length_s
        }
    }

    /// Innermost region whose outer edge is at or beyond `distance_km`.
    pub fn region_at(&self, distance_km: f64) -> Option<u32> {
        let idx = self.regions.partition_point(|e| e.max_km < distance_km);
        self.regions.get(idx).map(|e| e.region)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Body {
    Inert,
    Planet(PlanetBody),
    Vessel(Box<Vessel>),
}

/// Authoritative kinematic state of one object inside its owning chunk.
/// Positions and velocities are in the owning chunk's units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpaceObject {
    pub id: ObjectId,
    pub object_type: ObjectType,
    pub name: String,
    pub position: DVec2,
    pub velocity: DVec2,
    /// Heading in degrees, `[0, 360)`.
    pub rotation: f64,
    pub mass_kg: f64,
    pub radius_km: f64,
    pub body: Body,
}

impl SpaceObject {
    pub fn new(id: ObjectId, object_type: ObjectType, name: impl Into<String>) -> Self {
        Self {
            id,
            object_type,
            name: name.into(),
            position: DVec2::ZERO,
            velocity: DVec2::ZERO,
            rotation: 0.0,
            mass_kg: 1.0,
            radius_km: 0.0,
            body: Body::Inert,
        }
    }

    pub fn at(mut self, position: DVec2, velocity: DVec2) -> Self {
        self.position = position;
        self.velocity = velocity;
        self
    }

    pub fn with_mass(mut self, mass_kg: f64, radius_km: f64) -> Self {
        self.mass_kg = mass_kg;
        self.radius_km = radius_km;
        self
    }

    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    pub fn planet(&self) -> Option<&PlanetBody> {
        match &self.body {
            Body::Planet(p) => Some(p),
            _ => None,
        }
    }

    pub fn vessel(&self) -> Option<&Vessel> {
        match &self.body {
            Body::Vessel(v) => Some(v),
            _ => None,
        }
    }

    pub fn vessel_mut(&mut self) -> Option<&mut Vessel> {
        match &mut self.body {
            Body::Vessel(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_planet(&self) -> bool {
        matches!(self.body, Body::Planet(_))
    }

    pub fn is_vessel(&self) -> bool {
        matches!(self.body, Body::Vessel(_))
    }

    pub fn heading(&self) -> DVec2 {
        let rad = self.rotation.to_radians();
        DVec2::new(rad.cos(), rad.sin())
    }
}

pub fn wrap_degrees(deg: f64) -> f64 {
    deg.rem_euclid(360.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mars_regions() -> PlanetBody {
        PlanetBody::new(88_642.0).with_regions(&[(8, 1.0e6), (6, 30_000.0), (7, 300_000.0)])
    }

    #[test]
    fn region_lookup_picks_first_edge_at_or_beyond() {
        let p = mars_regions();
        assert_eq!(p.region_at(10.0), Some(6));
        assert_eq!(p.region_at(30_000.0), Some(6));
        assert_eq!(p.region_at(30_001.0), Some(7));
        assert_eq!(p.region_at(999_999.0), Some(8));
        assert_eq!(p.region_at(2.0e6), None);
    }

    #[test]
    fn tidal_lock_disables_spin() {
        let mut p = PlanetBody::new(86_400.0);
        assert!((p.spin_rate() - 360.0 / 86_400.0).abs() < 1e-12);
        p.tidally_locked_to = Some(ObjectId(1));
        assert_eq!(p.spin_rate(), 0.0);
    }

    #[test]
    fn wrap_degrees_handles_negative() {
        assert!((wrap_degrees(-10.0) - 350.0).abs() < 1e-9);
        assert!((wrap_degrees(725.0) - 5.0).abs() < 1e-9);
    }
}
