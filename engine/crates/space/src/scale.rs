use glam::DVec2;
use serde::{Deserialize, Serialize};

/// Spatial resolution of a chunk. Coarser scales trade precision for range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub enum Scale {
    System,
    GalaxyStarmap,
    UniverseMap,
}

impl Scale {
    pub const fn km_per_unit(self) -> f64 {
        match self {
            Scale::System => 1.0,
            Scale::GalaxyStarmap => 1.0e6,
            Scale::UniverseMap => 1.0e9,
        }
    }

    /// Factor that turns a length in `self` units into `to` units.
    pub fn ratio_to(self, to: Scale) -> f64 {
        self.km_per_unit() / to.km_per_unit()
    }
}

pub fn convert_distance(distance: f64, from: Scale, to: Scale) -> f64 {
    distance * from.ratio_to(to)
}

/// Moving outward (finer to coarser) divides by the unit ratio, moving
/// inward multiplies by it. Both directions use the same factor so a
/// round trip restores the original vector.
pub fn rescale_velocity(velocity: DVec2, from: Scale, to: Scale) -> DVec2 {
    velocity * from.ratio_to(to)
}

/// Identity of one resident chunk. The derived ordering is the global
/// lock order for operations that touch two chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub enum ChunkKey {
    Universe,
    Starmap { galaxy: u32 },
    System { galaxy: u32, system: u32 },
}

impl ChunkKey {
    pub const HOME: ChunkKey = ChunkKey::System {
        galaxy: 1,
        system: 1,
    };

    pub fn scale(self) -> Scale {
        match self {
            ChunkKey::Universe => Scale::UniverseMap,
            ChunkKey::Starmap { .. } => Scale::GalaxyStarmap,
            ChunkKey::System { .. } => Scale::System,
        }
    }

    /// Wire coordinates: galaxy 0 is the universe map, system 0 a starmap.
    pub fn from_coords(galaxy: u32, system: u32) -> Self {
        match (galaxy, system) {
            (0, _) => ChunkKey::Universe,
            (g, 0) => ChunkKey::Starmap { galaxy: g },
            (g, s) => ChunkKey::System {
                galaxy: g,
                system: s,
            },
        }
    }

    pub fn coords(self) -> (u32, u32) {
        match self {
            ChunkKey::Universe => (0, 0),
            ChunkKey::Starmap { galaxy } => (galaxy, 0),
            ChunkKey::System { galaxy, system } => (galaxy, system),
        }
    }

    pub fn galaxy(self) -> Option<u32> {
        match self {
            ChunkKey::Universe => None,
            ChunkKey::Starmap { galaxy } | ChunkKey::System { galaxy, .. } => Some(galaxy),
        }
    }
}

impl std::fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunkKey::Universe => write!(f, "universe"),
            ChunkKey::Starmap { galaxy } => write!(f, "starmap({galaxy})"),
            ChunkKey::System { galaxy, system } => write!(f, "system({galaxy}/{system})"),
        }
    }
}
