//! Boundary rules for moving a controlled vessel between chunk scales.

use glam::DVec2;
use space::scale::{convert_distance, rescale_velocity};
use space::{ChunkKey, MapPoints, ObjectId, Scale};

use crate::chunk_manager::ManagerError;

/// System chunk radius (km) beyond which a vessel leaves for the starmap.
pub const SYSTEM_EXIT_KM: f64 = 2.0e13;
/// Starmap units around a system point that capture an approaching vessel.
pub const SYSTEM_CAPTURE_UNITS: f64 = 1.0e10;
/// Starmap radius (units) beyond which a vessel leaves for the universe map.
pub const STARMAP_EXIT_UNITS: f64 = 5.0e11;
/// Universe units around a galaxy point that capture an approaching vessel.
pub const GALAXY_CAPTURE_UNITS: f64 = 1.0e11;
/// Arrival distance (km) from the destination chunk origin, converted per
/// destination scale.
pub const SPAWN_RADIUS_KM: f64 = 2.0e13;

#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("vessel {0} is not resident in any chunk")]
    VesselMissing(ObjectId),

    #[error("vessel {vessel} expected in {expected} but found in {actual}")]
    WrongChunk {
        vessel: ObjectId,
        expected: ChunkKey,
        actual: ChunkKey,
    },

    #[error("destination {key} unavailable: {source}")]
    Destination {
        key: ChunkKey,
        #[source]
        source: Box<ManagerError>,
    },
}

/// Map point that must exist before the transition is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointRegistration {
    System { galaxy: u32, system: u32 },
    Galaxy { galaxy: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransitionPlan {
    pub from: ChunkKey,
    pub to: ChunkKey,
    pub position: DVec2,
    pub velocity: DVec2,
    pub register: Option<PointRegistration>,
}

/// Catalogued points as seen by the planner. `starmap` yields the points of
/// one galaxy, `universe` the galaxy points.
pub trait PointSource {
    fn starmap(&self, galaxy: u32) -> MapPoints;
    fn universe(&self) -> MapPoints;
}

fn bearing(v: DVec2, fallback: DVec2) -> DVec2 {
    v.try_normalize()
        .or_else(|| fallback.try_normalize())
        .unwrap_or(DVec2::X)
}

fn spawn_offset(to: Scale) -> f64 {
    convert_distance(SPAWN_RADIUS_KM, Scale::System, to)
}

/// Decides whether a vessel at `position`/`velocity` inside `from` crosses a
/// boundary this tick. Outward moves require the vessel to be receding from
/// the origin and inward moves require it to be closing on the point, so a
/// fresh arrival never bounces straight back.
pub fn plan(from: ChunkKey, position: DVec2, velocity: DVec2, points: &impl PointSource) -> Option<TransitionPlan> {
    let receding = position.dot(velocity) > 0.0;
    match from {
        ChunkKey::System { galaxy, system } => {
            if position.length() <= SYSTEM_EXIT_KM || !receding {
                return None;
            }
            let to = ChunkKey::Starmap { galaxy };
            Some(TransitionPlan {
                from,
                to,
                position: bearing(position, velocity) * spawn_offset(to.scale()),
                velocity: rescale_velocity(velocity, from.scale(), to.scale()),
                register: Some(PointRegistration::System { galaxy, system }),
            })
        }
        ChunkKey::Starmap { galaxy } => {
            if position.length() > STARMAP_EXIT_UNITS && receding {
                let to = ChunkKey::Universe;
                return Some(TransitionPlan {
                    from,
                    to,
                    position: bearing(position, velocity) * spawn_offset(to.scale()),
                    velocity: rescale_velocity(velocity, from.scale(), to.scale()),
                    register: Some(PointRegistration::Galaxy { galaxy }),
                });
            }
            let map = points.starmap(galaxy);
            let target = approaching(&map, position, velocity, SYSTEM_CAPTURE_UNITS)?;
            let to = ChunkKey::System {
                galaxy,
                system: target.0,
            };
            Some(TransitionPlan {
                from,
                to,
                position: bearing(position - target.1, -velocity) * spawn_offset(to.scale()),
                velocity: rescale_velocity(velocity, from.scale(), to.scale()),
                register: None,
            })
        }
        ChunkKey::Universe => {
            let map = points.universe();
            let target = approaching(&map, position, velocity, GALAXY_CAPTURE_UNITS)?;
            let to = ChunkKey::Starmap { galaxy: target.0 };
            Some(TransitionPlan {
                from,
                to,
                position: bearing(position - target.1, -velocity) * spawn_offset(to.scale()),
                velocity: rescale_velocity(velocity, from.scale(), to.scale()),
                register: None,
            })
        }
    }
}

/// Nearest point within `radius` that the vessel is moving toward.
fn approaching(map: &MapPoints, position: DVec2, velocity: DVec2, radius: f64) -> Option<(u32, DVec2)> {
    map.points
        .iter()
        .map(|p| (p.id, p.position()))
        .filter(|(_, at)| at.distance(position) <= radius && (*at - position).dot(velocity) > 0.0)
        .min_by(|a, b| a.1.distance(position).total_cmp(&b.1.distance(position)))
}
