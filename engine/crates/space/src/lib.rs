pub mod bodies;
pub mod chunk;
pub mod ids;
pub mod object;
pub mod physics;
pub mod points;
pub mod scale;
pub mod snapshot;
pub mod vessel;

pub use chunk::{Chunk, ChunkError, ChunkEvent, ChunkFrame, ObjectState, SimMode};
pub use ids::{ObjectId, ObjectIdSequence};
pub use object::{Body, ObjectType, PlanetBody, RegionEdge, SpaceObject};
pub use points::{MapPoint, MapPoints};
pub use scale::{ChunkKey, Scale};
pub use snapshot::{ChunkSnapshot, CHUNK_SNAPSHOT_VERSION};
pub use vessel::{AttachedComponent, LandedState, ThrustFlags, Vessel, VesselStats};

pub use glam::DVec2;
