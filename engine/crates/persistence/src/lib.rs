pub mod error;
pub mod layout;
pub mod store;
pub mod terrain;

pub use error::PersistenceError;
pub use layout::WorldLayout;
pub use store::{atomic_write, Versioned, WorldStore};
pub use terrain::{TerrainChunk, TerrainEntity, TERRAIN_VERSION};
