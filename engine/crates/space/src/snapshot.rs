use serde::{Deserialize, Serialize};

use crate::object::SpaceObject;
use crate::scale::ChunkKey;

pub const CHUNK_SNAPSHOT_VERSION: u32 = 1;

/// Serializable state of one chunk as written to its `.chunk` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkSnapshot {
    pub version: u32,
    pub key: ChunkKey,
    pub tick_seq: u64,
    /// Unix millis of the last live step or extrapolation.
    pub last_advanced_ms: u64,
    pub objects: Vec<SpaceObject>,
}

impl ChunkSnapshot {
    pub fn new(key: ChunkKey, tick_seq: u64, last_advanced_ms: u64, objects: Vec<SpaceObject>) -> Self {
        Self {
            version: CHUNK_SNAPSHOT_VERSION,
            key,
            tick_seq,
            last_advanced_ms,
            objects,
        }
    }

    pub fn max_object_id(&self) -> u64 {
        self.objects.iter().map(|o| o.id.0).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use glam::DVec2;

    use super::*;
    use crate::chunk::Chunk;
    use crate::ids::ObjectId;
    use crate::object::{Body, ObjectType, PlanetBody};
    use crate::vessel::{AttachedComponent, Vessel};

    #[test]
    fn bincode_roundtrip_restores_chunk() {
        let mut chunk = Chunk::new(ChunkKey::HOME, 42);
        chunk
            .insert(
                SpaceObject::new(ObjectId(4), ObjectType::Mars, "Mars")
                    .at(DVec2::new(0.0, 241.52e6), DVec2::new(24.1, 0.0))
                    .with_mass(6.41693e23, 3389.5)
                    .with_body(Body::Planet(PlanetBody::new(88_642.0).with_regions(&[(6, 30_000.0)]))),
            )
            .unwrap();
        let mut v = Vessel::new(1, 2, vec![AttachedComponent { component_id: 1, x: 0, y: 0, stage: 0 }]);
        v.cargo.insert(3, 12);
        chunk
            .insert(
                SpaceObject::new(ObjectId(900), ObjectType::BasicVessel, "Scout")
                    .with_body(Body::Vessel(Box::new(v))),
            )
            .unwrap();

        let snap = chunk.to_snapshot();
        assert_eq!(snap.version, CHUNK_SNAPSHOT_VERSION);
        assert_eq!(snap.max_object_id(), 900);

        let bytes = bincode::serialize(&snap).unwrap();
        let back: ChunkSnapshot = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, snap);

        let restored = Chunk::from_snapshot(back);
        assert_eq!(restored.key(), ChunkKey::HOME);
        assert_eq!(restored.last_advanced_ms(), 42);
        assert_eq!(restored.len(), 2);
        assert_eq!(
            restored.get(ObjectId(900)).unwrap().vessel().unwrap().cargo.get(&3),
            Some(&12)
        );
    }
}
