use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use space::{ChunkKey, ChunkSnapshot, MapPoints, CHUNK_SNAPSHOT_VERSION};

use crate::error::PersistenceError;
use crate::layout::WorldLayout;
use crate::terrain::{TerrainChunk, TERRAIN_VERSION};

/// Writes to a sibling `.tmp` file then renames over the target.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Envelope for versioned JSON documents.
#[derive(Debug, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub version: u32,
    pub data: T,
}

#[derive(Debug, Serialize, Deserialize)]
struct IdSequenceFile {
    next: u64,
}

/// File-backed storage for one world directory.
#[derive(Debug, Clone)]
pub struct WorldStore {
    layout: WorldLayout,
}

impl WorldStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            layout: WorldLayout::new(root),
        }
    }

    pub fn layout(&self) -> &WorldLayout {
        &self.layout
    }

    pub fn save_chunk(&self, snapshot: &ChunkSnapshot) -> Result<PathBuf, PersistenceError> {
        let path = self.layout.chunk_path(snapshot.key);
        let bytes = bincode::serialize(snapshot)?;
        atomic_write(&path, &bytes)?;
        tracing::debug!(
            chunk = %snapshot.key,
            objects = snapshot.objects.len(),
            bytes = bytes.len(),
            "Chunk saved"
        );
        Ok(path)
    }

    /// `Ok(None)` when the chunk has never been saved.
    pub fn load_chunk(&self, key: ChunkKey) -> Result<Option<ChunkSnapshot>, PersistenceError> {
        let path = self.layout.chunk_path(key);
        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot: ChunkSnapshot = bincode::deserialize(&bytes)?;
        if snapshot.version != CHUNK_SNAPSHOT_VERSION {
            return Err(PersistenceError::VersionMismatch {
                expected: CHUNK_SNAPSHOT_VERSION,
                got: snapshot.version,
            });
        }
        if snapshot.key != key {
            return Err(PersistenceError::Corrupt(format!(
                "{} holds chunk {} instead of {}",
                path.display(),
                snapshot.key,
                key
            )));
        }
        tracing::info!(chunk = %key, objects = snapshot.objects.len(), "Chunk loaded");
        Ok(Some(snapshot))
    }

    pub fn chunk_exists(&self, key: ChunkKey) -> bool {
        self.layout.chunk_path(key).exists()
    }

    pub fn load_starmap_points(&self, galaxy: u32) -> Result<MapPoints, PersistenceError> {
        Ok(self
            .read_json(&self.layout.starmap_points_path(galaxy))?
            .unwrap_or_default())
    }

    pub fn save_starmap_points(&self, galaxy: u32, points: &MapPoints) -> Result<(), PersistenceError> {
        self.write_json(&self.layout.starmap_points_path(galaxy), points)
    }

    pub fn load_universe_points(&self) -> Result<MapPoints, PersistenceError> {
        Ok(self
            .read_json(&self.layout.universe_points_path())?
            .unwrap_or_default())
    }

    pub fn save_universe_points(&self, points: &MapPoints) -> Result<(), PersistenceError> {
        self.write_json(&self.layout.universe_points_path(), points)
    }

    /// Next object id to allocate; 1 when nothing has been saved yet.
    pub fn load_id_sequence(&self) -> Result<u64, PersistenceError> {
        let file: Option<IdSequenceFile> = self.read_json(&self.layout.id_sequence_path())?;
        Ok(file.map_or(1, |f| f.next.max(1)))
    }

    pub fn save_id_sequence(&self, next: u64) -> Result<(), PersistenceError> {
        self.write_json(&self.layout.id_sequence_path(), &IdSequenceFile { next })
    }

    pub fn has_big_bang_marker(&self) -> bool {
        self.layout.big_bang_marker().exists()
    }

    pub fn write_big_bang_marker(&self, unix_ms: u64) -> Result<(), PersistenceError> {
        atomic_write(
            &self.layout.big_bang_marker(),
            format!("big bang at {unix_ms}\n").as_bytes(),
        )
    }

    pub fn save_versioned<T: Serialize>(
        &self,
        path: &Path,
        version: u32,
        data: &T,
    ) -> Result<(), PersistenceError> {
        self.write_json(path, &Versioned { version, data })
    }

    pub fn load_versioned<T: DeserializeOwned>(
        &self,
        path: &Path,
        expected: u32,
    ) -> Result<Option<T>, PersistenceError> {
        let Some(doc) = self.read_json::<Versioned<T>>(path)? else {
            return Ok(None);
        };
        if doc.version != expected {
            return Err(PersistenceError::VersionMismatch {
                expected,
                got: doc.version,
            });
        }
        Ok(Some(doc.data))
    }

    pub fn save_terrain(&self, terrain: &TerrainChunk) -> Result<(), PersistenceError> {
        let path = self
            .layout
            .terrain_path(terrain.galaxy, terrain.system, terrain.planet_id);
        self.write_json(&path, terrain)
    }

    pub fn load_terrain(
        &self,
        galaxy: u32,
        system: u32,
        planet: u64,
    ) -> Result<Option<TerrainChunk>, PersistenceError> {
        let path = self.layout.terrain_path(galaxy, system, planet);
        let Some(terrain) = self.read_json::<TerrainChunk>(&path)? else {
            return Ok(None);
        };
        if terrain.version != TERRAIN_VERSION {
            return Err(PersistenceError::VersionMismatch {
                expected: TERRAIN_VERSION,
                got: terrain.version,
            });
        }
        Ok(Some(terrain))
    }

    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, PersistenceError> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| PersistenceError::json(path, e))
    }

    fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<(), PersistenceError> {
        let bytes = serde_json::to_vec(value).map_err(|e| PersistenceError::json(path, e))?;
        atomic_write(path, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use glam::DVec2;
    use space::{Chunk, ObjectId, ObjectType, SpaceObject};
    use tempfile::TempDir;

    use super::*;

    fn store() -> (TempDir, WorldStore) {
        let dir = TempDir::new().unwrap();
        let store = WorldStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn chunk_save_load_roundtrip() {
        let (_dir, store) = store();
        let key = ChunkKey::System { galaxy: 1, system: 2 };
        let mut chunk = Chunk::new(key, 1234);
        chunk
            .insert(
                SpaceObject::new(ObjectId(7), ObjectType::Earth, "Earth")
                    .at(DVec2::new(1.0, 2.0), DVec2::new(3.0, 4.0)),
            )
            .unwrap();
        let path = store.save_chunk(&chunk.to_snapshot()).unwrap();
        assert!(path.ends_with("galaxies/1/systems/system_2.chunk"));
        assert!(!path.with_extension("chunk.tmp").exists());

        let loaded = store.load_chunk(key).unwrap().unwrap();
        assert_eq!(loaded, chunk.to_snapshot());
    }

    #[test]
    fn missing_chunk_is_none() {
        let (_dir, store) = store();
        assert!(store.load_chunk(ChunkKey::Universe).unwrap().is_none());
        assert!(!store.chunk_exists(ChunkKey::Universe));
    }

    #[test]
    fn chunk_under_wrong_key_is_corrupt() {
        let (_dir, store) = store();
        let snap = Chunk::new(ChunkKey::Universe, 0).to_snapshot();
        let bytes = bincode::serialize(&snap).unwrap();
        atomic_write(&store.layout().chunk_path(ChunkKey::Starmap { galaxy: 1 }), &bytes).unwrap();
        let err = store.load_chunk(ChunkKey::Starmap { galaxy: 1 }).unwrap_err();
        assert!(matches!(err, PersistenceError::Corrupt(_)));
    }

    #[test]
    fn chunk_version_is_checked() {
        let (_dir, store) = store();
        let mut snap = Chunk::new(ChunkKey::Universe, 0).to_snapshot();
        snap.version = 99;
        let bytes = bincode::serialize(&snap).unwrap();
        atomic_write(&store.layout().chunk_path(ChunkKey::Universe), &bytes).unwrap();
        assert!(matches!(
            store.load_chunk(ChunkKey::Universe),
            Err(PersistenceError::VersionMismatch { expected: 1, got: 99 })
        ));
    }

    #[test]
    fn id_sequence_defaults_and_persists() {
        let (_dir, store) = store();
        assert_eq!(store.load_id_sequence().unwrap(), 1);
        store.save_id_sequence(500).unwrap();
        assert_eq!(store.load_id_sequence().unwrap(), 500);
    }

    #[test]
    fn points_default_to_empty_and_roundtrip() {
        let (_dir, store) = store();
        assert!(store.load_starmap_points(1).unwrap().is_empty());
        let mut pts = MapPoints::home_starmap();
        pts.ensure_system(2);
        store.save_starmap_points(1, &pts).unwrap();
        assert_eq!(store.load_starmap_points(1).unwrap(), pts);
        std::fs::write(store.layout().universe_points_path(), "").unwrap();
        assert!(store.load_universe_points().unwrap().is_empty());
    }

    #[test]
    fn versioned_json_rejects_other_versions() {
        let (dir, store) = store();
        let path = dir.path().join("players.sa2.json");
        store.save_versioned(&path, 2, &vec![1u64, 2, 3]).unwrap();
        let back: Vec<u64> = store.load_versioned(&path, 2).unwrap().unwrap();
        assert_eq!(back, vec![1, 2, 3]);
        assert!(matches!(
            store.load_versioned::<Vec<u64>>(&path, 1),
            Err(PersistenceError::VersionMismatch { expected: 1, got: 2 })
        ));
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            store.load_versioned::<Vec<u64>>(&path, 2),
            Err(PersistenceError::Json { .. })
        ));
    }

    #[test]
    fn big_bang_marker() {
        let (_dir, store) = store();
        assert!(!store.has_big_bang_marker());
        store.write_big_bang_marker(1).unwrap();
        assert!(store.has_big_bang_marker());
    }
}
