use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PersistenceError;

pub const TERRAIN_VERSION: u32 = 1;

/// Something standing on a planet surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainEntity {
    pub id: i64,
    #[serde(default = "unknown_kind")]
    pub kind: String,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub data: Map<String, Value>,
}

fn unknown_kind() -> String {
    "unknown".to_string()
}

/// Per-planet surface overlay. Objects listed in `shared_object_ids` are
/// owned by the parent system chunk and only mirrored here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainChunk {
    pub version: u32,
    pub galaxy: u32,
    pub system: u32,
    pub planet_id: u64,
    #[serde(default)]
    pub planet_name: String,
    #[serde(default)]
    pub terrain: Map<String, Value>,
    #[serde(default)]
    pub shared_object_ids: Vec<u64>,
    #[serde(default)]
    pub entities: Vec<TerrainEntity>,
}

impl TerrainChunk {
    pub fn new(galaxy: u32, system: u32, planet_id: u64, planet_name: impl Into<String>) -> Self {
        Self {
            version: TERRAIN_VERSION,
            galaxy,
            system,
            planet_id,
            planet_name: planet_name.into(),
            terrain: Map::new(),
            shared_object_ids: Vec::new(),
            entities: Vec::new(),
        }
    }

    /// Compact JSON; this exact byte string is what gets hashed and sent.
    pub fn to_compact_json(&self) -> Result<Vec<u8>, PersistenceError> {
        serde_json::to_vec(self).map_err(|e| PersistenceError::Serialization(e.to_string()))
    }

    /// Copies in any default keys the terrain does not define yet.
    /// Returns true when something was added.
    pub fn merge_defaults(&mut self, defaults: &Map<String, Value>) -> bool {
        let mut changed = false;
        for (k, v) in defaults {
            if !self.terrain.contains_key(k) {
                self.terrain.insert(k.clone(), v.clone());
                changed = true;
            }
        }
        changed
    }

    pub fn add_shared_object(&mut self, id: u64) {
        if !self.shared_object_ids.contains(&id) {
            self.shared_object_ids.push(id);
        }
    }

    pub fn entity(&self, id: i64) -> Option<&TerrainEntity> {
        self.entities.iter().find(|e| e.id == id)
    }

    /// Inserts or replaces the entity with the same id.
    pub fn upsert_entity(&mut self, entity: TerrainEntity) {
        match self.entities.iter_mut().find(|e| e.id == entity.id) {
            Some(slot) => *slot = entity,
            None => self.entities.push(entity),
        }
    }

    pub fn remove_entity(&mut self, id: i64) -> Option<TerrainEntity> {
        let idx = self.entities.iter().position(|e| e.id == id)?;
        Some(self.entities.remove(idx))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::store::WorldStore;

    fn sample() -> TerrainChunk {
        let mut t = TerrainChunk::new(1, 1, 4, "Earth");
        t.add_shared_object(900);
        t.add_shared_object(900);
        t.upsert_entity(TerrainEntity {
            id: -1,
            kind: "base".into(),
            x: 10.0,
            y: 0.0,
            data: Map::new(),
        });
        t
    }

    #[test]
    fn compact_json_is_deterministic() {
        let a = sample().to_compact_json().unwrap();
        let b = sample().to_compact_json().unwrap();
        assert_eq!(a, b);
        assert!(!a.contains(&b' '));
        assert_eq!(sample().shared_object_ids, vec![900]);
    }

    #[test]
    fn merge_defaults_keeps_existing_keys() {
        let mut t = sample();
        t.terrain.insert("seed".into(), json!(7));
        let defaults = json!({"seed": 1, "width": 5000}).as_object().cloned().unwrap();
        assert!(t.merge_defaults(&defaults));
        assert_eq!(t.terrain["seed"], json!(7));
        assert_eq!(t.terrain["width"], json!(5000));
        assert!(!t.merge_defaults(&defaults));
    }

    #[test]
    fn upsert_replaces_by_id() {
        let mut t = sample();
        let mut moved = t.entity(-1).cloned().unwrap();
        moved.x = 99.0;
        t.upsert_entity(moved);
        assert_eq!(t.entities.len(), 1);
        assert_eq!(t.entity(-1).unwrap().x, 99.0);
        assert!(t.remove_entity(-1).is_some());
        assert!(t.remove_entity(-1).is_none());
    }

    #[test]
    fn store_roundtrip_and_missing_fields_default() {
        let dir = TempDir::new().unwrap();
        let store = WorldStore::new(dir.path());
        assert!(store.load_terrain(1, 1, 4).unwrap().is_none());
        store.save_terrain(&sample()).unwrap();
        assert_eq!(store.load_terrain(1, 1, 4).unwrap().unwrap(), sample());

        let sparse: TerrainChunk = serde_json::from_value(json!({
            "version": 1, "galaxy": 1, "system": 1, "planet_id": 3,
            "entities": [{"id": 5}]
        }))
        .unwrap();
        assert_eq!(sparse.entities[0].kind, "unknown");
        assert!(sparse.terrain.is_empty());
    }
}
