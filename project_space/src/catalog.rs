//! Typed view of the JSON game description.
//!
//! The file is parsed once into lookup tables. The compact re-encoding of
//! the whole document is kept alongside and is what GAME_JSON sends.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;

use serde::Deserialize;
use serde_json::{Map, Value};
use space::{AttachedComponent, VesselStats};

use crate::error::GameError;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("cannot read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("catalog is not valid: {0}")]
    Parse(#[from] serde_json::Error),
}

fn one() -> u16 {
    1
}

fn default_grid() -> i32 {
    1
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BuildingDef {
    pub id: u16,
    pub name: String,
    #[serde(default)]
    pub cost: i64,
    #[serde(default, rename = "construction_time")]
    pub construction_secs: u32,
    #[serde(default = "one")]
    pub max_level: u16,
    /// Per current level: going from level n to n+1 costs `upgrade_cost * n`.
    #[serde(default)]
    pub upgrade_cost: i64,
    #[serde(default, rename = "income")]
    pub income_per_second: i64,
    /// Crafting table this building gives access to.
    #[serde(default)]
    pub facility: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ComponentDef {
    pub id: u16,
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub cost: i64,
    #[serde(default, rename = "mass")]
    pub mass_kg: f64,
    #[serde(default, rename = "fuel")]
    pub fuel_capacity: f64,
    #[serde(default, rename = "power")]
    pub power_capacity: f64,
    #[serde(default, rename = "thrust")]
    pub thrust_kn: f64,
    #[serde(default, rename = "burn")]
    pub fuel_burn_per_s: f64,
    #[serde(default, rename = "rotate")]
    pub rotate_deg_per_s: f64,
    #[serde(default, rename = "cargo")]
    pub cargo_capacity: u32,
    #[serde(default, rename = "telescope_fov")]
    pub telescope_fov_deg: f64,
    #[serde(default, rename = "telescope_range")]
    pub telescope_range_km: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResourceDef {
    pub id: u16,
    pub name: String,
    #[serde(default)]
    pub price: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct RecipeDef {
    #[serde(default)]
    pub inputs: BTreeMap<u16, u32>,
    #[serde(default)]
    pub outputs: BTreeMap<u16, u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QuestDef {
    pub id: u32,
    pub name: String,
    /// Agency counter that drives progress.
    pub counter: String,
    pub target: u32,
    #[serde(default)]
    pub reward: i64,
}

#[derive(Debug, Deserialize)]
struct RawCatalog {
    #[serde(default)]
    starting_treasury: i64,
    #[serde(default)]
    starting_buildings: Vec<u16>,
    #[serde(default)]
    starting_inventory: BTreeMap<u16, u32>,
    #[serde(default = "default_grid")]
    grid_size: i32,
    #[serde(default)]
    buildings: Vec<BuildingDef>,
    #[serde(default)]
    components: Vec<ComponentDef>,
    #[serde(default)]
    snap_rules: Vec<(String, String)>,
    #[serde(default)]
    resources: Vec<ResourceDef>,
    #[serde(default)]
    crafting_recipes: BTreeMap<String, BTreeMap<String, RecipeDef>>,
    #[serde(default)]
    quests: Vec<QuestDef>,
    #[serde(default)]
    terrain_defaults: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    pub starting_treasury: i64,
    pub starting_buildings: Vec<u16>,
    pub starting_inventory: BTreeMap<u16, u32>,
    pub terrain_defaults: Map<String, Value>,
    grid_size: i32,
    buildings: BTreeMap<u16, BuildingDef>,
    components: BTreeMap<u16, ComponentDef>,
    snaps: BTreeSet<(String, String)>,
    resources: BTreeMap<u16, ResourceDef>,
    recipes: BTreeMap<String, BTreeMap<String, RecipeDef>>,
    quests: BTreeMap<u32, QuestDef>,
    json: Arc<Vec<u8>>,
}

impl Catalog {
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, CatalogError> {
        let doc: Value = serde_json::from_slice(bytes)?;
        let json = Arc::new(serde_json::to_vec(&doc)?);
        let raw: RawCatalog = serde_json::from_value(doc)?;

        let mut snaps = BTreeSet::new();
        for (a, b) in raw.snap_rules {
            snaps.insert((a.clone(), b.clone()));
            snaps.insert((b, a));
        }

        Ok(Self {
            starting_treasury: raw.starting_treasury,
            starting_buildings: raw.starting_buildings,
            starting_inventory: raw.starting_inventory,
            terrain_defaults: raw.terrain_defaults,
            grid_size: raw.grid_size.max(1),
            buildings: raw.buildings.into_iter().map(|b| (b.id, b)).collect(),
            components: raw.components.into_iter().map(|c| (c.id, c)).collect(),
            snaps,
            resources: raw.resources.into_iter().map(|r| (r.id, r)).collect(),
            recipes: raw.crafting_recipes,
            quests: raw.quests.into_iter().map(|q| (q.id, q)).collect(),
            json,
        })
    }

    /// Compact JSON of the whole description.
    pub fn json(&self) -> Arc<Vec<u8>> {
        self.json.clone()
    }

    pub fn building(&self, id: u16) -> Option<&BuildingDef> {
        self.buildings.get(&id)
    }

    pub fn component(&self, id: u16) -> Option<&ComponentDef> {
        self.components.get(&id)
    }

    pub fn resource(&self, id: u16) -> Option<&ResourceDef> {
        self.resources.get(&id)
    }

    pub fn quest(&self, id: u32) -> Option<&QuestDef> {
        self.quests.get(&id)
    }

    pub fn quests(&self) -> impl Iterator<Item = &QuestDef> {
        self.quests.values()
    }

    pub fn recipe(&self, facility: &str, name: &str) -> Option<&RecipeDef> {
        self.recipes.get(facility)?.get(name)
    }

    pub fn can_snap(&self, a: &str, b: &str) -> bool {
        self.snaps.contains(&(a.to_string(), b.to_string()))
    }

    /// Checks a vessel layout and returns its total cost. Every component
    /// after the first must touch a compatible neighbour on the grid.
    pub fn validate_layout(&self, parts: &[AttachedComponent]) -> Result<i64, GameError> {
        if parts.is_empty() {
            return Err(GameError::EmptyVessel);
        }
        let mut defs = Vec::with_capacity(parts.len());
        for part in parts {
            let def = self
                .component(part.component_id)
                .ok_or(GameError::UnknownComponent(part.component_id))?;
            defs.push(def);
        }

        let g = self.grid_size;
        for (i, part) in parts.iter().enumerate().skip(1) {
            let attached = parts.iter().enumerate().any(|(j, other)| {
                if i == j {
                    return false;
                }
                let (dx, dy) = ((part.x - other.x).abs(), (part.y - other.y).abs());
                let adjacent = (dx == g && dy == 0) || (dx == 0 && dy == g);
                adjacent && self.can_snap(&defs[i].category, &defs[j].category)
            });
            if !attached {
                return Err(GameError::BadSnap(i));
            }
        }
        Ok(defs.iter().map(|d| d.cost).sum())
    }

    /// Sums component figures into vessel stats. Unknown ids contribute
    /// nothing; layouts are validated before this is called.
    pub fn stats_for(&self, parts: &[AttachedComponent]) -> VesselStats {
        let mut stats = VesselStats::default();
        for def in parts.iter().filter_map(|p| self.component(p.component_id)) {
            stats.dry_mass_kg += def.mass_kg;
            stats.fuel_capacity += def.fuel_capacity;
            stats.power_capacity += def.power_capacity;
            stats.thrust_kn += def.thrust_kn;
            stats.fuel_burn_per_s += def.fuel_burn_per_s;
            stats.rotate_deg_per_s += def.rotate_deg_per_s;
            stats.cargo_capacity += def.cargo_capacity;
            stats.telescope_fov_deg = stats.telescope_fov_deg.max(def.telescope_fov_deg);
            stats.telescope_range_km = stats.telescope_range_km.max(def.telescope_range_km);
        }
        stats
    }
}

/// Shared, hot-reloadable catalog. Readers take a cheap `Arc` snapshot.
pub struct CatalogHandle {
    path: Option<PathBuf>,
    current: RwLock<Arc<Catalog>>,
    mtime: Mutex<Option<SystemTime>>,
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn read_catalog(path: &Path) -> Result<Catalog, CatalogError> {
    let bytes = std::fs::read(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Catalog::from_json_bytes(&bytes)
}

impl CatalogHandle {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, CatalogError> {
        let path = path.into();
        let catalog = read_catalog(&path)?;
        tracing::info!(path = %path.display(), "catalog loaded");
        Ok(Self {
            mtime: Mutex::new(modified(&path)),
            current: RwLock::new(Arc::new(catalog)),
            path: Some(path),
        })
    }

    /// A catalog with no backing file; never reloads.
    pub fn fixed(catalog: Catalog) -> Self {
        Self {
            path: None,
            current: RwLock::new(Arc::new(catalog)),
            mtime: Mutex::new(None),
        }
    }

    pub fn current(&self) -> Arc<Catalog> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Re-reads the file when its modification time moved. A file that no
    /// longer parses leaves the previous catalog in place.
    pub fn reload_if_changed(&self) -> Result<bool, CatalogError> {
        let Some(path) = &self.path else {
            return Ok(false);
        };
        let now = modified(path);
        {
            let mut seen = self.mtime.lock().unwrap_or_else(|e| e.into_inner());
            if now.is_none() || *seen == now {
                return Ok(false);
            }
            *seen = now;
        }
        let catalog = read_catalog(path)?;
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(catalog);
        tracing::info!(path = %path.display(), "catalog reloaded");
        Ok(true)
    }
}

#[cfg(test)]
pub(crate) fn bundled() -> Catalog {
    Catalog::from_json_bytes(include_bytes!("../content/game_desc.json")).unwrap()
}
