use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use net::protocol::AgencyListEntry;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::catalog::Catalog;
use crate::error::{GameError, GameResult};

pub type AgencyId = u64;

pub const MAX_NAME_CHARS: usize = 32;
const SECONDS_PER_DAY: f64 = 86_400.0;

pub mod counters {
    pub const BUILDINGS_CONSTRUCTED: &str = "buildings_constructed";
    pub const VESSELS_LAUNCHED: &str = "vessels_launched";
    pub const PLANETS_DISCOVERED: &str = "planets_discovered";
    pub const RESOURCES_SOLD: &str = "resources_sold";
    pub const LANDINGS: &str = "landings";
}

pub fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Building {
    pub building_type: u16,
    pub level: u16,
    /// Position around the planet, in whole degrees.
    pub angle: u16,
    pub constructed: bool,
    pub progress_secs: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Astronaut {
    pub id: u32,
    pub name: String,
    pub planet: u64,
    /// Account currently steering this astronaut on a terrain.
    #[serde(default)]
    pub controller: Option<u64>,
    #[serde(default)]
    pub suit_id: u32,
    #[serde(default)]
    pub appearance_id: u32,
    /// Vessel the astronaut is aboard, if any.
    #[serde(default)]
    pub vessel_id: Option<u64>,
}

/// Number of appearance variants clients know how to draw.
pub const APPEARANCE_VARIANTS: u32 = 13;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestProgress {
    pub progress: u32,
    pub completed: bool,
    pub claimed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agency {
    pub id: AgencyId,
    pub name: String,
    pub is_public: bool,
    pub members: BTreeSet<u64>,
    #[serde(default)]
    pub invited: BTreeSet<u64>,
    pub treasury: i64,
    #[serde(default)]
    pub income_per_second: i64,
    #[serde(default)]
    pub bases: BTreeMap<u64, Vec<Building>>,
    #[serde(default)]
    pub inventories: BTreeMap<u64, BTreeMap<u16, u32>>,
    #[serde(default)]
    pub discovered_planets: BTreeSet<u64>,
    #[serde(default)]
    pub astronauts: BTreeMap<u32, Astronaut>,
    #[serde(default)]
    pub quest_state: BTreeMap<u32, QuestProgress>,
    #[serde(default)]
    pub quest_counters: BTreeMap<String, u32>,
    #[serde(default)]
    pub age_days: f64,
}

impl Agency {
    /// A fresh agency founded by `founder`, with the catalog's starting
    /// base and stock on the home planet.
    pub fn found(
        id: AgencyId,
        name: String,
        is_public: bool,
        founder: u64,
        catalog: &Catalog,
        home_planet: u64,
        astronaut_id: u32,
    ) -> Self {
        let buildings = catalog
            .starting_buildings
            .iter()
            .map(|&building_type| Building {
                building_type,
                level: 1,
                angle: 0,
                constructed: true,
                progress_secs: 0,
            })
            .collect();
        let mut agency = Self {
            id,
            name,
            is_public,
            members: BTreeSet::from([founder]),
            invited: BTreeSet::new(),
            treasury: catalog.starting_treasury,
            income_per_second: 0,
            bases: BTreeMap::from([(home_planet, buildings)]),
            inventories: BTreeMap::from([(home_planet, catalog.starting_inventory.clone())]),
            discovered_planets: BTreeSet::from([home_planet]),
            astronauts: BTreeMap::from([(
                astronaut_id,
                Astronaut {
                    id: astronaut_id,
                    name: format!("Astronaut {astronaut_id}"),
                    planet: home_planet,
                    controller: None,
                    suit_id: 0,
                    appearance_id: astronaut_id % APPEARANCE_VARIANTS,
                    vessel_id: None,
                },
            )]),
            quest_state: BTreeMap::new(),
            quest_counters: BTreeMap::new(),
            age_days: 0.0,
        };
        agency.recompute_income(catalog);
        agency
    }

    pub fn is_member(&self, account: u64) -> bool {
        self.members.contains(&account)
    }

    pub fn recompute_income(&mut self, catalog: &Catalog) {
        self.income_per_second = self
            .bases
            .values()
            .flatten()
            .filter(|b| b.constructed)
            .filter_map(|b| catalog.building(b.building_type).map(|d| d.income_per_second * b.level as i64))
            .sum();
    }

    /// Checks the treasury and debits `cost` in one step.
    pub fn spend(&mut self, cost: i64) -> GameResult<()> {
        if self.treasury < cost {
            return Err(GameError::InsufficientFunds {
                need: cost,
                have: self.treasury,
            });
        }
        self.treasury -= cost;
        Ok(())
    }

    pub fn refund(&mut self, amount: i64) {
        self.treasury = self.treasury.saturating_add(amount);
    }

    fn building_mut(&mut self, planet: u64, building_type: u16) -> Option<&mut Building> {
        self.bases
            .get_mut(&planet)?
            .iter_mut()
            .find(|b| b.building_type == building_type)
    }

    pub fn building(&self, planet: u64, building_type: u16) -> Option<&Building> {
        self.bases
            .get(&planet)?
            .iter()
            .find(|b| b.building_type == building_type)
    }

    /// Places a new building. Returns the cost charged.
    pub fn construct(&mut self, catalog: &Catalog, planet: u64, building_type: u16, angle: u16) -> GameResult<i64> {
        let def = catalog
            .building(building_type)
            .ok_or(GameError::UnknownBuilding(building_type))?;
        if !self.discovered_planets.contains(&planet) {
            return Err(GameError::PlanetNotDiscovered);
        }
        if self.building(planet, building_type).is_some() {
            return Err(GameError::DuplicateBuilding);
        }
        self.spend(def.cost)?;
        self.bases.entry(planet).or_default().push(Building {
            building_type,
            level: 1,
            angle,
            constructed: def.construction_secs == 0,
            progress_secs: 0,
        });
        self.recompute_income(catalog);
        self.bump_counter(catalog, counters::BUILDINGS_CONSTRUCTED, 1);
        Ok(def.cost)
    }

    /// Raises a building by one level. Returns `(cost, new_level)`.
    pub fn upgrade(
        &mut self,
        catalog: &Catalog,
        planet: u64,
        building_type: u16,
        to_level: u16,
    ) -> GameResult<(i64, u16)> {
        let def = catalog
            .building(building_type)
            .ok_or(GameError::UnknownBuilding(building_type))?;
        let current = match self.building(planet, building_type) {
            None => return Err(GameError::BuildingMissing),
            Some(b) if !b.constructed => return Err(GameError::UnderConstruction),
            Some(b) => b.level,
        };
        if current >= def.max_level {
            return Err(GameError::MaxLevel(current));
        }
        if to_level != current + 1 {
            return Err(GameError::BadUpgradeLevel);
        }
        let cost = def.upgrade_cost.saturating_mul(current as i64);
        self.spend(cost)?;
        if let Some(b) = self.building_mut(planet, building_type) {
            b.level = to_level;
        }
        self.recompute_income(catalog);
        Ok((cost, to_level))
    }

    /// Sells stock from a planet's inventory. Returns the amount credited.
    pub fn sell(&mut self, catalog: &Catalog, planet: u64, resource: u16, count: u16) -> GameResult<i64> {
        let def = catalog
            .resource(resource)
            .ok_or(GameError::UnknownResource(resource))?;
        let count = count as u32;
        let stock = self
            .inventories
            .get_mut(&planet)
            .and_then(|inv| inv.get_mut(&resource))
            .filter(|have| **have >= count)
            .ok_or(GameError::InsufficientResources)?;
        *stock -= count;
        let credit = def.price.saturating_mul(count as i64);
        self.treasury = self.treasury.saturating_add(credit);
        self.bump_counter(catalog, counters::RESOURCES_SOLD, count);
        Ok(credit)
    }

    /// Runs a recipe at a facility building on `planet`.
    pub fn craft(&mut self, catalog: &Catalog, planet: u64, building_type: u16, recipe: &str) -> GameResult<()> {
        let def = catalog
            .building(building_type)
            .ok_or(GameError::UnknownBuilding(building_type))?;
        let facility = def.facility.as_deref().ok_or(GameError::WrongFacility)?;
        match self.building(planet, building_type) {
            None => return Err(GameError::BuildingMissing),
            Some(b) if !b.constructed => return Err(GameError::UnderConstruction),
            Some(_) => {}
        }
        let recipe_def = catalog
            .recipe(facility, recipe)
            .ok_or_else(|| GameError::UnknownRecipe(recipe.to_string()))?;

        let inv = self.inventories.entry(planet).or_default();
        let short = recipe_def
            .inputs
            .iter()
            .any(|(rid, need)| inv.get(rid).copied().unwrap_or(0) < *need);
        if short {
            return Err(GameError::InsufficientResources);
        }
        for (rid, need) in &recipe_def.inputs {
            if let Some(have) = inv.get_mut(rid) {
                *have -= need;
            }
        }
        for (rid, give) in &recipe_def.outputs {
            let stock = inv.entry(*rid).or_insert(0);
            *stock = stock.saturating_add(*give);
        }
        Ok(())
    }

    /// Advances a named counter and every quest that tracks it. Returns the
    /// quests completed by this bump.
    pub fn bump_counter(&mut self, catalog: &Catalog, counter: &str, by: u32) -> Vec<u32> {
        let value = {
            let c = self.quest_counters.entry(counter.to_string()).or_insert(0);
            *c = c.saturating_add(by);
            *c
        };
        let mut completed = Vec::new();
        for quest in catalog.quests().filter(|q| q.counter == counter) {
            let state = self.quest_state.entry(quest.id).or_default();
            state.progress = value.min(quest.target);
            if !state.completed && value >= quest.target {
                state.completed = true;
                completed.push(quest.id);
            }
        }
        completed
    }

    pub fn completed_quests(&self) -> BTreeSet<u32> {
        self.quest_state
            .iter()
            .filter(|(_, q)| q.completed)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Credits the reward of a completed quest once.
    pub fn claim_quest(&mut self, catalog: &Catalog, quest: u32) -> GameResult<i64> {
        let def = catalog.quest(quest).ok_or(GameError::QuestNotFound(quest))?;
        let state = self.quest_state.entry(quest).or_default();
        if state.claimed {
            return Err(GameError::QuestClaimed);
        }
        if !state.completed {
            return Err(GameError::QuestNotCompleted);
        }
        state.claimed = true;
        self.treasury = self.treasury.saturating_add(def.reward);
        Ok(def.reward)
    }

    /// Marks a planet as discovered. Returns false when it already was.
    pub fn discover(&mut self, catalog: &Catalog, planet: u64) -> bool {
        if !self.discovered_planets.insert(planet) {
            return false;
        }
        self.bump_counter(catalog, counters::PLANETS_DISCOVERED, 1);
        true
    }

    /// One second of agency time: income, construction and age.
    pub fn tick_second(&mut self, catalog: &Catalog) {
        self.treasury = self.treasury.saturating_add(self.income_per_second);
        self.age_days += 1.0 / SECONDS_PER_DAY;

        let mut finished = false;
        for b in self.bases.values_mut().flatten().filter(|b| !b.constructed) {
            b.progress_secs = b.progress_secs.saturating_add(1);
            let needed = catalog
                .building(b.building_type)
                .map(|d| d.construction_secs)
                .unwrap_or(0);
            if b.progress_secs >= needed {
                b.constructed = true;
                b.progress_secs = 0;
                finished = true;
            }
        }
        if finished {
            self.recompute_income(catalog);
        }
    }

    pub fn astronauts_on(&self, planet: u64) -> impl Iterator<Item = &Astronaut> {
        self.astronauts.values().filter(move |a| a.planet == planet)
    }

    /// Frees every astronaut steered by `account`. Returns how many.
    pub fn release_astronauts(&mut self, account: u64) -> usize {
        let mut n = 0;
        for a in self.astronauts.values_mut() {
            if a.controller == Some(account) {
                a.controller = None;
                n += 1;
            }
        }
        n
    }

    pub fn gamestate_json(&self) -> Vec<u8> {
        let doc = json!({
            "id": self.id,
            "name": self.name,
            "treasury": self.treasury,
            "income_per_second": self.income_per_second,
            "bases": self.bases,
            "inventories": self.inventories,
            "discovered_planets": self.discovered_planets,
            "astronauts": self.astronauts,
            "quests": self.quest_state,
            "quest_counters": self.quest_counters,
            "age_days": self.age_days,
        });
        serde_json::to_vec(&doc).unwrap_or_default()
    }

    pub fn list_entry(&self) -> AgencyListEntry {
        AgencyListEntry {
            id: self.id,
            is_public: self.is_public,
            members: self.members.len().min(u16::MAX as usize) as u16,
            name: self.name.clone(),
        }
    }
}

pub fn validate_name(name: &str) -> GameResult<String> {
    let trimmed = name.trim();
    let chars = trimmed.chars().count();
    if chars == 0 || chars > MAX_NAME_CHARS || trimmed.chars().any(char::is_control) {
        return Err(GameError::InvalidName);
    }
    Ok(trimmed.to_string())
}

/// Every agency, each behind its own mutex so operations on one agency
/// never wait on another.
#[derive(Debug)]
pub struct AgencyRegistry {
    agencies: RwLock<BTreeMap<AgencyId, Arc<Mutex<Agency>>>>,
    next_id: AtomicU64,
    next_astronaut: AtomicU32,
}

impl Default for AgencyRegistry {
    fn default() -> Self {
        Self::from_agencies(Vec::new())
    }
}

impl AgencyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the registry from persisted agencies; id counters resume
    /// above the highest loaded ids.
    pub fn from_agencies(agencies: Vec<Agency>) -> Self {
        let next_id = agencies.iter().map(|a| a.id).max().unwrap_or(0) + 1;
        let next_astronaut = agencies
            .iter()
            .flat_map(|a| a.astronauts.keys().copied())
            .max()
            .unwrap_or(0)
            + 1;
        Self {
            agencies: RwLock::new(
                agencies
                    .into_iter()
                    .map(|a| (a.id, Arc::new(Mutex::new(a))))
                    .collect(),
            ),
            next_id: AtomicU64::new(next_id),
            next_astronaut: AtomicU32::new(next_astronaut),
        }
    }

    /// Founds an agency. The name check and insert happen under the map's
    /// write lock, so two racing creates cannot both take a name.
    pub fn create(
        &self,
        name: &str,
        is_public: bool,
        founder: u64,
        catalog: &Catalog,
        home_planet: u64,
    ) -> GameResult<Arc<Mutex<Agency>>> {
        let name = validate_name(name)?;
        let mut map = self.agencies.write().unwrap_or_else(|e| e.into_inner());
        let lowered = name.to_lowercase();
        if map.values().any(|a| lock(a).name.to_lowercase() == lowered) {
            return Err(GameError::NameTaken);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let astronaut = self.next_astronaut.fetch_add(1, Ordering::Relaxed);
        let agency = Arc::new(Mutex::new(Agency::found(
            id,
            name,
            is_public,
            founder,
            catalog,
            home_planet,
            astronaut,
        )));
        map.insert(id, agency.clone());
        tracing::info!(agency = id, founder, "agency created");
        Ok(agency)
    }

    pub fn get(&self, id: AgencyId) -> Option<Arc<Mutex<Agency>>> {
        self.agencies
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
    }

    pub fn all(&self) -> Vec<Arc<Mutex<Agency>>> {
        self.agencies
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    pub fn list_entries(&self) -> Vec<AgencyListEntry> {
        self.all().iter().map(|a| lock(a).list_entry()).collect()
    }

    /// Owned copies for persistence and snapshots.
    pub fn export(&self) -> Vec<Agency> {
        self.all().iter().map(|a| lock(a).clone()).collect()
    }

    /// JSON of every agency for AGENCY_SNAPSHOT.
    pub fn snapshot_json(&self) -> Vec<u8> {
        let entries: Vec<_> = self
            .all()
            .iter()
            .map(|a| {
                let a = lock(a);
                let entry = json!({
                    "id": a.id,
                    "name": a.name,
                    "is_public": a.is_public,
                    "members": a.members,
                    "bases": a.bases,
                    "discovered_planets": a.discovered_planets,
                });
                entry
            })
            .collect();
        serde_json::to_vec(&entries).unwrap_or_default()
    }
}
