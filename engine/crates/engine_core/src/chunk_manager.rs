//! Resident chunk registry: loading, live/extrapolated residency,
//! boundary transitions, autosave and eviction.
//!
//! Lock order: the chunk map, then at most two chunk mutexes (ascending
//! `ChunkKey`), then any of the leaf locks (index, occupants, idle times,
//! frames, points, events). A chunk mutex is never held while acquiring the
//! chunk map.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use persistence::{PersistenceError, WorldStore};
use space::{
    bodies, Chunk, ChunkError, ChunkEvent, ChunkFrame, ChunkKey, MapPoints, ObjectId, ObjectIdSequence,
    SimMode, SpaceObject,
};

use crate::events::{EventBus, SimEvent};
use crate::tick::{Simulation, SimulationReport};
use crate::transition::{self, PointRegistration, PointSource, TransitionError, TransitionPlan};

pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn read<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub tps: u32,
    /// Simulated seconds per wall-clock second.
    pub sim_rate: f64,
    /// How long an unoccupied chunk stays resident before eviction.
    pub retention_ms: u64,
    /// Minimum wait before retrying a chunk whose load failed.
    pub load_retry_ms: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            tps: 60,
            sim_rate: 1.0,
            retention_ms: 120_000,
            load_retry_ms: 30_000,
        }
    }
}

impl ManagerConfig {
    /// Simulated seconds per tick.
    pub fn dt(&self) -> f64 {
        self.sim_rate / self.tps.max(1) as f64
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Chunk(#[from] ChunkError),

    #[error("chunk {0} is not resident")]
    NotResident(ChunkKey),

    #[error("chunk {0} failed to load recently, retry pending")]
    LoadBackoff(ChunkKey),
}

/// Where a player is and which vessel they fly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occupant {
    pub location: ChunkKey,
    pub vessel: Option<ObjectId>,
}

#[derive(Default)]
struct PointCache {
    universe: Option<MapPoints>,
    starmaps: BTreeMap<u32, MapPoints>,
    dirty_universe: bool,
    dirty_starmaps: BTreeSet<u32>,
}

impl PointCache {
    fn starmap(&mut self, galaxy: u32, store: &WorldStore) -> &mut MapPoints {
        let dirty = &mut self.dirty_starmaps;
        self.starmaps.entry(galaxy).or_insert_with(|| {
            let mut pts = store.load_starmap_points(galaxy).unwrap_or_else(|e| {
                tracing::warn!(galaxy, error = %e, "starmap points unreadable, starting fresh");
                MapPoints::default()
            });
            if pts.is_empty() {
                pts = MapPoints::home_starmap();
                dirty.insert(galaxy);
            }
            pts
        })
    }

    fn universe(&mut self, store: &WorldStore) -> &mut MapPoints {
        let dirty = &mut self.dirty_universe;
        self.universe.get_or_insert_with(|| {
            let mut pts = store.load_universe_points().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "universe points unreadable, starting fresh");
                MapPoints::default()
            });
            if pts.is_empty() {
                pts = MapPoints::home_universe();
                *dirty = true;
            }
            pts
        })
    }
}

pub struct ChunkManager {
    store: WorldStore,
    config: ManagerConfig,
    ids: ObjectIdSequence,
    chunks: RwLock<BTreeMap<ChunkKey, Arc<Mutex<Chunk>>>>,
    index: RwLock<HashMap<ObjectId, ChunkKey>>,
    occupants: RwLock<BTreeMap<u64, Occupant>>,
    idle_since: Mutex<HashMap<ChunkKey, u64>>,
    failed_loads: Mutex<HashMap<ChunkKey, u64>>,
    points: Mutex<PointCache>,
    frames: RwLock<BTreeMap<ChunkKey, Arc<ChunkFrame>>>,
    events: Mutex<EventBus>,
}

impl ChunkManager {
    pub fn open(store: WorldStore, config: ManagerConfig) -> Result<Self, PersistenceError> {
        let next = store.load_id_sequence()?;
        tracing::info!(root = %store.layout().root().display(), next_object_id = next, "chunk manager opened");
        Ok(Self {
            store,
            config,
            ids: ObjectIdSequence::new(next),
            chunks: RwLock::new(BTreeMap::new()),
            index: RwLock::new(HashMap::new()),
            occupants: RwLock::new(BTreeMap::new()),
            idle_since: Mutex::new(HashMap::new()),
            failed_loads: Mutex::new(HashMap::new()),
            points: Mutex::new(PointCache::default()),
            frames: RwLock::new(BTreeMap::new()),
            events: Mutex::new(EventBus::new()),
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn store(&self) -> &WorldStore {
        &self.store
    }

    /// Runs the Big Bang on an empty world, then loads the home chunk.
    /// Any failure here is fatal for startup.
    pub fn bootstrap(&self, now_ms: u64) -> Result<(), ManagerError> {
        if !self.store.has_big_bang_marker() && !self.store.chunk_exists(ChunkKey::HOME) {
            self.big_bang(now_ms)?;
        }
        self.ensure_loaded(ChunkKey::HOME, now_ms)?;
        Ok(())
    }

    fn big_bang(&self, now_ms: u64) -> Result<(), ManagerError> {
        tracing::info!("no world found, running the Big Bang");
        let universe = MapPoints::home_universe();
        let starmap = MapPoints::home_starmap();
        self.store.save_universe_points(&universe)?;
        self.store.save_starmap_points(1, &starmap)?;
        {
            let mut cache = lock(&self.points);
            cache.universe = Some(universe);
            cache.starmaps.insert(1, starmap);
        }

        let mut home = Chunk::new(ChunkKey::HOME, now_ms);
        for obj in bodies::home_system(&self.ids) {
            home.insert(obj)?;
        }
        self.store.save_chunk(&home.to_snapshot())?;
        self.store.save_id_sequence(self.ids.peek())?;
        self.store.write_big_bang_marker(now_ms)?;
        tracing::info!(objects = home.len(), "home system created");
        Ok(())
    }

    pub fn allocate_id(&self) -> ObjectId {
        self.ids.allocate()
    }

    pub fn next_object_id(&self) -> u64 {
        self.ids.peek()
    }

    /// Returns the resident chunk for `key`, loading it from disk or
    /// creating it empty. At most one instance per key is ever resident.
    pub fn ensure_loaded(&self, key: ChunkKey, now_ms: u64) -> Result<Arc<Mutex<Chunk>>, ManagerError> {
        if let Some(c) = read(&self.chunks).get(&key) {
            return Ok(c.clone());
        }
        if let Some(&failed_at) = lock(&self.failed_loads).get(&key) {
            if now_ms < failed_at.saturating_add(self.config.load_retry_ms) {
                return Err(ManagerError::LoadBackoff(key));
            }
        }

        let chunk = match self.store.load_chunk(key) {
            Ok(Some(snapshot)) => {
                self.ids.raise_above(snapshot.max_object_id());
                Chunk::from_snapshot(snapshot)
            }
            Ok(None) => Chunk::new(key, now_ms),
            Err(e) => {
                tracing::error!(chunk = %key, error = %e, "chunk load failed");
                lock(&self.failed_loads).insert(key, now_ms);
                return Err(e.into());
            }
        };
        lock(&self.failed_loads).remove(&key);

        match key {
            ChunkKey::Universe => {
                lock(&self.points).universe(&self.store);
            }
            ChunkKey::Starmap { galaxy } => {
                lock(&self.points).starmap(galaxy, &self.store);
            }
            ChunkKey::System { .. } => {}
        }

        let mut map = write(&self.chunks);
        if let Some(existing) = map.get(&key) {
            return Ok(existing.clone());
        }
        let ids = chunk.object_ids();
        let count = ids.len();
        let arc = Arc::new(Mutex::new(chunk));
        map.insert(key, arc.clone());
        {
            let mut index = write(&self.index);
            for id in ids {
                if let Some(prev) = index.insert(id, key) {
                    tracing::warn!(object = %id, previous = %prev, chunk = %key, "object claimed by two chunks");
                }
            }
        }
        drop(map);

        lock(&self.idle_since).entry(key).or_insert(now_ms);
        self.emit(SimEvent::ChunkLoaded { key });
        tracing::info!(chunk = %key, objects = count, "chunk resident");
        Ok(arc)
    }

    pub fn is_resident(&self, key: ChunkKey) -> bool {
        read(&self.chunks).contains_key(&key)
    }

    pub fn resident_keys(&self) -> Vec<ChunkKey> {
        read(&self.chunks).keys().copied().collect()
    }

    pub fn mode_of(&self, key: ChunkKey) -> Option<SimMode> {
        self.with_chunk(key, |c| c.mode())
    }

    // ---- occupancy ----

    /// Records where `account` is. The destination is loaded and promoted
    /// and the previous location demoted before this returns.
    pub fn set_occupant(
        &self,
        account: u64,
        location: ChunkKey,
        vessel: Option<ObjectId>,
        now_ms: u64,
    ) -> Result<(), ManagerError> {
        self.ensure_loaded(location, now_ms)?;
        let previous = write(&self.occupants).insert(account, Occupant { location, vessel });
        self.reconcile(location, now_ms);
        if let Some(prev) = previous {
            if prev.location != location {
                self.reconcile(prev.location, now_ms);
            }
        }
        Ok(())
    }

    pub fn remove_occupant(&self, account: u64, now_ms: u64) -> Option<Occupant> {
        let removed = write(&self.occupants).remove(&account);
        if let Some(occ) = removed {
            self.reconcile(occ.location, now_ms);
        }
        removed
    }

    pub fn set_controlled_vessel(&self, account: u64, vessel: Option<ObjectId>) -> bool {
        match write(&self.occupants).get_mut(&account) {
            Some(occ) => {
                occ.vessel = vessel;
                true
            }
            None => false,
        }
    }

    pub fn occupant(&self, account: u64) -> Option<Occupant> {
        read(&self.occupants).get(&account).copied()
    }

    pub fn occupants(&self) -> Vec<(u64, Occupant)> {
        read(&self.occupants).iter().map(|(a, o)| (*a, *o)).collect()
    }

    pub fn occupants_of(&self, key: ChunkKey) -> Vec<u64> {
        read(&self.occupants)
            .iter()
            .filter(|(_, o)| o.location == key)
            .map(|(a, _)| *a)
            .collect()
    }

    pub fn is_occupied(&self, key: ChunkKey) -> bool {
        read(&self.occupants).values().any(|o| o.location == key)
    }

    /// Brings one chunk's mode in line with its occupancy.
    fn reconcile(&self, key: ChunkKey, now_ms: u64) {
        let occupied = self.is_occupied(key);
        let Some(arc) = read(&self.chunks).get(&key).cloned() else {
            return;
        };
        let (events, frame) = {
            let mut chunk = lock(&arc);
            let events = self.align_mode(&mut chunk, occupied, now_ms);
            let frame = chunk.is_live().then(|| Arc::new(chunk.frame()));
            (events, frame)
        };
        self.after_advance(key, occupied, frame, events, now_ms);
    }

    fn align_mode(&self, chunk: &mut Chunk, occupied: bool, now_ms: u64) -> Vec<ChunkEvent> {
        match (occupied, chunk.mode()) {
            (true, SimMode::Extrapolated) => {
                tracing::debug!(chunk = %chunk.key(), "promoting to live");
                chunk.promote(now_ms, self.config.sim_rate)
            }
            (false, SimMode::Live) => {
                tracing::debug!(chunk = %chunk.key(), "demoting to extrapolated");
                chunk.demote(now_ms);
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn after_advance(
        &self,
        key: ChunkKey,
        occupied: bool,
        frame: Option<Arc<ChunkFrame>>,
        events: Vec<ChunkEvent>,
        now_ms: u64,
    ) {
        {
            let mut idle = lock(&self.idle_since);
            if occupied {
                idle.remove(&key);
            } else {
                idle.entry(key).or_insert(now_ms);
            }
        }
        {
            let mut frames = write(&self.frames);
            match frame {
                Some(f) => {
                    frames.insert(key, f);
                }
                None => {
                    frames.remove(&key);
                }
            }
        }
        self.publish(key, events);
    }

    fn publish(&self, key: ChunkKey, events: Vec<ChunkEvent>) {
        if events.is_empty() {
            return;
        }
        let mut destroyed = Vec::new();
        let mut bus = lock(&self.events);
        for event in events {
            match event {
                ChunkEvent::Destroyed {
                    object,
                    agency,
                    controller,
                } => {
                    write(&self.index).remove(&object);
                    destroyed.push(object);
                    tracing::info!(object = %object, chunk = %key, "object destroyed");
                    bus.emit(SimEvent::ObjectDestroyed {
                        object,
                        chunk: key,
                        agency,
                        controller,
                    });
                }
                ChunkEvent::Landed { vessel, body } => bus.emit(SimEvent::VesselLanded {
                    vessel,
                    body,
                    chunk: key,
                }),
                ChunkEvent::RegionEntered {
                    vessel,
                    region,
                    controller,
                } => bus.emit(SimEvent::RegionEntered {
                    vessel,
                    region,
                    controller,
                }),
            }
        }
        drop(bus);

        if !destroyed.is_empty() {
            // Pilots stay where they are but no longer fly anything.
            for occ in write(&self.occupants).values_mut() {
                if occ.vessel.is_some_and(|v| destroyed.contains(&v)) {
                    occ.vessel = None;
                }
            }
        }
    }

    fn emit(&self, event: SimEvent) {
        lock(&self.events).emit(event);
    }

    pub fn drain_events(&self) -> Vec<SimEvent> {
        lock(&self.events).drain_all()
    }

    // ---- tick ----

    /// One global tick: reconcile modes, step live chunks, publish frames,
    /// resolve transitions, evict expired chunks.
    pub fn step(&self, now_ms: u64) -> SimulationReport {
        let chunks: Vec<(ChunkKey, Arc<Mutex<Chunk>>)> =
            read(&self.chunks).iter().map(|(k, c)| (*k, c.clone())).collect();
        let occupied: BTreeSet<ChunkKey> = read(&self.occupants).values().map(|o| o.location).collect();
        let dt = self.config.dt();

        let mut report = SimulationReport::default();
        for (key, arc) in chunks {
            let is_occupied = occupied.contains(&key);
            let (events, frame) = {
                let mut chunk = lock(&arc);
                let mut events = self.align_mode(&mut chunk, is_occupied, now_ms);
                let frame = if chunk.is_live() {
                    events.extend(chunk.step(dt, now_ms));
                    report.live_chunks += 1;
                    Some(Arc::new(chunk.frame()))
                } else {
                    report.extrapolated_chunks += 1;
                    None
                };
                report.object_count += chunk.len();
                (events, frame)
            };
            self.after_advance(key, is_occupied, frame, events, now_ms);
        }

        report.transitions = self.evaluate_transitions(now_ms);
        self.evict_expired(now_ms);
        report
    }

    pub fn frame(&self, key: ChunkKey) -> Option<Arc<ChunkFrame>> {
        read(&self.frames).get(&key).cloned()
    }

    fn evaluate_transitions(&self, now_ms: u64) -> usize {
        let mut moved = 0;
        for (account, occ) in self.occupants() {
            let Some(vessel) = occ.vessel else {
                continue;
            };
            match self.try_transition(account, occ, vessel, now_ms) {
                Ok(true) => moved += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(account, vessel = %vessel, error = %e, "transition not applied"),
            }
        }
        moved
    }

    fn try_transition(
        &self,
        account: u64,
        occ: Occupant,
        vessel: ObjectId,
        now_ms: u64,
    ) -> Result<bool, TransitionError> {
        let actual = self.chunk_of(vessel).ok_or(TransitionError::VesselMissing(vessel))?;
        if actual != occ.location {
            // Authoritative chunk state wins; move the player to their vessel.
            if let Err(e) = self.set_occupant(account, actual, Some(vessel), now_ms) {
                tracing::warn!(account, chunk = %actual, error = %e, "could not re-derive occupant location");
            }
            return Err(TransitionError::WrongChunk {
                vessel,
                expected: occ.location,
                actual,
            });
        }
        let (position, velocity) = self
            .with_object(vessel, |o| (o.position, o.velocity))
            .ok_or(TransitionError::VesselMissing(vessel))?;
        let Some(plan) = transition::plan(occ.location, position, velocity, self) else {
            return Ok(false);
        };
        self.apply_transition(account, vessel, &plan, now_ms)?;
        Ok(true)
    }

    fn apply_transition(
        &self,
        account: u64,
        vessel: ObjectId,
        plan: &TransitionPlan,
        now_ms: u64,
    ) -> Result<(), TransitionError> {
        self.ensure_loaded(plan.to, now_ms)
            .map_err(|e| TransitionError::Destination {
                key: plan.to,
                source: Box::new(e),
            })?;
        if let Some(reg) = plan.register {
            self.register_point(reg);
        }

        let promoted = {
            let map = read(&self.chunks);
            let (Some(src), Some(dst)) = (map.get(&plan.from), map.get(&plan.to)) else {
                return Err(TransitionError::Destination {
                    key: plan.to,
                    source: Box::new(ManagerError::NotResident(plan.to)),
                });
            };
            let mut src_guard;
            let mut dst_guard;
            if plan.from < plan.to {
                src_guard = lock(src);
                dst_guard = lock(dst);
            } else {
                dst_guard = lock(dst);
                src_guard = lock(src);
            }

            if dst_guard.contains(vessel) {
                return Err(TransitionError::WrongChunk {
                    vessel,
                    expected: plan.from,
                    actual: plan.to,
                });
            }
            // Bring the destination clock up to now before the arrival lands in it.
            let promoted = dst_guard.promote(now_ms, self.config.sim_rate);
            let mut obj = src_guard
                .remove(vessel)
                .map_err(|_| TransitionError::VesselMissing(vessel))?;
            obj.position = plan.position;
            obj.velocity = plan.velocity;
            if let Some(v) = obj.vessel_mut() {
                v.landed = None;
                v.region = None;
            }
            if let Err(e) = dst_guard.insert(obj) {
                tracing::error!(vessel = %vessel, error = %e, "arrival rejected by destination");
            }
            promoted
        };

        write(&self.index).insert(vessel, plan.to);
        if let Some(occ) = write(&self.occupants).get_mut(&account) {
            occ.location = plan.to;
        }
        self.publish(plan.to, promoted);
        self.reconcile(plan.to, now_ms);
        self.reconcile(plan.from, now_ms);
        self.emit(SimEvent::PlayerTransferred {
            account,
            vessel,
            from: plan.from,
            to: plan.to,
        });
        tracing::info!(account, vessel = %vessel, from = %plan.from, to = %plan.to, "chunk transition");
        Ok(())
    }

    fn evict_expired(&self, now_ms: u64) {
        let expired: Vec<ChunkKey> = lock(&self.idle_since)
            .iter()
            .filter(|(_, since)| now_ms.saturating_sub(**since) >= self.config.retention_ms)
            .map(|(k, _)| *k)
            .collect();

        for key in expired {
            if self.is_occupied(key) {
                lock(&self.idle_since).remove(&key);
                continue;
            }
            // Held across the save so nobody can reload a stale copy meanwhile.
            let mut map = write(&self.chunks);
            let Some(arc) = map.remove(&key) else {
                lock(&self.idle_since).remove(&key);
                continue;
            };
            let (snapshot, ids) = {
                let mut chunk = lock(&arc);
                chunk.demote(now_ms);
                (chunk.to_snapshot(), chunk.object_ids())
            };
            if let Err(e) = self.store.save_chunk(&snapshot) {
                tracing::error!(chunk = %key, error = %e, "eviction save failed, keeping chunk resident");
                map.insert(key, arc);
                lock(&self.idle_since).insert(key, now_ms);
                continue;
            }
            {
                let mut index = write(&self.index);
                for id in ids {
                    if index.get(&id) == Some(&key) {
                        index.remove(&id);
                    }
                }
            }
            drop(map);
            lock(&self.idle_since).remove(&key);
            write(&self.frames).remove(&key);
            self.emit(SimEvent::ChunkEvicted { key });
            tracing::info!(chunk = %key, "chunk evicted");
        }
    }

    // ---- persistence ----

    /// Snapshots every resident chunk under its own mutex and writes it
    /// outside. Failures are logged and retried on the next call.
    pub fn save_all(&self) -> usize {
        let chunks: Vec<(ChunkKey, Arc<Mutex<Chunk>>)> =
            read(&self.chunks).iter().map(|(k, c)| (*k, c.clone())).collect();
        let mut saved = 0;
        for (key, arc) in chunks {
            let snapshot = lock(&arc).to_snapshot();
            match self.store.save_chunk(&snapshot) {
                Ok(_) => saved += 1,
                Err(e) => tracing::error!(chunk = %key, error = %e, "autosave failed, will retry next cycle"),
            }
        }
        self.flush_points();
        if let Err(e) = self.store.save_id_sequence(self.ids.peek()) {
            tracing::error!(error = %e, "failed to persist object id sequence");
        }
        tracing::info!(saved, "autosave complete");
        saved
    }

    fn flush_points(&self) {
        let mut cache = lock(&self.points);
        if cache.dirty_universe {
            if let Some(pts) = &cache.universe {
                match self.store.save_universe_points(pts) {
                    Ok(()) => cache.dirty_universe = false,
                    Err(e) => tracing::error!(error = %e, "failed to save universe points"),
                }
            }
        }
        let dirty: Vec<u32> = cache.dirty_starmaps.iter().copied().collect();
        for galaxy in dirty {
            let Some(pts) = cache.starmaps.get(&galaxy) else {
                cache.dirty_starmaps.remove(&galaxy);
                continue;
            };
            match self.store.save_starmap_points(galaxy, pts) {
                Ok(()) => {
                    cache.dirty_starmaps.remove(&galaxy);
                }
                Err(e) => tracing::error!(galaxy, error = %e, "failed to save starmap points"),
            }
        }
    }

    pub fn starmap_points(&self, galaxy: u32) -> MapPoints {
        lock(&self.points).starmap(galaxy, &self.store).clone()
    }

    pub fn universe_points(&self) -> MapPoints {
        lock(&self.points).universe(&self.store).clone()
    }

    fn register_point(&self, reg: PointRegistration) {
        let mut cache = lock(&self.points);
        match reg {
            PointRegistration::System { galaxy, system } => {
                if cache.starmap(galaxy, &self.store).ensure_system(system) {
                    cache.dirty_starmaps.insert(galaxy);
                    tracing::info!(galaxy, system, "system point registered");
                }
            }
            PointRegistration::Galaxy { galaxy } => {
                if cache.universe(&self.store).ensure_galaxy(galaxy) {
                    cache.dirty_universe = true;
                    tracing::info!(galaxy, "galaxy point registered");
                }
            }
        }
    }

    // ---- lookups ----

    pub fn chunk_of(&self, id: ObjectId) -> Option<ChunkKey> {
        read(&self.index).get(&id).copied()
    }

    /// Runs `f` under the chunk's mutex. `f` must not call back into the
    /// manager.
    pub fn with_chunk<R>(&self, key: ChunkKey, f: impl FnOnce(&mut Chunk) -> R) -> Option<R> {
        let map = read(&self.chunks);
        let arc = map.get(&key)?;
        let mut chunk = lock(arc);
        Some(f(&mut chunk))
    }

    pub fn with_object<R>(&self, id: ObjectId, f: impl FnOnce(&SpaceObject) -> R) -> Option<R> {
        let key = self.chunk_of(id)?;
        self.with_chunk(key, |c| c.get(id).map(f)).flatten()
    }

    pub fn with_object_mut<R>(&self, id: ObjectId, f: impl FnOnce(&mut SpaceObject) -> R) -> Option<R> {
        let key = self.chunk_of(id)?;
        self.with_chunk(key, |c| c.get_mut(id).map(f)).flatten()
    }

    /// Adds a new object to `key`, loading the chunk if needed.
    pub fn spawn_object(&self, key: ChunkKey, object: SpaceObject, now_ms: u64) -> Result<ObjectId, ManagerError> {
        self.ensure_loaded(key, now_ms)?;
        let id = object.id;
        let sim_rate = self.config.sim_rate;
        let result = self
            .with_chunk(key, |c| {
                // Extrapolated chunks are behind wall time; catch up so the
                // newcomer is not fast-forwarded on the next promotion.
                let events = c.catch_up(now_ms, sim_rate);
                c.insert(object).map(|()| events)
            })
            .ok_or(ManagerError::NotResident(key))?;
        let events = result?;
        write(&self.index).insert(id, key);
        self.publish(key, events);
        Ok(id)
    }

    pub fn remove_object(&self, id: ObjectId) -> Option<SpaceObject> {
        let key = self.chunk_of(id)?;
        let removed = self.with_chunk(key, |c| c.remove(id).ok()).flatten();
        write(&self.index).remove(&id);
        removed
    }

    pub fn planets_in(&self, key: ChunkKey) -> Vec<SpaceObject> {
        self.with_chunk(key, |c| c.objects().filter(|o| o.is_planet()).cloned().collect())
            .unwrap_or_default()
    }

    pub fn objects_in(&self, key: ChunkKey) -> Vec<SpaceObject> {
        self.with_chunk(key, |c| c.objects().cloned().collect())
            .unwrap_or_default()
    }
}

impl PointSource for ChunkManager {
    fn starmap(&self, galaxy: u32) -> MapPoints {
        self.starmap_points(galaxy)
    }

    fn universe(&self) -> MapPoints {
        self.universe_points()
    }
}

impl Simulation for Arc<ChunkManager> {
    fn advance(&mut self, _tick: u64) -> SimulationReport {
        self.step(unix_millis())
    }
}
