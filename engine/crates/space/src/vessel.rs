use std::collections::BTreeMap;

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::ids::ObjectId;

/// Component placed on the vessel grid relative to the root component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedComponent {
    pub component_id: u16,
    pub x: i32,
    pub y: i32,
    pub stage: u8,
}

/// Aggregate performance figures derived from the attached components.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VesselStats {
    pub dry_mass_kg: f64,
    pub fuel_capacity: f64,
    pub power_capacity: f64,
    /// kN. Divided by mass in kg this is directly km/s².
    pub thrust_kn: f64,
    pub fuel_burn_per_s: f64,
    pub rotate_deg_per_s: f64,
    pub cargo_capacity: u32,
    pub telescope_fov_deg: f64,
    pub telescope_range_km: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ThrustFlags(u8);

impl ThrustFlags {
    pub const THRUST: u8 = 0b001;
    pub const ROTATE_LEFT: u8 = 0b010;
    pub const ROTATE_RIGHT: u8 = 0b100;

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, flag: u8) -> bool {
        self.0 & flag != 0
    }

    pub fn set(&mut self, flag: u8, on: bool) {
        if on {
            self.0 |= flag;
        } else {
            self.0 &= !flag;
        }
    }

    pub fn clear(&mut self) {
        self.0 = 0;
    }
}

/// A vessel resting on a body, carried along with it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LandedState {
    pub body: ObjectId,
    /// Offset from the body centre in chunk units.
    pub offset: DVec2,
}

/// Fuel mass per unit of fuel.
pub const FUEL_KG_PER_UNIT: f64 = 1.0;
const POWER_RECHARGE_PER_S: f64 = 0.5;
const POWER_DRAW_PER_SYSTEM_S: f64 = 0.05;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vessel {
    pub agency: u64,
    pub constructed_by: u64,
    pub components: Vec<AttachedComponent>,
    /// Highest stage still attached.
    pub stage: u8,
    pub stats: VesselStats,
    pub fuel: f64,
    pub power: f64,
    /// 0.0 destroyed, 1.0 intact.
    pub hull: f64,
    pub temperature_k: f64,
    pub flags: ThrustFlags,
    /// Account of the controlling player. Weak: cleared on disconnect.
    pub controller: Option<u64>,
    pub landed: Option<LandedState>,
    pub cargo: BTreeMap<u16, u32>,
    pub telescope_target_deg: f32,
    pub systems: BTreeMap<u16, u8>,
    pub region: Option<u32>,
    pub visited_regions: Vec<u32>,
}

impl Vessel {
    pub fn new(agency: u64, constructed_by: u64, components: Vec<AttachedComponent>) -> Self {
        let stage = components.iter().map(|c| c.stage).max().unwrap_or(0);
        Self {
            agency,
            constructed_by,
            components,
            stage,
            stats: VesselStats::default(),
            fuel: 0.0,
            power: 0.0,
            hull: 1.0,
            temperature_k: 288.0,
            flags: ThrustFlags::default(),
            controller: None,
            landed: None,
            cargo: BTreeMap::new(),
            telescope_target_deg: 0.0,
            systems: BTreeMap::new(),
            region: None,
            visited_regions: Vec::new(),
        }
    }

    /// Installs freshly derived stats, topping fuel and power up to the new
    /// capacities when `refill` is set and clamping them otherwise.
    pub fn apply_stats(&mut self, stats: VesselStats, refill: bool) {
        self.stats = stats;
        if refill {
            self.fuel = stats.fuel_capacity;
            self.power = stats.power_capacity;
        } else {
            self.fuel = self.fuel.min(stats.fuel_capacity);
            self.power = self.power.min(stats.power_capacity);
        }
    }

    pub fn total_mass_kg(&self) -> f64 {
        (self.stats.dry_mass_kg + self.fuel * FUEL_KG_PER_UNIT).max(1.0)
    }

    pub fn cargo_total(&self) -> u32 {
        self.cargo.values().sum()
    }

    /// Adds cargo up to capacity and returns the amount actually stored.
    pub fn load_cargo(&mut self, resource: u16, amount: u32) -> u32 {
        let room = self.stats.cargo_capacity.saturating_sub(self.cargo_total());
        let stored = amount.min(room);
        if stored > 0 {
            *self.cargo.entry(resource).or_insert(0) += stored;
        }
        stored
    }

    /// Drops every component of the current top stage. Returns the removed
    /// components, or nothing when only the root stage remains.
    pub fn deploy_stage(&mut self) -> Vec<AttachedComponent> {
        if self.stage == 0 {
            return Vec::new();
        }
        let stage = self.stage;
        let (dropped, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.components)
            .into_iter()
            .partition(|c| c.stage == stage);
        self.components = kept;
        self.stage = self.components.iter().map(|c| c.stage).max().unwrap_or(0);
        dropped
    }

    /// Advances resource levels and returns the thrust acceleration in
    /// km/s² along the heading (zero when not thrusting or out of fuel).
    pub fn burn(&mut self, dt: f64) -> f64 {
        let active = self.systems.values().filter(|&&s| s > 0).count() as f64;
        self.power = (self.power + (POWER_RECHARGE_PER_S - POWER_DRAW_PER_SYSTEM_S * active) * dt)
            .clamp(0.0, self.stats.power_capacity);

        if !self.flags.contains(ThrustFlags::THRUST) || self.fuel <= 0.0 || self.stats.thrust_kn <= 0.0
        {
            return 0.0;
        }
        let mass = self.total_mass_kg();
        self.fuel = (self.fuel - self.stats.fuel_burn_per_s * dt).max(0.0);
        self.stats.thrust_kn / mass
    }

    /// Signed rotation in degrees for a timestep of `dt`.
    pub fn turn(&self, dt: f64) -> f64 {
        let mut dir = 0.0;
        if self.flags.contains(ThrustFlags::ROTATE_LEFT) {
            dir += 1.0;
        }
        if self.flags.contains(ThrustFlags::ROTATE_RIGHT) {
            dir -= 1.0;
        }
        dir * self.stats.rotate_deg_per_s * dt
    }

    /// Records a region change. Returns the region only when it is entered
    /// for the first time.
    pub fn enter_region(&mut self, region: Option<u32>) -> Option<u32> {
        if region == self.region {
            return None;
        }
        self.region = region;
        let r = region?;
        if self.visited_regions.contains(&r) {
            None
        } else {
            self.visited_regions.push(r);
            Some(r)
        }
    }

    pub fn relax_temperature(&mut self, ambient_k: f64, dt: f64) {
        let k = (dt * 0.01).min(1.0);
        self.temperature_k += (ambient_k - self.temperature_k) * k;
    }
}
