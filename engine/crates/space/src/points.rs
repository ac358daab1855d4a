use glam::DVec2;
use serde::{Deserialize, Serialize};

/// A catalogued system (on a starmap) or galaxy (on the universe map).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapPoint {
    pub id: u32,
    pub name: String,
    pub x: f64,
    pub y: f64,
}

impl MapPoint {
    pub fn position(&self) -> DVec2 {
        DVec2::new(self.x, self.y)
    }
}

/// Contents of an `.sa2map` file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapPoints {
    #[serde(default)]
    pub points: Vec<MapPoint>,
}

impl MapPoints {
    pub fn home_starmap() -> Self {
        Self {
            points: vec![MapPoint {
                id: 1,
                name: "Home System".into(),
                x: 0.0,
                y: 0.0,
            }],
        }
    }

    pub fn home_universe() -> Self {
        Self {
            points: vec![MapPoint {
                id: 1,
                name: "Milky Way".into(),
                x: 0.0,
                y: 0.0,
            }],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, id: u32) -> Option<&MapPoint> {
        self.points.iter().find(|p| p.id == id)
    }

    /// Registers system `id` on a starmap if absent. Returns true when added.
    pub fn ensure_system(&mut self, id: u32) -> bool {
        self.ensure(id, format!("System {id}"), 1.0e10 + id as f64 * 1.0e9, id as f64 * 0.31)
    }

    /// Registers galaxy `id` on the universe map if absent.
    pub fn ensure_galaxy(&mut self, id: u32) -> bool {
        self.ensure(id, format!("Galaxy {id}"), 1.0e11 + id as f64 * 5.0e10, id as f64 * 0.17)
    }

    fn ensure(&mut self, id: u32, name: String, radius: f64, angle: f64) -> bool {
        if self.get(id).is_some() {
            return false;
        }
        self.points.push(MapPoint {
            id,
            name,
            x: radius * angle.cos(),
            y: radius * angle.sin(),
        });
        true
    }

    /// Closest point within `radius` of `position`.
    pub fn nearest_within(&self, position: DVec2, radius: f64) -> Option<&MapPoint> {
        self.points
            .iter()
            .map(|p| (p, p.position().distance(position)))
            .filter(|(_, d)| *d <= radius)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(p, _)| p)
    }
}
