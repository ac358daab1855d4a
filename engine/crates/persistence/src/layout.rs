use std::path::{Path, PathBuf};

use space::ChunkKey;

/// On-disk layout of one world directory.
#[derive(Debug, Clone)]
pub struct WorldLayout {
    root: PathBuf,
}

impl WorldLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn galaxy_dir(&self, galaxy: u32) -> PathBuf {
        self.root.join("galaxies").join(galaxy.to_string())
    }

    pub fn chunk_path(&self, key: ChunkKey) -> PathBuf {
        match key {
            ChunkKey::Universe => self.root.join("universe.chunk"),
            ChunkKey::Starmap { galaxy } => self.galaxy_dir(galaxy).join("starmap.chunk"),
            ChunkKey::System { galaxy, system } => self
                .galaxy_dir(galaxy)
                .join("systems")
                .join(format!("system_{system}.chunk")),
        }
    }

    pub fn starmap_points_path(&self, galaxy: u32) -> PathBuf {
        self.galaxy_dir(galaxy).join("interstellarMap.sa2map")
    }

    pub fn universe_points_path(&self) -> PathBuf {
        self.root.join("intergalacticMap.sa2map")
    }

    pub fn terrain_path(&self, galaxy: u32, system: u32, planet: u64) -> PathBuf {
        self.galaxy_dir(galaxy)
            .join("systems")
            .join(format!("system_{system}"))
            .join("terrains")
            .join(format!("planet_{planet}.terrain"))
    }

    pub fn id_sequence_path(&self) -> PathBuf {
        self.root.join("object_id_seq.json")
    }

    pub fn big_bang_marker(&self) -> PathBuf {
        self.root.join("bigBang.txt")
    }

    pub fn players_path(&self) -> PathBuf {
        self.root.join("players.sa2.json")
    }

    pub fn agencies_path(&self) -> PathBuf {
        self.root.join("agencies.sa2.json")
    }
}
