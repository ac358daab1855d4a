use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use engine_core::tick::TickConfig;
use engine_core::ManagerConfig;
use net::admission::AdmissionConfig;
use net::server::SessionLimits;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetSection {
    pub tcp_addr: String,
    pub udp_addr: String,
}

impl Default for NetSection {
    fn default() -> Self {
        Self {
            tcp_addr: "0.0.0.0:9000".to_string(),
            udp_addr: "0.0.0.0:9001".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TickSection {
    pub tps: u32,
    /// Simulated seconds per wall-clock second.
    pub sim_rate: f64,
}

impl Default for TickSection {
    fn default() -> Self {
        Self { tps: 60, sim_rate: 1.0 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorldSection {
    pub root: String,
    pub autosave_secs: u64,
    pub chunk_retention_secs: u64,
    pub catalog_path: String,
    pub catalog_reload_secs: u64,
}

impl Default for WorldSection {
    fn default() -> Self {
        Self {
            root: "universe".to_string(),
            autosave_secs: 60,
            chunk_retention_secs: 120,
            catalog_path: "content/game_desc.json".to_string(),
            catalog_reload_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamSection {
    pub positions_hz: u32,
    pub players_hz: u32,
    pub fields_hz: u32,
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            positions_hz: 60,
            players_hz: 60,
            fields_hz: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub idle_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub max_frame_bytes: usize,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 30,
            write_timeout_secs: 5,
            max_frame_bytes: 65536,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SecuritySection {
    pub max_connections_total: usize,
    pub max_connections_per_ip: usize,
    pub max_packets_per_second: u32,
}

impl Default for SecuritySection {
    fn default() -> Self {
        Self {
            max_connections_total: 1000,
            max_connections_per_ip: 8,
            max_packets_per_second: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GameSection {
    pub starting_money: i64,
    /// Accounts allowed to speak on the administrator channel.
    pub admins: Vec<u64>,
    pub official_server: bool,
}

impl Default for GameSection {
    fn default() -> Self {
        Self {
            starting_money: 10_000,
            admins: Vec::new(),
            official_server: false,
        }
    }
}

/// Top-level space server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub net: NetSection,
    pub tick: TickSection,
    pub world: WorldSection,
    pub stream: StreamSection,
    pub session: SessionSection,
    pub security: SecuritySection,
    pub game: GameSection,
}

impl ServerConfig {
    /// Load configuration from an optional TOML file path.
    pub fn load(config_path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        let config = match config_path {
            Some(path) if Path::new(path).exists() => {
                let content = std::fs::read_to_string(path)?;
                toml::from_str(&content)?
            }
            _ => Self::default(),
        };
        Ok(config)
    }

    pub fn to_tick_config(&self) -> TickConfig {
        TickConfig {
            tps: self.tick.tps,
            max_ticks: 0,
        }
    }

    pub fn to_manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            tps: self.tick.tps,
            sim_rate: self.tick.sim_rate,
            retention_ms: self.world.chunk_retention_secs * 1000,
            ..ManagerConfig::default()
        }
    }

    pub fn to_session_limits(&self) -> SessionLimits {
        SessionLimits {
            idle_timeout: Duration::from_secs(self.session.idle_timeout_secs),
            write_timeout: Duration::from_secs(self.session.write_timeout_secs),
            max_frame_bytes: self.session.max_frame_bytes,
            max_packets_per_second: self.security.max_packets_per_second,
        }
    }

    pub fn to_admission_config(&self) -> AdmissionConfig {
        AdmissionConfig {
            max_connections_total: self.security.max_connections_total,
            max_connections_per_ip: self.security.max_connections_per_ip,
            max_packets_per_second: self.security.max_packets_per_second,
        }
    }

    pub fn is_admin(&self, account: u64) -> bool {
        self.game.admins.contains(&account)
    }
}

/// Converts a loop frequency into a period, treating 0 as 1 Hz.
pub fn period_for_hz(hz: u32) -> Duration {
    Duration::from_secs_f64(1.0 / hz.max(1) as f64)
}

/// Parse CLI arguments and load config.
/// Supports: --config <path>
pub fn parse_cli_args() -> ServerConfig {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<&str> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                if let Some(val) = args.get(i + 1) {
                    config_path = Some(val.as_str());
                    i += 2;
                } else {
                    eprintln!("--config requires a path argument");
                    std::process::exit(1);
                }
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                std::process::exit(1);
            }
        }
    }

    match ServerConfig::load(config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn default_config_matches_hardcoded_values() {
        let config = ServerConfig::default();
        assert_eq!(config.net.tcp_addr, "0.0.0.0:9000");
        assert_eq!(config.net.udp_addr, "0.0.0.0:9001");
        assert_eq!(config.tick.tps, 60);
        assert_eq!(config.world.root, "universe");
        assert_eq!(config.world.autosave_secs, 60);
        assert_eq!(config.stream.fields_hz, 5);
        assert_eq!(config.session.max_frame_bytes, 65536);
        assert_eq!(config.security.max_connections_per_ip, 8);
        assert!(!config.game.official_server);
    }

    #[test]
    fn to_manager_config_carries_rates_and_retention() {
        let mut config = ServerConfig::default();
        config.tick.sim_rate = 10.0;
        config.world.chunk_retention_secs = 5;
        let mc = config.to_manager_config();
        assert_eq!(mc.tps, 60);
        assert_eq!(mc.sim_rate, 10.0);
        assert_eq!(mc.retention_ms, 5000);
    }

    #[test]
    fn session_limits_take_the_packet_budget_from_security() {
        let mut config = ServerConfig::default();
        config.security.max_packets_per_second = 7;
        let limits = config.to_session_limits();
        assert_eq!(limits.max_packets_per_second, 7);
        assert_eq!(limits.idle_timeout, Duration::from_secs(30));
    }

    #[test]
    fn period_for_zero_hz_is_one_second() {
        assert_eq!(period_for_hz(0), Duration::from_secs(1));
        assert_eq!(period_for_hz(5), Duration::from_millis(200));
    }

    #[test]
    fn load_nonexistent_file_returns_defaults() {
        let config = ServerConfig::load(Some("/tmp/nonexistent_space_config_12345.toml")).unwrap();
        assert_eq!(config.tick.tps, 60);
    }

    #[test]
    fn load_partial_toml() {
        let mut f = NamedTempFile::new().unwrap();
        write!(
            f,
            r#"
[tick]
tps = 30

[game]
admins = [7, 9]
official_server = true
"#
        )
        .unwrap();

        let config = ServerConfig::load(Some(f.path().to_str().unwrap())).unwrap();
        assert_eq!(config.tick.tps, 30);
        assert_eq!(config.tick.sim_rate, 1.0);
        assert!(config.is_admin(9));
        assert!(!config.is_admin(8));
        assert!(config.game.official_server);
        assert_eq!(config.net.tcp_addr, "0.0.0.0:9000");
    }
}
