use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use engine_core::{unix_millis, ChunkManager};
use net::channels::OutputTx;
use net::protocol::RosterEntry;
use net::{ChatChannel, Encode, NotifyKind, ServerDatagram, ServerPacket};
use persistence::WorldStore;
use session::{SessionId, SessionManager, SessionOutput};
use space::bodies::HOME_PLANET;
use space::{ChunkKey, ObjectId, SpaceObject};
use tokio::sync::mpsc;

use crate::agency::{lock, AgencyId, AgencyRegistry};
use crate::catalog::CatalogHandle;
use crate::config::ServerConfig;
use crate::error::StartupError;
use crate::meta;
use crate::players::PlayerRegistry;
use crate::stats::{sink_for, StatsSink};
use crate::terrain::TerrainRegistry;

/// Outbound datagrams, drained by the UDP sender task.
pub type DatagramTx = mpsc::UnboundedSender<(SocketAddr, ServerDatagram)>;
pub type DatagramRx = mpsc::UnboundedReceiver<(SocketAddr, ServerDatagram)>;

/// Everything the handlers and periodic loops share.
///
/// Lock order: sessions, then players, then one agency, then terrain.
/// Chunk locks are only taken through the manager and never while an
/// agency is held.
pub struct World {
    pub config: ServerConfig,
    pub chunks: Arc<ChunkManager>,
    pub players: PlayerRegistry,
    pub agencies: AgencyRegistry,
    pub catalog: CatalogHandle,
    pub terrain: TerrainRegistry,
    sessions: RwLock<SessionManager>,
    stats: Box<dyn StatsSink>,
    tcp_out: OutputTx,
    udp_out: DatagramTx,
    home_planet: u64,
}

impl World {
    /// Opens the world directory, running the Big Bang on first start.
    pub fn open(
        config: ServerConfig,
        catalog: CatalogHandle,
        tcp_out: OutputTx,
        udp_out: DatagramTx,
    ) -> Result<Self, StartupError> {
        let store = WorldStore::new(&config.world.root);
        let chunks = Arc::new(ChunkManager::open(store, config.to_manager_config())?);
        chunks.bootstrap(unix_millis())?;
        let players = meta::load_players(chunks.store())?;
        let agencies = meta::load_agencies(chunks.store())?;

        let home_planet = chunks
            .planets_in(ChunkKey::HOME)
            .iter()
            .find(|p| p.object_type == HOME_PLANET)
            .map(|p| p.id.to_u64())
            .unwrap_or_else(|| {
                tracing::warn!("home planet missing from the home system");
                0
            });

        Ok(Self {
            stats: sink_for(config.game.official_server),
            config,
            chunks,
            players,
            agencies,
            catalog,
            terrain: TerrainRegistry::new(),
            sessions: RwLock::new(SessionManager::new()),
            tcp_out,
            udp_out,
            home_planet,
        })
    }

    pub fn home_planet(&self) -> u64 {
        self.home_planet
    }

    pub fn stats(&self) -> &dyn StatsSink {
        self.stats.as_ref()
    }

    pub fn sessions(&self) -> RwLockReadGuard<'_, SessionManager> {
        self.sessions.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn sessions_mut(&self) -> RwLockWriteGuard<'_, SessionManager> {
        self.sessions.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_online(&self, account: u64) -> bool {
        self.sessions().session_for_account(account).is_some()
    }

    pub fn online_accounts(&self) -> BTreeSet<u64> {
        self.sessions()
            .broadcast_snapshot()
            .into_iter()
            .map(|v| v.account)
            .collect()
    }

    /// Agencies with at least one member connected.
    pub fn online_agencies(&self) -> BTreeSet<AgencyId> {
        self.online_accounts()
            .into_iter()
            .filter_map(|a| self.players.agency_of(a))
            .collect()
    }

    // ---- TCP ----

    pub fn send(&self, session_id: SessionId, packet: &ServerPacket) {
        self.send_bytes(session_id, packet.to_bytes());
    }

    fn send_bytes(&self, session_id: SessionId, bytes: Vec<u8>) {
        if self.tcp_out.send(SessionOutput::new(session_id, bytes)).is_err() {
            tracing::debug!(session_id = %session_id, "output channel closed");
        }
    }

    pub fn close_session(&self, session_id: SessionId) {
        let _ = self.tcp_out.send(SessionOutput::close(session_id));
    }

    pub fn send_to_account(&self, account: u64, packet: &ServerPacket) {
        let session = self.sessions().session_for_account(account).map(|s| s.session_id);
        if let Some(id) = session {
            self.send(id, packet);
        }
    }

    /// Sends to every identified session, encoding once.
    pub fn broadcast(&self, packet: &ServerPacket, except: Option<SessionId>) {
        let bytes = packet.to_bytes();
        for view in self.sessions().broadcast_snapshot() {
            if Some(view.session_id) != except {
                self.send_bytes(view.session_id, bytes.clone());
            }
        }
    }

    pub fn agency_members(&self, agency: AgencyId) -> Vec<u64> {
        self.agencies
            .get(agency)
            .map(|a| lock(&a).members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn send_to_agency(&self, agency: AgencyId, packet: &ServerPacket) {
        let bytes = packet.to_bytes();
        let members = self.agency_members(agency);
        let sessions = self.sessions();
        for account in members {
            if let Some(s) = sessions.session_for_account(account) {
                self.send_bytes(s.session_id, bytes.clone());
            }
        }
    }

    pub fn chat_to_agency(&self, agency: AgencyId, channel: ChatChannel, sender: u64, message: impl Into<String>) {
        self.send_to_agency(
            agency,
            &ServerPacket::Chat {
                channel,
                sender,
                message: message.into(),
            },
        );
    }

    // ---- UDP ----

    pub fn send_datagram(&self, to: SocketAddr, datagram: ServerDatagram) {
        if self.udp_out.send((to, datagram)).is_err() {
            tracing::debug!(%to, "datagram channel closed");
        }
    }

    /// NOTIFY to one player. Skipped until their UDP endpoint is bound.
    pub fn notify(&self, account: u64, kind: NotifyKind, message: impl Into<String>) {
        let addr = self
            .sessions()
            .session_for_account(account)
            .and_then(|s| s.udp_addr);
        match addr {
            Some(addr) => self.send_datagram(addr, ServerDatagram::notify(kind, message)),
            None => tracing::debug!(account, "notify skipped, no udp endpoint"),
        }
    }

    pub fn notify_agency(&self, agency: AgencyId, kind: NotifyKind, message: impl Into<String>) {
        let message = message.into();
        for account in self.agency_members(agency) {
            self.notify(account, kind, message.clone());
        }
    }

    /// Announces freshly completed quests to the agency.
    pub fn quests_completed(&self, agency: AgencyId, quests: &[u32]) {
        let catalog = self.catalog.current();
        for &quest in quests {
            let name = catalog.quest(quest).map(|q| q.name.as_str()).unwrap_or("quest");
            self.notify_agency(agency, NotifyKind::Success, format!("Quest completed: {name}"));
            self.stats.quest_completed(agency, quest);
        }
    }

    // ---- packets built from shared state ----

    pub fn roster_packet(&self) -> ServerPacket {
        let entries = self
            .sessions()
            .broadcast_snapshot()
            .into_iter()
            .map(|view| {
                let player = self.players.get(view.account);
                let (galaxy, system) = player.as_ref().map(|p| (p.galaxy, p.system)).unwrap_or((0, 0));
                RosterEntry {
                    account: view.account,
                    temp_id: view.temp_id,
                    galaxy,
                    system,
                    agency: player.as_ref().and_then(|p| p.agency).unwrap_or(0),
                    terrain_planet: player.as_ref().and_then(|p| p.terrain_planet).unwrap_or(0),
                }
            })
            .collect();
        ServerPacket::PlayerRoster { entries }
    }

    pub fn broadcast_roster(&self) {
        self.broadcast(&self.roster_packet(), None);
    }

    pub fn agency_list_packet(&self) -> ServerPacket {
        ServerPacket::AgencyList {
            entries: self.agencies.list_entries(),
        }
    }

    pub fn agency_snapshot_packet(&self) -> ServerPacket {
        ServerPacket::AgencySnapshot {
            json: self.agencies.snapshot_json(),
        }
    }

    pub fn game_json_packet(&self) -> ServerPacket {
        ServerPacket::GameJson {
            json: self.catalog.current().json().to_vec(),
        }
    }

    pub fn gamestate_packet(&self, agency: AgencyId) -> Option<ServerPacket> {
        let agency = self.agencies.get(agency)?;
        let json = lock(&agency).gamestate_json();
        Some(ServerPacket::AgencyGamestate { json })
    }

    pub fn planet_in(&self, key: ChunkKey, planet: u64) -> Option<SpaceObject> {
        self.chunks
            .planets_in(key)
            .into_iter()
            .find(|p| p.id == ObjectId(planet))
    }

    /// Chunks, meta files and open terrains. Failures are logged; the next
    /// autosave retries.
    pub fn save_all(&self) {
        let chunks = self.chunks.save_all();
        if let Err(e) = meta::save(self.chunks.store(), &self.players, &self.agencies) {
            tracing::error!(error = %e, "meta save failed");
        }
        let terrains = self.terrain.flush(self.chunks.store(), &self.viewed_planets());
        tracing::info!(chunks, terrains, "autosave complete");
    }

    /// Planets some connected player is looking at.
    pub fn viewed_planets(&self) -> BTreeSet<u64> {
        self.online_accounts()
            .into_iter()
            .filter_map(|a| self.players.get(a).and_then(|p| p.terrain_planet))
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    use net::channels::OutputRx;
    use net::Decode;
    use tempfile::TempDir;

    use crate::catalog::bundled;
    use crate::dispatch;

    pub struct TestWorld {
        pub world: Arc<World>,
        pub tcp: OutputRx,
        pub udp: DatagramRx,
        pub dir: TempDir,
    }

    pub fn peer(n: u8) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, n)), 40000 + n as u16)
    }

    pub fn udp_peer(n: u8) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, n)), 50000 + n as u16)
    }

    impl TestWorld {
        pub fn new() -> Self {
            Self::with_config(ServerConfig::default())
        }

        pub fn with_config(mut config: ServerConfig) -> Self {
            let dir = TempDir::new().unwrap();
            config.world.root = dir.path().to_string_lossy().into_owned();
            let (tcp_tx, tcp) = mpsc::unbounded_channel();
            let (udp_tx, udp) = mpsc::unbounded_channel();
            let world = World::open(config, CatalogHandle::fixed(bundled()), tcp_tx, udp_tx).unwrap();
            Self {
                world: Arc::new(world),
                tcp,
                udp,
                dir,
            }
        }

        /// Connects and identifies `account` on session `n`, binds its UDP
        /// endpoint, and discards the welcome traffic.
        pub fn join(&mut self, n: u8, account: u64) -> SessionId {
            let id = SessionId(n as u64);
            dispatch::on_connected(&self.world, id, peer(n));
            dispatch::handle_packet(&self.world, id, net::ClientPacket::Identify { account });
            dispatch::handle_datagram(
                &self.world,
                udp_peer(n),
                net::ClientDatagram::Latency { account, client_time: 1 },
            );
            self.drain();
            id
        }

        pub fn tcp_for(&mut self, id: SessionId) -> Vec<ServerPacket> {
            let mut out = Vec::new();
            while let Ok(o) = self.tcp.try_recv() {
                if o.session_id == id && !o.bytes.is_empty() {
                    out.push(ServerPacket::decode_prefix(&o.bytes).unwrap().0);
                }
            }
            out
        }

        pub fn udp_to(&mut self, addr: SocketAddr) -> Vec<ServerDatagram> {
            let mut out = Vec::new();
            while let Ok((to, d)) = self.udp.try_recv() {
                if to == addr {
                    out.push(d);
                }
            }
            out
        }

        pub fn notices(&mut self, n: u8) -> Vec<(NotifyKind, String)> {
            self.udp_to(udp_peer(n))
                .into_iter()
                .filter_map(|d| match d {
                    ServerDatagram::Notify { kind, message } => Some((kind, message)),
                    _ => None,
                })
                .collect()
        }

        pub fn drain(&mut self) {
            while self.tcp.try_recv().is_ok() {}
            while self.udp.try_recv().is_ok() {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn open_bootstraps_home_and_finds_home_planet() {
        let t = TestWorld::new();
        assert_ne!(t.world.home_planet(), 0);
        let planet = t.world.planet_in(ChunkKey::HOME, t.world.home_planet()).unwrap();
        assert_eq!(planet.object_type, HOME_PLANET);
    }

    #[test]
    fn broadcast_skips_the_excluded_session() {
        let mut t = TestWorld::new();
        let a = t.join(1, 100);
        let b = t.join(2, 200);
        t.world.broadcast(&ServerPacket::Keepalive, Some(a));
        let mut got = Vec::new();
        while let Ok(o) = t.tcp.try_recv() {
            got.push(o.session_id);
        }
        assert_eq!(got, vec![b]);
    }

    #[test]
    fn notify_needs_a_bound_udp_endpoint() {
        let mut t = TestWorld::new();
        let id = SessionId(9);
        crate::dispatch::on_connected(&t.world, id, peer(9));
        crate::dispatch::handle_packet(&t.world, id, net::ClientPacket::Identify { account: 900 });
        t.drain();
        t.world.notify(900, NotifyKind::Generic, "hello");
        assert!(t.udp.try_recv().is_err());

        crate::dispatch::handle_datagram(
            &t.world,
            udp_peer(9),
            net::ClientDatagram::Latency { account: 900, client_time: 5 },
        );
        t.drain();
        t.world.notify(900, NotifyKind::Success, "hello");
        assert_eq!(t.notices(9), vec![(NotifyKind::Success, "hello".to_string())]);
    }

    #[test]
    fn roster_reflects_player_records() {
        let mut t = TestWorld::new();
        t.join(1, 100);
        t.world.players.update(100, |p| p.terrain_planet = Some(55));
        let ServerPacket::PlayerRoster { entries } = t.world.roster_packet() else {
            panic!("not a roster");
        };
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].account, 100);
        assert_eq!((entries[0].galaxy, entries[0].system), (1, 1));
        assert_eq!(entries[0].terrain_planet, 55);
        assert_eq!(entries[0].temp_id, 1);
    }
}
