//! Process bootstrap: sockets, world, and every loop that serves it.

use std::net::SocketAddr;
use std::sync::Arc;

use engine_core::TickLoop;
use net::admission::ConnectionLimiter;
use net::server::TcpContext;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::broadcasts;
use crate::catalog::CatalogHandle;
use crate::config::ServerConfig;
use crate::dispatch;
use crate::error::StartupError;
use crate::lifecycle::ShutdownRx;
use crate::streaming;
use crate::world::World;

/// A running server. Trigger shutdown, then call [`ServerHandle::finish`].
pub struct ServerHandle {
    pub world: Arc<World>,
    pub tcp_addr: SocketAddr,
    pub udp_addr: SocketAddr,
    tasks: Vec<JoinHandle<()>>,
    tick: std::thread::JoinHandle<()>,
}

impl ServerHandle {
    /// Waits for the loops to wind down and writes a final save.
    pub async fn finish(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "server task ended abnormally");
            }
        }
        let world = self.world;
        let tick = self.tick;
        let saved = tokio::task::spawn_blocking(move || {
            if tick.join().is_err() {
                tracing::error!("tick thread panicked");
            }
            world.save_all();
        })
        .await;
        if let Err(e) = saved {
            tracing::error!(error = %e, "final save failed");
        }
    }
}

async fn bind_tcp(addr: &str) -> Result<TcpListener, StartupError> {
    TcpListener::bind(addr).await.map_err(|source| StartupError::Bind {
        addr: addr.to_string(),
        source,
    })
}

async fn bind_udp(addr: &str) -> Result<UdpSocket, StartupError> {
    UdpSocket::bind(addr).await.map_err(|source| StartupError::Bind {
        addr: addr.to_string(),
        source,
    })
}

fn local_addr(socket: std::io::Result<SocketAddr>, addr: &str) -> Result<SocketAddr, StartupError> {
    socket.map_err(|source| StartupError::Bind {
        addr: addr.to_string(),
        source,
    })
}

/// Binds both listeners, loads the world and starts serving. Fails only on
/// conditions the server cannot run without: sockets, catalog, home system.
pub async fn start(config: ServerConfig, shutdown: ShutdownRx) -> Result<ServerHandle, StartupError> {
    let listener = bind_tcp(&config.net.tcp_addr).await?;
    let udp = Arc::new(bind_udp(&config.net.udp_addr).await?);
    let tcp_addr = local_addr(listener.local_addr(), &config.net.tcp_addr)?;
    let udp_addr = local_addr(udp.local_addr(), &config.net.udp_addr)?;

    let catalog = CatalogHandle::load(config.world.catalog_path.clone())?;

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (output_tx, output_rx) = mpsc::unbounded_channel();
    let (datagram_tx, datagram_rx) = mpsc::unbounded_channel();
    let (register_tx, register_rx) = mpsc::unbounded_channel();
    let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();

    let world = Arc::new(World::open(config.clone(), catalog, output_tx, datagram_tx)?);
    tracing::info!(
        %tcp_addr,
        %udp_addr,
        players = world.players.all().len(),
        agencies = world.agencies.all().len(),
        "world open"
    );

    tokio::spawn(net::output_router::run_output_router(
        output_rx,
        register_rx,
        unregister_rx,
    ));

    let mut tasks = Vec::new();

    let ctx = TcpContext {
        events: event_tx,
        register: register_tx,
        unregister: unregister_tx,
        limiter: ConnectionLimiter::new(config.to_admission_config()),
        limits: config.to_session_limits(),
    };
    let tcp_shutdown = shutdown.clone().into_inner();
    tasks.push(tokio::spawn(async move {
        if let Err(e) = net::server::run_tcp_server(listener, ctx, tcp_shutdown).await {
            tracing::error!(error = %e, "TCP control server failed");
        }
    }));

    tasks.push(tokio::spawn(net::udp::run_udp_server(
        udp.clone(),
        inbound_tx,
        shutdown.clone().into_inner(),
    )));
    tasks.push(tokio::spawn(streaming::run_udp_sender(
        udp,
        datagram_rx,
        shutdown.clone(),
    )));
    tasks.push(tokio::spawn(dispatch::run_dispatcher(
        world.clone(),
        event_rx,
        inbound_rx,
        shutdown.clone(),
    )));
    tasks.extend(broadcasts::spawn(&world, &shutdown));
    tasks.extend(streaming::spawn(&world, &shutdown));

    let chunks = world.chunks.clone();
    let tick_config = config.to_tick_config();
    let tick_shutdown = shutdown;
    let tick = std::thread::Builder::new()
        .name("tick".into())
        .spawn(move || {
            let mut tick_loop = TickLoop::new(tick_config, chunks);
            tick_loop.run_until(|| tick_shutdown.is_shutdown(), |_| {});
        })
        .map_err(StartupError::TickThread)?;

    Ok(ServerHandle {
        world,
        tcp_addr,
        udp_addr,
        tasks,
        tick,
    })
}
