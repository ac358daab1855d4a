use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use session::SessionId;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use crate::admission::{ConnectionGuard, PacketThrottle, SharedLimiter};
use crate::channels::{
    DisconnectReason, EventTx, NetEvent, RegisterSession, RegisterTx, SessionWriteRx, UnregisterTx,
};
use crate::framing::{Frame, FrameDecoder};
use crate::protocol::ClientPacket;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Time and size budgets applied to every TCP session.
#[derive(Debug, Clone)]
pub struct SessionLimits {
    pub idle_timeout: Duration,
    pub write_timeout: Duration,
    pub max_frame_bytes: usize,
    pub max_packets_per_second: u32,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(5),
            max_frame_bytes: crate::framing::DEFAULT_MAX_FRAME_BYTES,
            max_packets_per_second: 200,
        }
    }
}

/// Channels and policy shared by every accepted session.
#[derive(Clone)]
pub struct TcpContext {
    pub events: EventTx,
    pub register: RegisterTx,
    pub unregister: UnregisterTx,
    pub limiter: SharedLimiter,
    pub limits: SessionLimits,
}

/// Accepts connections until shutdown, spawning one task per session.
pub async fn run_tcp_server(
    listener: TcpListener,
    ctx: TcpContext,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), std::io::Error> {
    tracing::info!(addr = %listener.local_addr()?, "TCP control server listening");

    loop {
        let (stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    continue;
                }
            },
            _ = shutdown.changed() => {
                tracing::info!("TCP control server: shutdown signal received");
                return Ok(());
            }
        };

        let guard = match ConnectionGuard::admit(&ctx.limiter, peer.ip()) {
            Ok(g) => g,
            Err(reason) => {
                tracing::warn!(%peer, %reason, "connection rejected");
                continue;
            }
        };

        let session_id = SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed));
        tracing::info!(session_id = %session_id, %peer, "new connection");
        let ctx = ctx.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            handle_session(stream, session_id, ctx, shutdown).await;
            drop(guard);
        });
    }
}

async fn handle_session(stream: TcpStream, session_id: SessionId, ctx: TcpContext, mut shutdown: watch::Receiver<bool>) {
    let peer = match stream.peer_addr() {
        Ok(p) => p,
        Err(e) => {
            tracing::debug!(session_id = %session_id, error = %e, "peer address unavailable");
            return;
        }
    };
    let _ = stream.set_nodelay(true);
    let (mut reader, mut writer) = stream.into_split();

    let (write_tx, mut write_rx): (_, SessionWriteRx) = tokio::sync::mpsc::unbounded_channel();
    let _ = ctx.register.send(RegisterSession { session_id, write_tx });
    let _ = ctx.events.send(NetEvent::Connected { session_id, peer });

    let write_timeout = ctx.limits.write_timeout;
    let mut writer_handle = tokio::spawn(async move {
        while let Some(bytes) = write_rx.recv().await {
            match tokio::time::timeout(write_timeout, writer.write_all(&bytes)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::debug!(session_id = %session_id, error = %e, "write failed");
                    return;
                }
                Err(_) => {
                    tracing::warn!(session_id = %session_id, "write exceeded its time budget");
                    return;
                }
            }
        }
        let _ = writer.shutdown().await;
    });

    let mut decoder = FrameDecoder::<ClientPacket>::new(ctx.limits.max_frame_bytes);
    let mut throttle = PacketThrottle::new(ctx.limits.max_packets_per_second);
    let mut buf = [0u8; 4096];

    let reason = 'session: loop {
        let read = tokio::select! {
            r = tokio::time::timeout(ctx.limits.idle_timeout, reader.read(&mut buf)) => r,
            _ = &mut writer_handle => break 'session DisconnectReason::ServerClosed,
            _ = shutdown.changed() => break 'session DisconnectReason::Shutdown,
        };
        let n = match read {
            Ok(Ok(0)) => break DisconnectReason::PeerClosed,
            Ok(Ok(n)) => n,
            Ok(Err(e)) => break DisconnectReason::Io(e.to_string()),
            Err(_) => break DisconnectReason::IdleTimeout,
        };
        decoder.extend(&buf[..n]);

        loop {
            match decoder.next_frame() {
                Ok(Some(Frame::Packet(packet))) => {
                    if !throttle.try_consume() {
                        tracing::warn!(session_id = %session_id, opcode = packet.opcode(), "packet rate exceeded, dropping");
                        continue;
                    }
                    let _ = ctx.events.send(NetEvent::Packet { session_id, packet });
                }
                Ok(Some(Frame::Unknown { opcode, discarded })) => {
                    tracing::warn!(session_id = %session_id, opcode, discarded, "unknown opcode, payload discarded");
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(session_id = %session_id, error = %e, "malformed frame, closing session");
                    break 'session DisconnectReason::Protocol(e.to_string());
                }
            }
        }
    };

    tracing::info!(session_id = %session_id, ?reason, "session ended");
    let _ = ctx.events.send(NetEvent::Disconnected { session_id, reason });
    let _ = ctx.unregister.send(session_id);
    writer_handle.abort();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::{AdmissionConfig, ConnectionLimiter};
    use crate::channels::EventRx;
    use crate::codec::Encode;
    use tokio::sync::mpsc;

    struct Harness {
        addr: std::net::SocketAddr,
        events: EventRx,
        register: mpsc::UnboundedReceiver<RegisterSession>,
        _shutdown: watch::Sender<bool>,
    }

    async fn start(limits: SessionLimits) -> Harness {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (register_tx, register) = mpsc::unbounded_channel();
        let (unregister_tx, _unregister_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let ctx = TcpContext {
            events: events_tx,
            register: register_tx,
            unregister: unregister_tx,
            limiter: ConnectionLimiter::new(AdmissionConfig::default()),
            limits,
        };
        tokio::spawn(run_tcp_server(listener, ctx, shutdown_rx));
        Harness {
            addr,
            events,
            register,
            _shutdown: shutdown_tx,
        }
    }

    #[tokio::test]
    async fn server_decodes_packets_and_reports_disconnect() {
        let mut h = start(SessionLimits::default()).await;
        let mut stream = TcpStream::connect(h.addr).await.unwrap();
        assert!(matches!(h.events.recv().await.unwrap(), NetEvent::Connected { .. }));

        stream
            .write_all(&ClientPacket::Identify { account: 77 }.to_bytes())
            .await
            .unwrap();
        match h.events.recv().await.unwrap() {
            NetEvent::Packet { packet, .. } => assert_eq!(packet, ClientPacket::Identify { account: 77 }),
            other => panic!("expected packet, got {other:?}"),
        }

        drop(stream);
        match h.events.recv().await.unwrap() {
            NetEvent::Disconnected { reason, .. } => assert_eq!(reason, DisconnectReason::PeerClosed),
            other => panic!("expected disconnect, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_opcode_keeps_session_open() {
        let mut h = start(SessionLimits::default()).await;
        let mut stream = TcpStream::connect(h.addr).await.unwrap();
        let _ = h.events.recv().await;

        stream.write_all(&[0x77, 0x00, 1, 2]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        stream.write_all(&ClientPacket::Keepalive.to_bytes()).await.unwrap();
        match h.events.recv().await.unwrap() {
            NetEvent::Packet { packet, .. } => assert_eq!(packet, ClientPacket::Keepalive),
            other => panic!("expected keepalive, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_frame_closes_only_that_session() {
        let mut h = start(SessionLimits::default()).await;
        let mut bad = TcpStream::connect(h.addr).await.unwrap();
        let _ = h.events.recv().await;
        let mut good = TcpStream::connect(h.addr).await.unwrap();
        let _ = h.events.recv().await;

        // CHAT with channel 9.
        bad.write_all(&[0x02, 0x00, 0x09, b'x', 0x00]).await.unwrap();
        match h.events.recv().await.unwrap() {
            NetEvent::Disconnected { reason, .. } => assert!(matches!(reason, DisconnectReason::Protocol(_))),
            other => panic!("expected disconnect, got {other:?}"),
        }

        good.write_all(&ClientPacket::Keepalive.to_bytes()).await.unwrap();
        assert!(matches!(h.events.recv().await.unwrap(), NetEvent::Packet { .. }));
    }

    #[tokio::test]
    async fn idle_session_times_out() {
        let mut h = start(SessionLimits {
            idle_timeout: Duration::from_millis(100),
            ..Default::default()
        })
        .await;
        let _stream = TcpStream::connect(h.addr).await.unwrap();
        let _ = h.events.recv().await;
        match h.events.recv().await.unwrap() {
            NetEvent::Disconnected { reason, .. } => assert_eq!(reason, DisconnectReason::IdleTimeout),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn writes_reach_the_client() {
        let mut h = start(SessionLimits::default()).await;
        let mut stream = TcpStream::connect(h.addr).await.unwrap();
        let reg = h.register.recv().await.unwrap();
        reg.write_tx.send(vec![0x04, 0x00]).unwrap();

        let mut buf = [0u8; 2];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0x04, 0x00]);
    }
}
