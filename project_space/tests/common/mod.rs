#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use net::{ClientDatagram, ClientPacket, Decode, Encode, Frame, FrameDecoder, ServerDatagram, ServerPacket};
use project_space::lifecycle::{shutdown_channel, ShutdownTx};
use project_space::{ServerConfig, ServerHandle};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};

pub const WAIT: Duration = Duration::from_secs(5);

pub struct TestServer {
    pub handle: ServerHandle,
    pub shutdown: ShutdownTx,
    pub dir: TempDir,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_in(TempDir::new().unwrap()).await
    }

    /// Starts on an existing world directory, as after a restart.
    pub async fn start_in(dir: TempDir) -> Self {
        let mut config = ServerConfig::default();
        config.net.tcp_addr = "127.0.0.1:0".into();
        config.net.udp_addr = "127.0.0.1:0".into();
        config.world.root = dir.path().to_string_lossy().into_owned();
        config.world.catalog_path = concat!(env!("CARGO_MANIFEST_DIR"), "/content/game_desc.json").into();

        let (shutdown, rx) = shutdown_channel();
        let handle = project_space::start(config, rx).await.unwrap();
        Self { handle, shutdown, dir }
    }

    pub async fn connect(&self) -> Client {
        Client::connect(self.handle.tcp_addr, self.handle.udp_addr).await
    }

    /// Shuts down, waits for the final save and hands back the directory.
    pub async fn stop(self) -> TempDir {
        self.shutdown.trigger();
        tokio::time::timeout(WAIT, self.handle.finish()).await.unwrap();
        self.dir
    }
}

pub struct Client {
    stream: TcpStream,
    decoder: FrameDecoder<ServerPacket>,
    udp: UdpSocket,
    server_udp: SocketAddr,
}

impl Client {
    pub async fn connect(tcp: SocketAddr, udp: SocketAddr) -> Self {
        Self {
            stream: TcpStream::connect(tcp).await.unwrap(),
            decoder: FrameDecoder::new(1 << 20),
            udp: UdpSocket::bind("127.0.0.1:0").await.unwrap(),
            server_udp: udp,
        }
    }

    pub async fn send(&mut self, packet: &ClientPacket) {
        self.send_raw(&packet.to_bytes()).await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    /// Next packet, or `None` once the server has closed the stream.
    pub async fn recv(&mut self) -> Option<ServerPacket> {
        let mut buf = [0u8; 4096];
        loop {
            if let Some(frame) = self.decoder.next_frame().unwrap() {
                match frame {
                    Frame::Packet(p) => return Some(p),
                    Frame::Unknown { opcode, .. } => panic!("server sent unknown opcode {opcode:#x}"),
                }
            }
            let n = tokio::time::timeout(WAIT, self.stream.read(&mut buf))
                .await
                .expect("timed out waiting for the server")
                .unwrap_or(0);
            if n == 0 {
                return None;
            }
            self.decoder.extend(&buf[..n]);
        }
    }

    /// Skips packets until one matches.
    pub async fn recv_until(&mut self, pred: impl Fn(&ServerPacket) -> bool) -> ServerPacket {
        loop {
            let packet = self.recv().await.expect("connection closed");
            if pred(&packet) {
                return packet;
            }
        }
    }

    /// Reads until the server closes the stream.
    pub async fn expect_closed(&mut self) {
        while self.recv().await.is_some() {}
    }

    pub async fn identify(&mut self, account: u64) {
        self.send(&ClientPacket::Identify { account }).await;
        self.recv_until(|p| matches!(p, ServerPacket::GameJson { .. })).await;
    }

    pub async fn send_datagram(&self, datagram: &ClientDatagram) {
        self.udp.send_to(&datagram.to_bytes(), self.server_udp).await.unwrap();
    }

    pub async fn recv_datagram(&self) -> ServerDatagram {
        let mut buf = [0u8; 2048];
        let (n, _) = tokio::time::timeout(WAIT, self.udp.recv_from(&mut buf))
            .await
            .expect("timed out waiting for a datagram")
            .unwrap();
        ServerDatagram::decode_prefix(&buf[..n]).unwrap().0
    }

    pub async fn recv_datagram_until(&self, pred: impl Fn(&ServerDatagram) -> bool) -> ServerDatagram {
        loop {
            let d = self.recv_datagram().await;
            if pred(&d) {
                return d;
            }
        }
    }

    /// Binds this client's UDP socket to its session.
    pub async fn bind_udp(&self, account: u64) {
        self.send_datagram(&ClientDatagram::Latency {
            account,
            client_time: 7,
        })
        .await;
        self.recv_datagram_until(|d| matches!(d, ServerDatagram::Latency { client_time: 7, .. }))
            .await;
    }
}
