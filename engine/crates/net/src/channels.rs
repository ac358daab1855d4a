use std::net::SocketAddr;

use session::{SessionId, SessionOutput};
use tokio::sync::mpsc;

use crate::datagram::ClientDatagram;
use crate::protocol::ClientPacket;

/// Why a TCP session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Peer closed the connection.
    PeerClosed,
    /// The server dropped the session's writer.
    ServerClosed,
    IdleTimeout,
    /// Malformed frame; the message is the decode error.
    Protocol(String),
    Io(String),
    Shutdown,
}

/// Messages from the TCP layer to the game dispatcher.
#[derive(Debug)]
pub enum NetEvent {
    Connected {
        session_id: SessionId,
        peer: SocketAddr,
    },
    Packet {
        session_id: SessionId,
        packet: ClientPacket,
    },
    Disconnected {
        session_id: SessionId,
        reason: DisconnectReason,
    },
}

/// A decoded datagram and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct UdpInbound {
    pub from: SocketAddr,
    pub datagram: ClientDatagram,
}

/// Sender from network tasks to the dispatcher.
pub type EventTx = mpsc::UnboundedSender<NetEvent>;
/// Receiver in the dispatcher for network events.
pub type EventRx = mpsc::UnboundedReceiver<NetEvent>;

pub type UdpTx = mpsc::UnboundedSender<UdpInbound>;
pub type UdpRx = mpsc::UnboundedReceiver<UdpInbound>;

/// Sender from game code to the output router.
pub type OutputTx = mpsc::UnboundedSender<SessionOutput>;
/// Receiver in the output router for session outputs.
pub type OutputRx = mpsc::UnboundedReceiver<SessionOutput>;

/// Per-session write channel (output router -> session writer task).
pub type SessionWriteTx = mpsc::UnboundedSender<Vec<u8>>;
pub type SessionWriteRx = mpsc::UnboundedReceiver<Vec<u8>>;

/// Registration message for the output router.
#[derive(Debug)]
pub struct RegisterSession {
    pub session_id: SessionId,
    pub write_tx: SessionWriteTx,
}

pub type RegisterTx = mpsc::UnboundedSender<RegisterSession>;
pub type RegisterRx = mpsc::UnboundedReceiver<RegisterSession>;

pub type UnregisterTx = mpsc::UnboundedSender<SessionId>;
pub type UnregisterRx = mpsc::UnboundedReceiver<SessionId>;
