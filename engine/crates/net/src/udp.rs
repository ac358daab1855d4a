use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::watch;

use crate::channels::{UdpInbound, UdpTx};
use crate::codec::{CodecError, Decode, Encode};
use crate::datagram::{ClientDatagram, ServerDatagram};

/// Receives datagrams until shutdown and forwards the decodable ones.
/// Bad datagrams are dropped; one sender cannot disturb the others.
pub async fn run_udp_server(socket: Arc<UdpSocket>, tx: UdpTx, mut shutdown: watch::Receiver<bool>) {
    if let Ok(addr) = socket.local_addr() {
        tracing::info!(%addr, "UDP streaming server listening");
    }
    let mut buf = vec![0u8; 2048];
    loop {
        let (n, from) = tokio::select! {
            r = socket.recv_from(&mut buf) => match r {
                Ok(pair) => pair,
                Err(e) => {
                    // ICMP port-unreachable from a departed client surfaces here.
                    tracing::debug!(error = %e, "udp receive failed");
                    continue;
                }
            },
            _ = shutdown.changed() => {
                tracing::info!("UDP streaming server: shutdown signal received");
                return;
            }
        };
        match ClientDatagram::decode_prefix(&buf[..n]) {
            Ok((datagram, _)) => {
                if tx.send(UdpInbound { from, datagram }).is_err() {
                    return;
                }
            }
            Err(CodecError::UnknownOpcode(op)) => {
                tracing::debug!(%from, opcode = op, "unknown udp opcode, discarded");
            }
            Err(e) => {
                tracing::debug!(%from, error = %e, "malformed datagram dropped");
            }
        }
    }
}

/// Best-effort send; failures are logged and otherwise ignored.
pub async fn send_datagram(socket: &UdpSocket, datagram: &ServerDatagram, to: SocketAddr) -> bool {
    match socket.send_to(&datagram.to_bytes(), to).await {
        Ok(_) => true,
        Err(e) => {
            tracing::debug!(%to, error = %e, "udp send failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn forwards_decoded_datagrams_and_drops_garbage() {
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let addr = socket.local_addr().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(run_udp_server(socket.clone(), tx, shutdown_rx));

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(&[0x55, 1, 2], addr).await.unwrap();
        client.send_to(&[0x00, 1], addr).await.unwrap();
        let latency = ClientDatagram::Latency {
            account: 3,
            client_time: 99,
        };
        client.send_to(&latency.to_bytes(), addr).await.unwrap();

        let got = rx.recv().await.unwrap();
        assert_eq!(got.datagram, latency);
        assert_eq!(got.from, client.local_addr().unwrap());
    }

    #[tokio::test]
    async fn send_datagram_reaches_peer() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let d = ServerDatagram::ObjectDestroyed { object: 12 };
        assert!(send_datagram(&server, &d, client.local_addr().unwrap()).await);
        let mut buf = [0u8; 64];
        let (n, _) = client.recv_from(&mut buf).await.unwrap();
        assert_eq!(ServerDatagram::decode_prefix(&buf[..n]).unwrap().0, d);
    }
}
