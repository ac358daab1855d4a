use std::collections::HashMap;

use session::{SessionId, SessionOutput};

use crate::channels::{OutputRx, RegisterRx, SessionWriteTx, UnregisterRx};

#[derive(Debug, Default)]
struct RouterTally {
    delivered: u64,
    orphaned: u64,
}

/// Hands one output to its writer. Returns false when the writer must be
/// forgotten, either because the connection task is gone or a close was asked.
fn deliver(tx: &SessionWriteTx, output: SessionOutput) -> bool {
    if !output.bytes.is_empty() && tx.send(output.bytes).is_err() {
        tracing::debug!(session_id = %output.session_id, "output router: write channel closed");
        return false;
    }
    if output.disconnect {
        tracing::debug!(session_id = %output.session_id, "output router: close requested");
        return false;
    }
    true
}

/// Routes encoded frames to the correct per-session write channel.
pub async fn run_output_router(mut output_rx: OutputRx, mut register_rx: RegisterRx, mut unregister_rx: UnregisterRx) {
    let mut writers: HashMap<SessionId, SessionWriteTx> = HashMap::new();
    let mut tally = RouterTally::default();

    loop {
        tokio::select! {
            Some(reg) = register_rx.recv() => {
                tracing::debug!(session_id = %reg.session_id, "output router: session registered");
                writers.insert(reg.session_id, reg.write_tx);
            }
            Some(session_id) = unregister_rx.recv() => {
                writers.remove(&session_id);
            }
            Some(output) = output_rx.recv() => {
                let session_id = output.session_id;
                match writers.get(&session_id) {
                    Some(tx) => {
                        tally.delivered += 1;
                        if !deliver(tx, output) {
                            writers.remove(&session_id);
                        }
                    }
                    // Frames for sessions that already left are expected during teardown.
                    None => tally.orphaned += 1,
                }
            }
            else => break,
        }
    }

    tracing::info!(
        delivered = tally.delivered,
        orphaned = tally.orphaned,
        "output router shutting down"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::RegisterSession;
    use session::SessionOutput;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn router_delivers_then_drops_on_disconnect() {
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (register_tx, register_rx) = mpsc::unbounded_channel();
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();

        let router = tokio::spawn(run_output_router(output_rx, register_rx, unregister_rx));

        let (write_tx, mut write_rx) = mpsc::unbounded_channel();
        let sid = SessionId(1);
        register_tx.send(RegisterSession { session_id: sid, write_tx }).unwrap();
        tokio::task::yield_now().await;

        output_tx.send(SessionOutput::new(sid, vec![1, 2, 3])).unwrap();
        assert_eq!(write_rx.recv().await.unwrap(), vec![1, 2, 3]);

        output_tx.send(SessionOutput::with_disconnect(sid, vec![9])).unwrap();
        assert_eq!(write_rx.recv().await.unwrap(), vec![9]);
        // Writer dropped by the router, so the channel ends.
        assert!(write_rx.recv().await.is_none());

        drop(output_tx);
        drop(register_tx);
        drop(unregister_tx);
        let _ = router.await;
    }

    #[tokio::test]
    async fn close_without_payload_ends_channel() {
        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (register_tx, register_rx) = mpsc::unbounded_channel();
        let (_unregister_tx, unregister_rx) = mpsc::unbounded_channel::<SessionId>();
        tokio::spawn(run_output_router(output_rx, register_rx, unregister_rx));

        let (write_tx, mut write_rx) = mpsc::unbounded_channel();
        register_tx
            .send(RegisterSession {
                session_id: SessionId(2),
                write_tx,
            })
            .unwrap();
        tokio::task::yield_now().await;
        output_tx.send(SessionOutput::close(SessionId(2))).unwrap();
        assert!(write_rx.recv().await.is_none());
    }
}
