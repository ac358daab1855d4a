use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Sender side, held by main; triggers shutdown.
#[derive(Clone)]
pub struct ShutdownTx(watch::Sender<bool>);

/// Receiver side, cloned to each subsystem.
#[derive(Clone)]
pub struct ShutdownRx(watch::Receiver<bool>);

pub fn shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx(tx), ShutdownRx(rx))
}

impl ShutdownTx {
    pub fn trigger(&self) {
        let _ = self.0.send(true);
    }
}

impl ShutdownRx {
    /// Async wait until shutdown is signaled (or the sender is gone).
    pub async fn wait(&mut self) {
        while !*self.0.borrow() {
            if self.0.changed().await.is_err() {
                return;
            }
        }
    }

    /// Non-blocking check for the tick thread.
    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    /// The raw receiver, for the net crate's accept/receive loops.
    pub fn into_inner(self) -> watch::Receiver<bool> {
        self.0
    }
}

/// Wait for SIGINT or SIGTERM (Unix) or Ctrl+C (all platforms).
pub async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => tracing::info!("Received SIGINT"),
                    _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
                }
                return;
            }
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!(error = %e, "signal registration failed, falling back to ctrl-c");
            }
        }
    }
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        return;
    }
    tracing::info!("Received Ctrl+C");
}

/// Runs `job` every `period` until shutdown. Late ticks are delayed rather
/// than bunched up.
pub fn spawn_periodic<F>(
    name: &'static str,
    period: Duration,
    mut shutdown: ShutdownRx,
    mut job: F,
) -> tokio::task::JoinHandle<()>
where
    F: FnMut() + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => job(),
                _ = shutdown.wait() => {
                    tracing::debug!(task = name, "periodic task stopping");
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn shutdown_channel_default_not_shutdown() {
        let (_tx, rx) = shutdown_channel();
        assert!(!rx.is_shutdown());
    }

    #[test]
    fn shutdown_channel_trigger_reaches_clones() {
        let (tx, rx) = shutdown_channel();
        let rx2 = rx.clone();
        tx.trigger();
        assert!(rx.is_shutdown());
        assert!(rx2.is_shutdown());
    }

    #[tokio::test]
    async fn wait_returns_when_sender_dropped() {
        let (tx, mut rx) = shutdown_channel();
        drop(tx);
        rx.wait().await;
    }

    #[tokio::test]
    async fn periodic_task_runs_then_stops_on_shutdown() {
        let (tx, rx) = shutdown_channel();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let handle = spawn_periodic("test", Duration::from_millis(10), rx, move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_millis(80)).await;
        tx.trigger();
        handle.await.unwrap();
        let seen = count.load(Ordering::SeqCst);
        assert!(seen >= 2, "ran {seen} times");
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), seen);
    }
}
