use tracing_subscriber::{fmt, EnvFilter};

pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Per-tick simulation metrics emitted by the chunk tick loop.
#[derive(Debug, Clone, Default)]
pub struct TickMetrics {
    pub tick_number: u64,
    pub duration_us: u128,
    /// Wall-clock budget for one tick at the configured rate.
    pub budget_us: u128,
    pub live_chunks: usize,
    pub extrapolated_chunks: usize,
    pub object_count: usize,
    /// Chunk boundary transitions resolved during this tick.
    pub transitions: usize,
}

impl TickMetrics {
    pub fn over_budget(&self) -> bool {
        self.budget_us > 0 && self.duration_us > self.budget_us
    }

    pub fn log(&self) {
        if self.over_budget() {
            tracing::warn!(
                tick = self.tick_number,
                duration_us = self.duration_us,
                live = self.live_chunks,
                extrapolated = self.extrapolated_chunks,
                objects = self.object_count,
                transitions = self.transitions,
                "tick exceeded budget ({}us > {}us)",
                self.duration_us,
                self.budget_us
            );
        } else {
            tracing::trace!(
                tick = self.tick_number,
                duration_us = self.duration_us,
                live = self.live_chunks,
                extrapolated = self.extrapolated_chunks,
                objects = self.object_count,
                transitions = self.transitions,
                "tick completed"
            );
        }
    }
}
