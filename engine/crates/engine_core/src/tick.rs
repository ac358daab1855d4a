use std::time::{Duration, Instant};

use observability::TickMetrics;

/// Tick loop configuration.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Ticks per second.
    pub tps: u32,
    /// Maximum ticks to run (0 = unlimited).
    pub max_ticks: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tps: 60,
            max_ticks: 0,
        }
    }
}

impl TickConfig {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tps.max(1) as f64)
    }
}

/// Work done per tick by whatever the loop drives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulationReport {
    pub live_chunks: usize,
    pub extrapolated_chunks: usize,
    pub object_count: usize,
    pub transitions: usize,
}

pub trait Simulation {
    fn advance(&mut self, tick: u64) -> SimulationReport;
}

/// Fixed-rate scheduler: one `advance` per tick, sleeping off the remainder.
pub struct TickLoop<S: Simulation> {
    pub sim: S,
    pub config: TickConfig,
    pub current_tick: u64,
}

impl<S: Simulation> TickLoop<S> {
    pub fn new(config: TickConfig, sim: S) -> Self {
        Self {
            sim,
            config,
            current_tick: 0,
        }
    }

    pub fn step(&mut self) -> TickMetrics {
        let start = Instant::now();
        let report = self.sim.advance(self.current_tick);
        self.current_tick += 1;
        let duration = start.elapsed();

        TickMetrics {
            tick_number: self.current_tick,
            duration_us: duration.as_micros(),
            budget_us: self.config.tick_duration().as_micros(),
            live_chunks: report.live_chunks,
            extrapolated_chunks: report.extrapolated_chunks,
            object_count: report.object_count,
            transitions: report.transitions,
        }
    }

    /// Run for the configured number of ticks (forever when `max_ticks` is 0).
    pub fn run(&mut self) -> Vec<TickMetrics> {
        let mut all_metrics = Vec::new();
        self.run_until(|| false, |m| all_metrics.push(m));
        all_metrics
    }

    /// Run until `stop` returns true or `max_ticks` is reached, handing each
    /// tick's metrics to `observe`.
    pub fn run_until(&mut self, stop: impl Fn() -> bool, mut observe: impl FnMut(TickMetrics)) {
        let tick_duration = self.config.tick_duration();

        loop {
            if self.config.max_ticks > 0 && self.current_tick >= self.config.max_ticks {
                break;
            }
            if stop() {
                tracing::info!(tick = self.current_tick, "tick loop stopping");
                break;
            }

            let tick_start = Instant::now();
            let metrics = self.step();
            metrics.log();
            observe(metrics);

            let elapsed = tick_start.elapsed();
            if elapsed < tick_duration {
                std::thread::sleep(tick_duration - elapsed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    use super::*;

    #[derive(Default)]
    struct Counter {
        calls: u64,
    }

    impl Simulation for Counter {
        fn advance(&mut self, tick: u64) -> SimulationReport {
            assert_eq!(tick, self.calls);
            self.calls += 1;
            SimulationReport {
                live_chunks: 1,
                object_count: 12,
                ..Default::default()
            }
        }
    }

    #[test]
    fn tick_config_defaults() {
        let config = TickConfig::default();
        assert_eq!(config.tps, 60);
        let dur = config.tick_duration();
        assert!(dur.as_millis() >= 16 && dur.as_millis() <= 17);
    }

    #[test]
    fn single_step() {
        let mut tick_loop = TickLoop::new(TickConfig { tps: 60, max_ticks: 1 }, Counter::default());
        let metrics = tick_loop.step();
        assert_eq!(metrics.tick_number, 1);
        assert_eq!(metrics.live_chunks, 1);
        assert_eq!(metrics.object_count, 12);
        assert!(metrics.budget_us > 16_000);
    }

    #[test]
    fn run_respects_max_ticks() {
        let mut tick_loop = TickLoop::new(TickConfig { tps: 1000, max_ticks: 10 }, Counter::default());
        let metrics = tick_loop.run();
        assert_eq!(metrics.len(), 10);
        assert_eq!(tick_loop.sim.calls, 10);
    }

    #[test]
    fn run_until_stops_on_signal() {
        let seen = Arc::new(AtomicU64::new(0));
        let seen_stop = seen.clone();
        let mut tick_loop = TickLoop::new(TickConfig { tps: 1000, max_ticks: 0 }, Counter::default());
        tick_loop.run_until(
            move || seen_stop.load(Ordering::SeqCst) >= 3,
            |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            },
        );
        assert_eq!(tick_loop.current_tick, 3);
    }
}
