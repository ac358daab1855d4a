//! Achievement/statistics hook. Only official servers report anything.

pub trait StatsSink: Send + Sync {
    fn agency_created(&self, agency: u64, founder: u64);
    fn quest_completed(&self, agency: u64, quest: u32);
    fn vessel_launched(&self, agency: u64, vessel: u64);
}

/// Records stat events as structured log lines.
#[derive(Debug, Default)]
pub struct TracingStats;

impl StatsSink for TracingStats {
    fn agency_created(&self, agency: u64, founder: u64) {
        tracing::info!(target: "stats", agency, founder, "agency created");
    }

    fn quest_completed(&self, agency: u64, quest: u32) {
        tracing::info!(target: "stats", agency, quest, "quest completed");
    }

    fn vessel_launched(&self, agency: u64, vessel: u64) {
        tracing::info!(target: "stats", agency, vessel, "vessel launched");
    }
}

#[derive(Debug, Default)]
pub struct NoStats;

impl StatsSink for NoStats {
    fn agency_created(&self, _: u64, _: u64) {}
    fn quest_completed(&self, _: u64, _: u32) {}
    fn vessel_launched(&self, _: u64, _: u64) {}
}

pub fn sink_for(official_server: bool) -> Box<dyn StatsSink> {
    if official_server {
        Box::new(TracingStats)
    } else {
        Box::new(NoStats)
    }
}
