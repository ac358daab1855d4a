use std::collections::BTreeMap;

use space::{ChunkKey, ObjectId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    Transfer,
    Destruction,
    Region,
    Landing,
    Residency,
}

/// Simulation outcomes the network layer turns into packets.
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    PlayerTransferred {
        account: u64,
        vessel: ObjectId,
        from: ChunkKey,
        to: ChunkKey,
    },
    ObjectDestroyed {
        object: ObjectId,
        chunk: ChunkKey,
        agency: u64,
        controller: Option<u64>,
    },
    RegionEntered {
        vessel: ObjectId,
        region: u32,
        controller: Option<u64>,
    },
    VesselLanded {
        vessel: ObjectId,
        body: ObjectId,
        chunk: ChunkKey,
    },
    ChunkLoaded {
        key: ChunkKey,
    },
    ChunkEvicted {
        key: ChunkKey,
    },
}

impl SimEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SimEvent::PlayerTransferred { .. } => EventKind::Transfer,
            SimEvent::ObjectDestroyed { .. } => EventKind::Destruction,
            SimEvent::RegionEntered { .. } => EventKind::Region,
            SimEvent::VesselLanded { .. } => EventKind::Landing,
            SimEvent::ChunkLoaded { .. } | SimEvent::ChunkEvicted { .. } => EventKind::Residency,
        }
    }
}

/// Event queues, one per kind, drained by consumers between ticks.
#[derive(Debug, Default)]
pub struct EventBus {
    queues: BTreeMap<EventKind, Vec<SimEvent>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, event: SimEvent) {
        self.queues.entry(event.kind()).or_default().push(event);
    }

    /// Drain all events of one kind, in emission order.
    pub fn drain(&mut self, kind: EventKind) -> Vec<SimEvent> {
        self.queues.remove(&kind).unwrap_or_default()
    }

    /// Drain everything, grouped by kind in kind order.
    pub fn drain_all(&mut self) -> Vec<SimEvent> {
        std::mem::take(&mut self.queues)
            .into_values()
            .flatten()
            .collect()
    }

    pub fn clear(&mut self) {
        self.queues.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.queues.values().all(|q| q.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn destroyed(id: u64) -> SimEvent {
        SimEvent::ObjectDestroyed {
            object: ObjectId(id),
            chunk: ChunkKey::HOME,
            agency: 0,
            controller: None,
        }
    }

    #[test]
    fn emit_and_drain() {
        let mut bus = EventBus::new();
        bus.emit(destroyed(1));
        bus.emit(destroyed(2));

        let events = bus.drain(EventKind::Destruction);
        assert_eq!(events, vec![destroyed(1), destroyed(2)]);
        assert!(bus.drain(EventKind::Destruction).is_empty());
    }

    #[test]
    fn independent_queues() {
        let mut bus = EventBus::new();
        bus.emit(destroyed(1));
        bus.emit(SimEvent::ChunkLoaded { key: ChunkKey::Universe });

        assert_eq!(bus.drain(EventKind::Residency).len(), 1);
        assert!(!bus.is_empty());
        assert_eq!(bus.drain(EventKind::Destruction).len(), 1);
        assert!(bus.is_empty());
    }

    #[test]
    fn drain_all_grouped_by_kind() {
        let mut bus = EventBus::new();
        bus.emit(SimEvent::ChunkEvicted { key: ChunkKey::Universe });
        bus.emit(destroyed(9));
        bus.emit(SimEvent::PlayerTransferred {
            account: 1,
            vessel: ObjectId(2),
            from: ChunkKey::HOME,
            to: ChunkKey::Starmap { galaxy: 1 },
        });

        let all = bus.drain_all();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].kind(), EventKind::Transfer);
        assert_eq!(all[1].kind(), EventKind::Destruction);
        assert_eq!(all[2].kind(), EventKind::Residency);
        assert!(bus.is_empty());
    }
}
