pub mod chunk_manager;
pub mod events;
pub mod tick;
pub mod transition;

pub use chunk_manager::{unix_millis, ChunkManager, ManagerConfig, ManagerError, Occupant};
pub use events::{EventBus, EventKind, SimEvent};
pub use tick::{Simulation, SimulationReport, TickConfig, TickLoop};
pub use transition::{TransitionError, TransitionPlan};
