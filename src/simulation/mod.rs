pub mod canonical_state;
pub mod cpu_physics;
pub mod engine;
pub mod physics_config;
pub mod scaled_atomic;
pub mod snapshot;
pub mod spatial_grid;

pub use canonical_state::{CanonicalState, NewCell};
pub use cpu_physics::StepContext;
pub use engine::{CellSimulation, SimulationError};
pub use physics_config::{ConfigError, PhysicsConfig};
pub use scaled_atomic::ScaledAtomicAccumulator;
pub use snapshot::{CellInstance, SnapshotReader, StateSnapshot};
pub use spatial_grid::SpatialHashGrid;
