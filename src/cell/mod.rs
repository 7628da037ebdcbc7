pub mod adhesion;
pub mod adhesion_forces;
pub mod adhesion_manager;
pub mod adhesion_zones;
pub mod division;

// Re-export adhesion types
pub use adhesion::{
    AdhesionConnection,
    AdhesionIndices,
    MAX_ADHESIONS_PER_CELL,
    init_adhesion_indices,
};
pub use adhesion_forces::{
    accumulate_adhesion_deltas,
    apply_adhesion_deltas,
    solve_adhesion,
};
pub use adhesion_manager::{AdhesionConnectionManager, BondManager, connection_between};
pub use adhesion_zones::{
    AdhesionZone,
    classify_bond_direction,
    EQUATORIAL_THRESHOLD_DEGREES,
};

// Re-export division types
pub use division::{DivisionScheduler, PendingSplit, SplitEvent};
