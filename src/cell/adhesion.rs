use glam::{Quat, Vec3};
use crate::genome::AdhesionSettings;

/// Maximum adhesions per cell
pub const MAX_ADHESIONS_PER_CELL: usize = 20;

/// Spring and orientation bond between two cells.
///
/// Anchor directions are unit vectors in each cell's local frame, pointing
/// from the cell's center toward its partner at the moment the bond was made.
/// `initial_relative_orientation` is `conjugate(rotation_a) * rotation_b`
/// recorded at creation; the orientation constraint restores it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdhesionConnection {
    pub cell_a: usize,
    pub cell_b: usize,
    /// Mode whose adhesion settings created this bond
    pub mode_index: i32,
    pub is_active: bool,
    pub rest_length: f32,
    pub stiffness: f32,
    pub damping: f32,
    pub anchor_a: Vec3,
    pub anchor_b: Vec3,
    pub anchor_stiffness: f32,
    pub anchor_enabled: bool,
    pub orientation_stiffness: f32,
    pub initial_relative_orientation: Quat,
}

impl AdhesionConnection {
    /// Bond with the spring parameters of a mode's adhesion settings.
    pub fn from_settings(
        cell_a: usize,
        cell_b: usize,
        mode_index: i32,
        settings: &AdhesionSettings,
        anchor_a: Vec3,
        anchor_b: Vec3,
        initial_relative_orientation: Quat,
    ) -> Self {
        Self {
            cell_a,
            cell_b,
            mode_index,
            is_active: true,
            rest_length: settings.rest_length,
            stiffness: settings.linear_spring_stiffness,
            damping: settings.linear_spring_damping,
            anchor_a: anchor_a.normalize_or_zero(),
            anchor_b: anchor_b.normalize_or_zero(),
            anchor_stiffness: settings.anchor_stiffness,
            anchor_enabled: settings.enable_anchor_constraint,
            orientation_stiffness: settings.orientation_spring_stiffness,
            initial_relative_orientation: initial_relative_orientation.normalize(),
        }
    }

    pub fn involves(&self, cell: usize) -> bool {
        self.cell_a == cell || self.cell_b == cell
    }

    /// The other endpoint, if `cell` is one of them.
    pub fn partner_of(&self, cell: usize) -> Option<usize> {
        if self.cell_a == cell {
            Some(self.cell_b)
        } else if self.cell_b == cell {
            Some(self.cell_a)
        } else {
            None
        }
    }
}

/// Adhesion indices for each cell (20 slots, -1 for empty)
pub type AdhesionIndices = [i32; MAX_ADHESIONS_PER_CELL];

/// Initialize adhesion indices for a cell (all slots to -1)
pub fn init_adhesion_indices() -> AdhesionIndices {
    [-1; MAX_ADHESIONS_PER_CELL]
}
