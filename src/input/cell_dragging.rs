// Cell dragging interaction
//
// A dragged cell is pulled toward a world-space target by one extra force per
// step. Selection (picking a cell under the cursor) happens outside the core;
// this module only tracks which index is held and produces the force input.

use glam::Vec3;

/// One directional pull applied to a single cell for the next step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragInput {
    /// Index of the pulled cell; out-of-range indices are ignored
    pub cell_index: usize,
    /// World-space point the cell is pulled toward
    pub target: Vec3,
    /// Force per unit of distance to the target
    pub strength: f32,
}

impl DragInput {
    /// Force on `cell_index` at `position`, or zero for every other cell.
    #[inline]
    pub fn force_on(&self, index: usize, position: Vec3) -> Vec3 {
        if index != self.cell_index {
            return Vec3::ZERO;
        }
        let force = (self.target - position) * self.strength;
        if force.is_finite() {
            force
        } else {
            Vec3::ZERO
        }
    }
}

/// Drag state held by an input layer between frames
pub struct CellDragger {
    dragged_cell: Option<usize>,
    target: Vec3,
    strength: f32,
}

impl CellDragger {
    pub fn new(strength: f32) -> Self {
        Self {
            dragged_cell: None,
            target: Vec3::ZERO,
            strength,
        }
    }

    /// Start dragging `cell_index` toward `target`
    pub fn start_drag(&mut self, cell_index: usize, target: Vec3) {
        self.dragged_cell = Some(cell_index);
        self.target = target;
    }

    /// Move the drag target. No effect when nothing is held.
    pub fn update_target(&mut self, target: Vec3) {
        if self.dragged_cell.is_some() {
            self.target = target;
        }
    }

    pub fn stop_drag(&mut self) {
        self.dragged_cell = None;
    }

    pub fn is_dragging(&self) -> bool {
        self.dragged_cell.is_some()
    }

    pub fn dragged_cell(&self) -> Option<usize> {
        self.dragged_cell
    }

    pub fn strength(&self) -> f32 {
        self.strength
    }

    pub fn set_strength(&mut self, strength: f32) {
        self.strength = strength;
    }

    /// The force input for the next step, if a cell is held.
    pub fn input(&self) -> Option<DragInput> {
        self.dragged_cell.map(|cell_index| DragInput {
            cell_index,
            target: self.target,
            strength: self.strength,
        })
    }
}

impl Default for CellDragger {
    fn default() -> Self {
        Self::new(50.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dragger_lifecycle() {
        let mut dragger = CellDragger::new(10.0);
        assert!(!dragger.is_dragging());
        assert!(dragger.input().is_none());

        dragger.update_target(Vec3::X);
        dragger.start_drag(3, Vec3::Y);
        assert_eq!(dragger.dragged_cell(), Some(3));

        dragger.update_target(Vec3::Z);
        let input = dragger.input().unwrap();
        assert_eq!(input.cell_index, 3);
        assert_eq!(input.target, Vec3::Z);
        assert_eq!(input.strength, 10.0);

        dragger.stop_drag();
        assert!(dragger.input().is_none());
    }

    #[test]
    fn test_force_only_on_selected_cell() {
        let input = DragInput {
            cell_index: 1,
            target: Vec3::new(2.0, 0.0, 0.0),
            strength: 3.0,
        };
        assert_eq!(input.force_on(0, Vec3::ZERO), Vec3::ZERO);
        assert_eq!(input.force_on(1, Vec3::ZERO), Vec3::new(6.0, 0.0, 0.0));
    }
}
