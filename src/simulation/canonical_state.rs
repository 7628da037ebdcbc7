//! # Canonical Simulation State - Structure-of-Arrays Layout
//!
//! [`CanonicalState`] holds every body in the simulation as parallel arrays, one
//! array per property. All arrays are allocated to `capacity` once; only the
//! first `cell_count` entries are active. Slots at or above `cell_count` are
//! inert and get overwritten when a cell is spawned or a division appends a
//! daughter.
//!
//! ## Data Organization
//!
//! ### Position and Motion
//! - `positions`, `velocities`
//!
//! ### Physical Properties
//! - `radii`, `masses`, `moments_of_inertia` (mass and inertia are derived from
//!   radius and density when a cell is written and never change afterwards)
//! - `drag_coefficients`, `repulsion_strengths`
//!
//! ### Orientation
//! - `rotations` (unit quaternions, renormalized after every update)
//! - `angular_velocities`
//!
//! ### Behavior
//! - `mode_indices` (-1 for "no mode")
//! - `split_timers`, `split_counts`
//!
//! ### Per-step Scratch
//! - `forces`, `torques` - contact results for the current step
//! - `torque_accumulator` - rolling-friction torque scattered onto neighbors
//! - `velocity_deltas`, `rotation_deltas` - adhesion phase 1 output
//!
//! The accumulators are the only fields written concurrently by more than one
//! task within a pass; everything else is owned by the task processing that
//! index.

use glam::{Quat, Vec3};
use crate::simulation::physics_config::PhysicsConfig;
use crate::simulation::scaled_atomic::ScaledAtomicAccumulator;

/// Initial values for one body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewCell {
    pub position: Vec3,
    pub velocity: Vec3,
    pub rotation: Quat,
    pub angular_velocity: Vec3,
    pub radius: f32,
    pub drag_coefficient: f32,
    pub repulsion_strength: f32,
    pub mode_index: i32,
    pub split_count: i32,
}

impl NewCell {
    /// A resting cell at `position` with the config's default properties.
    pub fn from_config(config: &PhysicsConfig, position: Vec3, mode_index: i32) -> Self {
        Self {
            position,
            velocity: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            angular_velocity: Vec3::ZERO,
            radius: config.default_radius,
            drag_coefficient: config.default_drag,
            repulsion_strength: config.repulsion_strength,
            mode_index,
            split_count: 0,
        }
    }
}

/// Mass of a uniform sphere.
pub fn sphere_mass(radius: f32, density: f32) -> f32 {
    density * (4.0 / 3.0) * std::f32::consts::PI * radius * radius * radius
}

/// Moment of inertia for a solid sphere: I = (2/5) * m * r²
pub fn sphere_inertia(mass: f32, radius: f32) -> f32 {
    0.4 * mass * radius * radius
}

/// Central simulation state using Structure-of-Arrays layout.
///
/// Not `Clone`: the accumulators are atomics shared by reference across
/// worker tasks.
#[derive(Debug)]
pub struct CanonicalState {
    /// Number of active cells; only indices `0..cell_count` hold live data
    pub cell_count: usize,
    /// Size of the preallocated pool
    pub capacity: usize,
    /// Density used to derive mass from radius
    pub density: f32,
    /// Largest radius a cell may have; wider cells would escape neighbor search
    pub max_radius: f32,

    /// Unique identifier per cell, stable across slot reuse
    pub cell_ids: Vec<u32>,
    pub next_cell_id: u32,

    // === Position and Motion ===
    pub positions: Vec<Vec3>,
    pub velocities: Vec<Vec3>,

    // === Physical Properties ===
    pub radii: Vec<f32>,
    pub masses: Vec<f32>,
    pub moments_of_inertia: Vec<f32>,
    pub drag_coefficients: Vec<f32>,
    pub repulsion_strengths: Vec<f32>,

    // === Orientation ===
    pub rotations: Vec<Quat>,
    pub angular_velocities: Vec<Vec3>,

    // === Behavior ===
    pub mode_indices: Vec<i32>,
    /// Seconds since the cell was created or last split
    pub split_timers: Vec<f32>,
    /// Splits performed in the current mode
    pub split_counts: Vec<i32>,

    // === Per-step Scratch ===
    pub forces: Vec<Vec3>,
    pub torques: Vec<Vec3>,
    pub torque_accumulator: ScaledAtomicAccumulator<Vec3>,
    pub velocity_deltas: ScaledAtomicAccumulator<Vec3>,
    pub rotation_deltas: ScaledAtomicAccumulator<Quat>,
}

impl CanonicalState {
    /// Create an empty state sized and scaled from `config`.
    pub fn new(config: &PhysicsConfig) -> Self {
        let mut state = Self::with_capacity(config.max_cells, config.cell_density, config.fixed_point_scale);
        state.max_radius = config.grid_cell_size();
        state
    }

    pub fn with_capacity(capacity: usize, density: f32, fixed_point_scale: f32) -> Self {
        Self {
            cell_count: 0,
            capacity,
            density,
            max_radius: f32::INFINITY,
            cell_ids: vec![0; capacity],
            next_cell_id: 0,
            positions: vec![Vec3::ZERO; capacity],
            velocities: vec![Vec3::ZERO; capacity],
            radii: vec![1.0; capacity],
            masses: vec![1.0; capacity],
            moments_of_inertia: vec![0.4; capacity],
            drag_coefficients: vec![0.0; capacity],
            repulsion_strengths: vec![0.0; capacity],
            rotations: vec![Quat::IDENTITY; capacity],
            angular_velocities: vec![Vec3::ZERO; capacity],
            mode_indices: vec![-1; capacity],
            split_timers: vec![0.0; capacity],
            split_counts: vec![0; capacity],
            forces: vec![Vec3::ZERO; capacity],
            torques: vec![Vec3::ZERO; capacity],
            torque_accumulator: ScaledAtomicAccumulator::new(capacity, fixed_point_scale),
            velocity_deltas: ScaledAtomicAccumulator::new(capacity, fixed_point_scale),
            rotation_deltas: ScaledAtomicAccumulator::new(capacity, fixed_point_scale),
        }
    }

    pub fn free_slots(&self) -> usize {
        self.capacity - self.cell_count
    }

    /// Append a cell at index `cell_count`.
    ///
    /// Returns `None` when the pool is full.
    pub fn add_cell(&mut self, cell: NewCell) -> Option<usize> {
        if self.cell_count >= self.capacity {
            return None;
        }
        let index = self.cell_count;
        self.write_cell(index, &cell);
        self.cell_count += 1;
        Some(index)
    }

    /// Overwrite slot `index` with a fresh cell. Mass and inertia are derived
    /// from the radius, the split timer restarts and a new id is assigned.
    /// The radius is clamped to `max_radius`.
    pub fn write_cell(&mut self, index: usize, cell: &NewCell) {
        if index >= self.capacity {
            return;
        }
        let radius = cell.radius.max(f32::EPSILON).min(self.max_radius);
        let mass = sphere_mass(radius, self.density);

        self.cell_ids[index] = self.next_cell_id;
        self.next_cell_id = self.next_cell_id.wrapping_add(1);

        self.positions[index] = cell.position;
        self.velocities[index] = cell.velocity;
        self.radii[index] = radius;
        self.masses[index] = mass;
        self.moments_of_inertia[index] = sphere_inertia(mass, radius);
        self.drag_coefficients[index] = cell.drag_coefficient;
        self.repulsion_strengths[index] = cell.repulsion_strength;
        self.rotations[index] = cell.rotation.normalize();
        self.angular_velocities[index] = cell.angular_velocity;
        self.mode_indices[index] = cell.mode_index;
        self.split_timers[index] = 0.0;
        self.split_counts[index] = cell.split_count;
        self.forces[index] = Vec3::ZERO;
        self.torques[index] = Vec3::ZERO;

        // Drop anything scattered onto this slot before it was reused
        self.torque_accumulator.take(index);
        self.velocity_deltas.take(index);
        self.rotation_deltas.take(index);
    }

    /// Deactivate every cell. Arrays keep their allocation.
    pub fn clear(&mut self) {
        self.cell_count = 0;
        self.next_cell_id = 0;
        self.torque_accumulator.reset_all();
        self.velocity_deltas.reset_all();
        self.rotation_deltas.reset_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(capacity: usize) -> CanonicalState {
        CanonicalState::with_capacity(capacity, 1.0, 1_048_576.0)
    }

    #[test]
    fn test_add_cell_derives_mass_and_inertia() {
        let mut state = state(4);
        let config = PhysicsConfig::default();
        let mut cell = NewCell::from_config(&config, Vec3::ONE, 0);
        cell.radius = 2.0;

        let idx = state.add_cell(cell).unwrap();
        assert_eq!(idx, 0);
        assert_eq!(state.cell_count, 1);

        let expected_mass = 4.0 / 3.0 * std::f32::consts::PI * 8.0;
        assert!((state.masses[0] - expected_mass).abs() < 1e-4);
        assert!((state.moments_of_inertia[0] - 0.4 * expected_mass * 4.0).abs() < 1e-3);
        assert_eq!(state.positions[0], Vec3::ONE);
    }

    #[test]
    fn test_add_cell_at_capacity_returns_none() {
        let mut state = state(1);
        let config = PhysicsConfig::default();
        assert!(state.add_cell(NewCell::from_config(&config, Vec3::ZERO, 0)).is_some());
        assert!(state.add_cell(NewCell::from_config(&config, Vec3::X, 0)).is_none());
        assert_eq!(state.cell_count, 1);
        assert_eq!(state.free_slots(), 0);
    }

    #[test]
    fn test_radius_clamped_to_grid_cell() {
        let config = PhysicsConfig {
            world_radius: 10.0,
            grid_resolution: 10,
            ..Default::default()
        };
        let mut state = CanonicalState::new(&config);
        let mut cell = NewCell::from_config(&config, Vec3::ZERO, 0);
        cell.radius = 5.0;
        state.add_cell(cell).unwrap();
        assert_eq!(state.radii[0], 2.0);
        assert!((state.masses[0] - sphere_mass(2.0, config.cell_density)).abs() < 1e-4);
    }

    #[test]
    fn test_write_cell_discards_stale_accumulated_values() {
        let mut state = state(2);
        state.torque_accumulator.add(1, Vec3::X);
        state.velocity_deltas.add(1, Vec3::Y);

        let config = PhysicsConfig::default();
        state.write_cell(1, &NewCell::from_config(&config, Vec3::ZERO, 0));
        assert_eq!(state.torque_accumulator.load(1), Vec3::ZERO);
        assert_eq!(state.velocity_deltas.load(1), Vec3::ZERO);
    }

    #[test]
    fn test_ids_are_unique_and_clear_resets() {
        let mut state = state(3);
        let config = PhysicsConfig::default();
        for i in 0..3 {
            state.add_cell(NewCell::from_config(&config, Vec3::splat(i as f32), 0));
        }
        assert_eq!(&state.cell_ids[..3], &[0, 1, 2]);

        state.clear();
        assert_eq!(state.cell_count, 0);
        assert_eq!(state.free_slots(), 3);
    }
}
