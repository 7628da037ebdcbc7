//! Fixed-timestep simulation driver.
//!
//! [`CellSimulation`] owns every piece of per-run state and advances it one
//! fixed step at a time. A step runs these passes in order, each finishing
//! before the next starts:
//!
//! 1. division: schedule expired timers, then apply the split batch
//! 2. spatial grid clear and rebuild
//! 3. contact forces (repulsion, rolling friction, drag input)
//! 4. force application
//! 5. linear and angular damping
//! 6. motion integration and boundary
//! 7. rotation integration
//! 8. adhesion phase 1 (per connection)
//! 9. adhesion phase 2 (per cell)
//!
//! and then publishes a [`StateSnapshot`] of the finished step.

use std::sync::Arc;
use glam::Vec3;
use thiserror::Error;
use crate::cell::adhesion_forces::solve_adhesion;
use crate::cell::adhesion_manager::{AdhesionConnectionManager, BondManager};
use crate::cell::division::{DivisionScheduler, SplitEvent};
use crate::genome::{Genome, GenomeError};
use crate::input::DragInput;
use crate::simulation::canonical_state::{CanonicalState, NewCell};
use crate::simulation::cpu_physics::{
    apply_contact_forces, apply_damping, compute_contact_forces, integrate_motion,
    integrate_rotations, StepContext,
};
use crate::simulation::physics_config::{ConfigError, PhysicsConfig};
use crate::simulation::snapshot::{SnapshotPublisher, SnapshotReader, StateSnapshot};
use crate::simulation::spatial_grid::SpatialHashGrid;

/// Startup failures. Nothing that happens during a step is an error.
#[derive(Error, Debug, PartialEq)]
pub enum SimulationError {
    #[error("invalid physics configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("invalid genome: {0}")]
    Genome(#[from] GenomeError),
}

/// Many-body cell simulation over a preallocated pool.
pub struct CellSimulation<B: BondManager = AdhesionConnectionManager> {
    config: PhysicsConfig,
    genome: Genome,
    state: CanonicalState,
    grid: SpatialHashGrid,
    bonds: B,
    scheduler: DivisionScheduler,
    drag: Option<DragInput>,
    step: u64,
    publisher: SnapshotPublisher,
    latest: Arc<StateSnapshot>,
}

impl CellSimulation<AdhesionConnectionManager> {
    /// Simulation with the built-in bond manager sized to the pool.
    pub fn with_default_bonds(config: PhysicsConfig, genome: Genome) -> Result<Self, SimulationError> {
        let bonds = AdhesionConnectionManager::new(config.max_cells);
        Self::new(config, genome, bonds)
    }
}

impl<B: BondManager> CellSimulation<B> {
    /// Validate `config` and `genome`, allocate the pool and spawn the seed
    /// cell.
    pub fn new(config: PhysicsConfig, genome: Genome, bonds: B) -> Result<Self, SimulationError> {
        config.validate()?;
        genome.validate()?;

        let state = CanonicalState::new(&config);
        let grid = SpatialHashGrid::new(config.grid_resolution, config.world_radius, config.max_cells);

        let mut simulation = Self {
            config,
            genome,
            state,
            grid,
            bonds,
            scheduler: DivisionScheduler::new(),
            drag: None,
            step: 0,
            publisher: SnapshotPublisher::new(),
            latest: Arc::new(StateSnapshot::default()),
        };
        simulation.reinitialize()?;
        Ok(simulation)
    }

    /// Clear every body and bond and spawn one seed cell at the origin in the
    /// genome's initial mode.
    fn reinitialize(&mut self) -> Result<(), SimulationError> {
        let initial_mode = self.genome.validate()?;

        self.state.clear();
        self.bonds.clear();
        self.scheduler.reset();
        self.drag = None;
        self.step = 0;

        let mut seed = NewCell::from_config(&self.config, Vec3::ZERO, initial_mode as i32);
        seed.rotation = self.genome.initial_orientation;
        self.state.add_cell(seed);

        log::info!(
            "Simulation initialized: genome '{}', initial mode {} ({}), capacity {}",
            self.genome.name,
            initial_mode,
            self.genome.modes[initial_mode].name,
            self.state.capacity
        );

        self.publish();
        Ok(())
    }

    /// Advance one fixed timestep and return the splits applied in it.
    pub fn step(&mut self) -> Vec<SplitEvent> {
        let ctx = StepContext::new(&self.config, &self.genome);

        self.scheduler.schedule(&mut self.state, &ctx);
        let events = self.scheduler.apply(&mut self.state);

        self.grid.rebuild(&self.state.positions, self.state.cell_count);
        compute_contact_forces(&mut self.state, &self.grid, &ctx, self.drag.as_ref());
        apply_contact_forces(&mut self.state, ctx.dt);
        apply_damping(&mut self.state, &ctx);
        integrate_motion(&mut self.state, &ctx);
        integrate_rotations(&mut self.state, &ctx);

        for event in &events {
            self.bonds.on_split(event);
        }
        solve_adhesion(&mut self.state, self.bonds.connections(), &ctx);

        self.step += 1;
        self.publish();
        events
    }

    /// Run `steps` steps and return how many splits happened.
    pub fn run(&mut self, steps: u64) -> usize {
        (0..steps).map(|_| self.step().len()).sum()
    }

    fn publish(&mut self) {
        self.latest = Arc::new(StateSnapshot::capture(&self.state, self.step));
        self.publisher.publish(&self.latest);
    }

    /// Replace the mode table and restart from a single seed cell.
    ///
    /// An invalid genome is rejected and the running simulation is left
    /// untouched.
    pub fn set_genome(&mut self, genome: Genome) -> Result<(), SimulationError> {
        genome.validate()?;
        self.genome = genome;
        self.reinitialize()
    }

    /// Restart from a single seed cell with the current genome.
    pub fn reset(&mut self) -> Result<(), SimulationError> {
        self.reinitialize()
    }

    pub fn set_drag(&mut self, drag: DragInput) {
        self.drag = Some(drag);
    }

    pub fn clear_drag(&mut self) {
        self.drag = None;
    }

    pub fn drag(&self) -> Option<DragInput> {
        self.drag
    }

    /// Insert a body into the next free slot. `None` when the pool is full or
    /// the radius is wider than one grid cell.
    pub fn spawn_cell(&mut self, cell: NewCell) -> Option<usize> {
        let max_radius = self.config.grid_cell_size();
        if !(cell.radius > 0.0 && cell.radius <= max_radius) {
            log::warn!(
                "Rejected cell with radius {} (grid cell size {})",
                cell.radius,
                max_radius
            );
            return None;
        }
        self.state.add_cell(cell)
    }

    /// New non-blocking reader, primed with the current snapshot.
    pub fn subscribe(&mut self) -> SnapshotReader {
        self.publisher.subscribe(Some(Arc::clone(&self.latest)))
    }

    /// Snapshot of the last completed step.
    pub fn snapshot(&self) -> Arc<StateSnapshot> {
        Arc::clone(&self.latest)
    }

    pub fn state(&self) -> &CanonicalState {
        &self.state
    }

    pub fn config(&self) -> &PhysicsConfig {
        &self.config
    }

    pub fn genome(&self) -> &Genome {
        &self.genome
    }

    pub fn bonds(&self) -> &B {
        &self.bonds
    }

    pub fn bonds_mut(&mut self) -> &mut B {
        &mut self.bonds
    }

    pub fn step_count(&self) -> u64 {
        self.step
    }

    pub fn cell_count(&self) -> usize {
        self.state.cell_count
    }

    /// Splits dropped for lack of pool capacity since the last reset.
    pub fn dropped_splits(&self) -> u64 {
        self.scheduler.dropped_splits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::adhesion_manager::connection_between;

    fn config(max_cells: usize) -> PhysicsConfig {
        PhysicsConfig {
            max_cells,
            world_radius: 50.0,
            grid_resolution: 16,
            ..Default::default()
        }
    }

    fn fast_genome(interval: f32) -> Genome {
        let mut genome = Genome::default();
        genome.modes.truncate(2);
        genome.modes[0].split_interval = interval;
        genome
    }

    #[test]
    fn test_new_spawns_seed_cell() {
        let mut genome = fast_genome(5.0);
        genome.modes[1].is_initial = true;
        let sim = CellSimulation::with_default_bonds(config(16), genome).unwrap();
        assert_eq!(sim.cell_count(), 1);
        assert_eq!(sim.state().mode_indices[0], 1);
        assert_eq!(sim.state().positions[0], Vec3::ZERO);
        assert_eq!(sim.step_count(), 0);
        assert_eq!(sim.snapshot().cell_count, 1);
    }

    #[test]
    fn test_new_rejects_bad_inputs() {
        let bad_config = PhysicsConfig {
            fixed_timestep: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            CellSimulation::with_default_bonds(bad_config, Genome::default()),
            Err(SimulationError::Config(ConfigError::InvalidTimestep(_)))
        ));

        let mut genome = fast_genome(5.0);
        genome.modes[0].is_initial = true;
        genome.modes[1].is_initial = true;
        assert!(matches!(
            CellSimulation::with_default_bonds(config(16), genome),
            Err(SimulationError::Genome(GenomeError::MultipleInitialModes(_)))
        ));
    }

    #[test]
    fn test_step_splits_and_publishes() {
        let mut sim = CellSimulation::with_default_bonds(config(16), fast_genome(1.0)).unwrap();
        let splits = sim.run(64);
        assert_eq!(splits, 1);
        assert_eq!(sim.cell_count(), 2);

        let snapshot = sim.snapshot();
        assert_eq!(snapshot.step, 64);
        assert_eq!(snapshot.cell_count, 2);
        assert_eq!(snapshot.positions.len(), 2);
        assert_eq!(snapshot.rotations.len(), 2);
    }

    #[test]
    fn test_set_genome_reinitializes() {
        let mut sim = CellSimulation::with_default_bonds(config(16), fast_genome(0.5)).unwrap();
        sim.run(200);
        assert!(sim.cell_count() > 1);

        sim.set_genome(fast_genome(2.0)).unwrap();
        assert_eq!(sim.cell_count(), 1);
        assert_eq!(sim.step_count(), 0);
        assert_eq!(sim.bonds().active_count(), 0);
        assert_eq!(sim.genome().modes[0].split_interval, 2.0);
    }

    #[test]
    fn test_set_genome_rejects_invalid_and_keeps_running() {
        let mut sim = CellSimulation::with_default_bonds(config(16), fast_genome(1.0)).unwrap();
        sim.run(10);
        let mut broken = fast_genome(1.0);
        broken.modes.clear();
        assert!(sim.set_genome(broken).is_err());
        assert_eq!(sim.step_count(), 10);
        assert_eq!(sim.genome().modes.len(), 2);
    }

    #[test]
    fn test_drag_pulls_selected_cell() {
        let mut sim = CellSimulation::with_default_bonds(config(16), fast_genome(100.0)).unwrap();
        sim.set_drag(DragInput {
            cell_index: 0,
            target: Vec3::new(10.0, 0.0, 0.0),
            strength: 50.0,
        });
        sim.run(10);
        assert!(sim.state().positions[0].x > 0.0);

        sim.clear_drag();
        assert!(sim.drag().is_none());
    }

    #[test]
    fn test_out_of_range_drag_is_ignored() {
        let mut sim = CellSimulation::with_default_bonds(config(16), fast_genome(100.0)).unwrap();
        sim.set_drag(DragInput {
            cell_index: 9,
            target: Vec3::splat(10.0),
            strength: 50.0,
        });
        sim.run(10);
        assert_eq!(sim.state().positions[0], Vec3::ZERO);
    }

    #[test]
    fn test_bonded_pair_pulls_together() {
        let mut sim = CellSimulation::with_default_bonds(config(16), fast_genome(100.0)).unwrap();
        let far = NewCell::from_config(sim.config(), Vec3::new(4.0, 0.0, 0.0), 0);
        let index = sim.spawn_cell(far).unwrap();

        let settings = sim.genome().modes[0].adhesion_settings;
        let connection = connection_between(
            0,
            index,
            0,
            &settings,
            (Vec3::ZERO, far.position),
            (sim.state().rotations[0], far.rotation),
        );
        sim.bonds_mut().add_adhesion(connection).unwrap();

        let before = sim.state().positions[index].distance(sim.state().positions[0]);
        sim.run(5);
        let after = sim.state().positions[index].distance(sim.state().positions[0]);
        assert!(after < before);
    }

    #[test]
    fn test_spawn_cell_respects_capacity() {
        let mut sim = CellSimulation::with_default_bonds(config(2), fast_genome(100.0)).unwrap();
        let cell = NewCell::from_config(sim.config(), Vec3::X * 5.0, 0);
        assert_eq!(sim.spawn_cell(cell), Some(1));
        assert_eq!(sim.spawn_cell(cell), None);
    }

    #[test]
    fn test_spawn_cell_rejects_radius_beyond_grid_cell() {
        let mut sim = CellSimulation::with_default_bonds(config(4), fast_genome(100.0)).unwrap();
        let mut cell = NewCell::from_config(sim.config(), Vec3::X * 10.0, 0);
        cell.radius = sim.config().grid_cell_size() * 2.0;
        assert_eq!(sim.spawn_cell(cell), None);
        cell.radius = f32::NAN;
        assert_eq!(sim.spawn_cell(cell), None);
        assert_eq!(sim.cell_count(), 1);
    }

    #[test]
    fn test_large_cells_on_coarse_grid_still_collide() {
        let config = PhysicsConfig {
            max_cells: 4,
            world_radius: 20.0,
            grid_resolution: 10,
            default_radius: 4.0,
            ..Default::default()
        };
        let mut sim = CellSimulation::with_default_bonds(config, fast_genome(100.0)).unwrap();
        let other = NewCell::from_config(sim.config(), Vec3::new(3.0, 0.0, 0.0), 0);
        sim.spawn_cell(other).unwrap();

        sim.step();
        let state = sim.state();
        assert!(state.positions[0].x < 0.0);
        assert!(state.positions[1].x > 3.0);
    }

    #[test]
    fn test_grid_finer_than_radius_is_rejected() {
        let config = PhysicsConfig {
            grid_resolution: 400,
            default_radius: 4.0,
            ..Default::default()
        };
        assert!(matches!(
            CellSimulation::with_default_bonds(config, fast_genome(100.0)),
            Err(SimulationError::Config(ConfigError::GridCellTooSmall { .. }))
        ));
    }

    #[test]
    fn test_full_pool_drops_splits() {
        let mut sim = CellSimulation::with_default_bonds(config(1), fast_genome(0.25)).unwrap();
        sim.run(64);
        assert_eq!(sim.cell_count(), 1);
        assert!(sim.dropped_splits() > 0);
    }

    #[test]
    fn test_subscriber_sees_latest_step() {
        let mut sim = CellSimulation::with_default_bonds(config(16), fast_genome(100.0)).unwrap();
        let mut reader = sim.subscribe();
        assert_eq!(reader.latest().unwrap().step, 0);
        sim.step();
        assert_eq!(reader.latest().unwrap().step, 1);
        sim.reset().unwrap();
        assert_eq!(reader.latest().unwrap().step, 0);
    }
}
