//! End-to-end scenarios through the public simulation API.

use bio_spheres_core::cell::AdhesionConnectionManager;
use bio_spheres_core::genome::{Genome, GenomeError};
use bio_spheres_core::input::CellDragger;
use bio_spheres_core::simulation::{CellSimulation, NewCell, PhysicsConfig, SimulationError};
use glam::{Quat, Vec3};

fn config(max_cells: usize) -> PhysicsConfig {
    PhysicsConfig {
        max_cells,
        world_radius: 40.0,
        grid_resolution: 16,
        ..Default::default()
    }
}

fn genome(split_interval: f32) -> Genome {
    let mut genome = Genome::default();
    genome.modes.truncate(4);
    genome.modes[0].split_interval = split_interval;
    genome
}

#[test]
fn population_doubles_every_interval() {
    let mut sim = CellSimulation::with_default_bonds(config(64), genome(1.0)).unwrap();

    sim.run(63);
    assert_eq!(sim.cell_count(), 1);
    sim.run(1);
    assert_eq!(sim.cell_count(), 2);
    sim.run(64);
    assert_eq!(sim.cell_count(), 4);
    sim.run(64);
    assert_eq!(sim.cell_count(), 8);
}

#[test]
fn population_never_exceeds_pool() {
    let mut sim = CellSimulation::with_default_bonds(config(5), genome(0.25)).unwrap();
    for _ in 0..400 {
        sim.step();
        assert!(sim.cell_count() <= 5);
    }
    assert_eq!(sim.cell_count(), 5);
    assert!(sim.dropped_splits() > 0);
}

#[test]
fn daughters_take_configured_modes() {
    let mut genome = genome(1.0);
    genome.modes[0].child_a.mode_number = 2;
    genome.modes[0].child_b.mode_number = 3;
    genome.modes[2].split_interval = 100.0;
    genome.modes[3].split_interval = 100.0;

    let mut sim = CellSimulation::with_default_bonds(config(16), genome).unwrap();
    let events = sim.run(64);
    assert_eq!(events, 1);

    let state = sim.state();
    assert_eq!(state.mode_indices[0], 2);
    assert_eq!(state.mode_indices[1], 3);

    sim.run(200);
    assert_eq!(sim.cell_count(), 2);
}

#[test]
fn sibling_bond_holds_daughters_together() {
    let mut genome = genome(1.0);
    genome.modes[0].parent_make_adhesion = true;
    genome.modes[0].child_a.mode_number = 1;
    genome.modes[0].child_b.mode_number = 1;
    genome.modes[1].split_interval = 100.0;

    let mut sim = CellSimulation::with_default_bonds(config(16), genome).unwrap();
    sim.run(64);
    assert_eq!(sim.cell_count(), 2);
    assert_eq!(sim.bonds().active_count(), 1);
    assert!(sim.bonds().are_cells_connected(0, 1));

    sim.run(640);
    let state = sim.state();
    let distance = state.positions[0].distance(state.positions[1]);
    assert!(distance < 3.0, "bonded daughters drifted {distance} apart");
    for rotation in &state.rotations[..2] {
        assert!((rotation.length() - 1.0).abs() < 1e-4);
    }
}

#[test]
fn snapshots_are_consistent_and_versioned() {
    let mut sim = CellSimulation::with_default_bonds(config(32), genome(0.5)).unwrap();
    let mut reader = sim.subscribe();

    let mut last_step = 0;
    for _ in 0..200 {
        sim.step();
        let snapshot = reader.latest().unwrap();
        assert!(snapshot.step >= last_step);
        assert_eq!(snapshot.positions.len(), snapshot.cell_count);
        assert_eq!(snapshot.rotations.len(), snapshot.cell_count);
        assert_eq!(snapshot.instances().len(), snapshot.cell_count);
        last_step = snapshot.step;
    }
    assert_eq!(last_step, 200);
    assert_eq!(sim.snapshot().cell_count, sim.cell_count());
}

#[test]
fn dragger_moves_only_the_held_cell() {
    let mut sim = CellSimulation::with_default_bonds(config(8), genome(100.0)).unwrap();
    let bystander = sim
        .spawn_cell(NewCell::from_config(sim.config(), Vec3::new(-10.0, 0.0, 0.0), 0))
        .unwrap();

    let mut dragger = CellDragger::default();
    dragger.start_drag(0, Vec3::new(0.0, 8.0, 0.0));
    if let Some(input) = dragger.input() {
        sim.set_drag(input);
    }
    sim.run(64);

    let state = sim.state();
    assert!(state.positions[0].y > 1.0);
    assert_eq!(state.positions[bystander], Vec3::new(-10.0, 0.0, 0.0));

    dragger.stop_drag();
    assert!(dragger.input().is_none());
}

#[test]
fn genome_edit_restarts_from_seed() {
    let mut sim = CellSimulation::with_default_bonds(config(32), genome(0.5)).unwrap();
    sim.run(160);
    assert!(sim.cell_count() > 1);

    let mut edited = genome(2.0);
    edited.initial_orientation = Quat::from_rotation_y(1.0);
    let yaml = edited.to_yaml().unwrap();
    let reloaded = Genome::from_yaml(&yaml).unwrap();

    sim.set_genome(reloaded).unwrap();
    assert_eq!(sim.cell_count(), 1);
    assert_eq!(sim.step_count(), 0);
    assert!(sim.state().rotations[0].abs_diff_eq(Quat::from_rotation_y(1.0), 1e-5));

    sim.run(127);
    assert_eq!(sim.cell_count(), 1);
    sim.run(1);
    assert_eq!(sim.cell_count(), 2);
}

#[test]
fn two_initial_modes_fail_before_start() {
    let mut genome = genome(1.0);
    genome.modes[1].is_initial = true;
    genome.modes[2].is_initial = true;

    let bonds = AdhesionConnectionManager::new(16);
    let result = CellSimulation::new(config(16), genome, bonds);
    assert!(matches!(
        result,
        Err(SimulationError::Genome(GenomeError::MultipleInitialModes(ref modes))) if modes == &vec![1, 2]
    ));
}

#[test]
fn crowded_population_stays_inside_world() {
    let config = PhysicsConfig {
        max_cells: 1200,
        world_radius: 12.0,
        grid_resolution: 24,
        ..Default::default()
    };
    let mut sim = CellSimulation::with_default_bonds(config, genome(100.0)).unwrap();
    for x in -5..5 {
        for y in -5..5 {
            for z in -5..5 {
                let position = Vec3::new(x as f32, y as f32, z as f32) * 0.6;
                let mut cell = NewCell::from_config(sim.config(), position, 0);
                cell.angular_velocity = Vec3::new(y as f32, z as f32, x as f32) * 0.1;
                sim.spawn_cell(cell).unwrap();
            }
        }
    }
    assert_eq!(sim.cell_count(), 1001);

    sim.run(120);

    let world_radius = sim.config().world_radius;
    let state = sim.state();
    for i in 0..state.cell_count {
        assert!(state.positions[i].is_finite());
        assert!(state.positions[i].length() <= world_radius + 1e-3);
        assert!((state.rotations[i].length() - 1.0).abs() < 1e-4);
    }
}
