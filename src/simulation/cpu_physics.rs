// CPU-based physics passes
//
// Every pass is a data-parallel loop over the active cells. The end of each
// `for_each` is the barrier between passes: a later pass never observes a
// partially finished earlier one. The only state written by more than one task
// inside a pass is the fixed-point torque accumulator.

use glam::{Quat, Vec3};
use rayon::prelude::*;
use crate::genome::Genome;
use crate::input::DragInput;
use crate::simulation::canonical_state::CanonicalState;
use crate::simulation::physics_config::PhysicsConfig;
use crate::simulation::scaled_atomic::ScaledAtomicAccumulator;
use crate::simulation::spatial_grid::SpatialHashGrid;

/// Contact uses half the physical radius
pub const CONTACT_RADIUS_SCALE: f32 = 0.5;
/// Minimum overlap before two cells interact
pub const OVERLAP_EPSILON: f32 = 0.001;
/// Centers closer than this have no usable contact direction
const MIN_SEPARATION: f32 = 1e-4;
/// Contact slip below this produces no friction
const SLIP_EPSILON: f32 = 1e-4;
const FRICTION_EXPONENT: f32 = 1.25;
const MAX_FRICTION_TORQUE: f32 = 10.0;
/// Rotation angles below this are treated as no rotation
pub const MIN_ROTATION_ANGLE: f32 = 1e-5;
/// Work items per rayon task; smaller populations run on one thread
const MIN_PARALLEL_CHUNK: usize = 500;

/// Read-only inputs shared by every pass of one step.
#[derive(Clone, Copy)]
pub struct StepContext<'a> {
    pub config: &'a PhysicsConfig,
    pub genome: &'a Genome,
    pub dt: f32,
}

impl<'a> StepContext<'a> {
    pub fn new(config: &'a PhysicsConfig, genome: &'a Genome) -> Self {
        Self {
            config,
            genome,
            dt: config.fixed_timestep,
        }
    }
}

// ============================================================================
// Contact Forces
// ============================================================================

/// Repulsion force on cell A from cell B. Zero unless the effective spheres
/// overlap by more than [`OVERLAP_EPSILON`]; bounded by `strength`.
pub fn pair_repulsion(pos_a: Vec3, radius_a: f32, pos_b: Vec3, radius_b: f32, strength: f32) -> Vec3 {
    let delta = pos_b - pos_a;
    let dist = delta.length();
    let combined = (radius_a + radius_b) * CONTACT_RADIUS_SCALE;
    let overlap = combined - dist;

    if overlap <= OVERLAP_EPSILON || dist < MIN_SEPARATION {
        return Vec3::ZERO;
    }

    let normal = delta / dist;
    let penetration = (overlap / combined).clamp(0.0, 1.0);
    let proximity = (1.0 - dist / combined).clamp(0.0, 1.0);
    -normal * (strength * penetration * proximity)
}

/// Rolling-friction torque produced by one contact.
///
/// `normal` points from A to B; `radius_a`/`radius_b` are the contact lever
/// arms. The same torque applies to both bodies.
#[allow(clippy::too_many_arguments)]
pub fn rolling_friction_torque(
    normal: Vec3,
    radius_a: f32,
    radius_b: f32,
    velocity_a: Vec3,
    angular_velocity_a: Vec3,
    velocity_b: Vec3,
    angular_velocity_b: Vec3,
    friction_factor: f32,
) -> Option<Vec3> {
    let contact_a = velocity_a + angular_velocity_a.cross(normal * radius_a);
    let contact_b = velocity_b + angular_velocity_b.cross(-normal * radius_b);

    let relative = contact_b - contact_a;
    let slip = relative - normal * relative.dot(normal);
    let slip_speed = slip.length();
    if !(slip_speed > SLIP_EPSILON) {
        return None;
    }

    let tangent = slip / slip_speed;
    let axis = normal.cross(tangent).normalize_or_zero();
    if axis == Vec3::ZERO {
        return None;
    }

    let magnitude = (slip_speed * friction_factor)
        .abs()
        .powf(FRICTION_EXPONENT)
        .min(MAX_FRICTION_TORQUE);
    Some(axis * magnitude)
}

/// Force and own-torque for cell `i`. Torque on each neighbor is scattered
/// into `accumulator`.
#[allow(clippy::too_many_arguments)]
fn contact_force_on(
    i: usize,
    positions: &[Vec3],
    velocities: &[Vec3],
    angular_velocities: &[Vec3],
    radii: &[f32],
    strength: f32,
    grid: &SpatialHashGrid,
    accumulator: &ScaledAtomicAccumulator<Vec3>,
    friction_factor: f32,
) -> (Vec3, Vec3) {
    let count = positions.len();
    let pos_a = positions[i];
    let contact_radius_a = radii[i] * CONTACT_RADIUS_SCALE;
    let mut force = Vec3::ZERO;
    let mut torque = Vec3::ZERO;

    for j in grid.neighbors(pos_a) {
        if j == i || j >= count {
            continue;
        }

        let repulsion = pair_repulsion(pos_a, radii[i], positions[j], radii[j], strength);
        if repulsion == Vec3::ZERO {
            continue;
        }
        force += repulsion;

        let normal = (positions[j] - pos_a).normalize_or_zero();
        if let Some(friction) = rolling_friction_torque(
            normal,
            contact_radius_a,
            radii[j] * CONTACT_RADIUS_SCALE,
            velocities[i],
            angular_velocities[i],
            velocities[j],
            angular_velocities[j],
            friction_factor,
        ) {
            torque += friction;
            accumulator.add(j, friction);
        }
    }

    (force, torque)
}

/// Compute repulsion and rolling friction for every active cell into
/// `state.forces`/`state.torques`, plus the optional drag pull.
pub fn compute_contact_forces(
    state: &mut CanonicalState,
    grid: &SpatialHashGrid,
    ctx: &StepContext,
    drag: Option<&DragInput>,
) {
    let count = state.cell_count;
    let friction_factor = ctx.config.rolling_friction_factor;
    let CanonicalState {
        positions,
        velocities,
        angular_velocities,
        radii,
        repulsion_strengths,
        forces,
        torques,
        torque_accumulator,
        ..
    } = state;

    let positions = &positions[..count];
    let velocities = &velocities[..count];
    let angular_velocities = &angular_velocities[..count];
    let radii = &radii[..count];
    let repulsion_strengths = &repulsion_strengths[..count];
    let accumulator = &*torque_accumulator;

    forces[..count]
        .par_iter_mut()
        .zip(torques[..count].par_iter_mut())
        .enumerate()
        .with_min_len(MIN_PARALLEL_CHUNK)
        .for_each(|(i, (force, torque))| {
            let (contact_force, contact_torque) = contact_force_on(
                i,
                positions,
                velocities,
                angular_velocities,
                radii,
                repulsion_strengths[i],
                grid,
                accumulator,
                friction_factor,
            );
            let pull = drag.map_or(Vec3::ZERO, |d| d.force_on(i, positions[i]));
            *force = contact_force + pull;
            *torque = contact_torque;
        });
}

/// Turn this step's forces and own-torques into velocity increments.
pub fn apply_contact_forces(state: &mut CanonicalState, dt: f32) {
    let count = state.cell_count;
    let CanonicalState {
        velocities,
        angular_velocities,
        masses,
        moments_of_inertia,
        forces,
        torques,
        ..
    } = state;
    let masses = &masses[..count];
    let moments = &moments_of_inertia[..count];
    let forces = &forces[..count];
    let torques = &torques[..count];

    velocities[..count]
        .par_iter_mut()
        .zip(angular_velocities[..count].par_iter_mut())
        .enumerate()
        .with_min_len(MIN_PARALLEL_CHUNK)
        .for_each(|(i, (velocity, angular_velocity))| {
            if masses[i] > 0.0 {
                let dv = forces[i] / masses[i] * dt;
                if dv.is_finite() {
                    *velocity += dv;
                }
            }
            if moments[i] > 0.0 {
                let dw = torques[i] / moments[i] * dt;
                if dw.is_finite() {
                    *angular_velocity += dw;
                }
            }
        });
}

// ============================================================================
// Damping and Motion
// ============================================================================

/// Exponential linear and angular damping.
pub fn apply_damping(state: &mut CanonicalState, ctx: &StepContext) {
    let count = state.cell_count;
    let global_drag = ctx.config.global_drag_multiplier;
    let angular_factor = (-ctx.config.torque_damping * ctx.dt).exp();
    let dt = ctx.dt;
    let CanonicalState {
        velocities,
        angular_velocities,
        drag_coefficients,
        ..
    } = state;
    let drag_coefficients = &drag_coefficients[..count];

    velocities[..count]
        .par_iter_mut()
        .zip(angular_velocities[..count].par_iter_mut())
        .enumerate()
        .with_min_len(MIN_PARALLEL_CHUNK)
        .for_each(|(i, (velocity, angular_velocity))| {
            *velocity *= (-drag_coefficients[i] * global_drag * dt).exp();
            *angular_velocity *= angular_factor;
        });
}

/// Keep a cell inside the world sphere.
///
/// A center beyond `world_radius` is moved onto the sphere, the outward part
/// of its velocity is reflected and the tangential velocity spins the cell
/// as if rolling against the wall.
pub fn resolve_boundary(
    position: &mut Vec3,
    velocity: &mut Vec3,
    angular_velocity: &mut Vec3,
    radius: f32,
    world_radius: f32,
    boundary_friction: f32,
) {
    let distance = position.length();
    if !(distance > world_radius) {
        return;
    }

    let normal = *position / distance;
    *position = normal * world_radius;

    let radial = velocity.dot(normal);
    if radial > 0.0 {
        *velocity -= normal * (2.0 * radial);
    }

    let tangential = *velocity - normal * velocity.dot(normal);
    let rolling_radius = radius * CONTACT_RADIUS_SCALE;
    if rolling_radius > f32::EPSILON {
        let spin = tangential.cross(normal) * (boundary_friction / rolling_radius);
        if spin.is_finite() {
            *angular_velocity += spin;
        }
    }
}

/// Advance positions and enforce the boundary.
pub fn integrate_motion(state: &mut CanonicalState, ctx: &StepContext) {
    let count = state.cell_count;
    let dt = ctx.dt;
    let world_radius = ctx.config.world_radius;
    let boundary_friction = ctx.config.boundary_friction;
    let CanonicalState {
        positions,
        velocities,
        angular_velocities,
        radii,
        ..
    } = state;
    let radii = &radii[..count];

    positions[..count]
        .par_iter_mut()
        .zip(velocities[..count].par_iter_mut())
        .zip(angular_velocities[..count].par_iter_mut())
        .enumerate()
        .with_min_len(MIN_PARALLEL_CHUNK)
        .for_each(|(i, ((position, velocity), angular_velocity))| {
            *position += *velocity * dt;
            resolve_boundary(
                position,
                velocity,
                angular_velocity,
                radii[i],
                world_radius,
                boundary_friction,
            );
        });
}

// ============================================================================
// Rotation
// ============================================================================

/// Rotate `rotation` by `angular_velocity` over `dt`.
///
/// Left-multiplies the incremental rotation and renormalizes. Angles below
/// [`MIN_ROTATION_ANGLE`] leave the rotation untouched.
pub fn integrate_rotation(rotation: Quat, angular_velocity: Vec3, dt: f32) -> Quat {
    let speed = angular_velocity.length();
    let angle = speed * dt;
    if !(angle >= MIN_ROTATION_ANGLE) {
        return rotation;
    }
    let axis = angular_velocity / speed;
    let (sin, cos) = (angle * 0.5).sin_cos();
    let delta = Quat::from_xyzw(axis.x * sin, axis.y * sin, axis.z * sin, cos);
    (delta * rotation).normalize()
}

/// Fold in scattered torque, damp, and integrate orientation.
///
/// Consumes the torque accumulator for every active cell.
pub fn integrate_rotations(state: &mut CanonicalState, ctx: &StepContext) {
    let count = state.cell_count;
    let dt = ctx.dt;
    let angular_factor = (-ctx.config.torque_damping * dt).exp();
    let CanonicalState {
        rotations,
        angular_velocities,
        moments_of_inertia,
        torque_accumulator,
        ..
    } = state;
    let moments = &moments_of_inertia[..count];
    let accumulator = &*torque_accumulator;

    rotations[..count]
        .par_iter_mut()
        .zip(angular_velocities[..count].par_iter_mut())
        .enumerate()
        .with_min_len(MIN_PARALLEL_CHUNK)
        .for_each(|(i, (rotation, angular_velocity))| {
            let scattered = accumulator.take(i);
            if moments[i] > 0.0 {
                let dw = scattered / moments[i] * dt;
                if dw.is_finite() {
                    *angular_velocity += dw;
                }
            }
            *angular_velocity *= angular_factor;
            *rotation = integrate_rotation(*rotation, *angular_velocity, dt);
        });
}
