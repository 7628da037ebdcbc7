use glam::{Quat, Vec3};
use rayon::prelude::*;
use crate::simulation::canonical_state::CanonicalState;
use crate::simulation::cpu_physics::StepContext;
use super::adhesion::AdhesionConnection;

/// Bonded centers closer than this have no usable spring direction
const MIN_BOND_LENGTH: f32 = 1e-4;
/// Anchor misalignment below this (as |sin|) is left alone
const MIN_ANCHOR_SIN: f32 = 1e-6;
/// Relative orientation error below this is left alone
const MIN_ORIENTATION_ERROR: f32 = 1e-6;
const MIN_PARALLEL_CHUNK: usize = 256;

/// Two-phase adhesion solve: accumulate every bond's deltas, then apply them
/// once per cell.
pub fn solve_adhesion(state: &mut CanonicalState, connections: &[AdhesionConnection], ctx: &StepContext) {
    accumulate_adhesion_deltas(state, connections, ctx);
    apply_adhesion_deltas(state);
}

// =============================================================================
// Phase 1: per connection
// =============================================================================

/// Scatter velocity and rotation deltas for every active connection into
/// the state's fixed-point accumulators.
///
/// Connections with an endpoint outside the active range, or with both
/// endpoints on the same cell, are skipped.
pub fn accumulate_adhesion_deltas(
    state: &CanonicalState,
    connections: &[AdhesionConnection],
    ctx: &StepContext,
) {
    connections
        .par_iter()
        .with_min_len(MIN_PARALLEL_CHUNK)
        .filter(|c| c.is_active)
        .for_each(|connection| accumulate_connection(state, connection, ctx));
}

fn accumulate_connection(state: &CanonicalState, connection: &AdhesionConnection, ctx: &StepContext) {
    let count = state.cell_count;
    let (a, b) = (connection.cell_a, connection.cell_b);
    if a >= count || b >= count || a == b {
        return;
    }
    let dt = ctx.dt;

    let pos_a = state.positions[a];
    let pos_b = state.positions[b];
    let rot_a = state.rotations[a];
    let rot_b = state.rotations[b];

    // --- Distance spring ---
    let delta = pos_b - pos_a;
    let dist = delta.length();
    if dist >= MIN_BOND_LENGTH {
        let dir = delta / dist;
        let relative_speed = (state.velocities[b] - state.velocities[a]).dot(dir);
        let force = (dist - connection.rest_length) * connection.stiffness
            + relative_speed * connection.damping;

        if state.masses[a] > 0.0 {
            state.velocity_deltas.add(a, dir * (force / state.masses[a] * dt));
        }
        if state.masses[b] > 0.0 {
            state.velocity_deltas.add(b, -dir * (force / state.masses[b] * dt));
        }
    }

    // --- Anchor alignment ---
    if connection.anchor_enabled {
        let anchor_point_a = pos_a + rot_a * connection.anchor_a * state.radii[a];
        let anchor_point_b = pos_b + rot_b * connection.anchor_b * state.radii[b];

        let gain = connection.anchor_stiffness * dt * ctx.config.anchor_correction_scale;
        if let Some(dq) = anchor_correction(rot_a, connection.anchor_a, anchor_point_b - pos_a, gain) {
            state.rotation_deltas.add(a, dq);
        }
        if let Some(dq) = anchor_correction(rot_b, connection.anchor_b, anchor_point_a - pos_b, gain) {
            state.rotation_deltas.add(b, dq);
        }
    }

    // --- Relative orientation ---
    let strength = connection.orientation_stiffness * ctx.config.orientation_strength_multiplier * dt;
    if let Some((dq_a, dq_b)) =
        orientation_correction(rot_a, rot_b, connection.initial_relative_orientation, strength)
    {
        state.rotation_deltas.add(a, dq_a);
        state.rotation_deltas.add(b, dq_b);
    }
}

/// Rotation delta (`new - old`, four components) that turns a cell's world
/// anchor toward `desired`.
///
/// The correction angle is scaled by `gain` and by how misaligned the
/// anchor is, and never overshoots the full angle.
fn anchor_correction(rotation: Quat, local_anchor: Vec3, desired: Vec3, gain: f32) -> Option<Quat> {
    let anchor = (rotation * local_anchor).normalize_or_zero();
    let desired = desired.normalize_or_zero();
    if anchor == Vec3::ZERO || desired == Vec3::ZERO {
        return None;
    }

    let cross = anchor.cross(desired);
    let sin = cross.length();
    if sin < MIN_ANCHOR_SIN {
        return None;
    }
    let angle = sin.atan2(anchor.dot(desired));
    let effectiveness = (1.0 - anchor.dot(desired)).clamp(0.0, 1.0);
    let corrective = (angle * gain * effectiveness).clamp(0.0, angle);
    if corrective <= 0.0 {
        return None;
    }

    let turn = Quat::from_axis_angle(cross / sin, corrective);
    Some(turn * rotation - rotation)
}

/// Equal and opposite rotation deltas that move `conjugate(a) * b` toward
/// `target`. `strength` is the fraction of the error removed this step.
fn orientation_correction(rot_a: Quat, rot_b: Quat, target: Quat, strength: f32) -> Option<(Quat, Quat)> {
    let current = rot_a.conjugate() * rot_b;
    let correction = target * current.conjugate();

    let xyz = Vec3::new(correction.x, correction.y, correction.z);
    let sin_half = xyz.length();
    let angle = 2.0 * sin_half.atan2(correction.w.abs());
    if !(angle > MIN_ORIENTATION_ERROR) || sin_half <= 0.0 {
        return None;
    }

    // The correction lives in A's frame; take the short way round
    let mut axis = xyz / sin_half;
    if correction.w < 0.0 {
        axis = -axis;
    }
    let world_axis = (rot_a * axis).normalize_or_zero();
    if world_axis == Vec3::ZERO {
        return None;
    }

    let applied = angle * strength.clamp(0.0, 1.0);
    let half = applied * 0.5;
    let turn_b = Quat::from_axis_angle(world_axis, half);
    let turn_a = Quat::from_axis_angle(world_axis, -half);
    Some((turn_a * rot_a - rot_a, turn_b * rot_b - rot_b))
}

// =============================================================================
// Phase 2: per cell
// =============================================================================

/// Drain the adhesion accumulators into velocities and rotations.
///
/// Rotations are renormalized; a rotation whose sum collapses to zero length
/// is left unchanged.
pub fn apply_adhesion_deltas(state: &mut CanonicalState) {
    let count = state.cell_count;
    let CanonicalState {
        velocities,
        rotations,
        velocity_deltas,
        rotation_deltas,
        ..
    } = state;
    let velocity_deltas = &*velocity_deltas;
    let rotation_deltas = &*rotation_deltas;

    velocities[..count]
        .par_iter_mut()
        .zip(rotations[..count].par_iter_mut())
        .enumerate()
        .with_min_len(MIN_PARALLEL_CHUNK)
        .for_each(|(i, (velocity, rotation))| {
            let dv = velocity_deltas.take(i);
            if dv.is_finite() {
                *velocity += dv;
            }

            let dq = rotation_deltas.take(i);
            let updated = *rotation + dq;
            if updated.is_finite() && updated.length_squared() > 1e-12 {
                *rotation = updated.normalize();
            }
        });
}
