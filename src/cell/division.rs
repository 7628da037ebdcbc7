// Cell division logic
//
// Division runs in two phases so the active-cell count never changes while a
// parallel pass is looking at it:
// 1. `schedule` advances every timer and plans splits for the cells whose
//    timer expired, in index order, until the free slots run out.
// 2. `apply` writes the planned daughters serially: daughter A overwrites the
//    parent slot, daughter B is appended at `cell_count`.

use glam::{EulerRot, Quat, Vec3};
use rayon::prelude::*;
use crate::genome::{AdhesionSettings, Genome, ModeSettings};
use crate::simulation::canonical_state::{CanonicalState, NewCell};
use crate::simulation::cpu_physics::StepContext;

/// Slack on the split timer comparison
pub const SPLIT_TIMER_EPSILON: f32 = 1e-5;

const MIN_PARALLEL_CHUNK: usize = 500;

/// Notification sent to the bond manager for every applied split
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitEvent {
    pub parent: usize,
    /// Always equal to `parent`: daughter A reuses the parent slot
    pub daughter_a: usize,
    pub daughter_b: usize,
    pub parent_mode: i32,
    pub mode_a: i32,
    pub mode_b: i32,
    pub keep_adhesion_a: bool,
    pub keep_adhesion_b: bool,
    /// Split axis in the parent's local frame; daughter A sits along +axis
    pub split_direction_local: Vec3,
    /// Daughter orientation offsets relative to the parent
    pub child_a_orientation: Quat,
    pub child_b_orientation: Quat,
    /// Settings for a bond between the daughters, if the parent mode makes one
    pub sibling_bond: Option<AdhesionSettings>,
}

/// A planned split waiting for the batch apply.
#[derive(Debug, Clone, Copy)]
pub struct PendingSplit {
    pub parent: usize,
    pub parent_mode: i32,
    pub daughter_a: NewCell,
    pub daughter_b: NewCell,
    pub keep_adhesion_a: bool,
    pub keep_adhesion_b: bool,
    pub split_direction_local: Vec3,
    pub child_a_orientation: Quat,
    pub child_b_orientation: Quat,
    pub sibling_bond: Option<AdhesionSettings>,
}

impl PendingSplit {
    fn into_event(self, daughter_b: usize) -> SplitEvent {
        SplitEvent {
            parent: self.parent,
            daughter_a: self.parent,
            daughter_b,
            parent_mode: self.parent_mode,
            mode_a: self.daughter_a.mode_index,
            mode_b: self.daughter_b.mode_index,
            keep_adhesion_a: self.keep_adhesion_a,
            keep_adhesion_b: self.keep_adhesion_b,
            split_direction_local: self.split_direction_local,
            child_a_orientation: self.child_a_orientation,
            child_b_orientation: self.child_b_orientation,
            sibling_bond: self.sibling_bond,
        }
    }
}

/// Split axis of a mode in its cell's local frame (pitch/yaw in degrees).
pub fn split_direction_local(mode: &ModeSettings) -> Vec3 {
    let pitch = mode.parent_split_direction.x.to_radians();
    let yaw = mode.parent_split_direction.y.to_radians();
    Quat::from_euler(EulerRot::YXZ, yaw, pitch, 0.0) * Vec3::Z
}

/// Whether cell `i` should split this step.
fn is_ready(state: &CanonicalState, genome: &Genome, i: usize) -> bool {
    let Some(mode) = genome.mode(state.mode_indices[i]) else {
        return false;
    };
    if !mode.can_split() {
        return false;
    }
    if mode.max_splits >= 0 && state.split_counts[i] >= mode.max_splits {
        return false;
    }
    state.split_timers[i] >= mode.split_interval - SPLIT_TIMER_EPSILON
}

fn plan_split(state: &CanonicalState, ctx: &StepContext, i: usize) -> Option<PendingSplit> {
    let genome = ctx.genome;
    let parent_mode = state.mode_indices[i];
    let mode = genome.mode(parent_mode)?;

    let local_direction = split_direction_local(mode);
    let rotation = state.rotations[i];
    let direction = rotation * local_direction;

    let position = state.positions[i];
    let velocity = state.velocities[i];
    let offset = direction * (state.radii[i] * ctx.config.split_offset_fraction);
    let separation = direction * ctx.config.split_separation_speed;

    // Reaching max_splits may switch the daughters to follow-up modes
    let split_count = state.split_counts[i];
    let will_reach_max_splits = mode.max_splits >= 0 && split_count + 1 >= mode.max_splits;
    let requested_a = if will_reach_max_splits && mode.mode_a_after_splits >= 0 {
        mode.mode_a_after_splits
    } else {
        mode.child_a.mode_number
    };
    let requested_b = if will_reach_max_splits && mode.mode_b_after_splits >= 0 {
        mode.mode_b_after_splits
    } else {
        mode.child_b.mode_number
    };
    let mode_a = genome.resolve_child_mode(requested_a, parent_mode);
    let mode_b = genome.resolve_child_mode(requested_b, parent_mode);

    let daughter_split_count = |child_mode: i32| {
        if child_mode != parent_mode {
            0
        } else {
            split_count + 1
        }
    };

    let daughter = |sign: f32, orientation: Quat, child_mode: i32| NewCell {
        position: position + offset * sign,
        velocity: velocity + separation * sign,
        rotation: (rotation * orientation).normalize(),
        angular_velocity: Vec3::ZERO,
        radius: state.radii[i],
        drag_coefficient: state.drag_coefficients[i],
        repulsion_strength: state.repulsion_strengths[i],
        mode_index: child_mode,
        split_count: daughter_split_count(child_mode),
    };

    Some(PendingSplit {
        parent: i,
        parent_mode,
        daughter_a: daughter(1.0, mode.child_a.orientation, mode_a),
        daughter_b: daughter(-1.0, mode.child_b.orientation, mode_b),
        keep_adhesion_a: mode.child_a.keep_adhesion,
        keep_adhesion_b: mode.child_b.keep_adhesion,
        split_direction_local: local_direction,
        child_a_orientation: mode.child_a.orientation,
        child_b_orientation: mode.child_b.orientation,
        sibling_bond: mode.parent_make_adhesion.then_some(mode.adhesion_settings),
    })
}

/// Per-step split planner with a reusable pending queue.
#[derive(Debug, Default)]
pub struct DivisionScheduler {
    pending: Vec<PendingSplit>,
    capacity_warning_issued: bool,
    dropped_splits: u64,
}

impl DivisionScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Splits planned by the last `schedule` and not yet applied.
    pub fn pending(&self) -> &[PendingSplit] {
        &self.pending
    }

    /// Splits dropped for lack of capacity since the last reset.
    pub fn dropped_splits(&self) -> u64 {
        self.dropped_splits
    }

    /// Forget queued splits and re-arm the capacity warning.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.capacity_warning_issued = false;
        self.dropped_splits = 0;
    }

    /// Advance split timers by `dt` and queue a split for every expired cell
    /// that still fits in the pool. Returns the number queued.
    ///
    /// A split with no free slot is dropped and the parent's timer restarts.
    pub fn schedule(&mut self, state: &mut CanonicalState, ctx: &StepContext) -> usize {
        self.pending.clear();
        let count = state.cell_count;
        let dt = ctx.dt;

        state.split_timers[..count]
            .par_iter_mut()
            .with_min_len(MIN_PARALLEL_CHUNK)
            .for_each(|timer| *timer += dt);

        let expired: Vec<usize> = {
            let view = &*state;
            (0..count)
                .into_par_iter()
                .with_min_len(MIN_PARALLEL_CHUNK)
                .filter(|&i| is_ready(view, ctx.genome, i))
                .collect()
        };

        let mut free_slots = state.free_slots();
        for i in expired {
            if free_slots == 0 {
                state.split_timers[i] = 0.0;
                self.dropped_splits += 1;
                if !self.capacity_warning_issued {
                    log::warn!(
                        "Cell pool full ({} cells): dropping scheduled divisions",
                        state.capacity
                    );
                    self.capacity_warning_issued = true;
                }
                continue;
            }
            if let Some(split) = plan_split(state, ctx, i) {
                self.pending.push(split);
                free_slots -= 1;
            }
        }

        self.pending.len()
    }

    /// Write every queued split into `state` and return the resulting events.
    pub fn apply(&mut self, state: &mut CanonicalState) -> Vec<SplitEvent> {
        let mut events = Vec::with_capacity(self.pending.len());
        for split in self.pending.drain(..) {
            let daughter_b = state.cell_count;
            if daughter_b >= state.capacity {
                break;
            }
            state.write_cell(split.parent, &split.daughter_a);
            state.write_cell(daughter_b, &split.daughter_b);
            state.cell_count += 1;
            events.push(split.into_event(daughter_b));
        }
        events
    }
}
