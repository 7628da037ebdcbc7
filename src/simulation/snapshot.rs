//! Versioned, non-blocking readback of simulation state.
//!
//! After every completed step the simulation copies the renderer-facing
//! arrays into one immutable [`StateSnapshot`] and hands an `Arc` of it to each
//! subscriber over a small bounded channel. Positions, rotations and the
//! active count inside a snapshot always come from the same step. A reader
//! that falls behind loses intermediate frames; the simulation never waits.

use std::sync::Arc;
use bytemuck::{Pod, Zeroable};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use glam::{Quat, Vec3};
use crate::simulation::canonical_state::CanonicalState;

/// Frames buffered per subscriber before new ones are dropped
pub const SNAPSHOT_CHANNEL_CAPACITY: usize = 4;

/// Cell state after one completed step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateSnapshot {
    /// Number of steps completed when this snapshot was taken
    pub step: u64,
    pub cell_count: usize,
    pub positions: Vec<Vec3>,
    pub rotations: Vec<Quat>,
    pub radii: Vec<f32>,
    pub mode_indices: Vec<i32>,
}

/// Per-cell instance record laid out for direct upload to a vertex buffer.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct CellInstance {
    pub position: [f32; 3],
    pub radius: f32,
    pub rotation: [f32; 4],
    pub mode_index: i32,
    pub _padding: [u32; 3],
}

impl StateSnapshot {
    /// Copy the active part of `state`.
    pub fn capture(state: &CanonicalState, step: u64) -> Self {
        let count = state.cell_count;
        Self {
            step,
            cell_count: count,
            positions: state.positions[..count].to_vec(),
            rotations: state.rotations[..count].to_vec(),
            radii: state.radii[..count].to_vec(),
            mode_indices: state.mode_indices[..count].to_vec(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cell_count == 0
    }

    /// Instance records for every cell in the snapshot.
    pub fn instances(&self) -> Vec<CellInstance> {
        (0..self.cell_count)
            .map(|i| CellInstance {
                position: self.positions[i].to_array(),
                radius: self.radii[i],
                rotation: self.rotations[i].to_array(),
                mode_index: self.mode_indices[i],
                _padding: [0; 3],
            })
            .collect()
    }
}

/// Fan-out side of the readback channel, owned by the simulation.
#[derive(Debug, Default)]
pub struct SnapshotPublisher {
    subscribers: Vec<Sender<Arc<StateSnapshot>>>,
}

impl SnapshotPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new reader. It starts with `current` if one is given.
    pub fn subscribe(&mut self, current: Option<Arc<StateSnapshot>>) -> SnapshotReader {
        let (sender, receiver) = crossbeam_channel::bounded(SNAPSHOT_CHANNEL_CAPACITY);
        if let Some(snapshot) = current {
            let _ = sender.try_send(snapshot);
        }
        self.subscribers.push(sender);
        SnapshotReader {
            receiver,
            latest: None,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Offer `snapshot` to every reader without blocking. Readers whose
    /// buffer is full miss this frame; dropped readers are forgotten.
    pub fn publish(&mut self, snapshot: &Arc<StateSnapshot>) {
        self.subscribers.retain(|sender| match sender.try_send(Arc::clone(snapshot)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::trace!("Snapshot reader lagging, dropped step {}", snapshot.step);
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }
}

/// Consumer side of the readback channel.
#[derive(Debug)]
pub struct SnapshotReader {
    receiver: Receiver<Arc<StateSnapshot>>,
    latest: Option<Arc<StateSnapshot>>,
}

impl SnapshotReader {
    /// Drain everything queued and return the newest snapshot seen so far.
    /// Never blocks.
    pub fn latest(&mut self) -> Option<Arc<StateSnapshot>> {
        if let Some(newest) = self.receiver.try_iter().last() {
            self.latest = Some(newest);
        }
        self.latest.clone()
    }
}
