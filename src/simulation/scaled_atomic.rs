//! Fixed-point atomic accumulators for concurrent scatter writes.
//!
//! Several passes add contributions to a body they do not own (rolling
//! friction torque on the neighbor, adhesion deltas on both bond endpoints).
//! Float addition is neither atomic nor associative, so every contribution is
//! quantised to a scaled `i64` and added with `fetch_add`. Integer addition is
//! associative, which makes the descaled sum independent of task interleaving.

use glam::{Quat, Vec3};
use std::sync::atomic::{AtomicI64, Ordering};

/// Maximum number of scalar lanes a value can occupy.
pub const MAX_LANES: usize = 4;

/// A value that can be split into scalar lanes for fixed-point accumulation.
pub trait FixedPointValue: Copy {
    /// Number of lanes actually used
    const LANES: usize;

    fn to_lanes(self) -> [f32; MAX_LANES];

    fn from_lanes(lanes: [f32; MAX_LANES]) -> Self;
}

impl FixedPointValue for f32 {
    const LANES: usize = 1;

    fn to_lanes(self) -> [f32; MAX_LANES] {
        [self, 0.0, 0.0, 0.0]
    }

    fn from_lanes(lanes: [f32; MAX_LANES]) -> Self {
        lanes[0]
    }
}

impl FixedPointValue for Vec3 {
    const LANES: usize = 3;

    fn to_lanes(self) -> [f32; MAX_LANES] {
        [self.x, self.y, self.z, 0.0]
    }

    fn from_lanes(lanes: [f32; MAX_LANES]) -> Self {
        Vec3::new(lanes[0], lanes[1], lanes[2])
    }
}

/// Quaternions are accumulated component-wise as raw 4-vectors. The sum is
/// generally not a unit quaternion; callers renormalize after applying it.
impl FixedPointValue for Quat {
    const LANES: usize = 4;

    fn to_lanes(self) -> [f32; MAX_LANES] {
        [self.x, self.y, self.z, self.w]
    }

    fn from_lanes(lanes: [f32; MAX_LANES]) -> Self {
        Quat::from_xyzw(lanes[0], lanes[1], lanes[2], lanes[3])
    }
}

/// Per-body accumulator of `T` stored as scaled atomic integers.
///
/// `add` may be called concurrently from any number of tasks through a shared
/// reference. `take` reads one slot back as floating point and zeroes it; it is
/// meant to run in a later pass, after the writers have finished.
pub struct ScaledAtomicAccumulator<T: FixedPointValue> {
    slots: Vec<[AtomicI64; MAX_LANES]>,
    scale: f32,
    inv_scale: f64,
    _marker: std::marker::PhantomData<T>,
}

impl<T: FixedPointValue> ScaledAtomicAccumulator<T> {
    pub fn new(len: usize, scale: f32) -> Self {
        Self {
            slots: (0..len)
                .map(|_| std::array::from_fn(|_| AtomicI64::new(0)))
                .collect(),
            scale,
            inv_scale: 1.0 / scale as f64,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Quantise a single lane. NaN quantises to zero and infinities saturate,
    /// so a bad contribution can never poison the slot with NaN.
    #[inline]
    fn quantize(&self, value: f32) -> i64 {
        (value as f64 * self.scale as f64).round() as i64
    }

    /// Atomically add `value` to slot `index`. Out-of-range indices are ignored.
    #[inline]
    pub fn add(&self, index: usize, value: T) {
        let Some(slot) = self.slots.get(index) else {
            return;
        };
        let lanes = value.to_lanes();
        for lane in 0..T::LANES {
            let q = self.quantize(lanes[lane]);
            if q != 0 {
                slot[lane].fetch_add(q, Ordering::Relaxed);
            }
        }
    }

    /// Read slot `index` without clearing it.
    pub fn load(&self, index: usize) -> T {
        let mut lanes = [0.0; MAX_LANES];
        if let Some(slot) = self.slots.get(index) {
            for lane in 0..T::LANES {
                lanes[lane] = (slot[lane].load(Ordering::Relaxed) as f64 * self.inv_scale) as f32;
            }
        }
        T::from_lanes(lanes)
    }

    /// Read slot `index` and reset it to zero.
    pub fn take(&self, index: usize) -> T {
        let mut lanes = [0.0; MAX_LANES];
        if let Some(slot) = self.slots.get(index) {
            for lane in 0..T::LANES {
                lanes[lane] = (slot[lane].swap(0, Ordering::Relaxed) as f64 * self.inv_scale) as f32;
            }
        }
        T::from_lanes(lanes)
    }

    /// Zero every slot.
    pub fn reset_all(&self) {
        for slot in &self.slots {
            for lane in slot {
                lane.store(0, Ordering::Relaxed);
            }
        }
    }
}

impl<T: FixedPointValue> std::fmt::Debug for ScaledAtomicAccumulator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScaledAtomicAccumulator")
            .field("len", &self.slots.len())
            .field("scale", &self.scale)
            .finish()
    }
}
