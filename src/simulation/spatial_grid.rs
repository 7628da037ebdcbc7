//! Uniform Spatial Hash Grid for Neighbor Queries
//!
//! Divides the world cube `[-world_radius, world_radius]³` into a fixed number of
//! buckets per axis. Each bucket holds the head of a singly linked chain of cell
//! indices; a parallel `next` array stores the links. The grid is rebuilt from
//! scratch every step, so no per-bucket allocation ever happens.

use glam::{IVec3, UVec3, Vec3};
use rayon::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};
use crate::simulation::physics_config::MAX_GRID_RESOLUTION;

/// Sentinel for an empty bucket or the end of a chain
pub const EMPTY_BUCKET: u32 = u32::MAX;

/// Below this many cells the rebuild runs sequentially
const PARALLEL_THRESHOLD: usize = 500;

/// Offsets of the 3×3×3 neighborhood around a bucket
const NEIGHBOR_OFFSETS: [IVec3; 27] = {
    let mut offsets = [IVec3::ZERO; 27];
    let mut i = 0;
    let mut z = -1;
    while z <= 1 {
        let mut y = -1;
        while y <= 1 {
            let mut x = -1;
            while x <= 1 {
                offsets[i] = IVec3::new(x, y, z);
                i += 1;
                x += 1;
            }
            y += 1;
        }
        z += 1;
    }
    offsets
};

/// Bucket-chain spatial hash over a fixed uniform grid.
///
/// Insertion is lock-free: the inserting task swaps itself in as the bucket
/// head and links to the previous head. No index is ever lost under concurrent
/// insertion, but the order inside a bucket depends on scheduling.
pub struct SpatialHashGrid {
    /// Number of buckets in each dimension
    pub grid_dimensions: UVec3,
    /// Half-extent of the gridded cube
    pub world_radius: f32,
    /// Edge length of each bucket
    pub cell_size: f32,
    bucket_heads: Vec<AtomicU32>,
    next: Vec<AtomicU32>,
}

impl SpatialHashGrid {
    /// Create a grid with `grid_dim` buckets per axis spanning the given world
    /// radius, able to hold up to `max_cells` cell indices. `grid_dim` is
    /// clamped to `1..=MAX_GRID_RESOLUTION`.
    pub fn new(grid_dim: u32, world_radius: f32, max_cells: usize) -> Self {
        let grid_dim = grid_dim.clamp(1, MAX_GRID_RESOLUTION);
        let grid_dimensions = UVec3::splat(grid_dim);
        let bucket_count = (grid_dim as usize).pow(3);

        Self {
            grid_dimensions,
            world_radius,
            cell_size: (world_radius * 2.0) / grid_dim as f32,
            bucket_heads: (0..bucket_count).map(|_| AtomicU32::new(EMPTY_BUCKET)).collect(),
            next: (0..max_cells).map(|_| AtomicU32::new(EMPTY_BUCKET)).collect(),
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.bucket_heads.len()
    }

    pub fn capacity(&self) -> usize {
        self.next.len()
    }

    /// Convert a world position to clamped grid coordinates.
    ///
    /// Positions outside the gridded cube land in the nearest boundary bucket.
    pub fn world_to_grid(&self, position: Vec3) -> IVec3 {
        let grid_pos = ((position + Vec3::splat(self.world_radius)) / self.cell_size).floor();
        let max_coord = self.grid_dimensions.x as i32 - 1;
        // `as i32` saturates and maps NaN to 0
        IVec3::new(
            (grid_pos.x as i32).clamp(0, max_coord),
            (grid_pos.y as i32).clamp(0, max_coord),
            (grid_pos.z as i32).clamp(0, max_coord),
        )
    }

    #[inline]
    fn in_bounds(&self, coord: IVec3) -> bool {
        let dim = self.grid_dimensions.as_ivec3();
        coord.cmpge(IVec3::ZERO).all() && coord.cmplt(dim).all()
    }

    #[inline]
    fn bucket_index(&self, coord: IVec3) -> usize {
        let dim = self.grid_dimensions.x as usize;
        coord.x as usize + coord.y as usize * dim + coord.z as usize * dim * dim
    }

    /// Empty every bucket.
    pub fn clear(&self) {
        if self.bucket_heads.len() > PARALLEL_THRESHOLD {
            self.bucket_heads
                .par_iter()
                .for_each(|head| head.store(EMPTY_BUCKET, Ordering::Relaxed));
        } else {
            for head in &self.bucket_heads {
                head.store(EMPTY_BUCKET, Ordering::Relaxed);
            }
        }
    }

    /// Push `index` onto the chain of the bucket containing `position`.
    ///
    /// Safe to call concurrently for distinct indices. Indices beyond the
    /// grid's capacity are ignored.
    pub fn insert(&self, index: usize, position: Vec3) {
        let Some(link) = self.next.get(index) else {
            return;
        };
        let bucket = self.bucket_index(self.world_to_grid(position));
        let previous_head = self.bucket_heads[bucket].swap(index as u32, Ordering::AcqRel);
        link.store(previous_head, Ordering::Release);
    }

    /// Clear and re-insert the first `cell_count` positions.
    pub fn rebuild(&self, positions: &[Vec3], cell_count: usize) {
        self.clear();
        let count = cell_count.min(positions.len()).min(self.next.len());

        if count > PARALLEL_THRESHOLD {
            positions[..count]
                .par_iter()
                .enumerate()
                .for_each(|(i, &position)| self.insert(i, position));
        } else {
            for (i, &position) in positions[..count].iter().enumerate() {
                self.insert(i, position);
            }
        }
    }

    /// Iterate over every indexed cell in the 3×3×3 block of buckets around
    /// `position`. Buckets outside the grid are skipped.
    pub fn neighbors(&self, position: Vec3) -> NeighborIter<'_> {
        NeighborIter {
            grid: self,
            center: self.world_to_grid(position),
            offset_index: 0,
            current: EMPTY_BUCKET,
        }
    }

    /// Indices stored in the single bucket containing `position`.
    pub fn bucket_contents(&self, position: Vec3) -> Vec<usize> {
        let bucket = self.bucket_index(self.world_to_grid(position));
        let mut contents = Vec::new();
        let mut current = self.bucket_heads[bucket].load(Ordering::Acquire);
        while current != EMPTY_BUCKET {
            contents.push(current as usize);
            current = self.next[current as usize].load(Ordering::Acquire);
        }
        contents
    }
}

/// Iterator over the cells of a 27-bucket neighborhood.
pub struct NeighborIter<'a> {
    grid: &'a SpatialHashGrid,
    center: IVec3,
    offset_index: usize,
    current: u32,
}

impl Iterator for NeighborIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        loop {
            if self.current != EMPTY_BUCKET {
                let index = self.current;
                self.current = self.grid.next[index as usize].load(Ordering::Acquire);
                return Some(index as usize);
            }

            if self.offset_index >= NEIGHBOR_OFFSETS.len() {
                return None;
            }

            let coord = self.center + NEIGHBOR_OFFSETS[self.offset_index];
            self.offset_index += 1;
            if !self.grid.in_bounds(coord) {
                continue;
            }
            let bucket = self.grid.bucket_index(coord);
            self.current = self.grid.bucket_heads[bucket].load(Ordering::Acquire);
        }
    }
}
