//! # Bio-Spheres Core: Many-Body Cell Physics
//! 
//! Bio-Spheres Core simulates spherical rigid bodies ("cells") that repel on contact,
//! exchange rolling-friction torque, rotate via quaternions, can be elastically bonded
//! ("adhesion"), and split into two daughters under a timer driven by a per-cell mode.
//! 
//! ## Architecture Overview
//! 
//! The codebase is organized into four subsystems:
//! 
//! ### 1. Simulation Engine ([`simulation`])
//! 
//! The core physics and state management:
//! - [`simulation::CanonicalState`] - Structure-of-Arrays (SoA) layout for all cell data
//! - [`simulation::SpatialHashGrid`] - Uniform grid with lock-free bucket chains
//! - [`simulation::cpu_physics`] - Contact forces, damping, motion and rotation passes
//! - [`simulation::CellSimulation`] - Fixed-timestep driver and snapshot publisher
//! - [`simulation::PhysicsConfig`] - Configurable physics parameters
//! 
//! **Key Design**: Uses SoA layout for cache-friendly iteration over large cell populations.
//! 
//! ### 2. Cells ([`cell`])
//! 
//! Per-cell behaviour beyond rigid-body motion:
//! - [`cell::division`] - Split timers and the batched division pass
//! - [`cell::adhesion_forces`] - Two-phase adhesion constraint solve
//! - [`cell::AdhesionConnectionManager`] - Bond bookkeeping and re-homing on split
//! 
//! ### 3. Genome System ([`genome`])
//! 
//! - [`genome::Genome`] - Mode-based cell behavior definition
//! - [`genome::serialization`] - YAML `.genome` files
//! 
//! ### 4. Input ([`input`])
//! 
//! - [`input::CellDragger`] - Pull a single selected cell toward a target
//! 
//! ## Step Data Flow
//! 
//! ```text
//! Division → Grid Build → Contact Forces → Damping → Motion → Rotation → Adhesion → Snapshot
//! ```
//! 
//! Each pass is a rayon parallel loop and completes before the next begins. Values
//! scattered by many tasks at once (neighbour torque, adhesion deltas) go through
//! fixed-point atomic accumulators so the result does not depend on thread timing.
//! 
//! ## Dependencies
//! 
//! - **Math**: `glam` (SIMD math types), `bytemuck` (safe transmutation)
//! - **Concurrency**: `rayon` (parallel iteration), `crossbeam-channel` (messaging)
//! - **Serialization**: `serde` + `ron` (config files), `serde_yaml` (genomes)
//! - **Diagnostics**: `log` + `env_logger`, `thiserror`

pub mod app;
pub mod cell;
pub mod genome;
pub mod input;
pub mod simulation;
