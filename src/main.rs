//! # Bio-Spheres Core Entry Point
//! 
//! Runs the cell simulation headless for a fixed number of steps and logs
//! population statistics. Set `RUST_LOG=info` to see progress.
//! 
//! See the `lib.rs` module documentation for detailed architecture information.

fn main() {
    bio_spheres_core::app::run();
}
