//! Headless runner.
//!
//! ```text
//! bio-spheres-core [--config physics.ron] [--genome organism.genome] [--steps N]
//! ```

use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;
use crate::genome::{Genome, GenomeDeserializeError};
use crate::simulation::physics_config::{ConfigLoadError, PhysicsConfig};
use crate::simulation::{CellSimulation, SimulationError};

/// Steps simulated when `--steps` is not given (10 s at 64 Hz)
const DEFAULT_STEPS: u64 = 640;
/// Steps between progress log lines
const PROGRESS_INTERVAL: u64 = 64;

#[derive(Error, Debug)]
pub enum RunError {
    #[error("invalid arguments: {0}")]
    Args(String),
    #[error("failed to load physics config: {0}")]
    Config(#[from] ConfigLoadError),
    #[error("failed to load genome: {0}")]
    Genome(#[from] GenomeDeserializeError),
    #[error(transparent)]
    Simulation(#[from] SimulationError),
}

#[derive(Debug, Default, PartialEq)]
pub struct RunOptions {
    pub config_path: Option<PathBuf>,
    pub genome_path: Option<PathBuf>,
    pub steps: Option<u64>,
}

impl RunOptions {
    pub fn parse<I>(args: I) -> Result<Self, RunError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut options = Self::default();
        let mut args = args.into_iter();
        while let Some(flag) = args.next() {
            let mut value = || {
                args.next()
                    .ok_or_else(|| RunError::Args(format!("{flag} needs a value")))
            };
            match flag.as_str() {
                "--config" => options.config_path = Some(PathBuf::from(value()?)),
                "--genome" => options.genome_path = Some(PathBuf::from(value()?)),
                "--steps" => {
                    let raw = value()?;
                    let steps = raw
                        .parse::<u64>()
                        .map_err(|_| RunError::Args(format!("--steps expects a number, got '{raw}'")))?;
                    options.steps = Some(steps);
                }
                other => return Err(RunError::Args(format!("unknown argument '{other}'"))),
            }
        }
        Ok(options)
    }
}

/// Load inputs, run the simulation and log population statistics.
pub fn run_with(options: &RunOptions) -> Result<(), RunError> {
    let config = match &options.config_path {
        Some(path) => PhysicsConfig::load_from_file(path)?,
        None => PhysicsConfig::default(),
    };
    let genome = match &options.genome_path {
        Some(path) => Genome::load_from_file(path)?,
        None => Genome::default(),
    };
    let steps = options.steps.unwrap_or(DEFAULT_STEPS);

    let mut simulation = CellSimulation::with_default_bonds(config, genome)?;
    let started = Instant::now();
    let mut splits = 0;

    for _ in 0..steps {
        splits += simulation.step().len();
        let step = simulation.step_count();
        if step % PROGRESS_INTERVAL == 0 {
            log::info!(
                "step {:>6}: {} cells, {} bonds, {} splits so far",
                step,
                simulation.cell_count(),
                simulation.bonds().active_count(),
                splits
            );
        }
    }

    let elapsed = started.elapsed().as_secs_f32();
    log::info!(
        "Finished {} steps in {:.2}s ({:.1} steps/s): {} cells, {} splits, {} dropped",
        steps,
        elapsed,
        steps as f32 / elapsed.max(f32::EPSILON),
        simulation.cell_count(),
        splits,
        simulation.dropped_splits()
    );
    Ok(())
}

pub fn run() {
    env_logger::init();

    let result = RunOptions::parse(std::env::args().skip(1)).and_then(|options| run_with(&options));
    if let Err(err) = result {
        log::error!("{err}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_all_flags() {
        let options = RunOptions::parse(args(&["--config", "a.ron", "--genome", "b.genome", "--steps", "12"])).unwrap();
        assert_eq!(options.config_path, Some(PathBuf::from("a.ron")));
        assert_eq!(options.genome_path, Some(PathBuf::from("b.genome")));
        assert_eq!(options.steps, Some(12));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(matches!(RunOptions::parse(args(&["--steps"])), Err(RunError::Args(_))));
        assert!(matches!(RunOptions::parse(args(&["--steps", "many"])), Err(RunError::Args(_))));
        assert!(matches!(RunOptions::parse(args(&["--fast"])), Err(RunError::Args(_))));
    }

    #[test]
    fn test_run_with_defaults() {
        let options = RunOptions {
            steps: Some(8),
            ..Default::default()
        };
        assert!(run_with(&options).is_ok());
    }

    #[test]
    fn test_run_with_missing_config_file() {
        let options = RunOptions {
            config_path: Some(PathBuf::from("/nonexistent/physics.ron")),
            steps: Some(1),
            ..Default::default()
        };
        assert!(matches!(run_with(&options), Err(RunError::Config(_))));
    }
}
