use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Largest accepted grid resolution (512³ buckets)
pub const MAX_GRID_RESOLUTION: u32 = 512;

/// Physics configuration for the cell simulation.
///
/// Loaded once at startup (or built from [`Default`]) and validated before any
/// simulation state is created. All passes read it by reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Fixed timestep for physics integration (64 Hz ≈ 15.6ms)
    pub fixed_timestep: f32,

    /// Spherical boundary radius. Cells are contained inside this sphere and
    /// the spatial grid spans `[-world_radius, world_radius]` on each axis.
    pub world_radius: f32,

    /// Number of grid cells per axis
    pub grid_resolution: u32,

    /// Size of the preallocated cell pool
    pub max_cells: usize,

    /// Density used to derive mass and moment of inertia from radius
    pub cell_density: f32,

    /// Radius given to cells spawned without an explicit radius
    pub default_radius: f32,

    /// Per-cell linear drag coefficient assigned at spawn
    pub default_drag: f32,

    /// Global multiplier applied on top of each cell's drag coefficient
    pub global_drag_multiplier: f32,

    /// Exponential angular damping rate (applied as exp(-torque_damping * dt))
    pub torque_damping: f32,

    /// Per-cell repulsion strength assigned at spawn
    pub repulsion_strength: f32,

    /// Scales contact slip speed before the rolling-friction power law
    pub rolling_friction_factor: f32,

    /// Friction coefficient against the world boundary
    pub boundary_friction: f32,

    /// Speed given to each daughter along the split axis, in opposite directions
    pub split_separation_speed: f32,

    /// Daughter offset from the parent center, as a fraction of parent radius
    pub split_offset_fraction: f32,

    /// Tunable gain on the anchor alignment correction
    pub anchor_correction_scale: f32,

    /// Tunable gain on the relative orientation correction
    pub orientation_strength_multiplier: f32,

    /// Scale factor for fixed-point accumulators (value × scale → i64)
    pub fixed_point_scale: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            fixed_timestep: 1.0 / 64.0, // 64 Hz
            world_radius: 200.0,
            grid_resolution: 64,
            max_cells: 20_000,
            cell_density: 1.0,
            default_radius: 1.0,
            default_drag: 0.5,
            global_drag_multiplier: 1.0,
            torque_damping: 2.0,
            repulsion_strength: 300.0,
            rolling_friction_factor: 0.5,
            boundary_friction: 0.3,
            split_separation_speed: 0.1,
            split_offset_fraction: 0.25,
            anchor_correction_scale: 5.0,
            orientation_strength_multiplier: 2.0,
            fixed_point_scale: 1_048_576.0, // 2^20
        }
    }
}

/// Invalid physics configuration values.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("fixed_timestep must be positive and finite, got {0}")]
    InvalidTimestep(f32),
    #[error("world_radius must be positive and finite, got {0}")]
    InvalidWorldRadius(f32),
    #[error("grid_resolution must be at least 1")]
    InvalidGridResolution,
    #[error("grid_resolution {resolution} exceeds the maximum of {max}")]
    GridResolutionTooLarge { resolution: u32, max: u32 },
    #[error("grid cell size {cell_size} is smaller than default_radius {radius}")]
    GridCellTooSmall { cell_size: f32, radius: f32 },
    #[error("max_cells must be at least 1 and below u32::MAX")]
    InvalidCapacity,
    #[error("cell_density must be positive and finite, got {0}")]
    InvalidDensity(f32),
    #[error("default_radius must be positive and finite, got {0}")]
    InvalidRadius(f32),
    #[error("fixed_point_scale must be positive and finite, got {0}")]
    InvalidFixedPointScale(f32),
}

#[derive(Error, Debug)]
pub enum ConfigLoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

#[derive(Error, Debug)]
pub enum ConfigSaveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON serialize error: {0}")]
    Ron(#[from] ron::Error),
}

fn positive(value: f32) -> bool {
    value.is_finite() && value > 0.0
}

impl PhysicsConfig {
    /// Check every value the passes divide by or allocate from.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !positive(self.fixed_timestep) {
            return Err(ConfigError::InvalidTimestep(self.fixed_timestep));
        }
        if !positive(self.world_radius) {
            return Err(ConfigError::InvalidWorldRadius(self.world_radius));
        }
        if self.grid_resolution == 0 {
            return Err(ConfigError::InvalidGridResolution);
        }
        if self.grid_resolution > MAX_GRID_RESOLUTION {
            return Err(ConfigError::GridResolutionTooLarge {
                resolution: self.grid_resolution,
                max: MAX_GRID_RESOLUTION,
            });
        }
        if self.max_cells == 0 || self.max_cells >= u32::MAX as usize {
            return Err(ConfigError::InvalidCapacity);
        }
        if !positive(self.cell_density) {
            return Err(ConfigError::InvalidDensity(self.cell_density));
        }
        if !positive(self.default_radius) {
            return Err(ConfigError::InvalidRadius(self.default_radius));
        }
        if !positive(self.fixed_point_scale) {
            return Err(ConfigError::InvalidFixedPointScale(self.fixed_point_scale));
        }
        // Neighbor search covers one bucket around each cell
        if self.grid_cell_size() < self.default_radius {
            return Err(ConfigError::GridCellTooSmall {
                cell_size: self.grid_cell_size(),
                radius: self.default_radius,
            });
        }
        Ok(())
    }

    /// Edge length of one spatial grid cell.
    pub fn grid_cell_size(&self) -> f32 {
        (self.world_radius * 2.0) / self.grid_resolution as f32
    }

    /// Load a configuration from a RON file. Missing fields take defaults.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigLoadError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = ron::from_str(&contents)?;
        log::info!("Loaded physics config from {:?}", path);
        Ok(config)
    }

    /// Save the configuration as pretty-printed RON.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigSaveError> {
        let contents = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        std::fs::write(path, contents)?;
        log::info!("Saved physics config to {:?}", path);
        Ok(())
    }
}
