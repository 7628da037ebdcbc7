//! Mode table consumed by the physics core.
//!
//! A [`Genome`] is an ordered list of [`ModeSettings`]. Every cell carries a mode
//! index into this table; the mode decides when the cell splits, how its
//! daughters are placed and oriented, which modes they take, and how bonds are
//! created and inherited. The table is immutable while a simulation runs; an
//! edit is applied by reinitialising the simulation.

pub mod serialization;

pub use serialization::{GenomeDeserializeError, GenomeSerializeError};

use glam::{Quat, Vec2};
use thiserror::Error;

/// Split intervals above this are treated as "never split".
pub const NEVER_SPLIT_INTERVAL: f32 = 59.0;

#[derive(Debug, Clone)]
pub struct Genome {
    pub name: String,
    /// Fallback initial mode used when no mode carries `is_initial`
    pub initial_mode: i32,
    pub initial_orientation: Quat,
    pub modes: Vec<ModeSettings>,
}

#[derive(Debug, Clone)]
pub struct ModeSettings {
    pub name: String,
    /// At most one mode in a genome may set this
    pub is_initial: bool,
    /// Seconds between splits
    pub split_interval: f32,
    /// pitch (x), yaw (y) in degrees, relative to the parent's frame
    pub parent_split_direction: Vec2,
    /// Maximum number of splits in this mode, -1 for unlimited
    pub max_splits: i32,
    /// Mode for child A once `max_splits` is reached, -1 to keep `child_a.mode_number`
    pub mode_a_after_splits: i32,
    /// Mode for child B once `max_splits` is reached, -1 to keep `child_b.mode_number`
    pub mode_b_after_splits: i32,
    /// Bond the two daughters together on split
    pub parent_make_adhesion: bool,
    pub child_a: ChildSettings,
    pub child_b: ChildSettings,
    pub adhesion_settings: AdhesionSettings,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChildSettings {
    /// Mode index for this daughter; negative or out of range inherits the parent mode
    pub mode_number: i32,
    /// Orientation offset relative to the parent's orientation
    pub orientation: Quat,
    /// Whether this daughter keeps bonds inherited from the parent
    pub keep_adhesion: bool,
}

impl Default for ChildSettings {
    fn default() -> Self {
        Self {
            mode_number: -1,
            orientation: Quat::IDENTITY,
            keep_adhesion: true,
        }
    }
}

/// Spring parameters for bonds created by a mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdhesionSettings {
    pub rest_length: f32,
    pub linear_spring_stiffness: f32,
    pub linear_spring_damping: f32,
    pub orientation_spring_stiffness: f32,
    pub anchor_stiffness: f32,
    pub enable_anchor_constraint: bool,
}

impl Default for AdhesionSettings {
    fn default() -> Self {
        Self {
            rest_length: 1.0,
            linear_spring_stiffness: 150.0,
            linear_spring_damping: 5.0,
            orientation_spring_stiffness: 10.0,
            anchor_stiffness: 2.0,
            enable_anchor_constraint: true,
        }
    }
}

impl Default for ModeSettings {
    fn default() -> Self {
        Self {
            name: "M1".to_string(),
            is_initial: false,
            split_interval: 5.0,
            parent_split_direction: Vec2::ZERO,
            max_splits: -1,
            mode_a_after_splits: -1,
            mode_b_after_splits: -1,
            parent_make_adhesion: false,
            child_a: ChildSettings::default(),
            child_b: ChildSettings::default(),
            adhesion_settings: AdhesionSettings::default(),
        }
    }
}

impl ModeSettings {
    /// Whether cells in this mode ever split.
    pub fn can_split(&self) -> bool {
        self.split_interval.is_finite() && self.split_interval <= NEVER_SPLIT_INTERVAL
    }
}

impl Default for Genome {
    fn default() -> Self {
        let modes = (0..40)
            .map(|i| ModeSettings {
                name: format!("M{}", i + 1),
                ..Default::default()
            })
            .collect();

        Self {
            name: "Default".to_string(),
            initial_mode: 0,
            initial_orientation: Quat::IDENTITY,
            modes,
        }
    }
}

/// Configuration inconsistencies detected before a simulation starts.
#[derive(Error, Debug, PartialEq)]
pub enum GenomeError {
    #[error("genome '{0}' has no modes")]
    NoModes(String),
    #[error("more than one mode is flagged as initial: {0:?}")]
    MultipleInitialModes(Vec<usize>),
    #[error("initial mode {index} is out of range (genome has {mode_count} modes)")]
    InitialModeOutOfRange { index: i32, mode_count: usize },
}

impl Genome {
    /// Validate the mode table and resolve the initial mode index.
    ///
    /// A mode flagged `is_initial` wins over `initial_mode`; two flagged modes
    /// are a fatal error.
    pub fn validate(&self) -> Result<usize, GenomeError> {
        if self.modes.is_empty() {
            return Err(GenomeError::NoModes(self.name.clone()));
        }

        let flagged: Vec<usize> = self
            .modes
            .iter()
            .enumerate()
            .filter(|(_, m)| m.is_initial)
            .map(|(i, _)| i)
            .collect();

        match flagged.as_slice() {
            [] => {
                if self.initial_mode < 0 || self.initial_mode as usize >= self.modes.len() {
                    Err(GenomeError::InitialModeOutOfRange {
                        index: self.initial_mode,
                        mode_count: self.modes.len(),
                    })
                } else {
                    Ok(self.initial_mode as usize)
                }
            }
            [single] => Ok(*single),
            _ => Err(GenomeError::MultipleInitialModes(flagged)),
        }
    }

    /// Look up a mode by a cell's signed mode index.
    pub fn mode(&self, index: i32) -> Option<&ModeSettings> {
        usize::try_from(index).ok().and_then(|i| self.modes.get(i))
    }

    /// Resolve a child mode number, falling back to the parent's mode when the
    /// number is unset or out of range.
    pub fn resolve_child_mode(&self, requested: i32, parent_mode: i32) -> i32 {
        if self.mode(requested).is_some() {
            requested
        } else {
            parent_mode
        }
    }
}
