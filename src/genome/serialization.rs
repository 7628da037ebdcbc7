//! Genome serialization for save/load functionality.
//!
//! Saves genomes as human-readable YAML (.genome files). Each mode only stores
//! the fields that differ from [`ModeSettings::default`].

use super::{AdhesionSettings, ChildSettings, Genome, ModeSettings};
use glam::{Quat, Vec2};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenomeSerializeError {
    #[error("Failed to serialize genome: {0}")]
    Serialize(#[from] serde_yaml::Error),
    #[error("Failed to write genome file: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum GenomeDeserializeError {
    #[error("Failed to read genome file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse genome: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid child mode index {index} in mode {mode}")]
    InvalidModeIndex { mode: usize, index: i32 },
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SerializableGenome {
    pub name: String,
    #[serde(skip_serializing_if = "is_default_initial_mode")]
    #[serde(default)]
    pub initial_mode: i32,
    #[serde(skip_serializing_if = "is_identity_quat")]
    #[serde(default = "default_quat")]
    pub initial_orientation: [f32; 4],
    #[serde(default)]
    pub modes: Vec<SerializableModeSettings>,
}

fn is_default_initial_mode(mode: &i32) -> bool {
    *mode == 0
}

fn is_identity_quat(q: &[f32; 4]) -> bool {
    (q[0] - 0.0).abs() < 0.0001
        && (q[1] - 0.0).abs() < 0.0001
        && (q[2] - 0.0).abs() < 0.0001
        && (q[3] - 1.0).abs() < 0.0001
}

fn default_quat() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

/// Serializable mode settings - all fields optional, only non-default values serialized
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct SerializableModeSettings {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub is_initial: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub split_interval: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub parent_split_direction: Option<[f32; 2]>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub max_splits: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mode_a_after_splits: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mode_b_after_splits: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub parent_make_adhesion: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub child_a: Option<SerializableChildSettings>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub child_b: Option<SerializableChildSettings>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub adhesion_settings: Option<SerializableAdhesionSettings>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct SerializableChildSettings {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mode_number: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub orientation: Option<[f32; 4]>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub keep_adhesion: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct SerializableAdhesionSettings {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub rest_length: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub linear_spring_stiffness: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub linear_spring_damping: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub orientation_spring_stiffness: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub anchor_stiffness: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub enable_anchor_constraint: Option<bool>,
}

// ============================================================================
// Conversion: Genome -> SerializableGenome (for saving)
// ============================================================================

impl Genome {
    /// Save genome to a YAML file (.genome).
    pub fn save_to_file(&self, path: &Path) -> Result<(), GenomeSerializeError> {
        let yaml = self.to_yaml()?;
        std::fs::write(path, yaml)?;
        log::info!("Saved genome to {:?}", path);
        Ok(())
    }

    /// Load genome from a YAML file (.genome).
    pub fn load_from_file(path: &Path) -> Result<Self, GenomeDeserializeError> {
        let yaml = std::fs::read_to_string(path)?;
        let genome = Self::from_yaml(&yaml)?;
        log::info!("Loaded genome '{}' ({} modes) from {:?}", genome.name, genome.modes.len(), path);
        Ok(genome)
    }

    pub fn to_yaml(&self) -> Result<String, GenomeSerializeError> {
        Ok(serde_yaml::to_string(&self.to_serializable())?)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, GenomeDeserializeError> {
        let serializable: SerializableGenome = serde_yaml::from_str(yaml)?;
        Self::from_serializable(serializable)
    }

    fn to_serializable(&self) -> SerializableGenome {
        let default_mode = ModeSettings::default();
        SerializableGenome {
            name: self.name.clone(),
            initial_mode: self.initial_mode,
            initial_orientation: quat_to_array(self.initial_orientation),
            modes: self
                .modes
                .iter()
                .map(|mode| mode_to_serializable(mode, &default_mode))
                .collect(),
        }
    }

    /// Child mode numbers must be -1 (inherit) or a valid index. Other negative
    /// or out-of-range values in a file are rejected rather than silently
    /// inherited, since they almost always indicate a typo.
    fn from_serializable(ser: SerializableGenome) -> Result<Self, GenomeDeserializeError> {
        let mode_count = ser.modes.len() as i32;
        let modes = ser
            .modes
            .iter()
            .map(apply_mode_settings)
            .collect::<Vec<_>>();

        for (i, mode) in modes.iter().enumerate() {
            for index in [mode.child_a.mode_number, mode.child_b.mode_number] {
                if index < -1 || index >= mode_count {
                    return Err(GenomeDeserializeError::InvalidModeIndex { mode: i, index });
                }
            }
        }

        Ok(Genome {
            name: ser.name,
            initial_mode: ser.initial_mode,
            initial_orientation: array_to_quat(ser.initial_orientation),
            modes,
        })
    }
}

fn mode_to_serializable(mode: &ModeSettings, default: &ModeSettings) -> SerializableModeSettings {
    SerializableModeSettings {
        name: mode.name.clone(),
        is_initial: diff_bool(mode.is_initial, default.is_initial),
        split_interval: diff_f32(mode.split_interval, default.split_interval),
        parent_split_direction: diff_vec2(&mode.parent_split_direction, &default.parent_split_direction),
        max_splits: diff_i32(mode.max_splits, default.max_splits),
        mode_a_after_splits: diff_i32(mode.mode_a_after_splits, default.mode_a_after_splits),
        mode_b_after_splits: diff_i32(mode.mode_b_after_splits, default.mode_b_after_splits),
        parent_make_adhesion: diff_bool(mode.parent_make_adhesion, default.parent_make_adhesion),
        child_a: child_to_serializable(&mode.child_a, &default.child_a),
        child_b: child_to_serializable(&mode.child_b, &default.child_b),
        adhesion_settings: adhesion_to_serializable(&mode.adhesion_settings, &default.adhesion_settings),
    }
}

fn child_to_serializable(
    child: &ChildSettings,
    default: &ChildSettings,
) -> Option<SerializableChildSettings> {
    let ser = SerializableChildSettings {
        mode_number: diff_i32(child.mode_number, default.mode_number),
        orientation: diff_quat(&child.orientation, &default.orientation),
        keep_adhesion: diff_bool(child.keep_adhesion, default.keep_adhesion),
    };

    if ser.mode_number.is_some() || ser.orientation.is_some() || ser.keep_adhesion.is_some() {
        Some(ser)
    } else {
        None
    }
}

fn adhesion_to_serializable(
    adhesion: &AdhesionSettings,
    default: &AdhesionSettings,
) -> Option<SerializableAdhesionSettings> {
    let ser = SerializableAdhesionSettings {
        rest_length: diff_f32(adhesion.rest_length, default.rest_length),
        linear_spring_stiffness: diff_f32(adhesion.linear_spring_stiffness, default.linear_spring_stiffness),
        linear_spring_damping: diff_f32(adhesion.linear_spring_damping, default.linear_spring_damping),
        orientation_spring_stiffness: diff_f32(
            adhesion.orientation_spring_stiffness,
            default.orientation_spring_stiffness,
        ),
        anchor_stiffness: diff_f32(adhesion.anchor_stiffness, default.anchor_stiffness),
        enable_anchor_constraint: diff_bool(adhesion.enable_anchor_constraint, default.enable_anchor_constraint),
    };

    if ser.rest_length.is_some()
        || ser.linear_spring_stiffness.is_some()
        || ser.linear_spring_damping.is_some()
        || ser.orientation_spring_stiffness.is_some()
        || ser.anchor_stiffness.is_some()
        || ser.enable_anchor_constraint.is_some()
    {
        Some(ser)
    } else {
        None
    }
}

// ============================================================================
// Apply serialized settings back to mode (for loading)
// ============================================================================

fn apply_mode_settings(ser: &SerializableModeSettings) -> ModeSettings {
    let mut mode = ModeSettings {
        name: ser.name.clone(),
        ..Default::default()
    };

    if let Some(v) = ser.is_initial {
        mode.is_initial = v;
    }
    if let Some(v) = ser.split_interval {
        mode.split_interval = v;
    }
    if let Some(v) = ser.parent_split_direction {
        mode.parent_split_direction = Vec2::from_array(v);
    }
    if let Some(v) = ser.max_splits {
        mode.max_splits = v;
    }
    if let Some(v) = ser.mode_a_after_splits {
        mode.mode_a_after_splits = v;
    }
    if let Some(v) = ser.mode_b_after_splits {
        mode.mode_b_after_splits = v;
    }
    if let Some(v) = ser.parent_make_adhesion {
        mode.parent_make_adhesion = v;
    }
    if let Some(ref child) = ser.child_a {
        apply_child_settings(&mut mode.child_a, child);
    }
    if let Some(ref child) = ser.child_b {
        apply_child_settings(&mut mode.child_b, child);
    }
    if let Some(ref adhesion) = ser.adhesion_settings {
        apply_adhesion_settings(&mut mode.adhesion_settings, adhesion);
    }
    mode
}

fn apply_child_settings(child: &mut ChildSettings, ser: &SerializableChildSettings) {
    if let Some(v) = ser.mode_number {
        child.mode_number = v;
    }
    if let Some(v) = ser.orientation {
        child.orientation = array_to_quat(v);
    }
    if let Some(v) = ser.keep_adhesion {
        child.keep_adhesion = v;
    }
}

fn apply_adhesion_settings(adhesion: &mut AdhesionSettings, ser: &SerializableAdhesionSettings) {
    if let Some(v) = ser.rest_length {
        adhesion.rest_length = v;
    }
    if let Some(v) = ser.linear_spring_stiffness {
        adhesion.linear_spring_stiffness = v;
    }
    if let Some(v) = ser.linear_spring_damping {
        adhesion.linear_spring_damping = v;
    }
    if let Some(v) = ser.orientation_spring_stiffness {
        adhesion.orientation_spring_stiffness = v;
    }
    if let Some(v) = ser.anchor_stiffness {
        adhesion.anchor_stiffness = v;
    }
    if let Some(v) = ser.enable_anchor_constraint {
        adhesion.enable_anchor_constraint = v;
    }
}

// ============================================================================
// Diff helpers
// ============================================================================

fn diff_f32(value: f32, default: f32) -> Option<f32> {
    if (value - default).abs() > 0.0001 {
        Some(value)
    } else {
        None
    }
}

fn diff_i32(value: i32, default: i32) -> Option<i32> {
    if value != default {
        Some(value)
    } else {
        None
    }
}

fn diff_bool(value: bool, default: bool) -> Option<bool> {
    if value != default {
        Some(value)
    } else {
        None
    }
}

fn diff_vec2(value: &Vec2, default: &Vec2) -> Option<[f32; 2]> {
    if (*value - *default).length() > 0.0001 {
        Some(value.to_array())
    } else {
        None
    }
}

fn diff_quat(value: &Quat, default: &Quat) -> Option<[f32; 4]> {
    if value.dot(*default).abs() < 0.9999 {
        Some(quat_to_array(*value))
    } else {
        None
    }
}

fn quat_to_array(q: Quat) -> [f32; 4] {
    [q.x, q.y, q.z, q.w]
}

fn array_to_quat(a: [f32; 4]) -> Quat {
    let q = Quat::from_xyzw(a[0], a[1], a[2], a[3]);
    if q.length_squared() > 1e-8 {
        q.normalize()
    } else {
        Quat::IDENTITY
    }
}
