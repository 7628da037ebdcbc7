use glam::Vec3;

/// Adhesion zone classification for division inheritance
///
/// Zones determine which daughter inherits a bond when a cell divides:
/// - Zone A: bond points opposite to the split direction → daughter B
/// - Zone B: bond points along the split direction → daughter A
/// - Zone C: bond lies in the equatorial band (90° ± threshold) → both daughters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AdhesionZone {
    ZoneA = 0,
    ZoneB = 1,
    ZoneC = 2,
}

/// Equatorial threshold in degrees (±2° from 90°)
pub const EQUATORIAL_THRESHOLD_DEGREES: f32 = 2.0;

/// Classify adhesion bond direction relative to split direction
///
/// Both directions must be expressed in the same frame. A zero-length bond
/// direction is treated as equatorial.
pub fn classify_bond_direction(bond_direction: Vec3, split_direction: Vec3) -> AdhesionZone {
    let dot_product = bond_direction
        .normalize_or_zero()
        .dot(split_direction.normalize_or_zero());

    // sin(2°) ≈ 0.0349
    let equatorial_threshold = EQUATORIAL_THRESHOLD_DEGREES.to_radians().sin();

    if dot_product.abs() <= equatorial_threshold {
        AdhesionZone::ZoneC
    } else if dot_product > 0.0 {
        AdhesionZone::ZoneB
    } else {
        AdhesionZone::ZoneA
    }
}

impl AdhesionZone {
    /// Whether daughter A (the one placed along +split direction) inherits
    pub fn goes_to_daughter_a(self) -> bool {
        matches!(self, AdhesionZone::ZoneB | AdhesionZone::ZoneC)
    }

    /// Whether daughter B (placed along -split direction) inherits
    pub fn goes_to_daughter_b(self) -> bool {
        matches!(self, AdhesionZone::ZoneA | AdhesionZone::ZoneC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zone_classification() {
        let split_dir = Vec3::Y;

        // Opposite to split direction
        let bond_a = Vec3::new(0.0, -1.0, 0.0);
        assert_eq!(classify_bond_direction(bond_a, split_dir), AdhesionZone::ZoneA);

        // Same as split direction
        let bond_b = Vec3::new(0.0, 1.0, 0.0);
        assert_eq!(classify_bond_direction(bond_b, split_dir), AdhesionZone::ZoneB);

        // Perpendicular to split
        assert_eq!(classify_bond_direction(Vec3::X, split_dir), AdhesionZone::ZoneC);
        assert_eq!(classify_bond_direction(Vec3::Z, split_dir), AdhesionZone::ZoneC);

        // dot ≈ 0.034 is inside the ±2° band
        let bond_near_eq = Vec3::new(1.0, 0.034, 0.0).normalize();
        assert_eq!(classify_bond_direction(bond_near_eq, split_dir), AdhesionZone::ZoneC);

        // dot ≈ 0.05 is outside it
        let bond_outside_eq = Vec3::new(1.0, 0.05, 0.0).normalize();
        assert_eq!(classify_bond_direction(bond_outside_eq, split_dir), AdhesionZone::ZoneB);
    }

    #[test]
    fn test_zone_inheritance_targets() {
        assert!(!AdhesionZone::ZoneA.goes_to_daughter_a());
        assert!(AdhesionZone::ZoneA.goes_to_daughter_b());
        assert!(AdhesionZone::ZoneB.goes_to_daughter_a());
        assert!(!AdhesionZone::ZoneB.goes_to_daughter_b());
        assert!(AdhesionZone::ZoneC.goes_to_daughter_a());
        assert!(AdhesionZone::ZoneC.goes_to_daughter_b());
    }

    #[test]
    fn test_degenerate_bond_is_equatorial() {
        assert_eq!(classify_bond_direction(Vec3::ZERO, Vec3::Y), AdhesionZone::ZoneC);
    }
}
