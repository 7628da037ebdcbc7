//! Bond bookkeeping outside the physics core.
//!
//! The solver only reads a slice of [`AdhesionConnection`]s each step. Who
//! creates bonds, how they survive a division and when they disappear is the
//! business of a [`BondManager`]. [`AdhesionConnectionManager`] is the stock
//! implementation: a slot array of connections with a free list, plus a fixed
//! number of bond slots per cell for fast per-cell lookup.

use glam::{Quat, Vec3};
use crate::genome::AdhesionSettings;
use super::adhesion::{init_adhesion_indices, AdhesionConnection, AdhesionIndices};
#[cfg(test)]
use super::adhesion::MAX_ADHESIONS_PER_CELL;
use super::adhesion_zones::classify_bond_direction;
use super::division::SplitEvent;

/// Collaborator that owns bond lifetime.
pub trait BondManager: Send + Sync {
    /// Connections the solver should process this step. Inactive entries
    /// are skipped by the solver.
    fn connections(&self) -> &[AdhesionConnection];

    /// Re-home bonds after a division has been applied.
    fn on_split(&mut self, event: &SplitEvent);

    /// Drop every bond; called when the simulation reinitialises.
    fn clear(&mut self);
}

/// Manages adhesion connections and the per-cell bond slots.
#[derive(Debug, Clone)]
pub struct AdhesionConnectionManager {
    connections: Vec<AdhesionConnection>,
    free_list: Vec<usize>,
    cell_adhesion_indices: Vec<AdhesionIndices>,
    active_count: usize,
}

impl AdhesionConnectionManager {
    pub fn new(cell_capacity: usize) -> Self {
        Self {
            connections: Vec::new(),
            free_list: Vec::new(),
            cell_adhesion_indices: vec![init_adhesion_indices(); cell_capacity],
            active_count: 0,
        }
    }

    pub fn active_count(&self) -> usize {
        self.active_count
    }

    pub fn connection(&self, index: usize) -> Option<&AdhesionConnection> {
        self.connections.get(index).filter(|c| c.is_active)
    }

    /// Indices of active connections touching `cell`.
    pub fn adhesions_of(&self, cell: usize) -> impl Iterator<Item = usize> + '_ {
        self.cell_adhesion_indices
            .get(cell)
            .into_iter()
            .flat_map(|slots| slots.iter())
            .filter(|&&slot| slot >= 0)
            .map(|&slot| slot as usize)
    }

    pub fn are_cells_connected(&self, cell_a: usize, cell_b: usize) -> bool {
        self.adhesions_of(cell_a)
            .any(|i| self.connections[i].partner_of(cell_a) == Some(cell_b))
    }

    fn free_slot_of(&self, cell: usize) -> Option<usize> {
        self.cell_adhesion_indices
            .get(cell)?
            .iter()
            .position(|&slot| slot < 0)
    }

    /// Register a connection. Fails when an endpoint is out of range, both
    /// endpoints are the same cell, or either cell has no free bond slot.
    pub fn add_adhesion(&mut self, connection: AdhesionConnection) -> Option<usize> {
        let (a, b) = (connection.cell_a, connection.cell_b);
        if a == b {
            return None;
        }
        let slot_a = self.free_slot_of(a)?;
        let slot_b = self.free_slot_of(b)?;

        let index = match self.free_list.pop() {
            Some(index) => {
                self.connections[index] = connection;
                index
            }
            None => {
                self.connections.push(connection);
                self.connections.len() - 1
            }
        };
        self.connections[index].is_active = true;
        self.cell_adhesion_indices[a][slot_a] = index as i32;
        self.cell_adhesion_indices[b][slot_b] = index as i32;
        self.active_count += 1;
        Some(index)
    }

    /// Deactivate a connection and free its slot. Returns false if it was
    /// not active.
    pub fn remove_adhesion(&mut self, index: usize) -> bool {
        let Some(connection) = self.connections.get_mut(index) else {
            return false;
        };
        if !connection.is_active {
            return false;
        }
        connection.is_active = false;
        let (a, b) = (connection.cell_a, connection.cell_b);

        for cell in [a, b] {
            if let Some(slots) = self.cell_adhesion_indices.get_mut(cell) {
                for slot in slots.iter_mut().filter(|s| **s == index as i32) {
                    *slot = -1;
                }
            }
        }
        self.free_list.push(index);
        self.active_count -= 1;
        true
    }

    /// Remove every bond touching `cell`.
    pub fn remove_all_for_cell(&mut self, cell: usize) {
        let indices: Vec<usize> = self.adhesions_of(cell).collect();
        for index in indices {
            self.remove_adhesion(index);
        }
    }

    /// Move the `parent` end of `connection` onto a daughter with the given
    /// orientation offset. Anchors and the recorded relative orientation are
    /// re-expressed in the daughter's frame.
    fn rehome(
        connection: &AdhesionConnection,
        parent: usize,
        daughter: usize,
        offset: Quat,
    ) -> AdhesionConnection {
        let mut moved = *connection;
        let to_daughter_frame = offset.inverse();
        if connection.cell_a == parent {
            moved.cell_a = daughter;
            moved.anchor_a = (to_daughter_frame * connection.anchor_a).normalize_or_zero();
            moved.initial_relative_orientation =
                (offset.conjugate() * connection.initial_relative_orientation).normalize();
        } else {
            moved.cell_b = daughter;
            moved.anchor_b = (to_daughter_frame * connection.anchor_b).normalize_or_zero();
            moved.initial_relative_orientation =
                (connection.initial_relative_orientation * offset).normalize();
        }
        moved
    }

    fn create_sibling_bond(&mut self, event: &SplitEvent) {
        let Some(settings) = event.sibling_bond else {
            return;
        };
        // Daughter A sits at +split, so it looks toward B along -split
        let anchor_a = event.child_a_orientation.inverse() * -event.split_direction_local;
        let anchor_b = event.child_b_orientation.inverse() * event.split_direction_local;
        let relative = event.child_a_orientation.conjugate() * event.child_b_orientation;

        let connection = AdhesionConnection::from_settings(
            event.daughter_a,
            event.daughter_b,
            event.parent_mode,
            &settings,
            anchor_a,
            anchor_b,
            relative,
        );
        if self.add_adhesion(connection).is_none() {
            log::debug!(
                "No free bond slot for sibling bond {} - {}",
                event.daughter_a,
                event.daughter_b
            );
        }
    }
}

impl BondManager for AdhesionConnectionManager {
    fn connections(&self) -> &[AdhesionConnection] {
        &self.connections
    }

    fn on_split(&mut self, event: &SplitEvent) {
        let parent = event.parent;
        let inherited: Vec<usize> = self.adhesions_of(parent).collect();

        for index in inherited {
            let connection = self.connections[index];
            let anchor = if connection.cell_a == parent {
                connection.anchor_a
            } else {
                connection.anchor_b
            };

            let zone = classify_bond_direction(anchor, event.split_direction_local);
            let to_a = zone.goes_to_daughter_a() && event.keep_adhesion_a;
            let to_b = zone.goes_to_daughter_b() && event.keep_adhesion_b;

            // Free the parent's slot before moving, so a full partner keeps the bond
            if to_a {
                self.connections[index] =
                    Self::rehome(&connection, parent, event.daughter_a, event.child_a_orientation);
            } else {
                self.remove_adhesion(index);
            }

            if to_b {
                let moved = Self::rehome(&connection, parent, event.daughter_b, event.child_b_orientation);
                if self.add_adhesion(moved).is_none() {
                    log::debug!("No free bond slot re-homing bond {} onto {}", index, event.daughter_b);
                }
            }
        }

        self.create_sibling_bond(event);
    }

    fn clear(&mut self) {
        self.connections.clear();
        self.free_list.clear();
        for slots in &mut self.cell_adhesion_indices {
            *slots = init_adhesion_indices();
        }
        self.active_count = 0;
    }
}

/// Convenience for building bonds between two live cells given their world
/// positions and orientations. Anchors point at the partner.
pub fn connection_between(
    cell_a: usize,
    cell_b: usize,
    mode_index: i32,
    settings: &AdhesionSettings,
    positions: (Vec3, Vec3),
    rotations: (Quat, Quat),
) -> AdhesionConnection {
    let (pos_a, pos_b) = positions;
    let (rot_a, rot_b) = rotations;
    let direction = (pos_b - pos_a).normalize_or_zero();
    AdhesionConnection::from_settings(
        cell_a,
        cell_b,
        mode_index,
        settings,
        rot_a.inverse() * direction,
        rot_b.inverse() * -direction,
        rot_a.conjugate() * rot_b,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bond(a: usize, b: usize, anchor_a: Vec3) -> AdhesionConnection {
        AdhesionConnection::from_settings(
            a,
            b,
            0,
            &AdhesionSettings::default(),
            anchor_a,
            -anchor_a,
            Quat::IDENTITY,
        )
    }

    fn split_event(keep_a: bool, keep_b: bool, sibling: bool) -> SplitEvent {
        SplitEvent {
            parent: 0,
            daughter_a: 0,
            daughter_b: 4,
            parent_mode: 0,
            mode_a: 0,
            mode_b: 0,
            keep_adhesion_a: keep_a,
            keep_adhesion_b: keep_b,
            split_direction_local: Vec3::Z,
            child_a_orientation: Quat::IDENTITY,
            child_b_orientation: Quat::IDENTITY,
            sibling_bond: sibling.then(AdhesionSettings::default),
        }
    }

    fn partners(manager: &AdhesionConnectionManager, cell: usize) -> Vec<usize> {
        let mut partners: Vec<usize> = manager
            .adhesions_of(cell)
            .filter_map(|i| manager.connection(i)?.partner_of(cell))
            .collect();
        partners.sort_unstable();
        partners
    }

    #[test]
    fn test_add_and_remove() {
        let mut manager = AdhesionConnectionManager::new(4);
        let index = manager.add_adhesion(bond(0, 1, Vec3::X)).unwrap();
        assert!(manager.are_cells_connected(0, 1));
        assert!(manager.are_cells_connected(1, 0));
        assert_eq!(manager.active_count(), 1);

        assert!(manager.remove_adhesion(index));
        assert!(!manager.remove_adhesion(index));
        assert!(!manager.are_cells_connected(0, 1));
        assert_eq!(manager.active_count(), 0);

        // Freed slot is reused
        assert_eq!(manager.add_adhesion(bond(2, 3, Vec3::X)), Some(index));
    }

    #[test]
    fn test_rejects_invalid_endpoints() {
        let mut manager = AdhesionConnectionManager::new(2);
        assert!(manager.add_adhesion(bond(0, 0, Vec3::X)).is_none());
        assert!(manager.add_adhesion(bond(0, 7, Vec3::X)).is_none());
    }

    #[test]
    fn test_slots_per_cell_are_limited() {
        let mut manager = AdhesionConnectionManager::new(64);
        for partner in 1..=MAX_ADHESIONS_PER_CELL {
            assert!(manager.add_adhesion(bond(0, partner, Vec3::X)).is_some());
        }
        assert!(manager.add_adhesion(bond(0, 40, Vec3::X)).is_none());
    }

    #[test]
    fn test_split_rehomes_bonds_by_zone() {
        let mut manager = AdhesionConnectionManager::new(8);
        manager.add_adhesion(bond(0, 1, Vec3::Z)); // zone B -> daughter A
        manager.add_adhesion(bond(0, 2, -Vec3::Z)); // zone A -> daughter B
        manager.add_adhesion(bond(3, 0, Vec3::X)).unwrap(); // parent is side B

        // Parent-side anchor of the 3-0 bond lies in the equatorial band
        let index = manager.adhesions_of(3).next().unwrap();
        manager.connections[index].anchor_b = Vec3::Y;

        manager.on_split(&split_event(true, true, false));

        assert_eq!(partners(&manager, 0), vec![1, 3]);
        assert_eq!(partners(&manager, 4), vec![2, 3]);
        assert_eq!(partners(&manager, 3), vec![0, 4]);
        assert_eq!(manager.active_count(), 4);
    }

    #[test]
    fn test_bond_moves_to_daughter_b_when_partner_is_full() {
        let mut manager = AdhesionConnectionManager::new(64);
        manager.add_adhesion(bond(1, 0, Vec3::Z)).unwrap();
        // Parent-side anchor points away from the split axis: zone A
        let index = manager.adhesions_of(0).next().unwrap();
        manager.connections[index].anchor_b = -Vec3::Z;
        for partner in 10..10 + MAX_ADHESIONS_PER_CELL - 1 {
            manager.add_adhesion(bond(1, partner, Vec3::X)).unwrap();
        }
        assert_eq!(manager.adhesions_of(1).count(), MAX_ADHESIONS_PER_CELL);

        manager.on_split(&split_event(true, true, false));

        assert!(manager.are_cells_connected(1, 4));
        assert!(!manager.are_cells_connected(1, 0));
        assert_eq!(manager.adhesions_of(1).count(), MAX_ADHESIONS_PER_CELL);
        assert_eq!(manager.active_count(), MAX_ADHESIONS_PER_CELL);
    }

    #[test]
    fn test_keep_adhesion_false_drops_bonds() {
        let mut manager = AdhesionConnectionManager::new(8);
        manager.add_adhesion(bond(0, 1, Vec3::Z));
        manager.add_adhesion(bond(0, 2, -Vec3::Z));
        manager.add_adhesion(bond(0, 3, Vec3::X));

        manager.on_split(&split_event(true, false, false));

        assert_eq!(partners(&manager, 0), vec![1, 3]);
        assert!(partners(&manager, 4).is_empty());
        assert_eq!(manager.active_count(), 2);
    }

    #[test]
    fn test_rehome_reexpresses_anchor_in_daughter_frame() {
        let mut manager = AdhesionConnectionManager::new(8);
        manager.add_adhesion(bond(0, 1, -Vec3::Z));

        let mut event = split_event(true, true, false);
        event.child_b_orientation = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        manager.on_split(&event);

        let index = manager.adhesions_of(4).next().unwrap();
        let moved = manager.connection(index).unwrap();
        assert_eq!(moved.cell_a, 4);
        // Rotating the daughter frame keeps the anchor pointing the same way in world space
        let world_anchor = event.child_b_orientation * moved.anchor_a;
        assert!((world_anchor + Vec3::Z).length() < 1e-5);
        let world_relative = event.child_b_orientation * moved.initial_relative_orientation;
        assert!(world_relative.abs_diff_eq(Quat::IDENTITY, 1e-5));
    }

    #[test]
    fn test_sibling_bond_anchors_face_each_other() {
        let mut manager = AdhesionConnectionManager::new(8);
        manager.on_split(&split_event(true, true, true));

        assert!(manager.are_cells_connected(0, 4));
        let index = manager.adhesions_of(0).next().unwrap();
        let sibling = manager.connection(index).unwrap();
        assert!((sibling.anchor_a + Vec3::Z).length() < 1e-6);
        assert!((sibling.anchor_b - Vec3::Z).length() < 1e-6);
        assert_eq!(sibling.rest_length, AdhesionSettings::default().rest_length);
    }

    #[test]
    fn test_clear_removes_everything() {
        let mut manager = AdhesionConnectionManager::new(4);
        manager.add_adhesion(bond(0, 1, Vec3::X));
        manager.clear();
        assert_eq!(manager.active_count(), 0);
        assert!(manager.connections().is_empty());
        assert_eq!(manager.adhesions_of(0).count(), 0);
    }

    #[test]
    fn test_connection_between_points_anchors_at_partner() {
        let c = connection_between(
            0,
            1,
            0,
            &AdhesionSettings::default(),
            (Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0)),
            (Quat::IDENTITY, Quat::IDENTITY),
        );
        assert!((c.anchor_a - Vec3::X).length() < 1e-6);
        assert!((c.anchor_b + Vec3::X).length() < 1e-6);
    }
}
