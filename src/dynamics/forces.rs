use crate::{
    collision::contact::Contact,
    core::types::Vec3,
    utils::allocator::Arena,
};

/// Per-particle force and torque accumulators, indexed by particle slot.
///
/// Torques are about each particle's own position; the clump aggregator
/// adds the lever arm to the carrying node.
#[derive(Debug, Clone, Default)]
pub struct ForceBuffer {
    forces: Vec<Vec3>,
    torques: Vec<Vec3>,
}

impl ForceBuffer {
    pub fn with_slots(slots: usize) -> Self {
        Self {
            forces: vec![Vec3::ZERO; slots],
            torques: vec![Vec3::ZERO; slots],
        }
    }

    /// Zeroes the buffer and resizes it to `slots` entries.
    pub fn reset(&mut self, slots: usize) {
        self.forces.clear();
        self.forces.resize(slots, Vec3::ZERO);
        self.torques.clear();
        self.torques.resize(slots, Vec3::ZERO);
    }

    pub fn len(&self) -> usize {
        self.forces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forces.is_empty()
    }

    pub fn add(&mut self, slot: usize, force: Vec3, torque: Vec3) {
        if slot >= self.forces.len() {
            self.forces.resize(slot + 1, Vec3::ZERO);
            self.torques.resize(slot + 1, Vec3::ZERO);
        }
        self.forces[slot] += force;
        self.torques[slot] += torque;
    }

    pub fn force(&self, slot: usize) -> Vec3 {
        self.forces.get(slot).copied().unwrap_or(Vec3::ZERO)
    }

    pub fn torque(&self, slot: usize) -> Vec3 {
        self.torques.get(slot).copied().unwrap_or(Vec3::ZERO)
    }

    /// Sums the force of every real contact onto both of its particles.
    ///
    /// Each contact holds the output of its own law evaluation; the outputs
    /// are folded here in contact slot order, never concurrently.
    pub fn accumulate_contacts(&mut self, contacts: &Arena<Contact>) {
        for contact in contacts.iter() {
            if !contact.is_real() {
                continue;
            }
            let out = &contact.force;
            self.add(contact.pair.first().index(), -out.force, out.torque_first);
            self.add(contact.pair.second().index(), out.force, out.torque_second);
        }
    }
}
