use serde::{Deserialize, Serialize};

use crate::{
    core::types::{Real, Vec3},
    utils::allocator::EntityId,
};

/// Unordered particle pair, stored with the smaller id first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey(EntityId, EntityId);

impl PairKey {
    pub fn new(a: EntityId, b: EntityId) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    pub fn first(&self) -> EntityId {
        self.0
    }

    pub fn second(&self) -> EntityId {
        self.1
    }

    pub fn involves(&self, id: EntityId) -> bool {
        self.0 == id || self.1 == id
    }
}

/// Exact contact geometry produced by the narrow phase.
///
/// `normal` is a unit vector pointing from the pair's first particle toward
/// the second; `depth` is the signed penetration (negative when separated).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContactGeometry {
    pub normal: Vec3,
    pub depth: Real,
    pub point: Vec3,
}

impl ContactGeometry {
    /// Same contact seen from the other particle.
    pub fn flipped(self) -> Self {
        Self {
            normal: -self.normal,
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ContactState {
    /// Bounds overlap but the shapes do not touch.
    #[default]
    Potential,
    /// Shapes interpenetrate; the law produces forces.
    Real,
}

/// Pair parameters and history owned by a real contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactPhys {
    pub kn: Real,
    pub ks: Real,
    pub cn: Real,
    pub cs: Real,
    /// Coulomb coefficient.
    pub friction: Real,
    /// Tensile force a cohesive bond sustains; zero when not cohesive.
    pub tensile_limit: Real,
    pub cohesion_broken: bool,
    /// Accumulated elastic tangential displacement.
    pub shear_displacement: Vec3,
    /// Normal at the previous evaluation, used to rotate the shear state.
    pub prev_normal: Vec3,
    /// Number of law evaluations since the contact became real.
    pub evaluations: u64,
}

impl ContactPhys {
    pub fn is_cohesive(&self) -> bool {
        self.tensile_limit > 0.0 && !self.cohesion_broken
    }
}

/// Force and torques produced by the last law evaluation.
///
/// Torques are about each particle's own position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ContactForce {
    /// Force acting on the second particle; the first receives its negation.
    pub force: Vec3,
    pub torque_first: Vec3,
    pub torque_second: Vec3,
    pub normal_force: Real,
    pub sliding: bool,
}

/// Persistent record of an interaction between two particles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: EntityId,
    pub pair: PairKey,
    pub state: ContactState,
    pub geometry: Option<ContactGeometry>,
    pub phys: Option<ContactPhys>,
    pub force: ContactForce,
    /// Consecutive steps the pair was missing from the candidate set.
    pub missed_steps: u32,
    pub created_step: u64,
}

impl Contact {
    pub fn new(pair: PairKey, step: u64) -> Self {
        Self {
            id: EntityId::default(),
            pair,
            state: ContactState::Potential,
            geometry: None,
            phys: None,
            force: ContactForce::default(),
            missed_steps: 0,
            created_step: step,
        }
    }

    pub fn is_real(&self) -> bool {
        self.state == ContactState::Real
    }

    /// Drops law history and forces; the pair is kept as a potential contact.
    pub fn demote(&mut self) {
        self.state = ContactState::Potential;
        self.phys = None;
        self.force = ContactForce::default();
    }

    /// Partner of `id` in this contact.
    pub fn other(&self, id: EntityId) -> Option<EntityId> {
        if self.pair.first() == id {
            Some(self.pair.second())
        } else if self.pair.second() == id {
            Some(self.pair.first())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_key_is_order_independent() {
        let a = EntityId::new(3, 1);
        let b = EntityId::new(1, 0);
        assert_eq!(PairKey::new(a, b), PairKey::new(b, a));
        assert_eq!(PairKey::new(a, b).first(), b);
    }

    #[test]
    fn demote_clears_history() {
        let mut contact = Contact::new(PairKey::new(EntityId::from_index(0), EntityId::from_index(1)), 0);
        contact.state = ContactState::Real;
        contact.phys = Some(ContactPhys {
            kn: 1.0,
            ks: 0.2,
            cn: 0.0,
            cs: 0.0,
            friction: 0.5,
            tensile_limit: 0.0,
            cohesion_broken: false,
            shear_displacement: Vec3::X,
            prev_normal: Vec3::Z,
            evaluations: 3,
        });
        contact.demote();
        assert!(!contact.is_real());
        assert!(contact.phys.is_none());
    }
}
