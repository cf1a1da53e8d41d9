use serde::{Deserialize, Serialize};

use super::{
    motion::InterpolatedMotion,
    types::{Mat3, Pose, Real, Vec3},
};
use crate::{error::ConfigError, utils::allocator::EntityId};

/// How a node's kinematics are determined each step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Motion {
    /// Integrated from accumulated forces and gravity.
    #[default]
    Free,
    /// Never moves; infinite effective mass.
    Static,
    /// Pose prescribed by a trajectory; forces are ignored.
    Imposed(InterpolatedMotion),
}

impl Motion {
    pub fn is_free(&self) -> bool {
        matches!(self, Motion::Free)
    }
}

/// Blocked translational (`xyz`) and rotational (`XYZ`) degrees of freedom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockedDofs(u8);

impl BlockedDofs {
    pub const NONE: Self = Self(0);
    pub const ALL: Self = Self(0b11_1111);

    /// Parses a string such as `"xyZ"`; lowercase letters block translation,
    /// uppercase block rotation.
    pub fn parse(dofs: &str) -> Result<Self, ConfigError> {
        let mut bits = 0u8;
        for ch in dofs.chars() {
            bits |= match ch {
                'x' => 1 << 0,
                'y' => 1 << 1,
                'z' => 1 << 2,
                'X' => 1 << 3,
                'Y' => 1 << 4,
                'Z' => 1 << 5,
                other => {
                    return Err(ConfigError::invalid_config(format!(
                        "unknown degree of freedom '{other}' in \"{dofs}\""
                    )))
                }
            };
        }
        Ok(Self(bits))
    }

    pub fn translation_blocked(&self, axis: usize) -> bool {
        self.0 & (1 << axis) != 0
    }

    pub fn rotation_blocked(&self, axis: usize) -> bool {
        self.0 & (1 << (axis + 3)) != 0
    }

    pub fn any_rotation(&self) -> bool {
        self.0 & 0b11_1000 != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Zeroes blocked translational components of `v`.
    pub fn mask_linear(&self, mut v: Vec3) -> Vec3 {
        for axis in 0..3 {
            if self.translation_blocked(axis) {
                v[axis] = 0.0;
            }
        }
        v
    }

    /// Zeroes blocked rotational components of `w`.
    pub fn mask_angular(&self, mut w: Vec3) -> Vec3 {
        for axis in 0..3 {
            if self.rotation_blocked(axis) {
                w[axis] = 0.0;
            }
        }
        w
    }
}

/// Kinematic carrier of one or more particles.
///
/// Rotational state is advanced through the angular momentum so that
/// non-spherical inertia (capsules, clumps) precesses correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: EntityId,
    pub pose: Pose,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
    /// World-frame angular momentum.
    pub angular_momentum: Vec3,
    pub mass: Real,
    /// Inertia tensor in the node's local frame.
    pub inertia: Mat3,
    inverse_inertia: Mat3,
    pub motion: Motion,
    pub blocked: BlockedDofs,
    #[serde(skip)]
    pub force: Vec3,
    #[serde(skip)]
    pub torque: Vec3,
}

impl Node {
    pub fn new(pose: Pose) -> Self {
        Self {
            id: EntityId::default(),
            pose,
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            angular_momentum: Vec3::ZERO,
            mass: 0.0,
            inertia: Mat3::ZERO,
            inverse_inertia: Mat3::ZERO,
            motion: Motion::Free,
            blocked: BlockedDofs::NONE,
            force: Vec3::ZERO,
            torque: Vec3::ZERO,
        }
    }

    pub fn is_free(&self) -> bool {
        self.motion.is_free()
    }

    pub fn inverse_inertia(&self) -> Mat3 {
        self.inverse_inertia
    }

    /// Replaces mass properties and re-derives the angular momentum from the
    /// current angular velocity.
    pub fn set_mass_properties(&mut self, mass: Real, inertia: Mat3) {
        self.mass = mass;
        self.inertia = inertia;
        self.inverse_inertia = if inertia.determinant().abs() > Real::MIN_POSITIVE {
            inertia.inverse()
        } else {
            Mat3::ZERO
        };
        self.sync_angular_momentum();
    }

    /// World-frame inertia tensor `R I Rᵀ`.
    pub fn world_inertia(&self) -> Mat3 {
        let r = Mat3::from_quat(self.pose.orientation);
        r * self.inertia * r.transpose()
    }

    /// Angular velocity implied by the angular momentum at the current orientation.
    pub fn angular_velocity_from_momentum(&self) -> Vec3 {
        let r = Mat3::from_quat(self.pose.orientation);
        r * (self.inverse_inertia * (r.transpose() * self.angular_momentum))
    }

    pub fn sync_angular_momentum(&mut self) {
        self.angular_momentum = self.world_inertia() * self.angular_velocity;
    }

    pub fn set_angular_velocity(&mut self, angular_velocity: Vec3) {
        self.angular_velocity = angular_velocity;
        self.sync_angular_momentum();
    }

    /// Velocity of a material point at world position `point`.
    pub fn point_velocity(&self, point: Vec3) -> Vec3 {
        self.velocity + self.angular_velocity.cross(point - self.pose.position)
    }

    /// Rests the node in place: used for static nodes and held trajectories.
    pub fn halt(&mut self) {
        self.velocity = Vec3::ZERO;
        self.angular_velocity = Vec3::ZERO;
        self.angular_momentum = Vec3::ZERO;
    }

    pub fn clear_accumulators(&mut self) {
        self.force = Vec3::ZERO;
        self.torque = Vec3::ZERO;
    }

    pub fn kinetic_energy(&self) -> Real {
        if !self.is_free() {
            return 0.0;
        }
        let translational = 0.5 * self.mass * self.velocity.length_squared();
        let rotational = 0.5 * self.angular_velocity.dot(self.world_inertia() * self.angular_velocity);
        translational + rotational
    }

    /// Smallest principal moment of inertia.
    pub fn min_principal_inertia(&self) -> Real {
        crate::utils::math::symmetric_eigenvalues(&self.inertia)[0]
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Motion::Imposed(motion) = &self.motion {
            motion.validate()?;
        }
        if self.is_free() {
            let positive_inertia = self.min_principal_inertia() > 0.0;
            if !(self.mass.is_finite() && self.mass > 0.0 && positive_inertia) {
                return Err(ConfigError::invalid_config(format!(
                    "free node {} needs positive mass and inertia (mass {})",
                    self.id, self.mass
                )));
            }
        }
        if !self.pose.position.is_finite() || !self.velocity.is_finite() {
            return Err(ConfigError::invalid_config(format!(
                "node {} has a non-finite initial state",
                self.id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{InertiaTensorExt, Quat};
    use approx::assert_relative_eq;

    #[test]
    fn parses_blocked_dofs() {
        let dofs = BlockedDofs::parse("xzY").unwrap();
        assert!(dofs.translation_blocked(0));
        assert!(!dofs.translation_blocked(1));
        assert!(dofs.translation_blocked(2));
        assert!(dofs.rotation_blocked(1));
        assert!(!dofs.rotation_blocked(0));
        assert_eq!(dofs.mask_linear(Vec3::ONE), Vec3::new(0.0, 1.0, 0.0));
        assert!(BlockedDofs::parse("q").is_err());
        assert_eq!(BlockedDofs::parse("xyzXYZ").unwrap(), BlockedDofs::ALL);
    }

    #[test]
    fn momentum_round_trips_through_rotated_inertia() {
        let mut node = Node::new(Pose::new(Vec3::ZERO, Quat::from_axis_angle(Vec3::Z, 0.6)));
        node.set_mass_properties(2.0, Mat3::from_diagonal(Vec3::new(1.0, 2.0, 3.0)));
        node.set_angular_velocity(Vec3::new(0.3, -0.2, 1.0));
        let back = node.angular_velocity_from_momentum();
        assert_relative_eq!(back.x, 0.3, epsilon = 1e-12);
        assert_relative_eq!(back.y, -0.2, epsilon = 1e-12);
        assert_relative_eq!(back.z, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn massless_free_node_is_invalid() {
        let node = Node::new(Pose::default());
        assert!(node.validate().is_err());

        let mut node = Node::new(Pose::default());
        node.set_mass_properties(1.0, Mat3::for_solid_sphere(0.1, 1.0));
        assert!(node.validate().is_ok());
    }
}
