use serde::{Deserialize, Serialize};

use super::{
    node::{BlockedDofs, Motion},
    shape::Shape,
    types::{Mat3, MaterialId, Pose, Quat, Real, Vec3},
};
use crate::{
    error::ConfigError,
    utils::{allocator::EntityId, math},
};

/// Rigid aggregate of particles sharing one representative node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clump {
    pub id: EntityId,
    pub node: EntityId,
    pub members: Vec<EntityId>,
}

impl Clump {
    pub fn contains(&self, particle: EntityId) -> bool {
        self.members.contains(&particle)
    }
}

/// Mass data of one member, in world coordinates.
#[derive(Debug, Clone, Copy)]
pub struct MemberMass {
    pub mass: Real,
    /// Inertia in the member's own frame.
    pub inertia: Mat3,
    pub pose: Pose,
}

/// Aggregate mass properties expressed in a clump frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompositeMass {
    pub mass: Real,
    pub center: Vec3,
    pub inertia: Mat3,
}

/// Combines member masses into a composite about `center` (or the mass
/// centroid when `center` is `None`), with the tensor expressed in a frame
/// rotated by `orientation`.
pub fn composite_mass(
    members: &[MemberMass],
    center: Option<Vec3>,
    orientation: Quat,
) -> Result<CompositeMass, ConfigError> {
    if members.is_empty() {
        return Err(ConfigError::inconsistent_clump("a clump needs at least one member"));
    }
    let mass: Real = members.iter().map(|m| m.mass).sum();
    let center = match center {
        Some(center) => center,
        None if mass > 0.0 => {
            members
                .iter()
                .fold(Vec3::ZERO, |acc, m| acc + m.pose.position * m.mass)
                / mass
        }
        None => {
            members.iter().fold(Vec3::ZERO, |acc, m| acc + m.pose.position)
                / members.len() as Real
        }
    };

    let frame = Mat3::from_quat(orientation);
    let to_frame = frame.transpose();
    let mut inertia = Mat3::ZERO;
    for member in members {
        let world = math::rotate_tensor(member.pose.orientation, member.inertia);
        let in_frame = to_frame * world * frame;
        let offset = to_frame * (member.pose.position - center);
        inertia += in_frame + math::parallel_axis(member.mass, offset);
    }

    if !center.is_finite() || !mass.is_finite() {
        return Err(ConfigError::inconsistent_clump(
            "member poses or masses are not finite",
        ));
    }
    Ok(CompositeMass {
        mass,
        center,
        inertia,
    })
}

/// One member of a clump under construction, posed relative to the clump origin.
#[derive(Debug, Clone)]
pub struct ClumpMemberSpec {
    pub shape: Shape,
    pub material: MaterialId,
    pub local: Pose,
}

/// Description of a new clump built from fresh particles.
#[derive(Debug, Clone)]
pub struct ClumpBuilder {
    pub members: Vec<ClumpMemberSpec>,
    pub mask: u32,
    /// Placement of the member frame in the world.
    pub pose: Pose,
    /// Explicit node position; defaults to the mass centroid.
    pub center: Option<Vec3>,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
    pub motion: Motion,
    pub blocked: BlockedDofs,
}

impl ClumpBuilder {
    pub fn new() -> Self {
        Self {
            members: Vec::new(),
            mask: super::particle::DEFAULT_MASK,
            pose: Pose::default(),
            center: None,
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            motion: Motion::Free,
            blocked: BlockedDofs::NONE,
        }
    }

    pub fn member(mut self, shape: Shape, material: MaterialId, local: Pose) -> Self {
        self.members.push(ClumpMemberSpec {
            shape,
            material,
            local,
        });
        self
    }

    pub fn at(mut self, pose: Pose) -> Self {
        self.pose = pose;
        self
    }

    pub fn centered_at(mut self, center: Vec3) -> Self {
        self.center = Some(center);
        self
    }

    pub fn with_mask(mut self, mask: u32) -> Self {
        self.mask = mask;
        self
    }

    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }

    pub fn with_angular_velocity(mut self, angular_velocity: Vec3) -> Self {
        self.angular_velocity = angular_velocity;
        self
    }

    pub fn with_motion(mut self, motion: Motion) -> Self {
        self.motion = motion;
        self
    }

    pub fn with_blocked(mut self, blocked: BlockedDofs) -> Self {
        self.blocked = blocked;
        self
    }
}

impl Default for ClumpBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::InertiaTensorExt;
    use approx::assert_relative_eq;

    #[test]
    fn centroid_is_mass_weighted() {
        let members = [
            MemberMass {
                mass: 1.0,
                inertia: Mat3::for_solid_sphere(0.1, 1.0),
                pose: Pose::from_position(Vec3::ZERO),
            },
            MemberMass {
                mass: 3.0,
                inertia: Mat3::for_solid_sphere(0.1, 3.0),
                pose: Pose::from_position(Vec3::new(4.0, 0.0, 0.0)),
            },
        ];
        let composite = composite_mass(&members, None, Quat::IDENTITY).unwrap();
        assert_relative_eq!(composite.mass, 4.0);
        assert_relative_eq!(composite.center.x, 3.0);
        // parallel-axis about y: 1*9 + 3*1 plus both sphere terms
        let expected = 9.0 + 3.0 + 0.4 * 0.01 * 4.0;
        assert_relative_eq!(composite.inertia.y_axis.y, expected, epsilon = 1e-12);
        assert_relative_eq!(composite.inertia.x_axis.x, 0.4 * 0.01 * 4.0, epsilon = 1e-12);
    }

    #[test]
    fn empty_clump_is_inconsistent() {
        assert!(matches!(
            composite_mass(&[], None, Quat::IDENTITY),
            Err(ConfigError::InconsistentClump(_))
        ));
    }
}
