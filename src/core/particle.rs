use serde::{Deserialize, Serialize};

use super::{
    node::{BlockedDofs, Motion},
    shape::Shape,
    types::{Mat3, MaterialId, Pose, Quat, Real, Vec3},
};
use crate::utils::allocator::EntityId;

/// Default collision mask: category bit 0.
pub const DEFAULT_MASK: u32 = 0b1;

/// A single simulated body: shape, material, mask and a reference to the node
/// that carries it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Particle {
    pub id: EntityId,
    pub shape: Shape,
    pub material: MaterialId,
    pub mask: u32,
    pub node: EntityId,
    pub clump: Option<EntityId>,
    /// Pose relative to the node; identity unless the particle is a clump member.
    pub local: Pose,
    /// World pose, refreshed after every integration.
    pub pose: Pose,
    /// Own mass and local inertia, computed from shape and material density.
    pub mass: Real,
    pub inertia: Mat3,
}

impl Particle {
    pub fn is_clumped(&self) -> bool {
        self.clump.is_some()
    }

    pub fn refresh_pose(&mut self, node_pose: &Pose) {
        self.pose = node_pose.combine(&self.local);
    }
}

/// Description of a particle to be added to a scene together with its own node.
#[derive(Debug, Clone)]
pub struct ParticleBuilder {
    pub shape: Shape,
    pub material: MaterialId,
    pub mask: u32,
    pub pose: Pose,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
    pub motion: Motion,
    pub blocked: BlockedDofs,
}

impl ParticleBuilder {
    pub fn new(shape: Shape, material: MaterialId) -> Self {
        Self {
            shape,
            material,
            mask: DEFAULT_MASK,
            pose: Pose::default(),
            velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
            motion: Motion::Free,
            blocked: BlockedDofs::NONE,
        }
    }

    pub fn sphere(radius: Real, material: MaterialId) -> Self {
        Self::new(Shape::sphere(radius), material)
    }

    pub fn capsule(radius: Real, shaft: Real, material: MaterialId) -> Self {
        Self::new(Shape::capsule(radius, shaft), material)
    }

    /// Static half-space perpendicular to `axis` through `position`.
    pub fn wall(axis: usize, sense: i8, position: Vec3, material: MaterialId) -> Self {
        Self::new(Shape::wall(axis, sense), material)
            .at(position)
            .with_motion(Motion::Static)
    }

    /// Static triangle with world-space vertices.
    pub fn facet(vertices: [Vec3; 3], material: MaterialId) -> Self {
        let centroid = (vertices[0] + vertices[1] + vertices[2]) / 3.0;
        let local = [
            vertices[0] - centroid,
            vertices[1] - centroid,
            vertices[2] - centroid,
        ];
        Self::new(Shape::facet(local), material)
            .at(centroid)
            .with_motion(Motion::Static)
    }

    pub fn at(mut self, position: Vec3) -> Self {
        self.pose.position = position;
        self
    }

    pub fn oriented(mut self, orientation: Quat) -> Self {
        self.pose.orientation = orientation;
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

/// Read-only view of a particle for visualization collaborators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParticleView {
    pub id: EntityId,
    pub shape: Shape,
    pub pose: Pose,
    pub velocity: Vec3,
    pub mask: u32,
    pub clump: Option<EntityId>,
    pub motion_free: bool,
}
