#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::forces::ForceBuffer;
use crate::{
    core::{
        clump::{composite_mass, Clump, CompositeMass, MemberMass},
        node::Node,
        particle::Particle,
        types::Vec3,
    },
    error::ConfigError,
    utils::allocator::Arena,
};

/// Moves loads from particles up to their nodes and poses back down.
#[derive(Debug, Clone, Default)]
pub struct ClumpAggregator {
    parallel: bool,
}

impl ClumpAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_parallel(&mut self, enabled: bool) {
        self.parallel = enabled;
    }

    /// Clears node accumulators and folds each particle's force into its node.
    ///
    /// A member's force acts at the member position, so it contributes the
    /// moment `(x_member - x_node) × f` on top of its own torque.
    pub fn reduce_to_nodes(
        &self,
        buffer: &ForceBuffer,
        particles: &Arena<Particle>,
        nodes: &mut Arena<Node>,
    ) {
        for node in nodes.iter_mut() {
            node.clear_accumulators();
        }
        for particle in particles.iter() {
            let slot = particle.id.index();
            let force = buffer.force(slot);
            let torque = buffer.torque(slot);
            if force == Vec3::ZERO && torque == Vec3::ZERO {
                continue;
            }
            let Some(node) = nodes.get_mut(particle.node) else {
                continue;
            };
            let arm = particle.pose.position - node.pose.position;
            node.force += force;
            node.torque += torque + arm.cross(force);
        }
    }

    /// Recomputes every particle's world pose from its node.
    pub fn update_member_poses(&self, particles: &mut Arena<Particle>, nodes: &Arena<Node>) {
        let refresh = |particle: &mut Particle| {
            if let Some(node) = nodes.get(particle.node) {
                particle.refresh_pose(&node.pose);
            }
        };

        #[cfg(feature = "parallel")]
        if self.parallel {
            particles.par_iter_mut().for_each(refresh);
            return;
        }

        particles.iter_mut().for_each(refresh);
    }

    /// Composite mass of a clump's current members from their world poses.
    ///
    /// `keep_center` pins the node position instead of moving it to the mass
    /// centroid; the frame orientation is the node's current orientation.
    pub fn composite_of(
        clump: &Clump,
        particles: &Arena<Particle>,
        node: &Node,
        keep_center: bool,
    ) -> Result<CompositeMass, ConfigError> {
        let members = clump
            .members
            .iter()
            .map(|id| {
                particles
                    .get(*id)
                    .map(|p| MemberMass {
                        mass: p.mass,
                        inertia: p.inertia,
                        pose: p.pose,
                    })
                    .ok_or(ConfigError::unknown("particle", *id))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let center = keep_center.then_some(node.pose.position);
        composite_mass(&members, center, node.pose.orientation)
    }

    /// Re-derives the clump node's mass, inertia and member offsets after a
    /// membership change, preserving the world pose of every member.
    ///
    /// Non-free nodes keep their position so that an imposed trajectory or a
    /// fixed support is not displaced.
    pub fn rebuild_clump(
        clump: &Clump,
        particles: &mut Arena<Particle>,
        node: &mut Node,
    ) -> Result<(), ConfigError> {
        let composite = Self::composite_of(clump, particles, node, !node.is_free())?;
        let velocity_at_center = node.point_velocity(composite.center);
        node.pose.position = composite.center;
        node.velocity = velocity_at_center;
        node.set_mass_properties(composite.mass, composite.inertia);

        for id in &clump.members {
            if let Some(particle) = particles.get_mut(*id) {
                particle.local = node.pose.relative(&particle.pose);
                particle.clump = Some(clump.id);
                particle.node = node.id;
            }
        }
        Ok(())
    }
}
