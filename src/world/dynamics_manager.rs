use std::sync::Arc;

use crate::{
    collision::contact::Contact,
    config::SceneConfig,
    core::{
        node::Node,
        particle::Particle,
        types::{Real, Vec3},
    },
    dynamics::{
        aggregator::ClumpAggregator,
        forces::ForceBuffer,
        integrator::LeapfrogIntegrator,
        law::{ContactLaw, ViscoElasticLaw},
        timestep::TimestepController,
    },
    error::StabilityError,
    utils::allocator::Arena,
};

/// Contact law, force reduction, timestep control and integration of a scene.
#[derive(Debug, Clone)]
pub struct DynamicsManager {
    pub law: Arc<dyn ContactLaw>,
    pub integrator: LeapfrogIntegrator,
    pub timestep: TimestepController,
    pub aggregator: ClumpAggregator,
    forces: ForceBuffer,
}

impl Default for DynamicsManager {
    fn default() -> Self {
        Self::new(&SceneConfig::default())
    }
}

impl DynamicsManager {
    pub fn new(config: &SceneConfig) -> Self {
        let mut manager = Self {
            law: Arc::new(ViscoElasticLaw),
            integrator: LeapfrogIntegrator::new(config.gravity, config.damping),
            timestep: TimestepController::new(config.dt_safety, config.max_dt, config.timestep),
            aggregator: ClumpAggregator::new(),
            forces: ForceBuffer::default(),
        };
        manager.set_parallel(config.parallel);
        manager
    }

    pub fn set_parallel(&mut self, enabled: bool) {
        self.integrator.set_parallel(enabled);
        self.aggregator.set_parallel(enabled);
    }

    /// Pushes changed scene parameters into the owned stages.
    pub fn apply_config(&mut self, config: &SceneConfig) {
        self.integrator.gravity = config.gravity;
        self.integrator.damping = config.damping;
        self.timestep.dt_safety = config.dt_safety;
        self.timestep.max_dt = config.max_dt;
        self.timestep.mode = config.timestep;
        self.set_parallel(config.parallel);
    }

    /// Sums contact forces per particle, then per node.
    pub fn accumulate(
        &mut self,
        contacts: &Arena<Contact>,
        particles: &Arena<Particle>,
        nodes: &mut Arena<Node>,
    ) {
        self.forces.reset(particles.slot_count());
        self.forces.accumulate_contacts(contacts);
        self.aggregator.reduce_to_nodes(&self.forces, particles, nodes);
    }

    /// Advances all nodes and re-poses every particle from its node.
    pub fn integrate(
        &self,
        nodes: &mut Arena<Node>,
        particles: &mut Arena<Particle>,
        time: Real,
        dt: Real,
        step: u64,
    ) -> Result<(), StabilityError> {
        self.integrator.step(nodes, time, dt, step)?;
        self.aggregator.update_member_poses(particles, nodes);
        Ok(())
    }

    /// Force last accumulated on a particle (before clump reduction).
    pub fn particle_force(&self, particle: &Particle) -> Vec3 {
        self.forces.force(particle.id.index())
    }
}
