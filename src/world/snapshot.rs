use serde::{Deserialize, Serialize};

use super::{CollisionManager, DynamicsManager, HookQueue, Scene};
use crate::{
    collision::{broadphase::SweepAndPrune, contact_store::ContactStore},
    config::SceneConfig,
    core::{
        clump::Clump,
        node::Node,
        particle::Particle,
        types::{Material, Real},
    },
    error::{ConfigError, DemError, DemResult},
    factory::Factory,
    utils::{allocator::Arena, profiling::StepProfiler},
};

/// Everything needed to resume a scene and continue it identically.
///
/// The contact law and any custom narrow-phase routines are not part of the
/// state; a restored scene uses whatever the receiving scene has installed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneState {
    pub config: SceneConfig,
    pub materials: Vec<Material>,
    pub nodes: Arena<Node>,
    pub particles: Arena<Particle>,
    pub clumps: Arena<Clump>,
    pub factories: Arena<Factory>,
    pub broadphase: SweepAndPrune,
    pub contacts: ContactStore,
    pub time: Real,
    pub step: u64,
    pub dt: Real,
}

impl Scene {
    /// Captures the complete scene state.
    pub fn snapshot(&self) -> DemResult<SceneState> {
        if self.aborted {
            return Err(DemError::Aborted);
        }
        if let Some(factory) = self
            .factories
            .iter()
            .find(|f| !f.config.generator.is_serializable())
        {
            return Err(ConfigError::UnserializableGenerator(factory.config.label.clone()).into());
        }
        Ok(SceneState {
            config: self.config.clone(),
            materials: self.materials.clone(),
            nodes: self.nodes.clone(),
            particles: self.particles.clone(),
            clumps: self.clumps.clone(),
            factories: self.factories.clone(),
            broadphase: self.collision.broadphase.clone(),
            contacts: self.collision.contacts.clone(),
            time: self.time,
            step: self.step,
            dt: self.dt,
        })
    }

    /// Builds a new scene from a snapshot with the default contact law.
    pub fn from_state(state: SceneState) -> DemResult<Self> {
        let mut scene = Scene::new(state.config.clone())?;
        scene.restore(state)?;
        Ok(scene)
    }

    /// Replaces this scene's state with `state`.
    ///
    /// The installed contact law, narrow-phase registry and hook queue are
    /// kept. An aborted scene becomes usable again.
    pub fn restore(&mut self, state: SceneState) -> DemResult<()> {
        state.config.validate()?;
        let SceneState {
            config,
            materials,
            nodes,
            particles,
            clumps,
            factories,
            broadphase,
            mut contacts,
            time,
            step,
            dt,
        } = state;
        contacts.rebuild_index();

        let narrowphase = std::mem::take(&mut self.collision.narrowphase);
        let mut collision = CollisionManager::new(config.lone_mask);
        collision.narrowphase = narrowphase;
        collision.broadphase = broadphase;
        collision.contacts = contacts;
        collision.set_parallel(config.parallel);

        let law = std::sync::Arc::clone(&self.dynamics.law);
        let mut dynamics = DynamicsManager::new(&config);
        dynamics.law = law;

        self.config = config;
        self.materials = materials;
        self.nodes = nodes;
        self.particles = particles;
        self.clumps = clumps;
        self.factories = factories;
        self.collision = collision;
        self.dynamics = dynamics;
        self.time = time;
        self.step = step;
        self.dt = dt;
        self.profiler = StepProfiler::default();
        self.validated = false;
        self.aborted = false;
        Ok(())
    }

    /// Discards pending hook calls; used when a restored scene must not see
    /// calls raised by the run it replaced.
    pub fn reset_hooks(&mut self) {
        self.hooks = HookQueue::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::{particle::ParticleBuilder, types::Vec3},
        factory::{generator::Generator, volume::SpawnVolume, FactoryConfig},
    };
    use std::sync::Arc;

    #[test]
    fn snapshot_refuses_custom_generators() {
        #[derive(Debug)]
        struct Fixed;
        impl crate::factory::generator::ShapeGenerator for Fixed {
            fn generate(&self, _rng: &mut rand::rngs::StdRng) -> crate::factory::generator::Template {
                crate::factory::generator::Template::single(
                    crate::core::shape::Shape::sphere(0.01),
                    crate::core::types::Quat::IDENTITY,
                )
            }
        }

        let mut scene = Scene::new(SceneConfig::default()).unwrap();
        let mat = scene.add_material(Material::glass()).unwrap();
        let volume = SpawnVolume::Box {
            min: Vec3::ZERO,
            max: Vec3::splat(0.1),
        };
        scene
            .add_factory(FactoryConfig::new(
                "custom",
                volume,
                Generator::Custom(Arc::new(Fixed)),
                mat,
            ))
            .unwrap();
        let err = scene.snapshot().unwrap_err();
        assert!(matches!(
            err,
            DemError::Config(ConfigError::UnserializableGenerator(ref label)) if label == "custom"
        ));
    }

    #[test]
    fn restore_clears_abort() {
        let mut scene = Scene::new(SceneConfig::default()).unwrap();
        let mat = scene.add_material(Material::glass()).unwrap();
        scene
            .add_particle(ParticleBuilder::sphere(0.01, mat).at(Vec3::new(0.0, 0.0, 1.0)))
            .unwrap();
        let state = scene.snapshot().unwrap();
        scene.aborted = true;
        assert!(matches!(scene.step(), Err(DemError::Aborted)));
        scene.restore(state).unwrap();
        assert!(scene.step().is_ok());
        assert_eq!(scene.step_count(), 1);
    }
}
