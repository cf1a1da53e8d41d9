//! Grainflow – discrete-element simulation of granular media in Rust.
//!
//! Particles (spheres, capsules, facets, walls) are carried by nodes that
//! integrate rigid-body motion; rigid clusters share one node as a clump.
//! Each step detects contacts with a sweep-and-prune broad phase, resolves
//! their geometry, applies a visco-elastic frictional contact law and
//! advances the nodes with a leapfrog integrator. Factories inject new
//! particles while the scene runs.

pub mod collision;
pub mod config;
pub mod core;
pub mod dynamics;
pub mod error;
pub mod factory;
pub mod utils;
pub mod world;

use std::collections::HashMap;

use log::warn;

pub use collision::{Contact, ContactGeometry, ContactState, NarrowPhaseRegistry, PairKey};
pub use config::{SceneConfig, TimestepMode};
pub use core::{
    BlockedDofs, Clump, ClumpBuilder, InterpolatedMotion, Material, MaterialId, MixingMode,
    Motion, Node, Particle, ParticleBuilder, ParticleView, Pose, Quat, Real, Shape, ShapeKind,
    Vec3,
};
pub use dynamics::{ContactLaw, ViscoElasticLaw};
pub use error::{ConfigError, DemError, DemResult, StabilityError};
pub use factory::{FactoryConfig, FactoryPeriod, Generator, SpawnVolume};
pub use utils::allocator::{Arena, EntityId, GenerationalId};
pub use world::{HookCall, HookQueue, Scene, SceneState, StepReport};

/// Callback run when a factory raises its completion hook.
pub type HookFn = Box<dyn FnMut(&mut Scene, &HookCall) -> DemResult<()> + Send>;

/// High-level convenience wrapper that owns a [`Scene`] and dispatches
/// factory completion hooks to registered callbacks between steps.
pub struct DemEngine {
    scene: Scene,
    hooks: HashMap<String, HookFn>,
}

impl DemEngine {
    /// Creates an empty engine with the provided scene parameters.
    pub fn new(config: SceneConfig) -> DemResult<Self> {
        Ok(Self::from_scene(Scene::new(config)?))
    }

    /// Wraps an existing scene.
    pub fn from_scene(scene: Scene) -> Self {
        Self {
            scene,
            hooks: HashMap::new(),
        }
    }

    /// Registers the callback run for hook `name`, replacing any earlier one.
    pub fn register_hook<F>(&mut self, name: impl Into<String>, hook: F)
    where
        F: FnMut(&mut Scene, &HookCall) -> DemResult<()> + Send + 'static,
    {
        self.hooks.insert(name.into(), Box::new(hook));
    }

    /// Advances the scene by one step and then runs the hooks it raised.
    pub fn step(&mut self) -> DemResult<StepReport> {
        let report = self.scene.step()?;
        self.dispatch_hooks()?;
        Ok(report)
    }

    /// Runs `steps` steps.
    pub fn run(&mut self, steps: u64) -> DemResult<()> {
        for _ in 0..steps {
            self.step()?;
        }
        Ok(())
    }

    /// Steps until the scene time reaches `time`; returns the steps taken.
    pub fn run_until(&mut self, time: Real) -> DemResult<u64> {
        let mut taken = 0;
        while self.scene.time() < time {
            self.step()?;
            taken += 1;
        }
        Ok(taken)
    }

    fn dispatch_hooks(&mut self) -> DemResult<()> {
        for call in self.scene.drain_hooks() {
            match self.hooks.get_mut(&call.hook) {
                Some(hook) => hook(&mut self.scene, &call)?,
                None => warn!("no callback registered for hook '{}'", call.hook),
            }
        }
        Ok(())
    }

    /// Immutable access to the scene.
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Mutable access to the scene.
    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    /// Releases the scene.
    pub fn into_scene(self) -> Scene {
        self.scene
    }
}
