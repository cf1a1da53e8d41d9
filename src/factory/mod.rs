//! Particle injection: periodic factories placing generated shapes in a spawn volume.

pub mod generator;
pub mod volume;

use log::{debug, info};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

pub use generator::{
    random_orientation, CapsuleGenerator, Generator, PharmaCapsuleGenerator, PsdSphereGenerator,
    ShapeGenerator, Template, TemplateMember,
};
pub use volume::SpawnVolume;

use crate::{
    core::{
        particle::DEFAULT_MASK,
        types::{Material, MaterialId, Pose, Real, Vec3},
    },
    error::{ConfigError, DemError},
    utils::allocator::EntityId,
};

/// How often a factory fires.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FactoryPeriod {
    Steps(u64),
    Time(Real),
}

/// Static description of a factory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactoryConfig {
    pub label: String,
    pub period: FactoryPeriod,
    pub volume: SpawnVolume,
    pub generator: Generator,
    /// Materials picked uniformly for each new particle.
    pub materials: Vec<MaterialId>,
    pub mask: u32,
    /// Target mass per unit time; zero places as much as fits at every firing.
    pub mass_flow_rate: Real,
    pub max_mass: Option<Real>,
    pub max_num: Option<u64>,
    /// Placement attempts per generated particle.
    pub attempts: u32,
    pub initial_velocity: Vec3,
    /// Opaque completion hook name, dispatched once when the budget is exhausted.
    pub hook: Option<String>,
}

impl FactoryConfig {
    pub fn new(
        label: impl Into<String>,
        volume: SpawnVolume,
        generator: Generator,
        material: MaterialId,
    ) -> Self {
        Self {
            label: label.into(),
            period: FactoryPeriod::Steps(1),
            volume,
            generator,
            materials: vec![material],
            mask: DEFAULT_MASK,
            mass_flow_rate: 0.0,
            max_mass: None,
            max_num: None,
            attempts: 100,
            initial_velocity: Vec3::ZERO,
            hook: None,
        }
    }

    pub fn every_steps(mut self, steps: u64) -> Self {
        self.period = FactoryPeriod::Steps(steps);
        self
    }

    pub fn every_seconds(mut self, seconds: Real) -> Self {
        self.period = FactoryPeriod::Time(seconds);
        self
    }

    pub fn with_mask(mut self, mask: u32) -> Self {
        self.mask = mask;
        self
    }

    pub fn with_mass_flow_rate(mut self, rate: Real) -> Self {
        self.mass_flow_rate = rate;
        self
    }

    pub fn with_max_mass(mut self, max_mass: Real) -> Self {
        self.max_mass = Some(max_mass);
        self
    }

    pub fn with_max_num(mut self, max_num: u64) -> Self {
        self.max_num = Some(max_num);
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_initial_velocity(mut self, velocity: Vec3) -> Self {
        self.initial_velocity = velocity;
        self
    }

    pub fn with_hook(mut self, hook: impl Into<String>) -> Self {
        self.hook = Some(hook.into());
        self
    }

    pub fn validate(&self, material_count: usize) -> Result<(), ConfigError> {
        let fail = |reason: String| ConfigError::InvalidFactory {
            label: self.label.clone(),
            reason,
        };
        match self.period {
            FactoryPeriod::Steps(0) => return Err(fail("step period must be at least 1".into())),
            FactoryPeriod::Time(t) if !(t > 0.0 && t.is_finite()) => {
                return Err(fail(format!("time period must be positive, got {t}")))
            }
            _ => {}
        }
        if self.materials.is_empty() {
            return Err(fail("no materials given".into()));
        }
        if let Some(missing) = self
            .materials
            .iter()
            .find(|m| m.0 as usize >= material_count)
        {
            return Err(fail(format!("unknown material {}", missing.0)));
        }
        if self.mask == 0 {
            return Err(fail("mask must not be empty".into()));
        }
        if !(self.mass_flow_rate >= 0.0 && self.mass_flow_rate.is_finite()) {
            return Err(fail(format!(
                "mass flow rate must be non-negative, got {}",
                self.mass_flow_rate
            )));
        }
        if let Some(max_mass) = self.max_mass {
            if !(max_mass > 0.0) {
                return Err(fail(format!("max_mass must be positive, got {max_mass}")));
            }
        }
        if self.attempts == 0 {
            return Err(fail("attempts must be at least 1".into()));
        }
        if !self.initial_velocity.is_finite() {
            return Err(fail("initial velocity must be finite".into()));
        }
        self.volume.validate().map_err(fail)?;
        self.generator.validate().map_err(fail)?;
        Ok(())
    }
}

/// Running totals of a factory; part of every snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactoryState {
    pub mass: Real,
    pub num: u64,
    pub firings: u64,
    pub last_time: Real,
    pub last_step: u64,
    /// Mass owed to the flow-rate target by previous firings.
    pub mass_deficit: Real,
    pub exhausted: bool,
    pub hook_fired: bool,
}

/// Scene services a factory needs while firing.
pub trait SpawnContext {
    fn material(&self, id: MaterialId) -> Option<&Material>;

    /// Whether `template` placed at `pose` would touch any existing particle
    /// whose mask intersects `mask`.
    fn overlaps(&self, template: &Template, pose: &Pose, mask: u32) -> Result<bool, DemError>;

    /// Adds the template to the scene, returning the ids of the new particles.
    fn spawn(
        &mut self,
        template: &Template,
        pose: &Pose,
        material: MaterialId,
        mask: u32,
        velocity: Vec3,
    ) -> Result<Vec<EntityId>, DemError>;
}

/// Result of one firing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FiringReport {
    pub placed: Vec<EntityId>,
    pub mass: Real,
    /// Set when the budget ran out during this firing.
    pub exhausted: bool,
    /// Set when the attempts for one particle all failed.
    pub congested: bool,
}

/// A periodic particle injector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Factory {
    pub id: EntityId,
    pub config: FactoryConfig,
    pub state: FactoryState,
}

impl Factory {
    pub fn new(id: EntityId, config: FactoryConfig, time: Real, step: u64) -> Self {
        Self {
            id,
            config,
            state: FactoryState {
                last_time: time,
                last_step: step,
                ..FactoryState::default()
            },
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.state.exhausted
    }

    /// Whether the period has elapsed since the last firing.
    pub fn is_due(&self, time: Real, step: u64) -> bool {
        if self.state.exhausted {
            return false;
        }
        match self.config.period {
            FactoryPeriod::Steps(n) => step.saturating_sub(self.state.last_step) >= n,
            FactoryPeriod::Time(period) => time - self.state.last_time >= period,
        }
    }

    /// Deterministic generator for the current firing.
    fn firing_rng(&self, scene_seed: u64) -> StdRng {
        let mixed = scene_seed ^ ((self.id.index() as u64) << 32) ^ self.state.firings;
        StdRng::seed_from_u64(splitmix64(mixed))
    }

    /// Places particles until the per-firing goal, the budget or the free
    /// space runs out.
    pub fn fire(
        &mut self,
        ctx: &mut dyn SpawnContext,
        time: Real,
        step: u64,
        scene_seed: u64,
    ) -> Result<FiringReport, DemError> {
        let mut rng = self.firing_rng(scene_seed);
        let elapsed = time - self.state.last_time;
        let goal = if self.config.mass_flow_rate > 0.0 {
            Some(self.config.mass_flow_rate * elapsed + self.state.mass_deficit)
        } else {
            None
        };

        let mut report = FiringReport::default();
        loop {
            if goal.is_some_and(|g| report.mass >= g) {
                break;
            }

            let template = self.config.generator.generate(&mut rng);
            let pick = rng.gen_range(0..self.config.materials.len());
            let material_id = self.config.materials[pick];
            let density = ctx
                .material(material_id)
                .map(|m| m.density)
                .ok_or_else(|| ConfigError::InvalidFactory {
                    label: self.config.label.clone(),
                    reason: format!("unknown material {}", material_id.0),
                })?;
            let mass = template.mass(density);

            let over_mass = self
                .config
                .max_mass
                .is_some_and(|max| self.state.mass + mass > max);
            let over_num = self.config.max_num.is_some_and(|max| self.state.num >= max);
            if over_mass || over_num {
                self.state.exhausted = true;
                report.exhausted = true;
                break;
            }

            let clearance = template.bounding_radius();
            let mut placed_at = None;
            for _ in 0..self.config.attempts {
                let Some(center) = self.config.volume.sample_center(&mut rng, clearance) else {
                    break;
                };
                let pose = Pose::from_position(center);
                if !ctx.overlaps(&template, &pose, self.config.mask)? {
                    placed_at = Some(pose);
                    break;
                }
            }
            let Some(pose) = placed_at else {
                report.congested = true;
                debug!(
                    "factory '{}': no free spot after {} attempts at t={time:.6}, retrying next period",
                    self.config.label, self.config.attempts
                );
                break;
            };

            let ids = ctx.spawn(
                &template,
                &pose,
                material_id,
                self.config.mask,
                self.config.initial_velocity,
            )?;
            report.placed.extend(ids);
            report.mass += mass;
            self.state.mass += mass;
            self.state.num += 1;

            let reached_mass = self.config.max_mass.is_some_and(|max| self.state.mass >= max);
            let reached_num = self.config.max_num.is_some_and(|max| self.state.num >= max);
            if reached_mass || reached_num {
                self.state.exhausted = true;
                report.exhausted = true;
                break;
            }
        }

        if let Some(goal) = goal {
            self.state.mass_deficit = goal - report.mass;
        }
        self.state.firings += 1;
        self.state.last_time = time;
        self.state.last_step = step;

        if report.exhausted {
            info!(
                "factory '{}' exhausted at t={time:.6}: {} particles, mass {:.6}",
                self.config.label, self.state.num, self.state.mass
            );
        }
        Ok(report)
    }

    /// Hook name of an exhausted factory, handed out only once.
    pub fn take_hook(&mut self) -> Option<String> {
        if !self.state.exhausted || self.state.hook_fired {
            return None;
        }
        self.state.hook_fired = true;
        self.config.hook.clone()
    }
}

fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::shape::Shape;

    /// Records spawns without any geometry; every spot is free.
    struct OpenField {
        materials: Vec<Material>,
        spawned: u32,
    }

    impl SpawnContext for OpenField {
        fn material(&self, id: MaterialId) -> Option<&Material> {
            self.materials.get(id.0 as usize)
        }

        fn overlaps(&self, _: &Template, _: &Pose, _: u32) -> Result<bool, DemError> {
            Ok(false)
        }

        fn spawn(
            &mut self,
            _: &Template,
            _: &Pose,
            _: MaterialId,
            _: u32,
            _: Vec3,
        ) -> Result<Vec<EntityId>, DemError> {
            self.spawned += 1;
            Ok(vec![EntityId::from_index(self.spawned)])
        }
    }

    fn sphere_factory() -> Factory {
        let config = FactoryConfig::new(
            "feed",
            SpawnVolume::Box {
                min: Vec3::ZERO,
                max: Vec3::ONE,
            },
            Generator::PsdSphere(PsdSphereGenerator::mono(0.1)),
            MaterialId(0),
        );
        Factory::new(EntityId::from_index(0), config, 0.0, 0)
    }

    fn field() -> OpenField {
        OpenField {
            materials: vec![Material::new("m").with_density(1000.0)],
            spawned: 0,
        }
    }

    #[test]
    fn step_period_controls_firing() {
        let mut factory = sphere_factory();
        factory.config.period = FactoryPeriod::Steps(10);
        assert!(!factory.is_due(0.0, 5));
        assert!(factory.is_due(0.0, 10));
    }

    #[test]
    fn budget_is_never_exceeded_and_hook_is_taken_once() {
        let mut factory = sphere_factory();
        let one = Shape::sphere(0.05).volume() * 1000.0;
        factory.config.max_mass = Some(3.5 * one);
        factory.config.hook = Some("done".into());
        let mut ctx = field();

        let report = factory.fire(&mut ctx, 0.1, 1, 0).unwrap();
        assert_eq!(report.placed.len(), 3);
        assert!(report.exhausted);
        assert!(factory.state.mass <= 3.5 * one);
        assert_eq!(factory.take_hook().as_deref(), Some("done"));
        assert_eq!(factory.take_hook(), None);
        assert!(!factory.is_due(1.0, 100));
    }

    #[test]
    fn flow_rate_limits_mass_per_firing() {
        let mut factory = sphere_factory();
        let one = Shape::sphere(0.05).volume() * 1000.0;
        factory.config.mass_flow_rate = 2.0 * one;
        let mut ctx = field();
        let report = factory.fire(&mut ctx, 1.0, 1, 0).unwrap();
        assert_eq!(report.placed.len(), 2);
        assert!(factory.state.mass_deficit.abs() < 1e-9 * one);
    }

    #[test]
    fn firings_are_reproducible_from_the_seed() {
        let config_a = sphere_factory();
        let config_b = sphere_factory();
        let mut rng_a = config_a.firing_rng(42);
        let mut rng_b = config_b.firing_rng(42);
        assert_eq!(rng_a.gen::<u64>(), rng_b.gen::<u64>());
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let factory = sphere_factory();
        assert!(factory.config.validate(1).is_ok());
        assert!(factory.config.validate(0).is_err());
        let mut bad = factory.config.clone();
        bad.attempts = 0;
        assert!(matches!(
            bad.validate(1),
            Err(ConfigError::InvalidFactory { .. })
        ));
    }
}
