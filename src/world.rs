//! The scene: entity storage and the ordered per-step pipeline.

pub mod collision_manager;
pub mod dynamics_manager;
pub mod hooks;
pub mod report;
pub mod snapshot;

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
    time::Instant,
};

use log::{error, info};

pub use collision_manager::{CollisionManager, ContactInput, NarrowPhaseStats};
pub use dynamics_manager::DynamicsManager;
pub use hooks::{HookCall, HookQueue};
pub use report::StepReport;
pub use snapshot::SceneState;

use crate::{
    collision::{
        contact::{Contact, PairKey},
        contact_store::ContactStore,
        narrowphase::Resolution,
    },
    config::SceneConfig,
    core::{
        clump::{composite_mass, Clump, ClumpBuilder, MemberMass},
        node::{Motion, Node},
        particle::{Particle, ParticleBuilder, ParticleView},
        shape::ShapeKind,
        types::{Material, MaterialId, Pose, Quat, Real, Vec3},
    },
    dynamics::{aggregator::ClumpAggregator, law::ContactLaw},
    error::{ConfigError, DemError, DemResult},
    factory::{Factory, FactoryConfig, SpawnContext, Template},
    utils::{
        allocator::{Arena, EntityId},
        logging::{warn_if_step_budget_exceeded, ScopedTimer},
        profiling::{PhaseTimer, StepProfiler},
    },
};

/// A discrete-element scene: materials, nodes, particles, clumps, contacts
/// and factories, advanced one step at a time.
#[derive(Debug)]
pub struct Scene {
    config: SceneConfig,
    materials: Vec<Material>,
    nodes: Arena<Node>,
    particles: Arena<Particle>,
    clumps: Arena<Clump>,
    factories: Arena<Factory>,
    collision: CollisionManager,
    dynamics: DynamicsManager,
    time: Real,
    step: u64,
    dt: Real,
    hooks: HookQueue,
    profiler: StepProfiler,
    step_budget_ms: Option<f64>,
    validated: bool,
    aborted: bool,
}

impl Scene {
    pub fn new(config: SceneConfig) -> DemResult<Self> {
        config.validate()?;
        let mut collision = CollisionManager::new(config.lone_mask);
        collision.set_parallel(config.parallel);
        let dynamics = DynamicsManager::new(&config);
        Ok(Self {
            config,
            materials: Vec::new(),
            nodes: Arena::new(),
            particles: Arena::new(),
            clumps: Arena::new(),
            factories: Arena::new(),
            collision,
            dynamics,
            time: 0.0,
            step: 0,
            dt: 0.0,
            hooks: HookQueue::new(),
            profiler: StepProfiler::default(),
            step_budget_ms: None,
            validated: false,
            aborted: false,
        })
    }

    fn ensure_live(&self) -> DemResult<()> {
        if self.aborted {
            Err(DemError::Aborted)
        } else {
            Ok(())
        }
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Replaces the scene parameters; takes effect from the next step.
    pub fn set_config(&mut self, config: SceneConfig) -> DemResult<()> {
        self.ensure_live()?;
        config.validate()?;
        self.collision.filter.lone_mask = config.lone_mask;
        self.collision.set_parallel(config.parallel);
        self.dynamics.apply_config(&config);
        self.config = config;
        self.validated = false;
        Ok(())
    }

    /// Replaces the contact law used for contacts that become real from now on
    /// and for every subsequent evaluation.
    pub fn set_contact_law(&mut self, law: Arc<dyn ContactLaw>) {
        self.dynamics.law = law;
    }

    /// Warns whenever a step takes longer than `budget_ms` of wall-clock time.
    pub fn set_step_budget(&mut self, budget_ms: Option<f64>) {
        self.step_budget_ms = budget_ms;
    }

    pub fn add_material(&mut self, material: Material) -> DemResult<MaterialId> {
        self.ensure_live()?;
        material.validate()?;
        let id = MaterialId(self.materials.len() as u32);
        self.materials.push(material);
        Ok(id)
    }

    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id.0 as usize)
    }

    fn density_of(&self, id: MaterialId) -> Result<Real, ConfigError> {
        self.material(id)
            .map(|m| m.density)
            .ok_or_else(|| ConfigError::invalid_config(format!("unknown material {}", id.0)))
    }

    /// Adds a particle carried by its own new node.
    pub fn add_particle(&mut self, builder: ParticleBuilder) -> DemResult<EntityId> {
        self.ensure_live()?;
        let id = self.insert_particle(builder)?;
        self.validated = false;
        Ok(id)
    }

    fn insert_particle(&mut self, builder: ParticleBuilder) -> DemResult<EntityId> {
        builder.shape.validate()?;
        let density = self.density_of(builder.material)?;
        let pose = normalized(builder.pose)?;
        let (mass, inertia) = builder.shape.mass_properties(density);

        let mut node = Node::new(pose);
        node.id = self.nodes.next_id();
        node.motion = builder.motion;
        node.blocked = builder.blocked;
        node.velocity = builder.velocity;
        node.set_mass_properties(mass, inertia);
        node.set_angular_velocity(builder.angular_velocity);
        node.validate()?;
        let node_id = self.nodes.insert(node);

        let particle_id = self.particles.insert_with(|id| Particle {
            id,
            shape: builder.shape,
            material: builder.material,
            mask: builder.mask,
            node: node_id,
            clump: None,
            local: Pose::default(),
            pose,
            mass,
            inertia,
        });
        if let Some(particle) = self.particles.get(particle_id) {
            self.collision.insert(particle, self.config.bound_margin);
        }
        Ok(particle_id)
    }

    /// Deletes a particle, its node (unless shared by a clump) and its contacts.
    pub fn remove_particle(&mut self, id: EntityId) -> DemResult<()> {
        self.ensure_live()?;
        let particle = self
            .particles
            .get(id)
            .ok_or(ConfigError::unknown("particle", id))?;
        if let Some(clump) = particle.clump {
            self.remove_member(clump, id)?;
        }
        if let Some(particle) = self.particles.remove(id) {
            self.nodes.remove(particle.node);
        }
        self.collision.remove(id);
        self.validated = false;
        Ok(())
    }

    /// Creates a clump from new particles.
    pub fn add_clump(&mut self, builder: ClumpBuilder) -> DemResult<EntityId> {
        self.ensure_live()?;
        let id = self.insert_clump(builder)?;
        self.validated = false;
        Ok(id)
    }

    fn insert_clump(&mut self, builder: ClumpBuilder) -> DemResult<EntityId> {
        if builder.members.is_empty() {
            return Err(ConfigError::inconsistent_clump("a clump needs at least one member").into());
        }
        let frame = normalized(builder.pose)?;

        let mut prepared = Vec::with_capacity(builder.members.len());
        for member in &builder.members {
            member.shape.validate()?;
            let density = self.density_of(member.material)?;
            let (mass, inertia) = member.shape.mass_properties(density);
            let world = frame.combine(&member.local);
            prepared.push((member, MemberMass { mass, inertia, pose: world }));
        }
        let masses: Vec<MemberMass> = prepared.iter().map(|(_, m)| *m).collect();
        let composite = composite_mass(&masses, builder.center, frame.orientation)?;

        let mut node = Node::new(Pose::new(composite.center, frame.orientation));
        node.id = self.nodes.next_id();
        node.motion = builder.motion;
        node.blocked = builder.blocked;
        node.velocity = builder.velocity;
        node.set_mass_properties(composite.mass, composite.inertia);
        node.set_angular_velocity(builder.angular_velocity);
        node.validate()?;
        let node_pose = node.pose;
        let node_id = self.nodes.insert(node);

        let clump_id = self.clumps.next_id();
        let mut members = Vec::with_capacity(prepared.len());
        for (member, mass) in prepared {
            let local = node_pose.relative(&mass.pose);
            let particle_id = self.particles.insert_with(|id| Particle {
                id,
                shape: member.shape.clone(),
                material: member.material,
                mask: builder.mask,
                node: node_id,
                clump: Some(clump_id),
                local,
                pose: node_pose.combine(&local),
                mass: mass.mass,
                inertia: mass.inertia,
            });
            if let Some(particle) = self.particles.get(particle_id) {
                self.collision.insert(particle, self.config.bound_margin);
            }
            members.push(particle_id);
        }
        let stored = self.clumps.insert(Clump {
            id: clump_id,
            node: node_id,
            members,
        });
        debug_assert_eq!(stored, clump_id);
        Ok(clump_id)
    }

    /// Clumps existing independent particles under one new node.
    ///
    /// The node conserves the members' linear and angular momentum. All
    /// members must be free, or all static.
    pub fn clump_particles(&mut self, ids: &[EntityId]) -> DemResult<EntityId> {
        self.ensure_live()?;
        let unique: BTreeSet<EntityId> = ids.iter().copied().collect();
        if unique.is_empty() || unique.len() != ids.len() {
            return Err(ConfigError::inconsistent_clump(
                "clump members must be a non-empty list of distinct particles",
            )
            .into());
        }

        let mut masses = Vec::with_capacity(ids.len());
        let mut free = 0usize;
        let mut fixed = 0usize;
        for id in ids {
            let particle = self
                .particles
                .get(*id)
                .ok_or(ConfigError::unknown("particle", *id))?;
            if let Some(clump) = particle.clump {
                return Err(ConfigError::inconsistent_clump(format!(
                    "particle {id} already belongs to clump {clump}"
                ))
                .into());
            }
            let node = self
                .nodes
                .get(particle.node)
                .ok_or(ConfigError::unknown("node", particle.node))?;
            match node.motion {
                Motion::Free => free += 1,
                Motion::Static => fixed += 1,
                Motion::Imposed(_) => {}
            }
            masses.push(MemberMass {
                mass: particle.mass,
                inertia: particle.inertia,
                pose: particle.pose,
            });
        }
        let motion = if free == ids.len() {
            Motion::Free
        } else if fixed == ids.len() {
            Motion::Static
        } else {
            return Err(ConfigError::inconsistent_clump(
                "clump members must be all free or all static",
            )
            .into());
        };

        let composite = composite_mass(&masses, None, Quat::IDENTITY)?;
        let mut momentum = Vec3::ZERO;
        let mut angular_momentum = Vec3::ZERO;
        for id in ids {
            let Some(particle) = self.particles.get(*id) else {
                continue;
            };
            let Some(node) = self.nodes.get(particle.node) else {
                continue;
            };
            let offset = particle.pose.position - composite.center;
            momentum += node.velocity * particle.mass;
            angular_momentum += node.angular_momentum + offset.cross(node.velocity * particle.mass);
        }

        let mut node = Node::new(Pose::from_position(composite.center));
        node.id = self.nodes.next_id();
        node.motion = motion;
        node.set_mass_properties(composite.mass, composite.inertia);
        if node.is_free() && composite.mass > 0.0 {
            node.velocity = momentum / composite.mass;
            node.angular_momentum = angular_momentum;
            node.angular_velocity = node.angular_velocity_from_momentum();
        }
        node.validate()?;
        let node_pose = node.pose;
        let node_id = self.nodes.insert(node);

        let clump_id = self.clumps.next_id();
        for id in ids {
            if let Some(particle) = self.particles.get_mut(*id) {
                self.nodes.remove(particle.node);
                particle.node = node_id;
                particle.clump = Some(clump_id);
                particle.local = node_pose.relative(&particle.pose);
            }
        }
        self.clumps.insert(Clump {
            id: clump_id,
            node: node_id,
            members: ids.to_vec(),
        });
        self.validated = false;
        info!("clumped {} particles into {clump_id}", ids.len());
        Ok(clump_id)
    }

    /// Moves an independent particle into an existing clump; it adopts the
    /// clump's motion.
    pub fn add_member(&mut self, clump_id: EntityId, particle_id: EntityId) -> DemResult<()> {
        self.ensure_live()?;
        let clump = self
            .clumps
            .get(clump_id)
            .ok_or(ConfigError::unknown("clump", clump_id))?;
        let particle = self
            .particles
            .get(particle_id)
            .ok_or(ConfigError::unknown("particle", particle_id))?;
        if particle.clump.is_some() {
            return Err(ConfigError::inconsistent_clump(format!(
                "particle {particle_id} already belongs to a clump"
            ))
            .into());
        }
        let clump_free = self.nodes.get(clump.node).is_some_and(Node::is_free);
        let particle_free = self.nodes.get(particle.node).is_some_and(Node::is_free);
        if clump_free != particle_free {
            return Err(ConfigError::inconsistent_clump(format!(
                "particle {particle_id} and clump {clump_id} differ in motion"
            ))
            .into());
        }
        let (old_node, clump_node) = (particle.node, clump.node);

        self.nodes.remove(old_node);
        if let Some(particle) = self.particles.get_mut(particle_id) {
            particle.node = clump_node;
        }
        let Some(clump) = self.clumps.get_mut(clump_id) else {
            return Err(ConfigError::unknown("clump", clump_id).into());
        };
        clump.members.push(particle_id);
        let node = self
            .nodes
            .get_mut(clump_node)
            .ok_or(ConfigError::unknown("node", clump_node))?;
        ClumpAggregator::rebuild_clump(clump, &mut self.particles, node)?;
        self.validated = false;
        Ok(())
    }

    /// Detaches a member into an independent particle moving with the
    /// clump's velocity at its position. A clump left empty is deleted.
    pub fn remove_member(&mut self, clump_id: EntityId, particle_id: EntityId) -> DemResult<()> {
        self.ensure_live()?;
        let clump = self
            .clumps
            .get(clump_id)
            .ok_or(ConfigError::unknown("clump", clump_id))?;
        if !clump.contains(particle_id) {
            return Err(ConfigError::inconsistent_clump(format!(
                "particle {particle_id} is not a member of clump {clump_id}"
            ))
            .into());
        }
        let clump_node = self
            .nodes
            .get(clump.node)
            .ok_or(ConfigError::unknown("node", clump.node))?;
        let particle = self
            .particles
            .get(particle_id)
            .ok_or(ConfigError::unknown("particle", particle_id))?;

        let remaining_mass: Real = clump
            .members
            .iter()
            .filter(|id| **id != particle_id)
            .filter_map(|id| self.particles.get(*id))
            .map(|p| p.mass)
            .sum();
        let remaining = clump.members.len() - 1;
        if clump_node.is_free() && remaining > 0 && remaining_mass <= 0.0 {
            return Err(ConfigError::inconsistent_clump(
                "remaining members of a free clump would have no mass",
            )
            .into());
        }

        let mut node = Node::new(particle.pose);
        node.id = self.nodes.next_id();
        node.motion = if clump_node.is_free() {
            Motion::Free
        } else {
            Motion::Static
        };
        node.blocked = clump_node.blocked;
        node.set_mass_properties(particle.mass, particle.inertia);
        if node.is_free() {
            node.velocity = clump_node.point_velocity(particle.pose.position);
            node.set_angular_velocity(clump_node.angular_velocity);
        }
        node.validate()?;
        let node_id = self.nodes.insert(node);

        if let Some(particle) = self.particles.get_mut(particle_id) {
            particle.node = node_id;
            particle.clump = None;
            particle.local = Pose::default();
        }
        let Some(clump) = self.clumps.get_mut(clump_id) else {
            return Err(ConfigError::unknown("clump", clump_id).into());
        };
        clump.members.retain(|id| *id != particle_id);
        if clump.members.is_empty() {
            let node = clump.node;
            self.clumps.remove(clump_id);
            self.nodes.remove(node);
        } else {
            let node = self
                .nodes
                .get_mut(clump.node)
                .ok_or(ConfigError::unknown("node", clump.node))?;
            ClumpAggregator::rebuild_clump(clump, &mut self.particles, node)?;
        }
        self.validated = false;
        Ok(())
    }

    /// Changes how a node moves. Switching to free motion requires mass.
    pub fn set_motion(&mut self, node_id: EntityId, motion: Motion) -> DemResult<()> {
        self.ensure_live()?;
        let node = self
            .nodes
            .get_mut(node_id)
            .ok_or(ConfigError::unknown("node", node_id))?;
        let previous = std::mem::replace(&mut node.motion, motion);
        if let Err(err) = node.validate() {
            node.motion = previous;
            return Err(err.into());
        }
        if !node.is_free() {
            node.halt();
        }
        self.validated = false;
        Ok(())
    }

    /// Sets the velocities of a free node.
    pub fn set_node_velocity(
        &mut self,
        node_id: EntityId,
        velocity: Vec3,
        angular_velocity: Vec3,
    ) -> DemResult<()> {
        self.ensure_live()?;
        let node = self
            .nodes
            .get_mut(node_id)
            .ok_or(ConfigError::unknown("node", node_id))?;
        if !(velocity.is_finite() && angular_velocity.is_finite()) {
            return Err(ConfigError::invalid_config("velocities must be finite").into());
        }
        node.velocity = velocity;
        node.set_angular_velocity(angular_velocity);
        Ok(())
    }

    pub fn add_factory(&mut self, config: FactoryConfig) -> DemResult<EntityId> {
        self.ensure_live()?;
        config.validate(self.materials.len())?;
        let (time, step) = (self.time, self.step);
        let id = self
            .factories
            .insert_with(|id| Factory::new(id, config, time, step));
        Ok(id)
    }

    /// Checks the whole scene description; run automatically before the
    /// first step and after every structural change.
    pub fn validate(&self) -> DemResult<()> {
        self.config.validate()?;
        for material in &self.materials {
            material.validate()?;
        }
        for node in self.nodes.iter() {
            node.validate()?;
        }
        for particle in self.particles.iter() {
            particle.shape.validate()?;
            self.density_of(particle.material)?;
            if !self.nodes.contains(particle.node) {
                return Err(ConfigError::unknown("node", particle.node).into());
            }
            if let Some(clump_id) = particle.clump {
                let clump = self
                    .clumps
                    .get(clump_id)
                    .ok_or(ConfigError::unknown("clump", clump_id))?;
                if !clump.contains(particle.id) || clump.node != particle.node {
                    return Err(ConfigError::inconsistent_clump(format!(
                        "particle {} disagrees with clump {clump_id} about membership",
                        particle.id
                    ))
                    .into());
                }
            }
        }
        for clump in self.clumps.iter() {
            if clump.members.is_empty() {
                return Err(ConfigError::inconsistent_clump(format!("clump {} is empty", clump.id)).into());
            }
            for member in &clump.members {
                let owner = self.particles.get(*member).and_then(|p| p.clump);
                if owner != Some(clump.id) {
                    return Err(ConfigError::inconsistent_clump(format!(
                        "clump {} lists {member} which does not point back",
                        clump.id
                    ))
                    .into());
                }
            }
        }
        for factory in self.factories.iter() {
            factory.config.validate(self.materials.len())?;
        }
        self.check_shape_pairs()
    }

    /// Every pair of shape kinds that the masks allow to meet needs a
    /// narrow-phase routine.
    fn check_shape_pairs(&self) -> DemResult<()> {
        let mut present: BTreeMap<(ShapeKind, u32, bool), usize> = BTreeMap::new();
        for p in self.particles.iter() {
            let dynamic = self.nodes.get(p.node).is_some_and(Node::is_free);
            *present.entry((p.shape.kind(), p.mask, dynamic)).or_default() += 1;
        }
        for (a, count) in &present {
            for (b, _) in present.range(a..) {
                if a == b && *count < 2 {
                    continue;
                }
                let may_meet = (a.2 || b.2) && self.collision.filter.masks_allow(a.1, b.1);
                if may_meet && !self.collision.narrowphase.supports(a.0, b.0) {
                    return Err(ConfigError::UnsupportedShapePair { a: a.0, b: b.0 }.into());
                }
            }
        }
        Ok(())
    }

    /// Advances the scene by one step.
    ///
    /// Any error aborts the scene: later calls return [`DemError::Aborted`]
    /// until a snapshot is restored.
    pub fn step(&mut self) -> DemResult<StepReport> {
        self.ensure_live()?;
        if !self.validated {
            self.validate()?;
            self.validated = true;
        }
        let result = self.advance();
        if let Err(err) = &result {
            self.aborted = true;
            error!("step {} aborted: {err}", self.step);
        }
        result
    }

    fn advance(&mut self) -> DemResult<StepReport> {
        let started = Instant::now();
        let mut profile = StepProfiler::default();
        let mut report = StepReport::default();
        let step = self.step;

        {
            let _timer = ScopedTimer::new("broadphase::update");
            let _phase = PhaseTimer::new(&mut profile.broad_phase_time);
            report.bound_refreshes = self
                .collision
                .update_bounds(&self.particles, self.config.bound_margin);
        }
        {
            let _timer = ScopedTimer::new("contacts::sync");
            let _phase = PhaseTimer::new(&mut profile.contact_sync_time);
            let stats = self.collision.sync_contacts(
                &self.particles,
                &self.nodes,
                step,
                self.config.retire_grace,
            );
            report.created_contacts = stats.created;
            report.retired_contacts = stats.retired;
        }

        let law = Arc::clone(&self.dynamics.law);
        let input = ContactInput {
            particles: &self.particles,
            nodes: &self.nodes,
            materials: &self.materials,
            law: law.as_ref(),
            friction_mixing: self.config.friction_mixing,
            tolerance: self.config.contact_tolerance,
        };
        {
            let _timer = ScopedTimer::new("contacts::narrowphase");
            let _phase = PhaseTimer::new(&mut profile.narrow_phase_time);
            let stats = self.collision.resolve(&input)?;
            report.degenerate_contacts = stats.degenerate;
        }

        let critical = self.dynamics.timestep.critical(
            &self.nodes,
            &self.particles,
            self.collision.contacts.arena(),
            &self.materials,
        );
        let dt = self.dynamics.timestep.select(critical.value())?;
        {
            let _timer = ScopedTimer::new("contacts::law");
            let _phase = PhaseTimer::new(&mut profile.law_time);
            self.collision.evaluate_law(&input, dt);
        }

        {
            let _timer = ScopedTimer::new("integrator");
            let _phase = PhaseTimer::new(&mut profile.integrator_time);
            self.dynamics.accumulate(
                self.collision.contacts.arena(),
                &self.particles,
                &mut self.nodes,
            );
            self.dynamics
                .integrate(&mut self.nodes, &mut self.particles, self.time, dt, step)?;
        }

        self.time += dt;
        self.step += 1;
        self.dt = dt;

        {
            let _timer = ScopedTimer::new("factories");
            let _phase = PhaseTimer::new(&mut profile.factory_time);
            self.fire_factories(&mut report)?;
        }

        profile.particle_count = self.particles.len();
        profile.contact_count = self.collision.contacts.len();
        profile.real_contact_count = self.collision.contacts.real_count();
        profile.bound_refreshes = report.bound_refreshes;
        profile.total_step_time = started.elapsed();
        self.profiler = profile;
        if let Some(budget) = self.step_budget_ms {
            warn_if_step_budget_exceeded(step, profile.total_step_time, budget);
        }

        report.step = step;
        report.time = self.time;
        report.dt = dt;
        report.critical_dt = critical.value();
        report.contacts = profile.contact_count;
        report.real_contacts = profile.real_contact_count;
        Ok(report)
    }

    fn fire_factories(&mut self, report: &mut StepReport) -> DemResult<()> {
        if self.factories.is_empty() {
            return Ok(());
        }
        let mut factories = std::mem::take(&mut self.factories);
        let result = self.fire_each(&mut factories, report);
        self.factories = factories;
        result
    }

    fn fire_each(&mut self, factories: &mut Arena<Factory>, report: &mut StepReport) -> DemResult<()> {
        let (time, step, seed) = (self.time, self.step, self.config.seed);
        for factory in factories.iter_mut() {
            if !factory.is_due(time, step) {
                continue;
            }
            let firing = factory.fire(self, time, step, seed)?;
            report.spawned.extend(firing.placed);
            if firing.exhausted {
                report.exhausted_factories.push(factory.id);
                if let Some(hook) = factory.take_hook() {
                    self.hooks.push(HookCall {
                        hook,
                        factory: factory.id,
                        time,
                    });
                }
            }
        }
        Ok(())
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
        while self.time < time {
            self.step()?;
            taken += 1;
        }
        Ok(taken)
    }

    /// Read-only state of every particle for visualization.
    pub fn render_view(&self) -> Vec<ParticleView> {
        self.particles
            .iter()
            .map(|p| {
                let node = self.nodes.get(p.node);
                ParticleView {
                    id: p.id,
                    shape: p.shape.clone(),
                    pose: p.pose,
                    velocity: node.map_or(Vec3::ZERO, |n| n.point_velocity(p.pose.position)),
                    mask: p.mask,
                    clump: p.clump,
                    motion_free: node.is_some_and(Node::is_free),
                }
            })
            .collect()
    }

    /// Translational plus rotational kinetic energy of all free nodes.
    pub fn kinetic_energy(&self) -> Real {
        self.nodes.iter().map(Node::kinetic_energy).sum()
    }

    pub fn time(&self) -> Real {
        self.time
    }

    pub fn step_count(&self) -> u64 {
        self.step
    }

    /// Step size used by the last completed step.
    pub fn dt(&self) -> Real {
        self.dt
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub fn particle(&self, id: EntityId) -> Option<&Particle> {
        self.particles.get(id)
    }

    pub fn particles(&self) -> impl Iterator<Item = &Particle> + '_ {
        self.particles.iter()
    }

    pub fn particle_count(&self) -> usize {
        self.particles.len()
    }

    pub fn node(&self, id: EntityId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Node carrying a particle.
    pub fn node_of(&self, particle: EntityId) -> Option<&Node> {
        self.particles.get(particle).and_then(|p| self.nodes.get(p.node))
    }

    pub fn clump(&self, id: EntityId) -> Option<&Clump> {
        self.clumps.get(id)
    }

    pub fn contacts(&self) -> &ContactStore {
        &self.collision.contacts
    }

    pub fn contact_between(&self, a: EntityId, b: EntityId) -> Option<&Contact> {
        self.collision.contacts.get(PairKey::new(a, b))
    }

    /// Net contact force on a particle during the last step.
    pub fn particle_force(&self, id: EntityId) -> Option<Vec3> {
        self.particles
            .get(id)
            .map(|p| self.dynamics.particle_force(p))
    }

    pub fn factory(&self, id: EntityId) -> Option<&Factory> {
        self.factories.get(id)
    }

    pub fn collision(&self) -> &CollisionManager {
        &self.collision
    }

    /// Narrow-phase registry, for registering extra shape-pair routines.
    pub fn collision_mut(&mut self) -> &mut CollisionManager {
        self.validated = false;
        &mut self.collision
    }

    /// Handle on the completion-hook queue; clones share it.
    pub fn hook_queue(&self) -> HookQueue {
        self.hooks.clone()
    }

    pub fn drain_hooks(&self) -> Vec<HookCall> {
        self.hooks.drain()
    }

    pub fn profiler(&self) -> &StepProfiler {
        &self.profiler
    }
}

impl SpawnContext for Scene {
    fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id.0 as usize)
    }

    fn overlaps(&self, template: &Template, pose: &Pose, mask: u32) -> DemResult<bool> {
        for member in &template.members {
            let world = pose.combine(&member.local);
            let bounds = member.shape.aabb(&world);
            for other in self.collision.broadphase.query(&bounds) {
                let Some(particle) = self.particles.get(other) else {
                    continue;
                };
                if particle.mask & mask == 0 {
                    continue;
                }
                let resolution = self.collision.narrowphase.resolve(
                    &member.shape,
                    &world,
                    &particle.shape,
                    &particle.pose,
                )?;
                match resolution {
                    Resolution::Geometry(geometry) if geometry.depth <= 0.0 => {}
                    _ => return Ok(true),
                }
            }
        }
        Ok(false)
    }

    fn spawn(
        &mut self,
        template: &Template,
        pose: &Pose,
        material: MaterialId,
        mask: u32,
        velocity: Vec3,
    ) -> DemResult<Vec<EntityId>> {
        if let [member] = template.members.as_slice() {
            let world = pose.combine(&member.local);
            let builder = ParticleBuilder::new(member.shape.clone(), material)
                .at(world.position)
                .oriented(world.orientation)
                .with_mask(mask)
                .with_velocity(velocity);
            return Ok(vec![self.insert_particle(builder)?]);
        }
        let builder = template.members.iter().fold(
            ClumpBuilder::new()
                .at(*pose)
                .with_mask(mask)
                .with_velocity(velocity),
            |builder, member| builder.member(member.shape.clone(), material, member.local),
        );
        let clump = self.insert_clump(builder)?;
        Ok(self
            .clumps
            .get(clump)
            .map(|c| c.members.clone())
            .unwrap_or_default())
    }
}

fn normalized(pose: Pose) -> Result<Pose, ConfigError> {
    let orientation = pose.orientation.normalize();
    if !(pose.position.is_finite() && orientation.is_finite()) {
        return Err(ConfigError::invalid_config(
            "pose needs a finite position and a non-zero orientation",
        ));
    }
    Ok(Pose::new(pose.position, orientation))
}
