#[cfg(feature = "parallel")]
use rayon::prelude::*;

use log::{debug, warn};

use crate::{
    collision::{
        broadphase::SweepAndPrune,
        contact::{Contact, ContactState, PairKey},
        contact_store::{ContactStore, SyncStats},
        filter::{CollisionFilter, FilterProxy},
        narrowphase::{NarrowPhaseRegistry, Resolution},
    },
    core::{
        node::Node,
        particle::Particle,
        shape::Shape,
        types::{Material, MixingMode, Real},
    },
    dynamics::law::{BodyState, ContactLaw},
    error::{DemError, StabilityError},
    utils::allocator::{Arena, EntityId},
};

/// Counters of one narrow-phase pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NarrowPhaseStats {
    pub promoted: usize,
    pub demoted: usize,
    pub degenerate: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Skipped,
    Unchanged,
    Promoted,
    Demoted,
    Degenerate,
}

/// Read-only view of the scene used while resolving contacts.
pub struct ContactInput<'a> {
    pub particles: &'a Arena<Particle>,
    pub nodes: &'a Arena<Node>,
    pub materials: &'a [Material],
    pub law: &'a dyn ContactLaw,
    pub friction_mixing: MixingMode,
    pub tolerance: Real,
}

impl ContactInput<'_> {
    fn body(&self, particle: &Particle) -> Option<BodyState> {
        let node = self.nodes.get(particle.node)?;
        Some(BodyState {
            position: particle.pose.position,
            node_position: node.pose.position,
            velocity: node.velocity,
            angular_velocity: node.angular_velocity,
            dynamic: node.is_free(),
            mass: node.mass,
            radius: particle.shape.equivalent_radius(),
            material: particle.material,
        })
    }
}

/// Broad phase, contact store and narrow phase of a scene.
#[derive(Debug, Clone, Default)]
pub struct CollisionManager {
    pub broadphase: SweepAndPrune,
    pub contacts: ContactStore,
    pub narrowphase: NarrowPhaseRegistry,
    pub filter: CollisionFilter,
    parallel: bool,
}

impl CollisionManager {
    pub fn new(lone_mask: u32) -> Self {
        Self {
            filter: CollisionFilter::new(lone_mask),
            ..Self::default()
        }
    }

    pub fn set_parallel(&mut self, enabled: bool) {
        self.parallel = enabled;
    }

    /// Broad-phase inflation of a shape for the scene's relative margin.
    pub fn margin_of(shape: &Shape, bound_margin: Real) -> Real {
        match shape {
            Shape::Wall { .. } => 0.0,
            Shape::Facet { .. } => bound_margin * shape.bounding_radius(),
            _ => bound_margin * shape.equivalent_radius().unwrap_or(0.0),
        }
    }

    pub fn insert(&mut self, particle: &Particle, bound_margin: Real) {
        let tight = particle.shape.aabb(&particle.pose);
        self.broadphase
            .insert(particle.id, tight, Self::margin_of(&particle.shape, bound_margin));
    }

    /// Forgets a particle and every contact it takes part in.
    pub fn remove(&mut self, particle: EntityId) {
        self.broadphase.remove(particle);
        self.contacts.remove_involving(particle);
    }

    /// Re-checks every particle's bounds; returns how many had escaped
    /// their inflated bounds and were refreshed.
    pub fn update_bounds(&mut self, particles: &Arena<Particle>, bound_margin: Real) -> usize {
        let mut refreshed = 0;
        for particle in particles.iter() {
            let tight = particle.shape.aabb(&particle.pose);
            let margin = Self::margin_of(&particle.shape, bound_margin);
            if self.broadphase.update(particle.id, tight, margin) {
                refreshed += 1;
            }
        }
        if refreshed > 0 {
            debug!("broad phase: {refreshed} particles escaped their bounds and were refreshed");
        }
        self.broadphase.update_pairs();
        refreshed
    }

    fn proxy(particles: &Arena<Particle>, nodes: &Arena<Node>, id: EntityId) -> Option<FilterProxy> {
        let particle = particles.get(id)?;
        Some(FilterProxy {
            id,
            mask: particle.mask,
            clump: particle.clump,
            dynamic: nodes.get(particle.node).is_some_and(Node::is_free),
        })
    }

    /// Overlapping pairs that pass the filter, in ascending pair order.
    pub fn candidates(&self, particles: &Arena<Particle>, nodes: &Arena<Node>) -> Vec<PairKey> {
        self.broadphase.candidates(|pair| {
            match (
                Self::proxy(particles, nodes, pair.first()),
                Self::proxy(particles, nodes, pair.second()),
            ) {
                (Some(a), Some(b)) => self.filter.may_contact(&a, &b),
                _ => false,
            }
        })
    }

    /// Brings the contact store in line with the current candidates.
    pub fn sync_contacts(
        &mut self,
        particles: &Arena<Particle>,
        nodes: &Arena<Node>,
        step: u64,
        grace: u32,
    ) -> SyncStats {
        let candidates = self.candidates(particles, nodes);
        self.contacts.sync(&candidates, step, grace)
    }

    /// Computes geometry for every present contact and moves contacts between
    /// the potential and real states.
    pub fn resolve(&mut self, input: &ContactInput<'_>) -> Result<NarrowPhaseStats, DemError> {
        let registry = &self.narrowphase;
        let resolve = |contact: &mut Contact| resolve_contact(contact, registry, input);

        #[cfg(feature = "parallel")]
        let outcomes: Vec<Outcome> = if self.parallel {
            self.contacts
                .arena_mut()
                .par_iter_mut()
                .map(resolve)
                .collect::<Result<Vec<_>, DemError>>()?
        } else {
            self.contacts
                .iter_mut()
                .map(resolve)
                .collect::<Result<Vec<_>, DemError>>()?
        };

        #[cfg(not(feature = "parallel"))]
        let outcomes: Vec<Outcome> = self
            .contacts
            .iter_mut()
            .map(resolve)
            .collect::<Result<Vec<_>, DemError>>()?;

        let mut stats = NarrowPhaseStats::default();
        for outcome in outcomes {
            match outcome {
                Outcome::Promoted => stats.promoted += 1,
                Outcome::Demoted => stats.demoted += 1,
                Outcome::Degenerate => stats.degenerate += 1,
                Outcome::Skipped | Outcome::Unchanged => {}
            }
        }
        Ok(stats)
    }

    /// Runs the contact law on every real contact, storing the result in the contact.
    pub fn evaluate_law(&mut self, input: &ContactInput<'_>, dt: Real) {
        let evaluate = |contact: &mut Contact| {
            if !contact.is_real() {
                return;
            }
            let Some(geometry) = contact.geometry else {
                contact.force = Default::default();
                return;
            };
            let body = |id: EntityId| input.particles.get(id).and_then(|p| input.body(p));
            let (Some(a), Some(b)) = (body(contact.pair.first()), body(contact.pair.second())) else {
                return;
            };
            if let Some(phys) = contact.phys.as_mut() {
                contact.force = input.law.evaluate(phys, &geometry, &a, &b, dt);
            }
        };

        #[cfg(feature = "parallel")]
        if self.parallel {
            self.contacts.arena_mut().par_iter_mut().for_each(evaluate);
            return;
        }

        self.contacts.iter_mut().for_each(evaluate);
    }
}

fn resolve_contact(
    contact: &mut Contact,
    registry: &NarrowPhaseRegistry,
    input: &ContactInput<'_>,
) -> Result<Outcome, DemError> {
    if contact.missed_steps > 0 {
        return Ok(Outcome::Skipped);
    }
    let (Some(pa), Some(pb)) = (
        input.particles.get(contact.pair.first()),
        input.particles.get(contact.pair.second()),
    ) else {
        return Ok(Outcome::Skipped);
    };

    let geometry = match registry.resolve(&pa.shape, &pa.pose, &pb.shape, &pb.pose)? {
        Resolution::Geometry(geometry) => geometry,
        Resolution::Degenerate(reason) => {
            warn!(
                "degenerate contact geometry between {} and {} ({reason}); skipped this step",
                pa.id, pb.id
            );
            contact.geometry = None;
            contact.force = Default::default();
            return Ok(Outcome::Degenerate);
        }
    };

    let limit = match (pa.shape.equivalent_radius(), pb.shape.equivalent_radius()) {
        (Some(ra), Some(rb)) => Some(ra.min(rb)),
        (Some(r), None) | (None, Some(r)) => Some(r),
        (None, None) => None,
    };
    if let Some(limit) = limit {
        if geometry.depth > limit {
            return Err(StabilityError::ExcessivePenetration {
                a: pa.id,
                b: pb.id,
                depth: geometry.depth,
                limit,
            }
            .into());
        }
    }

    let bond_intact = contact.phys.as_ref().is_some_and(|phys| phys.is_cohesive());
    let touching = geometry.depth > input.tolerance || (contact.is_real() && bond_intact);
    contact.geometry = Some(geometry);

    let outcome = match (touching, contact.is_real()) {
        (true, false) => {
            let (Some(a), Some(b)) = (input.body(pa), input.body(pb)) else {
                return Ok(Outcome::Skipped);
            };
            let (Some(mat_a), Some(mat_b)) = (
                input.materials.get(pa.material.0 as usize),
                input.materials.get(pb.material.0 as usize),
            ) else {
                return Ok(Outcome::Skipped);
            };
            contact.phys = Some(input.law.create_phys(
                &geometry,
                &a,
                &b,
                mat_a,
                mat_b,
                input.friction_mixing,
            ));
            contact.state = ContactState::Real;
            Outcome::Promoted
        }
        (false, true) => {
            contact.demote();
            Outcome::Demoted
        }
        _ => Outcome::Unchanged,
    };
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::types::{Mat3, MaterialId, Pose, Vec3},
        dynamics::law::ViscoElasticLaw,
    };

    fn scene_with_spheres(gap: Real, masks: (u32, u32)) -> (Arena<Node>, Arena<Particle>) {
        let mut nodes = Arena::new();
        let mut particles = Arena::new();
        for (i, mask) in [masks.0, masks.1].into_iter().enumerate() {
            let position = Vec3::new(i as Real * (1.0 + gap), 0.0, 0.0);
            let node = nodes.insert_with(|id| {
                let mut node = Node::new(Pose::from_position(position));
                node.id = id;
                node.set_mass_properties(1.0, Mat3::IDENTITY);
                node
            });
            particles.insert_with(|id| Particle {
                id,
                shape: Shape::sphere(0.5),
                material: MaterialId(0),
                mask,
                node,
                clump: None,
                local: Pose::default(),
                pose: Pose::from_position(position),
                mass: 1.0,
                inertia: Mat3::IDENTITY,
            });
        }
        (nodes, particles)
    }

    fn run_detection(
        manager: &mut CollisionManager,
        nodes: &Arena<Node>,
        particles: &Arena<Particle>,
    ) -> NarrowPhaseStats {
        for particle in particles.iter() {
            manager.insert(particle, 0.1);
        }
        manager.update_bounds(particles, 0.1);
        manager.sync_contacts(particles, nodes, 0, 2);
        let materials = [Material::new("m")];
        let input = ContactInput {
            particles,
            nodes,
            materials: &materials,
            law: &ViscoElasticLaw,
            friction_mixing: MixingMode::Min,
            tolerance: 0.0,
        };
        manager.resolve(&input).unwrap()
    }

    #[test]
    fn overlapping_spheres_become_real() {
        let (nodes, particles) = scene_with_spheres(-0.01, (1, 1));
        let mut manager = CollisionManager::new(0);
        let stats = run_detection(&mut manager, &nodes, &particles);
        assert_eq!(stats.promoted, 1);
        assert_eq!(manager.contacts.real_count(), 1);
    }

    #[test]
    fn near_spheres_stay_potential() {
        let (nodes, particles) = scene_with_spheres(0.05, (1, 1));
        let mut manager = CollisionManager::new(0);
        run_detection(&mut manager, &nodes, &particles);
        assert_eq!(manager.contacts.len(), 1);
        assert_eq!(manager.contacts.real_count(), 0);
    }

    #[test]
    fn disjoint_masks_create_no_contact() {
        let (nodes, particles) = scene_with_spheres(-0.01, (0b01, 0b10));
        let mut manager = CollisionManager::new(0);
        run_detection(&mut manager, &nodes, &particles);
        assert!(manager.contacts.is_empty());
    }

    #[test]
    fn excessive_penetration_is_fatal() {
        let (nodes, particles) = scene_with_spheres(-0.8, (1, 1));
        let mut manager = CollisionManager::new(0);
        for particle in particles.iter() {
            manager.insert(particle, 0.1);
        }
        manager.update_bounds(&particles, 0.1);
        manager.sync_contacts(&particles, &nodes, 0, 2);
        let materials = [Material::new("m")];
        let input = ContactInput {
            particles: &particles,
            nodes: &nodes,
            materials: &materials,
            law: &ViscoElasticLaw,
            friction_mixing: MixingMode::Min,
            tolerance: 0.0,
        };
        assert!(matches!(
            manager.resolve(&input),
            Err(DemError::Stability(StabilityError::ExcessivePenetration { .. }))
        ));
    }
}
