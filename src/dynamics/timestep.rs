use log::trace;

use crate::{
    collision::contact::Contact,
    config::{TimestepMode, TIMESTEP_BOUND_TOLERANCE},
    core::{
        node::Node,
        particle::Particle,
        shape::Shape,
        types::{Material, Real},
    },
    error::StabilityError,
    utils::allocator::Arena,
};

/// Components of the stability bound found for the current configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CriticalTimestep {
    /// Elastic wave crossing time of the smallest free sphere or capsule.
    pub p_wave: Option<Real>,
    /// Mass-spring bound over free nodes carrying real contacts.
    pub translational: Option<Real>,
    /// Same bound for rotation about the stiffest lever arm.
    pub rotational: Option<Real>,
}

impl CriticalTimestep {
    pub fn value(&self) -> Option<Real> {
        [self.p_wave, self.translational, self.rotational]
            .into_iter()
            .flatten()
            .reduce(Real::min)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct NodeStiffness {
    linear: Real,
    angular: Real,
}

/// Picks the step size from the explicit-integration stability bound.
#[derive(Debug, Clone)]
pub struct TimestepController {
    pub dt_safety: Real,
    pub max_dt: Real,
    pub mode: TimestepMode,
    stiffness: Vec<NodeStiffness>,
}

impl TimestepController {
    pub fn new(dt_safety: Real, max_dt: Real, mode: TimestepMode) -> Self {
        Self {
            dt_safety,
            max_dt,
            mode,
            stiffness: Vec::new(),
        }
    }

    /// Computes the critical timestep from the current real contacts.
    pub fn critical(
        &mut self,
        nodes: &Arena<Node>,
        particles: &Arena<Particle>,
        contacts: &Arena<Contact>,
        materials: &[Material],
    ) -> CriticalTimestep {
        let mut bound = CriticalTimestep {
            p_wave: Self::p_wave(nodes, particles, materials),
            ..CriticalTimestep::default()
        };

        self.stiffness.clear();
        self.stiffness
            .resize(nodes.slot_count(), NodeStiffness::default());

        for contact in contacts.iter() {
            let (Some(phys), Some(geometry)) = (&contact.phys, &contact.geometry) else {
                continue;
            };
            if !contact.is_real() {
                continue;
            }
            let k = phys.kn.max(phys.ks);
            for particle_id in [contact.pair.first(), contact.pair.second()] {
                let Some(particle) = particles.get(particle_id) else {
                    continue;
                };
                let Some(node) = nodes.get(particle.node) else {
                    continue;
                };
                if !node.is_free() {
                    continue;
                }
                let arm = geometry.point - node.pose.position;
                let entry = &mut self.stiffness[particle.node.index()];
                entry.linear += k;
                entry.angular += k * arm.length_squared();
            }
        }

        for (slot, entry) in self.stiffness.iter().enumerate() {
            let Some(node) = nodes.slot(slot) else {
                continue;
            };
            if entry.linear > 0.0 && node.mass > 0.0 {
                let dt = (node.mass / entry.linear).sqrt();
                bound.translational = Some(bound.translational.map_or(dt, |v| v.min(dt)));
            }
            let inertia = node.min_principal_inertia();
            if entry.angular > 0.0 && inertia > 0.0 {
                let dt = (inertia / entry.angular).sqrt();
                bound.rotational = Some(bound.rotational.map_or(dt, |v| v.min(dt)));
            }
        }

        trace!(
            "critical timestep: p-wave {:?}, translational {:?}, rotational {:?}",
            bound.p_wave,
            bound.translational,
            bound.rotational
        );
        bound
    }

    /// Step size to use for a given bound; fails when a fixed step exceeds it.
    pub fn select(&self, critical: Option<Real>) -> Result<Real, StabilityError> {
        match self.mode {
            TimestepMode::Adaptive => Ok(match critical {
                Some(crit) => (self.dt_safety * crit).min(self.max_dt),
                None => self.max_dt,
            }),
            TimestepMode::Fixed(dt) => {
                if let Some(crit) = critical {
                    let limit = self.dt_safety * crit;
                    if dt > limit * (1.0 + TIMESTEP_BOUND_TOLERANCE) {
                        return Err(StabilityError::TimestepExceedsCritical { dt, limit });
                    }
                }
                Ok(dt)
            }
        }
    }

    fn p_wave(nodes: &Arena<Node>, particles: &Arena<Particle>, materials: &[Material]) -> Option<Real> {
        particles
            .iter()
            .filter(|p| nodes.get(p.node).is_some_and(Node::is_free))
            .filter_map(|p| {
                let radius = match p.shape {
                    Shape::Sphere { radius } | Shape::Capsule { radius, .. } => radius,
                    _ => return None,
                };
                let material = materials.get(p.material.0 as usize)?;
                (material.young > 0.0).then(|| radius * (material.density / material.young).sqrt())
            })
            .reduce(Real::min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adaptive_step_is_capped() {
        let controller = TimestepController::new(0.5, 1e-3, TimestepMode::Adaptive);
        assert_eq!(controller.select(None).unwrap(), 1e-3);
        assert_eq!(controller.select(Some(1.0)).unwrap(), 1e-3);
        assert_eq!(controller.select(Some(1e-4)).unwrap(), 0.5e-4);
    }

    #[test]
    fn fixed_step_above_bound_is_rejected() {
        let controller = TimestepController::new(0.5, 1e-3, TimestepMode::Fixed(1e-4));
        assert_eq!(controller.select(Some(2e-4)).unwrap(), 1e-4);
        assert_eq!(controller.select(None).unwrap(), 1e-4);
        assert!(matches!(
            controller.select(Some(1e-4)),
            Err(StabilityError::TimestepExceedsCritical { .. })
        ));
    }

    #[test]
    fn critical_value_is_the_smallest_component() {
        let bound = CriticalTimestep {
            p_wave: Some(3.0),
            translational: Some(2.0),
            rotational: None,
        };
        assert_eq!(bound.value(), Some(2.0));
        assert_eq!(CriticalTimestep::default().value(), None);
    }
}
