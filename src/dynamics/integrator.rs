#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::{
    core::{
        motion::MotionPhase,
        node::{Motion, Node},
        types::{Real, Vec3},
    },
    error::StabilityError,
    utils::{allocator::Arena, math},
};

/// Explicit leapfrog integrator with Cundall local damping.
///
/// Velocities live at half steps: `v(t + dt/2) = v(t - dt/2) + a(t) dt`,
/// then positions advance with the new velocity. Rotation is advanced
/// through the world-frame angular momentum.
#[derive(Debug, Clone)]
pub struct LeapfrogIntegrator {
    pub gravity: Vec3,
    /// Fraction of the contact force removed when it accelerates the node.
    pub damping: Real,
    parallel: bool,
}

impl LeapfrogIntegrator {
    pub fn new(gravity: Vec3, damping: Real) -> Self {
        Self {
            gravity,
            damping,
            parallel: false,
        }
    }

    pub fn set_parallel(&mut self, enabled: bool) {
        self.parallel = enabled;
    }

    /// Advances one node from `time` to `time + dt`.
    pub fn integrate_node(
        &self,
        node: &mut Node,
        time: Real,
        dt: Real,
        step: u64,
    ) -> Result<(), StabilityError> {
        let phase = match &node.motion {
            Motion::Free => None,
            Motion::Static => Some(MotionPhase::Pending),
            Motion::Imposed(motion) => Some(motion.sample(time + dt)),
        };

        match phase {
            None => self.integrate_free(node, dt),
            Some(MotionPhase::Pending) => node.halt(),
            Some(MotionPhase::Active(sample)) => {
                node.pose = sample.pose;
                node.velocity = sample.velocity;
                node.angular_velocity = sample.angular_velocity;
                node.sync_angular_momentum();
            }
            Some(MotionPhase::Finished(pose)) => {
                node.pose = pose;
                node.halt();
            }
        }

        Self::check_finite(node, step)
    }

    pub fn step(
        &self,
        nodes: &mut Arena<Node>,
        time: Real,
        dt: Real,
        step: u64,
    ) -> Result<(), StabilityError> {
        #[cfg(feature = "parallel")]
        if self.parallel {
            return nodes
                .par_iter_mut()
                .try_for_each(|node| self.integrate_node(node, time, dt, step));
        }

        for node in nodes.iter_mut() {
            self.integrate_node(node, time, dt, step)?;
        }
        Ok(())
    }

    fn integrate_free(&self, node: &mut Node, dt: Real) {
        let blocked = node.blocked;
        let inv_mass = if node.mass > 0.0 { 1.0 / node.mass } else { 0.0 };

        let undamped = node.force * inv_mass + self.gravity;
        let contact_force = self.damped(node.force, node.velocity, undamped, dt);
        let acceleration = blocked.mask_linear(contact_force * inv_mass + self.gravity);
        node.velocity = blocked.mask_linear(node.velocity + acceleration * dt);
        node.pose.position += node.velocity * dt;

        let angular_hint = node.inverse_inertia().mul_vec3(node.torque);
        let torque = self.damped(node.torque, node.angular_velocity, angular_hint, dt);
        node.angular_momentum += torque * dt;
        let mut omega = node.angular_velocity_from_momentum();
        if blocked.any_rotation() {
            omega = blocked.mask_angular(omega);
            node.angular_velocity = omega;
            node.sync_angular_momentum();
        } else {
            node.angular_velocity = omega;
        }

        let rotation = math::angular_velocity_to_quat(omega, dt);
        node.pose.orientation = (rotation * node.pose.orientation).normalize();
    }

    /// Cundall non-viscous damping: each component of `load` is reduced when
    /// it accelerates the mid-step velocity and increased when it brakes it.
    fn damped(&self, load: Vec3, velocity: Vec3, acceleration: Vec3, dt: Real) -> Vec3 {
        if self.damping == 0.0 {
            return load;
        }
        let mid = velocity + acceleration * (0.5 * dt);
        let mut out = load;
        for axis in 0..3 {
            let sign = (load[axis] * mid[axis]).signum();
            if load[axis] * mid[axis] != 0.0 {
                out[axis] *= 1.0 - self.damping * sign;
            }
        }
        out
    }

    fn check_finite(node: &Node, step: u64) -> Result<(), StabilityError> {
        let quantity = if !node.pose.position.is_finite() {
            Some("position")
        } else if !node.velocity.is_finite() {
            Some("velocity")
        } else if !node.angular_velocity.is_finite() || !node.angular_momentum.is_finite() {
            Some("angular velocity")
        } else if !node.pose.orientation.is_finite() {
            Some("orientation")
        } else {
            None
        };
        match quantity {
            Some(quantity) => Err(StabilityError::NonFiniteState {
                node: node.id,
                quantity,
                step,
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        motion::InterpolatedMotion,
        node::BlockedDofs,
        types::{InertiaTensorExt, Mat3, Pose, Quat},
    };
    use approx::assert_relative_eq;

    fn ball() -> Node {
        let mut node = Node::new(Pose::default());
        node.set_mass_properties(2.0, Mat3::for_solid_sphere(0.1, 2.0));
        node
    }

    #[test]
    fn free_fall_matches_leapfrog_update() {
        let integrator = LeapfrogIntegrator::new(Vec3::new(0.0, 0.0, -10.0), 0.0);
        let mut node = ball();
        integrator.integrate_node(&mut node, 0.0, 0.1, 0).unwrap();
        assert_relative_eq!(node.velocity.z, -1.0);
        assert_relative_eq!(node.pose.position.z, -0.1);
    }

    #[test]
    fn damping_never_touches_gravity() {
        let integrator = LeapfrogIntegrator::new(Vec3::new(0.0, 0.0, -10.0), 0.8);
        let mut node = ball();
        integrator.integrate_node(&mut node, 0.0, 0.1, 0).unwrap();
        assert_relative_eq!(node.velocity.z, -1.0);
    }

    #[test]
    fn damping_reduces_accelerating_contact_force() {
        let integrator = LeapfrogIntegrator::new(Vec3::ZERO, 0.5);
        let mut node = ball();
        node.force = Vec3::new(4.0, 0.0, 0.0);
        integrator.integrate_node(&mut node, 0.0, 0.1, 0).unwrap();
        assert_relative_eq!(node.velocity.x, 0.1);
    }

    #[test]
    fn damping_keeps_static_equilibrium() {
        let integrator = LeapfrogIntegrator::new(Vec3::new(0.0, 0.0, -10.0), 0.5);
        let mut node = ball();
        node.force = Vec3::new(0.0, 0.0, 20.0);
        integrator.integrate_node(&mut node, 0.0, 0.1, 0).unwrap();
        assert_eq!(node.velocity, Vec3::ZERO);
    }

    #[test]
    fn blocked_dofs_stay_at_rest() {
        let integrator = LeapfrogIntegrator::new(Vec3::new(0.0, 0.0, -10.0), 0.0);
        let mut node = ball();
        node.blocked = BlockedDofs::parse("zXYZ").unwrap();
        node.force = Vec3::new(1.0, 0.0, 0.0);
        node.torque = Vec3::new(0.0, 0.0, 1.0);
        integrator.integrate_node(&mut node, 0.0, 0.1, 0).unwrap();
        assert_eq!(node.velocity.z, 0.0);
        assert!(node.velocity.x > 0.0);
        assert_eq!(node.angular_velocity, Vec3::ZERO);
    }

    #[test]
    fn torque_spins_node_and_keeps_unit_quaternion() {
        let integrator = LeapfrogIntegrator::new(Vec3::ZERO, 0.0);
        let mut node = ball();
        for _ in 0..100 {
            node.torque = Vec3::new(0.0, 0.0, 0.01);
            integrator.integrate_node(&mut node, 0.0, 0.01, 0).unwrap();
        }
        assert!(node.angular_velocity.z > 0.0);
        assert_relative_eq!(node.pose.orientation.length(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn static_and_imposed_nodes_ignore_forces() {
        let integrator = LeapfrogIntegrator::new(Vec3::new(0.0, 0.0, -10.0), 0.0);
        let mut wall = ball();
        wall.motion = Motion::Static;
        wall.force = Vec3::splat(100.0);
        integrator.integrate_node(&mut wall, 0.0, 0.1, 0).unwrap();
        assert_eq!(wall.pose.position, Vec3::ZERO);

        let motion = InterpolatedMotion::new(
            0.0,
            vec![Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0)],
            vec![Quat::IDENTITY, Quat::IDENTITY],
            vec![0.0, 1.0],
        )
        .unwrap();
        let mut carried = ball();
        carried.motion = Motion::Imposed(motion);
        carried.force = Vec3::splat(100.0);
        integrator.integrate_node(&mut carried, 0.4, 0.1, 0).unwrap();
        assert_relative_eq!(carried.pose.position.x, 0.5, epsilon = 1e-12);
        assert_relative_eq!(carried.velocity.x, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn non_finite_state_is_reported() {
        let integrator = LeapfrogIntegrator::new(Vec3::ZERO, 0.0);
        let mut node = ball();
        node.force = Vec3::new(Real::NAN, 0.0, 0.0);
        let err = integrator.integrate_node(&mut node, 0.0, 0.1, 7).unwrap_err();
        assert!(matches!(err, StabilityError::NonFiniteState { step: 7, .. }));
    }
}
