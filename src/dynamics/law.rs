use std::f64::consts::PI;

use crate::{
    collision::contact::{ContactForce, ContactGeometry, ContactPhys},
    core::types::{Material, MaterialId, MixingMode, Real, Vec3},
};

/// Kinematic and inertial data of one side of a contact, frozen at phase entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyState {
    /// Position of the particle itself.
    pub position: Vec3,
    /// Position of the node carrying it (differs for clump members).
    pub node_position: Vec3,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
    pub dynamic: bool,
    /// Mass of the carrying node.
    pub mass: Real,
    pub radius: Option<Real>,
    pub material: MaterialId,
}

impl BodyState {
    pub fn point_velocity(&self, point: Vec3) -> Vec3 {
        self.velocity + self.angular_velocity.cross(point - self.node_position)
    }
}

/// Effective mass of a pair; non-dynamic sides count as infinitely heavy.
pub fn effective_mass(a: &BodyState, b: &BodyState) -> Real {
    match (a.dynamic, b.dynamic) {
        (true, true) if a.mass + b.mass > 0.0 => a.mass * b.mass / (a.mass + b.mass),
        (true, false) => a.mass,
        (false, true) => b.mass,
        _ => 0.0,
    }
}

/// Converts contact geometry and history into forces.
pub trait ContactLaw: Send + Sync + std::fmt::Debug {
    /// Builds the pair parameters when a contact first becomes real.
    fn create_phys(
        &self,
        geometry: &ContactGeometry,
        a: &BodyState,
        b: &BodyState,
        material_a: &Material,
        material_b: &Material,
        friction_mixing: MixingMode,
    ) -> ContactPhys;

    /// Advances the contact history by `dt` and returns the resulting forces.
    fn evaluate(
        &self,
        phys: &mut ContactPhys,
        geometry: &ContactGeometry,
        a: &BodyState,
        b: &BodyState,
        dt: Real,
    ) -> ContactForce;
}

/// Linear spring-dashpot law with Coulomb friction and optional cohesion.
///
/// Normal stiffness comes from the Young's moduli of both sides acting in
/// series over a length of twice the equivalent radius; a planar side takes
/// the radius of its partner.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ViscoElasticLaw;

impl ViscoElasticLaw {
    pub fn normal_stiffness(young_a: Real, radius_a: Real, young_b: Real, radius_b: Real) -> Real {
        let compliance = 1.0 / (young_a * 2.0 * radius_a) + 1.0 / (young_b * 2.0 * radius_b);
        if compliance.is_finite() && compliance > 0.0 {
            1.0 / compliance
        } else {
            0.0
        }
    }
}

impl ContactLaw for ViscoElasticLaw {
    fn create_phys(
        &self,
        geometry: &ContactGeometry,
        a: &BodyState,
        b: &BodyState,
        material_a: &Material,
        material_b: &Material,
        friction_mixing: MixingMode,
    ) -> ContactPhys {
        let radius_a = a.radius.or(b.radius).unwrap_or(0.0);
        let radius_b = b.radius.or(a.radius).unwrap_or(0.0);
        let kn = Self::normal_stiffness(material_a.young, radius_a, material_b.young, radius_b);
        let pair = Material::combine_pair(material_a, material_b, friction_mixing);
        let ks = pair.kt_div_kn * kn;

        let m_eff = effective_mass(a, b);
        let zeta = pair.damping_ratio;
        let cn = 2.0 * zeta * (m_eff * kn).sqrt();
        let cs = 2.0 * zeta * (m_eff * ks).sqrt();

        let r_min = radius_a.min(radius_b);
        let tensile_limit = if pair.cohesion > 0.0 {
            pair.cohesion * PI * r_min * r_min
        } else {
            0.0
        };

        ContactPhys {
            kn,
            ks,
            cn,
            cs,
            friction: pair.friction,
            tensile_limit,
            cohesion_broken: false,
            shear_displacement: Vec3::ZERO,
            prev_normal: geometry.normal,
            evaluations: 0,
        }
    }

    fn evaluate(
        &self,
        phys: &mut ContactPhys,
        geometry: &ContactGeometry,
        a: &BodyState,
        b: &BodyState,
        dt: Real,
    ) -> ContactForce {
        let normal = geometry.normal;
        let point = geometry.point;
        let relative = b.point_velocity(point) - a.point_velocity(point);
        let normal_speed = relative.dot(normal);
        let tangential_velocity = relative - normal * normal_speed;

        // carry the shear state along with the rotating contact frame
        let mut shear = phys.shear_displacement;
        shear -= shear.cross(phys.prev_normal.cross(normal));
        let spin = 0.5 * (a.angular_velocity + b.angular_velocity).dot(normal) * dt;
        shear -= shear.cross(normal * spin);
        shear -= normal * normal.dot(shear);
        shear += tangential_velocity * dt;

        let mut normal_force = phys.kn * geometry.depth - phys.cn * normal_speed;
        if phys.is_cohesive() {
            if normal_force < -phys.tensile_limit {
                phys.cohesion_broken = true;
                normal_force = normal_force.max(0.0);
            }
        } else {
            normal_force = normal_force.max(0.0);
        }

        let cohesive_shear = if phys.is_cohesive() {
            phys.tensile_limit
        } else {
            0.0
        };
        let limit = phys.friction * normal_force.max(0.0) + cohesive_shear;

        let elastic = -shear * phys.ks;
        let elastic_norm = elastic.length();
        let (tangential, sliding) = if elastic_norm > limit {
            let scale = if elastic_norm > 0.0 { limit / elastic_norm } else { 0.0 };
            shear *= scale;
            (-shear * phys.ks, true)
        } else {
            let total = elastic - tangential_velocity * phys.cs;
            let total_norm = total.length();
            if total_norm > limit && total_norm > 0.0 {
                (total * (limit / total_norm), true)
            } else {
                (total, false)
            }
        };

        phys.shear_displacement = shear;
        phys.prev_normal = normal;
        phys.evaluations += 1;

        let force = normal * normal_force + tangential;
        ContactForce {
            force,
            torque_first: (point - a.position).cross(-force),
            torque_second: (point - b.position).cross(force),
            normal_force,
            sliding,
        }
    }
}
