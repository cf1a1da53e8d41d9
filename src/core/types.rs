use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Scalar type of the simulation.
pub type Real = f64;

/// Double-precision math types re-exported under short names.
pub use glam::{DMat3 as Mat3, DQuat as Quat, DVec3 as Vec3};

/// Position and orientation of a node or particle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
        }
    }
}

impl Pose {
    pub fn new(position: Vec3, orientation: Quat) -> Self {
        Self {
            position,
            orientation,
        }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// Applies a pose expressed in this pose's local frame, returning the composition.
    pub fn combine(&self, local: &Pose) -> Pose {
        Pose {
            position: self.position + self.orientation * local.position,
            orientation: (self.orientation * local.orientation).normalize(),
        }
    }

    /// Expresses `world` in this pose's local frame (inverse of [`Pose::combine`]).
    pub fn relative(&self, world: &Pose) -> Pose {
        let inv = self.orientation.conjugate();
        Pose {
            position: inv * (world.position - self.position),
            orientation: (inv * world.orientation).normalize(),
        }
    }

    pub fn transform_point(&self, local: Vec3) -> Vec3 {
        self.position + self.orientation * local
    }
}

/// Index of a material in the scene's material table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct MaterialId(pub u32);

/// Physical parameters shared by reference across many particles.
///
/// Materials are immutable once registered with a scene; particles refer to
/// them through [`MaterialId`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Material {
    pub name: String,
    pub density: Real,
    /// Young's modulus; contact stiffness is derived from it.
    pub young: Real,
    /// Ratio of tangential to normal stiffness.
    pub kt_div_kn: Real,
    /// Interparticle friction angle (radians).
    pub friction_angle: Real,
    /// Fraction of critical viscous damping in the normal direction.
    pub damping_ratio: Real,
    /// Tensile strength of cohesive bonds; zero disables cohesion.
    pub cohesion: Real,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            density: 1000.0,
            young: 1e7,
            kt_div_kn: 0.2,
            friction_angle: 0.5,
            damping_ratio: 0.0,
            cohesion: 0.0,
        }
    }
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_density(mut self, density: Real) -> Self {
        self.density = density;
        self
    }

    pub fn with_young(mut self, young: Real) -> Self {
        self.young = young;
        self
    }

    pub fn with_friction_angle(mut self, angle: Real) -> Self {
        self.friction_angle = angle;
        self
    }

    pub fn with_damping_ratio(mut self, ratio: Real) -> Self {
        self.damping_ratio = ratio;
        self
    }

    pub fn with_cohesion(mut self, cohesion: Real) -> Self {
        self.cohesion = cohesion;
        self
    }

    pub fn with_kt_div_kn(mut self, ratio: Real) -> Self {
        self.kt_div_kn = ratio;
        self
    }

    /// Pharmaceutical-capsule gelatin, used by the filling demo.
    pub fn gelatin() -> Self {
        Self {
            name: "gelatin".to_string(),
            density: 1300.0,
            young: 3e6,
            kt_div_kn: 0.2,
            friction_angle: 0.4,
            damping_ratio: 0.2,
            cohesion: 0.0,
        }
    }

    pub fn glass() -> Self {
        Self {
            name: "glass".to_string(),
            density: 2500.0,
            young: 5e7,
            kt_div_kn: 0.25,
            friction_angle: 0.3,
            damping_ratio: 0.1,
            cohesion: 0.0,
        }
    }

    pub fn tan_friction(&self) -> Real {
        self.friction_angle.tan()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |reason: &str| {
            Err(ConfigError::InvalidMaterial {
                name: self.name.clone(),
                reason: reason.to_string(),
            })
        };
        if !(self.density.is_finite() && self.density > 0.0) {
            return fail("density must be positive");
        }
        if !(self.young.is_finite() && self.young > 0.0) {
            return fail("young modulus must be positive");
        }
        if !(self.kt_div_kn.is_finite() && self.kt_div_kn >= 0.0) {
            return fail("kt_div_kn must be non-negative");
        }
        if !(0.0..std::f64::consts::FRAC_PI_2).contains(&self.friction_angle) {
            return fail("friction angle must lie in [0, pi/2)");
        }
        if !(self.damping_ratio.is_finite() && self.damping_ratio >= 0.0) {
            return fail("damping ratio must be non-negative");
        }
        if !(self.cohesion.is_finite() && self.cohesion >= 0.0) {
            return fail("cohesion must be non-negative");
        }
        Ok(())
    }

    /// Combines the parameters of two materials meeting at a contact.
    pub fn combine_pair(a: &Self, b: &Self, friction: MixingMode) -> MaterialPairProperties {
        MaterialPairProperties {
            friction: friction.combine(a.tan_friction(), b.tan_friction()),
            damping_ratio: MixingMode::Average.combine(a.damping_ratio, b.damping_ratio),
            cohesion: MixingMode::Min.combine(a.cohesion, b.cohesion),
            kt_div_kn: MixingMode::Average.combine(a.kt_div_kn, b.kt_div_kn),
        }
    }
}

/// How the coefficients of two materials are mixed at a contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MixingMode {
    Average,
    #[default]
    Min,
    Max,
    GeometricMean,
    Harmonic,
}

impl MixingMode {
    pub fn combine(self, a: Real, b: Real) -> Real {
        match self {
            MixingMode::Average => 0.5 * (a + b),
            MixingMode::Min => a.min(b),
            MixingMode::Max => a.max(b),
            MixingMode::GeometricMean => (a.abs() * b.abs()).sqrt(),
            MixingMode::Harmonic => {
                if a + b <= 0.0 {
                    0.0
                } else {
                    2.0 * a * b / (a + b)
                }
            }
        }
    }
}

/// Parameters of a material pair, fixed when a contact first becomes real.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaterialPairProperties {
    /// Coulomb coefficient (tangent of the effective friction angle).
    pub friction: Real,
    pub damping_ratio: Real,
    pub cohesion: Real,
    pub kt_div_kn: Real,
}

/// Helper methods for inertia calculations.
pub trait InertiaTensorExt {
    fn for_solid_sphere(radius: Real, mass: Real) -> Mat3;
    /// Solid capsule with its axis along local x.
    fn for_solid_capsule(radius: Real, shaft: Real, density: Real) -> Mat3;
}

impl InertiaTensorExt for Mat3 {
    fn for_solid_sphere(radius: Real, mass: Real) -> Mat3 {
        let value = 0.4 * mass * radius * radius;
        Mat3::from_diagonal(Vec3::splat(value))
    }

    fn for_solid_capsule(radius: Real, shaft: Real, density: Real) -> Mat3 {
        use std::f64::consts::PI;
        let r2 = radius * radius;
        let cylinder_mass = density * PI * r2 * shaft;
        let hemisphere_mass = density * 2.0 / 3.0 * PI * r2 * radius;

        let axial = 0.5 * cylinder_mass * r2 + 2.0 * (0.4 * hemisphere_mass * r2);
        let transverse = cylinder_mass * (r2 / 4.0 + shaft * shaft / 12.0)
            + 2.0
                * hemisphere_mass
                * (0.4 * r2 + shaft * shaft / 4.0 + 3.0 * shaft * radius / 8.0);
        Mat3::from_diagonal(Vec3::new(axial, transverse, transverse))
    }
}
