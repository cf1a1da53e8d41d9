use std::{f64::consts::TAU, fmt::Debug, sync::Arc};

use rand::{rngs::StdRng, Rng};
use serde::{Deserialize, Serialize};

use crate::core::{
    shape::Shape,
    types::{Pose, Quat, Real, Vec3},
};

/// One shape of a generated template, posed relative to the template origin.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateMember {
    pub shape: Shape,
    pub local: Pose,
}

/// Shapes produced by one generator call; a single member becomes a plain
/// particle, several become a clump.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Template {
    pub members: Vec<TemplateMember>,
}

impl Template {
    pub fn single(shape: Shape, orientation: Quat) -> Self {
        Self {
            members: vec![TemplateMember {
                shape,
                local: Pose::new(Vec3::ZERO, orientation),
            }],
        }
    }

    /// Radius of a sphere around the origin enclosing every member.
    pub fn bounding_radius(&self) -> Real {
        self.members
            .iter()
            .map(|m| m.local.position.length() + m.shape.bounding_radius())
            .fold(0.0, Real::max)
    }

    pub fn mass(&self, density: Real) -> Real {
        self.members.iter().map(|m| m.shape.volume() * density).sum()
    }
}

/// User-supplied particle shape source.
pub trait ShapeGenerator: Send + Sync + Debug {
    fn generate(&self, rng: &mut StdRng) -> Template;

    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Spheres whose diameters follow a piecewise-linear cumulative distribution
/// given as `(diameter, passing fraction)` points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PsdSphereGenerator {
    pub psd: Vec<(Real, Real)>,
}

impl PsdSphereGenerator {
    pub fn new(psd: Vec<(Real, Real)>) -> Self {
        Self { psd }
    }

    pub fn mono(diameter: Real) -> Self {
        Self::new(vec![(diameter, 0.0), (diameter, 1.0)])
    }

    /// Diameter at cumulative fraction `u` in `[0, 1]`.
    pub fn diameter_at(&self, u: Real) -> Real {
        let Some(&(first_d, _)) = self.psd.first() else {
            return 0.0;
        };
        let total = self.psd.last().map_or(1.0, |p| p.1);
        let target = u * total;
        let mut previous = (first_d, 0.0);
        for &(d, fraction) in &self.psd {
            if fraction >= target {
                let span = fraction - previous.1;
                if span <= 0.0 {
                    return d;
                }
                let t = (target - previous.1) / span;
                return previous.0 + (d - previous.0) * t;
            }
            previous = (d, fraction);
        }
        previous.0
    }
}

impl ShapeGenerator for PsdSphereGenerator {
    fn generate(&self, rng: &mut StdRng) -> Template {
        let diameter = self.diameter_at(rng.gen::<Real>());
        Template::single(Shape::sphere(0.5 * diameter), Quat::IDENTITY)
    }

    fn validate(&self) -> Result<(), String> {
        if self.psd.is_empty() {
            return Err("particle size distribution is empty".into());
        }
        let mut last = (0.0, 0.0);
        for &(d, fraction) in &self.psd {
            if !(d > 0.0 && d.is_finite()) {
                return Err(format!("diameter {d} must be positive"));
            }
            if d < last.0 || fraction < last.1 {
                return Err("distribution points must be non-decreasing".into());
            }
            last = (d, fraction);
        }
        if last.1 <= 0.0 {
            return Err("distribution must end at a positive passing fraction".into());
        }
        Ok(())
    }
}

/// Single capsules with uniform radius and shaft ranges in random orientations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapsuleGenerator {
    pub radius: (Real, Real),
    pub shaft: (Real, Real),
}

impl ShapeGenerator for CapsuleGenerator {
    fn generate(&self, rng: &mut StdRng) -> Template {
        let radius = uniform(rng, self.radius);
        let shaft = uniform(rng, self.shaft);
        Template::single(Shape::capsule(radius, shaft), random_orientation(rng))
    }

    fn validate(&self) -> Result<(), String> {
        let (r0, r1) = self.radius;
        let (s0, s1) = self.shaft;
        if !(r0 > 0.0 && r0 <= r1 && s0 >= 0.0 && s0 <= s1) {
            return Err(format!(
                "capsule ranges must be ordered with positive radius, got radius {r0}..{r1}, shaft {s0}..{s1}"
            ));
        }
        Ok(())
    }
}

/// Two-piece pharmaceutical capsule: a body capsule with a slightly wider
/// cap capsule pushed over one end, built as a clump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PharmaCapsuleGenerator {
    pub body_diameter: Real,
    pub cap_diameter: Real,
    /// Overall length of the closed capsule.
    pub length: Real,
    pub cap_length: Real,
    /// Relative random deviation applied to all dimensions at once.
    pub deviation: Real,
}

impl Default for PharmaCapsuleGenerator {
    fn default() -> Self {
        // size 0 hard-gelatin capsule
        Self {
            body_diameter: 0.00834,
            cap_diameter: 0.00853,
            length: 0.0218,
            cap_length: 0.0117,
            deviation: 0.05,
        }
    }
}

impl ShapeGenerator for PharmaCapsuleGenerator {
    fn generate(&self, rng: &mut StdRng) -> Template {
        let scale = 1.0 + self.deviation * (2.0 * rng.gen::<Real>() - 1.0);
        let body_d = self.body_diameter * scale;
        let cap_d = self.cap_diameter * scale;
        let length = self.length * scale;
        let cap_length = self.cap_length * scale;

        let orientation = random_orientation(rng);
        let body = TemplateMember {
            shape: Shape::capsule(0.5 * body_d, (length - body_d).max(0.0)),
            local: Pose::new(Vec3::ZERO, orientation),
        };
        let cap_offset = Vec3::new(0.5 * length - 0.5 * cap_length, 0.0, 0.0);
        let cap = TemplateMember {
            shape: Shape::capsule(0.5 * cap_d, (cap_length - cap_d).max(0.0)),
            local: Pose::new(orientation * cap_offset, orientation),
        };
        Template {
            members: vec![body, cap],
        }
    }

    fn validate(&self) -> Result<(), String> {
        let positive = [self.body_diameter, self.cap_diameter, self.length, self.cap_length]
            .iter()
            .all(|v| *v > 0.0 && v.is_finite());
        if !positive || self.cap_length > self.length || !(0.0..1.0).contains(&self.deviation) {
            return Err("pharma capsule dimensions must be positive with cap shorter than the capsule".into());
        }
        Ok(())
    }
}

/// Shape source of a factory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Generator {
    PsdSphere(PsdSphereGenerator),
    Capsule(CapsuleGenerator),
    PharmaCapsule(PharmaCapsuleGenerator),
    /// Not serializable: a scene holding one refuses to snapshot.
    #[serde(skip)]
    Custom(Arc<dyn ShapeGenerator>),
}

impl Generator {
    pub fn is_serializable(&self) -> bool {
        !matches!(self, Generator::Custom(_))
    }

    fn inner(&self) -> &dyn ShapeGenerator {
        match self {
            Generator::PsdSphere(g) => g,
            Generator::Capsule(g) => g,
            Generator::PharmaCapsule(g) => g,
            Generator::Custom(g) => g.as_ref(),
        }
    }

    pub fn generate(&self, rng: &mut StdRng) -> Template {
        self.inner().generate(rng)
    }

    pub fn validate(&self) -> Result<(), String> {
        self.inner().validate()
    }
}

fn uniform(rng: &mut StdRng, (lo, hi): (Real, Real)) -> Real {
    lo + (hi - lo) * rng.gen::<Real>()
}

/// Uniformly distributed rotation (Shoemake's subgroup algorithm).
pub fn random_orientation<R: Rng + ?Sized>(rng: &mut R) -> Quat {
    let u1: Real = rng.gen();
    let u2: Real = rng.gen();
    let u3: Real = rng.gen();
    let a = (1.0 - u1).sqrt();
    let b = u1.sqrt();
    Quat::from_xyzw(
        a * (TAU * u2).sin(),
        a * (TAU * u2).cos(),
        b * (TAU * u3).sin(),
        b * (TAU * u3).cos(),
    )
    .normalize()
}
