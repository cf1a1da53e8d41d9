use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use super::types::{InertiaTensorExt, Mat3, Pose, Real, Vec3};
use crate::{collision::aabb::Aabb, error::ConfigError};

/// Discriminant of [`Shape`], used as the narrow-phase dispatch key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub enum ShapeKind {
    Sphere,
    Capsule,
    Facet,
    Wall,
}

impl ShapeKind {
    pub const ALL: [ShapeKind; 4] = [
        ShapeKind::Sphere,
        ShapeKind::Capsule,
        ShapeKind::Facet,
        ShapeKind::Wall,
    ];
}

/// Geometric extents of a particle, expressed in the particle's local frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Sphere {
        radius: Real,
    },
    /// Cylinder with hemispherical caps; the shaft runs along local x.
    Capsule {
        radius: Real,
        shaft: Real,
    },
    /// Triangle with vertices given relative to the particle's frame,
    /// thickened by `half_thickness` on both sides.
    Facet {
        vertices: [Vec3; 3],
        half_thickness: Real,
    },
    /// Infinite plane through the particle position, perpendicular to
    /// global `axis`. `sense` selects the interacting side: `+1` positive,
    /// `-1` negative, `0` both.
    Wall {
        axis: usize,
        sense: i8,
    },
}

impl Shape {
    pub fn sphere(radius: Real) -> Self {
        Shape::Sphere { radius }
    }

    pub fn capsule(radius: Real, shaft: Real) -> Self {
        Shape::Capsule { radius, shaft }
    }

    pub fn facet(vertices: [Vec3; 3]) -> Self {
        Shape::Facet {
            vertices,
            half_thickness: 0.0,
        }
    }

    pub fn wall(axis: usize, sense: i8) -> Self {
        Shape::Wall { axis, sense }
    }

    pub fn kind(&self) -> ShapeKind {
        match self {
            Shape::Sphere { .. } => ShapeKind::Sphere,
            Shape::Capsule { .. } => ShapeKind::Capsule,
            Shape::Facet { .. } => ShapeKind::Facet,
            Shape::Wall { .. } => ShapeKind::Wall,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |value: Real| value.is_finite() && value > 0.0;
        match self {
            Shape::Sphere { radius } if !positive(*radius) => Err(ConfigError::InvalidShape(
                format!("sphere radius must be positive, got {radius}"),
            )),
            Shape::Capsule { radius, shaft } if !positive(*radius) || !(shaft.is_finite() && *shaft >= 0.0) => {
                Err(ConfigError::InvalidShape(format!(
                    "capsule needs radius > 0 and shaft >= 0, got r={radius} shaft={shaft}"
                )))
            }
            Shape::Facet {
                vertices,
                half_thickness,
            } => {
                let normal = (vertices[1] - vertices[0]).cross(vertices[2] - vertices[0]);
                if !vertices.iter().all(|v| v.is_finite()) || normal.length_squared() <= 1e-24 {
                    return Err(ConfigError::InvalidShape(
                        "facet vertices must span a non-degenerate triangle".to_string(),
                    ));
                }
                if !(half_thickness.is_finite() && *half_thickness >= 0.0) {
                    return Err(ConfigError::InvalidShape(format!(
                        "facet half thickness must be non-negative, got {half_thickness}"
                    )));
                }
                Ok(())
            }
            Shape::Wall { axis, sense } if *axis > 2 || !(-1..=1).contains(sense) => {
                Err(ConfigError::InvalidShape(format!(
                    "wall needs axis in 0..=2 and sense in -1..=1, got axis={axis} sense={sense}"
                )))
            }
            _ => Ok(()),
        }
    }

    /// Radius used for contact stiffness, the p-wave timestep and bound margins.
    /// Planar shapes have none.
    pub fn equivalent_radius(&self) -> Option<Real> {
        match self {
            Shape::Sphere { radius } | Shape::Capsule { radius, .. } => Some(*radius),
            Shape::Facet { .. } | Shape::Wall { .. } => None,
        }
    }

    pub fn volume(&self) -> Real {
        match self {
            Shape::Sphere { radius } => 4.0 / 3.0 * PI * radius.powi(3),
            Shape::Capsule { radius, shaft } => {
                PI * radius * radius * shaft + 4.0 / 3.0 * PI * radius.powi(3)
            }
            Shape::Facet { .. } | Shape::Wall { .. } => 0.0,
        }
    }

    /// Mass and local inertia tensor for the given density (zero for planar shapes).
    pub fn mass_properties(&self, density: Real) -> (Real, Mat3) {
        match self {
            Shape::Sphere { radius } => {
                let mass = density * self.volume();
                (mass, Mat3::for_solid_sphere(*radius, mass))
            }
            Shape::Capsule { radius, shaft } => (
                density * self.volume(),
                Mat3::for_solid_capsule(*radius, *shaft, density),
            ),
            Shape::Facet { .. } | Shape::Wall { .. } => (0.0, Mat3::ZERO),
        }
    }

    /// Radius of the smallest sphere around the particle origin enclosing the shape.
    pub fn bounding_radius(&self) -> Real {
        match self {
            Shape::Sphere { radius } => *radius,
            Shape::Capsule { radius, shaft } => radius + shaft * 0.5,
            Shape::Facet {
                vertices,
                half_thickness,
            } => {
                vertices
                    .iter()
                    .map(|v| v.length())
                    .fold(0.0, Real::max)
                    + half_thickness
            }
            Shape::Wall { .. } => Real::INFINITY,
        }
    }

    /// Tight world-space bounds of the shape at `pose`.
    pub fn aabb(&self, pose: &Pose) -> Aabb {
        match self {
            Shape::Sphere { radius } => Aabb::around(pose.position, Vec3::splat(*radius)),
            Shape::Capsule { radius, shaft } => {
                let half = pose.orientation * Vec3::new(shaft * 0.5, 0.0, 0.0);
                let mut bounds = Aabb::around(pose.position + half, Vec3::splat(*radius));
                bounds.merge(&Aabb::around(pose.position - half, Vec3::splat(*radius)));
                bounds
            }
            Shape::Facet {
                vertices,
                half_thickness,
            } => {
                let mut bounds = Aabb::empty();
                for v in vertices {
                    bounds.extend(pose.transform_point(*v));
                }
                bounds.inflate(*half_thickness)
            }
            Shape::Wall { axis, .. } => {
                let mut min = Vec3::splat(Real::NEG_INFINITY);
                let mut max = Vec3::splat(Real::INFINITY);
                min[*axis] = pose.position[*axis];
                max[*axis] = pose.position[*axis];
                Aabb::new(min, max)
            }
        }
    }

    /// Endpoints of a capsule's shaft in world space.
    pub fn capsule_segment(pose: &Pose, shaft: Real) -> (Vec3, Vec3) {
        let half = pose.orientation * Vec3::new(shaft * 0.5, 0.0, 0.0);
        (pose.position - half, pose.position + half)
    }

    /// Facet vertices in world space.
    pub fn facet_world_vertices(pose: &Pose, vertices: &[Vec3; 3]) -> [Vec3; 3] {
        [
            pose.transform_point(vertices[0]),
            pose.transform_point(vertices[1]),
            pose.transform_point(vertices[2]),
        ]
    }
}
