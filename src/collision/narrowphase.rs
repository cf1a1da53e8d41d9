use std::collections::HashMap;

use super::{contact::ContactGeometry, shapes::ShapeUtil};
use crate::{
    core::{
        shape::{Shape, ShapeKind},
        types::{Pose, Real, Vec3},
    },
    error::ConfigError,
};

const DEGENERATE_DISTANCE: Real = 1e-12;

/// Result of resolving one pair of shapes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    /// Geometry with a signed depth; callers compare it to the contact tolerance.
    Geometry(ContactGeometry),
    /// The normal cannot be defined (coincident centers, point in plane).
    Degenerate(&'static str),
}

impl Resolution {
    fn flipped(self) -> Self {
        match self {
            Resolution::Geometry(geometry) => Resolution::Geometry(geometry.flipped()),
            other => other,
        }
    }

    pub fn geometry(&self) -> Option<&ContactGeometry> {
        match self {
            Resolution::Geometry(geometry) => Some(geometry),
            Resolution::Degenerate(_) => None,
        }
    }
}

/// Resolver for an ordered pair of shape kinds; the normal points from the
/// first shape to the second.
pub type ResolverFn = fn(&Shape, &Pose, &Shape, &Pose) -> Resolution;

#[derive(Clone, Copy)]
enum Entry {
    Direct(ResolverFn),
    Swapped(ResolverFn),
}

/// Registry mapping ordered shape-kind pairs to exact-geometry routines.
///
/// Registering `(A, B)` also serves `(B, A)` by swapping the arguments and
/// flipping the normal, so both orders always agree.
#[derive(Clone)]
pub struct NarrowPhaseRegistry {
    table: HashMap<(ShapeKind, ShapeKind), Entry>,
}

impl std::fmt::Debug for NarrowPhaseRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut pairs: Vec<_> = self.table.keys().collect();
        pairs.sort();
        f.debug_struct("NarrowPhaseRegistry")
            .field("pairs", &pairs)
            .finish()
    }
}

impl Default for NarrowPhaseRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl NarrowPhaseRegistry {
    pub fn empty() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    /// Registry with every built-in routine.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(ShapeKind::Sphere, ShapeKind::Sphere, sphere_sphere);
        registry.register(ShapeKind::Sphere, ShapeKind::Capsule, sphere_capsule);
        registry.register(ShapeKind::Capsule, ShapeKind::Capsule, capsule_capsule);
        registry.register(ShapeKind::Wall, ShapeKind::Sphere, wall_sphere);
        registry.register(ShapeKind::Wall, ShapeKind::Capsule, wall_capsule);
        registry.register(ShapeKind::Facet, ShapeKind::Sphere, facet_sphere);
        registry.register(ShapeKind::Facet, ShapeKind::Capsule, facet_capsule);
        registry
    }

    pub fn register(&mut self, a: ShapeKind, b: ShapeKind, resolver: ResolverFn) {
        self.table.insert((a, b), Entry::Direct(resolver));
        if a != b {
            self.table.insert((b, a), Entry::Swapped(resolver));
        }
    }

    pub fn supports(&self, a: ShapeKind, b: ShapeKind) -> bool {
        self.table.contains_key(&(a, b))
    }

    pub fn resolve(
        &self,
        shape_a: &Shape,
        pose_a: &Pose,
        shape_b: &Shape,
        pose_b: &Pose,
    ) -> Result<Resolution, ConfigError> {
        let key = (shape_a.kind(), shape_b.kind());
        match self.table.get(&key) {
            Some(Entry::Direct(resolver)) => Ok(resolver(shape_a, pose_a, shape_b, pose_b)),
            Some(Entry::Swapped(resolver)) => {
                Ok(resolver(shape_b, pose_b, shape_a, pose_a).flipped())
            }
            None => Err(ConfigError::UnsupportedShapePair { a: key.0, b: key.1 }),
        }
    }
}

/// Geometry between two rounded cores: points `core_a`, `core_b` inflated by
/// `radius_a`, `radius_b`.
fn between_cores(core_a: Vec3, radius_a: Real, core_b: Vec3, radius_b: Real) -> Resolution {
    let delta = core_b - core_a;
    let distance = delta.length();
    if distance < DEGENERATE_DISTANCE {
        return Resolution::Degenerate("coincident cores");
    }
    let normal = delta / distance;
    along_normal(normal, core_a, radius_a, radius_a + radius_b - distance)
}

fn along_normal(normal: Vec3, core_a: Vec3, radius_a: Real, depth: Real) -> Resolution {
    Resolution::Geometry(ContactGeometry {
        normal,
        depth,
        point: core_a + normal * (radius_a - 0.5 * depth),
    })
}

fn sphere_radius(shape: &Shape) -> Real {
    match shape {
        Shape::Sphere { radius } => *radius,
        _ => 0.0,
    }
}

fn capsule_parts(shape: &Shape, pose: &Pose) -> (Vec3, Vec3, Real) {
    match shape {
        Shape::Capsule { radius, shaft } => {
            let (p, q) = Shape::capsule_segment(pose, *shaft);
            (p, q, *radius)
        }
        _ => (pose.position, pose.position, 0.0),
    }
}

fn sphere_sphere(a: &Shape, pa: &Pose, b: &Shape, pb: &Pose) -> Resolution {
    between_cores(pa.position, sphere_radius(a), pb.position, sphere_radius(b))
}

fn sphere_capsule(a: &Shape, pa: &Pose, b: &Shape, pb: &Pose) -> Resolution {
    let (p, q, radius_b) = capsule_parts(b, pb);
    let core_b = ShapeUtil::closest_on_segment(pa.position, p, q);
    between_cores(pa.position, sphere_radius(a), core_b, radius_b)
}

fn capsule_capsule(a: &Shape, pa: &Pose, b: &Shape, pb: &Pose) -> Resolution {
    let (p1, q1, radius_a) = capsule_parts(a, pa);
    let (p2, q2, radius_b) = capsule_parts(b, pb);
    let (core_a, core_b) = ShapeUtil::closest_between_segments(p1, q1, p2, q2);
    between_cores(core_a, radius_a, core_b, radius_b)
}

/// Outward unit normal of a wall toward `reference`, honoring its sense.
fn wall_normal(wall: &Shape, pose: &Pose, reference: Vec3) -> Option<(Vec3, usize)> {
    let Shape::Wall { axis, sense } = wall else {
        return None;
    };
    let axis = *axis;
    let side = match sense {
        0 => {
            let offset = reference[axis] - pose.position[axis];
            if offset.abs() < DEGENERATE_DISTANCE {
                return None;
            }
            offset.signum()
        }
        s => *s as Real,
    };
    let mut normal = Vec3::ZERO;
    normal[axis] = side;
    Some((normal, axis))
}

/// Contact of a core point of `radius` against the wall plane along `normal`.
fn wall_contact(wall_pose: &Pose, normal: Vec3, axis: usize, core: Vec3, radius: Real) -> Resolution {
    let signed = (core[axis] - wall_pose.position[axis]) * normal[axis];
    let plane_point = core - normal * signed;
    along_normal(normal, plane_point, 0.0, radius - signed)
}

fn wall_sphere(a: &Shape, pa: &Pose, b: &Shape, pb: &Pose) -> Resolution {
    let Some((normal, axis)) = wall_normal(a, pa, pb.position) else {
        return Resolution::Degenerate("particle center in a two-sided wall plane");
    };
    wall_contact(pa, normal, axis, pb.position, sphere_radius(b))
}

/// The side of a two-sided wall is fixed by the capsule center; the deepest
/// shaft end then sets the depth.
fn wall_capsule(a: &Shape, pa: &Pose, b: &Shape, pb: &Pose) -> Resolution {
    let (p, q, radius) = capsule_parts(b, pb);
    let Some((normal, axis)) = wall_normal(a, pa, pb.position) else {
        return Resolution::Degenerate("capsule center in a two-sided wall plane");
    };
    let height = |x: Vec3| (x[axis] - pa.position[axis]) * normal[axis];
    let (hp, hq) = (height(p), height(q));
    let core = if (hp - hq).abs() <= DEGENERATE_DISTANCE {
        (p + q) * 0.5
    } else if hp < hq {
        p
    } else {
        q
    };
    wall_contact(pa, normal, axis, core, radius)
}

fn facet_parts(shape: &Shape, pose: &Pose) -> ([Vec3; 3], Real) {
    match shape {
        Shape::Facet {
            vertices,
            half_thickness,
        } => (Shape::facet_world_vertices(pose, vertices), *half_thickness),
        _ => ([pose.position; 3], 0.0),
    }
}

fn facet_sphere(a: &Shape, pa: &Pose, b: &Shape, pb: &Pose) -> Resolution {
    let (tri, half_thickness) = facet_parts(a, pa);
    let center = pb.position;
    let closest = ShapeUtil::closest_on_triangle(center, tri[0], tri[1], tri[2]);
    between_cores(closest, half_thickness, center, sphere_radius(b))
}

fn facet_capsule(a: &Shape, pa: &Pose, b: &Shape, pb: &Pose) -> Resolution {
    let (tri, half_thickness) = facet_parts(a, pa);
    let (p, q, radius) = capsule_parts(b, pb);
    let (on_segment, on_facet) = ShapeUtil::closest_segment_triangle(p, q, &tri);
    if (on_segment - on_facet).length() >= DEGENERATE_DISTANCE {
        return between_cores(on_facet, half_thickness, on_segment, radius);
    }

    // shaft pierces the facet: push toward the side holding the capsule center
    let plane_normal = (tri[1] - tri[0]).cross(tri[2] - tri[0]).normalize_or_zero();
    let side = (pb.position - tri[0]).dot(plane_normal);
    if side.abs() < DEGENERATE_DISTANCE || plane_normal == Vec3::ZERO {
        return Resolution::Degenerate("capsule centered in a facet plane");
    }
    let normal = plane_normal * side.signum();
    let below = (p - tri[0]).dot(normal).min((q - tri[0]).dot(normal)).min(0.0);
    along_normal(normal, on_facet, half_thickness, radius + half_thickness - below)
}
