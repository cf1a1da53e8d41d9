use crate::core::types::{Real, Vec3};

const EPSILON: Real = 1e-14;

/// Closest-point primitives shared by the narrow-phase resolvers.
pub struct ShapeUtil;

impl ShapeUtil {
    /// Closest point to `p` on segment `[a, b]`.
    pub fn closest_on_segment(p: Vec3, a: Vec3, b: Vec3) -> Vec3 {
        let ab = b - a;
        let len2 = ab.length_squared();
        if len2 < EPSILON {
            return a;
        }
        let t = ((p - a).dot(ab) / len2).clamp(0.0, 1.0);
        a + ab * t
    }

    /// Closest points between segments `[p1, q1]` and `[p2, q2]`.
    pub fn closest_between_segments(p1: Vec3, q1: Vec3, p2: Vec3, q2: Vec3) -> (Vec3, Vec3) {
        let d1 = q1 - p1;
        let d2 = q2 - p2;
        let r = p1 - p2;
        let a = d1.length_squared();
        let e = d2.length_squared();
        let f = d2.dot(r);

        if a < EPSILON && e < EPSILON {
            return (p1, p2);
        }
        let (s, t) = if a < EPSILON {
            (0.0, (f / e).clamp(0.0, 1.0))
        } else {
            let c = d1.dot(r);
            if e < EPSILON {
                ((-c / a).clamp(0.0, 1.0), 0.0)
            } else {
                let b = d1.dot(d2);
                let denom = a * e - b * b;
                // parallel segments: pick the midpoint of the overlap on the first
                let mut s = if denom > EPSILON * a * e {
                    ((b * f - c * e) / denom).clamp(0.0, 1.0)
                } else {
                    Self::parallel_overlap_midpoint(p1, d1, p2, d2)
                };
                let mut t = (b * s + f) / e;
                if t < 0.0 {
                    t = 0.0;
                    s = (-c / a).clamp(0.0, 1.0);
                } else if t > 1.0 {
                    t = 1.0;
                    s = ((b - c) / a).clamp(0.0, 1.0);
                }
                (s, t)
            }
        };
        (p1 + d1 * s, p2 + d2 * t)
    }

    fn parallel_overlap_midpoint(p1: Vec3, d1: Vec3, p2: Vec3, d2: Vec3) -> Real {
        let a = d1.length_squared();
        let s0 = ((p2 - p1).dot(d1) / a).clamp(0.0, 1.0);
        let s1 = ((p2 + d2 - p1).dot(d1) / a).clamp(0.0, 1.0);
        0.5 * (s0 + s1)
    }

    /// Closest point to `p` on triangle `(a, b, c)` (Ericson, Real-Time Collision Detection 5.1.5).
    pub fn closest_on_triangle(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
        let ab = b - a;
        let ac = c - a;
        let ap = p - a;
        let d1 = ab.dot(ap);
        let d2 = ac.dot(ap);
        if d1 <= 0.0 && d2 <= 0.0 {
            return a;
        }

        let bp = p - b;
        let d3 = ab.dot(bp);
        let d4 = ac.dot(bp);
        if d3 >= 0.0 && d4 <= d3 {
            return b;
        }

        let vc = d1 * d4 - d3 * d2;
        if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
            let v = d1 / (d1 - d3);
            return a + ab * v;
        }

        let cp = p - c;
        let d5 = ab.dot(cp);
        let d6 = ac.dot(cp);
        if d6 >= 0.0 && d5 <= d6 {
            return c;
        }

        let vb = d5 * d2 - d1 * d6;
        if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
            let w = d2 / (d2 - d6);
            return a + ac * w;
        }

        let va = d3 * d6 - d5 * d4;
        if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
            let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
            return b + (c - b) * w;
        }

        let denom = 1.0 / (va + vb + vc);
        let v = vb * denom;
        let w = vc * denom;
        a + ab * v + ac * w
    }

    /// Point where segment `[p, q]` crosses triangle `tri`, if it does.
    pub fn segment_triangle_intersection(p: Vec3, q: Vec3, tri: &[Vec3; 3]) -> Option<Vec3> {
        let normal = (tri[1] - tri[0]).cross(tri[2] - tri[0]);
        let dp = (p - tri[0]).dot(normal);
        let dq = (q - tri[0]).dot(normal);
        if dp * dq > 0.0 || (dp - dq).abs() < EPSILON {
            return None;
        }
        let hit = p + (q - p) * (dp / (dp - dq));
        let inside = (0..3).all(|i| {
            let edge = tri[(i + 1) % 3] - tri[i];
            edge.cross(hit - tri[i]).dot(normal) >= -EPSILON
        });
        inside.then_some(hit)
    }

    /// Closest points between segment `[p, q]` (first) and triangle `tri` (second).
    pub fn closest_segment_triangle(p: Vec3, q: Vec3, tri: &[Vec3; 3]) -> (Vec3, Vec3) {
        if let Some(hit) = Self::segment_triangle_intersection(p, q, tri) {
            return (hit, hit);
        }

        let mut best = (p, Self::closest_on_triangle(p, tri[0], tri[1], tri[2]));
        let mut best_d2 = (best.0 - best.1).length_squared();
        let mut consider = |pair: (Vec3, Vec3)| {
            let d2 = (pair.0 - pair.1).length_squared();
            if d2 < best_d2 {
                best_d2 = d2;
                best = pair;
            }
        };

        consider((q, Self::closest_on_triangle(q, tri[0], tri[1], tri[2])));
        for i in 0..3 {
            consider(Self::closest_between_segments(p, q, tri[i], tri[(i + 1) % 3]));
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn crossing_segments_meet() {
        let (a, b) = ShapeUtil::closest_between_segments(
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, -1.0, 0.5),
            Vec3::new(0.0, 1.0, 0.5),
        );
        assert_relative_eq!(a.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(b.y, 0.0, epsilon = 1e-12);
        assert_relative_eq!((b - a).length(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn parallel_segments_use_overlap_middle() {
        let (a, b) = ShapeUtil::closest_between_segments(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(3.0, 0.0, 1.0),
        );
        assert_relative_eq!(a.x, 1.5, epsilon = 1e-12);
        assert_relative_eq!(b.x, 1.5, epsilon = 1e-12);
    }

    #[test]
    fn triangle_regions() {
        let (a, b, c) = (Vec3::ZERO, Vec3::X, Vec3::Y);
        let inside = ShapeUtil::closest_on_triangle(Vec3::new(0.2, 0.2, 1.0), a, b, c);
        assert_relative_eq!(inside.z, 0.0);
        assert_relative_eq!(inside.x, 0.2, epsilon = 1e-12);
        let vertex = ShapeUtil::closest_on_triangle(Vec3::new(-1.0, -1.0, 0.0), a, b, c);
        assert_eq!(vertex, a);
        let edge = ShapeUtil::closest_on_triangle(Vec3::new(0.5, -1.0, 0.0), a, b, c);
        assert_relative_eq!(edge.x, 0.5, epsilon = 1e-12);
        assert_relative_eq!(edge.y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn segment_through_triangle_intersects() {
        let tri = [Vec3::ZERO, Vec3::X, Vec3::Y];
        let hit = ShapeUtil::segment_triangle_intersection(
            Vec3::new(0.25, 0.25, -1.0),
            Vec3::new(0.25, 0.25, 1.0),
            &tri,
        );
        assert!(hit.is_some());
        let miss = ShapeUtil::segment_triangle_intersection(
            Vec3::new(2.0, 2.0, -1.0),
            Vec3::new(2.0, 2.0, 1.0),
            &tri,
        );
        assert!(miss.is_none());
    }
}
