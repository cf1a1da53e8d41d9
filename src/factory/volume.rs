use std::f64::consts::TAU;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    collision::aabb::Aabb,
    core::types::{Pose, Real, Vec3},
};

/// Region in which a factory places new particles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SpawnVolume {
    /// Axis-aligned box.
    Box { min: Vec3, max: Vec3 },
    /// Cylinder centred on `pose`, its axis along the local x direction.
    Cylinder { pose: Pose, radius: Real, height: Real },
}

impl SpawnVolume {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            SpawnVolume::Box { min, max } => {
                if !(min.is_finite() && max.is_finite()) || min.cmpgt(*max).any() {
                    return Err(format!("box bounds {min} .. {max} are inverted or not finite"));
                }
            }
            SpawnVolume::Cylinder { pose, radius, height } => {
                if !(*radius > 0.0 && *height > 0.0 && pose.position.is_finite()) {
                    return Err(format!(
                        "cylinder needs positive radius and height, got {radius} and {height}"
                    ));
                }
            }
        }
        Ok(())
    }

    /// World bounds of the whole volume.
    pub fn aabb(&self) -> Aabb {
        match self {
            SpawnVolume::Box { min, max } => Aabb::new(*min, *max),
            SpawnVolume::Cylinder { pose, radius, height } => {
                let axis = pose.orientation * Vec3::X;
                let half = axis * (0.5 * height);
                // disc extent along each world axis: r * sqrt(1 - a_i^2)
                let disc = Vec3::new(
                    (1.0 - axis.x * axis.x).max(0.0).sqrt(),
                    (1.0 - axis.y * axis.y).max(0.0).sqrt(),
                    (1.0 - axis.z * axis.z).max(0.0).sqrt(),
                ) * *radius;
                let extent = half.abs() + disc;
                Aabb::around(pose.position, extent)
            }
        }
    }

    /// Random centre such that a sphere of `clearance` around it lies inside
    /// the volume; `None` when the volume is too small for it.
    pub fn sample_center<R: Rng + ?Sized>(&self, rng: &mut R, clearance: Real) -> Option<Vec3> {
        match self {
            SpawnVolume::Box { min, max } => {
                let lo = *min + Vec3::splat(clearance);
                let hi = *max - Vec3::splat(clearance);
                if lo.cmpgt(hi).any() {
                    return None;
                }
                Some(Vec3::new(
                    lerp(lo.x, hi.x, rng.gen::<Real>()),
                    lerp(lo.y, hi.y, rng.gen::<Real>()),
                    lerp(lo.z, hi.z, rng.gen::<Real>()),
                ))
            }
            SpawnVolume::Cylinder { pose, radius, height } => {
                let half_length = 0.5 * height - clearance;
                let reach = radius - clearance;
                if half_length < 0.0 || reach < 0.0 {
                    return None;
                }
                let along = lerp(-half_length, half_length, rng.gen::<Real>());
                let rho = reach * rng.gen::<Real>().sqrt();
                let phi = TAU * rng.gen::<Real>();
                let local = Vec3::new(along, rho * phi.cos(), rho * phi.sin());
                Some(pose.transform_point(local))
            }
        }
    }
}

fn lerp(a: Real, b: Real, t: Real) -> Real {
    a + (b - a) * t
}
