use serde::{Deserialize, Serialize};

use super::types::{Pose, Quat, Real, Vec3};
use crate::error::ConfigError;

/// Relative distance to a breakpoint under which the breakpoint pose is returned verbatim.
const BREAKPOINT_SNAP: Real = 1e-9;

/// Piecewise trajectory imposed on a node.
///
/// Breakpoint times are relative to `t0`. Positions are interpolated
/// linearly and orientations by slerp between consecutive breakpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpolatedMotion {
    pub t0: Real,
    pub times: Vec<Real>,
    pub poses: Vec<Pose>,
}

/// Kinematic state prescribed by a trajectory at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionSample {
    pub pose: Pose,
    pub velocity: Vec3,
    pub angular_velocity: Vec3,
}

/// Where an instant falls relative to the trajectory's time window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionPhase {
    /// Before the first breakpoint; the node holds whatever pose it has.
    Pending,
    Active(MotionSample),
    /// After the last breakpoint; the final pose is held at rest.
    Finished(Pose),
}

impl InterpolatedMotion {
    /// Builds and validates a trajectory from parallel position/orientation/time lists.
    pub fn new(
        t0: Real,
        positions: Vec<Vec3>,
        orientations: Vec<Quat>,
        times: Vec<Real>,
    ) -> Result<Self, ConfigError> {
        if positions.len() != orientations.len() || positions.len() != times.len() {
            return Err(ConfigError::malformed_trajectory(format!(
                "{} positions, {} orientations and {} times must have equal length",
                positions.len(),
                orientations.len(),
                times.len()
            )));
        }
        let poses = positions
            .into_iter()
            .zip(orientations)
            .map(|(p, q)| Pose::new(p, q))
            .collect();
        let motion = Self { t0, times, poses };
        motion.validate()?;
        Ok(motion.normalized())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poses.is_empty() {
            return Err(ConfigError::malformed_trajectory(
                "at least one breakpoint is required",
            ));
        }
        if self.poses.len() != self.times.len() {
            return Err(ConfigError::malformed_trajectory(format!(
                "{} poses but {} breakpoint times",
                self.poses.len(),
                self.times.len()
            )));
        }
        if !self.t0.is_finite() {
            return Err(ConfigError::malformed_trajectory("t0 must be finite"));
        }
        if let Some(first) = self.times.first() {
            if !(first.is_finite() && *first >= 0.0) {
                return Err(ConfigError::malformed_trajectory(format!(
                    "first breakpoint time must be non-negative, got {first}"
                )));
            }
        }
        for (index, pair) in self.times.windows(2).enumerate() {
            if !(pair[1].is_finite() && pair[1] > pair[0]) {
                return Err(ConfigError::malformed_trajectory(format!(
                    "breakpoint times must strictly increase (index {}: {} -> {})",
                    index + 1,
                    pair[0],
                    pair[1]
                )));
            }
        }
        for (index, pose) in self.poses.iter().enumerate() {
            let norm = pose.orientation.length();
            if !pose.position.is_finite() || !norm.is_finite() || norm < 1e-12 {
                return Err(ConfigError::malformed_trajectory(format!(
                    "breakpoint {index} has a non-finite position or degenerate orientation"
                )));
            }
        }
        Ok(())
    }

    fn normalized(mut self) -> Self {
        for pose in &mut self.poses {
            pose.orientation = pose.orientation.normalize();
        }
        self
    }

    pub fn start_time(&self) -> Real {
        self.t0 + self.times.first().copied().unwrap_or(0.0)
    }

    pub fn end_time(&self) -> Real {
        self.t0 + self.times.last().copied().unwrap_or(0.0)
    }

    /// Evaluates the trajectory at absolute time `time`.
    ///
    /// Velocities are those of the segment ending at or after `time`: at a
    /// breakpoint the incoming segment applies, i.e. the velocity that
    /// carried the node onto that breakpoint during the step just taken.
    pub fn sample(&self, time: Real) -> MotionPhase {
        let (Some(&first), Some(&last)) = (self.times.first(), self.times.last()) else {
            return MotionPhase::Pending;
        };
        let local = time - self.t0;
        let scale = (last - first).abs().max(1.0);
        let snap = BREAKPOINT_SNAP * scale;

        if local < first - snap {
            return MotionPhase::Pending;
        }
        if local > last + snap {
            return MotionPhase::Finished(self.poses[self.poses.len() - 1]);
        }

        // first breakpoint not before `local`, so a breakpoint closes its segment
        let next = self.times.partition_point(|&t| t < local - snap);
        let segment = next.clamp(1, self.times.len().max(2) - 1);

        if self.times.len() == 1 {
            return MotionPhase::Active(MotionSample {
                pose: self.poses[0],
                velocity: Vec3::ZERO,
                angular_velocity: Vec3::ZERO,
            });
        }

        let (t_a, t_b) = (self.times[segment - 1], self.times[segment]);
        let (pose_a, pose_b) = (&self.poses[segment - 1], &self.poses[segment]);
        let span = t_b - t_a;
        let velocity = (pose_b.position - pose_a.position) / span;
        let angular_velocity = segment_angular_velocity(pose_a.orientation, pose_b.orientation, span);

        let pose = if let Some(index) = self
            .times
            .iter()
            .position(|&t| (t - local).abs() <= snap)
        {
            self.poses[index]
        } else {
            let alpha = ((local - t_a) / span).clamp(0.0, 1.0);
            Pose::new(
                pose_a.position.lerp(pose_b.position, alpha),
                pose_a.orientation.slerp(pose_b.orientation, alpha).normalize(),
            )
        };

        MotionPhase::Active(MotionSample {
            pose,
            velocity,
            angular_velocity,
        })
    }
}

fn segment_angular_velocity(from: Quat, to: Quat, span: Real) -> Vec3 {
    let mut delta = to * from.conjugate();
    if delta.w < 0.0 {
        delta = -delta;
    }
    let (axis, angle) = delta.normalize().to_axis_angle();
    if angle.abs() < 1e-15 {
        Vec3::ZERO
    } else {
        axis * (angle / span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn lift() -> InterpolatedMotion {
        InterpolatedMotion::new(
            1.0,
            vec![Vec3::ZERO, Vec3::new(0.0, 0.0, 0.3), Vec3::new(0.0, 0.3, 0.3)],
            vec![
                Quat::IDENTITY,
                Quat::from_axis_angle(Vec3::X, 0.5),
                Quat::from_axis_angle(Vec3::X, 1.0),
            ],
            vec![0.0, 0.3, 0.8],
        )
        .unwrap()
    }

    #[test]
    fn breakpoints_are_reproduced_exactly() {
        let motion = lift();
        match motion.sample(1.3) {
            MotionPhase::Active(sample) => {
                assert_eq!(sample.pose, motion.poses[1]);
                assert_relative_eq!(sample.velocity.z, 1.0, epsilon = 1e-12);
                assert_eq!(sample.velocity.y, 0.0);
            }
            other => panic!("expected active motion, got {other:?}"),
        }
        let MotionPhase::Active(after) = motion.sample(1.3 + 1e-6) else {
            panic!("motion should be active");
        };
        assert_eq!(after.velocity.z, 0.0);
        assert_relative_eq!(after.velocity.y, 0.3 / 0.5, epsilon = 1e-12);
    }

    #[test]
    fn interpolates_between_breakpoints() {
        let motion = lift();
        let MotionPhase::Active(sample) = motion.sample(1.15) else {
            panic!("motion should be active");
        };
        assert_relative_eq!(sample.pose.position.z, 0.15, epsilon = 1e-12);
        assert_relative_eq!(sample.angular_velocity.x, 0.5 / 0.3, epsilon = 1e-9);
    }

    #[test]
    fn outside_window_is_pending_or_finished() {
        let motion = lift();
        assert_eq!(motion.sample(0.5), MotionPhase::Pending);
        assert_eq!(motion.sample(5.0), MotionPhase::Finished(motion.poses[2]));
    }

    #[test]
    fn rejects_non_increasing_times() {
        let err = InterpolatedMotion::new(
            0.0,
            vec![Vec3::ZERO, Vec3::X],
            vec![Quat::IDENTITY, Quat::IDENTITY],
            vec![0.5, 0.5],
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MalformedTrajectory(_)));

        let err = InterpolatedMotion::new(0.0, vec![Vec3::ZERO], vec![], vec![0.0]).unwrap_err();
        assert!(matches!(err, ConfigError::MalformedTrajectory(_)));
    }
}
