//! Additional math helpers layered on top of `glam`.

use crate::core::types::{Mat3, Quat, Real, Vec3};

/// Converts an angular velocity vector (radians/sec) into a rotation over `dt`.
pub fn angular_velocity_to_quat(angular: Vec3, dt: Real) -> Quat {
    let angle = angular.length() * dt;
    if angle.abs() < 1e-14 {
        return Quat::IDENTITY;
    }
    let axis = angular.normalize();
    Quat::from_axis_angle(axis, angle)
}

/// Outer product `a bᵀ`.
pub fn outer(a: Vec3, b: Vec3) -> Mat3 {
    Mat3::from_cols(a * b.x, a * b.y, a * b.z)
}

/// Parallel-axis (Steiner) contribution of a point mass at `offset`.
pub fn parallel_axis(mass: Real, offset: Vec3) -> Mat3 {
    (Mat3::IDENTITY * offset.length_squared() - outer(offset, offset)) * mass
}

/// Expresses a tensor given in a body frame rotated by `rotation` in the parent frame.
pub fn rotate_tensor(rotation: Quat, tensor: Mat3) -> Mat3 {
    let r = Mat3::from_quat(rotation);
    r * tensor * r.transpose()
}

/// Eigenvalues of a symmetric 3x3 matrix in ascending order.
pub fn symmetric_eigenvalues(m: &Mat3) -> [Real; 3] {
    let a00 = m.x_axis.x;
    let a11 = m.y_axis.y;
    let a22 = m.z_axis.z;
    let a01 = m.y_axis.x;
    let a02 = m.z_axis.x;
    let a12 = m.z_axis.y;

    let p1 = a01 * a01 + a02 * a02 + a12 * a12;
    if p1 <= Real::EPSILON * (a00.abs() + a11.abs() + a22.abs()).max(Real::MIN_POSITIVE) {
        let mut diag = [a00, a11, a22];
        diag.sort_by(|a, b| a.total_cmp(b));
        return diag;
    }

    let q = (a00 + a11 + a22) / 3.0;
    let p2 = (a00 - q).powi(2) + (a11 - q).powi(2) + (a22 - q).powi(2) + 2.0 * p1;
    let p = (p2 / 6.0).sqrt();
    let b = (*m - Mat3::IDENTITY * q) * (1.0 / p);
    let r = (b.determinant() * 0.5).clamp(-1.0, 1.0);
    let phi = r.acos() / 3.0;

    let largest = q + 2.0 * p * phi.cos();
    let smallest = q + 2.0 * p * (phi + 2.0 * std::f64::consts::PI / 3.0).cos();
    let middle = 3.0 * q - largest - smallest;
    [smallest, middle, largest]
}

/// Any unit vector perpendicular to `v` (which must be non-zero).
pub fn any_orthogonal(v: Vec3) -> Vec3 {
    let candidate = if v.x.abs() < 0.9 { Vec3::X } else { Vec3::Y };
    v.cross(candidate).normalize_or_zero()
}

/// Component-wise check used by the stability guards.
pub fn all_finite(values: &[Vec3]) -> bool {
    values.iter().all(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn parallel_axis_of_offset_along_x() {
        let steiner = parallel_axis(2.0, Vec3::new(3.0, 0.0, 0.0));
        assert_relative_eq!(steiner.x_axis.x, 0.0);
        assert_relative_eq!(steiner.y_axis.y, 18.0);
        assert_relative_eq!(steiner.z_axis.z, 18.0);
    }

    #[test]
    fn eigenvalues_of_rotated_diagonal_tensor() {
        let diag = Mat3::from_diagonal(Vec3::new(1.0, 2.0, 5.0));
        let rotated = rotate_tensor(Quat::from_axis_angle(Vec3::new(1.0, 1.0, 0.0).normalize(), 0.7), diag);
        let eig = symmetric_eigenvalues(&rotated);
        assert_relative_eq!(eig[0], 1.0, epsilon = 1e-9);
        assert_relative_eq!(eig[1], 2.0, epsilon = 1e-9);
        assert_relative_eq!(eig[2], 5.0, epsilon = 1e-9);
    }

    #[test]
    fn angular_velocity_quat_keeps_unit_norm() {
        let q = angular_velocity_to_quat(Vec3::new(0.0, 0.0, 10.0), 0.01);
        assert_relative_eq!(q.length(), 1.0, epsilon = 1e-12);
        let (axis, angle) = q.to_axis_angle();
        assert_relative_eq!(angle, 0.1, epsilon = 1e-12);
        assert_relative_eq!(axis.z, 1.0, epsilon = 1e-12);
    }
}
