//! Math aliases and small geometric helpers shared by the controller.
//!
//! Conventions
//! - +Y is up. Positions are the capsule bottom (feet), not its center.
//! - Yaw/pitch are in degrees. Yaw 0 faces +Z, positive yaw turns towards +X.
//!   Positive pitch looks down.

use nalgebra as na;

/// Common math aliases for clarity and consistency.
pub type Vec3 = na::Vector3<f32>;
pub type Quat = na::UnitQuaternion<f32>;
pub type Iso = na::Isometry3<f32>;

pub const UP: Vec3 = Vec3::new(0.0, 1.0, 0.0);
pub const DOWN: Vec3 = Vec3::new(0.0, -1.0, 0.0);

#[inline]
pub fn iso_at(position: Vec3) -> Iso {
    Iso::from_parts(na::Translation3::from(position), Quat::identity())
}

#[inline]
pub fn only_xz(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

#[inline]
pub fn clamp01(v: f32) -> f32 {
    v.clamp(0.0, 1.0)
}

#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[inline]
pub fn lerp_vec(a: Vec3, b: Vec3, t: f32) -> Vec3 {
    a + (b - a) * t
}

#[inline]
pub fn is_almost_zero(v: f32, tolerance: f32) -> bool {
    v.abs() < tolerance
}

/// Normalizes `v`, returning zero for degenerate input instead of NaN.
#[inline]
pub fn normalize_or_zero(v: Vec3) -> Vec3 {
    let len = v.norm();
    if len > 1.0e-6 { v / len } else { Vec3::zeros() }
}

/// Angle between two directions in degrees.
#[inline]
pub fn angle_deg(a: Vec3, b: Vec3) -> f32 {
    if a.norm_squared() <= 1.0e-12 || b.norm_squared() <= 1.0e-12 {
        return 0.0;
    }
    a.angle(&b).to_degrees()
}

/// Clamps pitch into [-90, 90].
#[inline]
pub fn clamp_pitch(pitch: f32) -> f32 {
    pitch.clamp(-90.0, 90.0)
}

/// Wraps yaw into [-180, 180].
pub fn wrap_yaw(mut yaw: f32) -> f32 {
    if !yaw.is_finite() {
        return 0.0;
    }
    while yaw > 180.0 {
        yaw -= 360.0;
    }
    while yaw < -180.0 {
        yaw += 360.0;
    }
    yaw
}

/// Interpolates between `from` and `to` within a cyclic range `[min, max]`,
/// always taking the shorter way around.
pub fn interpolate_range(from: f32, to: f32, min: f32, max: f32, alpha: f32) -> f32 {
    let range = max - min;
    let mut delta = to - from;
    if delta > range * 0.5 {
        delta -= range;
    } else if delta < -range * 0.5 {
        delta += range;
    }

    let mut value = from + delta * alpha;
    if value > max {
        value -= range;
    } else if value < min {
        value += range;
    }
    value
}

/// Horizontal facing direction for a yaw in degrees.
#[inline]
pub fn yaw_direction(yaw: f32) -> Vec3 {
    let (sin, cos) = yaw.to_radians().sin_cos();
    Vec3::new(sin, 0.0, cos)
}

/// Full look direction for pitch/yaw in degrees.
#[inline]
pub fn look_direction(pitch: f32, yaw: f32) -> Vec3 {
    let (sin_yaw, cos_yaw) = yaw.to_radians().sin_cos();
    let (sin_pitch, cos_pitch) = pitch.to_radians().sin_cos();
    Vec3::new(sin_yaw * cos_pitch, -sin_pitch, cos_yaw * cos_pitch)
}

/// Projects `vector` onto the plane with `ground_normal` by moving it along Y.
///
/// Returns `None` when the plane is vertical or the projection is degenerate.
pub fn project_on_ground(ground_normal: Vec3, vector: Vec3) -> Option<Vec3> {
    let up_dot = UP.dot(&ground_normal);
    if is_almost_zero(up_dot, 1.0e-6) {
        return None;
    }

    let projected = Vec3::new(
        vector.x,
        vector.y - vector.dot(&ground_normal) / up_dot,
        vector.z,
    );
    if projected.norm_squared() <= 1.0e-12 {
        return None;
    }
    Some(projected)
}

/// Converts a penetration correction into a horizontal-only correction that
/// still clears the same surface.
///
/// For a surface normal `n` and depth `d`, moving horizontally by
/// `d * |n.xz| + (d * n.y)^2 / (d * |n.xz|)` clears it.
pub fn project_vertical_penetration(direction: Vec3, distance: f32) -> (Vec3, f32) {
    let correction = direction * distance;
    let correction_xz = only_xz(correction);
    let distance_xz = correction_xz.norm();

    if distance_xz >= 1.0e-6 {
        let reflected_xz = correction.y * correction.y / distance_xz;
        (correction_xz / distance_xz, distance_xz + reflected_xz)
    } else {
        (direction, distance)
    }
}

/// Intersects a ray with a plane. Returns the distance along `direction`
/// when the hit is in front of the origin.
pub fn ray_plane(origin: Vec3, direction: Vec3, plane_normal: Vec3, plane_point: Vec3) -> Option<f32> {
    let denom = direction.dot(&plane_normal);
    if is_almost_zero(denom, 1.0e-6) {
        return None;
    }
    let t = plane_normal.dot(&(plane_point - origin)) / denom;
    (t > 0.0).then_some(t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_yaw_keeps_range() {
        assert_eq!(wrap_yaw(190.0), -170.0);
        assert_eq!(wrap_yaw(-190.0), 170.0);
        assert_eq!(wrap_yaw(180.0), 180.0);
        assert_eq!(wrap_yaw(725.0), 5.0);
    }

    #[test]
    fn interpolate_range_crosses_wrap_boundary() {
        let mid = interpolate_range(170.0, -170.0, -180.0, 180.0, 0.5);
        assert!((mid.abs() - 180.0).abs() < 1.0e-4, "got {mid}");

        let quarter = interpolate_range(170.0, -170.0, -180.0, 180.0, 0.25);
        assert!((quarter - 175.0).abs() < 1.0e-4, "got {quarter}");

        let back = interpolate_range(-170.0, 170.0, -180.0, 180.0, 0.25);
        assert!((back + 175.0).abs() < 1.0e-4, "got {back}");
    }

    #[test]
    fn interpolate_range_never_travels_more_than_half_range() {
        let yaws = [-180.0, -179.0, -91.0, -45.0, 0.0, 12.5, 90.0, 135.0, 179.5, 180.0];
        let alphas = [0.0, 0.1, 0.33, 0.5, 0.9, 1.0];
        for &a in &yaws {
            for &b in &yaws {
                for &t in &alphas {
                    let v = interpolate_range(a, b, -180.0, 180.0, t);
                    let mut travel = (v - a).abs() % 360.0;
                    if travel > 180.0 {
                        travel = 360.0 - travel;
                    }
                    assert!(travel <= 180.0 + 1.0e-3, "{a} -> {b} @ {t} = {v}");
                    assert!((-180.0..=180.0).contains(&v));
                }
            }
        }
    }

    #[test]
    fn project_on_ground_follows_slope() {
        let n = Vec3::new(0.0, 1.0, 1.0).normalize();
        let projected = project_on_ground(n, Vec3::new(0.0, 0.0, 1.0)).unwrap();
        assert!(projected.dot(&n).abs() < 1.0e-5);
        assert!(projected.y < 0.0);
        assert!(project_on_ground(UP, Vec3::zeros()).is_none());
        assert!(project_on_ground(Vec3::x(), Vec3::z()).is_none());
    }

    #[test]
    fn vertical_penetration_projection_clears_same_plane() {
        let n = Vec3::new(1.0, 1.0, 0.0).normalize();
        let depth = 0.1;
        let (dir, dist) = project_vertical_penetration(n, depth);
        assert_eq!(dir.y, 0.0);
        // Moving along `dir` by `dist` clears the plane by exactly `depth`.
        assert!(((dir * dist).dot(&n) - depth).abs() < 1.0e-5);
    }

    #[test]
    fn ray_plane_hits_in_front_only() {
        let t = ray_plane(Vec3::zeros(), Vec3::x(), -Vec3::x(), Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(t, Some(2.0));
        assert_eq!(
            ray_plane(Vec3::zeros(), -Vec3::x(), -Vec3::x(), Vec3::new(2.0, 0.0, 0.0)),
            None
        );
    }
}
