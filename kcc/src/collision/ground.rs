//! Step-up, snap-to-ground and ground tangent.
//!
//! Both heuristics run after depenetration within the same substep and only
//! ever touch `target_position` plus the ground fields.

use crate::{
    collision::{CollisionSolver, OverlapSlot},
    constants::{
        SNAP_STEP_RATIO, STEP_GROUND_DISTANCE, STEP_MAX_DOWN_DOT, STEP_MIN_ALIGNMENT,
    },
    math::{DOWN, UP, Vec3, clamp01, normalize_or_zero, only_xz, project_on_ground, ray_plane},
    query::{GeometryQuery, TriggerInteraction},
    settings::Feature,
    state::AgentState,
};

/// Ground tangent from the ground normal, falling back to the desired
/// velocity and then to the facing direction.
pub fn calculate_ground_properties(data: &mut AgentState) {
    let normal = data.ground_normal;
    data.ground_tangent = project_on_ground(normal, only_xz(normal))
        .or_else(|| project_on_ground(normal, only_xz(data.desired_velocity())))
        .map(|tangent| tangent.normalize())
        .unwrap_or_else(|| data.transform_direction());
}

impl<G: GeometryQuery + ?Sized> CollisionSolver<'_, G> {
    /// Raises the target over a ledge blocking horizontal movement.
    ///
    /// `slot` holds the classified contacts of the current substep.
    pub fn try_step_up(&mut self, slot: OverlapSlot, data: &mut AgentState) {
        let settings = self.settings;
        if !self.features.has(Feature::StepUp) || settings.step_height <= 0.0 {
            return;
        }

        let touching = self.cache.overlap(slot).is_touching_slope_or_wall();
        if data.was_stepping_up {
            if !touching {
                data.is_stepping_up = false;
                return;
            }
            data.is_stepping_up = true;
        } else {
            if !data.is_grounded || data.ground_distance > STEP_GROUND_DISTANCE {
                data.is_stepping_up = false;
                return;
            }
            if touching {
                data.is_stepping_up = true;
            }
        }

        if !data.is_stepping_up {
            return;
        }

        let base = data.base_position;
        let desired = data.desired_position;
        let mut target = data.target_position;

        let desired_delta = desired - base;
        let desired_direction = normalize_or_zero(desired_delta);
        if desired_direction == Vec3::zeros() || desired_direction.dot(&DOWN) >= STEP_MAX_DOWN_DOT {
            data.is_stepping_up = false;
            return;
        }

        let correction_direction = normalize_or_zero(target - desired);
        if desired_direction.dot(&correction_direction) >= 0.0 {
            data.is_stepping_up = false;
            return;
        }

        // clip the desired ray against the blocking surface
        if correction_direction != Vec3::zeros() {
            let origin = base - desired_delta * 2.0;
            if let Some(distance) = ray_plane(origin, desired_direction, correction_direction, target) {
                target = origin + desired_direction * distance;
            }
        }

        let (radius, height, mask) = (settings.radius, settings.height, settings.collision_mask);

        let mut check = target + Vec3::new(0.0, settings.step_height, 0.0);
        if self.overlap_capsule(
            OverlapSlot::Shared,
            data,
            check,
            radius,
            height,
            0.0,
            mask,
            TriggerInteraction::Ignore,
        ) {
            data.is_stepping_up = false;
            return;
        }

        let desired_xz = normalize_or_zero(only_xz(desired_direction));
        let correction_xz = normalize_or_zero(-only_xz(correction_direction));
        if desired_xz.dot(&correction_xz) < STEP_MIN_ALIGNMENT {
            data.is_stepping_up = false;
            return;
        }

        check += normalize_or_zero(desired_xz + correction_xz) * radius;
        if self.overlap_capsule(
            OverlapSlot::Shared,
            data,
            check,
            radius,
            height,
            0.0,
            mask,
            TriggerInteraction::Ignore,
        ) {
            data.is_stepping_up = false;
            return;
        }

        let check_radius = radius - settings.extent;
        let mut max_step_height = settings.step_height;
        if self.sphere_cast(
            data,
            check + Vec3::new(0.0, check_radius, 0.0),
            DOWN,
            max_step_height,
            check_radius,
            mask,
            TriggerInteraction::Ignore,
        ) {
            if let Some(highest) = self.cache.raycast.highest_point() {
                max_step_height = (max_step_height - (check.y - highest.y) - settings.extent)
                    .clamp(0.0, settings.step_height);
            }
        }

        let desired_distance = desired_delta.norm();
        let travelled_distance = (target - base).norm();
        let remaining = ((desired_distance - travelled_distance) * settings.step_speed)
            .clamp(0.0, max_step_height)
            * clamp01(desired_direction.dot(&-correction_direction));

        data.target_position = target + Vec3::new(0.0, remaining, 0.0);
        data.is_grounded = true;
        data.ground_normal = UP;
        data.ground_distance = 0.0;
        data.ground_position = data.target_position;
        data.ground_tangent = data.transform_direction();
    }

    /// Pulls the target down onto ground lost since the previous substep.
    ///
    /// The correction per call is capped at `snap_speed * delta_time`, halved
    /// when snapping was not already active.
    pub fn try_snap_to_ground(&mut self, data: &mut AgentState) {
        let settings = self.settings;
        if !self.features.has(Feature::SnapToGround)
            || settings.snap_distance <= 0.0
            || data.dynamic_velocity.y > 0.0
        {
            return;
        }

        let snap_distance = settings.snap_distance;
        let steps = (snap_distance / (settings.radius * SNAP_STEP_RATIO)).ceil().max(1.0) as u32;
        let step_delta = Vec3::new(0.0, -snap_distance / steps as f32, 0.0);

        self.overlap_capsule(
            OverlapSlot::Shared,
            data,
            data.target_position - Vec3::new(0.0, snap_distance, 0.0),
            settings.radius,
            settings.height + snap_distance,
            settings.radius,
            settings.collision_mask,
            TriggerInteraction::Ignore,
        );
        if self.cache.shared.collider_hit_count() == 0 {
            return;
        }

        let mut grounded = data.target_position;
        for _ in 0..steps {
            grounded =
                self.depenetrate(OverlapSlot::Shared, data, grounded, grounded + step_delta, false, 0);

            if !data.is_grounded {
                continue;
            }

            let mut max_snap = settings.snap_speed * data.delta_time;
            if !data.was_snapping_to_ground {
                max_snap *= 0.5;
            }

            let offset = grounded - data.target_position;
            let snapped = if offset.norm_squared() <= max_snap * max_snap {
                grounded
            } else {
                data.target_position + offset.normalize() * max_snap
            };

            data.target_position = snapped;
            data.ground_distance = (snapped.y - grounded.y).max(0.0);
            data.is_snapping_to_ground = true;
            calculate_ground_properties(data);
            break;
        }
    }
}
