/*!
Per-tick agent state.

One authoritative instance (fixed data), one render-facing instance and a ring
of historical instances (see `history`) exist per agent. The movement driver
and every processor mutate it by exclusive reference during a tick.

Invariant: `target_position` is the spatial result of the last completed
substep. `base_position`/`desired_position` record the pre-resolution inputs.
*/

use crate::{
    constants::{DEFAULT_MAX_GROUND_ANGLE, DEFAULT_MAX_WALL_ANGLE},
    math::{Vec3, look_direction, yaw_direction},
    pipeline::ProcessorRef,
    query::{ColliderId, ObjectId},
};

/// Standard gravity applied by `SetInputProperties` (m/s^2).
pub const DEFAULT_GRAVITY: Vec3 = Vec3::new(0.0, -9.81, 0.0);

/// An active contact with a collider owned by a replicated object.
#[derive(Clone, Debug)]
pub struct Collision {
    pub object: ObjectId,
    pub collider: ColliderId,
    pub processor: Option<ProcessorRef>,
}

/// An interaction registered explicitly by game logic.
#[derive(Clone, Debug)]
pub struct Modifier {
    pub object: ObjectId,
    pub processor: Option<ProcessorRef>,
}

/// A collider excluded from every query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ignore {
    /// Owner object; only ignores with an owner are replicated.
    pub object: Option<ObjectId>,
    pub collider: ColliderId,
}

#[derive(Clone, Debug)]
pub struct AgentState {
    /// Host frame counter of the last update that touched this state.
    pub frame: u32,
    pub tick: i32,
    pub time: f32,
    pub delta_time: f32,
    /// Sub-tick blend factor. Always 1 for fixed data.
    pub alpha: f32,

    pub base_position: Vec3,
    pub desired_position: Vec3,
    pub target_position: Vec3,

    /// Degrees, clamped to [-90, 90].
    pub look_pitch: f32,
    /// Degrees, wrapped to [-180, 180].
    pub look_yaw: f32,

    /// Non-interpolated input direction, magnitude <= 1.
    pub input_direction: Vec3,
    pub jump_impulse: Vec3,
    pub gravity: Vec3,
    pub max_ground_angle: f32,
    pub max_wall_angle: f32,

    pub dynamic_velocity: Vec3,
    pub kinematic_direction: Vec3,
    pub kinematic_tangent: Vec3,
    pub kinematic_speed: f32,
    pub kinematic_velocity: Vec3,

    pub external_velocity: Vec3,
    pub external_acceleration: Vec3,
    pub external_impulse: Vec3,
    pub external_force: Vec3,

    pub real_velocity: Vec3,
    pub real_speed: f32,

    pub has_jumped: bool,
    pub has_teleported: bool,

    pub is_grounded: bool,
    pub was_grounded: bool,
    pub is_stepping_up: bool,
    pub was_stepping_up: bool,
    pub is_snapping_to_ground: bool,
    pub was_snapping_to_ground: bool,

    pub ground_normal: Vec3,
    pub ground_tangent: Vec3,
    pub ground_position: Vec3,
    pub ground_distance: f32,
    /// Degrees from vertical.
    pub ground_angle: f32,

    pub collisions: Vec<Collision>,
    pub modifiers: Vec<Modifier>,
    pub ignores: Vec<Ignore>,
}

impl Default for AgentState {
    fn default() -> Self {
        Self {
            frame: 0,
            tick: 0,
            time: 0.0,
            delta_time: 0.0,
            alpha: 0.0,
            base_position: Vec3::zeros(),
            desired_position: Vec3::zeros(),
            target_position: Vec3::zeros(),
            look_pitch: 0.0,
            look_yaw: 0.0,
            input_direction: Vec3::zeros(),
            jump_impulse: Vec3::zeros(),
            gravity: DEFAULT_GRAVITY,
            max_ground_angle: DEFAULT_MAX_GROUND_ANGLE,
            max_wall_angle: DEFAULT_MAX_WALL_ANGLE,
            dynamic_velocity: Vec3::zeros(),
            kinematic_direction: Vec3::zeros(),
            kinematic_tangent: Vec3::zeros(),
            kinematic_speed: 0.0,
            kinematic_velocity: Vec3::zeros(),
            external_velocity: Vec3::zeros(),
            external_acceleration: Vec3::zeros(),
            external_impulse: Vec3::zeros(),
            external_force: Vec3::zeros(),
            real_velocity: Vec3::zeros(),
            real_speed: 0.0,
            has_jumped: false,
            has_teleported: false,
            is_grounded: false,
            was_grounded: false,
            is_stepping_up: false,
            was_stepping_up: false,
            is_snapping_to_ground: false,
            was_snapping_to_ground: false,
            ground_normal: Vec3::zeros(),
            ground_tangent: Vec3::zeros(),
            ground_position: Vec3::zeros(),
            ground_distance: 0.0,
            ground_angle: 0.0,
            collisions: Vec::new(),
            modifiers: Vec::new(),
            ignores: Vec::new(),
        }
    }
}

impl AgentState {
    /// Combined velocity the driver moves by this tick.
    #[inline]
    pub fn desired_velocity(&self) -> Vec3 {
        self.dynamic_velocity + self.kinematic_velocity
    }

    #[inline]
    pub fn look_direction(&self) -> Vec3 {
        look_direction(self.look_pitch, self.look_yaw)
    }

    /// Horizontal facing (yaw only).
    #[inline]
    pub fn transform_direction(&self) -> Vec3 {
        yaw_direction(self.look_yaw)
    }

    /// Teleport semantics: positions jump and step/snap state resets.
    pub fn set_position(&mut self, position: Vec3) {
        self.base_position = position;
        self.desired_position = position;
        self.target_position = position;
        self.has_teleported = true;
        self.is_stepping_up = false;
        self.is_snapping_to_ground = false;
    }

    /// Clears per-substep ground state, shifting the current flags into the `was_*` shadows.
    pub fn begin_ground_query(&mut self) {
        self.was_grounded = self.is_grounded;
        self.was_stepping_up = self.is_stepping_up;
        self.was_snapping_to_ground = self.is_snapping_to_ground;

        self.is_grounded = false;
        self.is_stepping_up = false;
        self.is_snapping_to_ground = false;
        self.ground_normal = Vec3::zeros();
        self.ground_tangent = Vec3::zeros();
        self.ground_position = Vec3::zeros();
        self.ground_distance = 0.0;
        self.ground_angle = 0.0;
    }

    // --- Interactions ---

    pub fn has_collision(&self, collider: ColliderId) -> bool {
        self.collisions.iter().any(|c| c.collider == collider)
    }

    pub fn has_modifier(&self, object: ObjectId) -> bool {
        self.modifiers.iter().any(|m| m.object == object)
    }

    pub fn has_ignore(&self, collider: ColliderId) -> bool {
        self.ignores.iter().any(|i| i.collider == collider)
    }

    /// Adds an ignore once per collider. Returns `false` if already present.
    pub fn add_ignore(&mut self, ignore: Ignore) -> bool {
        if self.has_ignore(ignore.collider) {
            return false;
        }
        self.ignores.push(ignore);
        true
    }

    pub fn remove_ignore(&mut self, collider: ColliderId) -> bool {
        let before = self.ignores.len();
        self.ignores.retain(|i| i.collider != collider);
        before != self.ignores.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn desired_velocity_sums_dynamic_and_kinematic() {
        let data = AgentState {
            dynamic_velocity: Vec3::new(0.0, -2.0, 0.0),
            kinematic_velocity: Vec3::new(3.0, 0.0, 1.0),
            ..AgentState::default()
        };
        assert_eq!(data.desired_velocity(), Vec3::new(3.0, -2.0, 1.0));
    }

    #[test]
    fn set_position_marks_teleport_and_clears_step_snap() {
        let mut data = AgentState {
            is_stepping_up: true,
            is_snapping_to_ground: true,
            ..AgentState::default()
        };
        data.set_position(Vec3::new(1.0, 2.0, 3.0));

        assert!(data.has_teleported);
        assert!(!data.is_stepping_up);
        assert!(!data.is_snapping_to_ground);
        assert_eq!(data.base_position, data.target_position);
        assert_eq!(data.desired_position, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn begin_ground_query_shifts_shadows() {
        let mut data = AgentState {
            is_grounded: true,
            ground_distance: 0.2,
            ..AgentState::default()
        };
        data.begin_ground_query();
        assert!(data.was_grounded);
        assert!(!data.is_grounded);
        assert_eq!(data.ground_distance, 0.0);
    }

    #[test]
    fn ignores_are_unique_per_collider() {
        let mut data = AgentState::default();
        let ignore = Ignore {
            object: Some(ObjectId(7)),
            collider: ColliderId(3),
        };
        assert!(data.add_ignore(ignore));
        assert!(!data.add_ignore(ignore));
        assert!(data.has_ignore(ColliderId(3)));
        assert!(data.remove_ignore(ColliderId(3)));
        assert!(!data.remove_ignore(ColliderId(3)));
    }
}
