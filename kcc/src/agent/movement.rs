//! The per-tick move.
//!
//! Velocity stages produce a desired velocity, then the remaining delta time is
//! consumed in substeps of at most `radius * CCD_MAX_STEP_RATIO` of movement.
//! Every substep runs the physical query and reconciles collision records.

use crate::{
    agent::Kcc,
    collision::{CollisionSolver, OverlapSlot, ground::calculate_ground_properties},
    constants::{
        CCD_MAX_STEP_RATIO, CCD_OPTIMAL_STEP_RATIO, DEFAULT_MAX_GROUND_ANGLE,
        DEFAULT_MAX_WALL_ANGLE, DEPENETRATION_SUB_STEPS,
    },
    math::{Vec3, clamp01},
    pipeline::Stage,
    query::{ColliderId, GeometryQuery, ObjectLookup, Scene, TriggerInteraction},
    settings::ShapeKind,
    state::{AgentState, Collision, DEFAULT_GRAVITY},
};

const VELOCITY_STAGES: [Stage; 5] = [
    Stage::SetDynamicVelocity,
    Stage::SetKinematicDirection,
    Stage::SetKinematicTangent,
    Stage::SetKinematicSpeed,
    Stage::SetKinematicVelocity,
];

impl Kcc {
    pub(crate) fn process_stage(&mut self, stage: Stage, data: &mut AgentState) {
        let is_fixed = self.is_in_fixed_update();
        self.pipeline
            .process_stage(stage, data, &self.settings, is_fixed);
    }

    pub(crate) fn cache_processors(&mut self, data: &AgentState) {
        self.pipeline
            .cache(&self.settings, &self.local_processors, data);
    }

    /// Resets per-tick inputs and runs `SetInputProperties`.
    pub(crate) fn set_input_properties(&mut self, data: &mut AgentState) {
        data.gravity = DEFAULT_GRAVITY;
        data.has_jumped = false;
        data.has_teleported = false;
        data.max_ground_angle = DEFAULT_MAX_GROUND_ANGLE;
        data.max_wall_angle = DEFAULT_MAX_WALL_ANGLE;

        self.process_stage(Stage::SetInputProperties, data);
    }

    fn solver<'a, G: GeometryQuery + ?Sized>(&'a mut self, scene: &'a G) -> CollisionSolver<'a, G> {
        CollisionSolver {
            scene,
            settings: &self.settings,
            features: self.pipeline.active_features(),
            own_collider: self.collider,
            resolve_collision: self.hooks.resolve_collision.as_deref(),
            statistics: &mut self.statistics,
            cache: &mut self.cache,
        }
    }

    /// Advances `data` by one tick of `data.delta_time`.
    pub(crate) fn move_data<S: Scene + ?Sized>(&mut self, scene: &S, data: &mut AgentState) {
        self.pipeline.clear_active_stage();
        self.pipeline.reset_features(self.settings.features);

        let base_time = data.time;
        let base_delta_time = data.delta_time;
        let mut pending_delta_time = clamp01(base_delta_time);
        let was_grounded = data.is_grounded;
        let was_stepping_up = data.is_stepping_up;
        let was_snapping_to_ground = data.is_snapping_to_ground;

        data.base_position = data.target_position;
        data.desired_position = data.target_position;

        if self.settings.shape == ShapeKind::None {
            self.remove_all_collisions(data);
            return;
        }

        self.cache_processors(data);
        self.set_input_properties(data);

        // SetInputProperties may have teleported
        let base_position = data.base_position;

        for stage in VELOCITY_STAGES {
            self.process_stage(stage, data);
        }

        let desired_position = data.base_position + data.desired_velocity() * pending_delta_time;
        if !data.has_teleported {
            data.target_position = data.base_position;
        }

        let max_delta = self.settings.radius * CCD_MAX_STEP_RATIO;
        let optimal_delta = self.settings.radius * CCD_OPTIMAL_STEP_RATIO;

        let mut has_finished = false;
        while !has_finished && !data.has_teleported {
            data.base_position = data.target_position;

            let mut substep_delta_time = pending_delta_time;
            let mut position_delta = data.desired_velocity() * pending_delta_time;
            let delta_magnitude = position_delta.norm();

            if delta_magnitude > max_delta {
                let ratio = optimal_delta / delta_magnitude;
                position_delta *= ratio;
                substep_delta_time *= ratio;
            } else {
                has_finished = true;
            }

            pending_delta_time = (pending_delta_time - substep_delta_time).max(0.0);

            data.time = base_time - pending_delta_time;
            data.delta_time = substep_delta_time;
            data.desired_position = data.base_position + position_delta;
            data.target_position = data.desired_position;

            self.process_physics_query(scene, data);
            self.update_collisions(scene, data);
        }

        data.time = base_time;
        data.delta_time = base_delta_time;
        data.base_position = base_position;
        data.desired_position = desired_position;
        data.was_grounded = was_grounded;
        data.was_stepping_up = was_stepping_up;
        data.was_snapping_to_ground = was_snapping_to_ground;

        if !data.has_teleported {
            if data.delta_time > 0.0 {
                data.real_velocity = (data.target_position - data.base_position) / data.delta_time;
                data.real_speed = data.real_velocity.norm();
            } else {
                data.real_velocity = Vec3::zeros();
                data.real_speed = 0.0;
            }
        }

        log::trace!(
            "tick {} moved {:?} -> {:?} grounded={}",
            data.tick,
            data.base_position,
            data.target_position,
            data.is_grounded
        );

        self.process_stage(Stage::Stay, data);
        self.pipeline.clear_active_stage();
    }

    /// Depenetration, grounding, step-up, snap and contact tracking of one substep.
    fn process_physics_query<S: Scene + ?Sized>(&mut self, scene: &S, data: &mut AgentState) {
        data.begin_ground_query();
        self.cache.track.clear();

        if self.settings.has_physics_query() {
            let (radius, height, extent, mask) = (
                self.settings.radius,
                self.settings.height,
                self.settings.extent,
                self.settings.collision_mask,
            );
            let mut solver = self.solver(scene);

            solver.overlap_capsule(
                OverlapSlot::Extended,
                data,
                data.target_position,
                radius,
                height,
                radius,
                mask,
                TriggerInteraction::Collide,
            );

            let (base, target) = (data.base_position, data.target_position);
            let probe_grounding = !data.has_jumped;
            data.target_position = solver.depenetrate(
                OverlapSlot::Extended,
                data,
                base,
                target,
                probe_grounding,
                DEPENETRATION_SUB_STEPS,
            );

            if data.has_jumped {
                data.is_grounded = false;
            }
            if data.is_grounded {
                calculate_ground_properties(data);
            }

            solver.check_triggers_penetration(OverlapSlot::Extended, data);

            if !data.has_jumped {
                solver.try_step_up(OverlapSlot::Extended, data);
            }

            if !data.is_grounded
                && data.was_grounded
                && !data.has_jumped
                && !data.is_stepping_up
                && !data.was_stepping_up
            {
                solver.try_snap_to_ground(data);
            }

            let cache = &mut *solver.cache;
            if cache.extended.all_within_extent() {
                cache.track.copy_from(&cache.extended);
            } else {
                solver.overlap_capsule(
                    OverlapSlot::Track,
                    data,
                    data.target_position,
                    radius,
                    height,
                    extent,
                    mask,
                    TriggerInteraction::Collide,
                );
            }
        }

        self.process_stage(Stage::ProcessPhysicsQuery, data);
    }

    /// Removals first, then additions.
    fn update_collisions<O: ObjectLookup + ?Sized>(&mut self, objects: &O, data: &mut AgentState) {
        let mut index = data.collisions.len();
        while index > 0 {
            index -= 1;
            let Some(collision) = data.collisions.get(index) else {
                continue;
            };
            let collider = collision.collider;
            if !self.cache.track.has_collider(collider) {
                self.remove_collision(data, collider);
            }
        }

        for index in 0..self.cache.track.all_hit_count() {
            let collider = self.cache.track.all_hits()[index].collider;
            if !data.has_collision(collider) {
                self.add_collision(objects, data, collider);
            }
        }
    }

    /// Colliders without an owning object are not tracked.
    fn add_collision<O: ObjectLookup + ?Sized>(
        &mut self,
        objects: &O,
        data: &mut AgentState,
        collider: ColliderId,
    ) {
        let Some(object) = objects.object_of(collider) else {
            return;
        };
        let collision = Collision {
            object: object.id,
            collider,
            processor: object.processor,
        };
        self.pipeline.add_collision(data, collision.clone());
        if let Some(hook) = &self.hooks.on_collision_enter {
            hook(data, &collision);
        }
    }

    pub(crate) fn remove_collision(&mut self, data: &mut AgentState, collider: ColliderId) {
        let Some(collision) = data.collisions.iter().find(|c| c.collider == collider).cloned() else {
            return;
        };
        if let Some(hook) = &self.hooks.on_collision_exit {
            hook(data, &collision);
        }
        self.pipeline.remove_collision(data, collider);
    }

    pub(crate) fn remove_all_collisions(&mut self, data: &mut AgentState) {
        while let Some(collision) = data.collisions.last() {
            let collider = collision.collider;
            self.remove_collision(data, collider);
        }
    }
}
