//! Default locomotion: gravity, forces and walking.
//!
//! Behavior
//! - Gravity integrates into dynamic velocity while airborne. Landing clears
//!   any downward dynamic velocity.
//! - Jump impulse and the external force/impulse/acceleration/velocity inputs
//!   are folded into dynamic velocity once per tick. A consumed jump marks
//!   the tick as jumped so the physical query does not re-ground the agent.
//! - Input direction times speed becomes kinematic velocity, projected onto
//!   the ground plane when grounded. In the air it blends towards the target
//!   at the air control rate.

use crate::{
    math::{Vec3, clamp01, lerp_vec, normalize_or_zero, only_xz, project_on_ground},
    pipeline::{Processor, ProcessorResult, Stage, StageContext, StageMask},
    state::AgentState,
};

/// Runs ahead of gameplay processors so they can read and override its output.
pub const ENVIRONMENT_PRIORITY: f32 = 1000.0;

#[derive(Clone, Debug)]
pub struct EnvironmentProcessor {
    /// Walk speed for a full-length input direction (m/s).
    pub kinematic_speed: f32,
    /// Rate (1/s) at which airborne kinematic velocity approaches the input.
    pub air_control: f32,
    /// Horizontal dynamic velocity decay while grounded (1/s).
    pub ground_damping: f32,
    /// Horizontal dynamic velocity decay while airborne (1/s).
    pub air_damping: f32,
    /// Overrides the default gravity when set.
    pub gravity: Option<Vec3>,
    pub priority: f32,
}

impl Default for EnvironmentProcessor {
    fn default() -> Self {
        Self {
            kinematic_speed: 6.0,
            air_control: 2.0,
            ground_damping: 8.0,
            air_damping: 0.0,
            gravity: None,
            priority: ENVIRONMENT_PRIORITY,
        }
    }
}

impl EnvironmentProcessor {
    pub fn with_speed(kinematic_speed: f32) -> Self {
        Self {
            kinematic_speed,
            ..Self::default()
        }
    }
}

fn damp_horizontal(velocity: Vec3, damping: f32, delta_time: f32) -> Vec3 {
    let factor = (1.0 - damping * delta_time).max(0.0);
    let horizontal = only_xz(velocity) * factor;
    Vec3::new(horizontal.x, velocity.y, horizontal.z)
}

impl Processor for EnvironmentProcessor {
    fn priority(&self) -> f32 {
        self.priority
    }

    fn valid_stages(&self, _data: &AgentState) -> StageMask {
        StageMask::from_tags(&[
            Stage::SetInputProperties,
            Stage::SetDynamicVelocity,
            Stage::SetKinematicDirection,
            Stage::SetKinematicTangent,
            Stage::SetKinematicSpeed,
            Stage::SetKinematicVelocity,
        ])
    }

    fn set_input_properties(&self, ctx: &mut StageContext<'_>) -> ProcessorResult {
        if let Some(gravity) = self.gravity {
            ctx.data.gravity = gravity;
        }
        Ok(())
    }

    fn set_dynamic_velocity(&self, ctx: &mut StageContext<'_>) -> ProcessorResult {
        let mass = ctx.settings.mass;
        let inverse_mass = if mass > 0.0 { 1.0 / mass } else { 0.0 };
        let data = &mut *ctx.data;
        let delta_time = data.delta_time;

        let mut velocity = data.dynamic_velocity;
        if data.is_grounded {
            velocity.y = velocity.y.max(0.0);
            velocity = damp_horizontal(velocity, self.ground_damping, delta_time);
        } else {
            velocity += data.gravity * delta_time;
            velocity = damp_horizontal(velocity, self.air_damping, delta_time);
        }

        if data.jump_impulse != Vec3::zeros() {
            velocity.y = velocity.y.max(0.0);
            velocity += data.jump_impulse * inverse_mass;
            data.has_jumped = true;
        }

        velocity += data.external_velocity;
        velocity += data.external_acceleration * delta_time;
        velocity += data.external_impulse * inverse_mass;
        velocity += data.external_force * inverse_mass * delta_time;

        data.dynamic_velocity = velocity;
        Ok(())
    }

    fn set_kinematic_direction(&self, ctx: &mut StageContext<'_>) -> ProcessorResult {
        ctx.data.kinematic_direction = ctx.data.input_direction;
        Ok(())
    }

    fn set_kinematic_tangent(&self, ctx: &mut StageContext<'_>) -> ProcessorResult {
        let data = &mut *ctx.data;
        let direction = data.kinematic_direction;

        let grounded = if data.is_grounded {
            project_on_ground(data.ground_normal, direction).map(|tangent| tangent.normalize())
        } else {
            None
        };
        data.kinematic_tangent = grounded.unwrap_or_else(|| normalize_or_zero(direction));
        Ok(())
    }

    fn set_kinematic_speed(&self, ctx: &mut StageContext<'_>) -> ProcessorResult {
        let magnitude = ctx.data.kinematic_direction.norm().min(1.0);
        ctx.data.kinematic_speed = self.kinematic_speed * magnitude;
        Ok(())
    }

    fn set_kinematic_velocity(&self, ctx: &mut StageContext<'_>) -> ProcessorResult {
        let data = &mut *ctx.data;
        let target = data.kinematic_tangent * data.kinematic_speed;

        data.kinematic_velocity = if data.is_grounded {
            target
        } else {
            let blend = clamp01(self.air_control * data.delta_time);
            lerp_vec(data.kinematic_velocity, target, blend)
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::{
        agent::{FixedTick, Kcc},
        math::UP,
        query::Transform,
        scene::{ColliderDef, CollisionWorld},
        settings::Settings,
    };

    const DT: f32 = 1.0 / 60.0;

    fn agent(world: &CollisionWorld, position: Vec3) -> Kcc {
        let mut kcc = Kcc::new(Settings::default());
        kcc.add_local_processor(Rc::new(EnvironmentProcessor::default()));
        kcc.initialize(world, FixedTick::default(), position, None)
            .unwrap();
        kcc
    }

    fn run(kcc: &mut Kcc, world: &CollisionWorld, ticks: std::ops::Range<i32>) {
        for tick in ticks {
            kcc.fixed_update(
                world,
                FixedTick {
                    frame: tick as u32,
                    tick,
                    time: tick as f32 * DT,
                    delta_time: DT,
                },
            )
            .unwrap();
        }
    }

    fn flat_ground() -> CollisionWorld {
        let mut world = CollisionWorld::new();
        world.add(ColliderDef::plane(Transform::default()));
        world
    }

    #[test]
    fn falls_under_gravity_without_ground() {
        let world = CollisionWorld::new();
        let mut kcc = agent(&world, Vec3::new(0.0, 10.0, 0.0));
        run(&mut kcc, &world, 1..31);

        let data = kcc.fixed_data();
        assert!(!data.is_grounded);
        assert!((data.dynamic_velocity.y + 9.81 * 30.0 * DT).abs() < 1.0e-3);
        assert!(data.target_position.y < 10.0);
    }

    #[test]
    fn walks_along_flat_ground() {
        let world = flat_ground();
        let mut kcc = agent(&world, Vec3::zeros());
        run(&mut kcc, &world, 1..3);
        assert!(kcc.fixed_data().is_grounded);

        kcc.set_input_direction(Vec3::x());
        run(&mut kcc, &world, 3..63);

        let data = kcc.fixed_data();
        assert!(data.is_grounded);
        assert!(data.target_position.y.abs() < 0.01);
        assert!((data.target_position.x - 6.0).abs() < 0.1);
        assert!((data.real_speed - 6.0).abs() < 0.1);
    }

    #[test]
    fn jump_leaves_the_ground() {
        let world = flat_ground();
        let mut kcc = agent(&world, Vec3::zeros());
        run(&mut kcc, &world, 1..3);

        kcc.jump(UP * 5.0);
        run(&mut kcc, &world, 3..4);

        let data = kcc.fixed_data();
        assert!(data.has_jumped);
        assert!(!data.is_grounded);
        assert!(data.dynamic_velocity.y > 4.5);
        assert!(data.target_position.y > 0.05);
        assert_eq!(data.jump_impulse, Vec3::zeros());
    }

    #[test]
    fn external_impulse_applies_once_then_decays_on_ground() {
        let world = flat_ground();
        let mut kcc = agent(&world, Vec3::zeros());
        run(&mut kcc, &world, 1..3);

        kcc.add_external_impulse(Vec3::x() * 4.0);
        run(&mut kcc, &world, 3..4);
        let pushed = kcc.fixed_data().dynamic_velocity.x;
        assert!((pushed - 4.0).abs() < 1.0e-4);
        assert_eq!(kcc.fixed_data().external_impulse, Vec3::zeros());

        run(&mut kcc, &world, 4..5);
        let decayed = kcc.fixed_data().dynamic_velocity.x;
        assert!((decayed - pushed * (1.0 - 8.0 * DT)).abs() < 1.0e-4);
    }

    #[test]
    fn airborne_input_blends_at_air_control_rate() {
        let world = CollisionWorld::new();
        let mut kcc = agent(&world, Vec3::new(0.0, 10.0, 0.0));
        kcc.set_input_direction(Vec3::z());
        run(&mut kcc, &world, 1..2);

        let expected = 6.0 * (2.0 * DT);
        assert!((kcc.fixed_data().kinematic_velocity.z - expected).abs() < 1.0e-4);
    }
}
