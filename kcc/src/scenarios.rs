//! End-to-end ticks of a full agent against a [`CollisionWorld`].

use std::rc::Rc;

use crate::{
    agent::{Authority, FixedTick, Kcc, RenderTick},
    math::{UP, Vec3},
    network::InterpolationData,
    pipeline::{Processor, ProcessorResult, StageContext},
    processors::EnvironmentProcessor,
    query::Transform,
    scene::{ColliderDef, CollisionWorld},
    settings::Settings,
};

const DT: f32 = 1.0 / 60.0;

/// Constant kinematic velocity, no gravity.
struct Drive {
    velocity: Vec3,
}

impl Processor for Drive {
    fn set_kinematic_velocity(&self, ctx: &mut StageContext<'_>) -> ProcessorResult {
        ctx.data.kinematic_velocity = self.velocity;
        Ok(())
    }
}

fn tick(tick: i32) -> FixedTick {
    FixedTick {
        frame: tick as u32,
        tick,
        time: tick as f32 * DT,
        delta_time: DT,
    }
}

fn spawn(world: &CollisionWorld, settings: Settings, position: Vec3) -> Kcc {
    let mut kcc = Kcc::new(settings);
    kcc.initialize(world, tick(0), position, None).unwrap();
    kcc
}

fn capsule(radius: f32, height: f32) -> Settings {
    Settings {
        radius,
        height,
        ..Settings::default()
    }
}

#[test]
fn falling_agent_lands_on_flat_ground() {
    let mut world = CollisionWorld::new();
    world.add(ColliderDef::plane(Transform::default()));

    let mut kcc = spawn(&world, capsule(0.5, 2.0), Vec3::new(0.0, 0.5, 0.0));
    kcc.add_local_processor(Rc::new(EnvironmentProcessor::default()));

    let mut landed = None;
    for t in 1..120 {
        kcc.fixed_update(&world, tick(t)).unwrap();
        if kcc.fixed_data().is_grounded {
            landed = Some(t);
            break;
        }
    }

    assert!(landed.is_some());
    let data = kcc.fixed_data();
    assert!((data.ground_normal - UP).norm() < 1.0e-4);
    assert!(data.ground_angle.abs() < 0.1);
    assert!(data.target_position.y > -1.0e-3);
    assert!(data.target_position.y <= kcc.settings().extent + 1.0e-3);
}

#[test]
fn wall_contact_depenetrates_along_its_normal() {
    let mut world = CollisionWorld::new();
    world.add(ColliderDef::cuboid(
        Vec3::new(0.5, 2.0, 2.0),
        Transform::from_translation(Vec3::new(1.5, 2.0, 0.0)),
    ));

    let mut kcc = spawn(&world, capsule(0.5, 2.0), Vec3::new(0.45, 1.0, 0.0));
    kcc.add_local_processor(Rc::new(Drive {
        velocity: Vec3::new(6.0, 0.0, 0.0),
    }));
    kcc.fixed_update(&world, tick(1)).unwrap();

    let data = kcc.fixed_data();
    assert!(!data.is_grounded);
    assert!((data.target_position - Vec3::new(0.5, 1.0, 0.0)).norm() < 1.0e-3);

    let wall = kcc.query_cache().extended.collider_hits().next().unwrap();
    assert!(wall.is_wall);
    assert!(!wall.is_ground);
    assert!((wall.direction + Vec3::x()).norm() < 1.0e-4);
}

#[test]
fn agent_steps_up_a_low_ledge() {
    let mut world = CollisionWorld::new();
    world.add(ColliderDef::plane(Transform::default()));
    world.add(ColliderDef::cuboid(
        Vec3::new(3.0, 0.1, 3.0),
        Transform::from_translation(Vec3::new(4.0, 0.1, 0.0)),
    ));

    let settings = Settings {
        step_height: 0.3,
        ..capsule(0.15, 1.8)
    };
    let mut kcc = spawn(&world, settings, Vec3::zeros());
    kcc.add_local_processor(Rc::new(EnvironmentProcessor::with_speed(3.0)));
    kcc.fixed_update(&world, tick(1)).unwrap();
    assert!(kcc.fixed_data().is_grounded);

    kcc.set_input_direction(Vec3::x());
    let mut stepped = false;
    let mut highest = 0.0f32;
    for t in 2..90 {
        kcc.fixed_update(&world, tick(t)).unwrap();
        let data = kcc.fixed_data();
        if data.is_stepping_up {
            stepped = true;
            assert!(kcc.statistics().shapecast_queries > 0);
            assert!(data.is_grounded);
            assert_eq!(data.ground_distance, 0.0);
        }
        assert!(kcc.statistics().overlap_queries > 0);
        highest = highest.max(data.target_position.y);
    }

    let data = kcc.fixed_data();
    assert!(stepped);
    assert!(highest <= 0.3 + 1.0e-3);
    assert!(data.target_position.x > 1.5);
    assert!((data.target_position.y - 0.2).abs() < 0.05);
}

#[test]
fn agent_without_step_height_is_blocked_by_the_ledge() {
    let mut world = CollisionWorld::new();
    world.add(ColliderDef::plane(Transform::default()));
    world.add(ColliderDef::cuboid(
        Vec3::new(3.0, 0.1, 3.0),
        Transform::from_translation(Vec3::new(4.0, 0.1, 0.0)),
    ));

    let settings = Settings {
        step_height: 0.0,
        ..capsule(0.15, 1.8)
    };
    let mut kcc = spawn(&world, settings, Vec3::zeros());
    kcc.add_local_processor(Rc::new(EnvironmentProcessor::with_speed(3.0)));
    kcc.set_input_direction(Vec3::x());
    for t in 1..90 {
        kcc.fixed_update(&world, tick(t)).unwrap();
        assert!(!kcc.fixed_data().is_stepping_up);
    }

    let data = kcc.fixed_data();
    assert!(data.target_position.x < 1.0 - 0.15 + 1.0e-3);
    assert!(data.target_position.y < 0.05);
}

fn snapshot(kcc: &Kcc) -> Vec<i32> {
    let mut words = vec![0; kcc.network_word_count()];
    kcc.write_network_data(&mut words).unwrap();
    words
}

fn proxy_between(from: Vec3, to: Vec3, ticks: i32) -> Kcc {
    let world = CollisionWorld::new();
    let mut authority = spawn(&world, Settings::default(), from);
    let mut first = snapshot(&authority);
    authority.set_position(to);
    let second = snapshot(&authority);

    let mut proxy = Kcc::new(Settings::default());
    proxy.set_authority(Authority::NONE);
    proxy
        .initialize(&world, tick(0), Vec3::zeros(), Some(first.as_mut_slice()))
        .unwrap();
    proxy
        .render_update(
            &world,
            RenderTick {
                fixed_delta_time: DT,
                snapshots: Some(InterpolationData {
                    from: &first,
                    to: &second,
                    from_tick: 0,
                    to_tick: ticks,
                    alpha: 0.5,
                }),
                ..RenderTick::default()
            },
        )
        .unwrap();
    proxy
}

#[test]
fn proxy_snaps_to_snapshot_on_teleport() {
    let proxy = proxy_between(Vec3::zeros(), Vec3::new(10.0, 0.0, 0.0), 3);
    let data = proxy.fixed_data();
    assert!((data.target_position - Vec3::new(10.0, 0.0, 0.0)).norm() < 1.0e-3);
    assert_eq!(data.real_velocity, Vec3::zeros());
    assert_eq!(proxy.render_data().target_position, data.target_position);
}

#[test]
fn proxy_interpolates_regular_motion() {
    let proxy = proxy_between(Vec3::zeros(), Vec3::new(2.0, 0.0, 0.0), 3);
    let data = proxy.fixed_data();
    assert!((data.target_position - Vec3::new(1.0, 0.0, 0.0)).norm() < 1.0e-3);
    assert!((data.real_velocity.x - 2.0 / (3.0 * DT)).abs() < 1.0e-2);
}

#[test]
fn owned_collider_fires_enter_and_exit_hooks() {
    use std::cell::Cell;

    use crate::query::ObjectId;

    let mut world = CollisionWorld::new();
    world.add(
        ColliderDef::sphere(0.5, Transform::from_translation(Vec3::new(1.0, 1.0, 0.0)))
            .with_object(ObjectId(9))
            .trigger(),
    );

    let entered = Rc::new(Cell::new(0));
    let exited = Rc::new(Cell::new(0));
    let mut kcc = spawn(&world, capsule(0.5, 2.0), Vec3::new(-2.0, 0.0, 0.0));
    kcc.add_local_processor(Rc::new(Drive {
        velocity: Vec3::new(6.0, 0.0, 0.0),
    }));
    {
        let entered = entered.clone();
        kcc.on_collision_enter(move |_, collision| {
            assert_eq!(collision.object, ObjectId(9));
            entered.set(entered.get() + 1);
        });
        let exited = exited.clone();
        kcc.on_collision_exit(move |_, _| exited.set(exited.get() + 1));
    }

    for t in 1..60 {
        kcc.fixed_update(&world, tick(t)).unwrap();
    }

    assert_eq!(entered.get(), 1);
    assert_eq!(exited.get(), 1);
    assert!(kcc.fixed_data().collisions.is_empty());
}
