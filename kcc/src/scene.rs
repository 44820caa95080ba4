//! Parry-backed collision world implementing the geometry port.
//!
//! A flat list of colliders queried brute force in insertion order, which keeps
//! every query deterministic. Hosts with their own broad phase implement
//! [`GeometryQuery`] directly instead.

use rapier3d::{
    na,
    parry::{
        query::{self, Ray, RayCast, ShapeCastOptions},
        shape::{Ball, Capsule, Segment, SharedShape},
    },
};

use crate::{
    math::{Iso, Vec3, iso_at, normalize_or_zero},
    pipeline::ProcessorRef,
    query::{
        CapsuleShape, CastHit, ColliderId, GeometryQuery, HitBuffer, ObjectId, ObjectLookup,
        OverlapCandidate, Penetration, SceneObject, Transform, TriggerInteraction,
    },
};

/// Collider shape definitions, expressed in the collider's local frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ColliderShapeDef {
    /// Half-space below the local XZ plane; the surface normal is local +Y.
    Plane,
    Cuboid { half_extents: Vec3 },
    Sphere { radius: f32 },
    /// Y-aligned capsule. `half_height` is the half-length of the inner segment.
    CapsuleY { half_height: f32, radius: f32 },
    CylinderY { half_height: f32, radius: f32 },
    RoundCuboid { half_extents: Vec3, border_radius: f32 },
}

impl ColliderShapeDef {
    fn to_shared(self) -> SharedShape {
        match self {
            ColliderShapeDef::Plane => SharedShape::halfspace(Vec3::y_axis()),
            ColliderShapeDef::Cuboid { half_extents } => {
                SharedShape::cuboid(half_extents.x, half_extents.y, half_extents.z)
            }
            ColliderShapeDef::Sphere { radius } => SharedShape::ball(radius),
            ColliderShapeDef::CapsuleY { half_height, radius } => {
                SharedShape::capsule_y(half_height, radius)
            }
            ColliderShapeDef::CylinderY { half_height, radius } => {
                SharedShape::cylinder(half_height, radius)
            }
            ColliderShapeDef::RoundCuboid {
                half_extents,
                border_radius,
            } => SharedShape::round_cuboid(
                half_extents.x,
                half_extents.y,
                half_extents.z,
                border_radius,
            ),
        }
    }
}

/// Everything needed to add a collider to a [`CollisionWorld`].
#[derive(Clone, Debug)]
pub struct ColliderDef {
    pub shape: ColliderShapeDef,
    pub transform: Transform,
    /// Collision layer in `0..32`.
    pub layer: u8,
    pub is_trigger: bool,
    /// Owning replicated object, if any.
    pub object: Option<ObjectId>,
    /// Interaction processor provided by the owning object.
    pub processor: Option<ProcessorRef>,
}

impl ColliderDef {
    pub fn new(shape: ColliderShapeDef, transform: Transform) -> Self {
        Self {
            shape,
            transform,
            layer: 0,
            is_trigger: false,
            object: None,
            processor: None,
        }
    }

    pub fn plane(transform: Transform) -> Self {
        Self::new(ColliderShapeDef::Plane, transform)
    }

    pub fn cuboid(half_extents: Vec3, transform: Transform) -> Self {
        Self::new(ColliderShapeDef::Cuboid { half_extents }, transform)
    }

    pub fn sphere(radius: f32, transform: Transform) -> Self {
        Self::new(ColliderShapeDef::Sphere { radius }, transform)
    }

    pub fn with_layer(mut self, layer: u8) -> Self {
        self.layer = layer.min(31);
        self
    }

    pub fn trigger(mut self) -> Self {
        self.is_trigger = true;
        self
    }

    pub fn with_object(mut self, object: ObjectId) -> Self {
        self.object = Some(object);
        self
    }

    pub fn with_processor(mut self, processor: ProcessorRef) -> Self {
        self.processor = Some(processor);
        self
    }
}

struct WorldCollider {
    id: ColliderId,
    def: ColliderDef,
    shape: SharedShape,
}

impl WorldCollider {
    #[inline]
    fn iso(&self) -> Iso {
        self.def.transform.iso()
    }

    #[inline]
    fn layer_bit(&self) -> u32 {
        1u32 << self.def.layer.min(31)
    }

    fn passes(&self, mask: u32, triggers: TriggerInteraction) -> bool {
        mask & self.layer_bit() != 0
            && (!self.def.is_trigger || triggers == TriggerInteraction::Collide)
    }
}

/// Static and kinematic colliders the controller moves against.
#[derive(Default)]
pub struct CollisionWorld {
    colliders: Vec<WorldCollider>,
    next_id: u32,
}

impl CollisionWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, def: ColliderDef) -> ColliderId {
        let id = ColliderId(self.next_id);
        self.next_id += 1;
        let shape = def.shape.to_shared();
        self.colliders.push(WorldCollider { id, def, shape });
        id
    }

    pub fn remove(&mut self, id: ColliderId) -> Option<ColliderDef> {
        let index = self.colliders.iter().position(|c| c.id == id)?;
        Some(self.colliders.remove(index).def)
    }

    /// Moves a collider. Returns `false` for unknown ids.
    pub fn set_transform(&mut self, id: ColliderId, transform: Transform) -> bool {
        match self.colliders.iter_mut().find(|c| c.id == id) {
            Some(collider) => {
                collider.def.transform = transform;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: ColliderId) -> Option<&ColliderDef> {
        self.find(id).map(|c| &c.def)
    }

    pub fn len(&self) -> usize {
        self.colliders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colliders.is_empty()
    }

    fn find(&self, id: ColliderId) -> Option<&WorldCollider> {
        self.colliders.iter().find(|c| c.id == id)
    }

    fn push_cast(
        hits: &mut HitBuffer<CastHit>,
        collider: &WorldCollider,
        point: Vec3,
        normal: Vec3,
        distance: f32,
    ) -> bool {
        hits.push(CastHit {
            collider: collider.id,
            transform: collider.def.transform,
            is_trigger: collider.def.is_trigger,
            point,
            normal,
            distance,
        })
    }
}

impl std::fmt::Debug for CollisionWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.colliders.iter().map(|c| (c.id, &c.def)))
            .finish()
    }
}

fn agent_capsule(position: Vec3, radius: f32, height: f32) -> (Iso, Capsule) {
    let shape = CapsuleShape { radius, height };
    (
        iso_at(shape.center(position)),
        Capsule::new_y(shape.half_segment(), radius),
    )
}

fn agent_segment(position: Vec3, shape: &CapsuleShape) -> (Iso, Segment) {
    let half = shape.half_segment();
    (
        iso_at(shape.center(position)),
        Segment::new(
            na::Point3::new(0.0, -half, 0.0),
            na::Point3::new(0.0, half, 0.0),
        ),
    )
}

impl GeometryQuery for CollisionWorld {
    fn overlap_capsule(
        &self,
        position: Vec3,
        radius: f32,
        height: f32,
        extent: f32,
        mask: u32,
        triggers: TriggerInteraction,
        hits: &mut HitBuffer<OverlapCandidate>,
    ) {
        let query_radius = radius + extent;
        // same inner segment, radius grown by the extent
        let (iso, capsule) = agent_capsule(
            position - Vec3::new(0.0, extent, 0.0),
            query_radius,
            height + 2.0 * extent,
        );

        for collider in self.colliders.iter().filter(|c| c.passes(mask, triggers)) {
            let touching =
                query::intersection_test(&iso, &capsule, &collider.iso(), &*collider.shape)
                    .unwrap_or_else(|err| {
                        log::warn!("overlap unsupported for {:?}: {:?}", collider.id, err);
                        false
                    });
            if !touching {
                continue;
            }
            let candidate = OverlapCandidate {
                collider: collider.id,
                transform: collider.def.transform,
                is_trigger: collider.def.is_trigger,
            };
            if !hits.push(candidate) {
                break;
            }
        }
    }

    fn raycast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        mask: u32,
        triggers: TriggerInteraction,
        hits: &mut HitBuffer<CastHit>,
    ) {
        let direction = normalize_or_zero(direction);
        if direction == Vec3::zeros() || max_distance <= 0.0 {
            return;
        }
        let ray = Ray::new(na::Point3::from(origin), direction);

        for collider in self.colliders.iter().filter(|c| c.passes(mask, triggers)) {
            let Some(hit) =
                collider
                    .shape
                    .cast_ray_and_get_normal(&collider.iso(), &ray, max_distance, true)
            else {
                continue;
            };
            let point = origin + direction * hit.time_of_impact;
            if !Self::push_cast(hits, collider, point, hit.normal, hit.time_of_impact) {
                break;
            }
        }
    }

    fn sphere_cast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        radius: f32,
        mask: u32,
        triggers: TriggerInteraction,
        hits: &mut HitBuffer<CastHit>,
    ) {
        if radius <= 0.0 {
            return self.raycast(origin, direction, max_distance, mask, triggers, hits);
        }
        let direction = normalize_or_zero(direction);
        if direction == Vec3::zeros() || max_distance <= 0.0 {
            return;
        }
        let ball = Ball::new(radius);
        let ball_iso = iso_at(origin);
        let options = ShapeCastOptions::with_max_time_of_impact(max_distance);

        for collider in self.colliders.iter().filter(|c| c.passes(mask, triggers)) {
            let iso = collider.iso();
            let hit = match query::cast_shapes(
                &ball_iso,
                &direction,
                &ball,
                &iso,
                &Vec3::zeros(),
                &*collider.shape,
                options,
            ) {
                Ok(Some(hit)) => hit,
                Ok(None) => continue,
                Err(err) => {
                    log::warn!("shape cast unsupported for {:?}: {:?}", collider.id, err);
                    continue;
                }
            };
            let point = (iso * hit.witness2).coords;
            let normal = iso.rotation * hit.normal2.into_inner();
            if !Self::push_cast(hits, collider, point, normal, hit.time_of_impact) {
                break;
            }
        }
    }

    fn compute_penetration(
        &self,
        shape: &CapsuleShape,
        position: Vec3,
        collider: ColliderId,
        transform: &Transform,
    ) -> Option<Penetration> {
        let target = self.find(collider)?;
        let (iso, segment) = agent_segment(position, shape);
        let radius = shape.radius;

        // core segment against the collider, the capsule radius as prediction
        let contact = query::contact(&transform.iso(), &*target.shape, &iso, &segment, radius)
            .unwrap_or_else(|err| {
                log::warn!("contact unsupported for {:?}: {:?}", collider, err);
                None
            })?;
        let depth = radius - contact.dist;
        if depth <= 0.0 {
            return None;
        }

        Some(Penetration {
            direction: contact.normal1.into_inner(),
            distance: depth,
        })
    }
}

impl ObjectLookup for CollisionWorld {
    fn object_of(&self, collider: ColliderId) -> Option<SceneObject> {
        let collider = self.find(collider)?;
        Some(SceneObject {
            id: collider.def.object?,
            collider: Some(collider.id),
            processor: collider.def.processor.clone(),
        })
    }

    fn find_object(&self, id: ObjectId) -> Option<SceneObject> {
        self.colliders
            .iter()
            .find(|c| c.def.object == Some(id))
            .map(|c| SceneObject {
                id,
                collider: Some(c.id),
                processor: c.def.processor.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Quat, UP};

    fn ground() -> CollisionWorld {
        let mut world = CollisionWorld::new();
        world.add(ColliderDef::plane(Transform::default()));
        world
    }

    fn overlap(world: &CollisionWorld, position: Vec3, extent: f32, mask: u32) -> Vec<ColliderId> {
        let mut hits = HitBuffer::default();
        world.overlap_capsule(
            position,
            0.5,
            2.0,
            extent,
            mask,
            TriggerInteraction::Collide,
            &mut hits,
        );
        hits.iter().map(|h| h.collider).collect()
    }

    #[test]
    fn overlap_reaches_ground_within_extent_only() {
        let world = ground();
        assert_eq!(
            overlap(&world, Vec3::new(0.0, 0.05, 0.0), 0.1, u32::MAX).len(),
            1
        );
        assert!(overlap(&world, Vec3::new(0.0, 0.2, 0.0), 0.1, u32::MAX).is_empty());
    }

    #[test]
    fn overlap_filters_layers_and_triggers() {
        let mut world = CollisionWorld::new();
        let wall = world.add(
            ColliderDef::cuboid(
                Vec3::new(1.0, 1.0, 1.0),
                Transform::from_translation(Vec3::new(1.2, 1.0, 0.0)),
            )
            .with_layer(3),
        );
        let zone = world.add(
            ColliderDef::sphere(1.0, Transform::from_translation(Vec3::new(0.0, 1.0, 0.0)))
                .trigger(),
        );

        assert_eq!(overlap(&world, Vec3::zeros(), 0.0, 1 << 3), vec![wall]);
        assert_eq!(overlap(&world, Vec3::zeros(), 0.0, u32::MAX), vec![wall, zone]);

        let mut hits = HitBuffer::default();
        world.overlap_capsule(
            Vec3::zeros(),
            0.5,
            2.0,
            0.0,
            u32::MAX,
            TriggerInteraction::Ignore,
            &mut hits,
        );
        assert_eq!(
            hits.iter().map(|h| h.collider).collect::<Vec<_>>(),
            vec![wall]
        );
    }

    #[test]
    fn overlap_stops_at_buffer_capacity() {
        let mut world = CollisionWorld::new();
        for _ in 0..4 {
            world.add(ColliderDef::plane(Transform::default()));
        }
        let mut hits = HitBuffer::with_capacity(2);
        world.overlap_capsule(
            Vec3::zeros(),
            0.5,
            2.0,
            0.1,
            u32::MAX,
            TriggerInteraction::Collide,
            &mut hits,
        );
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn raycast_hits_tilted_plane() {
        let mut world = CollisionWorld::new();
        let rotation = Quat::from_axis_angle(&Vec3::z_axis(), 30f32.to_radians());
        world.add(ColliderDef::plane(Transform::new(Vec3::zeros(), rotation)));

        let mut hits = HitBuffer::default();
        world.raycast(
            Vec3::new(0.0, 5.0, 0.0),
            -UP,
            10.0,
            u32::MAX,
            TriggerInteraction::Ignore,
            &mut hits,
        );
        let hit = hits.as_slice()[0];
        assert!((hit.distance - 5.0).abs() < 1.0e-4);
        assert!((hit.normal - rotation * UP).norm() < 1.0e-4);
    }

    #[test]
    fn sphere_cast_reports_surface_point_and_normal() {
        let mut world = CollisionWorld::new();
        world.add(ColliderDef::cuboid(
            Vec3::new(2.0, 0.5, 2.0),
            Transform::from_translation(Vec3::new(0.0, -0.5, 0.0)),
        ));

        let mut hits = HitBuffer::default();
        world.sphere_cast(
            Vec3::new(0.0, 2.0, 0.0),
            -UP,
            5.0,
            0.5,
            u32::MAX,
            TriggerInteraction::Ignore,
            &mut hits,
        );
        let hit = hits.as_slice()[0];
        assert!((hit.distance - 1.5).abs() < 1.0e-3);
        assert!(hit.point.y.abs() < 1.0e-3);
        assert!((hit.normal - UP).norm() < 1.0e-3);
    }

    #[test]
    fn sphere_cast_misses_beyond_range() {
        let world = ground();
        let mut hits = HitBuffer::default();
        world.sphere_cast(
            Vec3::new(0.0, 3.0, 0.0),
            -UP,
            1.0,
            0.5,
            u32::MAX,
            TriggerInteraction::Ignore,
            &mut hits,
        );
        assert!(hits.is_empty());
    }

    #[test]
    fn penetration_pushes_out_of_ground() {
        let world = ground();
        let shape = CapsuleShape {
            radius: 0.5,
            height: 2.0,
        };
        let at = |y: f32| {
            world.compute_penetration(
                &shape,
                Vec3::new(0.0, y, 0.0),
                ColliderId(0),
                &Transform::default(),
            )
        };
        for depth in [0.01, 0.1, 0.3] {
            let sunk = at(-depth).unwrap();
            assert!((sunk.direction - UP).norm() < 1.0e-4);
            assert!((sunk.distance - depth).abs() < 1.0e-4);
        }

        assert!(at(0.1).is_none());
    }

    #[test]
    fn penetration_reports_depth_into_wide_floor() {
        let mut world = CollisionWorld::new();
        let floor = Transform::from_translation(Vec3::new(0.0, -1.0, 0.0));
        let id = world.add(ColliderDef::cuboid(Vec3::new(10.0, 1.0, 10.0), floor));
        let shape = CapsuleShape {
            radius: 0.5,
            height: 2.0,
        };

        let sunk = world
            .compute_penetration(&shape, Vec3::new(0.0, -0.1, 0.0), id, &floor)
            .unwrap();
        assert!((sunk.direction - UP).norm() < 1.0e-4);
        assert!((sunk.distance - 0.1).abs() < 1.0e-4);

        assert!(
            world
                .compute_penetration(&shape, Vec3::new(0.0, 0.05, 0.0), id, &floor)
                .is_none()
        );
    }

    #[test]
    fn object_identity_comes_from_the_collider() {
        let mut world = ground();
        let owned =
            world.add(ColliderDef::sphere(1.0, Transform::default()).with_object(ObjectId(7)));

        assert!(world.object_of(ColliderId(0)).is_none());
        let object = world.object_of(owned).unwrap();
        assert_eq!(object.id, ObjectId(7));
        assert_eq!(
            world.find_object(ObjectId(7)).and_then(|o| o.collider),
            Some(owned)
        );
        assert!(world.find_object(ObjectId(8)).is_none());
    }

    #[test]
    fn removed_colliders_stop_reporting() {
        let mut world = ground();
        assert!(world.remove(ColliderId(0)).is_some());
        assert!(world.is_empty());
        assert!(overlap(&world, Vec3::zeros(), 0.1, u32::MAX).is_empty());
    }
}
