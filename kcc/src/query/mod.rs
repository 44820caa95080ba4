/*!
Geometry query port.

The controller never does broad-phase work itself. It consumes four synchronous
primitives from the host scene:

- `overlap_capsule`: colliders touching a capsule inflated by `extent`
- `raycast` / `sphere_cast`: hits along a direction
- `compute_penetration`: direction + distance that separates the agent
  capsule from one collider

Results are written into caller-owned [`HitBuffer`]s with fixed capacity.

Object identity (which network object owns a collider, and which interaction
processor it provides) comes from the [`ObjectLookup`] half of the port.
*/

pub mod cache;

pub use cache::{HitBuffer, OverlapHit, OverlapInfo, RaycastHit, RaycastInfo};

use crate::{
    math::{Iso, Quat, Vec3},
    pipeline::ProcessorRef,
};

/// Identifies a collider in the host scene.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColliderId(pub u32);

/// Identifies a replicated object. Stable across peers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u32);

/// Whether trigger colliders are reported by a query.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TriggerInteraction {
    Ignore,
    Collide,
}

/// A rigid transform (isometry) in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
}

impl Transform {
    #[inline]
    pub fn new(translation: Vec3, rotation: Quat) -> Self {
        Self {
            translation,
            rotation,
        }
    }

    #[inline]
    pub fn from_translation(translation: Vec3) -> Self {
        Self::new(translation, Quat::identity())
    }

    /// Convert to nalgebra `Isometry3` for use with parry narrow-phase queries.
    #[inline]
    pub fn iso(&self) -> Iso {
        Iso::from_parts(self.translation.into(), self.rotation)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::from_translation(Vec3::zeros())
    }
}

/// The agent's capsule. `position` arguments are the capsule bottom.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CapsuleShape {
    pub radius: f32,
    pub height: f32,
}

impl CapsuleShape {
    /// Half-length of the inner segment.
    #[inline]
    pub fn half_segment(&self) -> f32 {
        (self.height * 0.5 - self.radius).max(0.0)
    }

    /// Capsule center for a bottom position.
    #[inline]
    pub fn center(&self, position: Vec3) -> Vec3 {
        position + Vec3::new(0.0, self.height * 0.5, 0.0)
    }
}

/// A collider reported by an overlap query.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlapCandidate {
    pub collider: ColliderId,
    pub transform: Transform,
    pub is_trigger: bool,
}

/// A hit reported by a ray or sphere cast.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CastHit {
    pub collider: ColliderId,
    pub transform: Transform,
    pub is_trigger: bool,
    pub point: Vec3,
    pub normal: Vec3,
    pub distance: f32,
}

/// Separation of the agent capsule from one collider.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Penetration {
    /// Unit direction the agent must move to separate.
    pub direction: Vec3,
    /// Distance along `direction`.
    pub distance: f32,
}

/// Scene geometry queries consumed by the controller.
pub trait GeometryQuery {
    /// Colliders overlapping a capsule whose bottom is at `position`, with
    /// `radius + extent` used as the query radius.
    #[allow(clippy::too_many_arguments)]
    fn overlap_capsule(
        &self,
        position: Vec3,
        radius: f32,
        height: f32,
        extent: f32,
        mask: u32,
        triggers: TriggerInteraction,
        hits: &mut HitBuffer<OverlapCandidate>,
    );

    fn raycast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        mask: u32,
        triggers: TriggerInteraction,
        hits: &mut HitBuffer<CastHit>,
    );

    #[allow(clippy::too_many_arguments)]
    fn sphere_cast(
        &self,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        radius: f32,
        mask: u32,
        triggers: TriggerInteraction,
        hits: &mut HitBuffer<CastHit>,
    );

    /// Returns `None` when the agent capsule at `position` does not overlap the collider.
    fn compute_penetration(
        &self,
        shape: &CapsuleShape,
        position: Vec3,
        collider: ColliderId,
        transform: &Transform,
    ) -> Option<Penetration>;
}

/// A replicated object as seen by the controller.
#[derive(Clone, Debug)]
pub struct SceneObject {
    pub id: ObjectId,
    /// The object's single collider, when it has one.
    pub collider: Option<ColliderId>,
    /// Interaction processor provided by the object.
    pub processor: Option<ProcessorRef>,
}

/// Resolves colliders and object ids to replicated objects.
pub trait ObjectLookup {
    fn object_of(&self, _collider: ColliderId) -> Option<SceneObject> {
        None
    }

    fn find_object(&self, _id: ObjectId) -> Option<SceneObject> {
        None
    }
}

/// The full port: geometry plus object identity.
pub trait Scene: GeometryQuery + ObjectLookup {}

impl<T: GeometryQuery + ObjectLookup + ?Sized> Scene for T {}
