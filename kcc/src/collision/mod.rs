/*!
Collision root module.

Everything the movement driver does against the scene in one substep goes
through a [`CollisionSolver`]. It borrows the geometry port, owns nothing
persistent and writes query results into the agent's [`QueryCache`].

- resolver:      combines penetration corrections from several colliders
- depenetration: per-collider penetration, contact classification, grounding
- ground:        step-up, snap-to-ground and ground tangent
*/

pub mod depenetration;
pub mod ground;
pub mod resolver;

pub use resolver::{Correction, CorrectionResolver};

use crate::{
    error::ProcessorError,
    math::Vec3,
    query::{
        CapsuleShape, CastHit, ColliderId, GeometryQuery, HitBuffer, OverlapCandidate, OverlapHit,
        OverlapInfo, Penetration, RaycastInfo, TriggerInteraction,
    },
    settings::{FeatureMask, Settings},
    state::AgentState,
};

/// Host filter deciding whether a collider takes part in collision resolution.
pub type ResolveCollisionFn = dyn Fn(&AgentState, ColliderId) -> Result<bool, ProcessorError>;

/// Counters of geometry queries issued by one agent.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryStatistics {
    pub overlap_queries: u32,
    pub shapecast_queries: u32,
}

impl QueryStatistics {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Which overlap buffer a query writes into.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OverlapSlot {
    /// Capsule inflated by the radius; drives depenetration.
    Extended,
    /// Capsule inflated by the skin extent; drives collision enter/exit.
    Track,
    /// Scratch space for step-up and snap probes.
    Shared,
}

/// Fixed-capacity buffers reused by every substep.
#[derive(Clone, Debug, Default)]
pub struct QueryCache {
    pub extended: OverlapInfo,
    pub track: OverlapInfo,
    pub shared: OverlapInfo,
    pub raycast: RaycastInfo,
    pub resolver: CorrectionResolver,
    candidates: HitBuffer<OverlapCandidate>,
    casts: HitBuffer<CastHit>,
}

impl QueryCache {
    pub fn overlap(&self, slot: OverlapSlot) -> &OverlapInfo {
        match slot {
            OverlapSlot::Extended => &self.extended,
            OverlapSlot::Track => &self.track,
            OverlapSlot::Shared => &self.shared,
        }
    }

    pub fn overlap_mut(&mut self, slot: OverlapSlot) -> &mut OverlapInfo {
        match slot {
            OverlapSlot::Extended => &mut self.extended,
            OverlapSlot::Track => &mut self.track,
            OverlapSlot::Shared => &mut self.shared,
        }
    }

    /// Overlap buffer and resolver, borrowed together.
    pub fn split(&mut self, slot: OverlapSlot) -> (&mut OverlapInfo, &mut CorrectionResolver) {
        let overlap = match slot {
            OverlapSlot::Extended => &mut self.extended,
            OverlapSlot::Track => &mut self.track,
            OverlapSlot::Shared => &mut self.shared,
        };
        (overlap, &mut self.resolver)
    }

    pub fn clear(&mut self) {
        self.extended.clear();
        self.track.clear();
        self.shared.clear();
        self.raycast.clear();
        self.resolver.reset();
    }
}

/// One substep's view of the scene.
pub struct CollisionSolver<'a, G: GeometryQuery + ?Sized> {
    pub scene: &'a G,
    pub settings: &'a Settings,
    pub features: FeatureMask,
    pub own_collider: Option<ColliderId>,
    pub resolve_collision: Option<&'a ResolveCollisionFn>,
    pub statistics: &'a mut QueryStatistics,
    pub cache: &'a mut QueryCache,
}

impl<'a, G: GeometryQuery + ?Sized> CollisionSolver<'a, G> {
    #[inline]
    pub fn shape(&self) -> CapsuleShape {
        CapsuleShape {
            radius: self.settings.radius,
            height: self.settings.height,
        }
    }

    /// Own collider and ignores never participate. Host filter faults accept the collider.
    pub fn accepts(&self, data: &AgentState, collider: ColliderId) -> bool {
        if self.own_collider == Some(collider) || data.has_ignore(collider) {
            return false;
        }
        match self.resolve_collision {
            Some(resolve) => resolve(data, collider).unwrap_or_else(|err| {
                log::error!("resolve collision filter failed for {:?}: {}", collider, err);
                true
            }),
            None => true,
        }
    }

    /// Capsule overlap into `slot`. Returns `true` when anything was hit.
    #[allow(clippy::too_many_arguments)]
    pub fn overlap_capsule(
        &mut self,
        slot: OverlapSlot,
        data: &AgentState,
        position: Vec3,
        radius: f32,
        height: f32,
        extent: f32,
        mask: u32,
        triggers: TriggerInteraction,
    ) -> bool {
        let mut candidates =
            std::mem::replace(&mut self.cache.candidates, HitBuffer::with_capacity(0));
        candidates.clear();
        self.scene
            .overlap_capsule(position, radius, height, extent, mask, triggers, &mut candidates);

        let info = self.cache.overlap_mut(slot);
        info.clear();
        info.position = position;
        info.radius = radius;
        info.height = height;
        info.extent = extent;
        info.mask = mask;
        info.triggers = triggers;

        for candidate in candidates.iter() {
            if self.accepts(data, candidate.collider) {
                self.cache.overlap_mut(slot).push(candidate);
            }
        }
        self.cache.candidates = candidates;
        self.statistics.overlap_queries += 1;

        self.cache.overlap(slot).all_hit_count() > 0
    }

    #[allow(clippy::too_many_arguments)]
    pub fn sphere_cast(
        &mut self,
        data: &AgentState,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        radius: f32,
        mask: u32,
        triggers: TriggerInteraction,
    ) -> bool {
        let mut casts = std::mem::replace(&mut self.cache.casts, HitBuffer::with_capacity(0));
        casts.clear();
        self.scene.sphere_cast(
            origin,
            direction,
            max_distance,
            radius,
            mask,
            triggers,
            &mut casts,
        );
        self.collect_casts(&casts, data, origin, direction, max_distance, radius, mask, triggers);
        self.cache.casts = casts;
        self.statistics.shapecast_queries += 1;

        self.cache.raycast.hit_count() > 0
    }

    #[allow(clippy::too_many_arguments)]
    fn collect_casts(
        &mut self,
        casts: &HitBuffer<CastHit>,
        data: &AgentState,
        origin: Vec3,
        direction: Vec3,
        max_distance: f32,
        radius: f32,
        mask: u32,
        triggers: TriggerInteraction,
    ) {
        let info = &mut self.cache.raycast;
        info.clear();
        info.origin = origin;
        info.direction = direction;
        info.max_distance = max_distance;
        info.radius = radius;
        info.mask = mask;
        info.triggers = triggers;

        for hit in casts.iter() {
            if self.accepts(data, hit.collider) {
                self.cache.raycast.push(*hit);
            }
        }
    }

    /// Penetration of the agent capsule at `position` against one overlap hit.
    #[inline]
    pub fn penetration(&self, position: Vec3, hit: &OverlapHit) -> Option<Penetration> {
        self.scene
            .compute_penetration(&self.shape(), position, hit.collider, &hit.transform)
    }
}

/// Cosine thresholds derived from the agent's ground and wall angles.
#[derive(Copy, Clone, Debug, PartialEq)]
pub(crate) struct ContactThresholds {
    /// Minimum up-dot of a ground normal.
    pub min_ground_dot: f32,
    /// Maximum |up-dot| of a wall normal.
    pub max_wall_dot: f32,
}

impl ContactThresholds {
    pub fn new(data: &AgentState) -> Self {
        Self {
            min_ground_dot: data.max_ground_angle.clamp(0.0, 90.0).to_radians().cos(),
            max_wall_dot: (90.0 - data.max_wall_angle).clamp(0.0, 90.0).to_radians().cos(),
        }
    }
}
