//! Fixed-capacity query result caches.
//!
//! One overlap/raycast query fills one cache. Entries are recomputed by every
//! query and never persist across ticks. Pushing past capacity is a silent no-op.

use crate::{
    constants::CACHE_SIZE,
    math::Vec3,
    query::{CastHit, ColliderId, OverlapCandidate, Transform, TriggerInteraction},
};

/// A bounded hit buffer handed to the geometry port.
#[derive(Clone, Debug)]
pub struct HitBuffer<T> {
    items: Vec<T>,
    capacity: usize,
}

impl<T> HitBuffer<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Returns `false` (and drops `item`) when the buffer is full.
    #[inline]
    pub fn push(&mut self, item: T) -> bool {
        if self.items.len() >= self.capacity {
            return false;
        }
        self.items.push(item);
        true
    }

    #[inline]
    pub fn clear(&mut self) {
        self.items.clear();
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }
}

impl<T> Default for HitBuffer<T> {
    fn default() -> Self {
        Self::with_capacity(CACHE_SIZE)
    }
}

/// One collider found by an overlap query, with classification flags filled
/// in by depenetration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlapHit {
    pub collider: ColliderId,
    pub transform: Transform,
    pub is_trigger: bool,
    pub direction: Vec3,
    pub distance: f32,
    pub has_penetration: bool,
    pub is_within_extent: bool,
    pub is_ground: bool,
    pub is_wall: bool,
    pub is_slope: bool,
}

impl OverlapHit {
    pub fn new(candidate: &OverlapCandidate) -> Self {
        Self {
            collider: candidate.collider,
            transform: candidate.transform,
            is_trigger: candidate.is_trigger,
            direction: Vec3::zeros(),
            distance: 0.0,
            has_penetration: false,
            is_within_extent: false,
            is_ground: false,
            is_wall: false,
            is_slope: false,
        }
    }
}

/// Results of one capsule overlap query.
#[derive(Clone, Debug)]
pub struct OverlapInfo {
    pub position: Vec3,
    pub radius: f32,
    pub height: f32,
    pub extent: f32,
    pub mask: u32,
    pub triggers: TriggerInteraction,
    hits: Vec<OverlapHit>,
}

impl Default for OverlapInfo {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            radius: 0.0,
            height: 0.0,
            extent: 0.0,
            mask: 0,
            triggers: TriggerInteraction::Ignore,
            hits: Vec::with_capacity(CACHE_SIZE),
        }
    }
}

impl OverlapInfo {
    pub fn clear(&mut self) {
        self.hits.clear();
    }

    /// Returns `false` once the cache is full.
    pub fn push(&mut self, candidate: &OverlapCandidate) -> bool {
        if self.hits.len() >= CACHE_SIZE {
            return false;
        }
        self.hits.push(OverlapHit::new(candidate));
        true
    }

    #[inline]
    pub fn all_hits(&self) -> &[OverlapHit] {
        &self.hits
    }

    #[inline]
    pub fn all_hit_count(&self) -> usize {
        self.hits.len()
    }

    pub fn collider_hit_count(&self) -> usize {
        self.hits.iter().filter(|h| !h.is_trigger).count()
    }

    pub fn trigger_hit_count(&self) -> usize {
        self.hits.iter().filter(|h| h.is_trigger).count()
    }

    pub fn collider_hits(&self) -> impl Iterator<Item = &OverlapHit> {
        self.hits.iter().filter(|h| !h.is_trigger)
    }

    pub fn collider_hits_mut(&mut self) -> impl Iterator<Item = &mut OverlapHit> {
        self.hits.iter_mut().filter(|h| !h.is_trigger)
    }

    pub fn trigger_hits(&self) -> impl Iterator<Item = &OverlapHit> {
        self.hits.iter().filter(|h| h.is_trigger)
    }

    pub fn trigger_hits_mut(&mut self) -> impl Iterator<Item = &mut OverlapHit> {
        self.hits.iter_mut().filter(|h| h.is_trigger)
    }

    pub fn has_collider(&self, collider: ColliderId) -> bool {
        self.hits.iter().any(|h| h.collider == collider)
    }

    /// True when every hit (colliders and triggers) lies within the query extent.
    pub fn all_within_extent(&self) -> bool {
        self.hits.iter().all(|h| h.is_within_extent)
    }

    /// True when any collider hit within extent is a wall or slope.
    pub fn is_touching_slope_or_wall(&self) -> bool {
        self.collider_hits()
            .any(|h| h.is_within_extent && (h.is_slope || h.is_wall))
    }

    pub fn copy_from(&mut self, other: &OverlapInfo) {
        self.position = other.position;
        self.radius = other.radius;
        self.height = other.height;
        self.extent = other.extent;
        self.mask = other.mask;
        self.triggers = other.triggers;
        self.hits.clear();
        self.hits.extend_from_slice(&other.hits);
    }
}

pub type RaycastHit = CastHit;

/// Results of one ray or sphere cast.
#[derive(Clone, Debug)]
pub struct RaycastInfo {
    pub origin: Vec3,
    pub direction: Vec3,
    pub max_distance: f32,
    /// Zero for rays.
    pub radius: f32,
    pub mask: u32,
    pub triggers: TriggerInteraction,
    hits: Vec<RaycastHit>,
}

impl Default for RaycastInfo {
    fn default() -> Self {
        Self {
            origin: Vec3::zeros(),
            direction: Vec3::zeros(),
            max_distance: 0.0,
            radius: 0.0,
            mask: 0,
            triggers: TriggerInteraction::Ignore,
            hits: Vec::with_capacity(CACHE_SIZE),
        }
    }
}

impl RaycastInfo {
    pub fn clear(&mut self) {
        self.hits.clear();
    }

    pub fn push(&mut self, hit: RaycastHit) -> bool {
        if self.hits.len() >= CACHE_SIZE {
            return false;
        }
        self.hits.push(hit);
        true
    }

    #[inline]
    pub fn hits(&self) -> &[RaycastHit] {
        &self.hits
    }

    #[inline]
    pub fn hit_count(&self) -> usize {
        self.hits.len()
    }

    /// The hit with the highest contact point, if any.
    pub fn highest_point(&self) -> Option<Vec3> {
        self.hits
            .iter()
            .map(|h| h.point)
            .fold(None, |best: Option<Vec3>, p| match best {
                Some(b) if b.y >= p.y => Some(b),
                _ => Some(p),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: u32, is_trigger: bool) -> OverlapCandidate {
        OverlapCandidate {
            collider: ColliderId(id),
            transform: Transform::default(),
            is_trigger,
        }
    }

    #[test]
    fn hit_buffer_truncates_at_capacity() {
        let mut buffer = HitBuffer::with_capacity(2);
        assert!(buffer.push(1));
        assert!(buffer.push(2));
        assert!(!buffer.push(3));
        assert_eq!(buffer.as_slice(), &[1, 2]);
        assert!(buffer.is_full());
    }

    #[test]
    fn overlap_info_truncates_silently() {
        let mut info = OverlapInfo::default();
        for i in 0..(CACHE_SIZE as u32 + 10) {
            info.push(&candidate(i, false));
        }
        assert_eq!(info.all_hit_count(), CACHE_SIZE);
    }

    #[test]
    fn collider_and_trigger_views_split_hits() {
        let mut info = OverlapInfo::default();
        info.push(&candidate(1, false));
        info.push(&candidate(2, true));
        info.push(&candidate(3, false));

        assert_eq!(info.collider_hit_count(), 2);
        assert_eq!(info.trigger_hit_count(), 1);
        assert!(info.has_collider(ColliderId(2)));
        assert!(!info.all_within_extent());

        for hit in info.collider_hits_mut() {
            hit.is_within_extent = true;
        }
        assert!(!info.all_within_extent());
        for hit in info.trigger_hits_mut() {
            hit.is_within_extent = true;
        }
        assert!(info.all_within_extent());
    }

    #[test]
    fn touching_slope_or_wall_requires_extent() {
        let mut info = OverlapInfo::default();
        info.push(&candidate(1, false));
        for hit in info.collider_hits_mut() {
            hit.is_wall = true;
        }
        assert!(!info.is_touching_slope_or_wall());
        for hit in info.collider_hits_mut() {
            hit.is_within_extent = true;
        }
        assert!(info.is_touching_slope_or_wall());
    }

    #[test]
    fn highest_point_picks_max_y() {
        let mut info = RaycastInfo::default();
        for y in [0.1, 0.4, 0.2] {
            info.push(CastHit {
                collider: ColliderId(0),
                transform: Transform::default(),
                is_trigger: false,
                point: Vec3::new(0.0, y, 0.0),
                normal: Vec3::y(),
                distance: 0.0,
            });
        }
        assert_eq!(info.highest_point().map(|p| p.y), Some(0.4));
    }
}
