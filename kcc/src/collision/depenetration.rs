//! Depenetration of the agent capsule from the colliders of one overlap query.
//!
//! Every penetrating collider is classified by the up-dot of its separation
//! direction: ground at or above the ground threshold, wall inside the wall
//! band, slope in between. Grounding found here is written to the agent state.

use crate::{
    collision::{CollisionSolver, ContactThresholds, CorrectionResolver, OverlapSlot},
    constants::{DIST_EPS, RESOLVER_MAX_ERROR, RESOLVER_MAX_ITERATIONS},
    math::{UP, Vec3, angle_deg, only_xz, project_vertical_penetration},
    query::{CapsuleShape, GeometryQuery, OverlapHit, OverlapInfo, Penetration},
    state::AgentState,
};

/// Result of a downward ground probe against one collider.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GroundCheck {
    pub is_ground: bool,
    pub is_within_extent: bool,
    pub normal: Vec3,
    pub distance: f32,
}

impl GroundCheck {
    const NONE: Self = Self {
        is_ground: false,
        is_within_extent: false,
        normal: UP,
        distance: 0.0,
    };
}

/// Geometry needed to test the agent capsule against single colliders.
struct Contacts<'s, G: GeometryQuery + ?Sized> {
    scene: &'s G,
    shape: CapsuleShape,
    extent: f32,
    thresholds: ContactThresholds,
}

impl<G: GeometryQuery + ?Sized> Contacts<'_, G> {
    #[inline]
    fn penetration(&self, position: Vec3, hit: &OverlapHit) -> Option<Penetration> {
        self.scene
            .compute_penetration(&self.shape, position, hit.collider, &hit.transform)
    }

    /// Lowers the capsule by the skin extent and checks whether the collider
    /// then supports it as ground.
    fn check_ground(&self, position: Vec3, hit: &OverlapHit) -> GroundCheck {
        let probe = position - Vec3::new(0.0, self.extent, 0.0);
        let Some(penetration) = self.penetration(probe, hit) else {
            return GroundCheck::NONE;
        };

        let up_dot = penetration.direction.y;
        if up_dot < self.thresholds.min_ground_dot || up_dot <= 0.0 {
            return GroundCheck {
                is_within_extent: true,
                ..GroundCheck::NONE
            };
        }

        GroundCheck {
            is_ground: true,
            is_within_extent: true,
            normal: penetration.direction,
            distance: (self.extent - penetration.distance / up_dot).max(0.0),
        }
    }

    /// Flags wall/slope on non-ground contacts. Returns `true` for ground.
    fn classify(&self, hit: &mut OverlapHit, up_dot: f32) -> bool {
        if up_dot >= self.thresholds.min_ground_dot {
            hit.is_ground = true;
            return true;
        }
        let max_wall_dot = self.thresholds.max_wall_dot;
        if up_dot >= -max_wall_dot {
            if up_dot <= max_wall_dot {
                hit.is_wall = true;
            } else {
                hit.is_slope = true;
            }
        }
        false
    }
}

/// Ground normals collected while resolving several colliders.
#[derive(Copy, Clone, Debug, Default)]
struct GroundContacts {
    count: u32,
    max_dot: f32,
    max_normal: Vec3,
    average: Vec3,
}

impl GroundContacts {
    fn add(&mut self, direction: Vec3, up_dot: f32) {
        self.count += 1;
        if up_dot >= self.max_dot {
            self.max_dot = up_dot;
            self.max_normal = direction;
        }
        self.average += direction * up_dot;
    }

    fn normal(&self) -> Vec3 {
        if self.count <= 1 {
            self.max_normal
        } else {
            self.average.normalize()
        }
    }
}

/// Walking down a slope into a wall-ish contact would push the agent up; turn
/// such corrections horizontal instead.
#[inline]
fn project_sliding(
    data: &AgentState,
    delta_xz: Vec3,
    direction: Vec3,
    distance: f32,
) -> (Vec3, f32) {
    let up_dot = direction.y;
    if up_dot > 0.0
        && distance >= DIST_EPS
        && data.dynamic_velocity.y <= 0.0
        && delta_xz.dot(&only_xz(direction)) < 0.0
    {
        project_vertical_penetration(direction, distance)
    } else {
        (direction, distance)
    }
}

fn write_ground(data: &mut AgentState, target: Vec3, radius: f32, normal: Vec3, distance: f32) {
    data.ground_normal = normal;
    data.ground_angle = angle_deg(normal, UP);
    data.ground_position = target + Vec3::new(0.0, radius, 0.0) - normal * (radius + distance);
    data.ground_distance = distance;
}

impl<'a, G: GeometryQuery + ?Sized> CollisionSolver<'a, G> {
    fn contacts(&self, data: &AgentState) -> Contacts<'a, G> {
        Contacts {
            scene: self.scene,
            shape: self.shape(),
            extent: self.settings.extent,
            thresholds: ContactThresholds::new(data),
        }
    }

    /// Moves `target` out of every collider in `slot`.
    ///
    /// `probe_grounding` adds a skin-extent ground probe when no penetrating
    /// contact grounded the agent. `max_sub_steps` bounds the refinement passes
    /// used with several colliders.
    #[allow(clippy::too_many_arguments)]
    pub fn depenetrate(
        &mut self,
        slot: OverlapSlot,
        data: &mut AgentState,
        base: Vec3,
        target: Vec3,
        probe_grounding: bool,
        max_sub_steps: u32,
    ) -> Vec3 {
        let contacts = self.contacts(data);
        let (overlap, resolver) = self.cache.split(slot);

        match overlap.collider_hit_count() {
            0 => target,
            1 => depenetrate_single(&contacts, overlap, data, base, target, probe_grounding),
            _ => depenetrate_multiple(
                &contacts,
                overlap,
                resolver,
                data,
                base,
                target,
                probe_grounding,
                max_sub_steps,
            ),
        }
    }

    /// Triggers are flagged, never resolved.
    pub fn check_triggers_penetration(&mut self, slot: OverlapSlot, data: &AgentState) {
        let contacts = self.contacts(data);
        let overlap = self.cache.overlap_mut(slot);
        for hit in overlap.trigger_hits_mut() {
            let penetration = contacts.penetration(data.target_position, hit);
            hit.has_penetration = penetration.is_some();
            hit.is_within_extent = hit.has_penetration;
            if let Some(penetration) = penetration {
                hit.direction = penetration.direction;
                hit.distance = penetration.distance;
            }
        }
    }
}

fn depenetrate_single<G: GeometryQuery + ?Sized>(
    contacts: &Contacts<'_, G>,
    overlap: &mut OverlapInfo,
    data: &mut AgentState,
    base: Vec3,
    mut target: Vec3,
    probe_grounding: bool,
) -> Vec3 {
    let mut ground_normal = UP;
    let mut ground_distance = 0.0;

    let Some(hit) = overlap.collider_hits_mut().next() else {
        return target;
    };

    let penetration = contacts.penetration(target, hit);
    hit.has_penetration = penetration.is_some();
    if let Some(Penetration {
        mut direction,
        mut distance,
    }) = penetration
    {
        hit.is_within_extent = true;
        hit.direction = direction;
        hit.distance = distance;

        let up_dot = direction.y;
        if contacts.classify(hit, up_dot) {
            data.is_grounded = true;
            ground_normal = direction;
        } else {
            (direction, distance) = project_sliding(data, only_xz(target - base), direction, distance);
        }

        target += direction * distance;
    }

    if probe_grounding && !data.is_grounded {
        let check = contacts.check_ground(target, hit);
        if check.is_ground {
            ground_normal = check.normal;
            ground_distance = check.distance;
            data.is_grounded = true;
        }
        if !hit.has_penetration {
            hit.is_ground |= check.is_ground;
            hit.is_within_extent |= check.is_within_extent;
        }
    }

    if data.is_grounded {
        write_ground(data, target, contacts.shape.radius, ground_normal, ground_distance);
    }

    target
}

#[allow(clippy::too_many_arguments)]
fn depenetrate_multiple<G: GeometryQuery + ?Sized>(
    contacts: &Contacts<'_, G>,
    overlap: &mut OverlapInfo,
    resolver: &mut CorrectionResolver,
    data: &mut AgentState,
    base: Vec3,
    mut target: Vec3,
    probe_grounding: bool,
    max_sub_steps: u32,
) -> Vec3 {
    let delta_xz = only_xz(target - base);
    let mut ground = GroundContacts::default();
    let mut ground_distance = 0.0;

    resolver.reset();

    for hit in overlap.collider_hits_mut() {
        let penetration = contacts.penetration(target, hit);
        hit.has_penetration = penetration.is_some();
        let Some(Penetration {
            mut direction,
            mut distance,
        }) = penetration
        else {
            continue;
        };

        hit.is_within_extent = true;
        hit.direction = direction;
        hit.distance = distance;

        let up_dot = direction.y;
        if contacts.classify(hit, up_dot) {
            data.is_grounded = true;
            ground.add(direction, up_dot);
        } else {
            (direction, distance) = project_sliding(data, delta_xz, direction, distance);
        }

        resolver.add_correction(direction, distance);
    }

    let mut remaining = max_sub_steps;
    let multiplier = 1.0 - remaining.min(2) as f32 * 0.25;

    let correction = if resolver.size() == 2 {
        if resolver.dot() >= 0.0 {
            resolver.min_max()
        } else {
            resolver.binary()
        }
    } else {
        resolver.gradient_descent(RESOLVER_MAX_ITERATIONS, RESOLVER_MAX_ERROR)
    };
    target += correction * multiplier;

    while remaining > 0 {
        remaining -= 1;
        resolver.reset();

        for hit in overlap.collider_hits_mut() {
            let Some(Penetration {
                mut direction,
                mut distance,
            }) = contacts.penetration(target, hit)
            else {
                continue;
            };

            let up_dot = direction.y;

            // newly exposed by the previous correction
            if !hit.has_penetration && contacts.classify(hit, up_dot) {
                data.is_grounded = true;
                ground.add(direction, up_dot);
            }

            hit.has_penetration = true;
            hit.is_within_extent = true;
            hit.direction = direction;
            hit.distance = distance;

            if up_dot < contacts.thresholds.min_ground_dot {
                (direction, distance) = project_sliding(data, delta_xz, direction, distance);
            }

            resolver.add_correction(direction, distance);
        }

        if resolver.size() == 0 {
            break;
        }

        let correction = match remaining {
            0 if resolver.size() == 2 && resolver.dot() < 0.0 => resolver.binary(),
            0 => resolver.gradient_descent(RESOLVER_MAX_ITERATIONS, RESOLVER_MAX_ERROR),
            1 => resolver.min_max() * 0.75,
            _ => resolver.min_max() * 0.5,
        };
        target += correction;
    }

    if probe_grounding && !data.is_grounded {
        let mut closest_normal = UP;
        let mut closest_distance = 1000.0f32;

        for hit in overlap.collider_hits_mut() {
            let check = contacts.check_ground(target, hit);
            if check.is_ground {
                data.is_grounded = true;
                if check.distance < closest_distance {
                    closest_normal = check.normal;
                    closest_distance = check.distance;
                }
            }
            hit.is_ground |= check.is_ground;
            hit.is_within_extent |= check.is_within_extent;
        }

        if data.is_grounded {
            ground = GroundContacts {
                count: 1,
                max_dot: closest_normal.y,
                max_normal: closest_normal,
                average: closest_normal,
            };
            ground_distance = closest_distance;
        }
    }

    if data.is_grounded {
        write_ground(data, target, contacts.shape.radius, ground.normal(), ground_distance);
    }

    target
}
