/*!
Agent settings.

`Settings` is immutable while a tick runs. It may change between ticks and is
part of the replicated payload (see `network::properties`).

Notes
- Invalid shape parameters are clamped by [`Settings::sanitize`], never rejected.
- `processors` is the agent-local configured processor list, the first of the
  four sources the pipeline gathers from each tick.
*/

use crate::{
    bitmask_flags::BitmaskFlags, constants::MIN_RADIUS, define_bitmask_flags,
    pipeline::ProcessorRef,
};

/// Collider shape of the agent.
///
/// The numeric values are part of the replicated settings word. Do not reorder.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ShapeKind {
    /// Skips nearly everything, including processors. Active collisions are cleared.
    None = 0,
    /// Full processing with a capsule collider.
    #[default]
    Capsule = 1,
    /// Processors run, the physics query is skipped. For logic-only agents.
    Void = 2,
}

impl ShapeKind {
    pub fn try_from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::None),
            1 => Some(Self::Capsule),
            2 => Some(Self::Void),
            _ => None,
        }
    }
}

/// How the render-facing state is produced for agents with authority.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum RenderBehavior {
    /// Run a render-time move from the last fixed state.
    #[default]
    Predict = 0,
    /// Lerp between the two most recent fixed states.
    Interpolate = 1,
}

impl RenderBehavior {
    pub fn try_from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::Predict),
            1 => Some(Self::Interpolate),
            _ => None,
        }
    }
}

define_bitmask_flags!(
    /// Optional controller features. Bit indices are replicated.
    Feature, u8, {
        StepUp,
        SnapToGround,
        PredictionCorrection,
    }
);

pub type FeatureMask = BitmaskFlags<u8>;

/// All features enabled.
pub fn all_features() -> FeatureMask {
    FeatureMask::from_tags(Feature::ALL)
}

/// Per-agent controller configuration.
#[derive(Clone, Debug)]
pub struct Settings {
    pub shape: ShapeKind,
    /// Capsule radius (meters).
    pub radius: f32,
    /// Capsule total height including both caps (meters).
    pub height: f32,
    /// Skin width used for grounding probes and contact tracking (meters).
    pub extent: f32,
    /// Layer index of the agent collider (0..=31).
    pub collider_layer: u8,
    /// Layers the agent collides with.
    pub collision_mask: u32,
    pub is_trigger: bool,
    pub render_behavior: RenderBehavior,
    pub features: FeatureMask,
    /// Maximum ledge height climbed by step-up (meters).
    pub step_height: f32,
    /// Multiplier on the blocked horizontal distance converted into step height.
    pub step_speed: f32,
    /// Maximum downward distance searched by snap-to-ground (meters).
    pub snap_distance: f32,
    /// Maximum snap speed (m/s).
    pub snap_speed: f32,
    pub mass: f32,
    /// Agent-local processors, gathered first every tick.
    pub processors: Vec<ProcessorRef>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            shape: ShapeKind::Capsule,
            radius: 0.35,
            height: 1.8,
            extent: 0.035,
            collider_layer: 0,
            collision_mask: u32::MAX,
            is_trigger: false,
            render_behavior: RenderBehavior::Predict,
            features: all_features(),
            step_height: 0.5,
            step_speed: 1.0,
            snap_distance: 0.25,
            snap_speed: 4.0,
            mass: 1.0,
            processors: Vec::new(),
        }
    }
}

impl Settings {
    /// Clamp configuration into a usable range.
    pub fn sanitize(&mut self) {
        self.radius = sanitize_positive(self.radius, MIN_RADIUS).max(MIN_RADIUS);
        self.height = sanitize_positive(self.height, 2.0 * self.radius).max(2.0 * self.radius);
        self.extent = sanitize_positive(self.extent, 0.0);
        self.collider_layer = self.collider_layer.min(31);
        self.step_height = sanitize_positive(self.step_height, 0.0);
        self.step_speed = sanitize_positive(self.step_speed, 0.0);
        self.snap_distance = sanitize_positive(self.snap_distance, 0.0);
        self.snap_speed = sanitize_positive(self.snap_speed, 0.0);
        self.mass = sanitize_positive(self.mass, 0.0);
    }

    /// Returns a sanitized copy.
    pub fn sanitized(mut self) -> Self {
        self.sanitize();
        self
    }

    /// Layer mask bit of the agent collider.
    #[inline]
    pub fn layer_bit(&self) -> u32 {
        1u32 << self.collider_layer.min(31)
    }

    /// True when the agent runs the physical query (capsule shape with a non-empty mask).
    #[inline]
    pub fn has_physics_query(&self) -> bool {
        self.shape == ShapeKind::Capsule && self.collision_mask != 0
    }
}

#[inline]
fn sanitize_positive(value: f32, fallback: f32) -> f32 {
    if value.is_finite() { value.max(0.0) } else { fallback }
}
