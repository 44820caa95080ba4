/*!
Agent root module.

[`Kcc`] owns one agent: its settings, the fixed (authoritative) and render
state, the history ring, the processor pipeline and the query buffers. The
host drives it once per fixed tick and once per display frame.

- movement: the per-tick move (velocity stages, CCD substeps, collisions)
- update:   fixed/render passes, prediction correction, network ticks

Notes
- Mutations are ignored without input or state authority.
- A mutation always lands in render data. It lands in fixed data too unless a
  render pass is running; render-only changes vanish with the next fixed tick.
*/

pub mod movement;
pub mod update;

pub use update::{FixedTick, RenderTick};

use crate::{
    collision::{QueryCache, QueryStatistics, ResolveCollisionFn},
    error::{KccError, ProcessorError},
    history::History,
    math::{Vec3, clamp_pitch, normalize_or_zero, wrap_yaw},
    network::{NetworkCodec, NetworkConfig},
    pipeline::{Processor, ProcessorPipeline, ProcessorRef, Stage, same_processor},
    query::{ColliderId, ObjectId},
    settings::{Feature, FeatureMask, RenderBehavior, Settings, ShapeKind},
    state::{AgentState, Collision, Ignore},
};

/// Host callback fired when a collision record is added or removed.
pub type CollisionHookFn = dyn Fn(&AgentState, &Collision);

/// Which peer roles this agent holds.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Authority {
    pub input: bool,
    pub state: bool,
}

impl Authority {
    /// Server or standalone.
    pub const FULL: Self = Self {
        input: true,
        state: true,
    };
    /// Predicting client.
    pub const INPUT: Self = Self {
        input: true,
        state: false,
    };
    /// Remote proxy.
    pub const NONE: Self = Self {
        input: false,
        state: false,
    };

    #[inline]
    pub fn has_any(&self) -> bool {
        self.input || self.state
    }
}

impl Default for Authority {
    fn default() -> Self {
        Self::FULL
    }
}

/// Which pass is currently running.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum UpdatePhase {
    /// Between passes. Host code here prepares the next fixed tick.
    #[default]
    Idle,
    Fixed,
    Render,
}

/// Optional host callbacks.
#[derive(Default)]
pub struct KccHooks {
    pub resolve_collision: Option<Box<ResolveCollisionFn>>,
    pub on_collision_enter: Option<Box<CollisionHookFn>>,
    pub on_collision_exit: Option<Box<CollisionHookFn>>,
}

impl std::fmt::Debug for KccHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KccHooks")
            .field("resolve_collision", &self.resolve_collision.is_some())
            .field("on_collision_enter", &self.on_collision_enter.is_some())
            .field("on_collision_exit", &self.on_collision_exit.is_some())
            .finish()
    }
}

/// One-shot contributions stored before a move and subtracted after it.
#[derive(Copy, Clone, Debug, Default)]
pub(crate) struct Transients {
    jump_impulse: Vec3,
    external_velocity: Vec3,
    external_acceleration: Vec3,
    external_impulse: Vec3,
    external_force: Vec3,
}

impl Transients {
    pub fn store(data: &AgentState) -> Self {
        Self {
            jump_impulse: data.jump_impulse,
            external_velocity: data.external_velocity,
            external_acceleration: data.external_acceleration,
            external_impulse: data.external_impulse,
            external_force: data.external_force,
        }
    }

    pub fn revert(&self, data: &mut AgentState) {
        data.jump_impulse -= self.jump_impulse;
        data.external_velocity -= self.external_velocity;
        data.external_acceleration -= self.external_acceleration;
        data.external_impulse -= self.external_impulse;
        data.external_force -= self.external_force;
    }
}

/// A kinematic character controller agent.
#[derive(Debug)]
pub struct Kcc {
    settings: Settings,
    fixed: AgentState,
    render: AgentState,
    history: History,
    pipeline: ProcessorPipeline,
    local_processors: Vec<ProcessorRef>,
    cache: QueryCache,
    statistics: QueryStatistics,
    codec: NetworkCodec,
    hooks: KccHooks,
    authority: Authority,
    collider: Option<ColliderId>,
    phase: UpdatePhase,
    is_initialized: bool,
    manual_update: bool,
    prediction_error: Vec3,
    last_render_position: Vec3,
    last_render_time: f32,
}

impl Kcc {
    pub fn new(settings: Settings) -> Self {
        Self::with_network_config(settings, NetworkConfig::default())
    }

    pub fn with_network_config(settings: Settings, config: NetworkConfig) -> Self {
        Self {
            settings: settings.sanitized(),
            fixed: AgentState::default(),
            render: AgentState::default(),
            history: History::default(),
            pipeline: ProcessorPipeline::default(),
            local_processors: Vec::new(),
            cache: QueryCache::default(),
            statistics: QueryStatistics::default(),
            codec: NetworkCodec::new(config),
            hooks: KccHooks::default(),
            authority: Authority::default(),
            collider: None,
            phase: UpdatePhase::Idle,
            is_initialized: false,
            manual_update: false,
            prediction_error: Vec3::zeros(),
            last_render_position: Vec3::zeros(),
            last_render_time: 0.0,
        }
    }

    // --- Accessors ---

    #[inline]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[inline]
    pub fn fixed_data(&self) -> &AgentState {
        &self.fixed
    }

    #[inline]
    pub fn render_data(&self) -> &AgentState {
        &self.render
    }

    /// Render data while a render pass runs, fixed data otherwise.
    #[inline]
    pub fn data(&self) -> &AgentState {
        match self.phase {
            UpdatePhase::Render => &self.render,
            _ => &self.fixed,
        }
    }

    #[inline]
    fn data_mut(&mut self) -> &mut AgentState {
        match self.phase {
            UpdatePhase::Render => &mut self.render,
            _ => &mut self.fixed,
        }
    }

    #[inline]
    pub fn history(&self) -> &History {
        &self.history
    }

    #[inline]
    pub fn pipeline(&self) -> &ProcessorPipeline {
        &self.pipeline
    }

    /// Queries issued by the last update.
    #[inline]
    pub fn statistics(&self) -> &QueryStatistics {
        &self.statistics
    }

    #[inline]
    pub fn query_cache(&self) -> &QueryCache {
        &self.cache
    }

    #[inline]
    pub fn codec(&self) -> &NetworkCodec {
        &self.codec
    }

    #[inline]
    pub fn network_word_count(&self) -> usize {
        self.codec.word_count()
    }

    #[inline]
    pub fn prediction_error(&self) -> Vec3 {
        self.prediction_error
    }

    #[inline]
    pub fn phase(&self) -> UpdatePhase {
        self.phase
    }

    #[inline]
    pub fn is_in_fixed_update(&self) -> bool {
        self.phase == UpdatePhase::Fixed
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.is_initialized
    }

    #[inline]
    pub fn authority(&self) -> Authority {
        self.authority
    }

    pub fn set_authority(&mut self, authority: Authority) {
        self.authority = authority;
    }

    /// The agent's own collider in the host scene, excluded from every query.
    #[inline]
    pub fn collider(&self) -> Option<ColliderId> {
        self.collider
    }

    pub fn set_collider(&mut self, collider: Option<ColliderId>) {
        self.collider = collider;
    }

    pub fn hooks_mut(&mut self) -> &mut KccHooks {
        &mut self.hooks
    }

    /// Host filter deciding whether a collider takes part in collision resolution.
    pub fn set_resolve_collision(
        &mut self,
        resolve: impl Fn(&AgentState, ColliderId) -> Result<bool, ProcessorError> + 'static,
    ) {
        self.hooks.resolve_collision = Some(Box::new(resolve));
    }

    pub fn on_collision_enter(&mut self, hook: impl Fn(&AgentState, &Collision) + 'static) {
        self.hooks.on_collision_enter = Some(Box::new(hook));
    }

    pub fn on_collision_exit(&mut self, hook: impl Fn(&AgentState, &Collision) + 'static) {
        self.hooks.on_collision_exit = Some(Box::new(hook));
    }

    // --- Mutation ---

    fn mutate(&mut self, apply: impl Fn(&mut AgentState)) {
        if !self.authority.has_any() {
            return;
        }
        apply(&mut self.render);
        if self.phase != UpdatePhase::Render {
            apply(&mut self.fixed);
        }
    }

    /// Directions longer than one are normalized.
    pub fn set_input_direction(&mut self, direction: Vec3) {
        let direction = if direction.norm_squared() > 1.0 {
            normalize_or_zero(direction)
        } else {
            direction
        };
        self.mutate(|data| data.input_direction = direction);
    }

    pub fn set_look_rotation(&mut self, pitch: f32, yaw: f32) {
        let (pitch, yaw) = (clamp_pitch(pitch), wrap_yaw(yaw));
        self.mutate(|data| {
            data.look_pitch = pitch;
            data.look_yaw = yaw;
        });
    }

    pub fn add_look_rotation(&mut self, pitch_delta: f32, yaw_delta: f32) {
        self.mutate(|data| {
            data.look_pitch = clamp_pitch(data.look_pitch + pitch_delta);
            data.look_yaw = wrap_yaw(data.look_yaw + yaw_delta);
        });
    }

    #[inline]
    pub fn look_direction(&self) -> Vec3 {
        self.data().look_direction()
    }

    #[inline]
    pub fn transform_direction(&self) -> Vec3 {
        self.data().transform_direction()
    }

    /// Adds a jump impulse for processors to consume during the next tick.
    pub fn jump(&mut self, impulse: Vec3) {
        self.mutate(|data| data.jump_impulse += impulse);
    }

    pub fn set_external_velocity(&mut self, velocity: Vec3) {
        self.mutate(|data| data.external_velocity = velocity);
    }

    pub fn add_external_velocity(&mut self, velocity: Vec3) {
        self.mutate(|data| data.external_velocity += velocity);
    }

    pub fn set_external_acceleration(&mut self, acceleration: Vec3) {
        self.mutate(|data| data.external_acceleration = acceleration);
    }

    pub fn add_external_acceleration(&mut self, acceleration: Vec3) {
        self.mutate(|data| data.external_acceleration += acceleration);
    }

    pub fn set_external_impulse(&mut self, impulse: Vec3) {
        self.mutate(|data| data.external_impulse = impulse);
    }

    pub fn add_external_impulse(&mut self, impulse: Vec3) {
        self.mutate(|data| data.external_impulse += impulse);
    }

    pub fn set_external_force(&mut self, force: Vec3) {
        self.mutate(|data| data.external_force = force);
    }

    pub fn add_external_force(&mut self, force: Vec3) {
        self.mutate(|data| data.external_force += force);
    }

    /// Teleports the agent.
    pub fn set_position(&mut self, position: Vec3) {
        self.mutate(|data| data.set_position(position));
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        self.data().target_position
    }

    // --- Settings ---

    pub(crate) fn refresh_collider(&mut self) {
        self.settings.sanitize();
    }

    /// Non-positive `radius`/`height` keep the current values.
    pub fn set_shape(&mut self, shape: ShapeKind, radius: f32, height: f32) {
        if !self.authority.has_any() {
            return;
        }
        self.settings.shape = shape;
        if radius > 0.0 {
            self.settings.radius = radius;
        }
        if height > 0.0 {
            self.settings.height = height;
        }
        self.refresh_collider();
    }

    pub fn set_radius(&mut self, radius: f32) {
        if radius <= 0.0 || !self.authority.has_any() {
            return;
        }
        self.settings.radius = radius;
        self.refresh_collider();
    }

    pub fn set_height(&mut self, height: f32) {
        if height <= 0.0 || !self.authority.has_any() {
            return;
        }
        self.settings.height = height;
        self.refresh_collider();
    }

    pub fn set_extent(&mut self, extent: f32) {
        if !self.authority.has_any() {
            return;
        }
        self.settings.extent = extent;
        self.refresh_collider();
    }

    pub fn set_trigger(&mut self, is_trigger: bool) {
        if !self.authority.has_any() {
            return;
        }
        self.settings.is_trigger = is_trigger;
        self.refresh_collider();
    }

    pub fn set_collision_layer(&mut self, layer: u8) {
        if !self.authority.has_any() {
            return;
        }
        self.settings.collider_layer = layer;
        self.refresh_collider();
    }

    pub fn set_collision_mask(&mut self, mask: u32) {
        if !self.authority.has_any() {
            return;
        }
        self.settings.collision_mask = mask;
    }

    pub fn set_render_behavior(&mut self, behavior: RenderBehavior) {
        if !self.authority.has_any() {
            return;
        }
        self.settings.render_behavior = behavior;
    }

    /// Features enabled from the next move on.
    pub fn set_features(&mut self, features: FeatureMask) {
        if !self.authority.has_any() {
            return;
        }
        self.settings.features = features;
    }

    /// Only valid while `SetInputProperties` runs.
    pub fn set_active_features(&mut self, features: FeatureMask) -> Result<(), KccError> {
        self.pipeline.set_active_features(features)
    }

    /// Only valid while `SetInputProperties` runs.
    pub fn suppress_feature(&mut self, feature: Feature) -> Result<(), KccError> {
        self.pipeline.suppress_feature(feature)
    }

    #[inline]
    pub fn has_active_feature(&self, feature: Feature) -> bool {
        self.pipeline.has_feature(feature)
    }

    // --- Ignores ---

    /// `object` is the replicated owner; ignores without one stay local.
    pub fn add_ignore(&mut self, object: Option<ObjectId>, collider: ColliderId) -> bool {
        if !self.authority.has_any() {
            return false;
        }
        self.data_mut().add_ignore(Ignore { object, collider })
    }

    pub fn remove_ignore(&mut self, collider: ColliderId) -> bool {
        if !self.authority.has_any() {
            return false;
        }
        self.data_mut().remove_ignore(collider)
    }

    #[inline]
    pub fn has_ignore(&self, collider: ColliderId) -> bool {
        self.data().has_ignore(collider)
    }

    // --- Modifiers ---

    /// Registers a modifier and fires the processor's `enter`.
    pub fn add_modifier(&mut self, object: ObjectId, processor: Option<ProcessorRef>) -> bool {
        if !self.authority.has_any() {
            return false;
        }
        let data = match self.phase {
            UpdatePhase::Render => &mut self.render,
            _ => &mut self.fixed,
        };
        self.pipeline.add_modifier(data, object, processor)
    }

    /// Fires the processor's `exit`; it won't run any pending stage call.
    pub fn remove_modifier(&mut self, object: ObjectId) -> bool {
        if !self.authority.has_any() {
            return false;
        }
        let data = match self.phase {
            UpdatePhase::Render => &mut self.render,
            _ => &mut self.fixed,
        };
        self.pipeline.remove_modifier(data, object)
    }

    #[inline]
    pub fn has_modifier(&self, object: ObjectId) -> bool {
        self.data().has_modifier(object)
    }

    // --- Processors ---

    /// Agent-local processors join the pipeline from the next move on.
    pub fn add_local_processor(&mut self, processor: ProcessorRef) -> bool {
        if self
            .local_processors
            .iter()
            .any(|p| same_processor(p, &processor))
        {
            return false;
        }
        self.local_processors.push(processor);
        true
    }

    pub fn remove_local_processor(&mut self, processor: &ProcessorRef) -> bool {
        let before = self.local_processors.len();
        self.local_processors.retain(|p| !same_processor(p, processor));
        before != self.local_processors.len()
    }

    #[inline]
    pub fn local_processors(&self) -> &[ProcessorRef] {
        &self.local_processors
    }

    fn all_processors(&self) -> impl Iterator<Item = &ProcessorRef> {
        let data = self.data();
        data.modifiers
            .iter()
            .filter_map(|m| m.processor.as_ref())
            .chain(data.collisions.iter().filter_map(|c| c.processor.as_ref()))
            .chain(&self.local_processors)
            .chain(&self.settings.processors)
    }

    pub fn has_processor<T: Processor>(&self) -> bool {
        self.get_processor::<T>().is_some()
    }

    /// First processor of type `T` among modifiers, collisions, local and settings processors.
    pub fn get_processor<T: Processor>(&self) -> Option<&T> {
        self.all_processors()
            .find_map(|p| (**p).as_any().downcast_ref::<T>())
    }

    // --- Stage introspection ---

    #[inline]
    pub fn active_stage(&self) -> Option<Stage> {
        self.pipeline.active_stage()
    }

    // --- Manual update ---

    /// Host-driven `fixed_update`/`render_update` become no-ops while enabled.
    pub fn set_manual_update(&mut self, manual_update: bool) {
        self.manual_update = manual_update;
    }

    #[inline]
    pub fn has_manual_update(&self) -> bool {
        self.manual_update
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::pipeline::{ProcessorResult, StageContext};

    struct Marker;

    impl Processor for Marker {}

    struct Other;

    impl Processor for Other {
        fn set_input_properties(&self, _ctx: &mut StageContext<'_>) -> ProcessorResult {
            Ok(())
        }
    }

    #[test]
    fn look_rotation_is_clamped_and_wrapped() {
        let mut kcc = Kcc::new(Settings::default());
        kcc.set_look_rotation(120.0, 190.0);
        assert_eq!(kcc.fixed_data().look_pitch, 90.0);
        assert!((kcc.fixed_data().look_yaw + 170.0).abs() < 1.0e-4);

        kcc.add_look_rotation(-200.0, -20.0);
        assert_eq!(kcc.fixed_data().look_pitch, -90.0);
        assert!((kcc.fixed_data().look_yaw - 170.0).abs() < 1.0e-4);
    }

    #[test]
    fn input_direction_is_normalized() {
        let mut kcc = Kcc::new(Settings::default());
        kcc.set_input_direction(Vec3::new(3.0, 0.0, 4.0));
        assert!((kcc.fixed_data().input_direction.norm() - 1.0).abs() < 1.0e-5);
        kcc.set_input_direction(Vec3::new(0.5, 0.0, 0.0));
        assert_eq!(kcc.render_data().input_direction, Vec3::new(0.5, 0.0, 0.0));
    }

    #[test]
    fn proxies_ignore_mutations() {
        let mut kcc = Kcc::new(Settings::default());
        kcc.set_authority(Authority::NONE);
        kcc.set_position(Vec3::new(1.0, 0.0, 0.0));
        kcc.add_external_force(Vec3::y());
        assert_eq!(kcc.position(), Vec3::zeros());
        assert_eq!(kcc.fixed_data().external_force, Vec3::zeros());
        assert!(!kcc.add_ignore(None, ColliderId(1)));
    }

    #[test]
    fn set_position_teleports_both_copies() {
        let mut kcc = Kcc::new(Settings::default());
        kcc.set_position(Vec3::new(0.0, 5.0, 0.0));
        assert!(kcc.fixed_data().has_teleported);
        assert_eq!(kcc.render_data().target_position, Vec3::new(0.0, 5.0, 0.0));
    }

    #[test]
    fn shape_setters_clamp() {
        let mut kcc = Kcc::new(Settings::default());
        kcc.set_shape(ShapeKind::Capsule, 0.6, 0.5);
        assert_eq!(kcc.settings().radius, 0.6);
        assert_eq!(kcc.settings().height, 1.2);

        kcc.set_radius(-1.0);
        assert_eq!(kcc.settings().radius, 0.6);
        kcc.set_extent(-1.0);
        assert_eq!(kcc.settings().extent, 0.0);
    }

    #[test]
    fn processor_lookup_by_type() {
        let mut kcc = Kcc::new(Settings::default());
        let marker: ProcessorRef = Rc::new(Marker);
        assert!(kcc.add_local_processor(marker.clone()));
        assert!(!kcc.add_local_processor(marker.clone()));

        assert!(kcc.has_processor::<Marker>());
        assert!(!kcc.has_processor::<Other>());

        kcc.add_modifier(ObjectId(2), Some(Rc::new(Other) as ProcessorRef));
        assert!(kcc.get_processor::<Other>().is_some());

        assert!(kcc.remove_local_processor(&marker));
        assert!(!kcc.has_processor::<Marker>());
    }

    #[test]
    fn feature_suppression_outside_stage_is_an_error() {
        let mut kcc = Kcc::new(Settings::default());
        assert_eq!(
            kcc.suppress_feature(Feature::StepUp),
            Err(KccError::FeatureSuppressionOutsideInput(None))
        );
    }

    #[test]
    fn transients_revert_one_shot_additions() {
        let mut data = AgentState {
            external_force: Vec3::new(0.0, 2.0, 0.0),
            ..AgentState::default()
        };
        let stored = Transients::store(&data);
        data.external_force += Vec3::new(1.0, 0.0, 0.0);
        stored.revert(&mut data);
        assert_eq!(data.external_force, Vec3::new(1.0, 0.0, 0.0));
    }
}
