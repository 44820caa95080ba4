//! Fixed and render passes, prediction correction and network tick hooks.

use std::mem;

use crate::{
    agent::{Kcc, Transients, UpdatePhase},
    constants::{
        PREDICTION_CARRY_SPEED, PREDICTION_CORRECTION_SPEED, PREDICTION_ERROR_TELEPORT_SQ,
        PREDICTION_HISTORY_SCAN,
    },
    error::{CodecError, KccError},
    math::{Vec3, clamp01, interpolate_range, lerp, lerp_vec},
    network::{InterpolationData, NetworkContext, is_teleport},
    pipeline::Stage,
    query::{ObjectLookup, Scene},
    settings::{Feature, RenderBehavior},
    state::AgentState,
};

/// Render passes shorter than this extrapolate instead of moving.
const MIN_RENDER_DELTA_TIME: f32 = 0.00005;

/// Timing of one fixed simulation tick.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct FixedTick {
    /// Host frame counter.
    pub frame: u32,
    pub tick: i32,
    /// Simulation time at the end of the tick.
    pub time: f32,
    pub delta_time: f32,
}

/// Timing of one display frame.
#[derive(Copy, Clone, Debug, Default)]
pub struct RenderTick<'a> {
    pub frame: u32,
    /// Latest simulated tick.
    pub tick: i32,
    /// Progress towards the next tick, 0..=1.
    pub alpha: f32,
    /// `tick` time plus `alpha` fixed ticks.
    pub time: f32,
    pub fixed_delta_time: f32,
    /// Wall-clock duration of the frame, drives error decay.
    pub frame_delta_time: f32,
    /// Bracketing snapshots for proxies.
    pub snapshots: Option<InterpolationData<'a>>,
}

impl Kcc {
    // --- Lifecycle ---

    /// Places the agent and prepares both state copies.
    ///
    /// Without state authority the initial state is read from `words`; with
    /// it, the initial state is written into `words`.
    pub fn initialize<O: ObjectLookup>(
        &mut self,
        objects: &O,
        tick: FixedTick,
        position: Vec3,
        words: Option<&mut [i32]>,
    ) -> Result<(), CodecError> {
        self.fixed = AgentState {
            frame: tick.frame,
            tick: tick.tick,
            time: tick.time,
            delta_time: tick.delta_time,
            alpha: 1.0,
            base_position: position,
            desired_position: position,
            target_position: position,
            ..AgentState::default()
        };

        let mut result = Ok(());
        if !self.authority.state {
            if let Some(words) = words.as_deref() {
                result = self.read_network_data(objects, words);
            }
        }

        self.refresh_collider();
        let data = mem::take(&mut self.fixed);
        self.cache_processors(&data);
        self.fixed = data;
        self.render.clone_from(&self.fixed);
        self.is_initialized = true;

        if self.authority.state {
            if let Some(words) = words {
                result = self.write_network_data(words);
            }
        }

        log::debug!(
            "initialized at {:?} (input={}, state={})",
            self.fixed.target_position,
            self.authority.input,
            self.authority.state
        );
        result
    }

    /// Removes collisions and modifiers with their exit callbacks and resets state.
    pub fn deinitialize(&mut self) {
        let mut data = mem::take(&mut self.fixed);
        self.remove_all_collisions(&mut data);
        self.pipeline.remove_all_modifiers(&mut data);

        self.render = AgentState::default();
        self.history.clear();
        self.pipeline.clear();
        self.cache.clear();
        self.statistics.reset();
        self.prediction_error = Vec3::zeros();
        self.last_render_position = Vec3::zeros();
        self.last_render_time = 0.0;
        self.phase = UpdatePhase::Idle;
        self.is_initialized = false;
    }

    // --- Fixed pass ---

    /// Skipped while manual update is enabled.
    pub fn fixed_update<S: Scene>(&mut self, scene: &S, tick: FixedTick) -> Result<(), KccError> {
        if self.manual_update {
            log::trace!("fixed update skipped, manual update enabled");
            return Ok(());
        }
        self.run_fixed_update(scene, tick)
    }

    pub fn manual_fixed_update<S: Scene>(
        &mut self,
        scene: &S,
        tick: FixedTick,
    ) -> Result<(), KccError> {
        if !self.manual_update {
            return Err(KccError::ManualUpdateDisabled);
        }
        self.run_fixed_update(scene, tick)
    }

    fn run_fixed_update<S: Scene>(&mut self, scene: &S, tick: FixedTick) -> Result<(), KccError> {
        if !self.is_initialized {
            return Err(KccError::NotInitialized);
        }

        self.fixed.frame = tick.frame;
        self.fixed.alpha = 1.0;
        self.refresh_collider();

        // proxies receive fixed state from the network
        if !self.authority.has_any() {
            return Ok(());
        }

        self.statistics.reset();
        self.phase = UpdatePhase::Fixed;

        let mut data = mem::take(&mut self.fixed);
        data.tick = tick.tick;
        data.time = tick.time;
        data.delta_time = tick.delta_time;

        let transients = Transients::store(&data);
        self.move_data(scene, &mut data);
        transients.revert(&mut data);

        self.fixed = data;
        self.phase = UpdatePhase::Idle;

        self.render.clone_from(&self.fixed);
        self.history.store(&self.fixed);
        Ok(())
    }

    // --- Render pass ---

    /// Skipped while manual update is enabled.
    pub fn render_update<S: Scene>(&mut self, scene: &S, tick: RenderTick<'_>) -> Result<(), KccError> {
        if self.manual_update {
            log::trace!("render update skipped, manual update enabled");
            return Ok(());
        }
        self.run_render_update(scene, tick)
    }

    pub fn manual_render_update<S: Scene>(
        &mut self,
        scene: &S,
        tick: RenderTick<'_>,
    ) -> Result<(), KccError> {
        if !self.manual_update {
            return Err(KccError::ManualUpdateDisabled);
        }
        self.run_render_update(scene, tick)
    }

    fn run_render_update<S: Scene>(&mut self, scene: &S, tick: RenderTick<'_>) -> Result<(), KccError> {
        if !self.is_initialized {
            return Err(KccError::NotInitialized);
        }

        self.statistics.reset();
        self.phase = UpdatePhase::Render;
        self.render.frame = tick.frame;

        if !self.authority.has_any() {
            if let Some(snapshots) = tick.snapshots {
                self.interpolate_network_data(scene, snapshots, tick.frame, tick.fixed_delta_time);
            }

            let mut data = mem::take(&mut self.render);
            self.cache_processors(&data);
            self.process_stage(Stage::Interpolate, &mut data);
            self.render = data;

            self.phase = UpdatePhase::Idle;
            return Ok(());
        }

        let previous_time = self.render.time;
        self.render.tick = tick.tick;
        self.render.alpha = tick.alpha;
        self.render.time = tick.time;
        self.render.delta_time = tick.time - previous_time;

        // interpolation runs one tick behind
        if self.settings.render_behavior == RenderBehavior::Interpolate {
            self.render.tick -= 1;
            self.render.time -= tick.fixed_delta_time;
        }

        self.update_prediction_correction(tick.frame_delta_time);

        match self.settings.render_behavior {
            RenderBehavior::Predict => self.predict_render(scene),
            RenderBehavior::Interpolate => self.interpolate_render(),
        }

        self.last_render_position = self.render.target_position;
        self.last_render_time = self.render.time;
        self.phase = UpdatePhase::Idle;
        Ok(())
    }

    fn predict_render<S: Scene>(&mut self, scene: &S) {
        let mut data = mem::take(&mut self.render);

        if data.delta_time < MIN_RENDER_DELTA_TIME {
            let desired_velocity = data.desired_velocity();
            let velocity = if data.real_velocity.norm_squared() <= desired_velocity.norm_squared() {
                data.real_velocity
            } else {
                desired_velocity
            };

            data.base_position = data.target_position;
            data.desired_position = data.base_position + velocity * data.delta_time;
            data.target_position = data.desired_position;
        } else {
            let transients = Transients::store(&data);
            self.move_data(scene, &mut data);
            transients.revert(&mut data);
        }

        self.render = data;
    }

    /// Blends the two newest fixed states at the render alpha.
    fn interpolate_render(&mut self) {
        let mut data = mem::take(&mut self.render);

        self.pipeline.clear_active_stage();
        self.pipeline.reset_features(self.settings.features);
        self.cache_processors(&data);
        self.set_input_properties(&mut data);

        if !self.fixed.has_teleported {
            if let Some(from) = self.history.get(self.fixed.tick - 1) {
                let to = &self.fixed;
                let alpha = data.alpha;
                let error = self.prediction_error;

                data.base_position = lerp_vec(from.base_position, to.base_position, alpha) + error;
                data.desired_position =
                    lerp_vec(from.desired_position, to.desired_position, alpha) + error;
                data.target_position =
                    lerp_vec(from.target_position, to.target_position, alpha) + error;
                data.look_pitch = lerp(from.look_pitch, to.look_pitch, alpha);
                data.look_yaw = interpolate_range(from.look_yaw, to.look_yaw, -180.0, 180.0, alpha);
                data.real_speed = lerp(from.real_speed, to.real_speed, alpha);
                data.real_velocity = lerp_vec(from.real_velocity, to.real_velocity, alpha);
            }
        }

        self.process_stage(Stage::Interpolate, &mut data);
        self.pipeline.clear_active_stage();
        self.render = data;
    }

    /// Smooths the jump between the last rendered position and the
    /// position the newest fixed ticks imply for that time.
    fn update_prediction_correction(&mut self, frame_delta_time: f32) {
        if !self.pipeline.has_feature(Feature::PredictionCorrection) {
            self.prediction_error = Vec3::zeros();
            return;
        }

        if self.render.frame == self.fixed.frame {
            let Some(mut current) = self
                .history
                .get(self.render.tick)
                .filter(|current| self.last_render_time <= current.time)
            else {
                return;
            };

            for _ in 0..PREDICTION_HISTORY_SCAN {
                let Some(previous) = self.history.get(current.tick - 1) else {
                    break;
                };

                if self.last_render_time >= previous.time {
                    let span = current.time - previous.time;
                    let alpha = if span > 0.0 {
                        (self.last_render_time - previous.time) / span
                    } else {
                        1.0
                    };
                    let expected = lerp_vec(previous.target_position, current.target_position, alpha);

                    let mut error = self.last_render_position - expected;
                    if error.norm_squared() >= PREDICTION_ERROR_TELEPORT_SQ {
                        error = Vec3::zeros();
                    }
                    error = lerp_vec(
                        error,
                        Vec3::zeros(),
                        clamp01(PREDICTION_CORRECTION_SPEED * frame_delta_time),
                    );

                    self.prediction_error = error;
                    offset_positions(&mut self.render, error);
                    break;
                }

                current = previous;
            }
        } else {
            offset_positions(&mut self.render, -self.prediction_error);
            self.prediction_error = lerp_vec(
                self.prediction_error,
                Vec3::zeros(),
                clamp01(PREDICTION_CARRY_SPEED * frame_delta_time),
            );
            offset_positions(&mut self.render, self.prediction_error);
        }
    }

    // --- Network ---

    #[inline]
    pub fn write_network_data(&self, words: &mut [i32]) -> Result<(), CodecError> {
        self.codec.write(&self.fixed, &self.settings, words)
    }

    /// Overwrites fixed data and settings with a received snapshot.
    pub fn read_network_data(
        &mut self,
        objects: &dyn ObjectLookup,
        words: &[i32],
    ) -> Result<(), CodecError> {
        let mut ctx = NetworkContext {
            data: &mut self.fixed,
            settings: &mut self.settings,
            pipeline: &mut self.pipeline,
            objects,
        };
        self.codec.read(&mut ctx, words)
    }

    /// Before the host simulates a batch of ticks.
    ///
    /// A resimulation starts from the received authoritative snapshot; with
    /// input authority the full-precision local history for `tick` is used
    /// wherever it matches the snapshot.
    pub fn before_all_ticks(
        &mut self,
        objects: &dyn ObjectLookup,
        resimulation: bool,
        frame: u32,
        tick: i32,
        words: &[i32],
    ) -> Result<(), CodecError> {
        if !resimulation {
            return Ok(());
        }

        let history = if self.authority.input {
            self.history.get(tick).cloned()
        } else {
            None
        };
        if let Some(history) = &history {
            self.fixed.clone_from(history);
            self.fixed.frame = frame;
        }

        self.read_network_data(objects, words)?;

        if let Some(history) = &history {
            self.restore_history_data(history);
        }
        self.refresh_collider();
        Ok(())
    }

    /// After the host simulated a batch of ticks.
    pub fn after_all_ticks(&mut self, resimulation: bool, words: &mut [i32]) -> Result<(), CodecError> {
        if resimulation || !self.authority.state {
            return Ok(());
        }
        self.write_network_data(words)
    }

    /// Replaces received quantized values with local full-precision ones
    /// wherever they agree.
    fn restore_history_data(&mut self, history: &AgentState) {
        if self.codec.quantized_position(history.target_position) == self.fixed.target_position {
            self.fixed.base_position = history.base_position;
            self.fixed.desired_position = history.desired_position;
            self.fixed.target_position = history.target_position;
        }
        if self.codec.quantized_rotation(history.look_pitch) == self.fixed.look_pitch {
            self.fixed.look_pitch = history.look_pitch;
        }
        if self.codec.quantized_rotation(history.look_yaw) == self.fixed.look_yaw {
            self.fixed.look_yaw = history.look_yaw;
        }
        // grounding is not replicated
        if self.fixed.is_grounded {
            self.fixed.is_grounded = history.is_grounded;
        }
    }

    /// Proxy state between two received snapshots.
    fn interpolate_network_data<S: Scene>(
        &mut self,
        scene: &S,
        snapshots: InterpolationData<'_>,
        frame: u32,
        fixed_delta_time: f32,
    ) {
        let ticks = snapshots.ticks();
        let tick = snapshots.tick();

        self.fixed.frame = frame;
        self.fixed.tick = tick.round() as i32;
        self.fixed.alpha = snapshots.alpha;
        self.fixed.delta_time = fixed_delta_time;
        self.fixed.time = tick * fixed_delta_time;

        let objects: &dyn ObjectLookup = scene;
        let mut ctx = NetworkContext {
            data: &mut self.fixed,
            settings: &mut self.settings,
            pipeline: &mut self.pipeline,
            objects,
        };
        if let Err(err) = self
            .codec
            .interpolate(&mut ctx, snapshots.from, snapshots.to, snapshots.alpha)
        {
            log::warn!("snapshot interpolation failed: {}", err);
            return;
        }

        if ticks > 0 {
            if let (Ok(from), Ok(to)) = (
                self.codec.position(snapshots.from),
                self.codec.position(snapshots.to),
            ) {
                let delta = to - from;
                if is_teleport(delta, ticks) {
                    self.fixed.target_position = to;
                    self.fixed.real_velocity = Vec3::zeros();
                    self.fixed.real_speed = 0.0;
                } else if fixed_delta_time > 0.0 {
                    self.fixed.real_velocity = delta / (fixed_delta_time * ticks as f32);
                    self.fixed.real_speed = self.fixed.real_velocity.norm();
                }
            }
        }

        self.render.clone_from(&self.fixed);
    }
}

fn offset_positions(data: &mut AgentState, offset: Vec3) {
    data.base_position += offset;
    data.desired_position += offset;
    data.target_position += offset;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{scene::CollisionWorld, settings::Settings};

    const DT: f32 = 1.0 / 60.0;

    fn tick(tick: i32) -> FixedTick {
        FixedTick {
            frame: tick as u32,
            tick,
            time: tick as f32 * DT,
            delta_time: DT,
        }
    }

    /// An agent whose tick 1 sits off the quantization grid.
    fn recorded(world: &CollisionWorld) -> (Kcc, AgentState, Vec<i32>) {
        let mut kcc = Kcc::new(Settings::default());
        kcc.initialize(world, tick(0), Vec3::new(1.23456, 0.5, -0.98765), None)
            .unwrap();
        kcc.set_look_rotation(12.34567, 33.33333);
        kcc.fixed_update(world, tick(1)).unwrap();

        let recorded = kcc.fixed_data().clone();
        let mut words = vec![0; kcc.network_word_count()];
        kcc.write_network_data(&mut words).unwrap();
        (kcc, recorded, words)
    }

    #[test]
    fn resimulation_restores_full_precision_history() {
        let world = CollisionWorld::new();
        let (mut kcc, recorded, words) = recorded(&world);
        let position = recorded.target_position;
        assert_ne!(kcc.codec.quantized_position(position), position);
        assert_ne!(kcc.codec.quantized_rotation(recorded.look_yaw), recorded.look_yaw);

        kcc.set_position(Vec3::new(5.0, 5.0, 5.0));
        kcc.set_look_rotation(0.0, 0.0);
        kcc.before_all_ticks(&world, true, 7, 1, &words).unwrap();

        let data = kcc.fixed_data();
        assert_eq!(data.frame, 7);
        assert_eq!(data.target_position, position);
        assert_eq!(data.base_position, recorded.base_position);
        assert_eq!(data.look_pitch, recorded.look_pitch);
        assert_eq!(data.look_yaw, recorded.look_yaw);
    }

    #[test]
    fn resimulation_keeps_snapshot_values_that_disagree() {
        let world = CollisionWorld::new();
        let (mut kcc, recorded, mut words) = recorded(&world);
        // half a meter along x at the default accuracy
        words[0] += 500;

        kcc.before_all_ticks(&world, true, 7, 1, &words).unwrap();

        let data = kcc.fixed_data();
        let received = kcc
            .codec
            .quantized_position(recorded.target_position + Vec3::new(0.5, 0.0, 0.0));
        assert!((data.target_position - received).norm() < 1.0e-4);
        assert_ne!(data.target_position, recorded.target_position);
        assert_eq!(data.look_yaw, recorded.look_yaw);
    }

    #[test]
    fn resimulation_without_history_uses_the_snapshot() {
        let world = CollisionWorld::new();
        let (mut kcc, recorded, words) = recorded(&world);

        kcc.before_all_ticks(&world, true, 7, 2, &words).unwrap();

        let data = kcc.fixed_data();
        assert_eq!(
            data.target_position,
            kcc.codec.quantized_position(recorded.target_position)
        );
        assert_eq!(
            data.look_yaw,
            kcc.codec.quantized_rotation(recorded.look_yaw)
        );
    }

    #[test]
    fn after_all_ticks_writes_only_outside_resimulation() {
        let world = CollisionWorld::new();
        let (mut kcc, _, words) = recorded(&world);

        let mut out = vec![0; words.len()];
        kcc.after_all_ticks(true, &mut out).unwrap();
        assert!(out.iter().all(|w| *w == 0));

        kcc.after_all_ticks(false, &mut out).unwrap();
        assert_eq!(out, words);
    }
}
