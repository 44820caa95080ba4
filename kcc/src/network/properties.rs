//! Core replicated group: target position, look rotation and packed settings.
//!
//! | word | content                                                   |
//! |------|-----------------------------------------------------------|
//! | 0-2  | target position, position accuracy                         |
//! | 3    | look pitch, rotation accuracy                              |
//! | 4    | look yaw, rotation accuracy                                |
//! | 5    | shape (0-1), trigger (2), layer (3-7), layout version (24-31) |
//! | 6    | collision mask                                             |
//! | 7    | render behavior (0-1), features (2-7)                      |
//! | 8-11 | radius, height, extent, mass as raw `f32` bits             |

use crate::{
    error::CodecError,
    math::{interpolate_range, lerp, lerp_vec},
    network::{
        NetworkConfig, NetworkContext, NetworkProperty,
        quantize::{dequantize, quantize, read_f32, read_vec3, write_f32, write_vec3},
    },
    settings::{FeatureMask, RenderBehavior, Settings, ShapeKind},
    state::AgentState,
};

pub const CORE_WORD_COUNT: usize = 12;

/// Bumped whenever the bit layout of the settings words changes.
pub const NETWORK_LAYOUT_VERSION: u8 = 1;

const SHAPE_MASK: i32 = 0b11;
const TRIGGER_BIT: i32 = 0b100;
const LAYER_SHIFT: i32 = 3;
const LAYER_MASK: i32 = 0b1111_1000;
const VERSION_SHIFT: i32 = 24;
const RENDER_BEHAVIOR_MASK: i32 = 0b11;
const FEATURES_SHIFT: i32 = 2;
const FEATURES_MASK: i32 = 0b1111_1100;

#[derive(Clone, Debug)]
pub struct CoreProperties {
    config: NetworkConfig,
}

impl CoreProperties {
    pub fn new(config: NetworkConfig) -> Self {
        Self { config }
    }

    fn write_settings(settings: &Settings, words: &mut [i32]) {
        let mut word_a = settings.shape as i32 & SHAPE_MASK;
        if settings.is_trigger {
            word_a |= TRIGGER_BIT;
        }
        word_a |= ((settings.collider_layer as i32) << LAYER_SHIFT) & LAYER_MASK;
        word_a |= (NETWORK_LAYOUT_VERSION as i32) << VERSION_SHIFT;

        let word_b = (settings.render_behavior as i32 & RENDER_BEHAVIOR_MASK)
            | ((settings.features.bits as i32) << FEATURES_SHIFT) & FEATURES_MASK;

        words[5] = word_a;
        words[6] = settings.collision_mask as i32;
        words[7] = word_b;
        words[8] = write_f32(settings.radius);
        words[9] = write_f32(settings.height);
        words[10] = write_f32(settings.extent);
        words[11] = write_f32(settings.mass);
    }

    fn read_settings(settings: &mut Settings, words: &[i32]) -> Result<(), CodecError> {
        let word_a = words[5];
        let version = (word_a >> VERSION_SHIFT) as u8;
        if version != NETWORK_LAYOUT_VERSION {
            return Err(CodecError::LayoutVersion {
                expected: NETWORK_LAYOUT_VERSION,
                found: version,
            });
        }

        let shape_bits = (word_a & SHAPE_MASK) as u8;
        match ShapeKind::try_from_bits(shape_bits) {
            Some(shape) => settings.shape = shape,
            None => log::warn!("unknown shape bits {}, keeping {:?}", shape_bits, settings.shape),
        }
        settings.is_trigger = word_a & TRIGGER_BIT != 0;
        settings.collider_layer = ((word_a & LAYER_MASK) >> LAYER_SHIFT) as u8;
        settings.collision_mask = words[6] as u32;

        let word_b = words[7];
        let behavior_bits = (word_b & RENDER_BEHAVIOR_MASK) as u8;
        match RenderBehavior::try_from_bits(behavior_bits) {
            Some(behavior) => settings.render_behavior = behavior,
            None => log::warn!("unknown render behavior bits {}", behavior_bits),
        }
        settings.features = FeatureMask::new(((word_b & FEATURES_MASK) >> FEATURES_SHIFT) as u8);

        settings.radius = read_f32(words[8]);
        settings.height = read_f32(words[9]);
        settings.extent = read_f32(words[10]);
        settings.mass = read_f32(words[11]);
        settings.sanitize();
        Ok(())
    }
}

impl NetworkProperty for CoreProperties {
    fn word_count(&self) -> usize {
        CORE_WORD_COUNT
    }

    fn write(&self, data: &AgentState, settings: &Settings, words: &mut [i32]) {
        write_vec3(&mut words[0..3], data.target_position, self.config.position_accuracy);
        words[3] = quantize(data.look_pitch, self.config.rotation_accuracy);
        words[4] = quantize(data.look_yaw, self.config.rotation_accuracy);
        Self::write_settings(settings, words);
    }

    fn read(&self, ctx: &mut NetworkContext<'_>, words: &[i32]) -> Result<(), CodecError> {
        Self::read_settings(ctx.settings, words)?;
        ctx.data.target_position = read_vec3(&words[0..3], self.config.position_accuracy);
        ctx.data.look_pitch = dequantize(words[3], self.config.rotation_accuracy);
        ctx.data.look_yaw = dequantize(words[4], self.config.rotation_accuracy);
        Ok(())
    }

    fn interpolate(
        &self,
        ctx: &mut NetworkContext<'_>,
        from: &[i32],
        to: &[i32],
        alpha: f32,
    ) -> Result<(), CodecError> {
        let position_accuracy = self.config.position_accuracy;
        let rotation_accuracy = self.config.rotation_accuracy;

        // settings are categorical and snap to the closer snapshot
        Self::read_settings(ctx.settings, if alpha < 0.5 { from } else { to })?;

        ctx.data.target_position = lerp_vec(
            read_vec3(&from[0..3], position_accuracy),
            read_vec3(&to[0..3], position_accuracy),
            alpha,
        );
        ctx.data.look_pitch = lerp(
            dequantize(from[3], rotation_accuracy),
            dequantize(to[3], rotation_accuracy),
            alpha,
        );
        ctx.data.look_yaw = interpolate_range(
            dequantize(from[4], rotation_accuracy),
            dequantize(to[4], rotation_accuracy),
            -180.0,
            180.0,
            alpha,
        );
        Ok(())
    }
}
